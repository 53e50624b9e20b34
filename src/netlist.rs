//! Typed, by-kind collections of circuit elements. Each kind is stored in
//! its own dense `ElementList` so the MNA assembler never has to dispatch
//! dynamically inside a hot loop; polymorphism across element *families*
//! (two-terminal passive, source with optional waveform, multi-terminal
//! semiconductor) is a handful of sum types instead of an inheritance chain.

use std::collections::HashMap;

use crate::error::SpicError;
use crate::node_table::NodeId;
use crate::waveform::Waveform;

/// A dense, name-indexed collection of elements of one kind. Element ids
/// are assigned in parse (insertion) order and never reused.
#[derive(Debug, Clone, Default)]
pub struct ElementList<T> {
    pub elements: Vec<T>,
    name_map: HashMap<String, usize>,
}

impl<T> ElementList<T> {
    pub fn new() -> Self {
        ElementList {
            elements: Vec::new(),
            name_map: HashMap::new(),
        }
    }

    pub fn find_element_name(&self, name: &str) -> Option<usize> {
        self.name_map.get(name).copied()
    }

    /// Inserts `element` under `name`, returning its element id. Fails if
    /// `name` already exists in this list.
    pub fn add_element(&mut self, name: String, element: T) -> Result<usize, SpicError> {
        if self.name_map.contains_key(&name) {
            return Err(SpicError::DuplicateElement(name));
        }
        let id = self.elements.len();
        self.name_map.insert(name, id);
        self.elements.push(element);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.elements.iter()
    }
}

/// Resistor, capacitor, or inductor: a two-terminal passive element with a
/// positive value.
#[derive(Debug, Clone, PartialEq)]
pub struct Passive {
    pub name: String,
    pub pos: NodeId,
    pub neg: NodeId,
    pub value: f64,
}

/// Voltage or current source: a two-terminal element with a DC value and
/// an optional time-varying waveform used only during transient analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub name: String,
    pub pos: NodeId,
    pub neg: NodeId,
    pub dc_value: f64,
    pub waveform: Option<Waveform>,
}

impl Source {
    /// Value at time `t`: the waveform if present, otherwise the DC value.
    pub fn value_at(&self, t: f64) -> f64 {
        match &self.waveform {
            Some(w) => w.eval(t),
            None => self.dc_value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diode {
    pub name: String,
    pub anode: NodeId,
    pub cathode: NodeId,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mosfet {
    pub name: String,
    pub drain: NodeId,
    pub gate: NodeId,
    pub source: NodeId,
    pub bulk: NodeId,
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bjt {
    pub name: String,
    pub collector: NodeId,
    pub base: NodeId,
    pub emitter: NodeId,
    pub model: Option<String>,
}

/// Complete set of typed element collections for one circuit. Built once
/// during parse and read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    pub title: String,
    pub resistors: ElementList<Passive>,
    pub capacitors: ElementList<Passive>,
    pub inductors: ElementList<Passive>,
    pub voltage_sources: ElementList<Source>,
    pub current_sources: ElementList<Source>,
    pub diodes: ElementList<Diode>,
    pub mosfets: ElementList<Mosfet>,
    pub bjts: ElementList<Bjt>,
}

impl Netlist {
    pub fn new(title: String) -> Self {
        Netlist {
            title,
            ..Default::default()
        }
    }

    pub fn add_resistor(&mut self, el: Passive) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.resistors.add_element(name, el)
    }

    pub fn add_capacitor(&mut self, el: Passive) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.capacitors.add_element(name, el)
    }

    pub fn add_inductor(&mut self, el: Passive) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.inductors.add_element(name, el)
    }

    pub fn add_voltage_source(&mut self, el: Source) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.voltage_sources.add_element(name, el)
    }

    pub fn add_current_source(&mut self, el: Source) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.current_sources.add_element(name, el)
    }

    pub fn add_diode(&mut self, el: Diode) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.diodes.add_element(name, el)
    }

    pub fn add_mosfet(&mut self, el: Mosfet) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.mosfets.add_element(name, el)
    }

    pub fn add_bjt(&mut self, el: Bjt) -> Result<usize, SpicError> {
        let name = el.name.clone();
        self.bjts.add_element(name, el)
    }

    pub fn num_resistors(&self) -> usize {
        self.resistors.len()
    }

    pub fn num_voltage_sources(&self) -> usize {
        self.voltage_sources.len()
    }

    pub fn num_inductors(&self) -> usize {
        self.inductors.len()
    }

    pub fn num_capacitors(&self) -> usize {
        self.capacitors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_is_rejected() {
        let mut list: ElementList<Passive> = ElementList::new();
        list.add_element(
            "R1".into(),
            Passive {
                name: "R1".into(),
                pos: 1,
                neg: 0,
                value: 1000.0,
            },
        )
        .unwrap();
        let err = list.add_element(
            "R1".into(),
            Passive {
                name: "R1".into(),
                pos: 2,
                neg: 0,
                value: 500.0,
            },
        );
        assert!(matches!(err, Err(SpicError::DuplicateElement(_))));
    }

    #[test]
    fn element_ids_are_parse_order() {
        let mut list: ElementList<Passive> = ElementList::new();
        let id0 = list
            .add_element(
                "R1".into(),
                Passive {
                    name: "R1".into(),
                    pos: 1,
                    neg: 0,
                    value: 1.0,
                },
            )
            .unwrap();
        let id1 = list
            .add_element(
                "R2".into(),
                Passive {
                    name: "R2".into(),
                    pos: 2,
                    neg: 1,
                    value: 2.0,
                },
            )
            .unwrap();
        assert_eq!(id0, 0);
        assert_eq!(id1, 1);
        assert_eq!(list.find_element_name("R2"), Some(1));
    }

    #[test]
    fn source_uses_waveform_when_present() {
        let src = Source {
            name: "V1".into(),
            pos: 1,
            neg: 0,
            dc_value: 5.0,
            waveform: None,
        };
        assert_eq!(src.value_at(3.0), 5.0);
    }
}
