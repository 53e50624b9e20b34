//! DC-Sweep Driver (component H): reparametrizes `b` over a swept source,
//! repeatedly calls the Solver, and collects per-node trajectories.

use std::collections::HashMap;

use nalgebra::DVector;

use crate::commands::{DcSweepSpec, SweepKind};
use crate::error::SpicError;
use crate::mna::MnaLayout;
use crate::netlist::Netlist;
use crate::node_table::NodeTable;
use crate::solver::Solver;
use crate::system::MnaSystem;

#[derive(Debug, Clone, Default)]
pub struct DcSweepResult {
    pub source_values: Vec<f64>,
    pub node_voltages: HashMap<String, Vec<f64>>,
}

/// Runs one declared `.DC` sweep. `source_name` has already been validated
/// to exist at registration time ([`crate::commands::Commands::add_dc_sweep`]).
pub fn run_dc_sweep(
    system: &mut MnaSystem,
    netlist: &Netlist,
    node_table: &NodeTable,
    layout: &MnaLayout,
    solver: &mut Solver,
    spec: &DcSweepSpec,
    output_nodes: &[String],
) -> Result<DcSweepResult, SpicError> {
    let mut b_new = system.b().clone();

    // Rows (and, for current sweeps, the sign convention) affected by each
    // step of this sweep.
    enum SweepTarget {
        Voltage { row: usize },
        Current { pos_row: Option<usize>, neg_row: Option<usize> },
    }

    let target = match spec.kind {
        SweepKind::Voltage => {
            let k = netlist
                .voltage_sources
                .find_element_name(&spec.source_name)
                .ok_or_else(|| SpicError::UnknownSource(spec.source_name.clone()))?;
            let row = layout.voltage_branch_row(k);
            b_new[row] = spec.start;
            SweepTarget::Voltage { row }
        }
        SweepKind::Current => {
            let k = netlist
                .current_sources
                .find_element_name(&spec.source_name)
                .ok_or_else(|| SpicError::UnknownSource(spec.source_name.clone()))?;
            let element = &netlist.current_sources.elements[k];
            let pos_row = layout.node_row(element.pos);
            let neg_row = layout.node_row(element.neg);
            let dc_value = element.dc_value;

            // Undo the original DC stamp (b[p] -= I; b[n] += I), then apply
            // the sweep's starting value with the same convention.
            if let Some(pr) = pos_row {
                b_new[pr] += dc_value;
            }
            if let Some(nr) = neg_row {
                b_new[nr] -= dc_value;
            }
            if let Some(pr) = pos_row {
                b_new[pr] -= spec.start;
            }
            if let Some(nr) = neg_row {
                b_new[nr] += spec.start;
            }
            SweepTarget::Current { pos_row, neg_row }
        }
    };

    let mut result = DcSweepResult::default();
    for name in output_nodes {
        result.node_voltages.insert(name.clone(), Vec::new());
    }

    let mut src_value = spec.start;
    let greater_magnitude = spec.start.abs().max(spec.end.abs());
    let tolerance = 0.0001 * greater_magnitude;

    while src_value < spec.end || (src_value - spec.end).abs() < tolerance {
        result.source_values.push(src_value);

        let outcome = solver.solve(system, &b_new)?;
        if !outcome.converged {
            log::warn!(
                "dc sweep {}: point {} did not converge (error={}, iterations={})",
                spec.source_name,
                src_value,
                outcome.error,
                outcome.iterations
            );
        }

        for name in output_nodes {
            let voltage = match node_table.find_node(name).and_then(|id| layout.node_row(id)) {
                Some(row) => outcome.x[row],
                None => 0.0,
            };
            result.node_voltages.get_mut(name).unwrap().push(voltage);
        }

        match target {
            SweepTarget::Voltage { row } => b_new[row] += spec.step,
            SweepTarget::Current { pos_row, neg_row } => {
                if let Some(pr) = pos_row {
                    b_new[pr] -= spec.step;
                }
                if let Some(nr) = neg_row {
                    b_new[nr] += spec.step;
                }
            }
        }
        src_value += spec.step;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Options;
    use crate::mna;
    use crate::netlist::{Passive, Source};

    #[test]
    fn voltage_sweep_produces_expected_row_count_and_values() {
        let mut table = NodeTable::new();
        table.append_node("1");
        table.append_node("2");
        let mut netlist = Netlist::new("divider".into());
        netlist
            .add_resistor(Passive {
                name: "R1".into(),
                pos: 1,
                neg: 0,
                value: 1000.0,
            })
            .unwrap();
        netlist
            .add_resistor(Passive {
                name: "R2".into(),
                pos: 2,
                neg: 1,
                value: 1000.0,
            })
            .unwrap();
        netlist
            .add_voltage_source(Source {
                name: "V1".into(),
                pos: 2,
                neg: 0,
                dc_value: 10.0,
                waveform: None,
            })
            .unwrap();

        let (mut system, layout) = mna::assemble_dc(&netlist, table.len(), false);
        let options = Options::default();
        let mut solver = Solver::new(&options, &mut system).unwrap();
        let spec = DcSweepSpec {
            kind: SweepKind::Voltage,
            source_name: "V1".into(),
            start: 0.0,
            end: 10.0,
            step: 1.0,
        };
        let result = run_dc_sweep(
            &mut system,
            &netlist,
            &table,
            &layout,
            &mut solver,
            &spec,
            &["1".to_string()],
        )
        .unwrap();

        assert_eq!(result.source_values.len(), 11);
        for (k, v) in result.node_voltages["1"].iter().enumerate() {
            assert!((v - (k as f64) / 2.0).abs() < 1e-6);
        }
    }
}
