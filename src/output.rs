//! Output Writer (component J): dumps analysis trajectories as two-column
//! text files, named per the stripping rule in the persisted-output
//! contract.

use std::io::Write;
use std::path::Path;

use nalgebra::DVector;

use crate::commands::{DcSweepSpec, SweepKind, TransientSpec};
use crate::dc_sweep::DcSweepResult;
use crate::error::SpicError;
use crate::mna::MnaLayout;
use crate::netlist::Netlist;
use crate::node_table::NodeTable;
use crate::transient::TransientResult;

/// Renders `value` the way the original implementation does (six fixed
/// decimal places), then strips trailing zeros and, if that leaves a bare
/// trailing `.`, strips that too. `12.500000` -> `12.5`, `10.000000` -> `10`.
pub fn strip_numeric(value: f64) -> String {
    let rendered = format!("{:.6}", value);
    let trimmed = rendered.trim_end_matches('0');
    trimmed.strip_suffix('.').unwrap_or(trimmed).to_string()
}

pub fn dc_sweep_filename(spec: &DcSweepSpec, node: &str) -> String {
    let kind = match spec.kind {
        SweepKind::Voltage => "V",
        SweepKind::Current => "I",
    };
    format!(
        "{}{}_{}_{}_{}_V({}).dat",
        kind,
        spec.source_name,
        strip_numeric(spec.start),
        strip_numeric(spec.end),
        strip_numeric(spec.step),
        node
    )
}

pub fn transient_filename(spec: &TransientSpec, node: &str) -> String {
    format!(
        "tran_{}_{}_V({}).dat",
        strip_numeric(spec.time_step),
        strip_numeric(spec.fin_time),
        node
    )
}

fn write_two_column(path: &Path, xs: &[f64], ys: &[f64]) -> Result<(), SpicError> {
    let mut file = std::fs::File::create(path)?;
    for (x, y) in xs.iter().zip(ys.iter()) {
        writeln!(file, "{} {}", x, y)?;
    }
    Ok(())
}

/// Writes one file per output node under `dir`. An empty `nodes` list
/// writes nothing and is not an error.
pub fn write_dc_sweep_results(
    dir: &Path,
    spec: &DcSweepSpec,
    result: &DcSweepResult,
    nodes: &[String],
) -> Result<(), SpicError> {
    std::fs::create_dir_all(dir)?;
    for node in nodes {
        let path = dir.join(dc_sweep_filename(spec, node));
        let ys = &result.node_voltages[node];
        write_two_column(&path, &result.source_values, ys)?;
    }
    Ok(())
}

pub fn write_transient_results(
    dir: &Path,
    spec: &TransientSpec,
    result: &TransientResult,
    nodes: &[String],
) -> Result<(), SpicError> {
    std::fs::create_dir_all(dir)?;
    for node in nodes {
        let path = dir.join(transient_filename(spec, node));
        let ys = &result.node_voltages[node];
        write_two_column(&path, &result.time, ys)?;
    }
    Ok(())
}

/// `dc_op.dat`: one line per non-ground node in node-table order, a blank
/// line, then one line per voltage source / inductor branch current in
/// parse order.
///
/// The branch unknown `x[row]` stamped by `mna::stamp_branch` is the
/// negative of the current flowing into the source's positive terminal
/// (the `+1`/`-1` branch-row stamp fixes the node-to-branch KCL sign, not
/// the reported current's sign), so the value written here is `-x[row]`.
pub fn write_dc_operating_point(
    path: &Path,
    node_table: &NodeTable,
    layout: &MnaLayout,
    netlist: &Netlist,
    x: &DVector<f64>,
) -> Result<(), SpicError> {
    let mut file = std::fs::File::create(path)?;
    for (id, name) in node_table.non_ground_names().enumerate() {
        let row = layout.node_row(id + 1).unwrap();
        writeln!(file, "{} {}", name, x[row])?;
    }
    writeln!(file)?;
    for (k, v) in netlist.voltage_sources.iter().enumerate() {
        let row = layout.voltage_branch_row(k);
        writeln!(file, "{} {}", v.name, -x[row])?;
    }
    for (k, l) in netlist.inductors.iter().enumerate() {
        let row = layout.inductor_branch_row(k);
        writeln!(file, "{} {}", l.name, -x[row])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::{Passive, Source};

    fn dc_op_lines(node_table: &NodeTable, layout: &MnaLayout, netlist: &Netlist, x: &DVector<f64>) -> Vec<String> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dc_op.dat");
        write_dc_operating_point(&path, node_table, layout, netlist, x).unwrap();
        std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|l| l.to_string())
            .collect()
    }

    /// Scenario 1: `R1 1 0 1k`, `V1 1 0 5`. Hand-solved: `V(1)=5`,
    /// `I(V1)=0.005`; the branch unknown the stamp produces is the
    /// negative, `x[branch]=-0.005`.
    #[test]
    fn dc_op_scenario_1_reports_positive_source_current() {
        let mut node_table = NodeTable::new();
        node_table.append_node("1");
        let mut netlist = Netlist::new("scenario 1".into());
        netlist
            .add_resistor(Passive {
                name: "R1".into(),
                pos: 1,
                neg: 0,
                value: 1000.0,
            })
            .unwrap();
        netlist
            .add_voltage_source(Source {
                name: "V1".into(),
                pos: 1,
                neg: 0,
                dc_value: 5.0,
                waveform: None,
            })
            .unwrap();
        let layout = MnaLayout::from_netlist(&netlist, node_table.len());
        let x = DVector::from_vec(vec![5.0, -0.005]);

        let lines = dc_op_lines(&node_table, &layout, &netlist, &x);
        assert_eq!(lines, vec!["1 5", "", "V1 0.005"]);
    }

    /// Scenario 2: `R1 1 0 1k`, `R2 2 1 1k`, `V1 2 0 10`. Hand-solved:
    /// `V(1)=5`, `V(2)=10`, `I(V1)=0.005`, branch unknown `-0.005`.
    #[test]
    fn dc_op_scenario_2_reports_positive_source_current() {
        let mut node_table = NodeTable::new();
        node_table.append_node("1");
        node_table.append_node("2");
        let mut netlist = Netlist::new("scenario 2".into());
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
        let layout = MnaLayout::from_netlist(&netlist, node_table.len());
        let x = DVector::from_vec(vec![5.0, 10.0, -0.005]);

        let lines = dc_op_lines(&node_table, &layout, &netlist, &x);
        assert_eq!(lines, vec!["1 5", "2 10", "", "V1 0.005"]);
    }

    #[test]
    fn strips_trailing_zeros_and_dot() {
        assert_eq!(strip_numeric(12.5), "12.5");
        assert_eq!(strip_numeric(10.0), "10");
        assert_eq!(strip_numeric(0.0), "0");
        assert_eq!(strip_numeric(-5.0), "-5");
    }

    #[test]
    fn dc_sweep_name_matches_scenario_6() {
        let spec = DcSweepSpec {
            kind: SweepKind::Voltage,
            source_name: "1".into(),
            start: 0.0,
            end: 10.0,
            step: 1.0,
        };
        assert_eq!(dc_sweep_filename(&spec, "1"), "V1_0_10_1_V(1).dat");
    }

    #[test]
    fn transient_name_strips_rule() {
        let spec = TransientSpec {
            time_step: 0.1,
            fin_time: 2.0,
        };
        assert_eq!(transient_filename(&spec, "1"), "tran_0.1_2_V(1).dat");
    }
}
