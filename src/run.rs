//! Run orchestration (component O): parse -> assemble -> solve the DC
//! operating point -> run each `.TRAN` -> run each `.DC` sweep (voltage
//! sweeps before current sweeps, each in declaration order) -> dump perf
//! counters. The single place a fatal [`SpicError`] is allowed to surface
//! to the caller, who maps it to a logged diagnostic and a nonzero exit.

use std::fs;
use std::path::Path;
use std::time::Instant;

use log::warn;

use crate::cli::{apply_overrides, Cli};
use crate::dc_sweep::run_dc_sweep;
use crate::error::SpicError;
use crate::mna;
use crate::output::{write_dc_operating_point, write_dc_sweep_results, write_transient_results};
use crate::parser;
use crate::solver::Solver;
use crate::transient::run_transient;

pub fn run(cli: &Cli) -> Result<(), SpicError> {
    let wallclock_start = Instant::now();

    let mut parsed = parser::parse_file(&cli.input)?;
    apply_overrides(cli, &mut parsed.commands.options);
    parsed.commands.options.validate()?;

    let output_dir = Path::new(&cli.output_dir);
    if output_dir.exists() {
        fs::remove_dir_all(output_dir)?;
    }
    fs::create_dir_all(output_dir)?;
    if let Some(file_name) = Path::new(&cli.input).file_name() {
        fs::copy(&cli.input, output_dir.join(file_name))?;
    }

    let options = parsed.commands.options;
    let (mut system, layout) = mna::assemble_dc(&parsed.netlist, parsed.node_table.len(), options.sparse);
    let b0 = system.b().clone();

    let mut solver = Solver::new(&options, &mut system)?;
    let outcome = solver.solve(&mut system, &b0)?;
    if !outcome.converged {
        warn!(
            "operating point did not converge (error={}, iterations={})",
            outcome.error, outcome.iterations
        );
    }
    write_dc_operating_point(
        &output_dir.join("dc_op.dat"),
        &parsed.node_table,
        &layout,
        &parsed.netlist,
        &outcome.x,
    )?;

    let output_nodes = parsed.commands.output_nodes();

    for spec in &parsed.commands.transients {
        let result = run_transient(
            &mut system,
            &parsed.netlist,
            &parsed.node_table,
            layout,
            &options,
            *spec,
            &output_nodes,
        )?;
        write_transient_results(&output_dir.join("transient"), spec, &result, &output_nodes)?;
    }

    if !cli.disable_dc_sweeps {
        for spec in parsed.commands.v_sweeps.iter().chain(parsed.commands.i_sweeps.iter()) {
            let result = run_dc_sweep(
                &mut system,
                &parsed.netlist,
                &parsed.node_table,
                &layout,
                &mut solver,
                spec,
                &output_nodes,
            )?;
            write_dc_sweep_results(&output_dir.join("dc_sweeps"), spec, &result, &output_nodes)?;
        }
    }

    let wallclock = wallclock_start.elapsed().as_secs_f64();
    solver.dump_perf_counters(&output_dir.join("spic_performance.rpt"), wallclock)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn end_to_end_run_produces_expected_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let netlist_path = dir.path().join("divider.cir");
        {
            let mut f = fs::File::create(&netlist_path).unwrap();
            writeln!(f, "Voltage Divider").unwrap();
            writeln!(f, "V1 1 0 DC 10").unwrap();
            writeln!(f, "R1 1 2 1k").unwrap();
            writeln!(f, "R2 2 0 1k").unwrap();
            writeln!(f, ".DC V1 0 10 1").unwrap();
            writeln!(f, ".PRINT V(2)").unwrap();
            writeln!(f, ".END").unwrap();
        }
        let output_dir = dir.path().join("out");

        let cli = Cli {
            input: netlist_path.to_str().unwrap().to_string(),
            output_dir: output_dir.to_str().unwrap().to_string(),
            bypass_options: false,
            disable_dc_sweeps: false,
            spd: false,
            custom: false,
            sparse: false,
            iter: false,
            itol: None,
            transient_method: None,
            verbose: 0,
        };

        run(&cli).unwrap();

        assert!(output_dir.join("dc_op.dat").exists());
        assert!(output_dir.join("spic_performance.rpt").exists());
        assert!(output_dir.join("divider.cir").exists());
        assert!(output_dir.join("dc_sweeps").join("V1_0_10_1_V(2).dat").exists());
    }
}
