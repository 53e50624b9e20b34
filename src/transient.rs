//! Transient MNA (component F) and the transient driver (component I):
//! scopes a "transient view" over the DC system, steps it forward in time
//! with Backward Euler or Trapezoidal integration, and restores the DC
//! `G`/`b` on drop no matter how the run ends.

use std::collections::HashMap;

use nalgebra::DVector;

use crate::commands::{Options, TransientMethod, TransientSpec};
use crate::error::SpicError;
use crate::mna::{self, MnaLayout};
use crate::netlist::Netlist;
use crate::node_table::NodeTable;
use crate::solver::Solver;
use crate::system::{AMatrix, MnaSystem};

/// Builds the source vector `e(t)`: current sources stamp the RHS the same
/// way the DC assembler does, voltage sources assign their branch row
/// directly. Each source's waveform (if any) is evaluated at `t`;
/// otherwise its DC value is used.
fn build_source_vector(netlist: &Netlist, layout: &MnaLayout, t: f64) -> DVector<f64> {
    let mut e = DVector::zeros(layout.n);
    for i in netlist.current_sources.iter() {
        let value = i.value_at(t);
        if let Some(pr) = layout.node_row(i.pos) {
            e[pr] -= value;
        }
        if let Some(nr) = layout.node_row(i.neg) {
            e[nr] += value;
        }
    }
    for (k, v) in netlist.voltage_sources.iter().enumerate() {
        e[layout.voltage_branch_row(k)] = v.value_at(t);
    }
    e
}

/// RAII guard: saves `G` (current `A`) and the DC `b`, builds the
/// companion `C` matrix, and restores `G`/`b` into the system on drop.
pub struct TransientView<'a> {
    system: &'a mut MnaSystem,
    g: AMatrix,
    b_dc: DVector<f64>,
    c: AMatrix,
}

impl<'a> TransientView<'a> {
    pub fn enter(system: &'a mut MnaSystem, netlist: &Netlist, layout: &MnaLayout) -> Self {
        let g = system.clone_a();
        let b_dc = system.b().clone();
        let c_system = mna::assemble_companion(netlist, layout, system.is_sparse());
        let c = c_system.clone_a();
        TransientView { system, g, b_dc, c }
    }

    /// `A ← G + C/h` (Backward Euler) or `A ← G + (2/h)·C` (Trapezoidal).
    pub fn form_step_operator(&mut self, method: TransientMethod, h: f64) {
        let scale = match method {
            TransientMethod::BackwardEuler => 1.0 / h,
            TransientMethod::Trapezoidal => 2.0 / h,
        };
        let a_new = self.g.add_scaled(&self.c, scale);
        self.system.set_a(a_new);
    }

    pub fn c_matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        self.c.matvec(x)
    }

    pub fn g_matvec(&self, x: &DVector<f64>) -> DVector<f64> {
        self.g.matvec(x)
    }

    pub fn system(&mut self) -> &mut MnaSystem {
        self.system
    }
}

impl<'a> Drop for TransientView<'a> {
    fn drop(&mut self) {
        self.system.set_a(self.g.clone());
        *self.system.b_mut() = self.b_dc.clone();
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransientResult {
    pub time: Vec<f64>,
    pub node_voltages: HashMap<String, Vec<f64>>,
}

/// Runs one `.TRAN` analysis end to end: enters the transient view, solves
/// the `t=0` operating point, forms the step operator once, then steps
/// forward recording the requested output nodes.
pub fn run_transient(
    system: &mut MnaSystem,
    netlist: &Netlist,
    node_table: &NodeTable,
    layout: MnaLayout,
    options: &Options,
    spec: TransientSpec,
    output_nodes: &[String],
) -> Result<TransientResult, SpicError> {
    let mut view = TransientView::enter(system, netlist, &layout);

    let e0 = build_source_vector(netlist, &layout, 0.0);
    let mut solver = Solver::new(options, view.system())?;
    let outcome0 = solver.solve(view.system(), &e0)?;
    if !outcome0.converged {
        log::warn!(
            "transient: operating point did not converge (error={}, iterations={})",
            outcome0.error,
            outcome0.iterations
        );
    }

    let h = spec.time_step;
    view.form_step_operator(options.transient_method, h);
    solver = Solver::new(options, view.system())?;

    let mut result = TransientResult::default();
    for name in output_nodes {
        result.node_voltages.insert(name.clone(), Vec::new());
    }

    result.time.push(0.0);
    record_nodes(&mut result, output_nodes, node_table, &layout, &outcome0.x);

    let mut prev_x = outcome0.x;
    let mut prev_e = e0;
    let steps = (spec.fin_time / h).floor() as usize;

    for k in 1..=steps {
        let t = k as f64 * h;
        let e_k = build_source_vector(netlist, &layout, t);

        let b = match options.transient_method {
            TransientMethod::BackwardEuler => &e_k + view.c_matvec(&prev_x) * (1.0 / h),
            TransientMethod::Trapezoidal => {
                &e_k + &prev_e - view.g_matvec(&prev_x) + view.c_matvec(&prev_x) * (2.0 / h)
            }
        };

        let outcome = solver.solve(view.system(), &b)?;
        if !outcome.converged {
            log::warn!(
                "transient: step {} (t={}) did not converge (error={}, iterations={})",
                k,
                t,
                outcome.error,
                outcome.iterations
            );
        }

        result.time.push(t);
        record_nodes(&mut result, output_nodes, node_table, &layout, &outcome.x);

        prev_x = outcome.x;
        prev_e = e_k;
    }

    Ok(result)
}

fn record_nodes(
    result: &mut TransientResult,
    output_nodes: &[String],
    node_table: &NodeTable,
    layout: &MnaLayout,
    x: &DVector<f64>,
) {
    for name in output_nodes {
        let voltage = match node_table.find_node(name).and_then(|id| layout.node_row(id)) {
            Some(row) => x[row],
            None => 0.0,
        };
        result.node_voltages.get_mut(name).unwrap().push(voltage);
    }
}
