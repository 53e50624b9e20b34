//! `Commands`: everything parsed out of the netlist besides the circuit
//! itself — run options, DC sweeps, transient analyses, and the print/plot
//! node lists. Built once during parse and read-only thereafter.

use crate::error::SpicError;
use crate::netlist::Netlist;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientMethod {
    BackwardEuler,
    Trapezoidal,
}

impl Default for TransientMethod {
    fn default() -> Self {
        TransientMethod::BackwardEuler
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// Use the hand-rolled numeric kernel instead of the library one.
    pub custom: bool,
    /// Matrix is symmetric positive-definite: selects Cholesky or CG.
    pub spd: bool,
    /// Use an iterative method (CG/BiCG) instead of a direct one.
    pub iter: bool,
    pub sparse: bool,
    pub itol: f64,
    pub transient_method: TransientMethod,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            custom: false,
            spd: false,
            iter: false,
            sparse: false,
            itol: 1e-3,
            transient_method: TransientMethod::BackwardEuler,
        }
    }
}

impl Options {
    /// Rejects option combinations that can never be satisfied by any
    /// kernel in this crate's solver: custom direct (LU/Cholesky) kernels
    /// only operate on dense storage.
    pub fn validate(&self) -> Result<(), SpicError> {
        if self.sparse && self.custom && !self.iter {
            return Err(SpicError::Config(
                "sparse + custom + direct (LU/Cholesky) is unsupported: custom direct kernels are dense-only"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Voltage,
    Current,
}

#[derive(Debug, Clone)]
pub struct DcSweepSpec {
    pub kind: SweepKind,
    pub source_name: String,
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct TransientSpec {
    pub time_step: f64,
    pub fin_time: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Commands {
    pub options: Options,
    pub v_sweeps: Vec<DcSweepSpec>,
    pub i_sweeps: Vec<DcSweepSpec>,
    pub transients: Vec<TransientSpec>,
    pub print_nodes: Vec<String>,
    pub plot_nodes: Vec<String>,
}

impl Commands {
    pub fn new(options: Options) -> Self {
        Commands {
            options,
            ..Default::default()
        }
    }

    /// Registers a DC sweep, validating the referenced source exists in
    /// `netlist` right now — a `.DC` naming an unknown source is rejected
    /// at registration time, never discovered later in the sweep loop.
    pub fn add_dc_sweep(&mut self, spec: DcSweepSpec, netlist: &Netlist) -> Result<(), SpicError> {
        let found = match spec.kind {
            SweepKind::Voltage => netlist.voltage_sources.find_element_name(&spec.source_name),
            SweepKind::Current => netlist.current_sources.find_element_name(&spec.source_name),
        };
        if found.is_none() {
            return Err(SpicError::UnknownSource(spec.source_name));
        }
        match spec.kind {
            SweepKind::Voltage => self.v_sweeps.push(spec),
            SweepKind::Current => self.i_sweeps.push(spec),
        }
        Ok(())
    }

    /// Union of print and plot node names, de-duplicated, in first-seen
    /// order (print nodes first).
    pub fn output_nodes(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for node in self.print_nodes.iter().chain(self.plot_nodes.iter()) {
            if seen.insert(node.clone()) {
                out.push(node.clone());
            }
        }
        out
    }
}
