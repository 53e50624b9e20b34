pub mod cli;
pub mod commands;
pub mod dc_sweep;
pub mod error;
pub mod mna;
pub mod netlist;
pub mod node_table;
pub mod output;
pub mod parser;
pub mod run;
pub mod solver;
pub mod system;
pub mod transient;
pub mod waveform;

pub use error::SpicError;
pub use parser::{parse_file, parse_netlist, ParsedNetlist};
pub use run::run;

pub type Result<T> = anyhow::Result<T>;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
