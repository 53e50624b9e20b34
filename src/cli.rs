//! Command-line surface (component L): a `clap`-derived argument set that
//! can override (or, with `--bypass_options`, entirely replace) the run
//! options parsed out of the netlist's `.OPTIONS` line.

use clap::{Parser, ValueEnum};

use crate::commands::{Options, TransientMethod};

#[derive(Parser, Debug)]
#[command(name = "spic", about = "Modified-nodal-analysis circuit simulator", version)]
pub struct Cli {
    /// Path to the input netlist file.
    pub input: String,

    /// Output directory; created if missing, wiped if it already exists.
    #[arg(long)]
    pub output_dir: String,

    /// Ignore the netlist's `.OPTIONS` line and take options from the flags below.
    #[arg(long)]
    pub bypass_options: bool,

    #[arg(long)]
    pub disable_dc_sweeps: bool,

    #[arg(long)]
    pub spd: bool,

    #[arg(long)]
    pub custom: bool,

    #[arg(long)]
    pub sparse: bool,

    #[arg(long)]
    pub iter: bool,

    #[arg(long)]
    pub itol: Option<f64>,

    #[arg(long, value_enum)]
    pub transient_method: Option<CliTransientMethod>,

    /// Repeatable: absent is warnings and errors only, one is info, two or more is debug.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CliTransientMethod {
    Be,
    Tr,
}

impl From<CliTransientMethod> for TransientMethod {
    fn from(value: CliTransientMethod) -> Self {
        match value {
            CliTransientMethod::Be => TransientMethod::BackwardEuler,
            CliTransientMethod::Tr => TransientMethod::Trapezoidal,
        }
    }
}

/// Maps `-v` repeat count to an `env_logger` filter level.
pub fn verbosity_filter(count: u8) -> log::LevelFilter {
    match count {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    }
}

/// Applies CLI flags on top of `options` (parsed from the netlist's
/// `.OPTIONS` line, or defaulted). With `--bypass_options`, the netlist's
/// settings are discarded first so only CLI flags (and defaults) remain.
pub fn apply_overrides(cli: &Cli, options: &mut Options) {
    if cli.bypass_options {
        *options = Options::default();
    }
    if cli.spd {
        options.spd = true;
    }
    if cli.custom {
        options.custom = true;
    }
    if cli.sparse {
        options.sparse = true;
    }
    if cli.iter {
        options.iter = true;
    }
    if let Some(itol) = cli.itol {
        options.itol = itol;
    }
    if let Some(method) = cli.transient_method {
        options.transient_method = method.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bypass_options_resets_before_applying_flags() {
        let cli = Cli {
            input: "a.cir".to_string(),
            output_dir: "out".to_string(),
            bypass_options: true,
            disable_dc_sweeps: false,
            spd: true,
            custom: false,
            sparse: false,
            iter: false,
            itol: None,
            transient_method: None,
            verbose: 0,
        };
        let mut options = Options {
            custom: true,
            sparse: true,
            iter: true,
            ..Options::default()
        };
        apply_overrides(&cli, &mut options);
        assert!(options.spd);
        assert!(!options.custom);
        assert!(!options.sparse);
    }

    #[test]
    fn verbosity_levels() {
        assert_eq!(verbosity_filter(0), log::LevelFilter::Warn);
        assert_eq!(verbosity_filter(1), log::LevelFilter::Info);
        assert_eq!(verbosity_filter(5), log::LevelFilter::Debug);
    }
}
