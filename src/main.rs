use clap::Parser;
use colored::Colorize;
use log::error;

use spic::cli::{verbosity_filter, Cli};
use spic::run;

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(verbosity_filter(cli.verbose))
        .init();

    if let Err(e) = run(&cli) {
        error!("{}", format!("{}", e).red());
        std::process::exit(1);
    }
}
