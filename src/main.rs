use std::process::ExitCode;

use brrtmatch::cli::{run_cli, Cli};
use brrtmatch::logging::{init_logging_with_config, LogConfig};
use clap::Parser;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging_with_config(&LogConfig::from_env()) {
        eprintln!("warning: {e:#}");
    }

    match run_cli(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
