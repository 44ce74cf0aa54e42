use clap::Parser;
use std::process::ExitCode;
use tidywatch::cli::{Cli, run_cli_with_config};
use tidywatch::logging::init_logging;
use tidywatch::output::OutputFormatter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run_cli_with_config(cli.command, cli.config.as_deref()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&e);
            ExitCode::FAILURE
        }
    }
}
