use std::env;
use std::process::ExitCode;

use tracing::error;

mod app;

use app::bootstrap::{self, CliCommand};

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let options = match bootstrap::parse_cli_args(&args) {
        Ok(CliCommand::Help) => {
            println!("{}", bootstrap::usage_text());
            return ExitCode::SUCCESS;
        }
        Ok(CliCommand::Run(options)) => options,
        Err(message) => {
            eprintln!("{message}\n\n{}", bootstrap::usage_text());
            return ExitCode::from(2);
        }
    };

    match bootstrap::build_app(options) {
        Ok(wiring) => app::loop_runner::run(wiring),
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}
