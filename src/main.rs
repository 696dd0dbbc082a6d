use clap::Parser;
use screensort::cli::{Args, run_cli_with_options};
use screensort::logging;
use screensort::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage errors exit 1; --help and --version go to stdout and exit 0.
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    logging::init(args.verbose);

    match run_cli_with_options(args.command(), &args.directory, &args.options()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {:#}", e));
            ExitCode::from(1)
        }
    }
}
