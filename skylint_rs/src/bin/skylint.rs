use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;

use skylint::args::Args;
use skylint::cli;

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::from(1);
        }
    };

    match cli::entrypoint(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("skylint: {err:#}");
            ExitCode::from(1)
        }
    }
}
