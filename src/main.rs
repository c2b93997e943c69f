//! packsmith - artifact layout engine

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = packsmith::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
