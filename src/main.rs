//! cloudforge - Dependency-aware deployments for Azure Synapse

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = cloudforge::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
