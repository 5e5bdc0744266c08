//! The `hdat` binary.

use std::process::ExitCode;

fn main() -> ExitCode {
    match hdat_cli::demo::registry() {
        Ok(registry) => hdat_cli::run_with_registry(registry, std::env::args_os()),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
