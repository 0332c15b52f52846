//! rgx - Command-line tool for loading, checking and bundling resource documents

use std::process::ExitCode;

use resgraph::cli;

fn main() -> ExitCode {
    cli::run()
}
