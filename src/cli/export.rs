//! Export command: registry back to markup

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::ResgraphConfig;
use crate::markup::{export_registry, write_document};

use super::{load_session, report_error, EXIT_ERROR, EXIT_SUCCESS};

/// Execute the export command
pub fn run_export(config: ResgraphConfig, inputs: &[PathBuf], output: Option<&Path>) -> ExitCode {
    let (session, _) = match load_session(config, inputs) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let root = export_registry(&session.registry, &session.types);
    let text = match write_document(&root) {
        Ok(text) => text,
        Err(e) => {
            report_error(&e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match output {
        None => println!("{}", text),
        Some(path) => {
            if let Err(e) = fs::write(path, format!("{}\n", text)) {
                eprintln!("Error: cannot write '{}': {}", path.display(), e);
                return ExitCode::from(EXIT_ERROR);
            }
            eprintln!("Exported {} resources to {}", root.children.len(), path.display());
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}
