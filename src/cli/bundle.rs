//! Bundle command: persist loaded resources

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::ResgraphConfig;

use super::{load_session, report_error, EXIT_ERROR, EXIT_SUCCESS};

/// Execute the bundle command
pub fn run_bundle(
    config: ResgraphConfig,
    inputs: &[PathBuf],
    output: &Path,
    create: bool,
) -> ExitCode {
    let (session, _) = match load_session(config, inputs) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let registry = &session.registry;
    let created = registry
        .create_auto_created()
        .and_then(|_| if create { registry.create_all() } else { Ok(()) });
    if let Err(e) = created {
        report_error(&e);
        return ExitCode::from(EXIT_ERROR);
    }

    let file = match File::create(output) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error: cannot create '{}': {}", output.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let mut writer = BufWriter::new(file);
    let result = session.registry.save(&mut writer).and_then(|_| Ok(writer.flush()?));
    if let Err(e) = result {
        report_error(&e);
        return ExitCode::from(EXIT_ERROR);
    }

    let mode = if session.config.registry.run_mode { "run" } else { "definition" };
    eprintln!(
        "Bundled {} resources to {} ({} mode)",
        session.registry.len(),
        output.display(),
        mode
    );
    ExitCode::from(EXIT_SUCCESS)
}
