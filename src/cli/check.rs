//! Check command: load, then create everything

use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::ResgraphConfig;

use super::{load_session, report_error, EXIT_ERROR, EXIT_SUCCESS};

/// Execute the check command
pub fn run_check(config: ResgraphConfig, inputs: &[PathBuf]) -> ExitCode {
    let (session, _) = match load_session(config, inputs) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    // Startup order: entries marked autoCreated come first.
    let auto_created = match session.registry.create_auto_created() {
        Ok(count) => count,
        Err(e) => {
            report_error(&e);
            eprintln!("auto-created resources failed to create");
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let entries = session.registry.entries();
    let mut failures = 0;
    for cell in &entries {
        if let Err(e) = cell.create(&session.registry) {
            report_error(&e);
            failures += 1;
        }
    }

    if failures > 0 {
        eprintln!("{} of {} resources failed to create", failures, entries.len());
        return ExitCode::from(EXIT_ERROR);
    }

    if auto_created > 0 {
        println!("OK: {} resources created ({} auto-created)", entries.len(), auto_created);
    } else {
        println!("OK: {} resources created", entries.len());
    }
    ExitCode::from(EXIT_SUCCESS)
}
