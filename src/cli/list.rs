//! List command

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::ResgraphConfig;
use crate::resource::ResourceCell;

use super::{load_session, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

#[derive(Debug, Serialize)]
struct ListEntry {
    name: String,
    #[serde(rename = "type")]
    type_name: &'static str,
    locked: bool,
    auto_created: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    inherit: Option<String>,
    /// Dependency slot -> declared name (owned children show as `null`)
    dependencies: BTreeMap<&'static str, Option<String>>,
}

impl ListEntry {
    fn from_cell(cell: &ResourceCell) -> Self {
        let header = cell.header();
        let mut dependencies = BTreeMap::new();
        if let Some(body) = cell.body() {
            for (attribute, dep) in body.properties().dependencies() {
                if dep.is_set() {
                    dependencies.insert(attribute, dep.name.clone());
                }
            }
        }
        Self {
            name: cell.label(),
            type_name: cell.type_name(),
            locked: header.locked,
            auto_created: header.auto_created,
            inherit: header.inherit.clone(),
            dependencies,
        }
    }
}

/// Execute the list command
pub fn run_list(
    config: ResgraphConfig,
    inputs: &[PathBuf],
    type_name: Option<&str>,
    json: bool,
) -> ExitCode {
    let (session, _) = match load_session(config, inputs) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };

    let cells = match type_name {
        None => session.registry.list(),
        Some(name) => match session.types.type_info(name) {
            Some(info) => session.registry.list_of(info.schema),
            None => {
                eprintln!("Error: unknown type '{}'", name);
                eprintln!("Known types: {}", session.types.type_names().join(", "));
                return ExitCode::from(EXIT_INVALID_ARGS);
            }
        },
    };

    let entries: Vec<ListEntry> = cells.iter().map(|cell| ListEntry::from_cell(cell)).collect();

    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
        return ExitCode::from(EXIT_SUCCESS);
    }

    for entry in &entries {
        let mut line = format!("{:<24} {}", entry.name, entry.type_name);
        if let Some(template) = &entry.inherit {
            line.push_str(&format!(" (inherits {})", template));
        }
        if entry.locked {
            line.push_str(" [locked]");
        }
        println!("{}", line);
        for (attribute, name) in &entry.dependencies {
            println!("    {} -> {}", attribute, name.as_deref().unwrap_or("<inline>"));
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}
