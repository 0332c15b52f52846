//! Inspect command: show a bundle's records

use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

use crate::config::ResgraphConfig;
use crate::persist::{read_stream, PersistMode, Ref, ResourceRecord};

use super::{report_error, Session, EXIT_ERROR, EXIT_SUCCESS};

#[derive(Serialize)]
struct BundleDump<'a> {
    mode: PersistMode,
    records: &'a [ResourceRecord],
}

fn open(path: &Path) -> Result<BufReader<File>, ExitCode> {
    File::open(path).map(BufReader::new).map_err(|e| {
        eprintln!("Error: cannot open '{}': {}", path.display(), e);
        ExitCode::from(EXIT_ERROR)
    })
}

fn print_record(record: &ResourceRecord, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = match (&record.name, record.synthetic) {
        (Some(name), false) => name.as_str(),
        _ => "<anonymous>",
    };
    let mut flags = Vec::new();
    if record.created {
        flags.push("created");
    }
    if record.locked {
        flags.push("locked");
    }
    if record.auto_created {
        flags.push("autoCreated");
    }
    let flags = if flags.is_empty() { String::new() } else { format!(" [{}]", flags.join(", ")) };
    println!("{}{} {}{}", indent, record.type_name, name, flags);

    for (field, value) in &record.values {
        println!("{}  {} = {}", indent, field, value.to_markup());
    }
    if !record.children.is_empty() {
        println!("{}  ({} child elements)", indent, record.children.len());
    }
    for dep in &record.dependencies {
        match &dep.target {
            Some(Ref::ByName(target)) => println!("{}  {} -> {}", indent, dep.attribute, target),
            Some(Ref::Inline(inner)) => {
                println!("{}  {} ->", indent, dep.attribute);
                print_record(inner, depth + 2);
            }
            None => println!(
                "{}  {} -> {} (unresolved)",
                indent,
                dep.attribute,
                dep.name.as_deref().unwrap_or("-")
            ),
        }
    }
}

/// Execute the inspect command
pub fn run_inspect(config: ResgraphConfig, bundle: &Path, json: bool, verify: bool) -> ExitCode {
    let reader = match open(bundle) {
        Ok(reader) => reader,
        Err(code) => return code,
    };
    let stream = match read_stream(reader) {
        Ok(stream) => stream,
        Err(e) => {
            report_error(&e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    if json {
        let doc = BundleDump { mode: stream.mode, records: &stream.records };
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    } else {
        let mode = match stream.mode {
            PersistMode::Definition => "definition",
            PersistMode::Run => "run",
        };
        println!("{}: {} records, {} mode", bundle.display(), stream.records.len(), mode);
        for record in &stream.records {
            print_record(record, 0);
        }
    }

    if verify {
        let reader = match open(bundle) {
            Ok(reader) => reader,
            Err(code) => return code,
        };
        let mut session = Session::new(config);
        match session.registry.load(reader, &session.types) {
            Ok(loaded) => eprintln!("Verified: {} resources loaded", loaded.len()),
            Err(e) => {
                report_error(&e);
                return ExitCode::from(EXIT_ERROR);
            }
        }
    }
    ExitCode::from(EXIT_SUCCESS)
}
