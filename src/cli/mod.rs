//! Command-line interface implementation
//!
//! This module provides the `rgx` entry point and dispatches to submodules
//! for specific command implementations.

mod bundle;
mod check;
mod export;
mod inspect;
mod list;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use glob::glob;

use crate::config::{self, CliOverrides, LogLevel, ResgraphConfig};
use crate::loader::{LoadError, Loader};
use crate::registry::Registry;
use crate::resource::ResourceRef;
use crate::tags::TypeTable;

pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// rgx - Load, check and bundle resource definition documents
#[derive(Parser)]
#[command(name = "rgx")]
#[command(about = "rgx - Load, check and bundle resource definition documents")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: discover resgraph.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Define a property for ifdef/ifndef (KEY=VALUE, repeatable)
    #[arg(short = 'D', long = "define", global = true, value_name = "KEY=VALUE")]
    pub defines: Vec<String>,

    /// Reload names declared more than once instead of failing
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load documents and create every resource, reporting failures
    ///
    /// Entries marked autoCreated are created first, as at startup.
    Check {
        /// Documents or directories to load
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// List the resources declared by documents
    List {
        /// Documents or directories to load
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Only list resources of this type (or a subtype)
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the loaded resources back out as one markup document
    Export {
        /// Documents or directories to load
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Persist the loaded resources as a binary bundle
    Bundle {
        /// Documents or directories to load
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output bundle file
        #[arg(short, long)]
        output: PathBuf,

        /// Write named dependencies by reference
        #[arg(long)]
        run_mode: bool,

        /// Create every resource before saving so all are recreated on load
        ///
        /// Entries marked autoCreated are always created.
        #[arg(long)]
        create: bool,
    },

    /// Show the contents of a bundle
    Inspect {
        /// Bundle file
        bundle: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Load the bundle into a fresh registry to check its references
        #[arg(long)]
        verify: bool,
    },
}

/// A registry and type table configured from `resgraph.toml`.
pub(crate) struct Session {
    pub config: ResgraphConfig,
    pub registry: Registry,
    pub types: TypeTable,
}

impl Session {
    pub fn new(config: ResgraphConfig) -> Self {
        let registry = Registry::with_options(config.registry_options());
        Self { config, registry, types: TypeTable::with_builtin() }
    }

    /// Load each input in order; later documents see earlier declarations.
    pub fn load(&mut self, inputs: &[PathBuf]) -> Result<Vec<ResourceRef>, LoadError> {
        let mut loader = Loader::new(&mut self.registry, &mut self.types)
            .overwrite(self.config.loader.overwrite)
            .extensions(self.config.loader.extensions.clone())
            .properties(self.config.properties.clone());

        let mut loaded = Vec::new();
        for path in inputs {
            loaded.extend(loader.load_file(path)?);
        }
        Ok(loaded)
    }
}

/// Expand directories into the documents they contain (recursively).
///
/// Files are kept as given; a path that does not exist is an error.
pub fn collect_inputs(paths: &[PathBuf], extensions: &[String]) -> Result<Vec<PathBuf>, String> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = find_documents(path, extensions);
            if found.is_empty() {
                log::warn!("no documents found in '{}'", path.display());
            }
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(format!("'{}' does not exist", path.display()));
        }
    }
    Ok(files)
}

fn find_documents(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let dir_str = dir.display().to_string();
    for ext in extensions {
        if let Ok(paths) = glob(&format!("{}/**/*.{}", dir_str, ext)) {
            files.extend(paths.filter_map(Result::ok));
        }
    }
    files
}

fn init_logging(level: LogLevel) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level.to_filter()).format_timestamp(None).parse_default_env();
    if builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
}

fn overrides(cli: &Cli) -> Result<CliOverrides, String> {
    let defines =
        cli.defines.iter().map(|raw| config::parse_define(raw)).collect::<Result<Vec<_>, _>>()?;
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => Some(LogLevel::Error),
        (false, 0) => None,
        (false, 1) => Some(LogLevel::Debug),
        (false, _) => Some(LogLevel::Trace),
    };
    let run_mode = match &cli.command {
        Commands::Bundle { run_mode: true, .. } => Some(true),
        _ => None,
    };
    Ok(CliOverrides { run_mode, overwrite: cli.overwrite.then_some(true), defines, log_level })
}

/// Error displays already embed their source.
pub(crate) fn report_error(error: &dyn std::error::Error) {
    eprintln!("Error: {}", error);
}

/// Build a session and load `inputs` into it, printing any failure.
pub(crate) fn load_session(
    config: ResgraphConfig,
    inputs: &[PathBuf],
) -> Result<(Session, Vec<ResourceRef>), ExitCode> {
    let files = collect_inputs(inputs, &config.loader.extensions).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })?;

    let mut session = Session::new(config);
    match session.load(&files) {
        Ok(loaded) => Ok((session, loaded)),
        Err(e) => {
            report_error(&e);
            Err(ExitCode::from(EXIT_ERROR))
        }
    }
}

/// Run the CLI application
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let overrides = match overrides(&cli) {
        Ok(overrides) => overrides,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    config::merge_cli_overrides(&mut config, &overrides);
    init_logging(config.log.level);

    match cli.command {
        Commands::Check { inputs } => check::run_check(config, &inputs),
        Commands::List { inputs, type_name, json } => {
            list::run_list(config, &inputs, type_name.as_deref(), json)
        }
        Commands::Export { inputs, output } => {
            export::run_export(config, &inputs, output.as_deref())
        }
        Commands::Bundle { inputs, output, create, .. } => {
            bundle::run_bundle(config, &inputs, &output, create)
        }
        Commands::Inspect { bundle, json, verify } => {
            inspect::run_inspect(config, &bundle, json, verify)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rgx", "bundle", "a.xml", "-o", "out.bin", "--run-mode", "-D", "platform=mobile",
            "--overwrite",
        ])
        .unwrap();

        let overrides = overrides(&cli).unwrap();
        assert_eq!(overrides.run_mode, Some(true));
        assert_eq!(overrides.overwrite, Some(true));
        assert_eq!(overrides.defines, vec![("platform".to_string(), "mobile".to_string())]);
        assert_eq!(overrides.log_level, None);
    }

    #[test]
    fn test_verbosity_maps_to_log_level() {
        let cli = Cli::try_parse_from(["rgx", "check", "a.xml", "-vv"]).unwrap();
        assert_eq!(overrides(&cli).unwrap().log_level, Some(LogLevel::Trace));

        let cli = Cli::try_parse_from(["rgx", "check", "a.xml", "-q"]).unwrap();
        assert_eq!(overrides(&cli).unwrap().log_level, Some(LogLevel::Error));
    }

    #[test]
    fn test_bad_define_rejected() {
        let cli = Cli::try_parse_from(["rgx", "check", "a.xml", "-D", "=oops"]).unwrap();
        assert!(overrides(&cli).is_err());
    }

    #[test]
    fn test_collect_inputs_expands_directories() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("ui");
        fs::create_dir(&nested).unwrap();
        fs::write(temp.path().join("b.xml"), "<resources/>").unwrap();
        fs::write(nested.join("a.xml"), "<resources/>").unwrap();
        fs::write(temp.path().join("notes.txt"), "").unwrap();

        let files = collect_inputs(&[temp.path().to_path_buf()], &["xml".to_string()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "xml")));
    }

    #[test]
    fn test_collect_inputs_missing_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.xml");
        assert!(collect_inputs(&[missing], &["xml".to_string()]).is_err());
    }

    #[test]
    fn test_session_applies_config() {
        let temp = TempDir::new().unwrap();
        let doc = temp.path().join("doc.xml");
        fs::write(
            &doc,
            r#"<resources>
  <ifdef key="platform" value="mobile">
    <colormap name="mobile_colors"/>
  </ifdef>
  <colormap name="base"/>
</resources>"#,
        )
        .unwrap();

        let mut config = ResgraphConfig::default();
        config.properties.insert("platform".to_string(), "mobile".to_string());
        let mut session = Session::new(config);
        let loaded = session.load(&[doc]).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(session.registry.exists("Mobile_Colors"));
    }
}
