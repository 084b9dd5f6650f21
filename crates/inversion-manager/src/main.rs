//! Binary entrypoint for the inversion manager.
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::{Parser, Subcommand};
use filter_rules::RulesCodec;
use inversion_manager::{
    AppContext, AppPaths, FilterCatalog, LoggingColorFilter, NoReleases, RunOptions,
    platform_window_system,
};
use logging::LogArgs;
use synced_doc::{Codec, YamlCodec};
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "inversion-manager",
    about = "Toggle a screen color filter based on the focused window",
    version
)]
/// Command-line interface for the `inversion-manager` binary.
struct Cli {
    /// Optional subcommand.
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding the rules, settings and filter files
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Rules file (defaults to <data-dir>/inversion_rules.yaml)
    #[arg(long, value_name = "PATH")]
    rules_file: Option<PathBuf>,

    /// Settings file (defaults to <data-dir>/settings.toml)
    #[arg(long, value_name = "PATH")]
    settings_file: Option<PathBuf>,

    /// Color filter catalogue (defaults to <data-dir>/color_filters.yaml)
    #[arg(long, value_name = "PATH")]
    filters_file: Option<PathBuf>,

    /// Do not check for new releases
    #[arg(long)]
    no_update_check: bool,

    /// Logging controls
    #[command(flatten)]
    log: LogArgs,
}

impl Cli {
    /// File locations after applying overrides.
    fn paths(&self) -> AppPaths {
        let data_dir = self
            .data_dir
            .clone()
            .unwrap_or_else(AppPaths::default_data_dir);
        let mut paths = AppPaths::in_dir(data_dir);
        if let Some(rules) = &self.rules_file {
            paths.rules_file.clone_from(rules);
        }
        if let Some(settings) = &self.settings_file {
            paths.settings_file.clone_from(settings);
        }
        if let Some(filters) = &self.filters_file {
            paths.filters_file.clone_from(filters);
        }
        paths
    }
}

#[derive(Subcommand, Debug)]
/// Top-level CLI subcommands.
enum Command {
    /// Validate a rules file then exit.
    Check {
        /// Rules file to check (defaults to the configured rules file)
        path: Option<PathBuf>,

        /// Dump the normalized rules as JSON to stdout
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log);
    let paths = cli.paths();

    match cli.command {
        Some(Command::Check { path, dump }) => check(
            &path.unwrap_or(paths.rules_file),
            &paths.filters_file,
            dump,
        ),
        None => {
            let ctx = AppContext::build(
                paths,
                platform_window_system(),
                Arc::new(LoggingColorFilter::new()),
            );
            let options = RunOptions {
                update_check: !cli.no_update_check,
                release_source: Arc::new(NoReleases),
            };
            match inversion_manager::run(&ctx, options) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "inversion-manager failed");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

/// Catalogue at `path`, or the built-in one when the file does not exist yet.
fn load_catalog(path: &Path) -> Result<FilterCatalog, String> {
    match fs::read_to_string(path) {
        Ok(text) => YamlCodec
            .decode(&text)
            .map_err(|e| format!("{}: not a filter catalogue: {e}", path.display())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FilterCatalog::builtin()),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

/// Report per-entry problems in a rules file, including effects the
/// catalogue at `filters` does not define.
fn check(path: &Path, filters: &Path, dump: bool) -> ExitCode {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            eprintln!("{}: no such file; an empty rule set will be created", path.display());
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let report = match RulesCodec::inspect(&text) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}: not a rules file: {e}", path.display());
            return ExitCode::FAILURE;
        }
    };
    for rejected in &report.rejected {
        eprintln!(
            "{}: rule {:?} ignored: {}",
            path.display(),
            rejected.name,
            rejected.reason
        );
    }
    let unknown = match load_catalog(filters) {
        Ok(catalog) => catalog.unknown_filters(&report.records),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    for (rule, filter) in &unknown {
        eprintln!(
            "{}: rule {rule:?} uses unknown color filter {filter:?}",
            path.display()
        );
    }
    if dump {
        match serde_json::to_string_pretty(&report.records) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("failed to render rules: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}: {} rules OK", path.display(), report.records.0.len());
    }
    if report.rejected.is_empty() && unknown.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
