#![warn(missing_docs)]

//! Tracing setup shared by the inversion-manager binaries.
//!
//! Filter precedence, first match wins:
//! `--log-filter`, then `--trace`/`--debug`/`--log-level` (applied to our
//! crates only), then `RUST_LOG`, then `info` for our crates.

use std::{env, fmt as stdfmt};

use clap::{Args, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crate targets whose logs the level flags control.
pub const OUR_CRATES: &[&str] = &[
    "inversion_manager",
    "filter_rules",
    "synced_doc",
    "main_exec",
    "win_focus_watcher",
    "logging",
];

/// Verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Normal operation.
    Info,
    /// Decisions and reloads.
    Debug,
    /// Every focus event.
    Trace,
}

impl LogLevel {
    /// Directive spelling of the level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Directive string setting this level for every crate in [`OUR_CRATES`].
    pub fn scoped(self) -> String {
        OUR_CRATES
            .iter()
            .map(|krate| format!("{krate}={}", self.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Where the active filter came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSource {
    /// `--log-filter`.
    Explicit,
    /// `--trace`, `--debug` or `--log-level`.
    Flags,
    /// The `RUST_LOG` environment variable.
    Environment,
    /// Nothing was given.
    Default,
}

impl stdfmt::Display for FilterSource {
    fn fmt(&self, f: &mut stdfmt::Formatter<'_>) -> stdfmt::Result {
        f.write_str(match self {
            Self::Explicit => "--log-filter",
            Self::Flags => "level flags",
            Self::Environment => "RUST_LOG",
            Self::Default => "default",
        })
    }
}

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Default, Args)]
pub struct LogArgs {
    /// Trace everything in our crates
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Debug output for our crates
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// One level for all of our crates
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Raw tracing filter directive, e.g. "filter_rules=trace,synced_doc=debug"
    #[arg(long, value_name = "DIRECTIVES")]
    pub log_filter: Option<String>,
}

impl LogArgs {
    /// Level requested by the flags, if any.
    fn flag_level(&self) -> Option<LogLevel> {
        if self.trace {
            Some(LogLevel::Trace)
        } else if self.debug {
            Some(LogLevel::Debug)
        } else {
            self.log_level
        }
    }

    /// Pick the filter directive given the value of `RUST_LOG`.
    pub fn resolve(&self, rust_log: Option<String>) -> (String, FilterSource) {
        if let Some(spec) = &self.log_filter {
            return (spec.clone(), FilterSource::Explicit);
        }
        if let Some(level) = self.flag_level() {
            return (level.scoped(), FilterSource::Flags);
        }
        match rust_log.filter(|v| !v.trim().is_empty()) {
            Some(spec) => (spec, FilterSource::Environment),
            None => (LogLevel::Info.scoped(), FilterSource::Default),
        }
    }
}

/// Install the global subscriber: filter plus compact output without timestamps.
///
/// A second call leaves the first subscriber in place.
pub fn init(args: &LogArgs) {
    let (spec, source) = args.resolve(env::var("RUST_LOG").ok());
    let installed = tracing_subscriber::registry()
        .with(EnvFilter::new(&spec))
        .with(fmt::layer().without_time())
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!(%spec, %source, "logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filter_wins() {
        let args = LogArgs {
            log_level: Some(LogLevel::Warn),
            log_filter: Some("synced_doc=trace".into()),
            ..LogArgs::default()
        };
        let (spec, source) = args.resolve(Some("debug".into()));
        assert_eq!(spec, "synced_doc=trace");
        assert_eq!(source, FilterSource::Explicit);
    }

    #[test]
    fn level_is_scoped_to_our_crates() {
        let spec = LogLevel::Warn.scoped();
        for krate in OUR_CRATES {
            assert!(spec.contains(&format!("{krate}=warn")), "{spec}");
        }
        assert!(!spec.contains("notify"));
    }

    #[test]
    fn debug_flag_beats_environment() {
        let args = LogArgs {
            debug: true,
            ..LogArgs::default()
        };
        let (spec, source) = args.resolve(Some("trace".into()));
        assert_eq!(spec, LogLevel::Debug.scoped());
        assert_eq!(source, FilterSource::Flags);
    }

    #[test]
    fn blank_environment_falls_back_to_info() {
        let args = LogArgs::default();
        assert_eq!(
            args.resolve(Some("notify=warn".into())).1,
            FilterSource::Environment
        );
        let (spec, source) = args.resolve(Some("  ".into()));
        assert_eq!(spec, LogLevel::Info.scoped());
        assert_eq!(source, FilterSource::Default);
    }
}
