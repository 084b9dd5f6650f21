//! Inversion manager: toggles a screen color filter as window focus changes.
//!
//! Three execution contexts cooperate:
//!
//! - the focus hook thread, which resolves windows and asks the rule engine
//!   for a decision without waiting on anything else;
//! - a single-threaded tokio runtime for interrupt handling and update checks;
//! - the main thread, which runs the [`main_exec::MainExecutor`] loop and is
//!   the only place rules, settings and the color filter are mutated.

/// Process lifecycle.
mod app;
/// Named color matrices.
mod catalog;
/// Color filter seam and main-thread routing.
mod color_filter;
/// Component wiring.
mod context;
mod error;
/// User settings and change handlers.
mod settings;
/// Shutdown sequence.
mod shutdown;
/// Focus event to filter decision glue.
mod state;
/// Update checker.
mod update;

pub use app::{RunOptions, platform_window_system, run};
pub use catalog::{ColorMatrix, FilterCatalog, FilterCatalogController, FilterCatalogDocument};
pub use color_filter::{ColorFilter, FilterState, LoggingColorFilter, MainThreadFilter};
pub use context::{AppContext, AppPaths};
pub use error::{Error, Result};
pub use settings::{
    AutoUpdateSettings, FileSyncSettings, MAX_CHECK_DELAY_HOURS, SettingsController,
    SettingsDocument, UserSettings,
};
pub use shutdown::ShutdownManager;
pub use state::{ControllerState, FilterStateController, RECENT_WINDOWS};
pub use update::{NoReleases, Release, ReleaseSource, UpdateChecker, UpdateError, Version};
