//! Color filter seam.
//!
//! The OS color filter API is thread-affine, so production calls go through
//! [`MainThreadFilter`], which forwards to the main executor.

use std::sync::Arc;

use main_exec::{DEFAULT_PRIORITY, MainExecutor, SHUTDOWN_PRIORITY};
use parking_lot::Mutex;
use tracing::info;

use crate::ColorMatrix;

/// Side effects on the screen color filter.
pub trait ColorFilter: Send + Sync {
    /// Turn the filter on or off.
    fn set_filter_state(&self, enabled: bool);

    /// Choose the effect used while the filter is on: `matrix` is the
    /// catalogue entry named `filter`, applied at `opacity`.
    fn select_effect(&self, filter: &str, matrix: &ColorMatrix, opacity: f32);

    /// Turn the filter off and release the OS effect. Called once at exit.
    fn dispose(&self);
}

/// Snapshot of what a [`LoggingColorFilter`] has been told.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Filter on or off.
    pub enabled: bool,
    /// Last selected effect.
    pub effect: Option<String>,
    /// Last selected opacity.
    pub opacity: f32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            enabled: false,
            effect: None,
            opacity: 1.0,
        }
    }
}

/// Filter that records and logs state changes instead of touching the OS.
#[derive(Debug, Default)]
pub struct LoggingColorFilter {
    /// Current state.
    state: Mutex<FilterState>,
}

impl LoggingColorFilter {
    /// Filter starting off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> FilterState {
        self.state.lock().clone()
    }
}

impl ColorFilter for LoggingColorFilter {
    fn set_filter_state(&self, enabled: bool) {
        let mut state = self.state.lock();
        if state.enabled != enabled {
            info!(enabled, effect = ?state.effect, "color filter toggled");
            state.enabled = enabled;
        }
    }

    fn select_effect(&self, filter: &str, matrix: &ColorMatrix, opacity: f32) {
        let mut state = self.state.lock();
        if state.effect.as_deref() != Some(filter) || state.opacity != opacity {
            info!(filter, opacity, %matrix, "color filter effect selected");
            state.effect = Some(filter.to_string());
            state.opacity = opacity;
        }
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        info!(was_enabled = state.enabled, "color filter released");
        state.enabled = false;
    }
}

/// Routes every call to the main thread.
pub struct MainThreadFilter {
    /// Filter that performs the effect.
    inner: Arc<dyn ColorFilter>,
    /// Main-thread queue.
    executor: MainExecutor,
}

impl MainThreadFilter {
    /// Wrap `inner` so it only runs on `executor`'s thread.
    pub fn new(inner: Arc<dyn ColorFilter>, executor: MainExecutor) -> Self {
        Self { inner, executor }
    }
}

impl ColorFilter for MainThreadFilter {
    fn set_filter_state(&self, enabled: bool) {
        let inner = self.inner.clone();
        self.executor
            .run_on_main(DEFAULT_PRIORITY, move || inner.set_filter_state(enabled));
    }

    fn select_effect(&self, filter: &str, matrix: &ColorMatrix, opacity: f32) {
        let inner = self.inner.clone();
        let filter = filter.to_string();
        let matrix = *matrix;
        self.executor.run_on_main(DEFAULT_PRIORITY, move || {
            inner.select_effect(&filter, &matrix, opacity);
        });
    }

    /// Queued at [`SHUTDOWN_PRIORITY`] so it still runs when the executor
    /// closes right after.
    fn dispose(&self) {
        let inner = self.inner.clone();
        self.executor
            .run_on_main(SHUTDOWN_PRIORITY, move || inner.dispose());
    }
}
