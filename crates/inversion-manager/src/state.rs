//! Focus events in, filter side effects out.

use std::{collections::VecDeque, sync::Arc};

use filter_rules::{Decision, RuleEngine};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use win_focus_watcher::{FocusEvent, WindowInfo, WindowInfoResolver};

use crate::{ColorFilter, FilterCatalogController};

/// How many resolved windows are kept for window pickers.
pub const RECENT_WINDOWS: usize = 10;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Waiting for a focus event.
    Idle,
    /// Evaluating rules for a resolved window.
    Deciding,
}

/// Turns focus events into rule decisions and filter calls.
///
/// `handle_event` runs on the focus hook thread; it reads the engine without
/// waiting on the main thread.
pub struct FilterStateController {
    /// Handle to snapshot.
    resolver: WindowInfoResolver,
    /// Rule evaluation.
    engine: Arc<RuleEngine>,
    /// Side effect target.
    filter: Arc<dyn ColorFilter>,
    /// Effects by name.
    catalog: Arc<FilterCatalogController>,
    /// Current state.
    state: Mutex<ControllerState>,
    /// Recently resolved windows, newest first.
    recent: Mutex<VecDeque<WindowInfo>>,
}

impl FilterStateController {
    /// Create an idle controller.
    pub fn new(
        resolver: WindowInfoResolver,
        engine: Arc<RuleEngine>,
        filter: Arc<dyn ColorFilter>,
        catalog: Arc<FilterCatalogController>,
    ) -> Self {
        Self {
            resolver,
            engine,
            filter,
            catalog,
            state: Mutex::new(ControllerState::Idle),
            recent: Mutex::new(VecDeque::with_capacity(RECENT_WINDOWS)),
        }
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    /// Process one focus event. Returns the decision, or `None` when the
    /// window could not be resolved.
    pub fn handle_event(&self, event: FocusEvent) -> Option<Decision> {
        let Some(info) = self.resolver.resolve(event.window) else {
            trace!(?event, "unresolved focus event");
            return None;
        };
        self.remember(info.clone());
        Some(self.decide_and_apply(&info))
    }

    /// Re-evaluate the last active window, e.g. after the rules changed.
    pub fn refresh(&self) -> Option<Decision> {
        let info = self.last_active_window()?;
        Some(self.decide_and_apply(&info))
    }

    /// Recently resolved windows, newest first.
    pub fn recent_windows(&self) -> Vec<WindowInfo> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Most recently resolved window.
    pub fn last_active_window(&self) -> Option<WindowInfo> {
        self.recent.lock().front().cloned()
    }

    /// Deciding, then back to idle.
    fn decide_and_apply(&self, info: &WindowInfo) -> Decision {
        *self.state.lock() = ControllerState::Deciding;
        let decision = self.engine.decide(info);
        debug!(window = %info.handle, path = %info.path, ?decision, "focus decision");
        self.apply(&decision);
        *self.state.lock() = ControllerState::Idle;
        decision
    }

    /// Perform the side effect for `decision`. An effect missing from the
    /// catalogue turns the filter off.
    fn apply(&self, decision: &Decision) {
        match decision {
            Decision::NoOp => {}
            Decision::Off => self.filter.set_filter_state(false),
            Decision::On { filter, opacity } => match self.catalog.matrix(filter) {
                Some(matrix) => {
                    self.filter.select_effect(filter, &matrix, *opacity);
                    self.filter.set_filter_state(true);
                }
                None => {
                    warn!(filter = %filter, "unknown color filter; turning the filter off");
                    self.filter.set_filter_state(false);
                }
            },
        }
    }

    /// Push `info` to the front of the ring, replacing an older entry for
    /// the same window.
    fn remember(&self, info: WindowInfo) {
        let mut recent = self.recent.lock();
        recent.retain(|w| w.handle != info.handle);
        recent.push_front(info);
        recent.truncate(RECENT_WINDOWS);
    }
}
