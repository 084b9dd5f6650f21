//! User settings and change notification.

use std::{
    mem,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use synced_doc::{Document, SyncedDocument, TomlCodec, default_settle_delay};
use tracing::debug;

use crate::Result;

/// Largest accepted update-check interval, in hours.
pub const MAX_CHECK_DELAY_HOURS: i64 = 1000;

/// Update checker options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoUpdateSettings {
    /// Check for new releases periodically.
    pub check_for_updates: bool,
    /// Hours between checks, counted from the previous check.
    pub check_delay_hours: i64,
}

impl Default for AutoUpdateSettings {
    fn default() -> Self {
        Self {
            check_for_updates: true,
            check_delay_hours: 24,
        }
    }
}

impl AutoUpdateSettings {
    /// Interval between checks.
    pub fn check_delay(&self) -> Duration {
        let hours = u64::try_from(self.check_delay_hours).unwrap_or(1);
        Duration::from_secs(hours * 3600)
    }
}

/// File synchronization timing. Read at startup; changes apply after a
/// restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSyncSettings {
    /// Quiet period after our own writes during which watch events are dropped.
    pub settle_delay_ms: u64,
    /// How long a burst of external events must be quiet before reloading.
    pub debounce_ms: u64,
}

impl Default for FileSyncSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: u64::try_from(default_settle_delay().as_millis()).unwrap_or(500),
            debounce_ms: 100,
        }
    }
}

impl FileSyncSettings {
    /// Settle delay as a duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Debounce as a duration.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Contents of `settings.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Update checker.
    pub auto_update: AutoUpdateSettings,
    /// File synchronization.
    pub file_sync: FileSyncSettings,
}

impl Document for UserSettings {
    fn normalize(mut self) -> Self {
        let hours = self.auto_update.check_delay_hours.saturating_abs();
        self.auto_update.check_delay_hours = if hours == 0 {
            1
        } else {
            hours.min(MAX_CHECK_DELAY_HOURS)
        };
        self
    }
}

/// The settings file.
pub type SettingsDocument = SyncedDocument<UserSettings, TomlCodec>;

/// Compares old and new settings and calls its handler on a change.
type ChangeHandler = Arc<dyn Fn(&UserSettings, &UserSettings) + Send + Sync>;

/// Owns the settings document and dispatches option change handlers.
pub struct SettingsController {
    /// Backing document.
    doc: Arc<SettingsDocument>,
    /// Values handlers last saw.
    previous: Mutex<UserSettings>,
    /// Registered handlers.
    handlers: Mutex<Vec<ChangeHandler>>,
}

impl SettingsController {
    /// Wrap `doc`; reloads of the document dispatch change handlers.
    pub fn new(doc: Arc<SettingsDocument>) -> Arc<Self> {
        let controller = Arc::new(Self {
            previous: Mutex::new(doc.get()),
            doc: doc.clone(),
            handlers: Mutex::new(Vec::new()),
        });
        let weak: Weak<Self> = Arc::downgrade(&controller);
        doc.set_on_reloaded(move |settings| {
            if let Some(controller) = weak.upgrade() {
                controller.dispatch(settings);
            }
        });
        controller
    }

    /// Current settings.
    pub fn settings(&self) -> UserSettings {
        self.doc.get()
    }

    /// Backing document.
    pub fn document(&self) -> &Arc<SettingsDocument> {
        &self.doc
    }

    /// Call `handler` with the selected value whenever it changes. With
    /// `initial`, also call it once now with the current value.
    pub fn add_option_change_handler<T, S, H>(&self, select: S, handler: H, initial: bool)
    where
        T: PartialEq + 'static,
        S: Fn(&UserSettings) -> T + Send + Sync + 'static,
        H: Fn(T) + Send + Sync + 'static,
    {
        if initial {
            handler(select(&self.settings()));
        }
        self.handlers.lock().push(Arc::new(move |old, new| {
            let value = select(new);
            if select(old) != value {
                handler(value);
            }
        }));
    }

    /// Modify the settings, write them and notify handlers.
    pub fn update(&self, f: impl FnOnce(&mut UserSettings)) -> Result<()> {
        self.doc.update(|s| {
            f(s);
            *s = s.clone().normalize();
        });
        self.doc.save()?;
        self.dispatch(&self.doc.get());
        Ok(())
    }

    /// Run handlers for the difference between the last seen and `new`.
    fn dispatch(&self, new: &UserSettings) {
        let old = mem::replace(&mut *self.previous.lock(), new.clone());
        if old == *new {
            return;
        }
        debug!("settings changed");
        let handlers = self.handlers.lock().clone();
        for handler in handlers {
            handler(&old, new);
        }
    }
}
