//! Periodic update check.

use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::{sync::Notify, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::SettingsController;

/// Update check errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    /// The release source could not be queried.
    #[error("release source unavailable: {0}")]
    Source(String),
    /// A version string is not `major.minor.patch`.
    #[error("invalid version {0:?}")]
    InvalidVersion(String),
}

/// A `major.minor.patch` version, compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl Version {
    /// Build a version.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this build.
    pub fn current() -> Self {
        env!("CARGO_PKG_VERSION")
            .parse()
            .unwrap_or(Self::new(0, 0, 0))
    }
}

impl FromStr for Version {
    type Err = UpdateError;

    /// Accepts `1`, `1.2` or `1.2.3`, optionally prefixed with `v`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UpdateError::InvalidVersion(s.to_string());
        let text = s.trim().trim_start_matches('v');
        let mut parts = [0u64; 3];
        let mut count = 0;
        for piece in text.split('.') {
            let slot = parts.get_mut(count).ok_or_else(invalid)?;
            *slot = piece.parse().map_err(|_| invalid())?;
            count += 1;
        }
        let [major, minor, patch] = parts;
        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A published release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    /// Release version.
    pub version: Version,
    /// Release notes.
    pub notes: String,
}

/// Where releases are looked up.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Latest published release, if any.
    async fn latest(&self) -> Result<Option<Release>, UpdateError>;
}

/// Source with nothing published; used when no update channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReleases;

#[async_trait]
impl ReleaseSource for NoReleases {
    async fn latest(&self) -> Result<Option<Release>, UpdateError> {
        Ok(None)
    }
}

/// Callback for a newer release.
type UpdateHook = Arc<dyn Fn(Release) + Send + Sync>;

/// Checks a [`ReleaseSource`] on an interval.
pub struct UpdateChecker {
    /// Running version.
    current: Version,
    /// Where to look.
    source: Arc<dyn ReleaseSource>,
    /// Periodic checks on or off.
    enabled: AtomicBool,
    /// Interval between checks.
    delay: Mutex<Duration>,
    /// Wakes the loop when the delay changes.
    delay_changed: Notify,
    /// Called with each newer release found.
    on_update: UpdateHook,
}

impl UpdateChecker {
    /// Checker for `current` against `source`, checking every `delay`.
    pub fn new<F>(
        current: Version,
        source: Arc<dyn ReleaseSource>,
        delay: Duration,
        on_update: F,
    ) -> Arc<Self>
    where
        F: Fn(Release) + Send + Sync + 'static,
    {
        Arc::new(Self {
            current,
            source,
            enabled: AtomicBool::new(true),
            delay: Mutex::new(delay),
            delay_changed: Notify::new(),
            on_update: Arc::new(on_update),
        })
    }

    /// Follow the `auto_update` settings from now on.
    pub fn follow_settings(self: &Arc<Self>, settings: &SettingsController) {
        let checker = self.clone();
        settings.add_option_change_handler(
            |s| s.auto_update.check_delay(),
            move |delay| checker.set_delay(delay),
            true,
        );
        let checker = self.clone();
        settings.add_option_change_handler(
            |s| s.auto_update.check_for_updates,
            move |enabled| checker.set_enabled(enabled),
            true,
        );
    }

    /// Change the interval. A running loop wakes up and checks right away.
    pub fn set_delay(&self, delay: Duration) {
        let mut current = self.delay.lock();
        if *current != delay {
            *current = delay;
            drop(current);
            debug!(?delay, "update check delay changed");
            self.delay_changed.notify_one();
        }
    }

    /// Turn periodic checks on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Current interval.
    pub fn delay(&self) -> Duration {
        *self.delay.lock()
    }

    /// Query the source once; `Some` when a newer release exists.
    pub async fn check_once(&self) -> Result<Option<Release>, UpdateError> {
        let latest = self.source.latest().await?;
        Ok(latest.filter(|r| r.version > self.current))
    }

    /// Check, then wait for the delay or a delay change, until cancelled.
    /// Errors are logged and the loop continues.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(version = %self.current, "update checker started");
        loop {
            if self.enabled.load(Ordering::Relaxed) {
                match self.check_once().await {
                    Ok(Some(release)) => {
                        info!(version = %release.version, "update available");
                        (self.on_update)(release);
                    }
                    Ok(None) => debug!("no updates found"),
                    Err(e) => warn!(error = %e, "update check failed"),
                }
            }
            let delay = self.delay();
            tokio::select! {
                () = cancel.cancelled() => break,
                () = time::sleep(delay) => {}
                () = self.delay_changed.notified() => {}
            }
        }
        debug!("update checker stopped");
    }
}
