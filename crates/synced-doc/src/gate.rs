//! Self-write suppression.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Settle delay used when none is configured.
///
/// Change notifications arrive later on some platforms, so the quiet period
/// after a write differs per OS.
pub fn default_settle_delay() -> Duration {
    if cfg!(target_os = "windows") {
        Duration::from_millis(500)
    } else if cfg!(target_os = "macos") {
        Duration::from_millis(1500)
    } else {
        Duration::from_millis(250)
    }
}

/// Mutable part of a [`WriteGate`].
#[derive(Debug, Default)]
struct GateState {
    /// Writes currently in progress.
    writers: usize,
    /// End of the quiet period after the last write finished.
    quiet_until: Option<Instant>,
}

/// Closed while any internal write is in progress and for `settle` after
/// the last one completes. Watch events seen while closed are discarded.
#[derive(Debug)]
pub struct WriteGate {
    /// Quiet period after a write.
    settle: Duration,
    /// Writer count and quiet deadline.
    state: Mutex<GateState>,
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new(default_settle_delay())
    }
}

impl WriteGate {
    /// A gate that stays closed for `settle` after each write.
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Configured settle delay.
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Close the gate until the returned guard drops.
    pub fn hold(&self) -> GateGuard<'_> {
        self.state.lock().writers += 1;
        GateGuard { gate: self }
    }

    /// True when no write is in progress and the settle delay has passed.
    pub fn is_open(&self) -> bool {
        let state = self.state.lock();
        if state.writers > 0 {
            return false;
        }
        state.quiet_until.is_none_or(|until| Instant::now() >= until)
    }

    /// End one write; the last one starts the settle period.
    fn release(&self) {
        let mut state = self.state.lock();
        state.writers = state.writers.saturating_sub(1);
        if state.writers == 0 {
            state.quiet_until = Some(Instant::now() + self.settle);
        }
    }
}

/// Keeps a [`WriteGate`] closed while alive.
#[must_use = "the gate reopens as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard<'a> {
    /// Gate to release on drop.
    gate: &'a WriteGate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn fresh_gate_is_open() {
        assert!(WriteGate::new(Duration::from_secs(60)).is_open());
    }

    #[test]
    fn closed_while_held_and_during_settle() {
        let gate = WriteGate::new(Duration::from_millis(80));
        {
            let _outer = gate.hold();
            {
                let _inner = gate.hold();
                assert!(!gate.is_open());
            }
            assert!(!gate.is_open(), "outer write still running");
        }
        assert!(!gate.is_open(), "settling");
        thread::sleep(Duration::from_millis(150));
        assert!(gate.is_open());
    }
}
