//! Focus hook thread: subscription, event pump and cooperative shutdown.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::JoinHandle,
};

use crossbeam_channel::bounded;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{Error, FocusEvent, Result};

/// Callback invoked on the hook thread for every focus event.
pub(crate) type FocusSink = Arc<dyn Fn(FocusEvent) + Send + Sync>;

// Global sink for hook callbacks; the OS callback is a bare function pointer.
static HOOK_SINK: Lazy<Mutex<Option<FocusSink>>> = Lazy::new(|| Mutex::new(None));

/// Replace the sink used by the hook callback.
fn set_sink(sink: Option<FocusSink>) {
    *HOOK_SINK.lock() = sink;
}

/// Forward one event from the OS callback into the installed sink.
///
/// Panics are caught here: unwinding across the OS callback boundary is not
/// allowed and the hook thread is expensive to restart.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn emit(event: FocusEvent) {
    let sink = HOOK_SINK.lock().clone();
    let Some(sink) = sink else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| sink(event))).is_err() {
        error!(?event, "focus callback panicked");
    }
}

/// Posts a quit message to a blocked hook thread.
#[derive(Debug, Clone, Copy)]
pub struct QuitSignal {
    /// OS id of the pump thread.
    thread_id: u32,
}

impl QuitSignal {
    /// Ask the pump to exit. The pump has no finer-grained cancellation point.
    pub fn post(&self) {
        post_quit(self.thread_id);
    }
}

/// Handle to a running hook thread.
#[derive(Debug)]
pub struct ObserverHandle {
    /// OS id of the pump thread.
    thread_id: u32,
    /// Join handle of the pump thread.
    join: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    /// OS id of the pump thread.
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// A copyable signal that stops the pump.
    pub fn quit_signal(&self) -> QuitSignal {
        QuitSignal {
            thread_id: self.thread_id,
        }
    }

    /// Post the quit signal and wait for the pump thread to exit.
    pub fn stop(mut self) {
        self.quit_signal().post();
        self.join_thread();
    }

    /// Wait for the pump thread without signalling it.
    pub fn join(mut self) {
        self.join_thread();
    }

    /// Join the pump thread once.
    fn join_thread(&mut self) {
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            warn!("focus hook thread panicked");
        }
    }
}

/// Entry point for focus observation.
pub struct WindowObserver;

impl WindowObserver {
    /// Subscribe to focus events and start the pump on a dedicated thread.
    ///
    /// `callback` runs on the hook thread for every event. Returns once the
    /// hooks are installed. [`Error::HookFailed`] means no event kind could be
    /// subscribed and focus tracking cannot work.
    pub fn spawn<F>(callback: F) -> Result<ObserverHandle>
    where
        F: Fn(FocusEvent) + Send + Sync + 'static,
    {
        set_sink(Some(Arc::new(callback)));
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let join = match spawn_pump(ready_tx) {
            Ok(join) => join,
            Err(e) => {
                set_sink(None);
                return Err(e);
            }
        };
        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!(thread_id, "focus hooks installed");
                Ok(ObserverHandle {
                    thread_id,
                    join: Some(join),
                })
            }
            Ok(Err(e)) => {
                let _joined = join.join();
                set_sink(None);
                Err(e)
            }
            Err(_) => {
                set_sink(None);
                Err(Error::StartupLost)
            }
        }
    }
}

#[cfg(windows)]
use crate::win32::{post_quit, spawn_pump};

/// No hook backend off Windows.
#[cfg(not(windows))]
fn spawn_pump(_ready: crossbeam_channel::Sender<Result<u32>>) -> Result<JoinHandle<()>> {
    Err(Error::Unsupported)
}

/// No hook backend off Windows.
#[cfg(not(windows))]
fn post_quit(_thread_id: u32) {}
