//! Orderly process shutdown.

use std::{
    future, io, mem,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use main_exec::{MainExecutor, SHUTDOWN_PRIORITY};
use parking_lot::Mutex;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Boxed one-shot callback.
type Callback = Box<dyn FnOnce() + Send>;

/// Runs the shutdown sequence once:
///
/// 1. exit handlers, on the calling thread;
/// 2. quit signals to every blocked OS thread, on the main thread;
/// 3. cancellation of background tasks;
/// 4. main executor stop.
pub struct ShutdownManager {
    /// Main-thread queue; stopped last.
    executor: MainExecutor,
    /// Cancels background tasks.
    cancel: CancellationToken,
    /// Cleanup callbacks.
    exit_handlers: Mutex<Vec<Callback>>,
    /// Posts a quit message to a thread blocked in a native loop.
    quit_posters: Mutex<Vec<Callback>>,
    /// Set once `close` has started.
    closing: AtomicBool,
}

impl ShutdownManager {
    /// Manager stopping `executor` last.
    pub fn new(executor: MainExecutor) -> Arc<Self> {
        Arc::new(Self {
            executor,
            cancel: CancellationToken::new(),
            exit_handlers: Mutex::new(Vec::new()),
            quit_posters: Mutex::new(Vec::new()),
            closing: AtomicBool::new(false),
        })
    }

    /// Token cancelled during shutdown; background tasks select on it.
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// True once shutdown has begun.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Run `handler` at the start of shutdown.
    pub fn add_exit_handler<F>(&self, handler: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.exit_handlers.lock().push(Box::new(handler));
    }

    /// Register a thread blocked in a native loop; `post_quit` unblocks it.
    pub fn add_blocked_thread<F>(&self, post_quit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.quit_posters.lock().push(Box::new(post_quit));
    }

    /// Shut down. Safe to call from any thread, any number of times.
    pub fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            debug!("shutdown already in progress");
            return;
        }
        info!("shutting down");
        for handler in mem::take(&mut *self.exit_handlers.lock()) {
            if panic::catch_unwind(AssertUnwindSafe(handler)).is_err() {
                error!("exit handler panicked");
            }
        }

        let posters = mem::take(&mut *self.quit_posters.lock());
        let cancel = self.cancel.clone();
        let executor = self.executor.clone();
        let teardown = move || {
            debug!(threads = posters.len(), "posting quit to blocked threads");
            for post in posters {
                post();
            }
            cancel.cancel();
            executor.close();
        };

        if self.executor.is_main_thread() {
            teardown();
        } else if let Err(e) = self.executor.post(SHUTDOWN_PRIORITY, teardown) {
            // The loop is already gone; nobody else will stop the rest.
            warn!(error = %e, "main executor closed before shutdown");
            self.cancel.cancel();
        }
    }

    /// Close on Ctrl-C, console close, logoff or system shutdown, or return
    /// when cancelled.
    pub async fn close_on_termination(self: Arc<Self>) {
        self.close_when(termination()).await;
    }

    /// Close once `signal` resolves with a reason, or return when cancelled.
    /// A signal that fails to install is logged and ignored.
    pub async fn close_when<S>(self: Arc<Self>, signal: S)
    where
        S: Future<Output = io::Result<&'static str>>,
    {
        tokio::select! {
            res = signal => match res {
                Ok(reason) => {
                    info!(reason, "termination requested");
                    self.close();
                }
                Err(e) => warn!(error = %e, "cannot listen for termination signals"),
            },
            () = self.cancel.cancelled() => {}
        }
    }
}

/// First termination request: Ctrl-C anywhere, plus the console control
/// events on Windows.
async fn termination() -> io::Result<&'static str> {
    tokio::select! {
        res = signal::ctrl_c() => res.map(|()| "interrupt"),
        res = console_events() => res,
    }
}

/// Console close, logoff and shutdown events.
#[cfg(windows)]
async fn console_events() -> io::Result<&'static str> {
    use tokio::signal::windows::{ctrl_close, ctrl_logoff, ctrl_shutdown};

    let mut close = ctrl_close()?;
    let mut logoff = ctrl_logoff()?;
    let mut shutdown = ctrl_shutdown()?;
    Ok(tokio::select! {
        _ = close.recv() => "console closed",
        _ = logoff.recv() => "logoff",
        _ = shutdown.recv() => "system shutdown",
    })
}

/// No console control events here.
#[cfg(not(windows))]
async fn console_events() -> io::Result<&'static str> {
    future::pending().await
}
