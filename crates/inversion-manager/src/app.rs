//! Process lifecycle: start the observer, watchers and background tasks,
//! run the main loop, then tear everything down.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

use main_exec::{DEFAULT_PRIORITY, MainExecutor};
use synced_doc::{Codec, Document, DocumentWatch, SyncedDocument};
use tokio::runtime::Builder;
use tracing::{debug, info, warn};
use win_focus_watcher::{WindowObserver, WindowSystem};

use crate::{AppContext, ReleaseSource, Result, UpdateChecker, Version};

/// Options for [`run`].
pub struct RunOptions {
    /// Start the periodic update checker.
    pub update_check: bool,
    /// Where the checker looks for releases.
    pub release_source: Arc<dyn ReleaseSource>,
}

/// The window system of the running platform.
#[cfg(windows)]
pub fn platform_window_system() -> Arc<dyn WindowSystem> {
    Arc::new(win_focus_watcher::Win32System)
}

/// The window system of the running platform. There is no focus backend
/// here, so an empty tree stands in.
#[cfg(not(windows))]
pub fn platform_window_system() -> Arc<dyn WindowSystem> {
    Arc::new(win_focus_watcher::FakeWindowSystem::new())
}

/// Run until shutdown. Must be called on the thread that built `ctx`.
///
/// Failing to install the focus hooks is fatal: nothing else would work.
pub fn run(ctx: &AppContext, options: RunOptions) -> Result<()> {
    if !ctx.executor.is_main_thread() {
        return Err(main_exec::Error::WrongThread.into());
    }
    let controller = ctx.controller.clone();
    let observer = WindowObserver::spawn(move |event| {
        controller.handle_event(event);
    })?;
    let quit = observer.quit_signal();
    ctx.shutdown.add_blocked_thread(move || quit.post());

    let rules_watch = reload_on_change(&ctx.rules_doc, &ctx.executor);
    let settings_watch = reload_on_change(ctx.settings.document(), &ctx.executor);
    let catalog_watch = reload_on_change(ctx.catalog.document(), &ctx.executor);
    let tasks = match spawn_tasks(ctx, options) {
        Ok(tasks) => tasks,
        Err(e) => {
            ctx.shutdown.close();
            observer.join();
            return Err(e);
        }
    };

    info!("running");
    let result = ctx.executor.run_loop();
    if result.is_err() {
        ctx.shutdown.close();
    }

    observer.join();
    if tasks.join().is_err() {
        warn!("background task thread panicked");
    }
    drop(rules_watch);
    drop(settings_watch);
    drop(catalog_watch);
    info!("stopped");
    Ok(result?)
}

/// Watch `doc` and reload it on the main thread after external edits.
fn reload_on_change<T, C>(
    doc: &Arc<SyncedDocument<T, C>>,
    executor: &MainExecutor,
) -> Option<DocumentWatch>
where
    T: Document,
    C: Codec<T>,
{
    let target = Arc::downgrade(doc);
    let executor = executor.clone();
    let watched = doc.watch(move || {
        let target = target.clone();
        let posted = executor.post(DEFAULT_PRIORITY, move || {
            if let Some(doc) = target.upgrade()
                && let Err(e) = doc.load()
            {
                warn!(path = %doc.path().display(), error = %e, "reload failed");
            }
        });
        if posted.is_err() {
            debug!("executor closed; skipping reload");
        }
    });
    match watched {
        Ok(watch) => Some(watch),
        Err(e) => {
            warn!(path = %doc.path().display(), error = %e, "hot reload unavailable");
            None
        }
    }
}

/// Start the cooperative task thread: interrupt handling and update checks.
/// It returns once the shutdown token is cancelled.
fn spawn_tasks(ctx: &AppContext, options: RunOptions) -> Result<JoinHandle<()>> {
    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()?;
    let shutdown = ctx.shutdown.clone();
    let token = shutdown.token();

    let checker = options.update_check.then(|| {
        let executor = ctx.executor.clone();
        let checker = UpdateChecker::new(
            Version::current(),
            options.release_source,
            ctx.settings.settings().auto_update.check_delay(),
            move |release| {
                executor.run_on_main(DEFAULT_PRIORITY, move || {
                    info!(version = %release.version, notes = %release.notes, "a new release is available");
                });
            },
        );
        checker.follow_settings(&ctx.settings);
        checker
    });

    let handle = thread::Builder::new()
        .name("tasks".into())
        .spawn(move || {
            runtime.block_on(async move {
                tokio::spawn(shutdown.close_on_termination());
                if let Some(checker) = checker {
                    tokio::spawn(checker.run(token.clone()));
                }
                token.cancelled().await;
            });
            debug!("task thread finished");
        })?;
    Ok(handle)
}
