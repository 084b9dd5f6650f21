//! Filesystem watch with debounce and self-write filtering.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, trace, warn};

use crate::{Error, Result, WriteGate};

/// Default quiet period before a burst of events is dispatched.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// An active watch. Dropping it stops the watcher and joins the dispatcher.
pub struct DocumentWatch {
    /// OS watcher; owns the event sender.
    watcher: Option<RecommendedWatcher>,
    /// Debounce thread.
    dispatcher: Option<JoinHandle<()>>,
}

impl DocumentWatch {
    /// Attach a watcher to the directory of `path` and start the dispatcher.
    pub(crate) fn start<F>(
        path: &Path,
        gate: Arc<WriteGate>,
        debounce: Duration,
        on_change: F,
    ) -> Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| Error::NoFileName(path.to_path_buf()))?
            .to_owned();
        // Watch the directory: editors often replace the file instead of
        // writing it in place.
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, rx) = unbounded::<()>();
        let event_gate = gate.clone();
        let event_name = file_name.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !is_relevant(&event, &event_name) {
                        return;
                    }
                    if !event_gate.is_open() {
                        trace!(kind = ?event.kind, "dropped event from own write");
                        return;
                    }
                    let _sent = tx.send(());
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let dispatcher = thread::Builder::new()
            .name(format!("watch:{}", file_name.to_string_lossy()))
            .spawn(move || dispatch(&rx, &gate, debounce, &on_change))
            .map_err(Error::ThreadSpawn)?;
        debug!(dir = %dir.display(), file = %file_name.to_string_lossy(), "watching document");

        Ok(Self {
            watcher: Some(watcher),
            dispatcher: Some(dispatcher),
        })
    }
}

impl Drop for DocumentWatch {
    fn drop(&mut self) {
        // Dropping the watcher drops the sender, which ends the dispatcher.
        drop(self.watcher.take());
        if let Some(dispatcher) = self.dispatcher.take()
            && dispatcher.join().is_err()
        {
            warn!("document watch dispatcher panicked");
        }
    }
}

/// Creation or modification of the watched file.
fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Coalesce bursts, re-check the gate, then notify.
fn dispatch<F>(rx: &Receiver<()>, gate: &WriteGate, debounce: Duration, on_change: &F)
where
    F: Fn(),
{
    while rx.recv().is_ok() {
        loop {
            match rx.recv_timeout(debounce) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        if !gate.is_open() {
            let dropped = rx.try_iter().count();
            trace!(dropped, "write started during debounce; skipping");
            continue;
        }
        on_change();
    }
}

#[cfg(test)]
mod tests {
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    use super::*;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn only_writes_to_the_file_are_relevant() {
        let name = OsString::from("rules.yaml");
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/d/rules.yaml"),
            &name
        ));
        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/d/rules.yaml"),
            &name
        ));
        assert!(!is_relevant(
            &event(EventKind::Access(AccessKind::Any), "/d/rules.yaml"),
            &name
        ));
        assert!(!is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/d/settings.toml"),
            &name
        ));
    }
}
