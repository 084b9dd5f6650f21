//! The synced document itself.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{Codec, DocumentWatch, Error, Result, WriteGate, watch::DEFAULT_DEBOUNCE};

/// A value that can be stored in a [`SyncedDocument`].
pub trait Document: Clone + PartialEq + Send + Sync + 'static {
    /// Canonical form applied to every value read from disk.
    fn normalize(self) -> Self {
        self
    }
}

/// What [`SyncedDocument::load`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The file was absent and has been created from the current value.
    Created,
    /// The file parsed to the current value.
    Unchanged,
    /// The file held a different value, which is now current.
    Reloaded,
    /// The file could not be parsed; it was backed up and overwritten.
    Recovered,
}

/// Callback fired with the newly adopted value.
type ReloadHook<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An in-memory value mirrored to one file.
pub struct SyncedDocument<T, C> {
    /// Backing file.
    path: PathBuf,
    /// File format.
    codec: C,
    /// Current value.
    value: Mutex<T>,
    /// Suppresses watch events caused by our own writes.
    gate: Arc<WriteGate>,
    /// Quiet period used by `watch` before dispatching.
    debounce: Duration,
    /// Called after `load` replaced the value.
    on_reloaded: Mutex<Option<ReloadHook<T>>>,
    /// Serializes file access between `load` and `save`.
    io: Mutex<()>,
}

impl<T, C> SyncedDocument<T, C>
where
    T: Document,
    C: Codec<T>,
{
    /// A document at `path` starting with `initial`. Nothing is read yet.
    pub fn new(path: impl Into<PathBuf>, initial: T, codec: C) -> Self {
        Self {
            path: path.into(),
            codec,
            value: Mutex::new(initial),
            gate: Arc::new(WriteGate::default()),
            debounce: DEFAULT_DEBOUNCE,
            on_reloaded: Mutex::new(None),
            io: Mutex::new(()),
        }
    }

    /// Override the quiet period after internal writes.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.gate = Arc::new(WriteGate::new(settle));
        self
    }

    /// Override how long `watch` waits for a burst of events to end.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The gate guarding internal writes.
    pub fn gate(&self) -> &Arc<WriteGate> {
        &self.gate
    }

    /// Register the callback fired after `load` adopts a new value. It runs
    /// on the loading thread, outside every internal lock.
    pub fn set_on_reloaded<F>(&self, hook: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        *self.on_reloaded.lock() = Some(Arc::new(hook));
    }

    /// Clone of the current value.
    pub fn get(&self) -> T {
        self.value.lock().clone()
    }

    /// Replace the current value without writing it.
    pub fn replace(&self, value: T) {
        *self.value.lock() = value;
    }

    /// Mutate the current value without writing it.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.lock());
    }

    /// Write the current value to the file.
    pub fn save(&self) -> Result<()> {
        let value = self.get();
        let _io = self.io.lock();
        self.write(&value)
    }

    /// Reconcile the value with the file.
    ///
    /// A missing file is created from the current value. An unparseable file
    /// is copied to `<name>.corrupt` and then overwritten with the current
    /// value. A file the codec could only partly read is copied the same way
    /// before its readable part is adopted. A parseable file is normalized; when it differs from the
    /// current value it replaces it and the reload hook fires. In every case
    /// the file is rewritten in canonical form.
    pub fn load(&self) -> Result<LoadOutcome> {
        let (outcome, reloaded) = self.reconcile()?;
        if let Some(value) = reloaded {
            let hook = self.on_reloaded.lock().clone();
            if let Some(hook) = hook {
                hook(&value);
            }
        }
        Ok(outcome)
    }

    /// Watch the file for external edits; `on_change` runs on a background
    /// thread once per settled burst. Typically it schedules a `load`.
    pub fn watch<F>(&self, on_change: F) -> Result<DocumentWatch>
    where
        F: Fn() + Send + 'static,
    {
        DocumentWatch::start(&self.path, self.gate.clone(), self.debounce, on_change)
    }

    /// Read, compare and rewrite. Returns the new value when it changed.
    fn reconcile(&self) -> Result<(LoadOutcome, Option<T>)> {
        let _io = self.io.lock();
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.write(&self.get())?;
                info!(path = %self.path.display(), "created document");
                return Ok((LoadOutcome::Created, None));
            }
            Err(source) => {
                return Err(Error::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let parsed = match self.codec.decode_entries(&text) {
            Ok(decoded) => {
                if decoded.dropped > 0 {
                    warn!(path = %self.path.display(), dropped = decoded.dropped, "document partly unreadable; keeping a copy");
                    self.back_up(&text);
                }
                decoded.value.normalize()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "document unreadable; restoring last good value");
                self.back_up(&text);
                self.write(&self.get())?;
                return Ok((LoadOutcome::Recovered, None));
            }
        };

        let changed = {
            let mut current = self.value.lock();
            if *current == parsed {
                false
            } else {
                *current = parsed.clone();
                true
            }
        };
        self.write(&parsed)?;
        if changed {
            debug!(path = %self.path.display(), "document reloaded");
            Ok((LoadOutcome::Reloaded, Some(parsed)))
        } else {
            Ok((LoadOutcome::Unchanged, None))
        }
    }

    /// Encode and write `value` with the gate held.
    fn write(&self, value: &T) -> Result<()> {
        let text = self.codec.encode(value)?;
        let io_err = |source| Error::Io {
            path: self.path.clone(),
            source,
        };
        let _hold = self.gate.hold();
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        fs::write(&self.path, text).map_err(io_err)
    }

    /// Keep a copy of unreadable contents next to the file.
    fn back_up(&self, text: &str) {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".corrupt");
        let backup = self.path.with_file_name(name);
        match fs::write(&backup, text) {
            Ok(()) => info!(backup = %backup.display(), "saved unreadable document"),
            Err(e) => warn!(backup = %backup.display(), error = %e, "could not save unreadable document"),
        }
    }
}
