//! Immutable window snapshot taken for one focus event.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, OnceLock},
};

use crate::{WindowHandle, WindowSystem};

/// Upper bound on parent-chain walks; guards against cyclic or very deep trees.
pub(crate) const MAX_ANCESTORS: usize = 64;

/// Where the lazily computed title set comes from.
#[derive(Clone)]
struct Lineage {
    /// Backend used to walk parents.
    system: Arc<dyn WindowSystem>,
    /// Resolved root; the walk stops after it.
    root: Option<WindowHandle>,
}

/// Snapshot of a window at the time of a focus event.
#[derive(Clone)]
pub struct WindowInfo {
    /// The window handle.
    pub handle: WindowHandle,
    /// Window title (falls back to the root title when empty).
    pub title: String,
    /// Executable path of the owning process; empty when the pid is unknown.
    pub path: String,
    /// Owning process id; `0` when unknown.
    pub pid: u32,
    /// Title of the resolved root window.
    pub root_title: String,
    /// Titles along the window-to-root chain, computed on first use.
    titles: OnceLock<BTreeSet<String>>,
    /// Source for `titles` when it was not given explicitly.
    lineage: Option<Lineage>,
}

impl WindowInfo {
    /// A snapshot with only a handle; fill the rest with the `with_*` builders.
    pub fn new(handle: WindowHandle) -> Self {
        Self {
            handle,
            title: String::new(),
            path: String::new(),
            pid: 0,
            root_title: String::new(),
            titles: OnceLock::new(),
            lineage: None,
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the executable path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the process id.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Set the root title.
    pub fn with_root_title(mut self, root_title: impl Into<String>) -> Self {
        self.root_title = root_title.into();
        self
    }

    /// Fix the ancestor title set instead of computing it from the OS.
    pub fn with_titles<I, S>(self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = titles.into_iter().map(Into::into).collect();
        let _already_set = self.titles.set(set);
        self
    }

    /// Attach the backend used to compute [`Self::titles`] lazily.
    pub(crate) fn with_lineage(
        mut self,
        system: Arc<dyn WindowSystem>,
        root: Option<WindowHandle>,
    ) -> Self {
        self.lineage = Some(Lineage { system, root });
        self
    }

    /// File name of the executable, e.g. `notepad.exe`.
    pub fn name(&self) -> &str {
        self.path.rsplit(['\\', '/']).next().unwrap_or_default()
    }

    /// Every non-empty title from this window up to and including its root.
    pub fn titles(&self) -> &BTreeSet<String> {
        self.titles.get_or_init(|| self.collect_titles())
    }

    /// Walk the parent chain collecting titles.
    fn collect_titles(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for title in [&self.title, &self.root_title] {
            if !title.is_empty() {
                out.insert(title.clone());
            }
        }
        let Some(lineage) = &self.lineage else {
            return out;
        };
        let mut current = self.handle;
        for _ in 0..MAX_ANCESTORS {
            if Some(current) == lineage.root {
                break;
            }
            let Some(parent) = lineage.system.parent(current) else {
                break;
            };
            let text = lineage.system.window_text(parent);
            if !text.is_empty() {
                out.insert(text);
            }
            current = parent;
        }
        out
    }
}

impl fmt::Debug for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowInfo")
            .field("handle", &self.handle)
            .field("title", &self.title)
            .field("path", &self.path)
            .field("pid", &self.pid)
            .field("root_title", &self.root_title)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_last_path_component() {
        let info = WindowInfo::new(WindowHandle(1)).with_path(r"C:\Windows\notepad.exe");
        assert_eq!(info.name(), "notepad.exe");
        assert_eq!(WindowInfo::new(WindowHandle(1)).name(), "");
    }

    #[test]
    fn explicit_titles_are_kept() {
        let info = WindowInfo::new(WindowHandle(1))
            .with_title("Child")
            .with_titles(["Child", "Root"]);
        assert!(info.titles().contains("Root"));
        assert_eq!(info.titles().len(), 2);
    }

    #[test]
    fn titles_without_lineage_use_own_and_root() {
        let info = WindowInfo::new(WindowHandle(1))
            .with_title("Save As")
            .with_root_title("Editor");
        let titles: Vec<_> = info.titles().iter().cloned().collect();
        assert_eq!(titles, vec!["Editor".to_string(), "Save As".to_string()]);
    }
}
