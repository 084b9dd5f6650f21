//! Turn a window handle into a [`WindowInfo`] snapshot.

use std::sync::Arc;

use tracing::debug;

use crate::{WindowHandle, WindowInfo, WindowSystem, info::MAX_ANCESTORS};

/// Resolves window handles into snapshots using a [`WindowSystem`] backend.
#[derive(Clone)]
pub struct WindowInfoResolver {
    /// OS backend.
    system: Arc<dyn WindowSystem>,
}

impl WindowInfoResolver {
    /// Create a resolver over `system`.
    pub fn new(system: Arc<dyn WindowSystem>) -> Self {
        Self { system }
    }

    /// Build a snapshot for `window`.
    ///
    /// Returns `None` when the owning process exists but its executable path
    /// cannot be read (protected processes). Such events are treated as
    /// unresolved rather than as errors.
    pub fn resolve(&self, window: WindowHandle) -> Option<WindowInfo> {
        let pid = self.system.process_id(window).unwrap_or(0);
        let path = if pid == 0 {
            String::new()
        } else {
            match self.system.process_path(pid) {
                Some(path) => path,
                None => {
                    debug!(%window, pid, "process path unavailable; event unresolved");
                    return None;
                }
            }
        };

        let mut title = self.system.window_text(window);
        let root = self.root_of(window);
        let root_title = root
            .map(|r| self.system.window_text(r))
            .unwrap_or_default();
        if title.is_empty() {
            title.clone_from(&root_title);
        }

        Some(
            WindowInfo::new(window)
                .with_title(title)
                .with_path(path)
                .with_pid(pid)
                .with_root_title(root_title)
                .with_lineage(self.system.clone(), root),
        )
    }

    /// Resolve the root window of `window`.
    ///
    /// Preference order: the foreground (or focused) window when it is
    /// `window` itself or one of its ancestors; else the owner; else the top
    /// of the parent chain. A top-level window with none of these has no root.
    pub fn root_of(&self, window: WindowHandle) -> Option<WindowHandle> {
        let active = self
            .system
            .foreground_window()
            .or_else(|| self.system.focused_window());
        if let Some(active) = active
            && self.is_root(window, active)
        {
            return Some(active);
        }

        if let Some(owner) = self.system.owner(window) {
            return Some(owner);
        }

        let mut top = window;
        for _ in 0..MAX_ANCESTORS {
            match self.system.parent(top) {
                Some(parent) => top = parent,
                None => break,
            }
        }
        (top != window).then_some(top)
    }

    /// True when `candidate` is `window` or one of its ancestors.
    fn is_root(&self, window: WindowHandle, candidate: WindowHandle) -> bool {
        !candidate.is_null() && (candidate == window || self.system.is_child(candidate, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FakeWindow, FakeWindowSystem};

    fn h(n: isize) -> WindowHandle {
        WindowHandle(n)
    }

    fn setup() -> (Arc<FakeWindowSystem>, WindowInfoResolver) {
        let fake = Arc::new(FakeWindowSystem::new());
        let resolver = WindowInfoResolver::new(fake.clone());
        (fake, resolver)
    }

    #[test]
    fn foreground_ancestor_is_root() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Main").pid(10));
        fake.insert(h(2), FakeWindow::new("Panel").pid(10).parent(h(1)));
        fake.set_process_path(10, r"C:\app.exe");
        fake.set_foreground(Some(h(1)));

        let info = resolver.resolve(h(2)).unwrap();
        assert_eq!(info.root_title, "Main");
        assert_eq!(info.path, r"C:\app.exe");
        assert_eq!(info.pid, 10);
    }

    #[test]
    fn owner_used_when_foreground_unrelated() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Owner").pid(10));
        fake.insert(h(2), FakeWindow::new("Dialog").pid(10).owner(h(1)));
        fake.insert(h(9), FakeWindow::new("Other").pid(20));
        fake.set_process_path(10, r"C:\app.exe");
        fake.set_foreground(Some(h(9)));

        assert_eq!(resolver.root_of(h(2)), Some(h(1)));
    }

    #[test]
    fn parent_chain_top_is_root() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Top"));
        fake.insert(h(2), FakeWindow::new("Mid").parent(h(1)));
        fake.insert(h(3), FakeWindow::new("Leaf").parent(h(2)));

        assert_eq!(resolver.root_of(h(3)), Some(h(1)));
        assert_eq!(resolver.root_of(h(1)), None);
    }

    #[test]
    fn unreadable_path_is_unresolved() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Protected").pid(4));
        assert!(resolver.resolve(h(1)).is_none());
    }

    #[test]
    fn missing_pid_skips_path_lookup() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Desktop"));
        let info = resolver.resolve(h(1)).unwrap();
        assert_eq!(info.pid, 0);
        assert!(info.path.is_empty());
    }

    #[test]
    fn empty_title_falls_back_to_root_title() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Browser").pid(10));
        fake.insert(h(2), FakeWindow::new("").pid(10).parent(h(1)));
        fake.set_process_path(10, r"C:\browser.exe");

        let info = resolver.resolve(h(2)).unwrap();
        assert_eq!(info.title, "Browser");
    }

    #[test]
    fn titles_cover_chain_to_root() {
        let (fake, resolver) = setup();
        fake.insert(h(1), FakeWindow::new("Root").pid(10));
        fake.insert(h(2), FakeWindow::new("Middle").pid(10).parent(h(1)));
        fake.insert(h(3), FakeWindow::new("").pid(10).parent(h(2)));
        fake.insert(h(4), FakeWindow::new("Leaf").pid(10).parent(h(3)));
        fake.set_process_path(10, r"C:\app.exe");

        let info = resolver.resolve(h(4)).unwrap();
        let titles: Vec<_> = info.titles().iter().map(String::as_str).collect();
        assert_eq!(titles, vec!["Leaf", "Middle", "Root"]);
    }
}
