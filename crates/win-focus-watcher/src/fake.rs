//! In-memory [`WindowSystem`] for tests and headless runs.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{WindowHandle, WindowSystem};

/// A window known to [`FakeWindowSystem`].
#[derive(Debug, Clone, Default)]
pub struct FakeWindow {
    /// Window text.
    pub title: String,
    /// Owning process; `None` when the pid lookup should fail.
    pub pid: Option<u32>,
    /// Parent window.
    pub parent: Option<WindowHandle>,
    /// Owner window.
    pub owner: Option<WindowHandle>,
}

impl FakeWindow {
    /// A window with `title` and nothing else.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the owning process id.
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Set the parent window.
    pub fn parent(mut self, parent: WindowHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the owner window.
    pub fn owner(mut self, owner: WindowHandle) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Mutable state behind the fake.
#[derive(Default)]
struct FakeState {
    /// Known windows.
    windows: HashMap<WindowHandle, FakeWindow>,
    /// Readable executable paths by pid.
    paths: HashMap<u32, String>,
    /// Foreground window.
    foreground: Option<WindowHandle>,
    /// Focused window.
    focused: Option<WindowHandle>,
}

/// Scriptable window tree.
#[derive(Default)]
pub struct FakeWindowSystem {
    /// Shared state.
    state: Mutex<FakeState>,
}

impl FakeWindowSystem {
    /// Empty window tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a window.
    pub fn insert(&self, handle: WindowHandle, window: FakeWindow) {
        self.state.lock().windows.insert(handle, window);
    }

    /// Change the title of an existing window.
    pub fn set_title(&self, handle: WindowHandle, title: impl Into<String>) {
        if let Some(w) = self.state.lock().windows.get_mut(&handle) {
            w.title = title.into();
        }
    }

    /// Make `path` readable for `pid`. Pids without a path behave like
    /// protected processes.
    pub fn set_process_path(&self, pid: u32, path: impl Into<String>) {
        self.state.lock().paths.insert(pid, path.into());
    }

    /// Set the foreground window.
    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.state.lock().foreground = handle;
    }

    /// Set the focused window.
    pub fn set_focused(&self, handle: Option<WindowHandle>) {
        self.state.lock().focused = handle;
    }
}

impl WindowSystem for FakeWindowSystem {
    fn window_text(&self, window: WindowHandle) -> String {
        self.state
            .lock()
            .windows
            .get(&window)
            .map(|w| w.title.clone())
            .unwrap_or_default()
    }

    fn process_id(&self, window: WindowHandle) -> Option<u32> {
        self.state.lock().windows.get(&window).and_then(|w| w.pid)
    }

    fn process_path(&self, pid: u32) -> Option<String> {
        self.state.lock().paths.get(&pid).cloned()
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.state.lock().foreground
    }

    fn focused_window(&self) -> Option<WindowHandle> {
        self.state.lock().focused
    }

    fn owner(&self, window: WindowHandle) -> Option<WindowHandle> {
        self.state.lock().windows.get(&window).and_then(|w| w.owner)
    }

    fn parent(&self, window: WindowHandle) -> Option<WindowHandle> {
        self.state.lock().windows.get(&window).and_then(|w| w.parent)
    }

    fn is_child(&self, parent: WindowHandle, window: WindowHandle) -> bool {
        let state = self.state.lock();
        let mut current = window;
        while let Some(p) = state.windows.get(&current).and_then(|w| w.parent) {
            if p == parent {
                return true;
            }
            if p == window {
                return false;
            }
            current = p;
        }
        false
    }
}
