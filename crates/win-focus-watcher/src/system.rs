//! The OS seam used by the resolver.

use crate::WindowHandle;

/// Read-only window queries needed to build a [`crate::WindowInfo`].
///
/// Implementations must not panic; lookups that fail return `None` (or an
/// empty string for text).
pub trait WindowSystem: Send + Sync {
    /// Window text (title); empty when unavailable.
    fn window_text(&self, window: WindowHandle) -> String;

    /// Id of the process owning `window`.
    fn process_id(&self, window: WindowHandle) -> Option<u32>;

    /// Executable path of `pid`. This lookup is permission-limited and fails
    /// for protected processes.
    fn process_path(&self, pid: u32) -> Option<String>;

    /// The current foreground window.
    fn foreground_window(&self) -> Option<WindowHandle>;

    /// The window with keyboard focus on the calling thread's queue.
    fn focused_window(&self) -> Option<WindowHandle>;

    /// Owner of `window`, if it is an owned window.
    fn owner(&self, window: WindowHandle) -> Option<WindowHandle>;

    /// Parent of `window`.
    fn parent(&self, window: WindowHandle) -> Option<WindowHandle>;

    /// True when `window` is a descendant of `parent`.
    fn is_child(&self, parent: WindowHandle, window: WindowHandle) -> bool;
}
