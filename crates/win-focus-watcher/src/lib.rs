//! win-focus-watcher: observe window focus changes on Windows and turn window
//! handles into immutable snapshots.
//!
//! The crate has two halves:
//! - [`WindowObserver`] installs WinEvent hooks for a fixed set of focus,
//!   dialog, capture and restore events and runs the blocking message pump on
//!   a thread it owns. The pump is affine to the thread that registered the
//!   hooks, so the thread id is recorded and shutdown is done by posting a quit
//!   message to it (see [`QuitSignal`]).
//! - [`WindowInfoResolver`] reads title, owning process and executable path
//!   for a handle and resolves its root window, producing a [`WindowInfo`].
//!
//! All OS access goes through the [`WindowSystem`] trait. The Win32 backend
//! ([`Win32System`], Windows only) is the production implementation and
//! [`FakeWindowSystem`] is an in-memory stand-in for tests.

use std::{io, result::Result as StdResult};

mod event;
mod fake;
mod info;
mod observer;
mod resolver;
mod system;
#[cfg(windows)]
mod win32;

pub use event::{FocusEvent, FocusEventKind, WindowHandle};
pub use fake::{FakeWindow, FakeWindowSystem};
pub use info::WindowInfo;
pub use observer::{ObserverHandle, QuitSignal, WindowObserver};
pub use resolver::WindowInfoResolver;
pub use system::WindowSystem;
#[cfg(windows)]
pub use win32::Win32System;

use thiserror::Error;

/// Errors that can occur when starting or stopping the focus watcher.
#[derive(Debug, Error)]
pub enum Error {
    /// Every WinEvent hook registration failed; focus tracking cannot work.
    #[error("failed to install any WinEvent hook")]
    HookFailed,
    /// The current platform has no focus hook backend.
    #[error("focus hooks are not supported on this platform")]
    Unsupported,
    /// The hook thread could not be spawned.
    #[error("failed to spawn hook thread: {0}")]
    ThreadSpawn(#[from] io::Error),
    /// The hook thread exited before reporting whether hooks were installed.
    #[error("hook thread exited during startup")]
    StartupLost,
}

/// Convenient result type for the focus watcher.
pub type Result<T> = StdResult<T, Error>;
