//! Event types emitted by the focus watcher.

use std::fmt;

/// Opaque OS identifier for a window (an `HWND` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// True for the null handle.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kinds of WinEvents the observer subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusEventKind {
    /// `EVENT_SYSTEM_FOREGROUND`: the foreground window changed.
    Foreground,
    /// `EVENT_OBJECT_FOCUS`: an object received keyboard focus.
    Focus,
    /// `EVENT_SYSTEM_DIALOGSTART`: a dialog box was displayed.
    DialogStart,
    /// `EVENT_SYSTEM_CAPTURESTART`: a window received mouse capture.
    CaptureStart,
    /// `EVENT_SYSTEM_MINIMIZEEND`: a window was restored from minimized.
    MinimizeEnd,
}

impl FocusEventKind {
    /// Every kind the observer hooks, in registration order.
    pub const ALL: [Self; 5] = [
        Self::Foreground,
        Self::Focus,
        Self::DialogStart,
        Self::CaptureStart,
        Self::MinimizeEnd,
    ];

    /// Raw WinEvent constant for this kind.
    pub const fn raw(self) -> u32 {
        match self {
            Self::Foreground => 0x0003,
            Self::CaptureStart => 0x0008,
            Self::DialogStart => 0x0010,
            Self::MinimizeEnd => 0x0017,
            Self::Focus => 0x8005,
        }
    }

    /// Map a raw WinEvent constant back to a kind we subscribe to.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.raw() == raw)
    }
}

/// A raw focus notification: which event fired and for which window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusEvent {
    /// The event kind.
    pub kind: FocusEventKind,
    /// The window the event refers to.
    pub window: WindowHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_round_trip() {
        for kind in FocusEventKind::ALL {
            assert_eq!(FocusEventKind::from_raw(kind.raw()), Some(kind));
        }
        assert_eq!(FocusEventKind::from_raw(0x800B), None);
    }
}
