//! Win32 backend: WinEvent hook pump and window queries.

use std::{
    ffi::c_void,
    thread::{self, JoinHandle},
};

use crossbeam_channel::Sender;
use tracing::{debug, warn};
use windows::{
    Win32::{
        Foundation::{CloseHandle, HMODULE, HWND, LPARAM, WPARAM},
        System::{
            Com::{COINIT_APARTMENTTHREADED, CoInitializeEx, CoUninitialize},
            Threading::{
                GetCurrentThreadId, OpenProcess, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION, QueryFullProcessImageNameW,
            },
        },
        UI::{
            Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent},
            Input::KeyboardAndMouse::GetFocus,
            WindowsAndMessaging::{
                DispatchMessageW, GW_OWNER, GetForegroundWindow, GetMessageW, GetParent,
                GetWindow, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId,
                IsChild, MSG, PostThreadMessageW, TranslateMessage, WINEVENT_OUTOFCONTEXT,
                WM_QUIT,
            },
        },
    },
    core::PWSTR,
};

use crate::{
    Error, FocusEvent, FocusEventKind, Result, WindowHandle, WindowSystem, observer::emit,
};

/// Buffer size for executable paths, in UTF-16 units.
const PATH_BUFFER_LEN: usize = 4096;

/// Convert our handle into an `HWND`.
fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

/// Convert an `HWND` into our handle, mapping null to `None`.
fn handle(hwnd: HWND) -> Option<WindowHandle> {
    (!hwnd.0.is_null()).then(|| WindowHandle(hwnd.0 as isize))
}

/// WinEvent callback; runs on the pump thread while it dispatches messages.
unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    _id_object: i32,
    _id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    let (Some(kind), Some(window)) = (FocusEventKind::from_raw(event), handle(hwnd)) else {
        return;
    };
    emit(FocusEvent { kind, window });
}

/// Spawn the pump thread. It reports its thread id (or a hook failure) on `ready`.
pub(crate) fn spawn_pump(ready: Sender<Result<u32>>) -> Result<JoinHandle<()>> {
    let join = thread::Builder::new()
        .name("focus-hook".into())
        .spawn(move || run_pump(&ready))?;
    Ok(join)
}

/// Install hooks, pump messages until `WM_QUIT`, then unhook.
fn run_pump(ready: &Sender<Result<u32>>) {
    // SAFETY: COM is initialized and uninitialized on this thread only.
    let com = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) };

    let hooks: Vec<HWINEVENTHOOK> = FocusEventKind::ALL
        .into_iter()
        .filter_map(|kind| {
            // SAFETY: `win_event_proc` matches WINEVENTPROC and lives for the program.
            let hook = unsafe {
                SetWinEventHook(
                    kind.raw(),
                    kind.raw(),
                    HMODULE::default(),
                    Some(win_event_proc),
                    0,
                    0,
                    WINEVENT_OUTOFCONTEXT,
                )
            };
            if hook.is_invalid() {
                warn!(?kind, "SetWinEventHook failed");
                None
            } else {
                Some(hook)
            }
        })
        .collect();

    if hooks.is_empty() {
        let _sent = ready.send(Err(Error::HookFailed));
    } else {
        // SAFETY: plain query of the calling thread id.
        let _sent = ready.send(Ok(unsafe { GetCurrentThreadId() }));
        let mut msg = MSG::default();
        // SAFETY: standard message loop on the thread that owns the hooks.
        unsafe {
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                let _translated = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        debug!("focus pump exited");
    }

    for hook in hooks {
        // SAFETY: `hook` was returned by SetWinEventHook on this thread.
        let _unhooked = unsafe { UnhookWinEvent(hook) };
    }
    if com.is_ok() {
        // SAFETY: balanced with the successful CoInitializeEx above.
        unsafe { CoUninitialize() };
    }
}

/// Post `WM_QUIT` to the pump thread.
pub(crate) fn post_quit(thread_id: u32) {
    // SAFETY: posting to a thread id has no memory-safety preconditions.
    if let Err(e) = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) } {
        warn!(thread_id, error = %e, "failed to post quit to hook thread");
    }
}

/// Production [`WindowSystem`] backed by user32/kernel32.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32System;

impl WindowSystem for Win32System {
    fn window_text(&self, window: WindowHandle) -> String {
        // SAFETY: the buffer outlives the call and its length is passed in.
        unsafe {
            let len = GetWindowTextLengthW(hwnd(window));
            if len <= 0 {
                return String::new();
            }
            let mut buf = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd(window), &mut buf).max(0) as usize;
            String::from_utf16_lossy(&buf[..copied])
        }
    }

    fn process_id(&self, window: WindowHandle) -> Option<u32> {
        let mut pid = 0u32;
        // SAFETY: `pid` is a valid out pointer for the duration of the call.
        unsafe { GetWindowThreadProcessId(hwnd(window), Some(&mut pid)) };
        (pid != 0).then_some(pid)
    }

    fn process_path(&self, pid: u32) -> Option<String> {
        // SAFETY: the process handle is closed before returning; the buffer
        // and its size are passed together.
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
            let mut buf = vec![0u16; PATH_BUFFER_LEN];
            let mut size = buf.len() as u32;
            let queried = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buf.as_mut_ptr()),
                &mut size,
            );
            let _closed = CloseHandle(process);
            queried.ok()?;
            Some(String::from_utf16_lossy(&buf[..size as usize]))
        }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        // SAFETY: no preconditions.
        handle(unsafe { GetForegroundWindow() })
    }

    fn focused_window(&self) -> Option<WindowHandle> {
        // SAFETY: no preconditions.
        handle(unsafe { GetFocus() })
    }

    fn owner(&self, window: WindowHandle) -> Option<WindowHandle> {
        // SAFETY: invalid handles produce an error, not UB.
        unsafe { GetWindow(hwnd(window), GW_OWNER) }
            .ok()
            .and_then(handle)
    }

    fn parent(&self, window: WindowHandle) -> Option<WindowHandle> {
        // SAFETY: invalid handles produce an error, not UB.
        unsafe { GetParent(hwnd(window)) }.ok().and_then(handle)
    }

    fn is_child(&self, parent: WindowHandle, window: WindowHandle) -> bool {
        // SAFETY: invalid handles yield FALSE.
        unsafe { IsChild(hwnd(parent), hwnd(window)) }.as_bool()
    }
}
