//! Global hotkey trigger (Ctrl+B).
//!
//! Registration happens on a dedicated thread that owns the message loop;
//! failure (another app holds the combination, or the platform has no global
//! hotkey facility) simply leaves this source absent. The HTTP and file
//! triggers cover those machines.

use async_trait::async_trait;

use super::{TriggerResult, TriggerSource};
use crate::coordinator::CoordinatorHandle;

pub struct HotkeyTrigger {
    #[cfg_attr(not(target_os = "windows"), allow(dead_code))]
    handle: CoordinatorHandle,
    #[cfg(target_os = "windows")]
    worker: Option<platform::Worker>,
}

impl HotkeyTrigger {
    pub fn new(handle: CoordinatorHandle) -> Self {
        Self {
            handle,
            #[cfg(target_os = "windows")]
            worker: None,
        }
    }
}

#[cfg(target_os = "windows")]
#[async_trait]
impl TriggerSource for HotkeyTrigger {
    fn name(&self) -> &'static str {
        "hotkey"
    }

    async fn start(&mut self) -> TriggerResult<()> {
        let worker = platform::spawn(self.handle.clone())?;
        self.worker = Some(worker);
        tracing::info!("Press Ctrl+B to capture the current slide");
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

#[cfg(not(target_os = "windows"))]
#[async_trait]
impl TriggerSource for HotkeyTrigger {
    fn name(&self) -> &'static str {
        "hotkey"
    }

    async fn start(&mut self) -> TriggerResult<()> {
        Err(super::TriggerError::HotkeyUnsupported)
    }

    async fn shutdown(&mut self) {}
}

#[cfg(target_os = "windows")]
mod platform {
    //! Win32 RegisterHotKey plumbing. The hotkey is registered against the
    //! worker thread itself (no window needed); WM_HOTKEY lands in its
    //! message queue and WM_QUIT ends it.

    use std::sync::mpsc;
    use std::thread::JoinHandle;

    use windows::Win32::Foundation::{LPARAM, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_CONTROL, MOD_NOREPEAT, VK_B,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetMessageW, PostThreadMessageW, MSG, WM_HOTKEY, WM_QUIT,
    };

    use super::super::{TriggerError, TriggerResult};
    use crate::coordinator::{CoordinatorHandle, TriggerKind};

    const HOTKEY_ID: i32 = 1;

    pub struct Worker {
        thread_id: u32,
        thread: Option<JoinHandle<()>>,
    }

    pub fn spawn(handle: CoordinatorHandle) -> TriggerResult<Worker> {
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = std::thread::Builder::new()
            .name("hotkey".to_string())
            .spawn(move || {
                let mods = HOT_KEY_MODIFIERS(MOD_CONTROL.0 | MOD_NOREPEAT.0);
                let registered =
                    unsafe { RegisterHotKey(None, HOTKEY_ID, mods, VK_B.0 as u32) };

                match registered {
                    Ok(()) => {
                        let _ = ready_tx.send(Ok(unsafe { GetCurrentThreadId() }));
                    }
                    Err(err) => {
                        let _ = ready_tx
                            .send(Err(TriggerError::HotkeyRegistration(err.to_string())));
                        return;
                    }
                }

                let mut msg = MSG::default();
                // Returns 0 for WM_QUIT, -1 on error; both end the loop.
                while unsafe { GetMessageW(&mut msg, None, 0, 0) }.0 > 0 {
                    if msg.message == WM_HOTKEY {
                        handle.request_capture_blocking(TriggerKind::Hotkey);
                    }
                }

                unsafe {
                    let _ = UnregisterHotKey(None, HOTKEY_ID);
                }
            })
            .map_err(|e| TriggerError::HotkeyRegistration(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => Ok(Worker {
                thread_id,
                thread: Some(thread),
            }),
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                let _ = thread.join();
                Err(TriggerError::HotkeyRegistration(
                    "hotkey thread exited during startup".to_string(),
                ))
            }
        }
    }

    impl Worker {
        pub fn stop(&mut self) {
            unsafe {
                let _ = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
            }
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}
