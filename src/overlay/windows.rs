//! Win32 overlay windows.
//!
//! Layered mode creates a color-keyed, click-through, topmost pop-up over the
//! target display: everything painted in the key color is invisible and lets
//! input through, so only the dots show. Simple mode creates a plain opaque
//! topmost window and exists as a fallback for machines where layered
//! attributes cannot be applied.
//!
//! The window lives entirely on its render thread (HWNDs are not Send); the
//! thread pumps messages, repaints at ~20 Hz and tears the window down when
//! the backend shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{COLORREF, HWND, RECT};
use windows::Win32::Graphics::Gdi::{
    CreateSolidBrush, DeleteObject, Ellipse, FillRect, GetDC, GetStockObject, ReleaseDC,
    SelectObject, NULL_PEN,
};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetClientRect,
    PeekMessageW, RegisterClassW, SetLayeredWindowAttributes, TranslateMessage, LWA_COLORKEY,
    MSG, PM_REMOVE, WNDCLASSW, WS_DISABLED, WS_EX_LAYERED, WS_EX_NOACTIVATE, WS_EX_TOOLWINDOW,
    WS_EX_TOPMOST, WS_EX_TRANSPARENT, WS_POPUP, WS_VISIBLE,
};

use super::backend::{BackendKind, OverlayBackend};
use super::dots::{Color, DotField};
use super::OverlayError;
use crate::capture::DisplayInfo;

const CLASS_NAME: &str = "SlidetapOverlay\0";
const RENDER_TICK: Duration = Duration::from_millis(50);

/// Color key for layered mode; pixels painted with it are invisible.
const KEY_COLOR: Color = Color { r: 0, g: 0, b: 0 };

/// Opaque backdrop for simple mode.
const SIMPLE_BG: Color = Color { r: 0x20, g: 0x20, b: 0x20 };

static CLASS_REGISTERED: Mutex<bool> = Mutex::new(false);

fn colorref(c: Color) -> COLORREF {
    COLORREF((c.r as u32) | ((c.g as u32) << 8) | ((c.b as u32) << 16))
}

/// Blend `fg` toward `bg`; the color key makes faded dots vanish into the
/// desktop in layered mode.
fn blend(fg: Color, bg: Color, alpha: f32) -> Color {
    let mix = |f: u8, b: u8| -> u8 {
        (b as f32 + (f as f32 - b as f32) * alpha).round().clamp(0.0, 255.0) as u8
    };
    Color {
        r: mix(fg.r, bg.r),
        g: mix(fg.g, bg.g),
        b: mix(fg.b, bg.b),
    }
}

unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: windows::Win32::Foundation::WPARAM,
    lparam: windows::Win32::Foundation::LPARAM,
) -> windows::Win32::Foundation::LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

fn register_class() -> Result<(), OverlayError> {
    let mut registered = CLASS_REGISTERED.lock();
    if *registered {
        return Ok(());
    }

    unsafe {
        let hinstance = GetModuleHandleW(PCWSTR::null())
            .map_err(|e| OverlayError::WindowCreationFailed(e.to_string()))?;
        let class_name: Vec<u16> = CLASS_NAME.encode_utf16().collect();

        let wc = WNDCLASSW {
            lpfnWndProc: Some(window_proc),
            hInstance: hinstance.into(),
            lpszClassName: PCWSTR(class_name.as_ptr()),
            hbrBackground: CreateSolidBrush(colorref(KEY_COLOR)),
            ..Default::default()
        };

        if RegisterClassW(&wc) == 0 {
            return Err(OverlayError::WindowCreationFailed(
                "RegisterClassW failed".to_string(),
            ));
        }
    }

    *registered = true;
    Ok(())
}

fn create_window(kind: BackendKind, display: &DisplayInfo) -> Result<HWND, OverlayError> {
    register_class()?;

    let ex_style = match kind {
        BackendKind::Layered => {
            WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE
        }
        BackendKind::Simple => WS_EX_TOPMOST | WS_EX_TOOLWINDOW | WS_EX_NOACTIVATE,
    };

    unsafe {
        let hinstance = GetModuleHandleW(PCWSTR::null())
            .map_err(|e| OverlayError::WindowCreationFailed(e.to_string()))?;
        let class_name: Vec<u16> = CLASS_NAME.encode_utf16().collect();

        let hwnd = CreateWindowExW(
            ex_style,
            PCWSTR(class_name.as_ptr()),
            PCWSTR::null(),
            WS_POPUP | WS_VISIBLE | WS_DISABLED,
            display.x,
            display.y,
            display.width as i32,
            display.height as i32,
            None,
            None,
            Some(hinstance.into()),
            None,
        )
        .map_err(|e| OverlayError::WindowCreationFailed(e.to_string()))?;

        if kind == BackendKind::Layered {
            if let Err(e) =
                SetLayeredWindowAttributes(hwnd, colorref(KEY_COLOR), 255, LWA_COLORKEY)
            {
                let _ = DestroyWindow(hwnd);
                return Err(OverlayError::LayeringFailed(e.to_string()));
            }
        }

        Ok(hwnd)
    }
}

fn paint(hwnd: HWND, kind: BackendKind, dots: &DotField, debug_bg: bool) {
    let bg = match kind {
        BackendKind::Layered => KEY_COLOR,
        BackendKind::Simple => SIMPLE_BG,
    };

    unsafe {
        let hdc = GetDC(Some(hwnd));
        if hdc.is_invalid() {
            return;
        }

        let mut rect = RECT::default();
        let _ = GetClientRect(hwnd, &mut rect);

        let bg_brush = CreateSolidBrush(colorref(bg));
        FillRect(hdc, &rect, bg_brush);
        let _ = DeleteObject(bg_brush.into());

        let style = dots.style();

        // A color-keyed window cannot hold a partially transparent fill, so
        // the layered debug indicator is a hairline frame in the dot color.
        if debug_bg && kind == BackendKind::Layered {
            let frame_brush = CreateSolidBrush(colorref(style.color));
            let edges = [
                RECT { left: rect.left, top: rect.top, right: rect.right, bottom: rect.top + 2 },
                RECT { left: rect.left, top: rect.bottom - 2, right: rect.right, bottom: rect.bottom },
                RECT { left: rect.left, top: rect.top, right: rect.left + 2, bottom: rect.bottom },
                RECT { left: rect.right - 2, top: rect.top, right: rect.right, bottom: rect.bottom },
            ];
            for edge in &edges {
                FillRect(hdc, edge, frame_brush);
            }
            let _ = DeleteObject(frame_brush.into());
        }

        let old_pen = SelectObject(hdc, GetStockObject(NULL_PEN));
        let radius = style.radius_px as i32;

        for (dot, alpha) in dots.snapshot(Instant::now()) {
            let brush = CreateSolidBrush(colorref(blend(style.color, bg, alpha)));
            let old_brush = SelectObject(hdc, brush.into());

            // Dot coordinates are virtual-desktop pixels; the window origin
            // sits at the display origin.
            let cx = dot.x - rect.left;
            let cy = dot.y - rect.top;
            let _ = Ellipse(hdc, cx - radius, cy - radius, cx + radius, cy + radius);

            SelectObject(hdc, old_brush);
            let _ = DeleteObject(brush.into());
        }

        SelectObject(hdc, old_pen);
        ReleaseDC(Some(hwnd), hdc);
    }
}

fn pump_messages(hwnd: HWND) {
    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, Some(hwnd), 0, 0, PM_REMOVE).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

pub struct WindowsOverlay {
    kind: BackendKind,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OverlayBackend for WindowsOverlay {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WindowsOverlay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Create the window on its own render thread and wait for the creation
/// result before reporting success, so the auto-fallback policy sees layering
/// failures synchronously.
pub fn create_backend(
    kind: BackendKind,
    display: &DisplayInfo,
    dots: Arc<DotField>,
    debug_bg: bool,
) -> Result<Box<dyn OverlayBackend>, OverlayError> {
    let running = Arc::new(AtomicBool::new(true));
    let thread_running = running.clone();
    let thread_display = display.clone();
    let (created_tx, created_rx) = mpsc::channel::<Result<(), OverlayError>>();

    let thread = std::thread::Builder::new()
        .name(format!("overlay-{kind}"))
        .spawn(move || {
            let hwnd = match create_window(kind, &thread_display) {
                Ok(hwnd) => {
                    let _ = created_tx.send(Ok(()));
                    hwnd
                }
                Err(err) => {
                    let _ = created_tx.send(Err(err));
                    return;
                }
            };

            while thread_running.load(Ordering::SeqCst) {
                pump_messages(hwnd);
                paint(hwnd, kind, &dots, debug_bg);
                std::thread::sleep(RENDER_TICK);
            }

            unsafe {
                let _ = DestroyWindow(hwnd);
            }
        })
        .map_err(|e| OverlayError::WindowCreationFailed(e.to_string()))?;

    match created_rx.recv() {
        Ok(Ok(())) => Ok(Box::new(WindowsOverlay {
            kind,
            running,
            thread: Some(thread),
        })),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(_) => {
            let _ = thread.join();
            Err(OverlayError::WindowCreationFailed(
                "overlay thread exited during creation".to_string(),
            ))
        }
    }
}
