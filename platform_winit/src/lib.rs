//! Window creation, cursor capture and key bindings on top of winit.
#![forbid(unsafe_code)]

use std::fmt;

pub use winit::dpi::PhysicalSize;
pub use winit::event::{DeviceEvent, ElementState, Event, MouseButton, WindowEvent};
pub use winit::event_loop::{ControlFlow, EventLoop};
pub use winit::keyboard::{KeyCode, PhysicalKey};
pub use winit::window::{CursorGrabMode, Window};

#[derive(Debug)]
pub enum WindowInitError {
    EventLoop(String),
    Window(winit::error::OsError),
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowInitError::EventLoop(message) => {
                write!(f, "event loop initialization failed: {}", message)
            }
            WindowInitError::Window(err) => write!(f, "window creation failed: {}", err),
        }
    }
}

impl std::error::Error for WindowInitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WindowInitError::EventLoop(_) => None,
            WindowInitError::Window(err) => Some(err),
        }
    }
}

pub fn create_window(
    title: &str,
    width: u32,
    height: u32,
) -> Result<(EventLoop<()>, Window), WindowInitError> {
    let event_loop = EventLoop::new().map_err(|err| WindowInitError::EventLoop(err.to_string()))?;
    let window = winit::window::WindowBuilder::new()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(width, height))
        .build(&event_loop)
        .map_err(WindowInitError::Window)?;
    Ok((event_loop, window))
}

/// Grabs or releases the pointer. Locked is preferred; platforms without it
/// fall back to Confined. Returns whether the pointer is now captured.
pub fn set_cursor_capture(window: &Window, captured: bool) -> bool {
    if captured {
        let grabbed = window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
            .is_ok();
        window.set_cursor_visible(!grabbed);
        grabbed
    } else {
        let _ = window.set_cursor_grab(CursorGrabMode::None);
        window.set_cursor_visible(true);
        false
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    ReleaseCapture,
}

/// Physical-key bindings, so WASD stays put on non-QWERTY layouts.
pub fn key_action(key: PhysicalKey) -> Option<KeyAction> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    match code {
        KeyCode::KeyW | KeyCode::ArrowUp => Some(KeyAction::Forward),
        KeyCode::KeyS | KeyCode::ArrowDown => Some(KeyAction::Back),
        KeyCode::KeyA | KeyCode::ArrowLeft => Some(KeyAction::Left),
        KeyCode::KeyD | KeyCode::ArrowRight => Some(KeyAction::Right),
        KeyCode::Space => Some(KeyAction::Jump),
        KeyCode::Escape => Some(KeyAction::ReleaseCapture),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_keys_map_to_actions() {
        assert_eq!(
            key_action(PhysicalKey::Code(KeyCode::KeyW)),
            Some(KeyAction::Forward)
        );
        assert_eq!(
            key_action(PhysicalKey::Code(KeyCode::KeyD)),
            Some(KeyAction::Right)
        );
        assert_eq!(
            key_action(PhysicalKey::Code(KeyCode::Space)),
            Some(KeyAction::Jump)
        );
        assert_eq!(
            key_action(PhysicalKey::Code(KeyCode::Escape)),
            Some(KeyAction::ReleaseCapture)
        );
        assert_eq!(key_action(PhysicalKey::Code(KeyCode::KeyQ)), None);
    }

    #[test]
    fn logical_keys_do_not_bind() {
        assert_eq!(
            key_action(PhysicalKey::Unidentified(
                winit::keyboard::NativeKeyCode::Unidentified
            )),
            None
        );
    }
}
