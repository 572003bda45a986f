//! Window events the engine reacts to.

use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Platform event, reduced to what the frame loop consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The user asked to close the window, or the event loop exited.
    CloseRequested,
    /// Keyboard focus gained (`true`) or lost (`false`).
    Focused(bool),
    /// Window hidden (minimized or fully covered) or shown again.
    Occluded(bool),
    /// New inner size in physical pixels. May be zero while minimized.
    Resized { width: u32, height: u32 },
    /// A key went down. Auto-repeat is filtered out.
    KeyPressed(KeyCode),
}

/// Translate a winit window event. Events the engine ignores map to `None`.
pub fn translate_window_event(event: &WindowEvent) -> Option<PlatformEvent> {
    match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(PlatformEvent::CloseRequested),
        WindowEvent::Focused(focused) => Some(PlatformEvent::Focused(*focused)),
        WindowEvent::Occluded(occluded) => Some(PlatformEvent::Occluded(*occluded)),
        WindowEvent::Resized(size) => Some(PlatformEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::KeyboardInput { event, .. } => {
            key_pressed(event.physical_key, event.state, event.repeat)
        }
        _ => None,
    }
}

fn key_pressed(key: PhysicalKey, state: ElementState, repeat: bool) -> Option<PlatformEvent> {
    match (key, state, repeat) {
        (PhysicalKey::Code(code), ElementState::Pressed, false) => {
            Some(PlatformEvent::KeyPressed(code))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;
    use winit::keyboard::NativeKeyCode;

    #[test]
    fn window_state_events() {
        assert_eq!(
            translate_window_event(&WindowEvent::CloseRequested),
            Some(PlatformEvent::CloseRequested)
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Focused(false)),
            Some(PlatformEvent::Focused(false))
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Occluded(true)),
            Some(PlatformEvent::Occluded(true))
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Resized(PhysicalSize::new(1024, 0))),
            Some(PlatformEvent::Resized {
                width: 1024,
                height: 0
            })
        );
        assert_eq!(translate_window_event(&WindowEvent::RedrawRequested), None);
    }

    #[test]
    fn only_fresh_presses_are_reported() {
        let space = PhysicalKey::Code(KeyCode::Space);
        assert_eq!(
            key_pressed(space, ElementState::Pressed, false),
            Some(PlatformEvent::KeyPressed(KeyCode::Space))
        );
        assert_eq!(key_pressed(space, ElementState::Pressed, true), None);
        assert_eq!(key_pressed(space, ElementState::Released, false), None);

        let unknown = PhysicalKey::Unidentified(NativeKeyCode::Unidentified);
        assert_eq!(key_pressed(unknown, ElementState::Pressed, false), None);
    }
}
