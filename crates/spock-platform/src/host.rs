//! Window host driven by `pump_app_events`.

use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, RawDisplayHandle};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowId};

use crate::event::{translate_window_event, PlatformEvent};
use crate::{PlatformConfig, PlatformError, Result};

/// How long to keep pumping at startup while waiting for the window.
const WINDOW_CREATE_TIMEOUT: Duration = Duration::from_secs(5);
const WINDOW_CREATE_POLL: Duration = Duration::from_millis(10);

/// Owns the event loop and the single window.
///
/// Events are pulled with [`WindowHost::pump_events`], which never blocks,
/// so the caller keeps control of its own loop.
pub struct WindowHost {
    handler: HostHandler,
    window: Arc<Window>,
    event_loop: EventLoop<()>,
}

struct HostHandler {
    config: PlatformConfig,
    window: Option<Arc<Window>>,
    events: Vec<PlatformEvent>,
    error: Option<PlatformError>,
}

impl ApplicationHandler for HostHandler {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height))
            .with_resizable(self.config.resizable);

        match event_loop.create_window(attributes) {
            Ok(window) => {
                tracing::info!(
                    "Window created: {}x{} \"{}\"",
                    self.config.width,
                    self.config.height,
                    self.config.title
                );
                self.window = Some(Arc::new(window));
            }
            Err(e) => {
                self.error = Some(PlatformError::WindowCreation(e.to_string()));
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Some(event) = translate_window_event(&event) {
            self.events.push(event);
        }
    }
}

impl WindowHost {
    /// Create the event loop and pump it until the window exists.
    pub fn new(config: PlatformConfig) -> Result<Self> {
        let mut event_loop =
            EventLoop::new().map_err(|e| PlatformError::EventLoop(e.to_string()))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        let mut handler = HostHandler {
            config,
            window: None,
            events: Vec::new(),
            error: None,
        };

        let started = std::time::Instant::now();
        let window = loop {
            let status = event_loop.pump_app_events(Some(WINDOW_CREATE_POLL), &mut handler);

            if let Some(error) = handler.error.take() {
                return Err(error);
            }
            if let Some(window) = &handler.window {
                break Arc::clone(window);
            }
            if let PumpStatus::Exit(code) = status {
                return Err(PlatformError::EventLoop(format!(
                    "exited with code {code} before the window was created"
                )));
            }
            if started.elapsed() > WINDOW_CREATE_TIMEOUT {
                return Err(PlatformError::WindowCreation(
                    "timed out waiting for the window".to_string(),
                ));
            }
        };

        Ok(Self {
            handler,
            window,
            event_loop,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Current inner size in physical pixels.
    pub fn inner_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Title the window was created with.
    pub fn title(&self) -> &str {
        &self.handler.config.title
    }

    pub fn set_title(&self, title: &str) {
        self.window.set_title(title);
    }

    pub fn display_handle(&self) -> Result<RawDisplayHandle> {
        Ok(self.window.display_handle()?.as_raw())
    }

    /// Dispatch pending window-system events without blocking, appending the
    /// ones the engine cares about to `out`.
    pub fn pump_events(&mut self, out: &mut Vec<PlatformEvent>) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.handler);

        out.append(&mut self.handler.events);
        if let PumpStatus::Exit(code) = status {
            tracing::debug!("Event loop exited with code {code}");
            out.push(PlatformEvent::CloseRequested);
        }
    }
}
