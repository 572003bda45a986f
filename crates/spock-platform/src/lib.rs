//! Platform abstraction for the Spock engine.
//!
//! Provides window creation and non-blocking event polling via winit.

mod event;
mod host;

use thiserror::Error;

pub use event::{translate_window_event, PlatformEvent};
pub use host::WindowHost;
pub use winit::keyboard::KeyCode;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Window creation failed: {0}")]
    WindowCreation(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
    #[error("Window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            title: "Spock".to_string(),
            width: 800,
            height: 450,
            resizable: false,
        }
    }
}
