//! Main loop: pump events, then render or idle.

use std::time::{Duration, Instant};

use anyhow::Result;
use spock_platform::{KeyCode, PlatformEvent, WindowHost};
use tracing::{debug, info};

use crate::backend::FrameBackend;
use crate::renderer::Renderer;

/// Source of window events for the loop.
pub trait FrameHost {
    /// Append pending events to `events` without blocking.
    fn pump_events(&mut self, events: &mut Vec<PlatformEvent>);

    /// Called instead of rendering while the window is hidden or unfocused.
    fn idle(&mut self, interval: Duration) {
        std::thread::sleep(interval);
    }

    /// Called before each rendered frame with its number.
    fn show_frame_number(&mut self, _frame: u64) {}
}

impl FrameHost for WindowHost {
    fn pump_events(&mut self, events: &mut Vec<PlatformEvent>) {
        Self::pump_events(self, events);
    }

    fn show_frame_number(&mut self, frame: u64) {
        let title = format!("{} - frame: {frame}", self.title());
        self.set_title(&title);
    }
}

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Rendered,
    Idled,
    Quit,
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    pub frames: u64,
    pub idle_iterations: u64,
    pub elapsed: Duration,
}

impl LoopStats {
    /// Average frames per second over the whole run, idle time included.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Window state that decides whether a frame is rendered.
#[derive(Debug)]
pub struct FrameLoop {
    idle_interval: Duration,
    focused: bool,
    occluded: bool,
    minimized: bool,
    quit: bool,
    window_size: (u32, u32),
    events: Vec<PlatformEvent>,
}

impl FrameLoop {
    pub fn new(idle_interval: Duration, window_size: (u32, u32)) -> Self {
        Self {
            idle_interval,
            focused: true,
            occluded: false,
            minimized: window_size.0 == 0 || window_size.1 == 0,
            quit: false,
            window_size,
            events: Vec::new(),
        }
    }

    /// Rendering pauses while the window is unfocused, occluded or zero-sized.
    pub fn paused(&self) -> bool {
        !self.focused || self.occluded || self.minimized
    }

    /// Handle pending events, then render one frame or idle.
    pub fn step<B, H>(&mut self, renderer: &mut Renderer<B>, host: &mut H) -> Result<Step>
    where
        B: FrameBackend,
        H: FrameHost,
    {
        let mut events = std::mem::take(&mut self.events);
        host.pump_events(&mut events);
        for event in events.drain(..) {
            self.handle_event(renderer, event)?;
        }
        self.events = events;

        if self.quit {
            return Ok(Step::Quit);
        }
        if self.paused() {
            host.idle(self.idle_interval);
            return Ok(Step::Idled);
        }

        host.show_frame_number(renderer.frame_number());
        renderer.render_frame()?;
        Ok(Step::Rendered)
    }

    /// Run until the window closes. Any frame error ends the loop.
    pub fn run<B, H>(&mut self, renderer: &mut Renderer<B>, host: &mut H) -> Result<LoopStats>
    where
        B: FrameBackend,
        H: FrameHost,
    {
        let started = Instant::now();
        let mut stats = LoopStats::default();

        loop {
            match self.step(renderer, host)? {
                Step::Rendered => stats.frames += 1,
                Step::Idled => stats.idle_iterations += 1,
                Step::Quit => break,
            }
        }

        renderer.wait_idle()?;
        stats.elapsed = started.elapsed();
        info!(
            "Rendered {} frames in {:.2}s ({:.1} fps avg, {} idle iterations)",
            stats.frames,
            stats.elapsed.as_secs_f64(),
            stats.average_fps(),
            stats.idle_iterations
        );

        Ok(stats)
    }

    fn handle_event<B: FrameBackend>(
        &mut self,
        renderer: &mut Renderer<B>,
        event: PlatformEvent,
    ) -> Result<()> {
        match event {
            PlatformEvent::CloseRequested | PlatformEvent::KeyPressed(KeyCode::Escape) => {
                info!("Close requested");
                self.quit = true;
            }
            PlatformEvent::Focused(focused) => {
                debug!("Window focus: {focused}");
                self.focused = focused;
            }
            PlatformEvent::Occluded(occluded) => {
                debug!("Window occluded: {occluded}");
                self.occluded = occluded;
            }
            PlatformEvent::Resized { width, height } => {
                self.minimized = width == 0 || height == 0;
                if !self.minimized && (width, height) != self.window_size {
                    self.window_size = (width, height);
                    renderer.resize(width, height)?;
                }
            }
            PlatformEvent::KeyPressed(key) => renderer.key_pressed(key),
        }
        Ok(())
    }
}
