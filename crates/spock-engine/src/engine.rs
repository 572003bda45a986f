//! Top-level engine: window, renderer and loop.

use anyhow::Result;
use spock_platform::WindowHost;
use tracing::info;

use crate::config::EngineConfig;
use crate::frame_loop::{FrameLoop, LoopStats};
use crate::mesh::{MeshAsset, MeshSpace};
use crate::renderer::Renderer;
use crate::vulkan::VulkanBackend;

/// A running engine instance.
///
/// Dropping it waits for the GPU, releases every Vulkan object and then
/// closes the window.
pub struct Engine {
    renderer: Renderer<VulkanBackend>,
    frame_loop: FrameLoop,
    host: WindowHost,
}

impl Engine {
    /// Open the window and bring up the renderer.
    pub fn init(config: &EngineConfig) -> Result<Self> {
        info!("{} starting...", config.title);

        let host = WindowHost::new(config.platform_config())?;
        let backend = VulkanBackend::new(config, &host)?;
        let mut renderer = Renderer::new(backend, config)?;

        if config.geometry {
            renderer.add_mesh(&MeshAsset::rectangle(), MeshSpace::Clip)?;
        }

        let frame_loop = FrameLoop::new(config.idle_interval, host.inner_size());
        info!("Engine ready");

        Ok(Self {
            renderer,
            frame_loop,
            host,
        })
    }

    /// Run the frame loop until the window closes or a frame fails.
    pub fn run(&mut self) -> Result<LoopStats> {
        self.frame_loop.run(&mut self.renderer, &mut self.host)
    }
}
