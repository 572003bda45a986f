//! Spock rendering engine.
//!
//! A double-buffered Vulkan 1.3 frame loop: a compute background written
//! into an offscreen HDR image, an optional geometry pass, then a blit to
//! the swapchain.
//!
//! # Example
//!
//! ```ignore
//! use spock_engine::{Engine, EngineConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     spock_engine::logging::init()?;
//!     let mut engine = Engine::init(&EngineConfig::from_args()?)?;
//!     engine.run()?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod effects;
pub mod engine;
pub mod frame;
pub mod frame_loop;
pub mod logging;
pub mod mesh;
pub mod record;
pub mod renderer;
pub mod vulkan;

#[cfg(test)]
mod testing;

pub use backend::{FrameBackend, SwapchainInfo};
pub use config::{BackgroundMode, EngineConfig};
pub use effects::{ComputeEffect, ComputePushConstants};
pub use engine::Engine;
pub use frame::{FrameCounter, FRAME_OVERLAP};
pub use frame_loop::{FrameHost, FrameLoop, LoopStats, Step};
pub use mesh::{GeoSurface, GpuDrawPushConstants, MeshAsset, MeshHandle, MeshSpace, Vertex};
pub use record::{CommandRecorder, FrameImage};
pub use renderer::Renderer;
pub use vulkan::VulkanBackend;
