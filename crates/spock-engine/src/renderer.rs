//! Double-buffered frame orchestration.

use anyhow::{bail, Context, Result};
use ash::vk;
use spock_platform::KeyCode;
use tracing::{debug, info};

use crate::backend::{FrameBackend, SwapchainInfo};
use crate::config::{timeout_ns, BackgroundMode, EngineConfig};
use crate::effects::{builtin_effects, find_effect, next_effect, ComputeEffect};
use crate::frame::FrameCounter;
use crate::mesh::{scene_matrix, MeshAsset, MeshSpace, SceneMesh};
use crate::record::{flash_color, record_frame, Background, FramePlan, GeometryPlan};

/// Drives a [`FrameBackend`] through one frame at a time.
pub struct Renderer<B: FrameBackend> {
    backend: B,
    counter: FrameCounter,
    background: BackgroundMode,
    effects: Vec<ComputeEffect>,
    current_effect: usize,
    geometry: bool,
    scene: Vec<SceneMesh>,
    window_extent: vk::Extent2D,
    fence_timeout_ns: u64,
    acquire_timeout_ns: u64,
}

impl<B: FrameBackend> Renderer<B> {
    pub fn new(backend: B, config: &EngineConfig) -> Result<Self> {
        let effects = builtin_effects();
        let current_effect = find_effect(&effects, &config.effect).with_context(|| {
            let names: Vec<_> = effects.iter().map(|effect| effect.name).collect();
            format!(
                "unknown effect '{}' (available: {})",
                config.effect,
                names.join(", ")
            )
        })?;

        let window_extent = backend.swapchain_extent();

        Ok(Self {
            backend,
            counter: FrameCounter::new(),
            background: config.background,
            effects,
            current_effect,
            geometry: config.geometry,
            scene: Vec::new(),
            window_extent,
            fence_timeout_ns: timeout_ns(config.fence_timeout),
            acquire_timeout_ns: timeout_ns(config.acquire_timeout),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn frame_number(&self) -> u64 {
        self.counter.number()
    }

    pub fn current_effect(&self) -> &ComputeEffect {
        &self.effects[self.current_effect]
    }

    /// Upload `asset` and add it to the drawn scene, placed in `space`.
    pub fn add_mesh(&mut self, asset: &MeshAsset, space: MeshSpace) -> Result<()> {
        asset.validate()?;
        let handle = self.backend.upload_mesh(asset)?;
        debug!(
            "Uploaded mesh '{}' ({} vertices, {} indices)",
            asset.name,
            asset.vertices.len(),
            asset.indices.len()
        );
        self.scene.push(SceneMesh {
            handle,
            name: asset.name.clone(),
            surfaces: asset.surfaces.clone(),
            space,
        });
        Ok(())
    }

    pub fn cycle_effect(&mut self) {
        self.current_effect = next_effect(self.current_effect, self.effects.len());
        info!("Background effect: {}", self.current_effect().name);
    }

    pub fn key_pressed(&mut self, key: KeyCode) {
        if matches!(key, KeyCode::Space | KeyCode::Tab) {
            self.cycle_effect();
        }
    }

    /// Render one frame: wait, reset, acquire, record, submit, present, advance.
    ///
    /// A present that reports an out-of-date or suboptimal swapchain triggers
    /// a rebuild at the last known window size.
    pub fn render_frame(&mut self) -> Result<()> {
        let slot = self.counter.slot();
        let _span = tracing::trace_span!("frame", number = self.counter.number(), slot).entered();

        self.backend
            .wait_for_fence(slot, self.fence_timeout_ns)
            .context("waiting for frame fence")?;
        self.backend.reset_fence(slot)?;

        let image_index = self
            .backend
            .acquire_next_image(slot, self.acquire_timeout_ns)
            .context("acquiring swapchain image")?;

        let draw_extent = self.backend.draw_extent();
        let plan = FramePlan {
            image_index,
            draw_extent,
            swapchain_extent: self.backend.swapchain_extent(),
            background: self.background(),
            geometry: self.geometry.then(|| GeometryPlan {
                view_proj: scene_matrix(draw_extent),
                meshes: &self.scene,
            }),
        };
        self.backend
            .record(slot, image_index, &mut |rec| record_frame(rec, &plan))?;
        self.backend.submit(slot)?;

        let rebuild = self.backend.present(slot, image_index)?;
        self.counter.advance();

        if rebuild {
            debug!("Swapchain out of date after present");
            let vk::Extent2D { width, height } = self.window_extent;
            self.rebuild_swapchain(width, height)?;
        }

        Ok(())
    }

    /// Rebuild the swapchain for a new window size.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.window_extent = vk::Extent2D { width, height };
        self.rebuild_swapchain(width, height)
    }

    fn rebuild_swapchain(&mut self, width: u32, height: u32) -> Result<()> {
        let info = self.backend.recreate_swapchain(width, height)?;
        check_swapchain(&info)?;
        info!(
            "Swapchain rebuilt: {}x{}, {} images",
            info.extent.width, info.extent.height, info.image_count
        );
        Ok(())
    }

    fn background(&self) -> Background {
        match self.background {
            BackgroundMode::Clear => Background::Clear(flash_color(self.counter.number())),
            BackgroundMode::Compute => Background::Compute {
                effect: self.current_effect,
                push: self.current_effect().push,
            },
        }
    }

    pub fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_idle()
    }
}

fn check_swapchain(info: &SwapchainInfo) -> Result<()> {
    if info.view_count != info.image_count {
        bail!(
            "swapchain has {} images but {} views",
            info.image_count,
            info.view_count
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, Command, StubBackend};

    fn renderer(config: &EngineConfig) -> Renderer<StubBackend> {
        Renderer::new(StubBackend::new(800, 600), config).unwrap()
    }

    fn compute_only() -> EngineConfig {
        EngineConfig::default().with_geometry(false)
    }

    #[test]
    fn frames_alternate_slots() {
        let mut renderer = renderer(&compute_only());
        for _ in 0..4 {
            renderer.render_frame().unwrap();
        }

        let waits: Vec<usize> = renderer
            .backend()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Wait(slot) => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(waits, vec![0, 1, 0, 1]);
        assert_eq!(renderer.frame_number(), 4);
    }

    #[test]
    fn frame_steps_run_in_order() {
        let mut renderer = renderer(&compute_only());
        renderer.render_frame().unwrap();

        assert_eq!(
            renderer.backend().calls,
            vec![
                Call::Wait(0),
                Call::Reset(0),
                Call::Acquire(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
    }

    #[test]
    fn five_compute_frames() {
        let mut renderer = renderer(&compute_only());
        for _ in 0..5 {
            renderer.render_frame().unwrap();
        }

        let backend = renderer.backend();
        assert_eq!(backend.count(|c| matches!(c, Call::Present(..))), 5);
        assert_eq!(backend.count(|c| matches!(c, Call::Wait(_))), 5);
        for frame in &backend.frames {
            assert!(frame.contains(&Command::Dispatch {
                effect: 0,
                group_counts: [50, 38, 1],
            }));
        }
    }

    #[test]
    fn stale_present_rebuilds_at_window_size() {
        let mut backend = StubBackend::new(800, 600);
        backend.stale_presents = vec![1];
        let mut renderer = Renderer::new(backend, &compute_only()).unwrap();

        for _ in 0..3 {
            renderer.render_frame().unwrap();
        }

        let calls = &renderer.backend().calls;
        let present = calls
            .iter()
            .position(|c| *c == Call::Present(1, 1))
            .unwrap();
        assert_eq!(calls[present + 1], Call::Recreate(800, 600));
        assert_eq!(calls[present + 2], Call::Wait(0));
        assert_eq!(renderer.frame_number(), 3);
    }

    #[test]
    fn resize_rebuilds_swapchain() {
        let mut renderer = renderer(&compute_only());
        renderer.resize(1024, 768).unwrap();
        renderer.render_frame().unwrap();

        let backend = renderer.backend();
        assert_eq!(backend.calls[0], Call::Recreate(1024, 768));
        let blit = backend.frames[0]
            .iter()
            .find_map(|c| match c {
                Command::Blit { dst_extent, .. } => Some(*dst_extent),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            blit,
            vk::Extent2D {
                width: 1024,
                height: 768
            }
        );
    }

    #[test]
    fn wait_failure_stops_the_frame() {
        let mut backend = StubBackend::new(800, 600);
        backend.fail_wait = Some("device lost");
        let mut renderer = Renderer::new(backend, &compute_only()).unwrap();

        assert!(renderer.render_frame().is_err());
        assert_eq!(renderer.backend().calls, vec![Call::Wait(0)]);
        assert_eq!(renderer.frame_number(), 0);
    }

    #[test]
    fn clear_background_skips_compute() {
        let config = compute_only().with_background(BackgroundMode::Clear);
        let mut renderer = renderer(&config);
        renderer.render_frame().unwrap();

        let frame = &renderer.backend().frames[0];
        assert!(frame.iter().any(|c| matches!(c, Command::Clear(_))));
        assert!(!frame.iter().any(|c| matches!(c, Command::Dispatch { .. })));
    }

    #[test]
    fn meshes_are_drawn_after_upload() {
        let mut renderer = renderer(&EngineConfig::default());
        renderer
            .add_mesh(&MeshAsset::rectangle(), MeshSpace::Clip)
            .unwrap();
        renderer.render_frame().unwrap();

        let backend = renderer.backend();
        assert_eq!(backend.calls[0], Call::Upload("rectangle".to_string()));
        let worlds: Vec<_> = backend.frames[0]
            .iter()
            .filter_map(|c| match c {
                Command::Mesh(_, _, world) => Some(*world),
                _ => None,
            })
            .collect();
        assert_eq!(worlds, vec![glam::Mat4::IDENTITY]);
        assert!(backend.frames[0].contains(&Command::Triangle));
    }

    #[test]
    fn invalid_mesh_is_not_uploaded() {
        let mut renderer = renderer(&EngineConfig::default());
        let mut mesh = MeshAsset::rectangle();
        mesh.indices.push(9);
        assert!(renderer.add_mesh(&mesh, MeshSpace::World).is_err());
        assert!(renderer.backend().calls.is_empty());
    }

    #[test]
    fn keys_cycle_effects() {
        let mut renderer = renderer(&compute_only());
        assert_eq!(renderer.current_effect().name, "gradient");

        renderer.key_pressed(KeyCode::Space);
        assert_eq!(renderer.current_effect().name, "sky");
        renderer.render_frame().unwrap();
        assert!(renderer.backend().frames[0].contains(&Command::Dispatch {
            effect: 1,
            group_counts: [50, 38, 1],
        }));

        renderer.key_pressed(KeyCode::KeyW);
        assert_eq!(renderer.current_effect().name, "sky");
        renderer.key_pressed(KeyCode::Tab);
        assert_eq!(renderer.current_effect().name, "gradient");
    }

    #[test]
    fn unknown_effect_is_rejected() {
        let mut config = EngineConfig::default();
        config.effect = "plasma".to_string();
        assert!(Renderer::new(StubBackend::new(800, 600), &config).is_err());
    }

    #[test]
    fn mismatched_views_are_an_error() {
        let info = SwapchainInfo {
            extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            image_count: 3,
            view_count: 2,
        };
        assert!(check_swapchain(&info).is_err());
    }
}
