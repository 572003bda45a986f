//! Device-free stand-ins used by the unit tests.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{bail, Result};
use ash::vk;
use glam::Mat4;
use spock_platform::PlatformEvent;

use crate::backend::{FrameBackend, SwapchainInfo};
use crate::effects::ComputePushConstants;
use crate::frame_loop::FrameHost;
use crate::mesh::{GeoSurface, MeshAsset, MeshHandle};
use crate::record::{CommandRecorder, FrameImage};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Transition(FrameImage, vk::ImageLayout, vk::ImageLayout),
    Clear(FrameImage),
    Dispatch { effect: usize, group_counts: [u32; 3] },
    BeginGeometry(vk::Extent2D),
    Triangle,
    Mesh(MeshHandle, GeoSurface, Mat4),
    EndGeometry,
    Blit {
        src: FrameImage,
        dst: FrameImage,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
}

#[derive(Debug, Default)]
pub struct RecordingRecorder {
    pub commands: Vec<Command>,
}

impl CommandRecorder for RecordingRecorder {
    fn transition(&mut self, image: FrameImage, from: vk::ImageLayout, to: vk::ImageLayout) {
        self.commands.push(Command::Transition(image, from, to));
    }

    fn clear(&mut self, image: FrameImage, _color: [f32; 4]) {
        self.commands.push(Command::Clear(image));
    }

    fn dispatch_background(
        &mut self,
        effect: usize,
        _push: &ComputePushConstants,
        group_counts: [u32; 3],
    ) {
        self.commands.push(Command::Dispatch {
            effect,
            group_counts,
        });
    }

    fn begin_geometry(&mut self, extent: vk::Extent2D) {
        self.commands.push(Command::BeginGeometry(extent));
    }

    fn draw_triangle(&mut self) {
        self.commands.push(Command::Triangle);
    }

    fn draw_mesh(&mut self, mesh: MeshHandle, surface: GeoSurface, world: &Mat4) {
        self.commands.push(Command::Mesh(mesh, surface, *world));
    }

    fn end_geometry(&mut self) {
        self.commands.push(Command::EndGeometry);
    }

    fn blit(
        &mut self,
        src: FrameImage,
        dst: FrameImage,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    ) {
        self.commands.push(Command::Blit {
            src,
            dst,
            src_extent,
            dst_extent,
        });
    }
}

/// Backend operation, as seen by [`StubBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Wait(usize),
    Reset(usize),
    Acquire(usize),
    Record(usize, u32),
    Submit(usize),
    Present(usize, u32),
    Recreate(u32, u32),
    Upload(String),
    WaitIdle,
}

/// Backend that logs every call and keeps the commands of each recorded frame.
#[derive(Debug)]
pub struct StubBackend {
    pub calls: Vec<Call>,
    pub frames: Vec<Vec<Command>>,
    pub image_count: u32,
    pub swapchain_extent: vk::Extent2D,
    pub draw_extent: vk::Extent2D,
    /// Zero-based present calls that report an out-of-date swapchain.
    pub stale_presents: Vec<usize>,
    /// Fail the next fence wait with this message.
    pub fail_wait: Option<&'static str>,
    next_image: u32,
    presents: usize,
    meshes: usize,
}

impl StubBackend {
    pub fn new(width: u32, height: u32) -> Self {
        let extent = vk::Extent2D { width, height };
        Self {
            calls: Vec::new(),
            frames: Vec::new(),
            image_count: 3,
            swapchain_extent: extent,
            draw_extent: extent,
            stale_presents: Vec::new(),
            fail_wait: None,
            next_image: 0,
            presents: 0,
            meshes: 0,
        }
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|call| matches(call)).count()
    }

    pub fn submits(&self) -> usize {
        self.count(|call| matches!(call, Call::Submit(_)))
    }
}

impl FrameBackend for StubBackend {
    fn wait_for_fence(&mut self, slot: usize, _timeout_ns: u64) -> Result<()> {
        self.calls.push(Call::Wait(slot));
        if let Some(message) = self.fail_wait.take() {
            bail!(message);
        }
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Reset(slot));
        Ok(())
    }

    fn acquire_next_image(&mut self, slot: usize, _timeout_ns: u64) -> Result<u32> {
        self.calls.push(Call::Acquire(slot));
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        Ok(index)
    }

    fn record(
        &mut self,
        slot: usize,
        image_index: u32,
        record: &mut dyn FnMut(&mut dyn CommandRecorder),
    ) -> Result<()> {
        self.calls.push(Call::Record(slot, image_index));
        let mut recorder = RecordingRecorder::default();
        record(&mut recorder);
        self.frames.push(recorder.commands);
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        self.calls.push(Call::Submit(slot));
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<bool> {
        self.calls.push(Call::Present(slot, image_index));
        let stale = self.stale_presents.contains(&self.presents);
        self.presents += 1;
        Ok(stale)
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    fn draw_extent(&self) -> vk::Extent2D {
        self.draw_extent
    }

    fn recreate_swapchain(&mut self, width: u32, height: u32) -> Result<SwapchainInfo> {
        self.calls.push(Call::Recreate(width, height));
        self.swapchain_extent = vk::Extent2D { width, height };
        self.next_image = 0;
        Ok(SwapchainInfo {
            extent: self.swapchain_extent,
            image_count: self.image_count as usize,
            view_count: self.image_count as usize,
        })
    }

    fn upload_mesh(&mut self, mesh: &MeshAsset) -> Result<MeshHandle> {
        self.calls.push(Call::Upload(mesh.name.clone()));
        let handle = MeshHandle(self.meshes);
        self.meshes += 1;
        Ok(handle)
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.calls.push(Call::WaitIdle);
        Ok(())
    }
}

/// Host that replays one batch of events per pump and records idle calls.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    pub batches: VecDeque<Vec<PlatformEvent>>,
    pub idles: Vec<Duration>,
    pub pumps: usize,
    /// Frame numbers passed to `show_frame_number`.
    pub shown_frames: Vec<u64>,
}

impl ScriptedHost {
    pub fn new(batches: Vec<Vec<PlatformEvent>>) -> Self {
        Self {
            batches: batches.into(),
            ..Self::default()
        }
    }
}

impl FrameHost for ScriptedHost {
    fn pump_events(&mut self, events: &mut Vec<PlatformEvent>) {
        self.pumps += 1;
        match self.batches.pop_front() {
            Some(batch) => events.extend(batch),
            // Script exhausted: close so loops under test always finish.
            None => events.push(PlatformEvent::CloseRequested),
        }
    }

    fn idle(&mut self, interval: Duration) {
        self.idles.push(interval);
    }

    fn show_frame_number(&mut self, frame: u64) {
        self.shown_frames.push(frame);
    }
}
