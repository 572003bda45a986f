//! Descriptor set management.

use std::sync::Arc;

use ash::vk;

use crate::error::{GpuError, Result};

/// Descriptor set layout builder.
///
/// Bindings are declared without stage flags; the stage mask passed to
/// [`DescriptorLayoutBuilder::build`] is OR'd into every binding.
#[derive(Debug, Default, Clone)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorLayoutBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-descriptor binding.
    pub fn add_binding(&mut self, binding: u32, descriptor_type: vk::DescriptorType) -> &mut Self {
        self.add_binding_with_stages(binding, descriptor_type, vk::ShaderStageFlags::empty())
    }

    /// Add a binding that already carries its own stage flags.
    pub fn add_binding_with_stages(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> &mut Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Remove all bindings.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// The bindings as they will be submitted for `stages`.
    pub fn resolved_bindings(
        &self,
        stages: vk::ShaderStageFlags,
    ) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings
            .iter()
            .map(|binding| {
                let stage_flags = binding.stage_flags | stages;
                binding.stage_flags(stage_flags)
            })
            .collect()
    }

    /// Build the descriptor set layout.
    pub fn build(
        &self,
        device: &Arc<ash::Device>,
        stages: vk::ShaderStageFlags,
    ) -> Result<DescriptorSetLayout> {
        let bindings = self.resolved_bindings(stages);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        // SAFETY: device is live and the bindings outlive the call.
        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None)? };

        Ok(DescriptorSetLayout {
            layout,
            bindings,
            device: Arc::clone(device),
        })
    }
}

/// Owned descriptor set layout that remembers the bindings it was built from.
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    device: Arc<ash::Device>,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        // SAFETY: pipelines and sets using this layout are gone by now.
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Share of a pool's capacity reserved for one descriptor type.
#[derive(Debug, Clone, Copy)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

/// Pool sizes for `max_sets` sets: `ratio * max_sets` descriptors per type, truncated.
///
/// A ratio that yields zero descriptors is rejected.
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Result<Vec<vk::DescriptorPoolSize>> {
    ratios
        .iter()
        .map(|r| {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                clippy::cast_precision_loss
            )]
            let descriptor_count = (r.ratio * max_sets as f32) as u32;
            if descriptor_count == 0 {
                return Err(GpuError::InvalidState(format!(
                    "Descriptor pool size for {:?} is zero ({} x {max_sets})",
                    r.descriptor_type, r.ratio
                )));
            }
            Ok(vk::DescriptorPoolSize {
                ty: r.descriptor_type,
                descriptor_count,
            })
        })
        .collect()
}

/// Sets handed out by a pool against its `max_sets` capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    max_sets: u32,
    allocated: u32,
}

impl PoolUsage {
    pub fn new(max_sets: u32) -> Self {
        Self {
            max_sets,
            allocated: 0,
        }
    }

    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    pub fn remaining(&self) -> u32 {
        self.max_sets - self.allocated
    }

    /// Count one more set, failing once the pool is full.
    pub fn reserve(&mut self) -> Result<()> {
        if self.allocated >= self.max_sets {
            return Err(GpuError::InvalidState(format!(
                "Descriptor pool exhausted ({} sets)",
                self.max_sets
            )));
        }
        self.allocated += 1;
        Ok(())
    }

    /// Forget every set, as after a pool reset.
    pub fn reset(&mut self) {
        self.allocated = 0;
    }
}

/// Descriptor pool allocator.
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
    usage: PoolUsage,
    device: Arc<ash::Device>,
}

impl DescriptorAllocator {
    /// Create a pool able to hold `max_sets` sets sized by `ratios`.
    pub fn init_pool(
        device: &Arc<ash::Device>,
        max_sets: u32,
        ratios: &[PoolSizeRatio],
    ) -> Result<Self> {
        let sizes = pool_sizes(max_sets, ratios)?;
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        // SAFETY: device is live.
        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self {
            pool,
            usage: PoolUsage::new(max_sets),
            device: Arc::clone(device),
        })
    }

    pub fn usage(&self) -> PoolUsage {
        self.usage
    }

    /// Return every set to the pool.
    pub fn clear_descriptors(&mut self) -> Result<()> {
        // SAFETY: callers only reset when no set from this pool is in use.
        unsafe {
            self.device
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        self.usage.reset();
        Ok(())
    }

    /// Allocate one descriptor set with `layout`.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        self.usage.reserve()?;

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        // SAFETY: pool and layout belong to this device.
        let sets = unsafe { self.device.allocate_descriptor_sets(&alloc_info)? };
        Ok(sets[0])
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        // SAFETY: sets from this pool are idle by the time it is dropped.
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// Point a storage image binding at `image_view`.
///
/// # Safety
/// Device and image view must be valid and the set not in use.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .image_layout(layout);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));

    // SAFETY: guaranteed by the caller.
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}
