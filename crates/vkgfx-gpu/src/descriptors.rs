//! Descriptor set layouts built from capability flags, plus pool helpers.

use crate::error::Result;
use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Resources a material exposes to its shaders.
    ///
    /// Each flag owns a fixed binding slot, so two layouts built from the same
    /// flags are interchangeable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DescriptorCapabilities: u32 {
        /// Per-object uniform buffer at binding 0, addressed with a dynamic offset.
        const UNIFORM_BUFFER = 1 << 0;
        /// Albedo sampler at binding 1.
        const ALBEDO_TEXTURE = 1 << 1;
        /// Normal map sampler at binding 2.
        const NORMAL_MAP = 1 << 2;
        /// Shadow map sampler at binding 3.
        const SHADOW_MAP = 1 << 3;
    }
}

impl Default for DescriptorCapabilities {
    fn default() -> Self {
        Self::UNIFORM_BUFFER | Self::ALBEDO_TEXTURE
    }
}

impl DescriptorCapabilities {
    /// Binding slot reserved for a single capability flag.
    pub fn binding(self) -> Option<u32> {
        [
            Self::UNIFORM_BUFFER,
            Self::ALBEDO_TEXTURE,
            Self::NORMAL_MAP,
            Self::SHADOW_MAP,
        ]
        .iter()
        .position(|&flag| flag == self)
        .map(|slot| slot as u32)
    }

    /// Number of combined image samplers these capabilities need.
    pub fn sampler_count(self) -> u32 {
        (self & !Self::UNIFORM_BUFFER).bits().count_ones()
    }
}

/// Descriptor set layout builder.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder holding one binding per capability, in binding order.
    pub fn from_capabilities(capabilities: DescriptorCapabilities) -> Self {
        let mut builder = Self::new();

        for flag in capabilities.iter() {
            let Some(binding) = flag.binding() else {
                continue;
            };
            builder = if flag == DescriptorCapabilities::UNIFORM_BUFFER {
                builder.binding(
                    binding,
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    vk::ShaderStageFlags::VERTEX
                        | vk::ShaderStageFlags::GEOMETRY
                        | vk::ShaderStageFlags::FRAGMENT,
                )
            } else {
                builder.binding(
                    binding,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT,
                )
            };
        }

        builder
    }

    /// Append a single-descriptor binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Bindings appended so far.
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'a>] {
        &self.bindings
    }

    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        Ok(device.create_descriptor_set_layout(&layout_info, None)?)
    }
}

/// Descriptor pool recycled as a whole with `reset`.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Create a pool sized for `max_sets` sets that each use at most
    /// one dynamic uniform buffer and `samplers_per_set` samplers.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, max_sets: u32, samplers_per_set: u32) -> Result<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(max_sets),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_sets * samplers_per_set.max(1)),
        ];

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = device.create_descriptor_pool(&create_info, None)?;
        Ok(Self { pool })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set, returning `None` when the pool is exhausted so the
    /// caller can move on to a fresh pool.
    ///
    /// # Safety
    /// The device and layout must be valid.
    pub unsafe fn try_allocate(
        &self,
        device: &ash::Device,
        layout: vk::DescriptorSetLayout,
    ) -> Result<Option<vk::DescriptorSet>> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        match device.allocate_descriptor_sets(&alloc_info) {
            Ok(sets) => Ok(sets.into_iter().next()),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Return every set allocated from this pool.
    ///
    /// # Safety
    /// No set from this pool may be referenced by a pending command buffer.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        Ok(())
    }

    /// # Safety
    /// The device must be valid and the pool must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}

/// Point a dynamic uniform buffer binding at `range` bytes of `buffer`.
///
/// # Safety
/// Device, set and buffer must be valid.
pub unsafe fn write_dynamic_uniform_buffer(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    range: u64,
) {
    let buffer_info = vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
        .buffer_info(std::slice::from_ref(&buffer_info));

    device.update_descriptor_sets(&[write], &[]);
}

/// Bind a sampled image in `SHADER_READ_ONLY_OPTIMAL` layout.
///
/// # Safety
/// Device, set, view and sampler must be valid.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    dst_set: vk::DescriptorSet,
    binding: u32,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_view(image_view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let write = vk::WriteDescriptorSet::default()
        .dst_set(dst_set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(std::slice::from_ref(&image_info));

    device.update_descriptor_sets(&[write], &[]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities() {
        let caps = DescriptorCapabilities::default();
        assert!(caps.contains(DescriptorCapabilities::UNIFORM_BUFFER));
        assert!(caps.contains(DescriptorCapabilities::ALBEDO_TEXTURE));
        assert!(!caps.contains(DescriptorCapabilities::NORMAL_MAP));
        assert_eq!(caps.sampler_count(), 1);
    }

    #[test]
    fn bindings_follow_capabilities() {
        let caps = DescriptorCapabilities::UNIFORM_BUFFER
            | DescriptorCapabilities::NORMAL_MAP
            | DescriptorCapabilities::SHADOW_MAP;
        let builder = DescriptorSetLayoutBuilder::from_capabilities(caps);
        let bindings = builder.bindings();

        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert_eq!(
            bindings[0].stage_flags,
            vk::ShaderStageFlags::VERTEX
                | vk::ShaderStageFlags::GEOMETRY
                | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(bindings[1].binding, 2);
        assert_eq!(bindings[2].binding, 3);
        for sampler in &bindings[1..] {
            assert_eq!(
                sampler.descriptor_type,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER
            );
            assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
        }
    }

    #[test]
    fn texture_only_layout_skips_uniform_binding() {
        let builder =
            DescriptorSetLayoutBuilder::from_capabilities(DescriptorCapabilities::ALBEDO_TEXTURE);
        assert_eq!(builder.bindings().len(), 1);
        assert_eq!(builder.bindings()[0].binding, 1);
    }

    #[test]
    fn binding_slot_requires_single_flag() {
        assert_eq!(DescriptorCapabilities::SHADOW_MAP.binding(), Some(3));
        assert_eq!(DescriptorCapabilities::default().binding(), None);
    }
}
