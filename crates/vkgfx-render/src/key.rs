//! Structural keys for pipelines and their layouts.
//!
//! Two keys compare equal exactly when the objects built from them would be
//! interchangeable, so they can address a [`PipelineCache`](crate::PipelineCache).

use ash::vk;
use vkgfx_core::ShaderModuleHandle;
use vkgfx_gpu::DescriptorCapabilities;

/// Largest push constant block a draw may carry, in bytes.
pub const MAX_PUSH_CONSTANTS_SIZE: u32 = 64;

/// Stages that see the push constant block.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::from_raw(
    vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw(),
);

/// Descriptor set holding the per-frame camera buffer.
pub const FRAME_SET: u32 = 0;
/// Descriptor set holding material resources.
pub const MATERIAL_SET: u32 = 1;
/// Descriptor set holding the per-object uniform buffer.
pub const OBJECT_SET: u32 = 2;

/// Type of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Vec2f,
    Vec3f,
    Vec4f,
    /// Four normalized bytes packed in 32 bits, typically a color.
    UInt32,
    Mat2f,
    Mat3f,
    Mat4f,
}

impl AttributeType {
    /// Vertex format for this attribute. Matrices span several locations
    /// and map to `UNDEFINED`, which pipeline creation rejects.
    pub const fn to_vk_format(self) -> vk::Format {
        match self {
            Self::Vec2f => vk::Format::R32G32_SFLOAT,
            Self::Vec3f => vk::Format::R32G32B32_SFLOAT,
            Self::Vec4f => vk::Format::R32G32B32A32_SFLOAT,
            Self::UInt32 => vk::Format::R8G8B8A8_UNORM,
            Self::Mat2f | Self::Mat3f | Self::Mat4f => vk::Format::UNDEFINED,
        }
    }
}

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VertexTopology {
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl VertexTopology {
    pub const fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Self::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            Self::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
        }
    }
}

/// One per-vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBinding {
    pub stride: u32,
}

/// One attribute read from a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub binding: u32,
    pub location: u32,
    pub offset: u32,
    pub ty: AttributeType,
}

/// Vertex input state of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    pub bindings: Vec<VertexBinding>,
    pub attributes: Vec<VertexAttribute>,
    pub topology: VertexTopology,
}

impl VertexLayout {
    /// Binding descriptions, numbered by position.
    pub fn binding_descriptions(&self) -> Vec<vk::VertexInputBindingDescription> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(index, binding)| {
                vk::VertexInputBindingDescription::default()
                    .binding(index as u32)
                    .stride(binding.stride)
                    .input_rate(vk::VertexInputRate::VERTEX)
            })
            .collect()
    }

    pub fn attribute_descriptions(&self) -> Vec<vk::VertexInputAttributeDescription> {
        self.attributes
            .iter()
            .map(|attribute| {
                vk::VertexInputAttributeDescription::default()
                    .binding(attribute.binding)
                    .location(attribute.location)
                    .offset(attribute.offset)
                    .format(attribute.ty.to_vk_format())
            })
            .collect()
    }
}

/// Fixed-function switches that change the pipeline object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderConfiguration {
    pub cull_backfaces: bool,
    pub wireframe: bool,
    pub depth_test: bool,
    pub alpha_blending: bool,
    pub depth_bias: bool,
}

impl Default for RenderConfiguration {
    fn default() -> Self {
        Self {
            cull_backfaces: true,
            wireframe: false,
            depth_test: true,
            alpha_blending: false,
            depth_bias: false,
        }
    }
}

/// Ordered shader modules of a pipeline. Each module carries its own stage
/// and entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ShaderKey(pub Vec<ShaderModuleHandle>);

impl ShaderKey {
    pub fn new(modules: impl IntoIterator<Item = ShaderModuleHandle>) -> Self {
        Self(modules.into_iter().collect())
    }

    pub fn modules(&self) -> &[ShaderModuleHandle] {
        &self.0
    }
}

/// Framebuffer size a pipeline's viewport was baked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn to_vk(self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

impl From<vk::Extent2D> for Extent {
    fn from(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }
}

/// Byte range of the push constant block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    pub const fn to_vk(self) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: PUSH_CONSTANT_STAGES,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Key of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutKey {
    pub capabilities: DescriptorCapabilities,
}

/// Key of a pipeline layout: one entry per descriptor set, in set order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PipelineLayoutKey {
    pub set_capabilities: Vec<DescriptorCapabilities>,
    pub push_constants: Vec<PushConstantRange>,
}

impl PipelineLayoutKey {
    /// Layout keys of every set, in set order.
    pub fn set_layout_keys(&self) -> impl Iterator<Item = DescriptorSetLayoutKey> + '_ {
        self.set_capabilities
            .iter()
            .map(|&capabilities| DescriptorSetLayoutKey { capabilities })
    }

    /// Total push constant bytes, measured to the end of the furthest range.
    pub fn push_constant_size(&self) -> u32 {
        self.push_constants
            .iter()
            .map(|range| range.offset + range.size)
            .max()
            .unwrap_or(0)
    }
}

/// Everything that identifies one graphics pipeline.
///
/// Layout and render pass compare by native handle, so a recreated render
/// pass never matches a pipeline built for its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineConfiguration {
    pub pipeline_layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub extent: Extent,
    pub shader: ShaderKey,
    pub vertex_layout: VertexLayout,
    pub render: RenderConfiguration,
}

/// What a draw asks for, before layouts and the render pass are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineDescription {
    pub shader: ShaderKey,
    pub vertex_layout: VertexLayout,
    pub render: RenderConfiguration,
    /// Layout of the material set.
    pub material_capabilities: DescriptorCapabilities,
    /// Whether draws bind a per-object uniform buffer in set 2.
    pub object_uniforms: bool,
    /// Push constant bytes used by draws, at most [`MAX_PUSH_CONSTANTS_SIZE`].
    pub push_constant_size: u32,
}

impl PipelineDescription {
    pub fn new(shader: ShaderKey, vertex_layout: VertexLayout) -> Self {
        Self {
            shader,
            vertex_layout,
            render: RenderConfiguration::default(),
            material_capabilities: DescriptorCapabilities::default(),
            object_uniforms: false,
            push_constant_size: 0,
        }
    }

    pub fn with_render(mut self, render: RenderConfiguration) -> Self {
        self.render = render;
        self
    }

    pub fn with_material_capabilities(mut self, capabilities: DescriptorCapabilities) -> Self {
        self.material_capabilities = capabilities;
        self
    }

    pub fn with_object_uniforms(mut self, enabled: bool) -> Self {
        self.object_uniforms = enabled;
        self
    }

    pub fn with_push_constant_size(mut self, size: u32) -> Self {
        self.push_constant_size = size;
        self
    }

    /// Pipeline layout for this description: the frame set, the material
    /// set, and the object set when enabled.
    pub fn layout_key(&self) -> PipelineLayoutKey {
        let mut set_capabilities = vec![
            DescriptorCapabilities::UNIFORM_BUFFER,
            self.material_capabilities,
        ];
        if self.object_uniforms {
            set_capabilities.push(DescriptorCapabilities::UNIFORM_BUFFER);
        }

        let push_constants = if self.push_constant_size > 0 {
            vec![PushConstantRange {
                offset: 0,
                size: self.push_constant_size,
            }]
        } else {
            Vec::new()
        };

        PipelineLayoutKey {
            set_capabilities,
            push_constants,
        }
    }

    /// Full pipeline key once layout, render pass and extent are known.
    pub fn configuration(
        &self,
        pipeline_layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        extent: Extent,
    ) -> PipelineConfiguration {
        PipelineConfiguration {
            pipeline_layout,
            render_pass,
            extent,
            shader: self.shader.clone(),
            vertex_layout: self.vertex_layout.clone(),
            render: self.render,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PipelineCache;
    use ash::vk::Handle;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use vkgfx_core::{Handle as _, ResourceHandle};

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn position_layout() -> VertexLayout {
        VertexLayout {
            bindings: vec![VertexBinding { stride: 12 }],
            attributes: vec![VertexAttribute {
                binding: 0,
                location: 0,
                offset: 0,
                ty: AttributeType::Vec3f,
            }],
            topology: VertexTopology::Triangles,
        }
    }

    fn configuration(width: u32, height: u32) -> PipelineConfiguration {
        let shader = ShaderKey::new([
            ShaderModuleHandle::from_raw(ResourceHandle::new(0, 0)),
            ShaderModuleHandle::from_raw(ResourceHandle::new(1, 0)),
        ]);
        PipelineDescription::new(shader, position_layout()).configuration(
            vk::PipelineLayout::from_raw(1),
            vk::RenderPass::from_raw(2),
            Extent::new(width, height),
        )
    }

    #[test]
    fn equal_configurations_hash_equal() {
        let a = configuration(800, 600);
        let b = configuration(800, 600);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    /// One configuration per field, each differing from `base` in that
    /// field only.
    fn single_field_variants(base: &PipelineConfiguration) -> Vec<PipelineConfiguration> {
        let vary = |change: fn(&mut PipelineConfiguration)| {
            let mut other = base.clone();
            change(&mut other);
            other
        };

        vec![
            vary(|c| c.extent = Extent::new(1920, 1080)),
            vary(|c| c.render_pass = vk::RenderPass::from_raw(3)),
            vary(|c| c.pipeline_layout = vk::PipelineLayout::from_raw(9)),
            vary(|c| c.render.wireframe = true),
            vary(|c| c.vertex_layout.topology = VertexTopology::TriangleStrip),
            vary(|c| c.vertex_layout.bindings[0].stride = 16),
            vary(|c| c.vertex_layout.attributes[0].binding = 1),
            vary(|c| c.vertex_layout.attributes[0].location = 2),
            vary(|c| c.vertex_layout.attributes[0].offset = 4),
            vary(|c| c.vertex_layout.attributes[0].ty = AttributeType::Vec4f),
            vary(|c| c.vertex_layout.bindings.push(VertexBinding { stride: 8 })),
            vary(|c| {
                c.vertex_layout.attributes.push(VertexAttribute {
                    binding: 0,
                    location: 1,
                    offset: 12,
                    ty: AttributeType::Vec2f,
                })
            }),
            vary(|c| c.shader.0.reverse()),
            vary(|c| {
                c.shader
                    .0
                    .push(ShaderModuleHandle::from_raw(ResourceHandle::new(2, 0)))
            }),
            vary(|c| {
                c.shader.0.pop();
            }),
        ]
    }

    #[test]
    fn every_field_takes_part_in_equality() {
        let base = configuration(800, 600);
        for (i, other) in single_field_variants(&base).iter().enumerate() {
            assert_ne!(&base, other, "variant {i} compared equal");
        }
    }

    #[test]
    fn every_field_change_misses_the_cache() {
        let base = configuration(800, 600);
        let variants = single_field_variants(&base);
        let mut cache: PipelineCache<usize> = PipelineCache::new();
        let mut builds = 0;

        for (i, config) in std::iter::once(&base).chain(&variants).enumerate() {
            let built = *cache
                .get_or_create(config, |_| {
                    builds += 1;
                    Ok::<_, ()>(i)
                })
                .unwrap();
            assert_eq!(built, i, "variant {i} hit an existing entry");
        }
        assert_eq!(builds, variants.len() + 1);

        let hit = *cache
            .get_or_create(&configuration(800, 600), |_| Ok::<_, ()>(usize::MAX))
            .unwrap();
        assert_eq!(hit, 0);
        assert_eq!(builds, variants.len() + 1);
    }

    #[test]
    fn attribute_formats() {
        assert_eq!(AttributeType::Vec2f.to_vk_format(), vk::Format::R32G32_SFLOAT);
        assert_eq!(AttributeType::Vec3f.to_vk_format(), vk::Format::R32G32B32_SFLOAT);
        assert_eq!(AttributeType::Vec4f.to_vk_format(), vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(AttributeType::UInt32.to_vk_format(), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(AttributeType::Mat4f.to_vk_format(), vk::Format::UNDEFINED);
    }

    #[test]
    fn vertex_descriptions_follow_layout() {
        let mut layout = position_layout();
        layout.bindings.push(VertexBinding { stride: 8 });
        layout.attributes.push(VertexAttribute {
            binding: 1,
            location: 1,
            offset: 0,
            ty: AttributeType::Vec2f,
        });

        let bindings = layout.binding_descriptions();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].stride, 8);

        let attributes = layout.attribute_descriptions();
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn layout_key_lists_sets_in_order() {
        let description = PipelineDescription::new(ShaderKey::default(), position_layout())
            .with_material_capabilities(DescriptorCapabilities::ALBEDO_TEXTURE)
            .with_object_uniforms(true)
            .with_push_constant_size(64);

        let key = description.layout_key();
        assert_eq!(
            key.set_capabilities,
            vec![
                DescriptorCapabilities::UNIFORM_BUFFER,
                DescriptorCapabilities::ALBEDO_TEXTURE,
                DescriptorCapabilities::UNIFORM_BUFFER,
            ]
        );
        assert_eq!(key.push_constant_size(), 64);
        assert_eq!(key.set_layout_keys().count(), 3);
    }

    #[test]
    fn layout_key_without_object_set_or_push_constants() {
        let key = PipelineDescription::new(ShaderKey::default(), position_layout()).layout_key();
        assert_eq!(key.set_capabilities.len(), 2);
        assert!(key.push_constants.is_empty());
        assert_eq!(key.push_constant_size(), 0);
    }

    #[test]
    fn push_constant_range_uses_shared_stages() {
        let range = PushConstantRange { offset: 0, size: 16 }.to_vk();
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(range.size, 16);
    }
}
