//! Handle-based ownership of GPU resources.
//!
//! Every resource lives in a [`ResourceContainer`] and is addressed by a
//! typed handle. Removing a resource retires its GPU object; the object is
//! destroyed once every frame that could still reference it has finished.

use crate::cache::PipelineCache;
use crate::error::{RenderError, Result};
use crate::frame::FRAME_RESOURCE_COUNT;
use crate::key::{
    DescriptorSetLayoutKey, Extent, PipelineConfiguration, PipelineDescription, PipelineLayoutKey,
    MAX_PUSH_CONSTANTS_SIZE,
};
use crate::types::{
    Buffer, BufferLocation, BufferMetadata, BufferUsage, Image, ImageMetadata, Material, Mesh,
    Texture,
};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use vkgfx_core::{
    BufferHandle, Handle, ImageHandle, MaterialHandle, MeshHandle, ResourceContainer, SamplerHandle,
    ShaderModuleHandle, TextureHandle,
};
use vkgfx_gpu::{
    CommandPool, DeferredDeletionQueue, DescriptorSetLayoutBuilder, GpuContext, GraphicsPipeline,
    GraphicsPipelineDesc, PipelineLayout, Sampler, SamplerDesc, ShaderModule, ShaderModuleType,
};

/// GPU object waiting for the frames that used it to finish.
enum Retired {
    Buffer(Buffer),
    Image(Image),
    ShaderModule(ShaderModule),
    Sampler(Sampler),
    Pipeline(GraphicsPipeline),
}

/// Owner of every buffer, image, shader, sampler, texture, material and mesh,
/// plus the caches of layouts and pipelines built from them.
pub struct ResourceManager {
    gpu: Arc<GpuContext>,
    upload_pool: CommandPool,

    buffers: ResourceContainer<Buffer, BufferHandle>,
    images: ResourceContainer<Image, ImageHandle>,
    shader_modules: ResourceContainer<ShaderModule, ShaderModuleHandle>,
    samplers: ResourceContainer<Sampler, SamplerHandle>,
    textures: ResourceContainer<Texture, TextureHandle>,
    materials: ResourceContainer<Material, MaterialHandle>,
    meshes: ResourceContainer<Mesh, MeshHandle>,

    set_layouts: PipelineCache<vk::DescriptorSetLayout, DescriptorSetLayoutKey>,
    pipeline_layouts: PipelineCache<PipelineLayout, PipelineLayoutKey>,
    pipelines: PipelineCache<GraphicsPipeline>,

    retired: DeferredDeletionQueue<Retired>,
    frame_number: u64,
    frame_slot: usize,
}

impl ResourceManager {
    pub fn new(gpu: Arc<GpuContext>) -> Result<Self> {
        let upload_pool = unsafe { CommandPool::new(gpu.device(), gpu.graphics_queue_family())? };

        Ok(Self {
            gpu,
            upload_pool,
            buffers: ResourceContainer::new(),
            images: ResourceContainer::new(),
            shader_modules: ResourceContainer::new(),
            samplers: ResourceContainer::new(),
            textures: ResourceContainer::new(),
            materials: ResourceContainer::new(),
            meshes: ResourceContainer::new(),
            set_layouts: PipelineCache::new(),
            pipeline_layouts: PipelineCache::new(),
            pipelines: PipelineCache::new(),
            retired: DeferredDeletionQueue::new(FRAME_RESOURCE_COUNT),
            frame_number: 0,
            frame_slot: 0,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    /// Frame slot that host writes currently target.
    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    /// Enter a new frame: host writes go to `slot`, and retired objects no
    /// frame in flight can reference any more are destroyed.
    ///
    /// Call after the fence of `slot` has been waited on.
    pub fn begin_frame(&mut self, frame_number: u64, slot: usize) {
        self.frame_number = frame_number;
        self.frame_slot = slot;

        for retired in self.retired.drain_ready(frame_number) {
            self.release(retired);
        }
    }

    /// Number of retired objects not yet destroyed.
    pub fn pending_deletions(&self) -> usize {
        self.retired.pending_count()
    }

    // Buffers

    /// Allocate a buffer of `size` bytes. Mutable buffers get one copy per
    /// frame in flight.
    pub fn create_buffer(&mut self, metadata: BufferMetadata, size: u64) -> Result<BufferHandle> {
        if size == 0 {
            return Err(RenderError::InvalidData("buffer size is zero".to_string()));
        }

        let (aligned_size, slot_count) = buffer_slots(
            metadata,
            size,
            self.gpu.capabilities().min_uniform_buffer_offset_alignment,
        );

        let (location, usage) = match metadata.location {
            BufferLocation::DeviceLocal => (
                MemoryLocation::GpuOnly,
                metadata.usage.to_vk() | vk::BufferUsageFlags::TRANSFER_DST,
            ),
            BufferLocation::HostVisible => (MemoryLocation::CpuToGpu, metadata.usage.to_vk()),
        };

        let gpu = self.gpu.allocator().lock().create_buffer(
            aligned_size * u64::from(slot_count),
            usage,
            location,
            &format!("{:?} buffer", metadata.usage),
        )?;

        let handle = self.buffers.add(Buffer {
            gpu,
            metadata,
            size,
            aligned_size,
            slot_count,
        });

        tracing::debug!(
            "Created {:?} buffer {:?}: {} bytes x {} slots",
            metadata.usage,
            handle,
            size,
            slot_count
        );

        Ok(handle)
    }

    /// Allocate a buffer and fill every slot with `data`.
    pub fn create_buffer_with_data(
        &mut self,
        metadata: BufferMetadata,
        data: &[u8],
    ) -> Result<BufferHandle> {
        let handle = self.create_buffer(metadata, data.len() as u64)?;

        let slot_count = self.buffers.get(handle).map_or(1, |buffer| buffer.slot_count);
        for slot in 0..slot_count as usize {
            if let Err(e) = self.write_buffer_slot(handle, slot, 0, data) {
                self.remove_buffer(handle);
                return Err(e);
            }
        }

        Ok(handle)
    }

    /// Write `data` at `offset` into the current frame's copy of the buffer.
    ///
    /// Host-visible buffers are written in place. Device-local buffers go
    /// through a staging copy that blocks until the GPU has finished it.
    pub fn upload_buffer(&self, handle: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        self.write_buffer_slot(handle, self.frame_slot, offset, data)
    }

    fn write_buffer_slot(
        &self,
        handle: BufferHandle,
        slot: usize,
        offset: u64,
        data: &[u8],
    ) -> Result<()> {
        let buffer = self
            .buffers
            .get(handle)
            .ok_or(RenderError::MissingResource("buffer"))?;

        check_write("buffer", offset, data.len(), buffer.size)?;
        if data.is_empty() {
            return Ok(());
        }

        let target = buffer.dynamic_offset(slot) + offset;
        match buffer.metadata.location {
            BufferLocation::HostVisible => buffer.gpu.write_bytes(target, data)?,
            BufferLocation::DeviceLocal => {
                let destination = buffer.gpu.buffer;
                self.staged_upload(data, |device, cmd, staging| unsafe {
                    let region = vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: target,
                        size: data.len() as u64,
                    };
                    device.cmd_copy_buffer(cmd, staging, destination, &[region]);
                })?;
            }
        }

        Ok(())
    }

    pub fn get_buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.buffers.get(handle)
    }

    /// Retire a buffer. Returns `false` for a stale or null handle.
    pub fn remove_buffer(&mut self, handle: BufferHandle) -> bool {
        let retired = self.buffers.remove(handle).map(Retired::Buffer);
        self.retire(retired)
    }

    // Images

    /// Allocate a sampled 2D image. Its contents are undefined until
    /// [`upload_image`](Self::upload_image).
    pub fn create_image(&mut self, metadata: ImageMetadata) -> Result<ImageHandle> {
        if metadata.width == 0 || metadata.height == 0 {
            return Err(RenderError::InvalidData(format!(
                "image extent {}x{}",
                metadata.width, metadata.height
            )));
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(metadata.format.to_vk())
            .extent(vk::Extent3D {
                width: metadata.width,
                height: metadata.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut image =
            self.gpu
                .allocator()
                .lock()
                .create_image(&create_info, MemoryLocation::GpuOnly, "texture")?;

        let view = match unsafe { image.create_view(self.gpu.device(), vk::ImageAspectFlags::COLOR) }
        {
            Ok(view) => view,
            Err(e) => {
                self.gpu.allocator().lock().free_image(&mut image)?;
                return Err(e.into());
            }
        };

        let handle = self.images.add(Image {
            gpu: image,
            view,
            metadata,
        });

        tracing::debug!(
            "Created {}x{} {:?} image {:?}",
            metadata.width,
            metadata.height,
            metadata.format,
            handle
        );

        Ok(handle)
    }

    /// Allocate an image and upload `data` into it.
    pub fn create_image_with_data(
        &mut self,
        metadata: ImageMetadata,
        data: &[u8],
    ) -> Result<ImageHandle> {
        let handle = self.create_image(metadata)?;
        if let Err(e) = self.upload_image(handle, data) {
            self.remove_image(handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Replace the whole image with `data` and leave it ready for sampling.
    pub fn upload_image(&self, handle: ImageHandle, data: &[u8]) -> Result<()> {
        let image = self
            .images
            .get(handle)
            .ok_or(RenderError::MissingResource("image"))?;

        let expected = image.metadata.byte_size();
        if data.len() as u64 != expected {
            return Err(RenderError::InvalidData(format!(
                "image upload of {} bytes, expected {expected}",
                data.len()
            )));
        }

        let target = image.gpu.image;
        let extent = image.gpu.extent;
        self.staged_upload(data, |device, cmd, staging| unsafe {
            record_image_upload(device, cmd, staging, target, extent);
        })
    }

    pub fn get_image(&self, handle: ImageHandle) -> Option<&Image> {
        self.images.get(handle)
    }

    pub fn remove_image(&mut self, handle: ImageHandle) -> bool {
        let retired = self.images.remove(handle).map(Retired::Image);
        self.retire(retired)
    }

    /// Copy `data` into a temporary host-visible buffer and run `record` on a
    /// one-time command buffer that reads from it.
    fn staged_upload<F>(&self, data: &[u8], record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer, vk::Buffer),
    {
        let device = self.gpu.device();
        let mut staging = self.gpu.allocator().lock().create_buffer(
            data.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "staging",
        )?;
        let staging_buffer = staging.buffer;

        let result = staging.write_bytes(0, data).and_then(|()| unsafe {
            self.upload_pool
                .submit_and_wait(device, self.gpu.graphics_queue(), |cmd| {
                    record(device, cmd, staging_buffer);
                })
        });

        self.gpu.allocator().lock().free_buffer(&mut staging)?;
        Ok(result?)
    }

    // Shader modules and samplers

    pub fn create_shader_module(
        &mut self,
        bytes: &[u8],
        ty: ShaderModuleType,
        entry_point: &str,
    ) -> Result<ShaderModuleHandle> {
        let module = unsafe { ShaderModule::new(self.gpu.device(), bytes, ty, entry_point)? };
        Ok(self.shader_modules.add(module))
    }

    pub fn get_shader_module(&self, handle: ShaderModuleHandle) -> Option<&ShaderModule> {
        self.shader_modules.get(handle)
    }

    /// Retire a shader module. Pipelines already built from it stay usable.
    pub fn remove_shader_module(&mut self, handle: ShaderModuleHandle) -> bool {
        let retired = self.shader_modules.remove(handle).map(Retired::ShaderModule);
        self.retire(retired)
    }

    pub fn create_sampler(&mut self, desc: SamplerDesc) -> Result<SamplerHandle> {
        let sampler =
            unsafe { Sampler::new(self.gpu.device(), self.gpu.capabilities(), desc)? };
        Ok(self.samplers.add(sampler))
    }

    pub fn get_sampler(&self, handle: SamplerHandle) -> Option<&Sampler> {
        self.samplers.get(handle)
    }

    pub fn remove_sampler(&mut self, handle: SamplerHandle) -> bool {
        let retired = self.samplers.remove(handle).map(Retired::Sampler);
        self.retire(retired)
    }

    // Textures, materials and meshes

    pub fn create_texture(&mut self, texture: Texture) -> Result<TextureHandle> {
        check_texture(&self.images, &self.samplers, &texture)?;
        Ok(self.textures.add(texture))
    }

    /// Point a texture at another image or sampler.
    pub fn update_texture(&mut self, handle: TextureHandle, texture: Texture) -> Result<()> {
        check_texture(&self.images, &self.samplers, &texture)?;
        replace(&mut self.textures, handle, texture, "texture")
    }

    pub fn get_texture(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle)
    }

    /// Forget a texture. The image and sampler stay alive.
    pub fn remove_texture(&mut self, handle: TextureHandle) -> bool {
        self.textures.remove(handle).is_some()
    }

    /// Register a material. Every non-null slot must name a live resource.
    pub fn create_material(&mut self, material: Material) -> Result<MaterialHandle> {
        check_material(&self.buffers, &self.textures, &material)?;
        Ok(self.materials.add(material))
    }

    /// Replace the slots of a material. Draws recorded after this call see
    /// the new resources.
    pub fn update_material(&mut self, handle: MaterialHandle, material: Material) -> Result<()> {
        check_material(&self.buffers, &self.textures, &material)?;
        replace(&mut self.materials, handle, material, "material")
    }

    pub fn get_material(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle)
    }

    pub fn remove_material(&mut self, handle: MaterialHandle) -> bool {
        self.materials.remove(handle).is_some()
    }

    /// Register a mesh. Its vertex and index buffers must be live.
    pub fn create_mesh(&mut self, mesh: Mesh) -> Result<MeshHandle> {
        check_mesh(&self.buffers, &mesh)?;
        Ok(self.meshes.add(mesh))
    }

    pub fn update_mesh(&mut self, handle: MeshHandle, mesh: Mesh) -> Result<()> {
        check_mesh(&self.buffers, &mesh)?;
        replace(&mut self.meshes, handle, mesh, "mesh")
    }

    pub fn get_mesh(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle)
    }

    pub fn remove_mesh(&mut self, handle: MeshHandle) -> bool {
        self.meshes.remove(handle).is_some()
    }

    /// Make room for `additional` buffers without reallocating.
    pub fn reserve_buffers(&mut self, additional: usize) {
        self.buffers.reserve(additional);
    }

    pub fn reserve_images(&mut self, additional: usize) {
        self.images.reserve(additional);
    }

    pub fn reserve_textures(&mut self, additional: usize) {
        self.textures.reserve(additional);
    }

    pub fn reserve_materials(&mut self, additional: usize) {
        self.materials.reserve(additional);
    }

    pub fn reserve_meshes(&mut self, additional: usize) {
        self.meshes.reserve(additional);
    }

    // Layouts and pipelines

    pub fn get_or_create_descriptor_set_layout(
        &mut self,
        key: &DescriptorSetLayoutKey,
    ) -> Result<vk::DescriptorSetLayout> {
        let device = self.gpu.device();
        self.set_layouts
            .get_or_create(key, |key| unsafe {
                DescriptorSetLayoutBuilder::from_capabilities(key.capabilities).build(device)
            })
            .copied()
            .map_err(Into::into)
    }

    pub fn get_or_create_pipeline_layout(
        &mut self,
        key: &PipelineLayoutKey,
    ) -> Result<vk::PipelineLayout> {
        if let Some(layout) = self.pipeline_layouts.get(key) {
            return Ok(layout.handle());
        }

        let push_size = key.push_constant_size();
        if push_size > MAX_PUSH_CONSTANTS_SIZE
            || push_size > self.gpu.capabilities().max_push_constants_size
        {
            return Err(RenderError::PushConstantsTooLarge(push_size as usize));
        }

        let set_layouts = key
            .set_layout_keys()
            .map(|set_key| self.get_or_create_descriptor_set_layout(&set_key))
            .collect::<Result<Vec<_>>>()?;
        let push_ranges: Vec<_> = key.push_constants.iter().map(|range| range.to_vk()).collect();

        let device = self.gpu.device();
        let layout = self
            .pipeline_layouts
            .get_or_create(key, |_| unsafe {
                PipelineLayout::new(device, &set_layouts, &push_ranges)
            })?;

        Ok(layout.handle())
    }

    pub fn get_or_create_pipeline(&mut self, config: &PipelineConfiguration) -> Result<vk::Pipeline> {
        let gpu = &self.gpu;
        let shader_modules = &self.shader_modules;
        self.pipelines
            .get_or_create(config, |config| create_pipeline(gpu, shader_modules, config))
            .map(GraphicsPipeline::handle)
    }

    /// Resolve a draw's pipeline and its layout for the given target.
    pub fn resolve_pipeline(
        &mut self,
        description: &PipelineDescription,
        render_pass: vk::RenderPass,
        extent: Extent,
    ) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
        let layout = self.get_or_create_pipeline_layout(&description.layout_key())?;
        let config = description.configuration(layout, render_pass, extent);
        let pipeline = self.get_or_create_pipeline(&config)?;
        Ok((pipeline, layout))
    }

    /// Retire every cached pipeline so the next draws rebuild them.
    pub fn invalidate_pipelines(&mut self) {
        let frame = self.frame_number;
        for pipeline in self.pipelines.drain() {
            self.retired.queue(Retired::Pipeline(pipeline), frame);
        }
    }

    fn retire(&mut self, retired: Option<Retired>) -> bool {
        match retired {
            Some(retired) => {
                self.retired.queue(retired, self.frame_number);
                true
            }
            None => false,
        }
    }

    fn release(&self, retired: Retired) {
        let device = self.gpu.device();
        match retired {
            Retired::Buffer(mut buffer) => {
                if let Err(e) = self.gpu.allocator().lock().free_buffer(&mut buffer.gpu) {
                    tracing::warn!("Failed to free buffer: {e}");
                }
            }
            Retired::Image(mut image) => {
                unsafe { device.destroy_image_view(image.view, None) };
                if let Err(e) = self.gpu.allocator().lock().free_image(&mut image.gpu) {
                    tracing::warn!("Failed to free image: {e}");
                }
            }
            Retired::ShaderModule(module) => unsafe { module.destroy(device) },
            Retired::Sampler(sampler) => unsafe { sampler.destroy(device) },
            Retired::Pipeline(pipeline) => unsafe { pipeline.destroy(device) },
        }
    }

    /// Destroy every resource, cached layout and pipeline.
    ///
    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self) {
        let mut retired = self.retired.drain_all();
        retired.extend(self.pipelines.drain().map(Retired::Pipeline));
        retired.extend(self.buffers.drain().map(Retired::Buffer));
        retired.extend(self.images.drain().map(Retired::Image));
        retired.extend(self.shader_modules.drain().map(Retired::ShaderModule));
        retired.extend(self.samplers.drain().map(Retired::Sampler));

        tracing::info!("Destroying {} GPU resources", retired.len());
        for item in retired {
            self.release(item);
        }

        self.textures.clear();
        self.materials.clear();
        self.meshes.clear();

        let device = self.gpu.device();
        for layout in self.pipeline_layouts.drain() {
            layout.destroy(device);
        }
        for layout in self.set_layouts.drain() {
            device.destroy_descriptor_set_layout(layout, None);
        }
        self.upload_pool.destroy(device);
    }
}

fn create_pipeline(
    gpu: &GpuContext,
    shader_modules: &ResourceContainer<ShaderModule, ShaderModuleHandle>,
    config: &PipelineConfiguration,
) -> Result<GraphicsPipeline> {
    let capabilities = gpu.capabilities();
    if config.render.wireframe && !capabilities.supports_wireframe {
        return Err(RenderError::Unsupported("wireframe rendering".to_string()));
    }

    if let Some(attribute) = config
        .vertex_layout
        .attributes
        .iter()
        .find(|attribute| attribute.ty.to_vk_format() == vk::Format::UNDEFINED)
    {
        return Err(RenderError::Unsupported(format!(
            "{:?} vertex attribute at location {}; split matrices into column vectors",
            attribute.ty, attribute.location
        )));
    }

    let mut stages = Vec::with_capacity(config.shader.modules().len());
    for &handle in config.shader.modules() {
        let module = shader_modules
            .get(handle)
            .ok_or(RenderError::MissingResource("shader module"))?;
        if module.ty() == ShaderModuleType::Geometry && !capabilities.supports_geometry_shader {
            return Err(RenderError::Unsupported("geometry shaders".to_string()));
        }
        stages.push(module.stage_create_info());
    }

    let desc = GraphicsPipelineDesc {
        stages,
        vertex_bindings: config.vertex_layout.binding_descriptions(),
        vertex_attributes: config.vertex_layout.attribute_descriptions(),
        topology: config.vertex_layout.topology.to_vk(),
        extent: config.extent.to_vk(),
        render_pass: config.render_pass,
        layout: config.pipeline_layout,
        cull_back_faces: config.render.cull_backfaces,
        wireframe: config.render.wireframe,
        depth_test: config.render.depth_test,
        alpha_blending: config.render.alpha_blending,
        depth_bias: config.render.depth_bias,
    };

    let pipeline = unsafe { GraphicsPipeline::new(gpu.device(), &desc)? };

    tracing::debug!(
        "Built pipeline for {}x{} with {} stages",
        config.extent.width,
        config.extent.height,
        desc.stages.len()
    );

    Ok(pipeline)
}

/// Transition `image` for a transfer, copy `staging` into it and make it
/// readable by fragment shaders.
unsafe fn record_image_upload(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    staging: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent3D,
) {
    let range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let to_transfer = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range);

    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::TOP_OF_PIPE,
        vk::PipelineStageFlags::TRANSFER,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&to_transfer),
    );

    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .image_subresource(vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        })
        .image_extent(extent);

    device.cmd_copy_buffer_to_image(
        cmd,
        staging,
        image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        &[region],
    );

    let to_shader = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range);

    device.cmd_pipeline_barrier(
        cmd,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&to_shader),
    );
}

/// Slot size and slot count for a buffer. Uniform slots are padded to the
/// dynamic offset alignment.
fn buffer_slots(metadata: BufferMetadata, size: u64, uniform_alignment: u64) -> (u64, u32) {
    let aligned_size = match metadata.usage {
        BufferUsage::Uniform => vkgfx_gpu::capabilities::align_up(size, uniform_alignment),
        BufferUsage::VertexIndex => size,
    };
    let slot_count = if metadata.is_mutable {
        FRAME_RESOURCE_COUNT as u32
    } else {
        1
    };
    (aligned_size, slot_count)
}

fn check_write(resource: &'static str, offset: u64, len: usize, size: u64) -> Result<()> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RenderError::OutOfBounds {
            resource,
            offset,
            len,
            size,
        }),
    }
}

/// Both the image and the sampler must be live.
fn check_texture<I, S>(
    images: &ResourceContainer<I, ImageHandle>,
    samplers: &ResourceContainer<S, SamplerHandle>,
    texture: &Texture,
) -> Result<()> {
    if !images.contains(texture.image) {
        return Err(RenderError::MissingResource("texture image"));
    }
    if !samplers.contains(texture.sampler) {
        return Err(RenderError::MissingResource("texture sampler"));
    }
    Ok(())
}

/// Null slots are allowed, anything else must be live.
fn check_material<B, T>(
    buffers: &ResourceContainer<B, BufferHandle>,
    textures: &ResourceContainer<T, TextureHandle>,
    material: &Material,
) -> Result<()> {
    if material.uniform_buffer.is_valid() && !buffers.contains(material.uniform_buffer) {
        return Err(RenderError::MissingResource("material uniform buffer"));
    }
    let slots = [material.albedo, material.normal_map, material.shadow_map];
    if slots
        .iter()
        .any(|&texture| texture.is_valid() && !textures.contains(texture))
    {
        return Err(RenderError::MissingResource("material texture"));
    }
    Ok(())
}

fn check_mesh<B>(buffers: &ResourceContainer<B, BufferHandle>, mesh: &Mesh) -> Result<()> {
    let buffers_live = mesh
        .vertex_buffers
        .iter()
        .chain(std::iter::once(&mesh.index_buffer))
        .all(|slice| buffers.contains(slice.buffer));
    if !buffers_live {
        return Err(RenderError::MissingResource("mesh buffer"));
    }
    Ok(())
}

/// Overwrite the object behind a live handle in place.
fn replace<T, H: Handle>(
    container: &mut ResourceContainer<T, H>,
    handle: H,
    value: T,
    what: &'static str,
) -> Result<()> {
    let slot = container
        .get_mut(handle)
        .ok_or(RenderError::MissingResource(what))?;
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferSlice, IndexType};

    const UNIFORM: BufferMetadata =
        BufferMetadata::new(BufferUsage::Uniform, BufferLocation::HostVisible, true);

    #[test]
    fn mutable_uniform_buffers_get_aligned_slots() {
        assert_eq!(buffer_slots(UNIFORM, 144, 256), (256, 3));
    }

    #[test]
    fn immutable_vertex_buffers_keep_their_size() {
        let metadata =
            BufferMetadata::new(BufferUsage::VertexIndex, BufferLocation::DeviceLocal, false);
        assert_eq!(buffer_slots(metadata, 1000, 256), (1000, 1));
    }

    #[test]
    fn writes_must_stay_inside_the_resource() {
        assert!(check_write("buffer", 0, 64, 64).is_ok());
        assert!(check_write("buffer", 60, 4, 64).is_ok());
        assert!(matches!(
            check_write("buffer", 61, 4, 64),
            Err(RenderError::OutOfBounds { offset: 61, .. })
        ));
        assert!(check_write("buffer", u64::MAX, 1, 64).is_err());
    }

    fn mesh_over(buffer: BufferHandle) -> Mesh {
        Mesh {
            vertex_buffers: vec![BufferSlice::new(buffer, 0)],
            index_buffer: BufferSlice::new(buffer, 1024),
            index_type: IndexType::U16,
            index_count: 36,
            index_offset: 0,
            vertex_offset: 0,
        }
    }

    #[test]
    fn updates_replace_in_place() {
        let mut buffers: ResourceContainer<(), BufferHandle> = ResourceContainer::new();
        let first = buffers.add(());
        let second = buffers.add(());

        let mut meshes: ResourceContainer<Mesh, MeshHandle> = ResourceContainer::new();
        let handle = meshes.add(mesh_over(first));

        let updated = mesh_over(second);
        check_mesh(&buffers, &updated).unwrap();
        replace(&mut meshes, handle, updated.clone(), "mesh").unwrap();

        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes.get(handle), Some(&updated));
    }

    #[test]
    fn updating_a_removed_object_fails() {
        let mut materials: ResourceContainer<Material, MaterialHandle> = ResourceContainer::new();
        let stale = materials.add(Material::default());
        materials.remove(stale);
        let live = materials.add(Material::default());

        assert!(matches!(
            replace(&mut materials, stale, Material::default(), "material"),
            Err(RenderError::MissingResource("material"))
        ));
        assert!(matches!(
            replace(&mut materials, MaterialHandle::NULL, Material::default(), "material"),
            Err(RenderError::MissingResource("material"))
        ));
        assert!(materials.contains(live));
    }

    #[test]
    fn updates_validate_like_creation() {
        let mut buffers: ResourceContainer<(), BufferHandle> = ResourceContainer::new();
        let removed = buffers.add(());
        buffers.remove(removed);
        let live = buffers.add(());
        assert!(matches!(
            check_mesh(&buffers, &mesh_over(removed)),
            Err(RenderError::MissingResource("mesh buffer"))
        ));
        assert!(check_mesh(&buffers, &mesh_over(live)).is_ok());

        let mut images: ResourceContainer<(), ImageHandle> = ResourceContainer::new();
        let samplers: ResourceContainer<(), SamplerHandle> = ResourceContainer::new();
        let image = images.add(());
        let texture = Texture {
            image,
            sampler: SamplerHandle::NULL,
        };
        assert!(matches!(
            check_texture(&images, &samplers, &texture),
            Err(RenderError::MissingResource("texture sampler"))
        ));

        let mut textures: ResourceContainer<Texture, TextureHandle> = ResourceContainer::new();
        let albedo = textures.add(texture);
        let material = Material {
            albedo,
            ..Default::default()
        };
        assert!(check_material(&buffers, &textures, &material).is_ok());

        textures.remove(albedo);
        assert!(matches!(
            check_material(&buffers, &textures, &material),
            Err(RenderError::MissingResource("material texture"))
        ));
        let unbacked = Material {
            uniform_buffer: removed,
            ..Default::default()
        };
        assert!(check_material(&buffers, &textures, &unbacked).is_err());
    }

    #[test]
    fn reserving_keeps_handles_valid() {
        let mut buffers: ResourceContainer<(), BufferHandle> = ResourceContainer::new();
        let buffer = buffers.add(());
        let mut meshes: ResourceContainer<Mesh, MeshHandle> = ResourceContainer::new();
        let handle = meshes.add(mesh_over(buffer));
        meshes.reserve(64);
        assert!(meshes.contains(handle));
        assert_eq!(meshes.len(), 1);
    }
}
