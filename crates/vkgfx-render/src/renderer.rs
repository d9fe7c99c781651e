//! Frame loop: acquire, record, submit and present with three frames in
//! flight.

use crate::camera::{Camera, CameraData, Light};
use crate::draw::{DrawItem, RecordingState};
use crate::error::{RenderError, Result};
use crate::frame::{FrameResources, FrameRing, FRAME_RESOURCE_COUNT};
use crate::key::{DescriptorSetLayoutKey, Extent, FRAME_SET, MATERIAL_SET, OBJECT_SET, PUSH_CONSTANT_STAGES};
use crate::resources::ResourceManager;
use crate::target::RenderTarget;
use crate::types::{BufferLocation, BufferMetadata, BufferUsage};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use vkgfx_core::BufferHandle;
use vkgfx_gpu::command::{begin_command_buffer, submit_wait_only, FrameSubmit};
use vkgfx_gpu::descriptors::{write_combined_image_sampler, write_dynamic_uniform_buffer};
use vkgfx_gpu::render_pass::find_depth_format;
use vkgfx_gpu::{DescriptorCapabilities, GpuContext, GpuError, SurfaceContext};

/// What happened to a frame passed to [`Renderer::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation.
    Presented,
    /// Nothing was drawn: the window is minimized or the swapchain had to be
    /// rebuilt first.
    Skipped,
}

/// How far the current frame slot got through [`Renderer::draw_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FramePhase {
    Idle,
    /// Fence waited on and pools reset.
    Begun,
    /// A swapchain image was acquired, signaling `image_available`.
    Acquired,
    /// The in-flight fence was reset for the upcoming submission.
    FenceReset,
    Submitted,
}

/// Cleanup owed by a frame that failed part way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Abandoned {
    /// `image_available` holds a signal nothing will wait on.
    drain_image_available: bool,
    /// The in-flight fence is unsignaled with no submission to signal it.
    signal_in_flight: bool,
    /// An acquired image was not handed back to the presentation engine.
    recreate_swapchain: bool,
}

impl FramePhase {
    fn abandon(self) -> Abandoned {
        Abandoned {
            drain_image_available: matches!(self, Self::Acquired | Self::FenceReset),
            signal_in_flight: self == Self::FenceReset,
            recreate_swapchain: self >= Self::Acquired,
        }
    }
}

/// Pipeline, layout and set layouts a draw resolved to.
struct ResolvedDraw {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    material_layout: vk::DescriptorSetLayout,
    object_layout: Option<vk::DescriptorSetLayout>,
}

/// Forward renderer drawing indexed meshes into a window.
pub struct Renderer {
    gpu: Arc<GpuContext>,
    surface: SurfaceContext,
    depth_format: vk::Format,
    /// `None` while the window has no area.
    target: Option<RenderTarget>,
    frames: FrameRing<FrameResources>,
    resources: ResourceManager,

    camera: Camera,
    light: Light,
    camera_buffer: BufferHandle,
    clear_color: [f32; 4],

    width: u32,
    height: u32,
    vsync: bool,
    needs_recreate: bool,
    phase: FramePhase,
    frame_number: u64,
}

impl Renderer {
    /// Create a renderer presenting to `window`.
    ///
    /// # Safety
    /// The window must outlive the renderer.
    pub unsafe fn new<W>(
        gpu: Arc<GpuContext>,
        window: &W,
        width: u32,
        height: u32,
        vsync: bool,
    ) -> Result<Self>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let surface = SurfaceContext::from_window(&gpu, window)?;
        let depth_format = find_depth_format(gpu.instance(), gpu.physical_device())?;

        let target = if surface.capabilities(&gpu)?.is_zero_sized() {
            None
        } else {
            Some(RenderTarget::new(
                &gpu,
                &surface,
                depth_format,
                width,
                height,
                vsync,
                None,
            )?)
        };

        let frames = FrameRing::try_new(FRAME_RESOURCE_COUNT, |_| {
            FrameResources::new(gpu.device(), gpu.graphics_queue_family())
        })?;

        let mut resources = ResourceManager::new(gpu.clone())?;
        let camera_buffer = resources.create_buffer(
            BufferMetadata::new(BufferUsage::Uniform, BufferLocation::HostVisible, true),
            std::mem::size_of::<CameraData>() as u64,
        )?;

        let mut camera = Camera::default();
        if height > 0 {
            camera.set_aspect(width as f32 / height as f32);
        }

        tracing::info!(
            "Renderer ready: {}x{}, depth {:?}, {} frames in flight",
            width,
            height,
            depth_format,
            FRAME_RESOURCE_COUNT
        );

        Ok(Self {
            gpu,
            surface,
            depth_format,
            target,
            frames,
            resources,
            camera,
            light: Light::default(),
            camera_buffer,
            clear_color: [0.05, 0.05, 0.08, 1.0],
            width,
            height,
            vsync,
            needs_recreate: false,
            phase: FramePhase::Idle,
            frame_number: 0,
        })
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn light_mut(&mut self) -> &mut Light {
        &mut self.light
    }

    pub fn set_light(&mut self, light: Light) {
        self.light = light;
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Size of the images being rendered, or zero while minimized.
    pub fn extent(&self) -> vk::Extent2D {
        self.target
            .as_ref()
            .map_or_else(vk::Extent2D::default, RenderTarget::extent)
    }

    /// Frames submitted so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Note a new window size. The swapchain is rebuilt before the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) == (self.width, self.height) && self.target.is_some() {
            return;
        }
        self.width = width;
        self.height = height;
        self.needs_recreate = true;
        if width > 0 && height > 0 {
            self.camera.set_aspect(width as f32 / height as f32);
        }
    }

    /// Wait until the current frame slot is free and point host writes at it.
    ///
    /// [`draw_frame`](Self::draw_frame) calls this itself. Call it earlier
    /// to update mutable buffers for the upcoming frame without racing the
    /// GPU.
    pub fn begin_frame(&mut self) -> Result<()> {
        if self.phase != FramePhase::Idle {
            return Ok(());
        }

        let device = self.gpu.device();
        let frame = self.frames.current();
        unsafe {
            frame.sync.wait(device)?;
            frame.reset(device)?;
        }

        self.resources
            .begin_frame(self.frame_number, self.frames.index());
        self.phase = FramePhase::Begun;

        Ok(())
    }

    /// Render `items` and present the result.
    ///
    /// On error the frame is abandoned: the slot is reset on the next call
    /// and an acquired image forces a swapchain rebuild.
    pub fn draw_frame(&mut self, items: &[DrawItem]) -> Result<FrameOutcome> {
        self.begin_frame()?;

        let result = self.render_and_present(items);
        if let Err(e) = &result {
            tracing::warn!("Abandoning frame {}: {e}", self.frame_number);
            self.abandon_frame();
        }
        result
    }

    fn render_and_present(&mut self, items: &[DrawItem]) -> Result<FrameOutcome> {
        if self.needs_recreate {
            self.recreate()?;
        }
        let Some(target) = self.target.as_ref() else {
            return Ok(FrameOutcome::Skipped);
        };

        let extent = target.extent();
        let render_pass = target.render_pass();

        let resolved: Vec<Option<ResolvedDraw>> = items
            .iter()
            .map(|item| {
                resolve_draw(&mut self.resources, item, render_pass, extent.into())
                    .inspect_err(|e| tracing::warn!("Skipping draw: {e}"))
                    .ok()
            })
            .collect();
        let frame_layout = self
            .resources
            .get_or_create_descriptor_set_layout(&DescriptorSetLayoutKey {
                capabilities: DescriptorCapabilities::UNIFORM_BUFFER,
            })?;

        let device = self.gpu.device();
        let loader = self.surface.swapchain_loader();
        let image_available = self.frames.current().sync.image_available;

        let image_index =
            match unsafe { target.swapchain().acquire_next_image(loader, image_available) } {
                Ok((index, suboptimal)) => {
                    self.needs_recreate |= suboptimal;
                    self.phase = FramePhase::Acquired;
                    index
                }
                Err(GpuError::SwapchainOutOfDate) => {
                    self.recreate()?;
                    return Ok(FrameOutcome::Skipped);
                }
                Err(e) => return Err(e.into()),
            };

        let camera_data = CameraData::new(&self.camera, &self.light);
        self.resources
            .upload_buffer(self.camera_buffer, 0, bytemuck::bytes_of(&camera_data))?;

        let slot = self.frames.index();
        let frame = self.frames.current_mut();
        let cmd = frame.command_buffer;

        let mut recorder = FrameRecorder {
            device,
            resources: &self.resources,
            frame,
            cmd,
            slot,
            frame_layout,
            camera_buffer: self.camera_buffer,
            frame_set: vk::DescriptorSet::null(),
            full_scissor: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            },
            state: RecordingState::new(),
        };

        unsafe {
            recorder.record(
                target.render_pass(),
                target.framebuffer(image_index),
                self.clear_color,
                items,
                &resolved,
            )?;
        }

        let render_finished = target.render_finished(image_index);
        let frame = self.frames.current();
        let present_needs_recreate = unsafe {
            frame.sync.reset(device)?;
            self.phase = FramePhase::FenceReset;
            FrameSubmit {
                wait: frame.sync.image_available,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal: render_finished,
                fence: frame.sync.in_flight,
            }
            .submit(device, self.gpu.graphics_queue(), cmd)?;
            self.phase = FramePhase::Submitted;
            target.swapchain().present(
                loader,
                self.gpu.graphics_queue(),
                image_index,
                render_finished,
            )?
        };

        self.finish_frame();

        if present_needs_recreate || self.needs_recreate {
            self.needs_recreate = true;
            self.recreate()?;
        }

        Ok(FrameOutcome::Presented)
    }

    fn finish_frame(&mut self) {
        self.frames.advance();
        self.frame_number += 1;
        self.phase = FramePhase::Idle;
    }

    /// Leave the slot in a state the next [`begin_frame`](Self::begin_frame)
    /// can recover from.
    fn abandon_frame(&mut self) {
        let abandoned = self.phase.abandon();

        if abandoned.drain_image_available {
            let sync = &self.frames.current().sync;
            let fence = if abandoned.signal_in_flight {
                sync.in_flight
            } else {
                vk::Fence::null()
            };
            let drained = unsafe {
                submit_wait_only(
                    self.gpu.device(),
                    self.gpu.graphics_queue(),
                    sync.image_available,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    fence,
                )
            };
            if let Err(e) = drained {
                tracing::error!("Failed to drain image semaphore: {e}");
            }
        }

        if self.phase == FramePhase::Submitted {
            self.finish_frame();
        } else {
            self.phase = FramePhase::Idle;
        }
        self.needs_recreate |= abandoned.recreate_swapchain;
    }

    /// Rebuild the swapchain, its attachments and every pipeline baked for
    /// the old render pass.
    fn recreate(&mut self) -> Result<()> {
        self.gpu.wait_idle()?;

        let minimized = self.width == 0
            || self.height == 0
            || self.surface.capabilities(&self.gpu)?.is_zero_sized();
        if minimized {
            if let Some(mut old) = self.target.take() {
                unsafe { old.destroy(&self.gpu, &self.surface) };
                tracing::debug!("Window minimized, render target released");
            }
            return Ok(());
        }

        let target = unsafe {
            RenderTarget::new(
                &self.gpu,
                &self.surface,
                self.depth_format,
                self.width,
                self.height,
                self.vsync,
                self.target.as_ref().map(RenderTarget::swapchain),
            )?
        };

        if let Some(mut old) = self.target.replace(target) {
            unsafe { old.destroy(&self.gpu, &self.surface) };
        }

        self.resources.invalidate_pipelines();
        self.needs_recreate = false;

        let extent = self.extent();
        self.camera
            .set_aspect(extent.width as f32 / extent.height.max(1) as f32);
        tracing::info!("Render target recreated at {}x{}", extent.width, extent.height);

        Ok(())
    }

    pub fn wait_idle(&self) -> Result<()> {
        Ok(self.gpu.wait_idle()?)
    }

    /// Release every GPU object the renderer owns.
    ///
    /// # Safety
    /// Must be called once, before the GPU context is dropped. The renderer
    /// must not be used afterwards.
    pub unsafe fn destroy(&mut self) {
        if let Err(e) = self.gpu.wait_idle() {
            tracing::warn!("wait_idle before shutdown failed: {e}");
        }

        if let Some(mut target) = self.target.take() {
            target.destroy(&self.gpu, &self.surface);
        }
        for frame in self.frames.iter() {
            frame.destroy(self.gpu.device());
        }
        self.resources.destroy();
        self.surface.destroy();

        tracing::info!("Renderer destroyed after {} frames", self.frame_number);
    }
}

fn resolve_draw(
    resources: &mut ResourceManager,
    item: &DrawItem,
    render_pass: vk::RenderPass,
    extent: Extent,
) -> Result<ResolvedDraw> {
    let description = item.pipeline.as_ref();
    if item.push_constants().len() > description.push_constant_size as usize {
        return Err(RenderError::PushConstantsTooLarge(item.push_constants().len()));
    }

    let (pipeline, layout) = resources.resolve_pipeline(description, render_pass, extent)?;
    let material_layout = resources.get_or_create_descriptor_set_layout(&DescriptorSetLayoutKey {
        capabilities: description.material_capabilities,
    })?;
    let object_layout = if description.object_uniforms {
        Some(
            resources.get_or_create_descriptor_set_layout(&DescriptorSetLayoutKey {
                capabilities: DescriptorCapabilities::UNIFORM_BUFFER,
            })?,
        )
    } else {
        None
    };

    Ok(ResolvedDraw {
        pipeline,
        layout,
        material_layout,
        object_layout,
    })
}

/// Records one frame's command buffer.
struct FrameRecorder<'a> {
    device: &'a ash::Device,
    resources: &'a ResourceManager,
    frame: &'a mut FrameResources,
    cmd: vk::CommandBuffer,
    slot: usize,
    frame_layout: vk::DescriptorSetLayout,
    camera_buffer: BufferHandle,
    frame_set: vk::DescriptorSet,
    full_scissor: vk::Rect2D,
    state: RecordingState,
}

impl FrameRecorder<'_> {
    unsafe fn record(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        clear_color: [f32; 4],
        items: &[DrawItem],
        resolved: &[Option<ResolvedDraw>],
    ) -> Result<()> {
        let device = self.device;
        begin_command_buffer(device, self.cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        self.frame_set = self.frame.allocate_descriptor_set(device, self.frame_layout)?;
        let camera = self
            .resources
            .get_buffer(self.camera_buffer)
            .ok_or(RenderError::MissingResource("camera buffer"))?;
        write_dynamic_uniform_buffer(device, self.frame_set, 0, camera.handle(), camera.size);

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(self.full_scissor)
            .clear_values(&clear_values);

        device.cmd_begin_render_pass(self.cmd, &begin_info, vk::SubpassContents::INLINE);

        for (item, resolved) in items.iter().zip(resolved) {
            let Some(resolved) = resolved else {
                continue;
            };
            if let Err(e) = self.draw(item, resolved) {
                tracing::warn!("Skipping draw of {:?}: {e}", item.mesh);
            }
        }

        device.cmd_end_render_pass(self.cmd);
        device.end_command_buffer(self.cmd)?;

        Ok(())
    }

    unsafe fn draw(&mut self, item: &DrawItem, resolved: &ResolvedDraw) -> Result<()> {
        let device = self.device;
        let resources = self.resources;
        let cmd = self.cmd;

        let mesh = resources
            .get_mesh(item.mesh)
            .ok_or(RenderError::MissingResource("mesh"))?;
        let material = resources
            .get_material(item.material)
            .ok_or(RenderError::MissingResource("material"))?;

        let mut vertex_buffers = Vec::with_capacity(mesh.vertex_buffers.len());
        let mut vertex_offsets = Vec::with_capacity(mesh.vertex_buffers.len());
        for slice in &mesh.vertex_buffers {
            let buffer = resources
                .get_buffer(slice.buffer)
                .ok_or(RenderError::MissingResource("vertex buffer"))?;
            vertex_buffers.push(buffer.handle());
            vertex_offsets.push(slice.offset);
        }
        let index_buffer = resources
            .get_buffer(mesh.index_buffer.buffer)
            .ok_or(RenderError::MissingResource("index buffer"))?;

        let object_buffer = match resolved.object_layout {
            Some(layout) => Some((
                layout,
                resources
                    .get_buffer(item.uniform_buffer)
                    .ok_or(RenderError::MissingResource("object uniform buffer"))?,
            )),
            None => None,
        };

        if self.state.bind_pipeline(resolved.pipeline) {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, resolved.pipeline);
        }

        if self.state.bind_layout(resolved.layout) {
            let camera = resources
                .get_buffer(self.camera_buffer)
                .ok_or(RenderError::MissingResource("camera buffer"))?;
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                resolved.layout,
                FRAME_SET,
                &[self.frame_set],
                &[camera.dynamic_offset(self.slot) as u32],
            );
        }

        let capabilities = item.pipeline.material_capabilities;
        let frame = &mut *self.frame;
        let slot = self.slot;
        self.state.bind_material_with(
            item.material,
            capabilities,
            || {
                let set = frame.allocate_descriptor_set(device, resolved.material_layout)?;
                write_material_set(device, resources, set, material, capabilities)?;
                Ok(set)
            },
            |set| {
                let mut offsets = Vec::new();
                if capabilities.contains(DescriptorCapabilities::UNIFORM_BUFFER) {
                    let buffer = resources
                        .get_buffer(material.uniform_buffer)
                        .ok_or(RenderError::MissingResource("material uniform buffer"))?;
                    offsets.push(buffer.dynamic_offset(slot) as u32);
                }

                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    resolved.layout,
                    MATERIAL_SET,
                    &[set],
                    &offsets,
                );
                Ok(())
            },
        )?;

        if let Some((layout, buffer)) = object_buffer {
            let set = match self.state.object_set(item.uniform_buffer) {
                Some(set) => set,
                None => {
                    let set = self.frame.allocate_descriptor_set(device, layout)?;
                    write_dynamic_uniform_buffer(device, set, 0, buffer.handle(), buffer.size);
                    self.state.insert_object_set(item.uniform_buffer, set);
                    set
                }
            };
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                resolved.layout,
                OBJECT_SET,
                &[set],
                &[buffer.dynamic_offset(self.slot) as u32],
            );
        }

        let push_constants = item.push_constants();
        if !push_constants.is_empty() {
            if push_constants.len() % 4 != 0 {
                return Err(RenderError::InvalidData(format!(
                    "push constant block of {} bytes is not a multiple of 4",
                    push_constants.len()
                )));
            }
            device.cmd_push_constants(cmd, resolved.layout, PUSH_CONSTANT_STAGES, 0, push_constants);
        }

        let scissor = item.scissor.unwrap_or(self.full_scissor);
        device.cmd_set_scissor(cmd, 0, &[scissor]);

        if self.state.bind_mesh(item.mesh) {
            if !vertex_buffers.is_empty() {
                device.cmd_bind_vertex_buffers(cmd, 0, &vertex_buffers, &vertex_offsets);
            }
            device.cmd_bind_index_buffer(
                cmd,
                index_buffer.handle(),
                mesh.index_buffer.offset,
                mesh.index_type.to_vk(),
            );
        }

        device.cmd_draw_indexed(
            cmd,
            mesh.index_count,
            1,
            mesh.index_offset,
            mesh.vertex_offset,
            0,
        );

        Ok(())
    }

}

/// Point every binding of a material set at the material's resources.
unsafe fn write_material_set(
    device: &ash::Device,
    resources: &ResourceManager,
    set: vk::DescriptorSet,
    material: &crate::types::Material,
    capabilities: DescriptorCapabilities,
) -> Result<()> {
    for capability in capabilities.iter() {
        let Some(binding) = capability.binding() else {
            continue;
        };

        if capability == DescriptorCapabilities::UNIFORM_BUFFER {
            let buffer = resources
                .get_buffer(material.uniform_buffer)
                .ok_or(RenderError::MissingResource("material uniform buffer"))?;
            write_dynamic_uniform_buffer(device, set, binding, buffer.handle(), buffer.size);
            continue;
        }

        let texture = resources
            .get_texture(material.texture(capability))
            .ok_or(RenderError::MissingResource("material texture"))?;
        let image = resources
            .get_image(texture.image)
            .ok_or(RenderError::MissingResource("texture image"))?;
        let sampler = resources
            .get_sampler(texture.sampler)
            .ok_or(RenderError::MissingResource("texture sampler"))?;

        write_combined_image_sampler(device, set, binding, image.view, sampler.handle());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandon_before_acquire_owes_nothing() {
        for phase in [FramePhase::Idle, FramePhase::Begun] {
            let abandoned = phase.abandon();
            assert!(!abandoned.drain_image_available);
            assert!(!abandoned.signal_in_flight);
            assert!(!abandoned.recreate_swapchain);
        }
    }

    #[test]
    fn abandon_after_acquire_drains_semaphore() {
        assert_eq!(
            FramePhase::Acquired.abandon(),
            Abandoned {
                drain_image_available: true,
                signal_in_flight: false,
                recreate_swapchain: true,
            }
        );
    }

    #[test]
    fn abandon_after_fence_reset_signals_fence() {
        let abandoned = FramePhase::FenceReset.abandon();
        assert!(abandoned.drain_image_available);
        assert!(abandoned.signal_in_flight);
        assert!(abandoned.recreate_swapchain);
    }

    #[test]
    fn abandon_after_submit_only_rebuilds_swapchain() {
        let abandoned = FramePhase::Submitted.abandon();
        assert!(!abandoned.drain_image_available);
        assert!(!abandoned.signal_in_flight);
        assert!(abandoned.recreate_swapchain);
    }
}
