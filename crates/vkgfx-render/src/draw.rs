//! Draw submissions and the bind state of one command buffer recording.

use crate::error::{RenderError, Result};
use crate::key::{PipelineDescription, MAX_PUSH_CONSTANTS_SIZE};
use ash::vk;
use hashbrown::HashMap;
use std::sync::Arc;
use vkgfx_core::{BufferHandle, MaterialHandle, MeshHandle};
use vkgfx_gpu::DescriptorCapabilities;

/// One indexed draw.
#[derive(Debug, Clone)]
pub struct DrawItem {
    pub pipeline: Arc<PipelineDescription>,
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    /// Per-object uniform buffer bound in set 2. Null when the pipeline has
    /// no object set.
    pub uniform_buffer: BufferHandle,
    push_constants: Vec<u8>,
    /// Scissor rectangle. `None` covers the whole framebuffer.
    pub scissor: Option<vk::Rect2D>,
}

impl DrawItem {
    pub fn new(pipeline: Arc<PipelineDescription>, mesh: MeshHandle, material: MaterialHandle) -> Self {
        Self {
            pipeline,
            mesh,
            material,
            uniform_buffer: BufferHandle::NULL,
            push_constants: Vec::new(),
            scissor: None,
        }
    }

    pub fn with_uniform_buffer(mut self, buffer: BufferHandle) -> Self {
        self.uniform_buffer = buffer;
        self
    }

    pub fn with_scissor(mut self, scissor: vk::Rect2D) -> Self {
        self.scissor = Some(scissor);
        self
    }

    /// Attach a push constant block of at most 64 bytes.
    pub fn with_push_constants<T: bytemuck::Pod>(mut self, data: &T) -> Result<Self> {
        self.set_push_constants(bytemuck::bytes_of(data))?;
        Ok(self)
    }

    pub fn set_push_constants(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_PUSH_CONSTANTS_SIZE as usize {
            return Err(RenderError::PushConstantsTooLarge(bytes.len()));
        }
        self.push_constants.clear();
        self.push_constants.extend_from_slice(bytes);
        Ok(())
    }

    pub fn push_constants(&self) -> &[u8] {
        &self.push_constants
    }
}

/// What is currently bound in the command buffer being recorded.
///
/// Lives for one recording, so nothing leaks between frames or command
/// buffers.
#[derive(Debug, Default)]
pub struct RecordingState {
    bound_pipeline: Option<vk::Pipeline>,
    bound_layout: Option<vk::PipelineLayout>,
    bound_material: Option<MaterialHandle>,
    bound_mesh: Option<MeshHandle>,
    /// Material sets written this recording.
    material_sets: HashMap<(MaterialHandle, DescriptorCapabilities), vk::DescriptorSet>,
    /// Object sets written this recording, keyed by their buffer.
    object_sets: HashMap<BufferHandle, vk::DescriptorSet>,
}

impl RecordingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `pipeline` as bound. Returns `false` when it already was.
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) -> bool {
        if self.bound_pipeline == Some(pipeline) {
            return false;
        }
        self.bound_pipeline = Some(pipeline);
        true
    }

    /// Record `layout` as the layout of bound sets. A new layout invalidates
    /// the bound material, since its set may no longer be compatible.
    pub fn bind_layout(&mut self, layout: vk::PipelineLayout) -> bool {
        if self.bound_layout == Some(layout) {
            return false;
        }
        self.bound_layout = Some(layout);
        self.bound_material = None;
        true
    }

    /// Bind the material set of `material` unless it already is.
    ///
    /// The set comes from this recording's cache or from `create_set`, and
    /// is handed to `bind`. The material only counts as bound once `bind`
    /// succeeded, so a failed draw never leaves a stale set behind for the
    /// next draw of the same material.
    pub fn bind_material_with<C, B>(
        &mut self,
        material: MaterialHandle,
        capabilities: DescriptorCapabilities,
        create_set: C,
        bind: B,
    ) -> Result<()>
    where
        C: FnOnce() -> Result<vk::DescriptorSet>,
        B: FnOnce(vk::DescriptorSet) -> Result<()>,
    {
        if self.bound_material == Some(material) {
            return Ok(());
        }

        let set = match self.material_set(material, capabilities) {
            Some(set) => set,
            None => {
                let set = create_set()?;
                self.insert_material_set(material, capabilities, set);
                set
            }
        };
        bind(set)?;

        self.bound_material = Some(material);
        Ok(())
    }

    /// Record `mesh` as bound. Returns `false` when its buffers already are.
    pub fn bind_mesh(&mut self, mesh: MeshHandle) -> bool {
        if self.bound_mesh == Some(mesh) {
            return false;
        }
        self.bound_mesh = Some(mesh);
        true
    }

    /// Set already written for `material` with the given layout capabilities.
    pub fn material_set(
        &self,
        material: MaterialHandle,
        capabilities: DescriptorCapabilities,
    ) -> Option<vk::DescriptorSet> {
        self.material_sets.get(&(material, capabilities)).copied()
    }

    pub fn insert_material_set(
        &mut self,
        material: MaterialHandle,
        capabilities: DescriptorCapabilities,
        set: vk::DescriptorSet,
    ) {
        self.material_sets.insert((material, capabilities), set);
    }

    /// Object set already written for `buffer` in this recording.
    pub fn object_set(&self, buffer: BufferHandle) -> Option<vk::DescriptorSet> {
        self.object_sets.get(&buffer).copied()
    }

    pub fn insert_object_set(&mut self, buffer: BufferHandle, set: vk::DescriptorSet) {
        self.object_sets.insert(buffer, set);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{ShaderKey, VertexLayout};
    use ash::vk::Handle;
    use vkgfx_core::{Handle as _, ResourceHandle};

    fn item() -> DrawItem {
        let description = PipelineDescription::new(ShaderKey::default(), VertexLayout::default());
        DrawItem::new(Arc::new(description), MeshHandle::NULL, MaterialHandle::NULL)
    }

    #[test]
    fn push_constants_up_to_limit() {
        let item = item().with_push_constants(&[0.0_f32; 16]).unwrap();
        assert_eq!(item.push_constants().len(), 64);
    }

    #[test]
    fn oversized_push_constants_rejected() {
        let mut item = item();
        let result = item.set_push_constants(&[0_u8; 65]);
        assert!(matches!(result, Err(RenderError::PushConstantsTooLarge(65))));
        assert!(item.push_constants().is_empty());
    }

    #[test]
    fn pipeline_rebind_is_skipped() {
        let mut state = RecordingState::new();
        let pipeline = vk::Pipeline::from_raw(1);

        assert!(state.bind_pipeline(pipeline));
        assert!(!state.bind_pipeline(pipeline));
        assert!(state.bind_pipeline(vk::Pipeline::from_raw(2)));
    }

    fn bind(
        state: &mut RecordingState,
        material: MaterialHandle,
        set: u64,
        binds: &mut Vec<vk::DescriptorSet>,
    ) -> Result<()> {
        state.bind_material_with(
            material,
            DescriptorCapabilities::ALBEDO_TEXTURE,
            || Ok(vk::DescriptorSet::from_raw(set)),
            |set| {
                binds.push(set);
                Ok(())
            },
        )
    }

    #[test]
    fn layout_change_forgets_material() {
        let mut state = RecordingState::new();
        let material = MaterialHandle::from_raw(ResourceHandle::new(0, 0));
        let mut binds = Vec::new();

        state.bind_layout(vk::PipelineLayout::from_raw(1));
        bind(&mut state, material, 1, &mut binds).unwrap();
        bind(&mut state, material, 1, &mut binds).unwrap();
        assert_eq!(binds.len(), 1);

        assert!(!state.bind_layout(vk::PipelineLayout::from_raw(1)));
        bind(&mut state, material, 1, &mut binds).unwrap();
        assert_eq!(binds.len(), 1);

        assert!(state.bind_layout(vk::PipelineLayout::from_raw(2)));
        bind(&mut state, material, 1, &mut binds).unwrap();
        assert_eq!(binds.len(), 2);
    }

    #[test]
    fn failed_material_bind_is_retried() {
        let mut state = RecordingState::new();
        let first = MaterialHandle::from_raw(ResourceHandle::new(0, 0));
        let second = MaterialHandle::from_raw(ResourceHandle::new(1, 0));
        let mut binds = Vec::new();

        bind(&mut state, first, 1, &mut binds).unwrap();

        let failed = state.bind_material_with(
            second,
            DescriptorCapabilities::ALBEDO_TEXTURE,
            || Err(RenderError::MissingResource("material texture")),
            |_| unreachable!("no set to bind"),
        );
        assert!(failed.is_err());

        bind(&mut state, second, 2, &mut binds).unwrap();
        assert_eq!(
            binds,
            [vk::DescriptorSet::from_raw(1), vk::DescriptorSet::from_raw(2)]
        );
    }

    #[test]
    fn failed_bind_keeps_cached_set() {
        let mut state = RecordingState::new();
        let material = MaterialHandle::from_raw(ResourceHandle::new(4, 0));
        let mut created = 0;

        let failed = state.bind_material_with(
            material,
            DescriptorCapabilities::ALBEDO_TEXTURE,
            || {
                created += 1;
                Ok(vk::DescriptorSet::from_raw(7))
            },
            |_| Err(RenderError::MissingResource("material uniform buffer")),
        );
        assert!(failed.is_err());

        let mut bound = None;
        state
            .bind_material_with(
                material,
                DescriptorCapabilities::ALBEDO_TEXTURE,
                || {
                    created += 1;
                    Ok(vk::DescriptorSet::from_raw(8))
                },
                |set| {
                    bound = Some(set);
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(created, 1);
        assert_eq!(bound, Some(vk::DescriptorSet::from_raw(7)));
    }

    #[test]
    fn fresh_recording_binds_everything() {
        let mesh = MeshHandle::from_raw(ResourceHandle::new(3, 1));

        let mut first = RecordingState::new();
        assert!(first.bind_mesh(mesh));
        assert!(!first.bind_mesh(mesh));

        let mut second = RecordingState::new();
        assert!(second.bind_mesh(mesh));
    }

    #[test]
    fn material_sets_depend_on_layout_capabilities() {
        let mut state = RecordingState::new();
        let material = MaterialHandle::from_raw(ResourceHandle::new(1, 0));
        let set = vk::DescriptorSet::from_raw(9);

        state.insert_material_set(material, DescriptorCapabilities::ALBEDO_TEXTURE, set);
        assert_eq!(
            state.material_set(material, DescriptorCapabilities::ALBEDO_TEXTURE),
            Some(set)
        );
        assert!(state
            .material_set(material, DescriptorCapabilities::default())
            .is_none());
    }

    #[test]
    fn object_sets_are_remembered_per_buffer() {
        let mut state = RecordingState::new();
        let buffer = BufferHandle::from_raw(ResourceHandle::new(0, 0));
        assert!(state.object_set(buffer).is_none());

        state.insert_object_set(buffer, vk::DescriptorSet::from_raw(5));
        assert_eq!(state.object_set(buffer), Some(vk::DescriptorSet::from_raw(5)));
    }
}
