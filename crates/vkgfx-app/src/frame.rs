//! Per-frame context for rendering.

use vkgfx_render::DrawItem;

/// Draws collected for the frame being built.
pub struct FrameContext {
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Number of frames presented before this one.
    pub frame_number: u64,
    /// Draws submitted in order.
    pub draws: Vec<DrawItem>,
}

impl FrameContext {
    pub(crate) fn new(dt: f32, frame_number: u64) -> Self {
        Self {
            dt,
            frame_number,
            draws: Vec::new(),
        }
    }

    /// Queue a draw.
    pub fn push(&mut self, item: DrawItem) {
        self.draws.push(item);
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vkgfx_render::{MaterialHandle, MeshHandle, PipelineDescription, ShaderKey, VertexLayout};

    #[test]
    fn draws_keep_submission_order() {
        let description = Arc::new(PipelineDescription::new(
            ShaderKey::default(),
            VertexLayout::default(),
        ));
        let mut frame = FrameContext::new(0.016, 7);
        assert!(frame.is_empty());

        frame.push(DrawItem::new(description.clone(), MeshHandle::NULL, MaterialHandle::NULL));
        frame.push(
            DrawItem::new(description, MeshHandle::NULL, MaterialHandle::NULL)
                .with_push_constants(&[1.0_f32; 4])
                .unwrap(),
        );

        assert_eq!(frame.len(), 2);
        assert!(frame.draws[0].push_constants().is_empty());
        assert_eq!(frame.draws[1].push_constants().len(), 16);
        assert_eq!(frame.frame_number, 7);
    }
}
