//! Demo scene: a row of spinning cubes and a translucent pane.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};
use tracing::{info, warn};
use vkgfx_app::{AppContext, FrameContext, RenderApp, WindowEvent};
use vkgfx_gpu::{DescriptorCapabilities, SamplerDesc, SamplerFilter, SamplerWrapMode, ShaderModuleType};
use vkgfx_render::{
    BufferHandle, BufferLocation, BufferMetadata, BufferUsage, DrawItem, Material,
    MaterialHandle, MeshHandle, PipelineDescription, RenderConfiguration, ResourceManager,
    ShaderKey, ShaderModuleHandle, MAX_PUSH_CONSTANTS_SIZE,
};
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::cli::DemoArgs;
use crate::mesh::{Geometry, Vertex};
use crate::texture::Rgba8;

const VERTEX_SHADER: &str = "mesh.vert.spv";
const FRAGMENT_SHADER: &str = "lit.frag.spv";

/// Radians per second.
const SPIN_SPEED: f32 = 0.8;
const LIGHT_ORBIT_RADIUS: f32 = 6.0;

/// Contents of the per-object uniform buffer (set 2, binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ObjectData {
    tint: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Solid,
    Glass,
}

struct SceneObject {
    mesh: MeshHandle,
    material: MaterialHandle,
    uniforms: BufferHandle,
    style: Style,
    position: Vec3,
    /// Phase offset of the spin, in radians.
    phase: f32,
    tint: Vec4,
}

impl SceneObject {
    fn model(&self, time: f32) -> Mat4 {
        let rotation = match self.style {
            Style::Solid => Quat::from_euler(
                glam::EulerRot::YXZ,
                time * SPIN_SPEED + self.phase,
                (time * 0.5 + self.phase).sin() * 0.4,
                0.0,
            ),
            Style::Glass => Quat::from_rotation_y((time * 0.3).sin() * 0.5),
        };
        Mat4::from_rotation_translation(rotation, self.position)
    }

    /// Tint with a slow brightness pulse.
    fn tint(&self, time: f32) -> Vec4 {
        let pulse = 0.85 + 0.15 * (time * 2.0 + self.phase).sin();
        (self.tint.truncate() * pulse).extend(self.tint.w)
    }
}

/// Pipeline variants every object can be drawn with.
struct Pipelines {
    solid: Arc<PipelineDescription>,
    wireframe: Arc<PipelineDescription>,
    glass: Arc<PipelineDescription>,
}

impl Pipelines {
    fn new(shader: ShaderKey) -> Self {
        let base = PipelineDescription::new(shader, Vertex::layout())
            .with_material_capabilities(DescriptorCapabilities::ALBEDO_TEXTURE)
            .with_object_uniforms(true)
            .with_push_constant_size(MAX_PUSH_CONSTANTS_SIZE);

        let wireframe = base.clone().with_render(RenderConfiguration {
            wireframe: true,
            cull_backfaces: false,
            ..RenderConfiguration::default()
        });
        let glass = base.clone().with_render(RenderConfiguration {
            alpha_blending: true,
            cull_backfaces: false,
            ..RenderConfiguration::default()
        });

        Self {
            solid: Arc::new(base),
            wireframe: Arc::new(wireframe),
            glass: Arc::new(glass),
        }
    }
}

pub struct Demo {
    objects: Vec<SceneObject>,
    pipelines: Pipelines,
    wireframe_supported: bool,
    wireframe: bool,
    paused: bool,
    time: f32,
}

impl RenderApp for Demo {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let args = DemoArgs::from_env()?;
        let shader_dir = ctx.config.shader_dir.clone();
        let wireframe_supported = ctx.gpu.capabilities().supports_wireframe;
        let resources = ctx.resources();

        let vertex = load_shader(resources, &shader_dir, VERTEX_SHADER)?;
        let fragment = load_shader(resources, &shader_dir, FRAGMENT_SHADER)?;
        let pipelines = Pipelines::new(ShaderKey::new([vertex, fragment]));

        let albedo = match &args.texture {
            Some(path) => Rgba8::load(path)?,
            None => Rgba8::checkerboard(256, 32, [230, 226, 214, 255], [52, 58, 74, 255]),
        };
        info!("Albedo texture {}x{}", albedo.width, albedo.height);

        let sampler = resources.create_sampler(SamplerDesc::uniform(
            SamplerFilter::Linear,
            SamplerWrapMode::Repeat,
        ))?;
        let texture = albedo.upload(resources, sampler)?;
        let material = resources.create_material(Material {
            albedo: texture,
            ..Material::default()
        })?;

        let cube = Geometry::cube(1.2).upload(resources)?;
        let pane = Geometry::quad(6.0, 2.5).upload(resources)?;

        let mut objects = Vec::new();
        let tints = [
            Vec4::new(1.0, 0.55, 0.45, 1.0),
            Vec4::new(0.55, 1.0, 0.6, 1.0),
            Vec4::new(0.5, 0.65, 1.0, 1.0),
        ];
        for (i, tint) in tints.into_iter().enumerate() {
            objects.push(SceneObject {
                mesh: cube,
                material,
                uniforms: create_object_buffer(resources, tint)?,
                style: Style::Solid,
                position: Vec3::new((i as f32 - 1.0) * 2.2, 0.0, 0.0),
                phase: i as f32 * 1.3,
                tint,
            });
        }

        let glass_tint = Vec4::new(0.7, 0.85, 1.0, 0.35);
        objects.push(SceneObject {
            mesh: pane,
            material,
            uniforms: create_object_buffer(resources, glass_tint)?,
            style: Style::Glass,
            position: Vec3::new(0.0, 0.0, 1.8),
            phase: 0.0,
            tint: glass_tint,
        });

        let camera = ctx.renderer.camera_mut();
        camera.position = Vec3::new(0.0, 2.5, 7.5);
        camera.look_at(Vec3::ZERO);

        info!(
            "Scene ready: {} objects (W toggles wireframe, Space pauses)",
            objects.len()
        );

        Ok(Self {
            objects,
            pipelines,
            wireframe_supported,
            wireframe: false,
            paused: false,
            time: 0.0,
        })
    }

    fn update(&mut self, ctx: &mut AppContext, dt: f32) {
        if !self.paused {
            self.time += dt;
        }

        let light = ctx.renderer.light_mut();
        light.position = Vec3::new(
            (self.time * 0.4).cos() * LIGHT_ORBIT_RADIUS,
            4.0,
            (self.time * 0.4).sin() * LIGHT_ORBIT_RADIUS,
        );

        let resources = ctx.renderer.resources();
        for object in &self.objects {
            let data = ObjectData {
                tint: object.tint(self.time).to_array(),
            };
            if let Err(e) = resources.upload_buffer(object.uniforms, 0, bytemuck::bytes_of(&data)) {
                warn!("Failed to update object uniforms: {e}");
            }
        }
    }

    fn render(&mut self, _ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        // Blended geometry goes last so it composites over the solids.
        let solids = self.objects.iter().filter(|o| o.style == Style::Solid);
        let glass = self.objects.iter().filter(|o| o.style == Style::Glass);

        for object in solids.chain(glass) {
            let pipeline = match (self.wireframe, object.style) {
                (true, _) => &self.pipelines.wireframe,
                (false, Style::Solid) => &self.pipelines.solid,
                (false, Style::Glass) => &self.pipelines.glass,
            };

            let item = DrawItem::new(pipeline.clone(), object.mesh, object.material)
                .with_uniform_buffer(object.uniforms)
                .with_push_constants(&object.model(self.time))?;
            frame.push(item);
        }

        Ok(())
    }

    fn on_event(&mut self, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput {
            event:
                KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state: ElementState::Pressed,
                    repeat: false,
                    ..
                },
            ..
        } = event
        else {
            return false;
        };

        match code {
            KeyCode::KeyW if self.wireframe_supported => {
                self.wireframe = !self.wireframe;
                info!("Wireframe {}", if self.wireframe { "on" } else { "off" });
                true
            }
            KeyCode::KeyW => {
                warn!("Wireframe rendering is not supported by this GPU");
                true
            }
            KeyCode::Space => {
                self.paused = !self.paused;
                true
            }
            _ => false,
        }
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        info!(
            "Demo ran for {:.1}s, {} frames",
            self.time, ctx.frame_count
        );
    }
}

/// Read a compiled SPIR-V file. The stage comes from the file name.
fn load_shader(
    resources: &mut ResourceManager,
    dir: &Path,
    file_name: &str,
) -> anyhow::Result<ShaderModuleHandle> {
    let ty = ShaderModuleType::from_file_name(file_name)
        .with_context(|| format!("cannot tell the shader stage of {file_name}"))?;
    let path = dir.join(file_name);
    let bytes = std::fs::read(&path).with_context(|| {
        format!(
            "failed to read {} (compile the GLSL sources with glslc first)",
            path.display()
        )
    })?;

    Ok(resources.create_shader_module(&bytes, ty, "main")?)
}

fn create_object_buffer(resources: &mut ResourceManager, tint: Vec4) -> anyhow::Result<BufferHandle> {
    let data = ObjectData {
        tint: tint.to_array(),
    };
    let handle = resources.create_buffer_with_data(
        BufferMetadata::new(BufferUsage::Uniform, BufferLocation::HostVisible, true),
        bytemuck::bytes_of(&data),
    )?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn object(style: Style) -> SceneObject {
        SceneObject {
            mesh: MeshHandle::NULL,
            material: MaterialHandle::NULL,
            uniforms: BufferHandle::NULL,
            style,
            position: Vec3::new(1.0, 2.0, 3.0),
            phase: 0.5,
            tint: Vec4::new(1.0, 0.5, 0.25, 0.4),
        }
    }

    #[test]
    fn model_keeps_translation() {
        let model = object(Style::Solid).model(3.7);
        assert!(model
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
        assert_relative_eq!(model.w_axis.w, 1.0);
    }

    #[test]
    fn tint_pulse_preserves_alpha() {
        let glass = object(Style::Glass);
        for t in [0.0, 0.4, 1.9] {
            let tint = glass.tint(t);
            assert_relative_eq!(tint.w, 0.4);
            assert!(tint.x <= 1.0 && tint.x >= 0.7);
        }
    }

    #[test]
    fn pipeline_variants_share_layout() {
        let pipelines = Pipelines::new(ShaderKey::default());
        assert_eq!(pipelines.solid.layout_key(), pipelines.glass.layout_key());
        assert!(pipelines.wireframe.render.wireframe);
        assert!(pipelines.glass.render.alpha_blending);
        assert_ne!(*pipelines.solid, *pipelines.glass);
        assert_eq!(pipelines.solid.push_constant_size, 64);
    }

    #[test]
    fn object_data_fits_one_vec4() {
        assert_eq!(std::mem::size_of::<ObjectData>(), 16);
    }
}
