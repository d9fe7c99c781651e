//! Demo geometry.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use vkgfx_render::{
    AttributeType, BufferLocation, BufferMetadata, BufferSlice, BufferUsage, IndexType, Mesh,
    MeshHandle, ResourceManager, VertexAttribute, VertexBinding, VertexLayout, VertexTopology,
};

/// Interleaved vertex read by `mesh.vert`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// Single interleaved binding: position, normal, uv.
    pub fn layout() -> VertexLayout {
        VertexLayout {
            bindings: vec![VertexBinding {
                stride: std::mem::size_of::<Self>() as u32,
            }],
            attributes: vec![
                VertexAttribute {
                    binding: 0,
                    location: 0,
                    offset: 0,
                    ty: AttributeType::Vec3f,
                },
                VertexAttribute {
                    binding: 0,
                    location: 1,
                    offset: 12,
                    ty: AttributeType::Vec3f,
                },
                VertexAttribute {
                    binding: 0,
                    location: 2,
                    offset: 24,
                    ty: AttributeType::Vec2f,
                },
            ],
            topology: VertexTopology::Triangles,
        }
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl Geometry {
    /// Append a quad spanned by `right` and `up` around `center`, wound
    /// counter-clockwise when seen from the side `right x up` points to.
    fn push_face(&mut self, center: Vec3, right: Vec3, up: Vec3) {
        let normal = right.cross(up).normalize().to_array();
        let base = self.vertices.len() as u16;

        let corners = [
            (center - right - up, [0.0, 1.0]),
            (center + right - up, [1.0, 1.0]),
            (center + right + up, [1.0, 0.0]),
            (center - right + up, [0.0, 0.0]),
        ];
        for (position, uv) in corners {
            self.vertices
                .push(Vertex::new(position.to_array(), normal, uv));
        }

        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Axis-aligned cube with edge length `size`, four vertices per face.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        let mut geometry = Self::default();

        geometry.push_face(Vec3::X * h, Vec3::NEG_Z * h, Vec3::Y * h);
        geometry.push_face(Vec3::NEG_X * h, Vec3::Z * h, Vec3::Y * h);
        geometry.push_face(Vec3::Y * h, Vec3::X * h, Vec3::NEG_Z * h);
        geometry.push_face(Vec3::NEG_Y * h, Vec3::X * h, Vec3::Z * h);
        geometry.push_face(Vec3::Z * h, Vec3::X * h, Vec3::Y * h);
        geometry.push_face(Vec3::NEG_Z * h, Vec3::NEG_X * h, Vec3::Y * h);

        geometry
    }

    /// Upright `width` x `height` quad facing +Z.
    pub fn quad(width: f32, height: f32) -> Self {
        let mut geometry = Self::default();
        geometry.push_face(Vec3::ZERO, Vec3::X * width * 0.5, Vec3::Y * height * 0.5);
        geometry
    }

    /// Upload into device-local buffers and register the mesh.
    pub fn upload(&self, resources: &mut ResourceManager) -> vkgfx_render::Result<MeshHandle> {
        let metadata =
            BufferMetadata::new(BufferUsage::VertexIndex, BufferLocation::DeviceLocal, false);

        let vertex_buffer =
            resources.create_buffer_with_data(metadata, bytemuck::cast_slice(&self.vertices))?;
        let index_buffer =
            match resources.create_buffer_with_data(metadata, bytemuck::cast_slice(&self.indices)) {
                Ok(buffer) => buffer,
                Err(e) => {
                    resources.remove_buffer(vertex_buffer);
                    return Err(e);
                }
            };

        resources.create_mesh(Mesh {
            vertex_buffers: vec![BufferSlice::new(vertex_buffer, 0)],
            index_buffer: BufferSlice::new(index_buffer, 0),
            index_type: IndexType::U16,
            index_count: self.indices.len() as u32,
            index_offset: 0,
            vertex_offset: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn triangles(geometry: &Geometry) -> impl Iterator<Item = [Vertex; 3]> + '_ {
        geometry.indices.chunks_exact(3).map(|tri| {
            [
                geometry.vertices[tri[0] as usize],
                geometry.vertices[tri[1] as usize],
                geometry.vertices[tri[2] as usize],
            ]
        })
    }

    #[test]
    fn cube_has_four_vertices_per_face() {
        let cube = Geometry::cube(2.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| (i as usize) < cube.vertices.len()));
    }

    #[test]
    fn cube_faces_wind_outward() {
        let cube = Geometry::cube(1.0);
        for [a, b, c] in triangles(&cube) {
            let (a, b, c) = (
                Vec3::from(a.position),
                Vec3::from(b.position),
                Vec3::from(c.position),
            );
            let face_normal = (b - a).cross(c - a);
            assert!(face_normal.dot(a) > 0.0, "triangle {a} {b} {c} faces inward");
        }
    }

    #[test]
    fn normals_are_unit_length_and_match_winding() {
        let quad = Geometry::quad(3.0, 1.0);
        for [a, b, c] in triangles(&quad) {
            let normal = Vec3::from(a.normal);
            assert_relative_eq!(normal.length(), 1.0);

            let winding = (Vec3::from(b.position) - Vec3::from(a.position))
                .cross(Vec3::from(c.position) - Vec3::from(a.position))
                .normalize();
            assert_relative_eq!(winding.dot(normal), 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn layout_offsets_match_vertex_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.bindings[0].stride, 32);
        assert_eq!(
            layout
                .attributes
                .iter()
                .map(|attribute| attribute.offset)
                .collect::<Vec<_>>(),
            vec![0, 12, 24]
        );
    }
}
