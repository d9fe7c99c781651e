use ash::vk;
use ash::vk::Handle as _;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vkgfx_core::{Handle, ResourceHandle, ShaderModuleHandle};
use vkgfx_render::{
    AttributeType, Extent, PipelineCache, PipelineConfiguration, PipelineDescription, ShaderKey,
    VertexAttribute, VertexBinding, VertexLayout, VertexTopology,
};

fn configuration(variant: u32) -> PipelineConfiguration {
    let shader = ShaderKey::new([
        ShaderModuleHandle::from_raw(ResourceHandle::new(0, 0)),
        ShaderModuleHandle::from_raw(ResourceHandle::new(1, 0)),
    ]);
    let vertex_layout = VertexLayout {
        bindings: vec![VertexBinding { stride: 32 }],
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
    };

    PipelineDescription::new(shader, vertex_layout).configuration(
        vk::PipelineLayout::from_raw(1),
        vk::RenderPass::from_raw(2),
        Extent::new(800 + variant, 600),
    )
}

fn bench_hit(c: &mut Criterion) {
    let mut cache: PipelineCache<u64> = PipelineCache::new();
    let keys: Vec<_> = (0..16).map(configuration).collect();
    for (index, key) in keys.iter().enumerate() {
        cache
            .get_or_create(key, |_| Ok::<_, ()>(index as u64))
            .ok();
    }

    c.bench_function("pipeline_cache_hit_16", |b| {
        b.iter(|| {
            let mut sum = 0;
            for key in &keys {
                if let Ok(value) = cache.get_or_create(key, |_| Err(())) {
                    sum += *value;
                }
            }
            black_box(sum)
        });
    });
}

criterion_group!(benches, bench_hit);
criterion_main!(benches);
