//! Process-wide compositor and blit pipelines.
//!
//! Pipelines are compiled once per device (and per target format for the
//! blit) on first use and handed out as `Arc`s. The cache holds `Weak`s so a
//! device's pipelines go away with the last buffer using them.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use tracing::debug;
use wgpu::*;

/// Format of every buffer surface. Unorm keeps the composited bytes exact.
pub const SURFACE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [VertexAttribute; 2] = vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    fn layout() -> VertexBufferLayout<'static> {
        VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as BufferAddress,
            step_mode: VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Full-surface quad in clip space, uv (0, 0) at the top-left. Strip order.
pub(crate) const SCREEN_QUAD: [QuadVertex; 4] = [
    QuadVertex { position: [-1.0, 1.0], tex_coords: [0.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
    QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 0.0] },
    QuadVertex { position: [1.0, -1.0], tex_coords: [1.0, 1.0] },
];

/// Unit quad scaled into target pixels by the blit shader. Strip order.
pub(crate) const SPRITE_QUAD: [QuadVertex; 4] = [
    QuadVertex { position: [0.0, 0.0], tex_coords: [0.0, 0.0] },
    QuadVertex { position: [0.0, 1.0], tex_coords: [0.0, 1.0] },
    QuadVertex { position: [1.0, 0.0], tex_coords: [1.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 1.0] },
];

/// `buffersize` and `fontsizes` as the compositor shader reads them.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CompositorUniforms {
    pub buffer_size: [f32; 2],
    pub _pad: [f32; 2],
    pub font_sizes: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct SpriteUniforms {
    pub target_size: [f32; 2],
    pub origin: [f32; 2],
    pub size: [f32; 2],
    pub _pad: [f32; 2],
}

pub struct CompositorPipeline {
    pub(crate) bind_group_layout: BindGroupLayout,
    pub(crate) pipeline: RenderPipeline,
    /// Nearest filtering: each data texel is one discrete cell.
    pub(crate) point_sampler: Sampler,
}

pub struct BlitPipeline {
    pub(crate) bind_group_layout: BindGroupLayout,
    pub(crate) pipeline: RenderPipeline,
    pub(crate) linear_sampler: Sampler,
}

type Cache<K, T> = OnceLock<Mutex<HashMap<K, Weak<T>>>>;

static COMPOSITORS: Cache<Id<Device>, CompositorPipeline> = OnceLock::new();
static BLITS: Cache<(Id<Device>, TextureFormat), BlitPipeline> = OnceLock::new();

fn shared<K: Eq + Hash, T>(cache: &'static Cache<K, T>, key: K, create: impl FnOnce() -> T) -> Arc<T> {
    let mut map = cache
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(existing) = map.get(&key).and_then(Weak::upgrade) {
        return existing;
    }

    map.retain(|_, weak| weak.strong_count() > 0);
    let created = Arc::new(create());
    map.insert(key, Arc::downgrade(&created));
    created
}

/// The compositor for `device`, compiled on first request.
pub fn compositor(device: &Device) -> Arc<CompositorPipeline> {
    shared(&COMPOSITORS, device.global_id(), || {
        debug!("compiling text buffer compositor");
        create_compositor(device)
    })
}

/// The surface-to-target blit for `device` and `format`.
pub fn blit(device: &Device, format: TextureFormat) -> Arc<BlitPipeline> {
    shared(&BLITS, (device.global_id(), format), || {
        debug!("compiling text buffer blit for {:?}", format);
        create_blit(device, format)
    })
}

fn texture_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Texture {
            multisampled: false,
            view_dimension: TextureViewDimension::D2,
            sample_type: TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::FRAGMENT,
        ty: BindingType::Sampler(SamplerBindingType::Filtering),
        count: None,
    }
}

fn create_compositor(device: &Device) -> CompositorPipeline {
    let shader = device.create_shader_module(include_wgsl!("shaders/compositor.wgsl"));

    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("compositor.bindlayout"),
        entries: &[
            uniform_entry(0, ShaderStages::FRAGMENT),
            texture_entry(1), // font
            texture_entry(2), // foredata
            texture_entry(3), // backdata
            sampler_entry(4),
        ],
    });

    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("compositor.pipeline.layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("compositor.pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[QuadVertex::layout()],
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(ColorTargetState {
                format: SURFACE_FORMAT,
                // The shader output is the final surface value.
                blend: None,
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview: None,
    });

    let point_sampler = device.create_sampler(&SamplerDescriptor {
        label: Some("compositor.point.sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Nearest,
        min_filter: FilterMode::Nearest,
        mipmap_filter: FilterMode::Nearest,
        ..Default::default()
    });

    CompositorPipeline {
        bind_group_layout,
        pipeline,
        point_sampler,
    }
}

fn create_blit(device: &Device, format: TextureFormat) -> BlitPipeline {
    let shader = device.create_shader_module(include_wgsl!("shaders/blit.wgsl"));

    let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("blit.bindlayout"),
        entries: &[
            uniform_entry(0, ShaderStages::VERTEX),
            texture_entry(1),
            sampler_entry(2),
        ],
    });

    let layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: Some("blit.pipeline.layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some("blit.pipeline"),
        layout: Some(&layout),
        vertex: VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[QuadVertex::layout()],
        },
        fragment: Some(FragmentState {
            module: &shader,
            entry_point: if format.is_srgb() { "fs_main_srgb" } else { "fs_main" },
            targets: &[Some(ColorTargetState {
                format,
                blend: Some(BlendState::ALPHA_BLENDING),
                write_mask: ColorWrites::ALL,
            })],
        }),
        primitive: PrimitiveState {
            topology: PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview: None,
    });

    let linear_sampler = device.create_sampler(&SamplerDescriptor {
        label: Some("blit.linear.sampler"),
        address_mode_u: AddressMode::ClampToEdge,
        address_mode_v: AddressMode::ClampToEdge,
        address_mode_w: AddressMode::ClampToEdge,
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: FilterMode::Nearest,
        ..Default::default()
    });

    BlitPipeline {
        bind_group_layout,
        pipeline,
        linear_sampler,
    }
}
