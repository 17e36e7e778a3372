//! GPU text buffer: packed cell textures, one compositor pass per dirty
//! frame, one blit per draw.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use cellquad_core::atlas::{DEFAULT_CHAR_HEIGHT, DEFAULT_CHAR_WIDTH};
use cellquad_core::perf::PerfMonitor;
use cellquad_core::{AtlasGeometry, CellStore, Result, RgbaImage, UpdateScheduler};
use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use crate::atlas::GlyphAtlas;
use crate::pipelines::{
    self, BlitPipeline, CompositorPipeline, CompositorUniforms, SpriteUniforms, SCREEN_QUAD,
    SPRITE_QUAD, SURFACE_FORMAT,
};

/// Where and how large the buffer surface is drawn on a target, in target
/// pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite {
    pub position: [f32; 2],
    pub scale: [f32; 2],
}

impl Default for Sprite {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0],
            scale: [1.0, 1.0],
        }
    }
}

/// A texture view to draw the buffer onto.
pub struct DrawTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

struct DataTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DataTexture {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    fn upload(&self, queue: &wgpu::Queue, bytes: &[u8]) {
        let size = self.texture.size();
        queue.write_texture(
            self.texture.as_image_copy(),
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * size.width),
                rows_per_image: None,
            },
            size,
        );
    }
}

struct BlitBinding {
    pipeline: Arc<BlitPipeline>,
    bind_group: wgpu::BindGroup,
}

/// A `W` x `H` grid of cells drawn with a glyph atlas.
///
/// Derefs to its [`CellStore`] for `set`, `get`, `print` and `clear`. Those
/// only touch CPU memory; the next [`GpuTextBuffer::draw`] uploads both data
/// textures and re-runs the compositor once, and clean draws only blit the
/// cached surface.
pub struct GpuTextBuffer {
    store: CellStore,
    scheduler: UpdateScheduler,
    geometry: AtlasGeometry,
    atlas: Arc<GlyphAtlas>,
    compositor: Arc<CompositorPipeline>,
    fore: DataTexture,
    back: DataTexture,
    surface: wgpu::Texture,
    surface_view: wgpu::TextureView,
    uniform_buffer: wgpu::Buffer,
    composite_bind_group: wgpu::BindGroup,
    screen_quad: wgpu::Buffer,
    sprite_quad: wgpu::Buffer,
    sprite_ubo: wgpu::Buffer,
    sprite: Sprite,
    blits: HashMap<wgpu::TextureFormat, BlitBinding>,
    perf: Option<Arc<PerfMonitor>>,
}

impl GpuTextBuffer {
    /// `width` x `height` cells of the default 8x12 pixel size.
    pub fn new(device: &wgpu::Device, width: u32, height: u32, atlas: Arc<GlyphAtlas>) -> Result<Self> {
        Self::with_char_size(device, width, height, atlas, DEFAULT_CHAR_WIDTH, DEFAULT_CHAR_HEIGHT)
    }

    pub fn with_char_size(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        atlas: Arc<GlyphAtlas>,
        char_width: u32,
        char_height: u32,
    ) -> Result<Self> {
        let geometry = AtlasGeometry::new(atlas.width(), atlas.height(), char_width, char_height)?;
        // Limits first so oversized requests never allocate cell memory.
        // Zero sizes fall through to the store's configuration error.
        if width > 0 && height > 0 {
            crate::check_texture_size(device, "cell data", width, height)?;
            crate::check_texture_size(
                device,
                "buffer surface",
                width.saturating_mul(char_width),
                height.saturating_mul(char_height),
            )?;
        }
        let store = CellStore::new(width, height)?;

        let compositor = pipelines::compositor(device);
        let fore = DataTexture::new(device, "textbuffer.foredata", width, height);
        let back = DataTexture::new(device, "textbuffer.backdata", width, height);
        let (surface, surface_view) = create_surface(device, width * char_width, height * char_height);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("textbuffer.compositor.ubo"),
            contents: bytemuck::bytes_of(&CompositorUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let composite_bind_group =
            create_composite_bind_group(device, &compositor, &uniform_buffer, &atlas, &fore, &back);

        let screen_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("textbuffer.screen.quad"),
            contents: bytemuck::cast_slice(&SCREEN_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sprite_quad = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("textbuffer.sprite.quad"),
            contents: bytemuck::cast_slice(&SPRITE_QUAD),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sprite_ubo = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("textbuffer.sprite.ubo"),
            contents: bytemuck::bytes_of(&SpriteUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        debug!(
            "text buffer {}x{} cells of {}x{} px, atlas {}x{} ({}x{} glyphs)",
            width,
            height,
            char_width,
            char_height,
            atlas.width(),
            atlas.height(),
            geometry.cells_per_row(),
            geometry.cells_per_column()
        );

        Ok(Self {
            store,
            scheduler: UpdateScheduler::new(),
            geometry,
            atlas,
            compositor,
            fore,
            back,
            surface,
            surface_view,
            uniform_buffer,
            composite_bind_group,
            screen_quad,
            sprite_quad,
            sprite_ubo,
            sprite: Sprite::default(),
            blits: HashMap::new(),
            perf: None,
        })
    }

    pub fn buffer_width(&self) -> u32 {
        self.store.width()
    }

    pub fn buffer_height(&self) -> u32 {
        self.store.height()
    }

    pub fn char_width(&self) -> u32 {
        self.geometry.char_width()
    }

    pub fn char_height(&self) -> u32 {
        self.geometry.char_height()
    }

    pub fn geometry(&self) -> &AtlasGeometry {
        &self.geometry
    }

    pub fn atlas(&self) -> &Arc<GlyphAtlas> {
        &self.atlas
    }

    pub fn sprite(&self) -> &Sprite {
        &self.sprite
    }

    pub fn sprite_mut(&mut self) -> &mut Sprite {
        &mut self.sprite
    }

    /// The off-screen surface the compositor renders into.
    pub fn surface_texture(&self) -> &wgpu::Texture {
        &self.surface
    }

    /// Records upload and composite timings into `perf`.
    pub fn set_perf_monitor(&mut self, perf: Arc<PerfMonitor>) {
        self.perf = Some(perf);
    }

    /// True when the cells or the atlas changed since the last composite.
    pub fn is_dirty(&self) -> bool {
        self.scheduler.is_dirty(self.store.revision())
    }

    pub fn composite_count(&self) -> u64 {
        self.scheduler.composite_count()
    }

    /// Swaps the atlas and optionally the cell size, then marks the buffer
    /// dirty. On error nothing changes.
    pub fn set_font_texture(
        &mut self,
        device: &wgpu::Device,
        atlas: Arc<GlyphAtlas>,
        char_size: Option<(u32, u32)>,
    ) -> Result<()> {
        let (cw, ch) = char_size.unwrap_or((self.char_width(), self.char_height()));
        let geometry = AtlasGeometry::new(atlas.width(), atlas.height(), cw, ch)?;

        if (cw, ch) != (self.char_width(), self.char_height()) {
            let (w, h) = (self.store.width().saturating_mul(cw), self.store.height().saturating_mul(ch));
            crate::check_texture_size(device, "buffer surface", w, h)?;
            let (surface, surface_view) = create_surface(device, w, h);
            self.surface = surface;
            self.surface_view = surface_view;
            // blit bind groups point at the old surface
            self.blits.clear();
        }

        self.composite_bind_group = create_composite_bind_group(
            device,
            &self.compositor,
            &self.uniform_buffer,
            &atlas,
            &self.fore,
            &self.back,
        );
        self.geometry = geometry;
        self.atlas = atlas;
        self.scheduler.mark_dirty();
        debug!("font texture replaced, cell size {}x{}", cw, ch);
        Ok(())
    }

    /// Uploads the cell arrays and re-composites the surface if dirty.
    /// Returns whether a composite pass was recorded.
    pub fn update(&mut self, queue: &wgpu::Queue, encoder: &mut wgpu::CommandEncoder) -> bool {
        if !self.is_dirty() {
            return false;
        }

        let started = Instant::now();
        self.fore.upload(queue, self.store.fore_bytes());
        self.back.upload(queue, self.store.back_bytes());
        let uniforms = CompositorUniforms {
            buffer_size: [self.store.width() as f32, self.store.height() as f32],
            _pad: [0.0; 2],
            font_sizes: self.geometry.font_sizes(),
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        let uploaded = Instant::now();

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("textbuffer.composite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.surface_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.compositor.pipeline);
            pass.set_bind_group(0, &self.composite_bind_group, &[]);
            pass.set_vertex_buffer(0, self.screen_quad.slice(..));
            pass.draw(0..SCREEN_QUAD.len() as u32, 0..1);
        }

        self.scheduler.finish_composite(self.store.revision());
        if let Some(perf) = &self.perf {
            perf.record_upload(uploaded - started);
            perf.record_composite(uploaded.elapsed());
        }
        trace!("composite pass #{}", self.composite_count());
        true
    }

    /// Brings the surface up to date, then draws it onto `target` as one
    /// quad placed by [`GpuTextBuffer::sprite`].
    ///
    /// Sprite uniforms are written through the queue, so draw a buffer at
    /// most once per target per submit.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &DrawTarget<'_>,
    ) {
        self.update(queue, encoder);

        let surface_size = self.surface.size();
        let uniforms = SpriteUniforms {
            target_size: [target.width.max(1) as f32, target.height.max(1) as f32],
            origin: self.sprite.position,
            size: [
                surface_size.width as f32 * self.sprite.scale[0],
                surface_size.height as f32 * self.sprite.scale[1],
            ],
            _pad: [0.0; 2],
        };
        queue.write_buffer(&self.sprite_ubo, 0, bytemuck::bytes_of(&uniforms));

        self.ensure_blit(device, target.format);
        let blit = &self.blits[&target.format];
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("textbuffer.blit"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        pass.set_pipeline(&blit.pipeline.pipeline);
        pass.set_bind_group(0, &blit.bind_group, &[]);
        pass.set_vertex_buffer(0, self.sprite_quad.slice(..));
        pass.draw(0..SPRITE_QUAD.len() as u32, 0..1);
    }

    /// Copies the composited surface back to the CPU. Does not composite;
    /// call after a submitted `update` or `draw`.
    pub async fn read_surface(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<RgbaImage> {
        crate::gpu::read_texture(device, queue, &self.surface).await
    }

    fn ensure_blit(&mut self, device: &wgpu::Device, format: wgpu::TextureFormat) {
        let (surface_view, sprite_ubo) = (&self.surface_view, &self.sprite_ubo);
        self.blits.entry(format).or_insert_with(|| {
            let pipeline = pipelines::blit(device, format);
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("textbuffer.blit.bindgroup"),
                layout: &pipeline.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: sprite_ubo.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(surface_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&pipeline.linear_sampler),
                    },
                ],
            });
            BlitBinding { pipeline, bind_group }
        });
    }
}

impl Deref for GpuTextBuffer {
    type Target = CellStore;

    fn deref(&self) -> &CellStore {
        &self.store
    }
}

impl DerefMut for GpuTextBuffer {
    fn deref_mut(&mut self) -> &mut CellStore {
        &mut self.store
    }
}

fn create_surface(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("textbuffer.surface"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SURFACE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

fn create_composite_bind_group(
    device: &wgpu::Device,
    compositor: &CompositorPipeline,
    uniform_buffer: &wgpu::Buffer,
    atlas: &GlyphAtlas,
    fore: &DataTexture,
    back: &DataTexture,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("textbuffer.compositor.bindgroup"),
        layout: &compositor.bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(atlas.view()),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&fore.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&back.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(&compositor.point_sampler),
            },
        ],
    })
}
