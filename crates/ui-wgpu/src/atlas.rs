use cellquad_core::{Result, TextBufferError};
use tracing::debug;

/// GPU glyph atlas shared between buffers.
///
/// Buffers hold it through an `Arc` and only ever sample it; whoever loaded
/// the image decides when it goes away.
pub struct GlyphAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GlyphAtlas {
    /// Uploads tightly packed RGBA8 pixels. Coverage is read from red.
    pub fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(TextBufferError::Configuration(format!(
                "atlas pixel data is {} bytes, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            )));
        }
        crate::check_texture_size(device, "glyph atlas", width, height)?;

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Glyph Atlas"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: None,
            },
            size,
        );

        debug!("uploaded {}x{} glyph atlas", width, height);
        Self::from_texture(texture)
    }

    /// Wraps a texture the caller already filled. It must be a single-sampled
    /// 2D texture in a filterable, non-sRGB float format; glyph coverage is
    /// read from its first channel.
    pub fn from_texture(texture: wgpu::Texture) -> Result<Self> {
        let format = texture.format();
        let filterable = matches!(
            format.sample_type(None, None),
            Some(wgpu::TextureSampleType::Float { filterable: true })
        );
        if !filterable || format.is_srgb() {
            return Err(TextBufferError::Configuration(format!(
                "glyph atlas format {:?} is not a filterable linear float format",
                format
            )));
        }
        if texture.sample_count() != 1 {
            return Err(TextBufferError::Configuration(format!(
                "glyph atlas is multisampled ({} samples)",
                texture.sample_count()
            )));
        }
        if !texture.usage().contains(wgpu::TextureUsages::TEXTURE_BINDING) {
            return Err(TextBufferError::Configuration(
                "glyph atlas texture lacks TEXTURE_BINDING usage".to_string(),
            ));
        }
        if texture.dimension() != wgpu::TextureDimension::D2 {
            return Err(TextBufferError::Configuration(
                "glyph atlas must be a 2D texture".to_string(),
            ));
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self { texture, view })
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}
