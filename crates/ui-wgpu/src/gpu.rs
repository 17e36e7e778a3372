//! Device setup without a window, size checks and texture readback.

use cellquad_core::{Result, RgbaImage, TextBufferError};
use tracing::{debug, info};

/// A device and queue with no surface attached.
pub struct HeadlessGpu {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl HeadlessGpu {
    /// Picks any adapter, falling back to a software one if that is all
    /// there is.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let mut adapter = None;
        for force_fallback_adapter in [false, true] {
            adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter,
                })
                .await;
            if adapter.is_some() {
                break;
            }
        }
        let adapter = adapter
            .ok_or_else(|| TextBufferError::Resource("no GPU adapter available".to_string()))?;
        info!("headless adapter: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("cellquad headless device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|e| TextBufferError::Resource(e.to_string()))?;

        Ok(Self { device, queue })
    }
}

/// Fails with a resource error if a 2D texture this size cannot exist.
pub(crate) fn check_texture_size(device: &wgpu::Device, what: &str, width: u32, height: u32) -> Result<()> {
    let max = device.limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(TextBufferError::Resource(format!(
            "{} of {}x{} px is outside the device limit of {} px",
            what, width, height, max
        )));
    }
    Ok(())
}

/// Copies an RGBA8 texture back to the CPU, rows top to bottom.
///
/// The texture needs `COPY_SRC` usage. Submits its own command buffer and
/// blocks the device until the copy lands.
pub async fn read_texture(device: &wgpu::Device, queue: &wgpu::Queue, texture: &wgpu::Texture) -> Result<RgbaImage> {
    if !matches!(
        texture.format(),
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb
    ) {
        return Err(TextBufferError::Configuration(format!(
            "cannot read back {:?} texture as RGBA8",
            texture.format()
        )));
    }
    if !texture.usage().contains(wgpu::TextureUsages::COPY_SRC) {
        return Err(TextBufferError::Configuration(
            "texture lacks COPY_SRC usage".to_string(),
        ));
    }

    let (width, height) = (texture.width(), texture.height());
    let unpadded = 4 * width;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded = unpadded.div_ceil(align) * align;

    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback.buffer"),
        size: padded as u64 * height as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback.encoder"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(height),
            },
        },
        texture.size(),
    );
    queue.submit([encoder.finish()]);

    let slice = buffer.slice(..);
    let (tx, rx) = tokio::sync::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);

    rx.await
        .map_err(|_| TextBufferError::Resource("readback callback dropped".to_string()))?
        .map_err(|e| TextBufferError::Resource(format!("readback map failed: {}", e)))?;

    let mut pixels = Vec::with_capacity(unpadded as usize * height as usize);
    {
        let data = slice.get_mapped_range();
        for row in data.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
    }
    buffer.unmap();
    debug!("read back {}x{} texture", width, height);

    RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| TextBufferError::Resource("readback size mismatch".to_string()))
}
