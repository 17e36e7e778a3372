use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use wgpu::*;
use winit::window::Window;

use cellquad_core::perf::PerfMonitor;
use cellquad_core::Rgba;

use crate::text_buffer::{DrawTarget, GpuTextBuffer};

/// Window surface that text buffers are drawn onto.
pub struct Renderer {
    pub device: Device,
    pub queue: Queue,
    pub surface: Surface<'static>,
    pub config: SurfaceConfiguration,
    clear_color: Color,
    perf: Arc<PerfMonitor>,
}

impl Renderer {
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let instance = Instance::new(InstanceDescriptor {
            backends: Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window.clone())?;

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow::anyhow!("Failed to find suitable adapter"))?;

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("cellquad device"),
                    required_features: Features::empty(),
                    required_limits: Limits::default(),
                },
                None,
            )
            .await?;

        // Buffer surfaces hold display-encoded bytes; prefer a target that
        // stores them as-is.
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let size = window.inner_size();
        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![surface_format],
            desired_maximum_frame_latency: 2,
        };

        surface.configure(&device, &config);
        tracing::info!(
            "surface {}x{} {:?} on {}",
            config.width,
            config.height,
            surface_format,
            adapter.get_info().name
        );

        Ok(Self {
            device,
            queue,
            surface,
            config,
            clear_color: Color {
                r: 0.06,
                g: 0.06,
                b: 0.07,
                a: 1.0,
            },
            perf: Arc::new(PerfMonitor::new()),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn set_clear_color(&mut self, color: Rgba) {
        let [r, g, b, a] = color.to_f32();
        self.clear_color = Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        };
    }

    pub fn perf(&self) -> &Arc<PerfMonitor> {
        &self.perf
    }

    /// Clears the window and draws each buffer over it in order.
    pub fn render_frame(&mut self, buffers: &mut [&mut GpuTextBuffer]) -> Result<()> {
        let started = Instant::now();
        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&TextureViewDescriptor::default());
        let mut encoder = self.device.create_command_encoder(&CommandEncoderDescriptor {
            label: Some("encoder"),
        });

        {
            let _rp = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("clear"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(self.clear_color),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }

        let target = DrawTarget {
            view: &view,
            format: self.config.format,
            width: self.config.width,
            height: self.config.height,
        };
        for buffer in buffers.iter_mut() {
            buffer.draw(&self.device, &self.queue, &mut encoder, &target);
        }

        self.queue.submit([encoder.finish()]);
        output.present();
        self.perf.record_frame(started.elapsed());

        Ok(())
    }
}
