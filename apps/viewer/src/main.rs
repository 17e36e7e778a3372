use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use cellquad_core::config::Config;
use cellquad_core::{Cell, Rgba};
use cellquad_wgpu::{GlyphAtlas, GpuTextBuffer, Renderer};
use tracing::{error, info, warn};
use winit::{
    event::{ElementState, Event, KeyEvent, WindowEvent},
    event_loop::{ControlFlow, EventLoopBuilder},
    keyboard::{Key, NamedKey},
    window::WindowBuilder,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Glyph atlas image; overrides `[atlas] path` from the config.
    #[arg(long)]
    atlas: Option<PathBuf>,

    /// Config file to use instead of ~/.config/cellquad/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    smoketest: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(args))
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let (fg, bg) = config.colors.parse()?;
    let clear_color = Rgba::from_hex(&config.window.clear_color).context("window.clear_color")?;

    let buffer_cfg = &config.buffer;
    let scale = config.window.scale.max(0.1);
    let pixel_width = (buffer_cfg.columns * buffer_cfg.char_width) as f32 * scale;
    let pixel_height = (buffer_cfg.rows * buffer_cfg.char_height) as f32 * scale;

    let event_loop = EventLoopBuilder::new().build()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window.title.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(pixel_width.ceil() as u32, pixel_height.ceil() as u32))
            .build(&event_loop)?,
    );

    let mut renderer = Renderer::new(window.clone()).await?;
    renderer.set_clear_color(clear_color);
    renderer.perf().set_enabled(config.performance.monitor);

    let atlas = match args.atlas.as_ref().or(config.atlas.path.as_ref()) {
        Some(path) => load_atlas(&renderer, path)?,
        None => {
            warn!("no atlas configured, using the placeholder bit-pattern atlas");
            let (w, h, pixels) = placeholder_atlas(buffer_cfg.char_width, buffer_cfg.char_height);
            GlyphAtlas::from_rgba8(&renderer.device, &renderer.queue, w, h, &pixels)?
        }
    };

    let mut buffer = GpuTextBuffer::with_char_size(
        &renderer.device,
        buffer_cfg.columns,
        buffer_cfg.rows,
        Arc::new(atlas),
        buffer_cfg.char_width,
        buffer_cfg.char_height,
    )?;
    buffer.set_default_colors(fg, bg);
    buffer.set_print_overflow(buffer_cfg.print_overflow);
    buffer.clear();
    buffer.set_perf_monitor(renderer.perf().clone());
    buffer.sprite_mut().scale = [scale, scale];

    if let Err(e) = draw_demo(&mut buffer) {
        warn!("demo content does not fit the buffer: {}", e);
    }

    let mut input_col = 0u32;
    let mut frame_count = 0;
    let start_time = Instant::now();

    event_loop.set_control_flow(ControlFlow::Wait);

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                elwt.exit();
            }

            WindowEvent::Resized(physical_size) => {
                renderer.resize(physical_size);
                window.request_redraw();
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        logical_key,
                        ..
                    },
                ..
            } => {
                if handle_key(&mut buffer, &mut input_col, logical_key) {
                    elwt.exit();
                } else if buffer.is_dirty() {
                    window.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if let Err(e) = renderer.render_frame(&mut [&mut buffer]) {
                    match e.downcast_ref::<wgpu::SurfaceError>() {
                        Some(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                            let size = window.inner_size();
                            renderer.resize(size);
                        }
                        Some(wgpu::SurfaceError::OutOfMemory) => {
                            error!("Out of memory");
                            elwt.exit();
                        }
                        _ => error!("Render error: {:?}", e),
                    }
                }

                frame_count += 1;
                tracing::debug!("Frame {} presented", frame_count);

                if args.smoketest {
                    if frame_count >= 3 {
                        let stats = renderer.perf().get_stats();
                        info!(
                            "Smoketest passed: {} frames, {} composites, {:.2}ms avg frame",
                            frame_count,
                            buffer.composite_count(),
                            stats.avg_frame_time_ms
                        );
                        std::process::exit(0);
                    } else {
                        window.request_redraw();
                    }
                }
            }

            _ => {}
        },

        Event::AboutToWait => {
            if args.smoketest && start_time.elapsed() > Duration::from_secs(5) {
                error!("Smoketest failed: timeout");
                std::process::exit(1);
            }
        }

        Event::LoopExiting => {
            if renderer.perf().is_enabled() {
                let stats = renderer.perf().get_stats();
                info!(
                    "{:.1} fps, {:.2}ms avg / {:.2}ms p99 frame, {:.3}ms avg upload, {:.3}ms avg composite, {} composites",
                    stats.fps,
                    stats.avg_frame_time_ms,
                    stats.p99_frame_time_ms,
                    stats.avg_upload_time_ms,
                    stats.avg_composite_time_ms,
                    buffer.composite_count()
                );
            }
        }

        _ => {}
    })?;

    Ok(())
}

fn load_atlas(renderer: &Renderer, path: &Path) -> Result<GlyphAtlas> {
    let image = image::open(path)
        .with_context(|| format!("Failed to open atlas {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    info!("atlas {} ({}x{})", path.display(), width, height);
    Ok(GlyphAtlas::from_rgba8(
        &renderer.device,
        &renderer.queue,
        width,
        height,
        image.as_raw(),
    )?)
}

/// 16x16 glyph atlas where each glyph shows its index as a row of bits.
fn placeholder_atlas(char_width: u32, char_height: u32) -> (u32, u32, Vec<u8>) {
    let (width, height) = (16 * char_width, 16 * char_height);
    let mut pixels = vec![0u8; (width * height * 4) as usize];
    let band = (char_height / 4)..(char_height - char_height / 4);

    for ch in 0..=255u32 {
        if ch == 0 || ch == u32::from(b' ') {
            continue;
        }
        let (ox, oy) = ((ch % 16) * char_width, (ch / 16) * char_height);
        for y in band.clone() {
            for x in 0..char_width {
                let bit = (x * 8 / char_width.max(1)).min(7);
                if ch & (0x80 >> bit) == 0 {
                    continue;
                }
                let o = (((oy + y) * width + ox + x) * 4) as usize;
                pixels[o..o + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
    }
    (width, height, pixels)
}

fn draw_demo(buffer: &mut GpuTextBuffer) -> Result<()> {
    let (fg, bg) = buffer.default_colors();
    buffer.print((0u32, 0u32), "cellquad")?;
    buffer.print((0u32, 1u32), "type to write on the last row, Esc to quit")?;

    let palette = [
        Rgba::rgb(205, 49, 49),
        Rgba::rgb(13, 188, 121),
        Rgba::rgb(229, 229, 16),
        Rgba::rgb(36, 114, 200),
        Rgba::rgb(188, 63, 188),
        Rgba::rgb(17, 168, 205),
    ];
    for (i, color) in palette.iter().enumerate() {
        buffer.set_cell((i as u32 * 2, 3u32), Cell::solid(*color))?;
        buffer.set_cell((i as u32 * 2 + 1, 3u32), Cell::new(b'#', *color, bg))?;
    }

    for ch in 0..=255u8 {
        let (x, y) = (u32::from(ch % 16), 5 + u32::from(ch / 16));
        buffer.set_xy(x, y, ch, fg, bg)?;
    }
    Ok(())
}

/// Returns true when the viewer should exit.
fn handle_key(buffer: &mut GpuTextBuffer, col: &mut u32, key: Key) -> bool {
    let row = buffer.buffer_height() - 1;
    match key {
        Key::Named(NamedKey::Escape) => return true,
        Key::Named(NamedKey::Backspace) => {
            if *col > 0 {
                *col -= 1;
                if let Err(e) = buffer.set_cell((*col, row), Cell::from(b' ')) {
                    warn!("erase failed: {}", e);
                }
            }
        }
        Key::Named(NamedKey::Space) => {
            write_input(buffer, col, row, " ");
        }
        Key::Character(ref s) => {
            write_input(buffer, col, row, s);
        }
        _ => {}
    }
    false
}

fn write_input(buffer: &mut GpuTextBuffer, col: &mut u32, row: u32, text: &str) {
    if *col >= buffer.buffer_width() {
        return;
    }
    match buffer.print((*col, row), text) {
        Ok(written) => *col += written as u32,
        Err(e) => warn!("input dropped: {}", e),
    }
}
