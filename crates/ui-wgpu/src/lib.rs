//! wgpu backend for cellquad text buffers.

pub mod atlas;
pub mod gpu;
pub mod pipelines;
pub mod renderer;
pub mod text_buffer;

pub(crate) use gpu::check_texture_size;

pub use atlas::GlyphAtlas;
pub use gpu::{read_texture, HeadlessGpu};
pub use renderer::Renderer;
pub use text_buffer::{DrawTarget, GpuTextBuffer, Sprite};
