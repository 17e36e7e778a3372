//! Cell model, packed storage and compositing for single-quad text buffers.

pub mod atlas;
pub mod cell;
pub mod color;
pub mod compositor;
pub mod config;
pub mod error;
pub mod perf;
pub mod scheduler;
pub mod software;
pub mod store;

pub use atlas::AtlasGeometry;
pub use cell::{Cell, CellPos};
pub use color::Rgba;
pub use compositor::{AtlasImage, RgbaImage};
pub use error::{Result, TextBufferError};
pub use scheduler::{UpdateScheduler, UpdateState};
pub use software::SoftwareTextBuffer;
pub use store::{CellStore, PrintOverflow};
