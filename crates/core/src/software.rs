//! Headless text buffer backed by the CPU compositor.

use std::ops::{Deref, DerefMut};
use tracing::debug;

use crate::atlas::{AtlasGeometry, DEFAULT_CHAR_HEIGHT, DEFAULT_CHAR_WIDTH};
use crate::compositor::{self, AtlasImage, RgbaImage};
use crate::error::Result;
use crate::scheduler::UpdateScheduler;
use crate::store::CellStore;

/// Text buffer that composites into an in-memory image.
///
/// The atlas is borrowed: it must outlive the buffer, and the buffer never
/// copies or frees it. Mutations go through the [`CellStore`] this derefs
/// to; `draw` re-composites only when the store is dirty.
pub struct SoftwareTextBuffer<'a> {
    store: CellStore,
    geometry: AtlasGeometry,
    atlas: AtlasImage<'a>,
    surface: RgbaImage,
    scheduler: UpdateScheduler,
}

impl<'a> SoftwareTextBuffer<'a> {
    /// `width` x `height` cells of the default 8x12 pixel size.
    pub fn new(width: u32, height: u32, atlas: AtlasImage<'a>) -> Result<Self> {
        Self::with_char_size(width, height, atlas, DEFAULT_CHAR_WIDTH, DEFAULT_CHAR_HEIGHT)
    }

    pub fn with_char_size(
        width: u32,
        height: u32,
        atlas: AtlasImage<'a>,
        char_width: u32,
        char_height: u32,
    ) -> Result<Self> {
        let geometry = AtlasGeometry::new(atlas.width(), atlas.height(), char_width, char_height)?;
        let store = CellStore::new(width, height)?;
        let surface = RgbaImage::new(width * char_width, height * char_height);
        debug!(
            "software buffer {}x{} cells, {}x{} px",
            width,
            height,
            surface.width(),
            surface.height()
        );
        Ok(Self {
            store,
            geometry,
            atlas,
            surface,
            scheduler: UpdateScheduler::new(),
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

    /// Swaps the atlas and optionally the cell size. Marks the buffer dirty.
    ///
    /// On error the previous atlas and geometry stay in place.
    pub fn set_font_texture(&mut self, atlas: AtlasImage<'a>, char_size: Option<(u32, u32)>) -> Result<()> {
        let (cw, ch) = char_size.unwrap_or((self.char_width(), self.char_height()));
        let geometry = AtlasGeometry::new(atlas.width(), atlas.height(), cw, ch)?;

        if (cw, ch) != (self.char_width(), self.char_height()) {
            self.surface = RgbaImage::new(self.store.width() * cw, self.store.height() * ch);
        }
        self.geometry = geometry;
        self.atlas = atlas;
        self.scheduler.mark_dirty();
        Ok(())
    }

    /// Returns the composited surface, re-compositing first if dirty.
    pub fn draw(&mut self) -> Result<&RgbaImage> {
        if self.is_dirty() {
            crate::perf_time!("software composite", {
                compositor::composite_into(&self.store, &self.geometry, &self.atlas, &mut self.surface)?;
            });
            self.scheduler.finish_composite(self.store.revision());
        }
        Ok(&self.surface)
    }

    /// Last composited surface, possibly stale.
    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// True when the cells or the atlas changed since the last composite.
    pub fn is_dirty(&self) -> bool {
        self.scheduler.is_dirty(self.store.revision())
    }

    pub fn composite_count(&self) -> u64 {
        self.scheduler.composite_count()
    }
}

impl Deref for SoftwareTextBuffer<'_> {
    type Target = CellStore;

    fn deref(&self) -> &CellStore {
        &self.store
    }
}

impl DerefMut for SoftwareTextBuffer<'_> {
    fn deref_mut(&mut self) -> &mut CellStore {
        &mut self.store
    }
}
