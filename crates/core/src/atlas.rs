//! Glyph atlas addressing.
//!
//! The atlas is an image cut into equal `char_width` x `char_height` cells.
//! Only its pixel size matters here; the pixels themselves belong to whoever
//! loaded the image.

use crate::error::{Result, TextBufferError};

pub const DEFAULT_CHAR_WIDTH: u32 = 8;
pub const DEFAULT_CHAR_HEIGHT: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasGeometry {
    pixel_width: u32,
    pixel_height: u32,
    char_width: u32,
    char_height: u32,
}

impl AtlasGeometry {
    /// Fails unless the atlas is a whole, non-empty number of cells each way.
    pub fn new(pixel_width: u32, pixel_height: u32, char_width: u32, char_height: u32) -> Result<Self> {
        if char_width == 0 || char_height == 0 {
            return Err(TextBufferError::Configuration(format!(
                "cell size {}x{} must be non-zero",
                char_width, char_height
            )));
        }
        if pixel_width < char_width || pixel_height < char_height {
            return Err(TextBufferError::Configuration(format!(
                "atlas {}x{} is smaller than one {}x{} cell",
                pixel_width, pixel_height, char_width, char_height
            )));
        }
        if pixel_width % char_width != 0 || pixel_height % char_height != 0 {
            return Err(TextBufferError::Configuration(format!(
                "atlas {}x{} is not divisible by cell size {}x{}",
                pixel_width, pixel_height, char_width, char_height
            )));
        }

        Ok(Self {
            pixel_width,
            pixel_height,
            char_width,
            char_height,
        })
    }

    pub fn pixel_width(&self) -> u32 {
        self.pixel_width
    }

    pub fn pixel_height(&self) -> u32 {
        self.pixel_height
    }

    pub fn char_width(&self) -> u32 {
        self.char_width
    }

    pub fn char_height(&self) -> u32 {
        self.char_height
    }

    pub fn cells_per_row(&self) -> u32 {
        self.pixel_width / self.char_width
    }

    pub fn cells_per_column(&self) -> u32 {
        self.pixel_height / self.char_height
    }

    /// Atlas cell `(column, row)` holding glyph `ch`.
    ///
    /// The column wraps on the per-row count while the row divides by the
    /// per-column count. The two only agree for square atlases; shader and
    /// software paths both depend on this exact form.
    pub fn glyph_cell(&self, ch: u8) -> (u32, u32) {
        let ch = u32::from(ch);
        (ch % self.cells_per_row(), ch / self.cells_per_column())
    }

    /// Top-left pixel of glyph `ch` in the atlas.
    pub fn glyph_origin(&self, ch: u8) -> (u32, u32) {
        let (col, row) = self.glyph_cell(ch);
        (col * self.char_width, row * self.char_height)
    }

    /// The `fontsizes` uniform: `(char_w, char_h, cells_per_row, cells_per_column)`.
    pub fn font_sizes(&self) -> [f32; 4] {
        [
            self.char_width as f32,
            self.char_height as f32,
            self.cells_per_row() as f32,
            self.cells_per_column() as f32,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyph_17_in_16x16_atlas_is_column_1_row_1() {
        let atlas = AtlasGeometry::new(128, 192, 8, 12).unwrap();
        assert_eq!(atlas.cells_per_row(), 16);
        assert_eq!(atlas.cells_per_column(), 16);
        assert_eq!(atlas.glyph_cell(17), (1, 1));
        assert_eq!(atlas.glyph_origin(17), (8, 12));
    }

    #[test]
    fn non_square_atlas_keeps_asymmetric_divisors() {
        // 32 glyphs per row, 8 rows: glyph 40 sits at column 8 and
        // row 40 / 8 = 5, not 40 / 32 = 1.
        let atlas = AtlasGeometry::new(256, 64, 8, 8).unwrap();
        assert_eq!(atlas.glyph_cell(40), (8, 5));
    }

    #[test]
    fn indivisible_atlas_is_rejected() {
        let err = AtlasGeometry::new(130, 192, 8, 12).unwrap_err();
        assert!(matches!(err, TextBufferError::Configuration(_)));
        assert!(AtlasGeometry::new(128, 190, 8, 12).is_err());
    }

    #[test]
    fn zero_or_oversized_cells_are_rejected() {
        assert!(AtlasGeometry::new(128, 128, 0, 12).is_err());
        assert!(AtlasGeometry::new(4, 4, 8, 8).is_err());
    }

    #[test]
    fn font_sizes_uniform_layout() {
        let atlas = AtlasGeometry::new(64, 48, 8, 12).unwrap();
        assert_eq!(atlas.font_sizes(), [8.0, 12.0, 8.0, 4.0]);
    }
}
