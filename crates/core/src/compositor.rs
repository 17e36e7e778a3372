//! Per-pixel compositing of glyphs over cell colors.
//!
//! This is the CPU rendition of `compositor.wgsl`. It walks every pixel of
//! the buffer surface, samples the packed cell arrays and the atlas with
//! nearest filtering, and blends foreground over background by the red
//! channel of the atlas. Float math follows the shader step for step so both
//! paths produce the same bytes.

use crate::atlas::AtlasGeometry;
use crate::error::{Result, TextBufferError};
use crate::store::CellStore;

/// Borrowed RGBA8 atlas pixels.
#[derive(Debug, Clone, Copy)]
pub struct AtlasImage<'a> {
    width: u32,
    height: u32,
    pixels: &'a [u8],
}

impl<'a> AtlasImage<'a> {
    pub fn new(width: u32, height: u32, pixels: &'a [u8]) -> Result<Self> {
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
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Red channel at normalized `(s, t)`, clamped to the edge.
    fn coverage(&self, s: f32, t: f32) -> f32 {
        let x = nearest_texel(s, self.width);
        let y = nearest_texel(t, self.height);
        let o = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels[o] as f32 / 255.0
    }
}

/// Owned RGBA8 image, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RgbaImage {
    /// Fully transparent image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        (pixels.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let o = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[o],
            self.pixels[o + 1],
            self.pixels[o + 2],
            self.pixels[o + 3],
        ]
    }

    fn put(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        let o = (y as usize * self.width as usize + x as usize) * 4;
        for (dst, c) in self.pixels[o..o + 4].iter_mut().zip(rgba) {
            *dst = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}

/// GLSL-style `mod`: result takes the sign of `y`.
pub fn glsl_mod(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}

fn nearest_texel(coord: f32, size: u32) -> u32 {
    let t = (coord * size as f32).floor();
    t.clamp(0.0, (size - 1) as f32) as u32
}

/// Blends an opaque foreground over the background by glyph coverage.
pub fn blend(fore: [f32; 4], back: [f32; 4], coverage: f32) -> [f32; 4] {
    let mix = |b: f32, f: f32| b * (1.0 - coverage) + f * coverage;
    [
        mix(back[0], fore[0]),
        mix(back[1], fore[1]),
        mix(back[2], fore[2]),
        mix(back[3], 1.0),
    ]
}

fn unorm(texel: &[u8]) -> [f32; 4] {
    [
        texel[0] as f32 / 255.0,
        texel[1] as f32 / 255.0,
        texel[2] as f32 / 255.0,
        texel[3] as f32 / 255.0,
    ]
}

/// Composites the whole store into a new `(W * char_w) x (H * char_h)` image.
pub fn composite(store: &CellStore, geometry: &AtlasGeometry, atlas: &AtlasImage<'_>) -> Result<RgbaImage> {
    let mut out = RgbaImage::new(
        store.width() * geometry.char_width(),
        store.height() * geometry.char_height(),
    );
    composite_into(store, geometry, atlas, &mut out)?;
    Ok(out)
}

/// Composites into an existing surface, overwriting every pixel.
pub fn composite_into(
    store: &CellStore,
    geometry: &AtlasGeometry,
    atlas: &AtlasImage<'_>,
    out: &mut RgbaImage,
) -> Result<()> {
    if atlas.width() != geometry.pixel_width() || atlas.height() != geometry.pixel_height() {
        return Err(TextBufferError::Configuration(format!(
            "atlas image {}x{} does not match geometry {}x{}",
            atlas.width(),
            atlas.height(),
            geometry.pixel_width(),
            geometry.pixel_height()
        )));
    }

    let (cols, rows) = (store.width(), store.height());
    if out.width() != cols * geometry.char_width() || out.height() != rows * geometry.char_height() {
        return Err(TextBufferError::Configuration(format!(
            "surface {}x{} does not fit a {}x{} grid of {}x{} cells",
            out.width(),
            out.height(),
            cols,
            rows,
            geometry.char_width(),
            geometry.char_height()
        )));
    }

    let [char_w, char_h, per_row, per_col] = geometry.font_sizes();
    let (buf_w, buf_h) = (cols as f32, rows as f32);
    let atlas_w = char_w * per_row;
    let atlas_h = char_h * per_col;
    let (fore_bytes, back_bytes) = (store.fore_bytes(), store.back_bytes());

    for py in 0..out.height() {
        let v = (py as f32 + 0.5) / out.height() as f32;
        let cy = nearest_texel(v, rows);

        for px in 0..out.width() {
            let u = (px as f32 + 0.5) / out.width() as f32;
            let cx = nearest_texel(u, cols);

            let o = (cy as usize * cols as usize + cx as usize) * 4;
            let fore = unorm(&fore_bytes[o..o + 4]);
            let back = unorm(&back_bytes[o..o + 4]);

            let chr = (255.0 * fore[3]).round();
            let font_x = glsl_mod(chr, per_row).floor() * char_w;
            let font_y = (chr / per_col).floor() * char_h;
            let off_x = glsl_mod(u * buf_w * char_w, char_w);
            let off_y = glsl_mod(v * buf_h * char_h, char_h);

            let coverage = atlas.coverage((font_x + off_x) / atlas_w, (font_y + off_y) / atlas_h);
            out.put(px, py, blend(fore, back, coverage));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    fn single_glyph(coverage: u8) -> Vec<u8> {
        vec![coverage, coverage, coverage, 255]
    }

    fn one_cell(fg: Rgba, bg: Rgba) -> CellStore {
        let mut store = CellStore::new(1, 1).unwrap();
        store.set(0, 0, fg, bg).unwrap();
        store
    }

    #[test]
    fn full_coverage_shows_opaque_foreground() {
        let store = one_cell(Rgba::rgb(10, 200, 30), Rgba::rgba(1, 2, 3, 40));
        let geometry = AtlasGeometry::new(1, 1, 1, 1).unwrap();
        let pixels = single_glyph(255);
        let atlas = AtlasImage::new(1, 1, &pixels).unwrap();

        let out = composite(&store, &geometry, &atlas).unwrap();
        assert_eq!(out.pixel(0, 0), [10, 200, 30, 255]);
    }

    #[test]
    fn zero_coverage_shows_background_with_its_alpha() {
        let store = one_cell(Rgba::rgb(10, 200, 30), Rgba::rgba(1, 2, 3, 40));
        let geometry = AtlasGeometry::new(1, 1, 1, 1).unwrap();
        let pixels = single_glyph(0);
        let atlas = AtlasImage::new(1, 1, &pixels).unwrap();

        let out = composite(&store, &geometry, &atlas).unwrap();
        assert_eq!(out.pixel(0, 0), [1, 2, 3, 40]);
    }

    #[test]
    fn partial_coverage_interpolates() {
        let out = blend([1.0, 0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 0.0], 0.25);
        let expected = [0.25, 0.0, 0.75, 0.25];
        for (a, b) in out.iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn glsl_mod_follows_divisor_sign() {
        assert_eq!(glsl_mod(17.0, 16.0), 1.0);
        assert_eq!(glsl_mod(-1.0, 16.0), 15.0);
        assert!((glsl_mod(12.5, 8.0) - 4.5).abs() < 1e-6);
    }

    #[test]
    fn glyph_pixels_come_from_their_atlas_cell() {
        // 2x2 atlas of 2x2 cells: glyph 0 is empty, glyph 1 has ink only in
        // its top-left pixel.
        let mut pixels = vec![0u8; 4 * 4 * 4];
        pixels[2 * 4] = 255;
        let geometry = AtlasGeometry::new(4, 4, 2, 2).unwrap();
        let atlas = AtlasImage::new(4, 4, &pixels).unwrap();

        let mut store = CellStore::new(2, 1).unwrap();
        store.set(0, 1, Rgba::WHITE, Rgba::BLACK).unwrap();
        store.set(1, 0, Rgba::WHITE, Rgba::BLACK).unwrap();

        let out = composite(&store, &geometry, &atlas).unwrap();
        assert_eq!((out.width(), out.height()), (4, 2));
        assert_eq!(out.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(out.pixel(1, 0), [0, 0, 0, 255]);
        assert_eq!(out.pixel(0, 1), [0, 0, 0, 255]);
        assert_eq!(out.pixel(2, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn mismatched_atlas_image_is_rejected() {
        let store = CellStore::new(1, 1).unwrap();
        let geometry = AtlasGeometry::new(2, 2, 1, 1).unwrap();
        let pixels = single_glyph(255);
        let atlas = AtlasImage::new(1, 1, &pixels).unwrap();
        assert!(composite(&store, &geometry, &atlas).is_err());
        assert!(AtlasImage::new(2, 2, &pixels).is_err());
    }
}
