use serde::{Deserialize, Serialize};
use std::fmt;

use crate::color::Rgba;

/// Foreground used when no color is given.
pub const DEFAULT_FG: Rgba = Rgba::LIGHT_GRAY;
/// Background used when no color is given.
pub const DEFAULT_BG: Rgba = Rgba::BLACK;

/// One grid slot: a glyph index plus two colors.
///
/// Only the RGB part of `fg` is stored; reading a cell back always yields an
/// opaque foreground because the texel alpha holds the glyph index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub ch: u8,
    pub fg: Rgba,
    pub bg: Rgba,
}

impl Cell {
    pub const fn new(ch: u8, fg: Rgba, bg: Rgba) -> Self {
        Self { ch, fg, bg }
    }

    /// Glyph 0 drawn with the given colors.
    pub const fn colors(fg: Rgba, bg: Rgba) -> Self {
        Self::new(0, fg, bg)
    }

    /// Glyph 0 with foreground and background both set to `color`.
    pub const fn solid(color: Rgba) -> Self {
        Self::new(0, color, color)
    }
}

impl Default for Cell {
    fn default() -> Self {
        Cell::new(0, DEFAULT_FG, DEFAULT_BG)
    }
}

impl From<u8> for Cell {
    fn from(ch: u8) -> Self {
        Cell::new(ch, DEFAULT_FG, DEFAULT_BG)
    }
}

impl From<char> for Cell {
    fn from(c: char) -> Self {
        Cell::from(glyph_for_char(c))
    }
}

impl From<Cell> for char {
    fn from(cell: Cell) -> Self {
        char::from(cell.ch)
    }
}

/// Glyph substituted for characters above U+00FF.
pub const REPLACEMENT_GLYPH: u8 = b'?';

/// Maps a char to its single-byte glyph slot (Latin-1 identity mapping).
pub fn glyph_for_char(c: char) -> u8 {
    u8::try_from(u32::from(c)).unwrap_or(REPLACEMENT_GLYPH)
}

/// A cell address, either a flat index or a column/row pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellPos {
    Index(usize),
    Xy(u32, u32),
}

impl From<usize> for CellPos {
    fn from(i: usize) -> Self {
        CellPos::Index(i)
    }
}

impl From<(u32, u32)> for CellPos {
    fn from((x, y): (u32, u32)) -> Self {
        CellPos::Xy(x, y)
    }
}

impl fmt::Display for CellPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellPos::Index(i) => write!(f, "index {}", i),
            CellPos::Xy(x, y) => write!(f, "({}, {})", x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cell_is_gray_on_black_glyph_zero() {
        let cell = Cell::default();
        assert_eq!(cell.ch, 0);
        assert_eq!(cell.fg, Rgba::rgb(192, 192, 192));
        assert_eq!(cell.bg, Rgba::BLACK);
    }

    #[test]
    fn char_conversion_uses_latin1_slots() {
        assert_eq!(Cell::from('A').ch, 65);
        assert_eq!(Cell::from('\u{e9}').ch, 0xe9);
        assert_eq!(Cell::from('\u{263a}').ch, REPLACEMENT_GLYPH);
        assert_eq!(char::from(Cell::from(b'z')), 'z');
    }

    #[test]
    fn solid_uses_one_color_for_both_layers() {
        let red = Rgba::rgb(255, 0, 0);
        assert_eq!(Cell::solid(red), Cell::new(0, red, red));
    }
}
