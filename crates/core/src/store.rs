//! Packed cell storage.
//!
//! Cells live in two parallel RGBA8 byte arrays laid out exactly as the GPU
//! textures expect them: the foreground array holds `(fg.r, fg.g, fg.b, ch)`
//! and the background array holds `(bg.r, bg.g, bg.b, bg.a)`. Cell `(x, y)`
//! is texel `y * width + x`, byte offset `texel * 4`.
//!
//! Every write bumps a revision counter that buffers compare against their
//! last composite to decide whether the surface is stale.

use serde::{Deserialize, Serialize};

use crate::cell::{glyph_for_char, Cell, CellPos, DEFAULT_BG, DEFAULT_FG};
use crate::color::Rgba;
use crate::error::{Result, TextBufferError};

/// How `print` behaves when the text does not fit on the starting row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintOverflow {
    /// Keep writing into the following rows. Text that would run past the
    /// last cell of the grid is rejected before anything is written.
    #[default]
    Flow,
    /// Stop at the end of the starting row.
    ClipToRow,
    /// Flow into following rows and drop whatever runs past the last cell.
    ClipToGrid,
}

pub struct CellStore {
    width: u32,
    height: u32,
    fore: Vec<u8>,
    back: Vec<u8>,
    default_fg: Rgba,
    default_bg: Rgba,
    overflow: PrintOverflow,
    revision: u64,
}

impl CellStore {
    /// Creates a `width` x `height` store cleared to the default cell.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(TextBufferError::Configuration(format!(
                "buffer size {}x{} must be non-zero",
                width, height
            )));
        }

        let len = width as usize * height as usize * 4;
        let mut store = Self {
            width,
            height,
            fore: vec![0; len],
            back: vec![0; len],
            default_fg: DEFAULT_FG,
            default_bg: DEFAULT_BG,
            overflow: PrintOverflow::default(),
            revision: 0,
        };
        store.clear();
        Ok(store)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Foreground texels, `(r, g, b, glyph)` per cell.
    pub fn fore_bytes(&self) -> &[u8] {
        &self.fore
    }

    /// Background texels, `(r, g, b, a)` per cell.
    pub fn back_bytes(&self) -> &[u8] {
        &self.back
    }

    /// Changes with every write, never with a read.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn default_colors(&self) -> (Rgba, Rgba) {
        (self.default_fg, self.default_bg)
    }

    /// Colors used by `print` and `clear` when none are passed.
    pub fn set_default_colors(&mut self, fg: Rgba, bg: Rgba) {
        self.default_fg = fg;
        self.default_bg = bg;
    }

    pub fn print_overflow(&self) -> PrintOverflow {
        self.overflow
    }

    pub fn set_print_overflow(&mut self, overflow: PrintOverflow) {
        self.overflow = overflow;
    }

    /// Resolves a position to a flat index, rejecting anything off the grid.
    pub fn index_of(&self, pos: impl Into<CellPos>) -> Result<usize> {
        let pos = pos.into();
        match pos {
            CellPos::Index(i) if i < self.len() => Ok(i),
            CellPos::Xy(x, y) if x < self.width && y < self.height => {
                Ok(y as usize * self.width as usize + x as usize)
            }
            _ => Err(TextBufferError::index(pos, self.width, self.height)),
        }
    }

    /// Writes glyph and both colors at a flat index.
    pub fn set(&mut self, index: usize, ch: u8, fg: Rgba, bg: Rgba) -> Result<()> {
        let i = self.index_of(index)?;
        self.write(i, Some(ch), fg, bg);
        Ok(())
    }

    /// Writes only the colors at a flat index; the glyph is left as it was.
    pub fn set_colors(&mut self, index: usize, fg: Rgba, bg: Rgba) -> Result<()> {
        let i = self.index_of(index)?;
        self.write(i, None, fg, bg);
        Ok(())
    }

    pub fn set_xy(&mut self, x: u32, y: u32, ch: u8, fg: Rgba, bg: Rgba) -> Result<()> {
        let i = self.index_of((x, y))?;
        self.write(i, Some(ch), fg, bg);
        Ok(())
    }

    pub fn set_colors_xy(&mut self, x: u32, y: u32, fg: Rgba, bg: Rgba) -> Result<()> {
        let i = self.index_of((x, y))?;
        self.write(i, None, fg, bg);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<Cell> {
        self.index_of(index).map(|i| self.read(i))
    }

    pub fn get_xy(&self, x: u32, y: u32) -> Result<Cell> {
        self.index_of((x, y)).map(|i| self.read(i))
    }

    /// Reads a cell by index or `(x, y)`.
    pub fn cell(&self, pos: impl Into<CellPos>) -> Result<Cell> {
        self.index_of(pos).map(|i| self.read(i))
    }

    /// Writes a whole cell by index or `(x, y)`.
    pub fn set_cell(&mut self, pos: impl Into<CellPos>, cell: Cell) -> Result<()> {
        let i = self.index_of(pos)?;
        self.write(i, Some(cell.ch), cell.fg, cell.bg);
        Ok(())
    }

    /// Glyph 0 in the default colors everywhere.
    pub fn clear(&mut self) {
        self.clear_with(0, self.default_fg, self.default_bg);
    }

    pub fn clear_with(&mut self, ch: u8, fg: Rgba, bg: Rgba) {
        let fore = [fg.r, fg.g, fg.b, ch];
        let back: [u8; 4] = bg.into();
        for texel in self.fore.chunks_exact_mut(4) {
            texel.copy_from_slice(&fore);
        }
        for texel in self.back.chunks_exact_mut(4) {
            texel.copy_from_slice(&back);
        }
        self.revision = self.revision.wrapping_add(1);
    }

    /// Prints `text` in the default colors. See [`CellStore::print_colored`].
    pub fn print(&mut self, pos: impl Into<CellPos>, text: &str) -> Result<usize> {
        let (fg, bg) = (self.default_fg, self.default_bg);
        self.print_colored(pos, text, fg, bg)
    }

    /// Writes one glyph per char starting at `pos`, all with the same colors.
    ///
    /// Chars above U+00FF become `?`. Returns the number of cells written,
    /// which is less than the char count only under a clipping overflow mode.
    pub fn print_colored(
        &mut self,
        pos: impl Into<CellPos>,
        text: &str,
        fg: Rgba,
        bg: Rgba,
    ) -> Result<usize> {
        let glyphs: Vec<u8> = text.chars().map(glyph_for_char).collect();
        self.print_glyphs(pos, &glyphs, fg, bg)
    }

    /// Same as [`CellStore::print_colored`] with raw glyph indices.
    pub fn print_glyphs(
        &mut self,
        pos: impl Into<CellPos>,
        glyphs: &[u8],
        fg: Rgba,
        bg: Rgba,
    ) -> Result<usize> {
        let pos = pos.into();
        let start = self.index_of(pos)?;
        let grid_end = self.len();

        let end = match self.overflow {
            PrintOverflow::Flow => {
                let end = start + glyphs.len();
                if end > grid_end {
                    return Err(TextBufferError::index(
                        format!("{} + {} cells", pos, glyphs.len()),
                        self.width,
                        self.height,
                    ));
                }
                end
            }
            PrintOverflow::ClipToRow => {
                let row_end = (start / self.width as usize + 1) * self.width as usize;
                (start + glyphs.len()).min(row_end)
            }
            PrintOverflow::ClipToGrid => (start + glyphs.len()).min(grid_end),
        };

        for (i, &ch) in (start..end).zip(glyphs) {
            self.write(i, Some(ch), fg, bg);
        }
        Ok(end - start)
    }

    /// All cells in index order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.len()).map(move |i| self.read(i))
    }

    fn write(&mut self, index: usize, ch: Option<u8>, fg: Rgba, bg: Rgba) {
        let o = index * 4;
        self.fore[o..o + 3].copy_from_slice(&[fg.r, fg.g, fg.b]);
        if let Some(ch) = ch {
            self.fore[o + 3] = ch;
        }
        self.back[o..o + 4].copy_from_slice(&[bg.r, bg.g, bg.b, bg.a]);
        self.revision = self.revision.wrapping_add(1);
    }

    fn read(&self, index: usize) -> Cell {
        let o = index * 4;
        let f = &self.fore[o..o + 4];
        let b = &self.back[o..o + 4];
        Cell::new(f[3], Rgba::rgb(f[0], f[1], f[2]), Rgba::rgba(b[0], b[1], b[2], b[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RED: Rgba = Rgba::rgb(255, 0, 0);
    const BLUE: Rgba = Rgba::rgba(0, 0, 255, 128);

    fn store(w: u32, h: u32) -> CellStore {
        CellStore::new(w, h).unwrap()
    }

    #[test]
    fn new_store_is_cleared() {
        let s = store(4, 3);
        assert_eq!(s.revision(), 1);
        assert!(s.cells().all(|c| c == Cell::default()));
        assert_eq!(s.fore_bytes().len(), 4 * 3 * 4);
    }

    #[test]
    fn zero_sized_store_is_a_configuration_error() {
        assert!(matches!(
            CellStore::new(0, 5),
            Err(TextBufferError::Configuration(_))
        ));
    }

    #[test]
    fn packs_glyph_into_foreground_alpha() {
        let mut s = store(2, 2);
        s.set(3, b'A', Rgba::rgb(1, 2, 3), Rgba::rgba(4, 5, 6, 7)).unwrap();
        assert_eq!(&s.fore_bytes()[12..16], &[1, 2, 3, b'A']);
        assert_eq!(&s.back_bytes()[12..16], &[4, 5, 6, 7]);
    }

    #[test]
    fn xy_maps_to_row_major_index() {
        let mut s = store(5, 4);
        s.set_xy(2, 3, b'q', RED, BLUE).unwrap();
        assert_eq!(s.get(3 * 5 + 2).unwrap(), Cell::new(b'q', RED, BLUE));
        assert_eq!(s.cell((2u32, 3u32)).unwrap().ch, b'q');
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let mut s = store(3, 2);
        assert!(matches!(s.get(6), Err(TextBufferError::Index { .. })));
        assert!(s.set_xy(3, 0, 0, RED, RED).is_err());
        assert!(s.set_colors_xy(0, 2, RED, RED).is_err());
        assert!(s.set_cell(CellPos::Index(99), Cell::default()).is_err());
    }

    #[test]
    fn foreground_alpha_is_not_stored() {
        let mut s = store(1, 1);
        s.set(0, 7, Rgba::rgba(10, 20, 30, 40), BLUE).unwrap();
        assert_eq!(s.get(0).unwrap().fg, Rgba::rgb(10, 20, 30));
    }

    #[test]
    fn only_writes_advance_the_revision() {
        let mut s = store(2, 2);
        let before = s.revision();
        let _ = s.get(1).unwrap();
        let _ = s.cells().count();
        assert_eq!(s.revision(), before);

        s.set_colors(1, RED, RED).unwrap();
        assert_ne!(s.revision(), before);
        let after_write = s.revision();
        assert!(s.set(99, 0, RED, RED).is_err());
        assert_eq!(s.revision(), after_write);
    }

    #[test]
    fn clear_with_fills_every_cell() {
        let mut s = store(7, 3);
        s.clear_with(b'#', RED, BLUE);
        for i in 0..s.len() {
            assert_eq!(s.get(i).unwrap(), Cell::new(b'#', RED, BLUE));
        }
    }

    #[test]
    fn print_places_consecutive_glyphs() {
        let mut s = store(4, 2);
        assert_eq!(s.print_colored(0usize, "AB", RED, BLUE).unwrap(), 2);
        assert_eq!(s.get(0).unwrap(), Cell::new(b'A', RED, BLUE));
        assert_eq!(s.get(1).unwrap(), Cell::new(b'B', RED, BLUE));
        assert_eq!(s.get(2).unwrap(), Cell::default());
    }

    #[test]
    fn print_uses_default_colors() {
        let mut s = store(4, 1);
        s.set_default_colors(RED, BLUE);
        s.print((1u32, 0u32), "x").unwrap();
        assert_eq!(s.get(1).unwrap(), Cell::new(b'x', RED, BLUE));
    }

    #[test]
    fn print_flows_into_next_row_by_default() {
        let mut s = store(3, 2);
        s.print((1u32, 0u32), "abcd").unwrap();
        assert_eq!(s.get_xy(2, 0).unwrap().ch, b'b');
        assert_eq!(s.get_xy(0, 1).unwrap().ch, b'c');
        assert_eq!(s.get_xy(1, 1).unwrap().ch, b'd');
    }

    #[test]
    fn flow_past_grid_end_writes_nothing() {
        let mut s = store(3, 2);
        let err = s.print(4usize, "xyz").unwrap_err();
        assert!(matches!(err, TextBufferError::Index { .. }));
        assert!(s.cells().all(|c| c.ch == 0));
    }

    #[test]
    fn clip_to_row_stops_at_row_end() {
        let mut s = store(3, 2);
        s.set_print_overflow(PrintOverflow::ClipToRow);
        assert_eq!(s.print((1u32, 0u32), "abcd").unwrap(), 2);
        assert_eq!(s.get_xy(0, 1).unwrap().ch, 0);
    }

    #[test]
    fn clip_to_grid_drops_the_tail() {
        let mut s = store(3, 2);
        s.set_print_overflow(PrintOverflow::ClipToGrid);
        assert_eq!(s.print(4usize, "xyz").unwrap(), 2);
        assert_eq!(s.get(5).unwrap().ch, b'y');
    }

    #[test]
    fn print_maps_wide_chars_to_replacement() {
        let mut s = store(3, 1);
        s.print(0usize, "\u{e9}\u{4e2d}").unwrap();
        assert_eq!(s.get(0).unwrap().ch, 0xe9);
        assert_eq!(s.get(1).unwrap().ch, b'?');
    }

    #[test]
    fn cells_iterate_in_index_order() {
        let mut s = store(2, 2);
        s.print(0usize, "wxyz").unwrap();
        let glyphs: Vec<u8> = s.cells().map(|c| c.ch).collect();
        assert_eq!(glyphs, b"wxyz");
    }

    proptest! {
        #[test]
        fn set_then_get_round_trips(
            i in 0usize..48,
            ch: u8,
            fg in any::<[u8; 3]>(),
            bg in any::<[u8; 4]>(),
        ) {
            let mut s = store(8, 6);
            let (fg, bg) = (Rgba::from(fg), Rgba::from(bg));
            s.set(i, ch, fg, bg).unwrap();
            prop_assert_eq!(s.get(i).unwrap(), Cell::new(ch, fg, bg));
        }

        #[test]
        fn color_write_preserves_glyph(
            i in 0usize..48,
            ch: u8,
            fg1 in any::<[u8; 3]>(),
            fg2 in any::<[u8; 3]>(),
            bg2 in any::<[u8; 4]>(),
        ) {
            let mut s = store(8, 6);
            s.set(i, ch, Rgba::from(fg1), RED).unwrap();
            s.set_colors(i, Rgba::from(fg2), Rgba::from(bg2)).unwrap();
            prop_assert_eq!(s.get(i).unwrap(), Cell::new(ch, Rgba::from(fg2), Rgba::from(bg2)));
        }
    }
}
