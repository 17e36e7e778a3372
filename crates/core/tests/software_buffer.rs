use cellquad_core::{AtlasImage, Rgba, SoftwareTextBuffer, TextBufferError};

/// 16x16 glyph atlas of 2x2 cells where glyph `n` has ink only in its
/// top-left pixel when `n` is odd. Glyph 255 is fully inked.
fn checker_atlas() -> Vec<u8> {
    let (w, h) = (32usize, 32usize);
    let mut pixels = vec![0u8; w * h * 4];
    for glyph in 0..256usize {
        let (gx, gy) = ((glyph % 16) * 2, (glyph / 16) * 2);
        for dy in 0..2 {
            for dx in 0..2 {
                let ink = glyph == 255 || (glyph % 2 == 1 && dx == 0 && dy == 0);
                let o = ((gy + dy) * w + gx + dx) * 4;
                let v = if ink { 255 } else { 0 };
                pixels[o..o + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
    }
    pixels
}

#[test]
fn clean_draws_do_not_recomposite() {
    let pixels = checker_atlas();
    let atlas = AtlasImage::new(32, 32, &pixels).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(4, 3, atlas, 2, 2).unwrap();
    buffer.print(0usize, "hello").unwrap();

    let first = buffer.draw().unwrap().clone();
    let second = buffer.draw().unwrap().clone();

    assert_eq!(buffer.composite_count(), 1);
    assert_eq!(first, second);
    assert!(!buffer.is_dirty());
}

#[test]
fn mutation_triggers_exactly_one_more_composite() {
    let pixels = checker_atlas();
    let atlas = AtlasImage::new(32, 32, &pixels).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(2, 1, atlas, 2, 2).unwrap();

    let before = buffer.draw().unwrap().pixel(0, 0);
    assert_eq!(before, [0, 0, 0, 255]);

    buffer.set(0, 255, Rgba::rgb(9, 8, 7), Rgba::BLACK).unwrap();
    buffer.set_colors(1, Rgba::WHITE, Rgba::rgba(0, 0, 0, 0)).unwrap();
    let after = buffer.draw().unwrap();
    assert_eq!(after.pixel(0, 0), [9, 8, 7, 255]);
    assert_eq!(after.pixel(1, 1), [9, 8, 7, 255]);
    assert_eq!(after.pixel(2, 0), [0, 0, 0, 0]);

    buffer.draw().unwrap();
    assert_eq!(buffer.composite_count(), 2);
}

#[test]
fn surface_matches_grid_times_cell_size() {
    let pixels = checker_atlas();
    let atlas = AtlasImage::new(32, 32, &pixels).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(5, 4, atlas, 2, 2).unwrap();
    assert_eq!(
        (buffer.buffer_width(), buffer.buffer_height(), buffer.char_width(), buffer.char_height()),
        (5, 4, 2, 2)
    );
    let surface = buffer.draw().unwrap();
    assert_eq!((surface.width(), surface.height()), (10, 8));
}

#[test]
fn odd_glyphs_ink_only_their_first_pixel() {
    let pixels = checker_atlas();
    let atlas = AtlasImage::new(32, 32, &pixels).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(3, 1, atlas, 2, 2).unwrap();
    let red = Rgba::rgb(255, 0, 0);
    let blue = Rgba::rgb(0, 0, 255);
    buffer.print_colored(0usize, "\u{11}\u{10}", red, blue).unwrap();

    let surface = buffer.draw().unwrap();
    // glyph 17 (odd) sits at atlas cell (1, 1)
    assert_eq!(surface.pixel(0, 0), [255, 0, 0, 255]);
    assert_eq!(surface.pixel(1, 0), [0, 0, 255, 255]);
    assert_eq!(surface.pixel(0, 1), [0, 0, 255, 255]);
    // glyph 16 (even) is blank
    assert_eq!(surface.pixel(2, 0), [0, 0, 255, 255]);
}

#[test]
fn replacing_the_font_marks_dirty_and_resizes() {
    let small = checker_atlas();
    let big = vec![255u8; 64 * 64 * 4];
    let atlas = AtlasImage::new(32, 32, &small).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(2, 2, atlas, 2, 2).unwrap();
    buffer.draw().unwrap();

    let solid = AtlasImage::new(64, 64, &big).unwrap();
    buffer.set_font_texture(solid, Some((4, 4))).unwrap();
    assert!(buffer.is_dirty());

    let surface = buffer.draw().unwrap();
    assert_eq!((surface.width(), surface.height()), (8, 8));
    assert_eq!(surface.pixel(7, 7), [192, 192, 192, 255]);
    assert_eq!(buffer.composite_count(), 2);
}

#[test]
fn indivisible_font_replacement_is_rejected_and_ignored() {
    let pixels = checker_atlas();
    let atlas = AtlasImage::new(32, 32, &pixels).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(2, 2, atlas, 2, 2).unwrap();

    let err = buffer.set_font_texture(atlas, Some((3, 3))).unwrap_err();
    assert!(matches!(err, TextBufferError::Configuration(_)));
    assert_eq!(buffer.char_width(), 2);
}

#[test]
fn store_writes_through_the_buffer_always_leave_it_dirty() {
    let pixels = checker_atlas();
    let atlas = AtlasImage::new(32, 32, &pixels).unwrap();
    let mut buffer = SoftwareTextBuffer::with_char_size(2, 1, atlas, 2, 2).unwrap();
    buffer.draw().unwrap();
    assert!(!buffer.is_dirty());

    buffer.clear_with(255, Rgba::WHITE, Rgba::BLACK);
    assert!(buffer.is_dirty());
    assert_eq!(buffer.draw().unwrap().pixel(3, 1), [255, 255, 255, 255]);
    assert_eq!(buffer.composite_count(), 2);
}
