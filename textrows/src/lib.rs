//! Text-row layout for the on-screen display box.
//!
//! This crate turns a few rows of text into packed 1bpp scanlines, one line at
//! a time, in the format the display's SPI scanout expects. It is deliberately
//! architecture-independent to allow for testing on the host.
//!
//! Glyph bitmaps are not part of this crate; callers supply them through the
//! [`Glyphs`] trait.
//!
//! [`Glyphs`]: trait.Glyphs.html

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod pack;

/// Maximum number of text rows in a display.
pub const MAX_ROWS: usize = 4;
/// Maximum number of character columns in a display row.
pub const MAX_COLS: usize = 40;
/// Width of a glyph, in pixels.
pub const GLYPH_WIDTH: usize = 8;
/// Height of a single-height glyph, in pixels (scanlines).
pub const GLYPH_HEIGHT: usize = 8;
/// Number of blank scanlines above the first row, between rows, and below the
/// last row.
pub const ROW_GAP: usize = 2;

/// Number of 16-bit words in one packed scanline: two characters per word, plus
/// a trailing blank word so the output returns to black after the box.
pub const ROW_WORDS: usize = MAX_COLS / 2 + 1;

/// One packed scanline, as streamed out MSB-first in 16-bit frames.
pub type PixelRow = [u16; ROW_WORDS];

/// A screenful of text for the display box.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Display {
    /// Row contents. Only the first `cols` bytes of the first `rows` rows are
    /// shown.
    pub text: [[u8; MAX_COLS]; MAX_ROWS],
    /// Number of columns shown.
    pub cols: u8,
    /// Number of rows shown.
    pub rows: u8,
    /// Bit `i` set means row `i` is drawn double height.
    pub heights: u8,
    /// Whether the box is shown at all.
    pub on: bool,
}

impl Display {
    pub const fn blank() -> Self {
        Display {
            text: [[b' '; MAX_COLS]; MAX_ROWS],
            cols: 0,
            rows: 0,
            heights: 0,
            on: false,
        }
    }

    /// Replaces row `row` with `s`, padding with spaces. Text beyond
    /// `MAX_COLS` is dropped.
    pub fn set_row(&mut self, row: usize, s: &[u8]) {
        let dest = &mut self.text[row];
        for (i, d) in dest.iter_mut().enumerate() {
            *d = s.get(i).cloned().unwrap_or(b' ');
        }
    }

    /// Is row `row` drawn at double height?
    pub fn is_double(&self, row: usize) -> bool {
        self.heights & (1 << row) != 0
    }

    fn row_count(&self) -> usize {
        usize::from(self.rows).min(MAX_ROWS)
    }

    fn col_count(&self) -> usize {
        usize::from(self.cols).min(MAX_COLS)
    }

    /// Number of scanlines needed to show this display, including the blank
    /// border lines. Not clamped to any buffer size.
    pub fn required_height(&self) -> usize {
        let rows = self.row_count();
        let doubles = (0..rows).filter(|&r| self.is_double(r)).count();
        rows * (GLYPH_HEIGHT + ROW_GAP) + ROW_GAP + doubles * GLYPH_HEIGHT
    }

    /// Box width in pixels.
    pub fn width_pixels(&self) -> usize {
        self.col_count() * GLYPH_WIDTH
    }
}

impl Default for Display {
    fn default() -> Self {
        Display::blank()
    }
}

/// Source of glyph bitmaps.
pub trait Glyphs {
    /// Returns scanline `y` (0..8) of the glyph for printable character `c`
    /// (0x20..=0x7f). The MSB is the leftmost pixel.
    fn line(&self, c: u8, y: usize) -> u8;
}

/// Where a given box scanline falls in the text layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinePos {
    /// A blank border or gap line.
    Blank,
    /// Glyph scanline `y` of text row `row`.
    Text { row: usize, y: usize },
}

/// Locates scanline `line` (counting from the top of the box) in the layout of
/// `display`.
pub fn locate(line: usize, display: &Display) -> LinePos {
    let mut y = line as isize - ROW_GAP as isize;
    for row in 0..display.row_count() {
        let double = display.is_double(row);
        let nr = (if double { 2 * GLYPH_HEIGHT } else { GLYPH_HEIGHT }) as isize;
        if y < 0 {
            return LinePos::Blank;
        }
        if y < nr {
            let y = if double { y / 2 } else { y };
            return LinePos::Text { row, y: y as usize };
        }
        y -= nr + ROW_GAP as isize;
    }
    LinePos::Blank
}

/// Renders box scanline `line` of `display` into `out`.
///
/// Characters outside the printable ASCII range are drawn as spaces.
pub fn render_line(
    line: usize,
    display: &Display,
    glyphs: &impl Glyphs,
    out: &mut PixelRow,
) {
    for w in out.iter_mut() {
        *w = 0;
    }

    let (row, y) = match locate(line, display) {
        LinePos::Blank => return,
        LinePos::Text { row, y } => (row, y),
    };

    let text = &display.text[row][..display.col_count()];
    for (x, &c) in text.iter().enumerate() {
        let c = if c < 0x20 || c > 0x7f { b' ' } else { c };
        pack::put_byte(out, x, glyphs.line(c, y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Glyph source where every line of every glyph is the character code,
    /// which makes packing easy to check.
    struct CodeGlyphs;

    impl Glyphs for CodeGlyphs {
        fn line(&self, c: u8, _y: usize) -> u8 {
            c
        }
    }

    /// Glyph source that encodes the glyph line number instead.
    struct LineGlyphs;

    impl Glyphs for LineGlyphs {
        fn line(&self, _c: u8, y: usize) -> u8 {
            1 << y
        }
    }

    fn display(rows: &[&[u8]], heights: u8) -> Display {
        let mut d = Display::blank();
        for (i, r) in rows.iter().enumerate() {
            d.set_row(i, r);
        }
        d.rows = rows.len() as u8;
        d.cols = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u8;
        d.heights = heights;
        d.on = true;
        d
    }

    #[test]
    fn height_single_rows() {
        assert_eq!(display(&[b"A"], 0).required_height(), 12);
        assert_eq!(display(&[b"A", b"B"], 0).required_height(), 22);
    }

    #[test]
    fn height_double_rows() {
        assert_eq!(display(&[b"A", b"B"], 0b01).required_height(), 30);
        assert_eq!(display(&[b"A", b"B", b"C", b"D"], 0xF).required_height(), 74);
    }

    #[test]
    fn width() {
        assert_eq!(display(&[b"hello"], 0).width_pixels(), 40);
    }

    #[test]
    fn layout_gaps() {
        let d = display(&[b"A", b"B"], 0);
        assert_eq!(locate(0, &d), LinePos::Blank);
        assert_eq!(locate(1, &d), LinePos::Blank);
        assert_eq!(locate(2, &d), LinePos::Text { row: 0, y: 0 });
        assert_eq!(locate(9, &d), LinePos::Text { row: 0, y: 7 });
        assert_eq!(locate(10, &d), LinePos::Blank);
        assert_eq!(locate(11, &d), LinePos::Blank);
        assert_eq!(locate(12, &d), LinePos::Text { row: 1, y: 0 });
        assert_eq!(locate(19, &d), LinePos::Text { row: 1, y: 7 });
        assert_eq!(locate(20, &d), LinePos::Blank);
        assert_eq!(locate(21, &d), LinePos::Blank);
    }

    #[test]
    fn layout_double_height_repeats_lines() {
        let d = display(&[b"A", b"B"], 0b01);
        assert_eq!(locate(2, &d), LinePos::Text { row: 0, y: 0 });
        assert_eq!(locate(3, &d), LinePos::Text { row: 0, y: 0 });
        assert_eq!(locate(17, &d), LinePos::Text { row: 0, y: 7 });
        assert_eq!(locate(18, &d), LinePos::Blank);
        assert_eq!(locate(20, &d), LinePos::Text { row: 1, y: 0 });
    }

    #[test]
    fn render_packs_even_columns_high() {
        let d = display(&[b"ABC"], 0);
        let mut out = [0xFFFF; ROW_WORDS];
        render_line(2, &d, &CodeGlyphs, &mut out);
        assert_eq!(out[0], (u16::from(b'A') << 8) | u16::from(b'B'));
        assert_eq!(out[1], u16::from(b'C') << 8);
        assert!(out[2..].iter().all(|&w| w == 0));
    }

    #[test]
    fn render_blank_line_clears() {
        let d = display(&[b"ABC"], 0);
        let mut out = [0xFFFF; ROW_WORDS];
        render_line(0, &d, &CodeGlyphs, &mut out);
        assert!(out.iter().all(|&w| w == 0));
    }

    #[test]
    fn render_replaces_unprintable() {
        let d = display(&[&[0x01, 0x80, b'Z']], 0);
        let mut out = [0; ROW_WORDS];
        render_line(2, &d, &CodeGlyphs, &mut out);
        assert_eq!(out[0], 0x2020);
        assert_eq!(out[1], u16::from(b'Z') << 8);
    }

    #[test]
    fn render_double_height_line_index() {
        let d = display(&[b"AB"], 0b1);
        let mut out = [0; ROW_WORDS];
        render_line(2 + 5, &d, &LineGlyphs, &mut out);
        // Line 5 of a double-height row is glyph line 2.
        assert_eq!(out[0], 0x0404);
    }

    #[test]
    fn full_width_keeps_trailing_word_black() {
        let mut d = display(&[&[b'#'; MAX_COLS]], 0);
        d.cols = MAX_COLS as u8;
        let mut out = [0; ROW_WORDS];
        render_line(2, &d, &CodeGlyphs, &mut out);
        assert_eq!(out[ROW_WORDS - 2], 0x2323);
        assert_eq!(out[ROW_WORDS - 1], 0);
    }
}
