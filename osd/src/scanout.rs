//! Pixel storage and the stream that shifts it out, one row per line.

use textrows::{PixelRow, ROW_WORDS};

use crate::config::MAX_DISPLAY_HEIGHT;

/// Rows of packed pixels for the overlay box. Row `n` is shifted out on the
/// `n`th line of the box.
pub struct PixelBuffer {
    pub rows: [PixelRow; MAX_DISPLAY_HEIGHT],
}

impl PixelBuffer {
    pub const fn new() -> Self {
        PixelBuffer {
            rows: [[0; ROW_WORDS]; MAX_DISPLAY_HEIGHT],
        }
    }
}

/// Number of 16-bit words streamed per line for a box `width` pixels wide,
/// including the trailing blank word.
pub fn row_words(width: u16) -> usize {
    textrows::pack::words_for_width(usize::from(width)).min(ROW_WORDS)
}

/// The pixel stream.
///
/// The stream is armed in advance and released by the cascade; this trait
/// only positions it.
pub trait Scanout {
    /// Re-arms the stream to send `words` words starting at row `row` of the
    /// pixel buffer when next released.
    fn point_at(&mut self, row: usize, words: usize);
}

/// Advances the row cursor after a line, sticking at the last row so that a
/// box taller than the buffer repeats its last line instead of streaming past
/// the end.
pub fn next_row(row: usize) -> usize {
    (row + 1).min(MAX_DISPLAY_HEIGHT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_per_row() {
        assert_eq!(row_words(0), 1);
        assert_eq!(row_words(8), 2);
        assert_eq!(row_words(256), 17);
        assert_eq!(row_words(320), ROW_WORDS);
        assert_eq!(row_words(1000), ROW_WORDS);
    }

    #[test]
    fn cursor_clamps() {
        assert_eq!(next_row(0), 1);
        assert_eq!(next_row(MAX_DISPLAY_HEIGHT - 2), MAX_DISPLAY_HEIGHT - 1);
        assert_eq!(next_row(MAX_DISPLAY_HEIGHT - 1), MAX_DISPLAY_HEIGHT - 1);
    }
}
