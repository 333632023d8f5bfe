//! Packing of 8-pixel glyph slices into 16-bit scanout words.
//!
//! The display SPI shifts out 16-bit frames MSB first, so the even column of
//! each pair lands in the high byte.

/// ORs the 8 pixels in `bits` into column `x` of `row`.
///
/// # Panics
///
/// If `x` falls outside `row`.
pub fn put_byte(row: &mut [u16], x: usize, bits: u8) {
    let shift = if x & 1 == 0 { 8 } else { 0 };
    row[x / 2] |= u16::from(bits) << shift;
}

/// Number of words the scanout must transfer to show `width` pixels, including
/// the trailing blank word.
pub fn words_for_width(width: usize) -> usize {
    (width + 15) / 16 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_and_even_columns() {
        let mut row = [0u16; 3];
        put_byte(&mut row, 0, 0xAA);
        put_byte(&mut row, 1, 0x55);
        put_byte(&mut row, 2, 0x0F);
        assert_eq!(row, [0xAA55, 0x0F00, 0]);
    }

    #[test]
    fn put_byte_merges() {
        let mut row = [0x0100u16];
        put_byte(&mut row, 0, 0x80);
        assert_eq!(row[0], 0x8100);
    }

    #[test]
    #[should_panic]
    fn put_byte_out_of_range() {
        let mut row = [0u16; 2];
        put_byte(&mut row, 4, 1);
    }

    #[test]
    fn word_counts() {
        assert_eq!(words_for_width(0), 1);
        assert_eq!(words_for_width(8), 2);
        assert_eq!(words_for_width(16), 2);
        assert_eq!(words_for_width(320), 21);
    }
}
