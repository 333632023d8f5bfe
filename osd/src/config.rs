//! Overlay placement and sync polarity, as handed to the driver by the
//! configuration subsystem.

use smart_default::SmartDefault;

/// Maximum number of scanlines in the overlay box. This sizes the pixel buffer.
pub const MAX_DISPLAY_HEIGHT: usize = 52;

/// Maximum width of the overlay box, in pixels.
pub const MAX_DISPLAY_WIDTH: usize = textrows::MAX_COLS * textrows::GLYPH_WIDTH;

/// Polarity of the incoming sync signal, i.e. the level that means "sync pulse
/// in progress."
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    /// Pin level observed while a sync pulse is in progress.
    pub fn active_level(self) -> bool {
        self == Polarity::ActiveHigh
    }
}

/// Size of the overlay box. Its placement comes with [`OsdConfig`].
///
/// [`OsdConfig`]: struct.OsdConfig.html
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct OverlayGeometry {
    /// Box height in scanlines.
    pub height: u16,
    /// Box width in pixels.
    pub width: u16,
}

impl OverlayGeometry {
    /// Returns a copy with height and width limited to what the pixel buffer
    /// can hold. Oversized requests are not an error.
    pub fn clamped(self) -> Self {
        OverlayGeometry {
            height: self.height.min(MAX_DISPLAY_HEIGHT as u16),
            width: self.width.min(MAX_DISPLAY_WIDTH as u16),
        }
    }
}

/// Settings owned by the configuration subsystem that the driver consumes.
/// Changes take effect at the start of the next frame.
///
/// Offsets are in scanlines (vertical) and in horizontal units of
/// [`Timing::cycles_per_h_unit`] clock cycles (horizontal).
///
/// [`Timing::cycles_per_h_unit`]: ../timing/struct.Timing.html
#[derive(Copy, Clone, Debug, Eq, PartialEq, SmartDefault)]
pub struct OsdConfig {
    #[default(Polarity::ActiveLow)]
    pub polarity: Polarity,
    #[default = 42]
    pub h_offset: u16,
    /// First line of the box, counting the line after vertical blank as 1.
    /// Values below 2 cut lines off the bottom of the box, since line 1 is
    /// never drawn.
    #[default = 30]
    pub v_offset: u16,
}

impl OsdConfig {
    pub fn new(polarity: Polarity, h_offset: u16, v_offset: u16) -> Self {
        OsdConfig {
            polarity,
            h_offset,
            v_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_height_and_width() {
        let g = OverlayGeometry {
            height: MAX_DISPLAY_HEIGHT as u16 + 5,
            width: 1000,
        }
        .clamped();
        assert_eq!(g.height as usize, MAX_DISPLAY_HEIGHT);
        assert_eq!(g.width as usize, MAX_DISPLAY_WIDTH);
    }

    #[test]
    fn clamp_leaves_small_boxes_alone() {
        let g = OverlayGeometry {
            height: 10,
            width: 256,
        };
        assert_eq!(g.clamped(), g);
    }

    #[test]
    fn defaults() {
        let c = OsdConfig::default();
        assert_eq!(c.polarity, Polarity::ActiveLow);
        assert!(!c.polarity.active_level());
        assert!(Polarity::ActiveHigh.active_level());
        assert_eq!(c.h_offset, 42);
        assert_eq!(c.v_offset, 30);
    }
}
