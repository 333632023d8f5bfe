//! Placeholder collaborators for the overlay: a status page, a one-line
//! placement menu, and a glyph source that draws every character as an
//! outlined cell.
//!
//! These stand in for the real configuration subsystem and font, so that the
//! firmware can be brought up against a video source on its own.

use ffosd::buttons::{B_LEFT, B_RIGHT, B_SELECT};
use ffosd::config::OsdConfig;
use ffosd::orchestrator::{Content, KeySource};
use textrows::{Display, Glyphs};

/// Glyphs that outline every printable character.
pub struct CellGlyphs;

impl Glyphs for CellGlyphs {
    fn line(&self, c: u8, y: usize) -> u8 {
        match (c, y) {
            (b' ', _) => 0,
            (_, 0) | (_, 7) => 0b0111_1110,
            _ => 0b0100_0010,
        }
    }
}

/// Horizontal offset change per button press.
const NUDGE: u16 = 2;

/// A status page, and a menu for nudging the box sideways.
pub struct Status {
    normal: Display,
    menu: Display,
    menu_open: bool,
    config: OsdConfig,
}

impl Status {
    pub fn new(config: OsdConfig) -> Self {
        let mut normal = Display::blank();
        normal.set_row(0, b"FFOSD");
        normal.cols = 5;
        normal.rows = 1;
        normal.on = true;

        let mut menu = Display::blank();
        menu.set_row(0, b"< POSITION >");
        menu.cols = 12;
        menu.rows = 1;
        menu.heights = 0b1;
        menu.on = true;

        Status {
            normal,
            menu,
            menu_open: false,
            config,
        }
    }
}

impl Content for Status {
    fn normal(&self) -> &Display {
        &self.normal
    }

    fn menu(&self) -> Option<&Display> {
        if self.menu_open {
            Some(&self.menu)
        } else {
            None
        }
    }

    fn config(&self) -> OsdConfig {
        self.config
    }

    fn buttons(&mut self, b: u8) {
        if b & B_SELECT != 0 {
            self.menu_open = !self.menu_open;
        }
        if !self.menu_open {
            return;
        }
        if b & B_LEFT != 0 {
            self.config.h_offset = self.config.h_offset.saturating_sub(NUDGE);
        }
        if b & B_RIGHT != 0 {
            self.config.h_offset = self.config.h_offset.saturating_add(NUDGE);
        }
    }
}

/// Stand-in for a keyboard that isn't attached.
pub struct NoKeys;

impl KeySource for NoKeys {
    fn keys(&mut self) -> u8 {
        0
    }

    fn keyboard_held(&self) -> bool {
        false
    }
}
