//! Button event plumbing between the debouncer, the key source and the
//! configuration subsystem.
//!
//! The bits themselves mean nothing here; they're gathered and passed on.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Button bits, as produced by the debouncer and consumed by the
/// configuration subsystem.
pub const B_LEFT: u8 = 1 << 0;
pub const B_RIGHT: u8 = 1 << 1;
pub const B_SELECT: u8 = 1 << 2;
/// Set by the debouncer on each tick that reported anything, so that a latch
/// holding no presses still gets processed.
pub const B_PROCESSED: u8 = 1 << 7;

/// Key bits, as reported by a keyboard key source.
pub const K_LEFT: u8 = B_LEFT;
pub const K_RIGHT: u8 = B_RIGHT;
pub const K_SELECT: u8 = B_SELECT;
pub const K_MENU: u8 = 1 << 3;

/// Accumulates button bits posted from interrupt context until thread code
/// takes them.
#[derive(Debug)]
pub struct ButtonLatch {
    bits: AtomicUsize,
}

impl ButtonLatch {
    pub const fn new() -> Self {
        ButtonLatch {
            bits: AtomicUsize::new(0),
        }
    }

    /// ORs `bits` into the latch.
    pub fn post(&self, bits: u8) {
        self.bits.fetch_or(usize::from(bits), Ordering::Relaxed);
    }

    /// Is anything waiting?
    pub fn is_set(&self) -> bool {
        self.bits.load(Ordering::Relaxed) != 0
    }

    /// Atomically reads and clears the latch.
    pub fn take(&self) -> u8 {
        self.bits.swap(0, Ordering::Relaxed) as u8
    }
}

/// Folds key presses and remotely injected buttons into a button mask taken
/// from the latch, and strips the latch marker.
///
/// While the menu is up, the navigation keys act as buttons. Otherwise only the
/// menu key does anything, and it acts as SELECT (which opens the menu).
pub fn fold(buttons: u8, keys: u8, menu_active: bool, remote: u8) -> u8 {
    let mut b = buttons;
    if menu_active {
        b |= keys & (K_LEFT | K_RIGHT | K_SELECT);
    } else if keys & K_MENU != 0 {
        b |= B_SELECT;
    }
    (b | remote) & !B_PROCESSED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_accumulates_and_clears() {
        let l = ButtonLatch::new();
        assert!(!l.is_set());
        l.post(B_LEFT);
        l.post(B_PROCESSED);
        assert!(l.is_set());
        assert_eq!(l.take(), B_LEFT | B_PROCESSED);
        assert!(!l.is_set());
        assert_eq!(l.take(), 0);
    }

    #[test]
    fn fold_strips_marker() {
        assert_eq!(fold(B_PROCESSED, 0, false, 0), 0);
        assert_eq!(fold(B_RIGHT | B_PROCESSED, 0, true, 0), B_RIGHT);
    }

    #[test]
    fn fold_keys_in_menu() {
        assert_eq!(
            fold(B_PROCESSED, K_LEFT | K_MENU, true, 0),
            B_LEFT
        );
    }

    #[test]
    fn fold_menu_key_outside_menu() {
        assert_eq!(fold(B_PROCESSED, K_MENU | K_LEFT, false, 0), B_SELECT);
    }

    #[test]
    fn fold_remote() {
        assert_eq!(fold(B_PROCESSED, 0, false, B_RIGHT), B_RIGHT);
    }
}
