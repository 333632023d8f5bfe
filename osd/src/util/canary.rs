//! Stack overflow detection with a canary word.
//!
//! A known value is written at the lowest address the stack may reach. If
//! the stack ever grows into it, the value is overwritten and the next check
//! fails.

use core::ptr;

/// Canary value.
pub const CANARY: u32 = 0xdead_beef;

/// An installed canary.
#[derive(Debug)]
pub struct Canary {
    word: *mut u32,
}

impl Canary {
    /// Writes the canary to `word`.
    ///
    /// # Safety
    ///
    /// `word` must be valid for volatile reads and writes for as long as the
    /// returned `Canary` is in use, and nothing but a stack overflow may write
    /// it.
    pub unsafe fn install(word: *mut u32) -> Self {
        ptr::write_volatile(word, CANARY);
        Canary { word }
    }

    pub fn is_intact(&self) -> bool {
        // Safety: validity guaranteed by the contract of `install`.
        unsafe { ptr::read_volatile(self.word) == CANARY }
    }

    /// Panics if the canary has been overwritten.
    pub fn check(&self) {
        if !self.is_intact() {
            panic!("stack overflow");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intact_until_overwritten() {
        let mut word = 0u32;
        let c = unsafe { Canary::install(&mut word) };
        assert!(c.is_intact());
        c.check();
        unsafe { ptr::write_volatile(&mut word, 0) };
        assert!(!c.is_intact());
    }

    #[test]
    #[should_panic]
    fn check_panics_when_clobbered() {
        let mut word = 0u32;
        let c = unsafe { Canary::install(&mut word) };
        unsafe { ptr::write_volatile(&mut word, 0x1234) };
        c.check();
    }
}
