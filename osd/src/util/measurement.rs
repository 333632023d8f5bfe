//! Timing measurement using GPIOs, compiled out unless the `measurement`
//! feature is set.
//!
//! Each [`Signal`] drives one pin on GPIOC high while the code it marks is
//! running, so interrupt latency and duration relative to the sync input can be
//! read off a scope or logic analyzer. The pins are:
//!
//! - `SyncEdge`: C8
//! - `Guard`: C9
//! - `LineEnd`: C10
//! - `Frame`: C11
//!
//! This circumvents all hardware ownership. If your application uses C8-C11
//! for anything else, weird stuff ensues.
//!
//! On the host (and in simulation) every operation here is a no-op.
//!
//! [`Signal`]: enum.Signal.html

/// Measurement outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    /// A sync-edge or vertical sync interrupt.
    SyncEdge = 8,
    /// A pre-start or pre-end guard interrupt.
    Guard = 9,
    /// The end-of-line interrupt.
    LineEnd = 10,
    /// Rendering of a frame in thread mode.
    Frame = 11,
}

impl Signal {
    #[allow(dead_code)]
    fn pin(self) -> u32 {
        self as u32
    }
}

/// Sets up the measurement pins.
///
/// Note: if the `measurement` feature is enabled, this will power on GPIOC and
/// configure pins 8-11 as fast push-pull outputs.
///
/// # Safety
///
/// This is safe *as long as* it's not preempted. If interrupts are enabled, and
/// interrupts attempt to configure either RCC or GPIOC, their updates may be
/// reverted. Call this from early in `main` and you're good.
pub unsafe fn init() {
    #[cfg(all(feature = "measurement", target_os = "none"))]
    {
        use stm32f4::stm32f407 as device;
        let rcc = &*device::RCC::ptr();
        let gpioc = &*device::GPIOC::ptr();

        // GPIOCEN
        rcc.ahb1enr.modify(|r, w| w.bits(r.bits() | 1 << 2));
        cortex_m::asm::dsb();

        // Two bits per pin, pins 8-11.
        const FIELD: u32 = 0xFF << 16;
        gpioc.pupdr.modify(|r, w| w.bits(r.bits() & !FIELD));
        gpioc.ospeedr.modify(|r, w| w.bits(r.bits() | FIELD));
        gpioc
            .moder
            .modify(|r, w| w.bits((r.bits() & !FIELD) | 0x55 << 16));
    }
}

/// Drives `sig` high.
///
/// If the `measurement` feature is not set, this is a no-op.
pub fn set(sig: Signal) {
    #[cfg(all(target_os = "none", feature = "measurement"))]
    write_bsrr(1 << sig.pin());
    #[cfg(not(all(target_os = "none", feature = "measurement")))]
    let _ = sig;
}

/// Drives `sig` low.
///
/// If the `measurement` feature is not set, this is a no-op.
pub fn clear(sig: Signal) {
    #[cfg(all(target_os = "none", feature = "measurement"))]
    write_bsrr(1 << (sig.pin() + 16));
    #[cfg(not(all(target_os = "none", feature = "measurement")))]
    let _ = sig;
}

/// Holds a measurement signal high for the rest of the enclosing scope:
///
/// ```ignore
/// ffosd::span!(Signal::LineEnd);
/// ```
#[macro_export]
macro_rules! span {
    ($sig:expr) => {
        let __sig = $sig;
        $crate::util::measurement::set(__sig);
        $crate::scopeguard::defer!($crate::util::measurement::clear(__sig));
    };
}

#[cfg(all(target_os = "none", feature = "measurement"))]
fn write_bsrr(bits: u32) {
    use stm32f4::stm32f407 as device;
    // Safety: writes to this register are atomic and idempotent.
    unsafe { (*device::GPIOC::ptr()).bsrr.write(|w| w.bits(bits)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_wraps_a_block_value() {
        let frames = {
            crate::span!(Signal::Frame);
            3
        };
        assert_eq!(frames, 3);
    }
}
