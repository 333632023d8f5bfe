//! Augmented ARMv7M operations.
//!
//! # Interrupt management
//!
//! The equivalent operations in the `cortex_m` crate don't guarantee that the
//! change has taken effect by the time they return: a disabled interrupt can
//! still fire on the next instruction. The versions here follow each change
//! with the barriers recommended in *ARM Cortex-M Programming Guide to Memory
//! Barrier Instructions*.
//!
//! # Cycle counter
//!
//! Sync pulse widths are measured with the DWT cycle counter, which counts
//! system clock cycles and wraps every minute or so at 72MHz.

use cortex_m::peripheral::{DCB, DWT, NVIC};

/// Enables an interrupt. If it was pending, it will have had a chance to run
/// (priorities allowing) by the time this returns.
pub fn enable_irq(nvic: &mut NVIC, i: impl cortex_m::interrupt::Nr) {
    nvic.enable(i);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Disables an interrupt. Starting with the first instruction after the call,
/// execution cannot be preempted by it.
pub fn disable_irq(nvic: &mut NVIC, i: impl cortex_m::interrupt::Nr) {
    nvic.disable(i);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Ensures that an interrupt is not pending. If hardware continues generating
/// requests, it may immediately start pending again.
pub fn clear_pending_irq(i: impl cortex_m::interrupt::Nr) {
    NVIC::unpend(i);
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}

/// Starts the cycle counter.
pub fn enable_cycle_counter(dcb: &mut DCB, dwt: &mut DWT) {
    // TRCENA: the DWT is unclocked without it.
    const DEMCR_TRCENA: u32 = 1 << 24;
    // Safety: only turns on trace clocking; doesn't disturb debug state.
    unsafe { dcb.demcr.modify(|w| w | DEMCR_TRCENA) };
    dwt.enable_cycle_counter();
}

/// Reads the cycle counter.
pub fn cycle_count() -> u32 {
    // Safety: read-only access to a free-running counter.
    unsafe { (*DWT::ptr()).cyccnt.read() }
}
