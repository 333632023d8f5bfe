//! Interrupt entry points.
//!
//! All five of these must be wired up by the application for the driver to
//! work, and all run at the same priority. For example:
//!
//! ```ignore
//! use stm32f4::stm32f407::interrupt;
//!
//! #[interrupt]
//! fn EXTI9_5() {
//!     ffosd::csync_isr()
//! }
//! ```

use crate::priority;
use crate::span;
use crate::timing::Instant;
use crate::util::armv7m::cycle_count;
use crate::util::measurement::Signal;
use crate::util::spin_lock::SpinLockGuard;

use super::{acquire_hw, HwEngine, ENGINE};

/// Takes the engine from inside one of the handlers below.
fn engine() -> SpinLockGuard<'static, HwEngine> {
    // Safety: only called from the driver's own handlers, which all run at
    // driver priority.
    acquire_hw(&ENGINE, unsafe { priority::Driver::new() })
}

/// Sync edge ISR: call this from `EXTI9_5`.
pub fn csync_isr() {
    // Timestamp before anything else, so that latency cancels out of the
    // pulse width.
    let now = Instant(cycle_count());
    span!(Signal::SyncEdge);
    let mut engine = engine();
    let level = engine.cascade().ack_csync();
    engine.sync_edge(level, now);
}

/// Vertical sync ISR: call this from `EXTI15_10`.
pub fn vsync_isr() {
    span!(Signal::SyncEdge);
    let mut engine = engine();
    engine.cascade().ack_vsync();
    engine.vsync();
}

/// Pre-start guard ISR: call this from `TIM2`.
pub fn pre_start_isr() {
    span!(Signal::Guard);
    engine().pre_start();
}

/// Pre-end guard ISR: call this from `TIM1_CC`.
pub fn pre_end_isr() {
    span!(Signal::Guard);
    engine().pre_end();
}

/// End-of-line ISR: call this from `DMA2_STREAM6`.
///
/// This has to finish before the next sync edge, or the box shifts by a line.
pub fn line_end_isr() {
    span!(Signal::LineEnd);
    engine().line_end();
}
