//! The chained timer units that place one line of overlay output relative to a
//! sync edge.
//!
//! The cascade has a master unit and two slaves:
//!
//! - The master is reset by the end of each sync pulse (while armed), and its
//!   update event triggers both slaves.
//! - The output-enable slave rolls over first and requests a transfer that
//!   switches the display pin to its output function.
//! - The data slave rolls over `enable_lead_cycles` later and requests a
//!   transfer that releases the pixel stream. It also raises the pre-start
//!   interrupt one guard window ahead of that.
//! - Once the data slave has fired, the master is retasked to count from it,
//!   and its end-of-box compare requests a transfer that disconnects the pin
//!   again. A pre-end compare one guard window earlier raises an interrupt.
//!
//! This module computes the values loaded into the cascade and defines the
//! [`Cascade`] trait, the operations the line engine performs on it.
//!
//! [`Cascade`]: trait.Cascade.html

use crate::config::Polarity;
use crate::timing::Timing;

/// Reload values for the two slave units, counted from the master's update
/// event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlaveReloads {
    /// Auto-reload of the data slave; its update releases the pixel stream.
    pub data: u32,
    /// Auto-reload of the output-enable slave.
    pub enable: u32,
    /// Compare value on the data slave that raises the pre-start interrupt.
    pub pre_start: u32,
}

/// Computes slave reloads for a horizontal offset of `h_offset` units.
///
/// Offsets too small to fit the output-enable lead and guard window collapse
/// to the earliest possible event rather than wrapping.
pub fn slave_reloads(timing: &Timing, h_offset: u16) -> SlaveReloads {
    let hstart = u32::from(h_offset) * timing.cycles_per_h_unit;
    SlaveReloads {
        data: hstart.saturating_sub(1).max(1),
        enable: hstart
            .saturating_sub(1 + timing.enable_lead_cycles)
            .max(1),
        pre_start: hstart.saturating_sub(timing.guard_cycles).max(1),
    }
}

/// Compare values on the master unit, counted from the release of the pixel
/// stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoxCompare {
    /// Disconnects the display pin.
    pub end: u32,
    /// Raises the pre-end interrupt.
    pub pre_end: u32,
}

/// Computes the end-of-box compares for a box `width` pixels wide.
pub fn box_compare(timing: &Timing, width: u16) -> BoxCompare {
    let end = timing.ticks_per_pixel * u32::from(width)
        + timing.box_margin_cycles;
    BoxCompare {
        end,
        pre_end: end.saturating_sub(timing.guard_cycles).max(1),
    }
}

/// How the master unit responds to its trigger input.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MasterMode {
    /// Ignores triggers. Output stays off.
    Off,
    /// Restarts on the end of the next sync pulse, generating an update event
    /// that starts both slaves.
    ResetOnSync,
    /// Starts counting when the data slave releases the pixel stream, so that
    /// the end-of-box compare is measured from the first pixel.
    CountFromData,
}

/// Bits of the slave mode control register (SMCR) field values used below.
mod smcr {
    /// Master/slave mode: delay trigger output for synchronization.
    pub const MSM: u32 = 1 << 7;
    /// Trigger select: internal trigger 1 (data slave).
    pub const TS_ITR1: u32 = 0b001 << 4;
    /// Trigger select: filtered timer input 1 (the sync pin).
    pub const TS_TI1FP1: u32 = 0b101 << 4;
    /// Slave mode: reset on trigger.
    pub const SMS_RESET: u32 = 0b100;
    /// Slave mode: start on trigger.
    pub const SMS_TRIGGER: u32 = 0b110;
}

impl MasterMode {
    /// Value of the master unit's slave mode control register for this mode.
    pub fn smcr_bits(self) -> u32 {
        match self {
            MasterMode::Off => 0,
            MasterMode::ResetOnSync => {
                smcr::MSM | smcr::TS_TI1FP1 | smcr::SMS_RESET
            }
            MasterMode::CountFromData => smcr::TS_ITR1 | smcr::SMS_TRIGGER,
        }
    }
}

/// Slave mode control value for the two slave units: start when the master
/// (internal trigger 0) updates.
pub const SLAVE_SMCR: u32 = smcr::SMS_TRIGGER;

/// Operations on the timer cascade and the sync inputs feeding it.
///
/// None of these can fail. Implementations must be cheap enough to call from
/// the sync-edge interrupt.
pub trait Cascade {
    /// Loads horizontal placement into the slave units.
    fn load_slaves(&mut self, reloads: &SlaveReloads);
    /// Loads end-of-box compares into the master unit.
    fn load_box(&mut self, compare: &BoxCompare);
    /// Senses only the start-of-pulse edge for `polarity` on the sync inputs,
    /// and makes the master's input channel respond to the end of the pulse.
    fn set_polarity(&mut self, polarity: Polarity);
    /// Senses both edges on the sync inputs.
    fn sense_both_edges(&mut self);
    /// Changes what starts the master. A line the master is already counting
    /// runs to completion; only `end_line` stops it.
    fn set_master_mode(&mut self, mode: MasterMode);
    /// Acknowledges the end-of-box transfer and stops the master unit.
    fn end_line(&mut self);
    fn ack_pre_start(&mut self);
    fn ack_pre_end(&mut self);
    /// Holds off lower priority work for `cycles` clock cycles.
    fn quiesce(&mut self, cycles: u32);
}
