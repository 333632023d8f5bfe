//! Cycle-level timing of the overlay relative to the host's sync pulses.
//!
//! Everything the interrupt handlers and timers need to know about time is
//! expressed here in system clock cycles, so that it can be loaded straight
//! into timer registers or compared against the cycle counter.

/// Timing parameters for the overlay cascade.
///
/// The timer units in the cascade all count at `sysclk_hz`.
#[derive(Clone, Debug)]
pub struct Timing {
    /// System (and timer) clock frequency.
    pub sysclk_hz: u32,
    /// Clock cycles per unit of configured horizontal offset.
    pub cycles_per_h_unit: u32,
    /// How far ahead of the first pixel the output pin is switched on, in
    /// cycles. Switching it on early avoids a glitch pixel at the box edge.
    pub enable_lead_cycles: u32,
    /// Timer ticks per pixel shifted out by the display SPI.
    pub ticks_per_pixel: u32,
    /// Allowance for the lead-in and lead-out of the box, in cycles, added to
    /// the box width when computing the end-of-box compare.
    pub box_margin_cycles: u32,
    /// Sync pulses longer than this many microseconds are vertical (serration
    /// or equalizing) pulses.
    pub long_pulse_us: u32,
    /// Length of the quiet window opened by the pre-start and pre-end
    /// interrupts, in cycles. Also how early those interrupts fire.
    pub guard_cycles: u32,
}

impl Timing {
    /// Clock cycles per microsecond.
    pub fn cycles_per_us(&self) -> u32 {
        self.sysclk_hz / 1_000_000
    }

    /// Clock cycles per millisecond.
    pub fn cycles_per_ms(&self) -> u32 {
        self.sysclk_hz / 1_000
    }

    /// Pulse width above which a sync pulse counts as long, in cycles.
    pub fn long_pulse_cycles(&self) -> u32 {
        self.long_pulse_us * self.cycles_per_us()
    }

    /// Converts milliseconds to cycles.
    pub fn ms(&self, n: u32) -> u32 {
        n * self.cycles_per_ms()
    }
}

/// Timing for a 72MHz system clock driving a 9MHz pixel SPI.
pub static TIMING_72MHZ: Timing = Timing {
    sysclk_hz: 72_000_000,
    cycles_per_h_unit: 20,
    enable_lead_cycles: 48,
    ticks_per_pixel: 8,
    box_margin_cycles: 80,
    long_pulse_us: 10,
    guard_cycles: 72,
};

/// A point in time, as a free-running cycle count. The count wraps, so only
/// differences between nearby instants (under a minute apart at 72MHz) are
/// meaningful.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Instant(pub u32);

impl Instant {
    /// Cycles elapsed from `earlier` to `self`.
    pub fn since(self, earlier: Instant) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// `self` advanced by `cycles`.
    pub fn plus(self, cycles: u32) -> Instant {
        Instant(self.0.wrapping_add(cycles))
    }
}

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_72mhz() {
        let t = &TIMING_72MHZ;
        assert_eq!(t.cycles_per_us(), 72);
        assert_eq!(t.long_pulse_cycles(), 720);
        assert_eq!(t.ms(100), 7_200_000);
        assert_eq!(t.guard_cycles, t.cycles_per_us());
    }

    #[test]
    fn instant_wraps() {
        let a = Instant(u32::max_value() - 9);
        let b = a.plus(20);
        assert_eq!(b, Instant(10));
        assert_eq!(b.since(a), 20);
    }
}
