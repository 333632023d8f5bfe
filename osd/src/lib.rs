//! Overlay driver for a character on-screen display keyed into a host video
//! signal.
//!
//! The host's composite (or separate horizontal) sync is watched by an edge
//! interrupt. A small state machine counts lines from the vertical blanking
//! interval, and on each line of the overlay box a cascade of timers releases
//! one row of pixels to the SPI data pin at a configured horizontal offset.
//!
//! The architecture-independent parts (pulse classification, the line
//! machine, timer arithmetic and frame orchestration) build and test on the
//! host. The STM32F407 driver is only built for the microcontroller.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod buttons;
pub mod cascade;
pub mod config;
pub mod engine;
pub mod orchestrator;
pub mod priority;
pub mod scanout;
pub mod sync;
pub mod timing;
pub mod util;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Used by the `span!` macro.
#[doc(hidden)]
pub use scopeguard;

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        // re-export driver bits
        mod driver;
        pub use driver::*;
    }
}
