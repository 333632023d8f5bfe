//! Type-level representation of execution priorities.
//!
//! All the priority types are zero-sized tokens. Code that may only run in a
//! particular context takes the matching token as a parameter, and the token
//! can only be produced in that context.

use core::marker::PhantomData;

// Marker type used to cause things to stop being Sync/Send.
type NotSyncOrSend = PhantomData<*mut ()>;

/// Driver interrupt priority, shared by all the line engine's handlers so that
/// they never preempt one another.
#[derive(Copy, Clone)]
pub struct Driver(NotSyncOrSend);

/// Thread mode execution occurs outside any interrupt handler.
#[derive(Copy, Clone)]
pub struct Thread(NotSyncOrSend);

impl Driver {
    #[allow(dead_code)]
    pub(crate) unsafe fn new() -> Self {
        Driver(PhantomData)
    }
}

impl Thread {
    #[allow(dead_code)]
    pub(crate) unsafe fn new() -> Self {
        Thread(PhantomData)
    }
}

#[cfg(target_os = "none")]
impl Thread {
    /// Returns a `Thread` token only if called from thread priority.
    pub fn new_checked() -> Option<Self> {
        // Safety: reads of the ICSR are safe.
        let icsr = unsafe { &(*cortex_m::peripheral::SCB::ptr()).icsr }.read();
        if icsr & 0xFF == 0 {
            Some(unsafe { Self::new() })
        } else {
            None
        }
    }
}
