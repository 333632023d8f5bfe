//! Utility code; candidates for factoring out.

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        pub mod armv7m;
        pub mod stm32;
    }
}

pub mod canary;
pub mod measurement;
pub mod spin_lock;
