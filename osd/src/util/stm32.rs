//! Augmented STM32 operations.
//!
//! Clock setup, and a few workarounds for the `stm32f4` crate.

use stm32f4::stm32f407 as device;

use device::flash::acr::LATENCYW;
use device::rcc::cfgr::{HPREW, PPRE2W};
use device::rcc::pllcfgr::PLLPW;

/// Clock configuration for the STM32F4 RCC, running from the High Speed
/// External oscillator through the main PLL.
pub struct ClockConfig {
    pub crystal_hz: u32,
    pub crystal_divisor: u8,
    pub vco_multiplier: u16,
    pub general_divisor: PLLPW,
    pub pll48_divisor: u8,

    pub ahb_divisor: HPREW,
    pub apb1_divisor: PPRE2W,
    pub apb2_divisor: PPRE2W,

    pub flash_latency: LATENCYW,
}

impl ClockConfig {
    /// System clock frequency produced by this configuration.
    pub fn sysclk_hz(&self) -> u32 {
        self.crystal_hz / u32::from(self.crystal_divisor)
            * u32::from(self.vco_multiplier)
            / self.general_divisor.divisor() as u32
    }

    /// Clock frequency seen by timers on APB1. The RCC doubles the APB clock
    /// for timers whenever the APB is divided down.
    pub fn apb1_timer_hz(&self) -> u32 {
        let ahb = self.sysclk_hz() / self.ahb_divisor.divisor() as u32;
        match self.apb1_divisor.divisor() {
            1 => ahb,
            d => ahb * 2 / d as u32,
        }
    }
}

/// 72MHz from an 8MHz crystal: 8 / 4 * 144 / 4. APB1 runs at 36MHz, so its
/// timers see 72MHz like everything else. The PLL48 output is 48MHz.
pub static CLOCK_72MHZ: ClockConfig = ClockConfig {
    crystal_hz: 8_000_000,
    crystal_divisor: 4,
    vco_multiplier: 144,
    general_divisor: PLLPW::DIV4,
    pll48_divisor: 6,

    ahb_divisor: HPREW::DIV1,
    apb1_divisor: PPRE2W::DIV2,
    apb2_divisor: PPRE2W::DIV1,

    flash_latency: LATENCYW::WS2,
};

macro_rules! block_while {
    ($condition:expr) => {
        while $condition {}
    };
}

macro_rules! block_until {
    ($condition:expr) => {
        block_while!(!$condition)
    };
}

/// Applies `cfg` to the `rcc` and `flash`. (The flash controller gets involved
/// because wait states depend on frequency.)
///
/// Runs from the internal oscillator while the PLL is reprogrammed, so this can
/// move between any two valid configurations.
pub fn configure_clocks(
    rcc: &device::RCC,
    flash: &device::FLASH,
    cfg: &ClockConfig,
) {
    rcc.cr.modify(|_, w| w.hsion().set_bit());
    block_until! { rcc.cr.read().hsirdy().bit() }
    rcc.cfgr
        .modify(|_, w| w.sw().variant(device::rcc::cfgr::SWW::HSI));
    block_until! { rcc.cfgr.read().sws() == device::rcc::cfgr::SWSR::HSI }

    rcc.cr.modify(|_, w| w.pllon().clear_bit());
    block_while! { rcc.cr.read().pllrdy().bit() }

    // Divisors and wait states go in before the frequency goes up.
    rcc.cfgr.modify(|_, w| {
        w.hpre()
            .variant(cfg.ahb_divisor.copy_hack())
            .ppre1()
            .variant(cfg.apb1_divisor.copy_hack())
            .ppre2()
            .variant(cfg.apb2_divisor.copy_hack())
    });
    flash
        .acr
        .modify(|_, w| w.latency().variant(cfg.flash_latency.copy_hack()));

    rcc.cr.modify(|_, w| w.hseon().set_bit());
    block_until! { rcc.cr.read().hserdy().bit() }

    rcc.pllcfgr.modify(|_, w| {
        // Safety: only unsafe due to upstream bug. These fields accept any
        // value in range.
        unsafe {
            w.pllm()
                .bits(cfg.crystal_divisor)
                .plln()
                .bits(cfg.vco_multiplier)
                .pllq()
                .bits(cfg.pll48_divisor)
        }
        .pllp()
        .variant(cfg.general_divisor.copy_hack())
        .pllsrc()
        .variant(device::rcc::pllcfgr::PLLSRCW::HSE)
    });

    rcc.cr.modify(|_, w| w.pllon().set_bit());
    block_until! { rcc.cr.read().pllrdy().bit() }

    rcc.cfgr
        .modify(|_, w| w.sw().variant(device::rcc::cfgr::SWW::PLL));
    block_until! { rcc.cfgr.read().sws() == device::rcc::cfgr::SWSR::PLL }
}

/// Divisor values for svd2rust divisor enums.
pub trait UsefulDivisor {
    fn divisor(&self) -> usize;
}

/// Slap a copy operation onto types that aren't Copy for some reason.
///
/// This trait is `unsafe` because you had better know what you're doing if you
/// implement it for a foreign type.
pub unsafe trait CopyHack: Sized {
    fn copy_hack(&self) -> Self {
        unsafe { core::ptr::read(self) }
    }
}

impl UsefulDivisor for HPREW {
    fn divisor(&self) -> usize {
        match self {
            HPREW::DIV1 => 1,
            HPREW::DIV2 => 2,
            HPREW::DIV4 => 4,
            HPREW::DIV8 => 8,
            HPREW::DIV16 => 16,
            HPREW::DIV64 => 64,
            HPREW::DIV128 => 128,
            HPREW::DIV256 => 256,
            HPREW::DIV512 => 512,
        }
    }
}

impl UsefulDivisor for PPRE2W {
    fn divisor(&self) -> usize {
        match self {
            PPRE2W::DIV1 => 1,
            PPRE2W::DIV2 => 2,
            PPRE2W::DIV4 => 4,
            PPRE2W::DIV8 => 8,
            PPRE2W::DIV16 => 16,
        }
    }
}

impl UsefulDivisor for PLLPW {
    fn divisor(&self) -> usize {
        match self {
            PLLPW::DIV2 => 2,
            PLLPW::DIV4 => 4,
            PLLPW::DIV6 => 6,
            PLLPW::DIV8 => 8,
        }
    }
}

unsafe impl CopyHack for HPREW {}
unsafe impl CopyHack for PPRE2W {}
unsafe impl CopyHack for LATENCYW {}
unsafe impl CopyHack for PLLPW {}
unsafe impl CopyHack for device::Interrupt {}
