//! The timer cascade and pixel stream on the STM32F407.
//!
//! Register layouts are mostly written as raw bit patterns; the names below
//! follow the reference manual (RM0090).

use stm32f4::stm32f407 as device;

use crate::cascade::{BoxCompare, Cascade, MasterMode, SlaveReloads};
use crate::config::Polarity;
use crate::scanout::Scanout;
use textrows::PixelRow;

/// EXTI line of the composite/horizontal sync input (PA8).
pub const CSYNC_LINE: u32 = 1 << 8;
/// EXTI line of the vertical sync input (PB14).
pub const VSYNC_LINE: u32 = 1 << 14;

/// Pin of the display output on GPIOB.
pub const DISPLAY_PIN: u32 = 15;

pub mod tim {
    pub const CR1_CEN: u32 = 1 << 0;
    pub const CR1_URS: u32 = 1 << 2;
    pub const CR1_OPM: u32 = 1 << 3;
    /// Master mode: update event as trigger output.
    pub const CR2_MMS_UPDATE: u32 = 0b010 << 4;
    pub const DIER_CC1IE: u32 = 1 << 1;
    pub const DIER_CC4IE: u32 = 1 << 4;
    pub const DIER_UDE: u32 = 1 << 8;
    pub const DIER_CC3DE: u32 = 1 << 11;
    pub const SR_CC1IF: u32 = 1 << 1;
    pub const SR_CC4IF: u32 = 1 << 4;
    pub const CCER_CC1E: u32 = 1 << 0;
    pub const CCER_CC1P: u32 = 1 << 1;
    /// Channel 1 as input, mapped on TI1.
    pub const CCMR1_CC1S_TI1: u32 = 0b01;
}

pub mod dma {
    pub const CR_EN: u32 = 1 << 0;
    pub const CR_TCIE: u32 = 1 << 4;
    pub const CR_DIR_M2P: u32 = 0b01 << 6;
    pub const CR_CIRC: u32 = 1 << 8;
    pub const CR_MINC: u32 = 1 << 10;
    pub const CR_PSIZE_16: u32 = 0b01 << 11;
    pub const CR_PSIZE_32: u32 = 0b10 << 11;
    pub const CR_MSIZE_16: u32 = 0b01 << 13;
    pub const CR_MSIZE_32: u32 = 0b10 << 13;
    pub const CR_PL_HIGH: u32 = 0b10 << 16;
    pub const CR_PL_VERY_HIGH: u32 = 0b11 << 16;

    pub const fn chsel(n: u32) -> u32 {
        n << 25
    }

    /// All flags of stream 1 in LIFCR.
    pub const LIFCR_S1: u32 = 0x3D << 6;
    /// All flags of stream 4 in HIFCR.
    pub const HIFCR_S4: u32 = 0x3D;
    /// All flags of stream 6 in HIFCR.
    pub const HIFCR_S6: u32 = 0x3D << 16;
}

pub mod spi {
    pub const CR1_MSTR: u32 = 1 << 2;
    /// Baud rate: PCLK / 4.
    pub const CR1_BR_DIV4: u32 = 0b001 << 3;
    pub const CR1_SPE: u32 = 1 << 6;
    pub const CR1_SSI: u32 = 1 << 8;
    pub const CR1_SSM: u32 = 1 << 9;
    pub const CR1_DFF_16: u32 = 1 << 11;
    pub const CR2_TXDMAEN: u32 = 1 << 1;
}

/// The three-timer cascade, plus the EXTI lines watching the sync inputs.
pub struct F407Cascade {
    pub(super) tim1: device::TIM1,
    pub(super) tim2: device::TIM2,
    pub(super) tim8: device::TIM8,
    pub(super) dma2: device::DMA2,
    pub(super) exti: device::EXTI,
    pub(super) gpioa: device::GPIOA,
}

impl F407Cascade {
    /// Acknowledges an edge on the sync input and returns the pin's level.
    pub fn ack_csync(&self) -> bool {
        // PR is write-one-to-clear.
        self.exti.pr.write(|w| unsafe { w.bits(CSYNC_LINE) });
        self.gpioa.idr.read().bits() & CSYNC_LINE != 0
    }

    /// Acknowledges a pulse on the vertical sync input.
    pub fn ack_vsync(&self) {
        self.exti.pr.write(|w| unsafe { w.bits(VSYNC_LINE) });
    }

    /// Stops the master and clears its counter, so that its next trigger
    /// starts from zero.
    fn stop_master(&self) {
        self.tim1
            .cr1
            .write(|w| unsafe { w.bits(tim::CR1_OPM | tim::CR1_URS) });
        self.tim1.cnt.write(|w| unsafe { w.bits(0) });
    }
}

impl Cascade for F407Cascade {
    fn load_slaves(&mut self, reloads: &SlaveReloads) {
        self.tim2.arr.write(|w| unsafe { w.bits(reloads.data) });
        self.tim2.ccr1.write(|w| unsafe { w.bits(reloads.pre_start) });
        self.tim8.arr.write(|w| unsafe { w.bits(reloads.enable) });
    }

    fn load_box(&mut self, compare: &BoxCompare) {
        self.tim1.ccr3.write(|w| unsafe { w.bits(compare.end) });
        self.tim1.ccr4.write(|w| unsafe { w.bits(compare.pre_end) });
    }

    fn set_polarity(&mut self, polarity: Polarity) {
        let lines = CSYNC_LINE | VSYNC_LINE;
        let (rising, falling) = match polarity {
            Polarity::ActiveHigh => (lines, 0),
            Polarity::ActiveLow => (0, lines),
        };
        self.exti.rtsr.modify(|r, w| unsafe {
            w.bits((r.bits() & !lines) | rising)
        });
        self.exti.ftsr.modify(|r, w| unsafe {
            w.bits((r.bits() & !lines) | falling)
        });

        // The master restarts at the *end* of the pulse: the falling edge of
        // an active-high pulse.
        let cc1p = if polarity == Polarity::ActiveHigh {
            tim::CCER_CC1P
        } else {
            0
        };
        self.tim1
            .ccer
            .modify(|r, w| unsafe {
                w.bits((r.bits() & !tim::CCER_CC1P) | cc1p)
            });
    }

    fn sense_both_edges(&mut self) {
        // Vertical sync stays on its leading edge.
        self.exti
            .rtsr
            .modify(|r, w| unsafe { w.bits(r.bits() | CSYNC_LINE) });
        self.exti
            .ftsr
            .modify(|r, w| unsafe { w.bits(r.bits() | CSYNC_LINE) });
    }

    fn set_master_mode(&mut self, mode: MasterMode) {
        // SMCR only. A line already counting must still reach CC3, or the
        // display pin is never switched back off.
        self.tim1.smcr.write(|w| unsafe { w.bits(mode.smcr_bits()) });
    }

    fn end_line(&mut self) {
        self.dma2.hifcr.write(|w| unsafe { w.bits(dma::HIFCR_S6) });
        self.tim1.smcr.write(|w| unsafe {
            w.bits(MasterMode::Off.smcr_bits())
        });
        self.stop_master();
    }

    fn ack_pre_start(&mut self) {
        // SR is write-zero-to-clear.
        self.tim2.sr.write(|w| unsafe { w.bits(!tim::SR_CC1IF) });
    }

    fn ack_pre_end(&mut self) {
        self.tim1.sr.write(|w| unsafe { w.bits(!tim::SR_CC4IF) });
    }

    fn quiesce(&mut self, cycles: u32) {
        cortex_m::asm::delay(cycles)
    }
}

/// The pixel stream: DMA1 stream 4 feeding SPI2.
///
/// The stream is left enabled with SPI2's DMA request masked. The data slave
/// releases it by having DMA1 stream 1 set `TXDMAEN`.
pub struct F407Scanout {
    pub(super) spi2: device::SPI2,
    pub(super) dma1: device::DMA1,
    /// Address of row 0 of the pixel buffer.
    pub(super) pixels: usize,
}

impl Scanout for F407Scanout {
    fn point_at(&mut self, row: usize, words: usize) {
        // Mask the request first, or re-enabling the stream starts it.
        self.spi2.cr2.write(|w| unsafe { w.bits(0) });

        self.dma1
            .s4cr
            .modify(|r, w| unsafe { w.bits(r.bits() & !dma::CR_EN) });
        while self.dma1.s4cr.read().bits() & dma::CR_EN != 0 {
            // busy wait
        }

        let addr = self.pixels + row * core::mem::size_of::<PixelRow>();
        self.dma1.s4ndtr.write(|w| unsafe { w.bits(words as u32) });
        self.dma1.s4m0ar.write(|w| unsafe { w.bits(addr as u32) });
        self.dma1.hifcr.write(|w| unsafe { w.bits(dma::HIFCR_S4) });
        self.dma1
            .s4cr
            .modify(|r, w| unsafe { w.bits(r.bits() | dma::CR_EN) });
    }
}
