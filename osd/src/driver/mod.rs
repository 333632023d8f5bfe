//! The STM32F407 driver.
//!
//! # Resources
//!
//! - PA8: composite/horizontal sync input, on EXTI8 and TIM1 channel 1.
//! - PB14: vertical sync input, on EXTI14.
//! - PB15: display output, SPI2 MOSI. The pin is switched between input
//!   (passing the host video through) and SPI output by DMA writes to the
//!   whole GPIOB MODER register, so the rest of GPIOB must be configured
//!   before `init` and left alone after.
//! - TIM1 (master), TIM8 (output-enable slave), TIM2 (data slave).
//! - DMA1 streams 1 and 4, DMA2 streams 1 and 6.
//!
//! # Interrupts
//!
//! The driver's five interrupts share one priority, the highest in the
//! system, so they run to completion without preempting each other. Where two
//! are pending at once the NVIC takes the lower exception number first, which
//! puts sync edges ahead of the end-of-line transfer.

mod hw;
mod isr;

pub use self::hw::{F407Cascade, F407Scanout};
pub use self::isr::*;

use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral as cm;
use stm32f4::stm32f407 as device;

use crate::cascade::{self, SLAVE_SMCR};
use crate::config::OsdConfig;
use crate::engine::{Engine, Signals};
use crate::orchestrator::{Busy, OsdControl};
use crate::priority;
use crate::scanout::PixelBuffer;
use crate::sync;
use crate::timing::{Clock, Instant, TIMING_72MHZ};
use crate::util::armv7m::{
    clear_pending_irq, cycle_count, disable_irq, enable_cycle_counter,
    enable_irq,
};
use crate::util::measurement;
use crate::util::spin_lock::{SpinLock, SpinLockGuard};
use crate::util::stm32::{configure_clocks, CopyHack, CLOCK_72MHZ};

use self::hw::{dma, spi, tim, DISPLAY_PIN};

type HwEngine = Engine<'static, F407Cascade, F407Scanout>;

/// Line and frame counters published by the engine.
static SIGNALS: Signals = Signals::new();

/// The engine, loaned to the driver ISRs once `init` has set up the hardware.
static ENGINE: SpinLock<Option<HwEngine>> = SpinLock::new(None);

/// The pixel buffer. The stream reads it through a raw address, so thread
/// code only writes it while no box line is being output.
static PIXELS: SpinLock<PixelBuffer> = SpinLock::new(PixelBuffer::new());

/// Words copied into registers by the cascade's DMA streams.
struct DmaWords {
    /// GPIOB MODER with the display pin on SPI output.
    moder_on: u32,
    /// GPIOB MODER with the display pin as input.
    moder_off: u32,
    /// SPI2 CR2 value releasing the pixel stream.
    txdmaen: u32,
}

static DMA_WORDS: SpinLock<DmaWords> = SpinLock::new(DmaWords {
    moder_on: 0,
    moder_off: 0,
    txdmaen: spi::CR2_TXDMAEN,
});

/// Records when a driver instance has been initialized. This is only allowed to
/// happen once because there's no teardown.
static DRIVER_INIT_FLAG: AtomicBool = AtomicBool::new(false);

/// Priority of the driver interrupts. Everything else must be numerically
/// higher.
const DRIVER_IRQ_PRI: u8 = 0x00;

static DRIVER_IRQS: [device::Interrupt; 5] = [
    device::Interrupt::EXTI9_5,
    device::Interrupt::EXTI15_10,
    device::Interrupt::TIM1_CC,
    device::Interrupt::TIM2,
    device::Interrupt::DMA2_STREAM6,
];

/// Driver handle, for thread code.
///
/// Obtained from [`init`]. Only one handle exists; a second call to `init`
/// panics.
///
/// [`init`]: fn.init.html
pub struct Osd {
    /// Configuration most recently handed to the engine. Its vertical offset
    /// decides when the box is safe to touch.
    config: OsdConfig,
    _thread: priority::Thread,
}

impl Osd {
    fn is_quiescent(&self) -> bool {
        sync::is_quiescent(SIGNALS.line(), self.config.v_offset)
    }

    /// Runs `body` on the engine with interrupts masked.
    fn with_engine<R>(
        &mut self,
        body: impl FnOnce(&mut HwEngine) -> R,
    ) -> Result<R, Busy> {
        cortex_m::interrupt::free(|_| {
            let mut engine = ENGINE.try_lock().map_err(|_| Busy)?;
            engine.as_mut().map(body).ok_or(Busy)
        })
    }
}

impl OsdControl for Osd {
    fn frames(&self) -> usize {
        SIGNALS.frames()
    }

    fn line(&self) -> i32 {
        SIGNALS.line()
    }

    fn force_end_of_frame(&mut self) {
        // Can only fail before init completes, when there's nothing to reset.
        let _ = self.with_engine(|e| e.force_end_of_frame());
    }

    fn configure(&mut self, config: &OsdConfig) {
        if self.with_engine(|e| e.configure(config)).is_ok() {
            self.config = *config;
        }
    }

    fn commit(&mut self, height: u16, width: u16) -> Result<(), Busy> {
        if !self.is_quiescent() {
            return Err(Busy);
        }
        self.with_engine(|e| e.commit(height, width))
    }

    fn with_pixels<R>(
        &mut self,
        body: impl FnOnce(&mut PixelBuffer) -> R,
    ) -> Result<R, Busy> {
        if !self.is_quiescent() {
            return Err(Busy);
        }
        PIXELS.try_with(body).map_err(|_| Busy)
    }
}

/// Time source for thread code: the cycle counter started by `init`.
#[derive(Copy, Clone, Debug, Default)]
pub struct CycleClock;

impl Clock for CycleClock {
    fn now(&self) -> Instant {
        Instant(cycle_count())
    }
}

/// Initializes the driver using the given hardware capabilities, and starts
/// watching for sync.
///
/// You can get the capabilities from the `cortex_m` and `stm32f4` crates like
/// so:
///
/// ```ignore
/// let mut cp = cortex_m::peripheral::Peripherals::take().unwrap();
/// let p = stm32f4::stm32f407::Peripherals::take().unwrap();
///
/// let osd = ffosd::init(
///     cp.NVIC,
///     &mut cp.DCB,
///     &mut cp.DWT,
///     p.FLASH,
///     &p.DBG,
///     p.RCC,
///     &p.SYSCFG,
///     &p.GPIOB,
///     ffosd::Peripherals { ... },
///     &config,
/// );
/// ```
///
/// The overlay starts disabled (zero height); commit a size once the pixel
/// buffer has something in it.
///
/// # Panics
///
/// If called twice, or from an interrupt handler.
pub fn init(
    mut nvic: cm::NVIC,
    dcb: &mut cm::DCB,
    dwt: &mut cm::DWT,
    flash: device::FLASH,
    dbg: &device::DBG,
    rcc: device::RCC,
    syscfg: &device::SYSCFG,
    gpiob: &device::GPIOB,
    p: Peripherals,
    config: &OsdConfig,
) -> Osd {
    let thread = priority::Thread::new_checked()
        .expect("ffosd::init called from interrupt");

    unsafe { measurement::init() }

    let previous_instance = DRIVER_INIT_FLAG.swap(true, Ordering::SeqCst);
    assert_eq!(previous_instance, false);

    // Ensure that our interrupts are disabled.
    for i in &DRIVER_IRQS {
        disable_irq(&mut nvic, i.copy_hack());
    }

    configure_clocks(&rcc, &flash, &CLOCK_72MHZ);
    debug_assert_eq!(CLOCK_72MHZ.sysclk_hz(), TIMING_72MHZ.sysclk_hz);
    // The data slave is on APB1. It has to count at the same rate as the
    // others for the cascade arithmetic to hold.
    debug_assert_eq!(CLOCK_72MHZ.apb1_timer_hz(), TIMING_72MHZ.sysclk_hz);

    // Enable Flash cache and prefetching to reduce jitter.
    flash.acr.modify(|_, w| {
        w.dcen().enabled().icen().enabled().prften().enabled()
    });

    // Turn a bunch of stuff on.
    rcc.ahb1enr.modify(|_, w| {
        w.gpioaen()
            .enabled()
            .gpioben()
            .enabled()
            .dma1en()
            .enabled()
            .dma2en()
            .enabled()
    });
    rcc.apb1enr
        .modify(|_, w| w.tim2en().enabled().spi2en().enabled());
    rcc.apb2enr.modify(|_, w| {
        w.tim1en()
            .enabled()
            .tim8en()
            .enabled()
            .syscfgen()
            .enabled()
    });
    cortex_m::asm::dsb(); // ensure peripherals are powered before we write them

    enable_cycle_counter(dcb, dwt);

    configure_pins(&p.gpioa, gpiob);
    configure_dma_words(gpiob);
    configure_spi(&p.spi2);
    configure_streams(&p.dma1, &p.dma2, &p.spi2, gpiob);
    configure_timers(&p.tim1, &p.tim2, &p.tim8);
    configure_exti(&p.exti, syscfg);

    // Stop the cascade on debug halt, so that breakpoints don't leave the
    // display pin switched on.
    dbg.dbgmcu_apb1_fz.modify(|_, w| w.dbg_tim2_stop().set_bit());
    dbg.dbgmcu_apb2_fz
        .modify(|_, w| w.dbg_tim1_stop().set_bit().dbg_tim8_stop().set_bit());

    // Donate the hardware to the ISRs.
    let mut engine = Engine::new(
        F407Cascade {
            tim1: p.tim1,
            tim2: p.tim2,
            tim8: p.tim8,
            dma2: p.dma2,
            exti: p.exti,
            gpioa: p.gpioa,
        },
        F407Scanout {
            spi2: p.spi2,
            dma1: p.dma1,
            pixels: PIXELS.as_ptr() as usize,
        },
        &TIMING_72MHZ,
        &SIGNALS,
        config,
    );
    engine.start();
    *ENGINE.try_lock().expect("engine lock held at init") = Some(engine);

    // Safety: messing with interrupt priorities is inherently unsafe, but our
    // device interrupts are disabled.
    for i in &DRIVER_IRQS {
        unsafe { nvic.set_priority(i.copy_hack(), DRIVER_IRQ_PRI) };
        // Edges seen while we were setting up are stale.
        clear_pending_irq(i.copy_hack());
    }
    for i in &DRIVER_IRQS {
        enable_irq(&mut nvic, i.copy_hack());
    }

    Osd {
        config: *config,
        _thread: thread,
    }
}

/// Peripherals taken over by the driver.
pub struct Peripherals {
    pub gpioa: device::GPIOA,
    pub exti: device::EXTI,
    pub spi2: device::SPI2,
    pub tim1: device::TIM1,
    pub tim2: device::TIM2,
    pub tim8: device::TIM8,
    pub dma1: device::DMA1,
    pub dma2: device::DMA2,
}

fn configure_pins(gpioa: &device::GPIOA, gpiob: &device::GPIOB) {
    // PA8: AF1 (TIM1_CH1). EXTI watches the pin regardless of mode.
    gpioa.afrh.modify(|r, w| unsafe { w.bits((r.bits() & !0xF) | 1) });
    gpioa.pupdr.modify(|r, w| unsafe { w.bits(r.bits() & !(0b11 << 16)) });
    gpioa.moder.modify(|r, w| unsafe {
        w.bits((r.bits() & !(0b11 << 16)) | (0b10 << 16))
    });

    // PB14: plain input.
    gpiob.pupdr.modify(|r, w| unsafe { w.bits(r.bits() & !(0b11 << 28)) });
    gpiob.moder.modify(|r, w| unsafe { w.bits(r.bits() & !(0b11 << 28)) });

    // PB15: AF5 (SPI2_MOSI), very sharp edges, but left as an input until
    // the cascade switches it.
    let field = 0b11 << (2 * DISPLAY_PIN);
    gpiob.afrh.modify(|r, w| unsafe {
        w.bits((r.bits() & !(0xF << 28)) | (5 << 28))
    });
    gpiob.ospeedr.modify(|r, w| unsafe { w.bits(r.bits() | field) });
    gpiob.pupdr.modify(|r, w| unsafe { w.bits(r.bits() & !field) });
    gpiob.moder.modify(|r, w| unsafe { w.bits(r.bits() & !field) });
}

/// Precomputes the MODER words written by the output-enable and end-of-box
/// transfers.
fn configure_dma_words(gpiob: &device::GPIOB) {
    let field = 0b11 << (2 * DISPLAY_PIN);
    let off = gpiob.moder.read().bits() & !field;
    let mut words = DMA_WORDS.try_lock().expect("DMA words lock held at init");
    words.moder_off = off;
    words.moder_on = off | (0b10 << (2 * DISPLAY_PIN));
}

fn configure_spi(spi2: &device::SPI2) {
    spi2.cr2.write(|w| unsafe { w.bits(0) });
    spi2.cr1.write(|w| unsafe {
        w.bits(
            spi::CR1_MSTR
                | spi::CR1_BR_DIV4
                | spi::CR1_SSI
                | spi::CR1_SSM
                | spi::CR1_DFF_16
                | spi::CR1_SPE,
        )
    });
}

/// Sets up the four DMA streams. The three single-word streams are circular
/// and run forever; the pixel stream is re-armed after every line.
fn configure_streams(
    dma1: &device::DMA1,
    dma2: &device::DMA2,
    spi2: &device::SPI2,
    gpiob: &device::GPIOB,
) {
    let words = DMA_WORDS.as_ptr();
    // Safety: only used to take field addresses; nothing reads through the
    // pointer here.
    let (moder_on, moder_off, txdmaen) = unsafe {
        (
            &(*words).moder_on as *const u32 as u32,
            &(*words).moder_off as *const u32 as u32,
            &(*words).txdmaen as *const u32 as u32,
        )
    };
    let moder = &gpiob.moder as *const _ as u32;
    let single_word = dma::CR_DIR_M2P
        | dma::CR_CIRC
        | dma::CR_PSIZE_32
        | dma::CR_MSIZE_32
        | dma::CR_PL_VERY_HIGH;

    // Pixel stream: memory -> SPI2 DR, 16 bits at a time.
    dma1.s4par
        .write(|w| unsafe { w.bits(&spi2.dr as *const _ as u32) });
    dma1.s4cr.write(|w| unsafe {
        w.bits(
            dma::chsel(0)
                | dma::CR_DIR_M2P
                | dma::CR_MINC
                | dma::CR_PSIZE_16
                | dma::CR_MSIZE_16
                | dma::CR_PL_HIGH,
        )
    });

    // TIM2_UP: release the pixel stream.
    dma1.lifcr.write(|w| unsafe { w.bits(dma::LIFCR_S1) });
    dma1.s1par
        .write(|w| unsafe { w.bits(&spi2.cr2 as *const _ as u32) });
    dma1.s1m0ar.write(|w| unsafe { w.bits(txdmaen) });
    dma1.s1ndtr.write(|w| unsafe { w.bits(1) });
    dma1.s1cr.write(|w| unsafe {
        w.bits(dma::chsel(3) | single_word | dma::CR_EN)
    });

    // TIM8_UP: switch the display pin on.
    dma2.lifcr.write(|w| unsafe { w.bits(dma::LIFCR_S1) });
    dma2.s1par.write(|w| unsafe { w.bits(moder) });
    dma2.s1m0ar.write(|w| unsafe { w.bits(moder_on) });
    dma2.s1ndtr.write(|w| unsafe { w.bits(1) });
    dma2.s1cr.write(|w| unsafe {
        w.bits(dma::chsel(7) | single_word | dma::CR_EN)
    });

    // TIM1_CH3: switch it off again, and interrupt to end the line.
    dma2.hifcr.write(|w| unsafe { w.bits(dma::HIFCR_S6) });
    dma2.s6par.write(|w| unsafe { w.bits(moder) });
    dma2.s6m0ar.write(|w| unsafe { w.bits(moder_off) });
    dma2.s6ndtr.write(|w| unsafe { w.bits(1) });
    dma2.s6cr.write(|w| unsafe {
        w.bits(dma::chsel(6) | single_word | dma::CR_TCIE | dma::CR_EN)
    });
}

fn configure_timers(
    tim1: &device::TIM1,
    tim2: &device::TIM2,
    tim8: &device::TIM8,
) {
    let reloads = cascade::slave_reloads(&TIMING_72MHZ, 0);
    let one_shot = tim::CR1_OPM | tim::CR1_URS;

    // Master. Triggers come from the sync pin (channel 1) or the data slave;
    // the engine picks which.
    tim1.psc.write(|w| unsafe { w.bits(0) });
    tim1.arr.write(|w| unsafe { w.bits(0xFFFF) });
    tim1.cr1.write(|w| unsafe { w.bits(one_shot) });
    tim1.cr2.write(|w| unsafe { w.bits(tim::CR2_MMS_UPDATE) });
    tim1.ccmr1_input
        .write(|w| unsafe { w.bits(tim::CCMR1_CC1S_TI1) });
    tim1.ccer.write(|w| unsafe { w.bits(tim::CCER_CC1E) });
    tim1.smcr.write(|w| unsafe { w.bits(0) });
    tim1.dier
        .write(|w| unsafe { w.bits(tim::DIER_CC3DE | tim::DIER_CC4IE) });

    // Output-enable slave.
    tim8.psc.write(|w| unsafe { w.bits(0) });
    tim8.arr.write(|w| unsafe { w.bits(reloads.enable) });
    tim8.cr1.write(|w| unsafe { w.bits(one_shot) });
    tim8.smcr.write(|w| unsafe { w.bits(SLAVE_SMCR) });
    tim8.dier.write(|w| unsafe { w.bits(tim::DIER_UDE) });

    // Data slave. Its update is also the master's trigger in CountFromData.
    tim2.psc.write(|w| unsafe { w.bits(0) });
    tim2.arr.write(|w| unsafe { w.bits(reloads.data) });
    tim2.ccr1.write(|w| unsafe { w.bits(reloads.pre_start) });
    tim2.cr1.write(|w| unsafe { w.bits(one_shot) });
    tim2.cr2.write(|w| unsafe { w.bits(tim::CR2_MMS_UPDATE) });
    tim2.smcr.write(|w| unsafe { w.bits(SLAVE_SMCR) });
    tim2.dier
        .write(|w| unsafe { w.bits(tim::DIER_UDE | tim::DIER_CC1IE) });
}

fn configure_exti(exti: &device::EXTI, syscfg: &device::SYSCFG) {
    // EXTI8 from port A, EXTI14 from port B.
    syscfg.exticr3.modify(|r, w| unsafe { w.bits(r.bits() & !0xF) });
    syscfg.exticr4.modify(|r, w| unsafe {
        w.bits((r.bits() & !(0xF << 8)) | (0b0001 << 8))
    });
    // Edge selection is the engine's business.
    exti.imr.modify(|r, w| unsafe {
        w.bits(r.bits() | hw::CSYNC_LINE | hw::VSYNC_LINE)
    });
    exti.pr
        .write(|w| unsafe { w.bits(hw::CSYNC_LINE | hw::VSYNC_LINE) });
}

/// Pattern for acquiring hardware resources loaned to an ISR in a static.
///
/// # Panics
///
/// If the `SpinLock` is locked when this is called. This would imply:
///
/// 1. that the IRQ got enabled too early, while the hardware is being
///    provisioned;
/// 2. That two ISRs are attempting to use the hardware without coordination.
/// 3. That a previous invocation of an ISR leaked the lock guard.
///
/// Also: if this is called before hardware is provisioned, implying that the
/// IRQ was enabled too early.
fn acquire_hw<T: Send>(
    lock: &SpinLock<Option<T>>,
    _: priority::Driver,
) -> SpinLockGuard<T> {
    SpinLockGuard::map(
        lock.try_lock().expect("HW lock held at ISR"),
        |o| o.as_mut().expect("ISR fired without HW available"),
    )
}
