//! On-screen display firmware.
//!
//! Brings up the overlay driver, then runs the frame orchestrator from the
//! main loop: one pass per loop iteration, logging sync changes over ITM.
//!
//! SysTick posts to the button latch every 5 ms. No physical controls are
//! read yet: a debouncer for them hooks into that tick and ORs its bits into
//! the post. Until one does, only a `KeySource` can reach the menu, and the
//! placeholder one here never presses anything.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

mod content;

use cortex_m::iprintln;
use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_rt::exception;
use stm32f4;
use stm32f4::stm32f407 as device;
use stm32f4::stm32f407::interrupt;

use ffosd::buttons::{ButtonLatch, B_PROCESSED};
use ffosd::config::OsdConfig;
use ffosd::orchestrator::{
    wait_quiescent, Content, Orchestrator, OsdControl, SyncChange,
    TextRasterizer,
};
use ffosd::timing::{Clock, TIMING_72MHZ};
use ffosd::util::canary::Canary;
use ffosd::util::measurement::Signal;
use ffosd::CycleClock;

use crate::content::{CellGlyphs, NoKeys, Status};

/// Button presses, posted from the SysTick tick.
static BUTTONS: ButtonLatch = ButtonLatch::new();

/// Button sampling period.
const BUTTON_TICK_MS: u32 = 5;

/// Writes a line to ITM stimulus port 0, if it has room. Otherwise the line is
/// dropped.
macro_rules! log {
    ($itm:expr, $($arg:tt)*) => {{
        let stim = &mut $itm.stim[0];
        if stim.is_fifo_ready() {
            iprintln!(stim, $($arg)*);
        }
    }};
}

#[cortex_m_rt::entry]
fn main() -> ! {
    let mut cp = cortex_m::peripheral::Peripherals::take().unwrap();
    let p = device::Peripherals::take().unwrap();

    // The stack grows down toward the heap start, which nothing else uses.
    let canary = {
        extern "C" {
            static mut __sheap: u32;
        }
        // Safety: only the stack can reach this word, and then only by
        // overflowing.
        unsafe { Canary::install(&mut __sheap) }
    };

    let mut content = Status::new(OsdConfig::default());

    let mut osd = ffosd::init(
        cp.NVIC,
        &mut cp.DCB,
        &mut cp.DWT,
        p.FLASH,
        &p.DBG,
        p.RCC,
        &p.SYSCFG,
        &p.GPIOB,
        ffosd::Peripherals {
            gpioa: p.GPIOA,
            exti: p.EXTI,
            spi2: p.SPI2,
            tim1: p.TIM1,
            tim2: p.TIM2,
            tim8: p.TIM8,
            dma1: p.DMA1,
            dma2: p.DMA2,
        },
        &content.config(),
    );

    // The tick must never hold up the driver's interrupts.
    // Safety: SysTick isn't running yet.
    unsafe {
        cp.SCB.set_priority(SystemHandler::SysTick, 0xFF);
    }
    cp.SYST.set_clock_source(SystClkSource::Core);
    cp.SYST.set_reload(TIMING_72MHZ.ms(BUTTON_TICK_MS) - 1);
    cp.SYST.clear_current();
    cp.SYST.enable_interrupt();
    cp.SYST.enable_counter();

    let mut itm = cp.ITM;
    log!(itm, "ffosd: waiting for sync");

    let clock = CycleClock;
    let raster = TextRasterizer(CellGlyphs);
    let mut keys = NoKeys;
    let mut orchestrator =
        Orchestrator::new(&TIMING_72MHZ, clock.now(), &keys);

    loop {
        canary.check();

        // Keep clear of the box before changing anything it shows.
        let v_offset = content.config().v_offset;
        wait_quiescent(&osd, v_offset, || {
            cortex_m::asm::delay(TIMING_72MHZ.cycles_per_ms())
        });

        let outcome = {
            ffosd::span!(Signal::Frame);
            orchestrator.poll(clock.now(), &mut osd, &content, &raster)
        };
        match outcome.sync {
            Some(SyncChange::Lost) => log!(itm, "Sync lost"),
            Some(SyncChange::Found) => {
                log!(itm, "Sync found ({} frames)", osd.frames())
            }
            None => (),
        }

        orchestrator.poll_input(
            clock.now(),
            &mut keys,
            &BUTTONS,
            &mut content,
        );
    }
}

/// Button tick. Marks the latch so that key presses get folded in.
#[exception]
fn SysTick() {
    BUTTONS.post(B_PROCESSED);
}

/// Wires up the sync edge handler expected by the driver.
#[interrupt]
fn EXTI9_5() {
    ffosd::csync_isr()
}

/// Wires up the vertical sync handler expected by the driver.
#[interrupt]
fn EXTI15_10() {
    ffosd::vsync_isr()
}

/// Wires up the pre-start guard handler expected by the driver.
#[interrupt]
fn TIM2() {
    ffosd::pre_start_isr()
}

/// Wires up the pre-end guard handler expected by the driver.
#[interrupt]
fn TIM1_CC() {
    ffosd::pre_end_isr()
}

/// Wires up the end-of-line handler expected by the driver.
#[interrupt]
fn DMA2_STREAM6() {
    ffosd::line_end_isr()
}
