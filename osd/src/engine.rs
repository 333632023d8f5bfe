//! The line engine: the state machine wired to the cascade and pixel stream.
//!
//! An `Engine` owns everything the driver's interrupt handlers touch. Each
//! handler maps onto one method here. The engine publishes the line counter and
//! frame count through a shared [`Signals`] block that thread code can read
//! without taking the engine.
//!
//! [`Signals`]: struct.Signals.html

use core::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use crate::cascade::{self, Cascade, MasterMode};
use crate::config::{OsdConfig, OverlayGeometry};
use crate::scanout::{self, Scanout};
use crate::sync::{self, Action, FrameParams, LineMachine, Step, SyncPhase};
use crate::timing::{Instant, Timing};

/// Values published by the engine for thread code.
#[derive(Debug)]
pub struct Signals {
    /// Mirror of the line counter, updated after every transition.
    line: AtomicIsize,
    /// Count of completed frames. Wraps.
    frames: AtomicUsize,
}

impl Signals {
    pub const fn new() -> Self {
        Signals {
            line: AtomicIsize::new(sync::HLINE_EOF as isize),
            frames: AtomicUsize::new(0),
        }
    }

    pub fn line(&self) -> i32 {
        self.line.load(Ordering::Relaxed) as i32
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_line(self.line())
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::Relaxed)
    }

    fn set_line(&self, line: i32) {
        self.line.store(line as isize, Ordering::Relaxed)
    }

    fn frame_done(&self) {
        self.frames.fetch_add(1, Ordering::Release);
    }
}

/// The line engine.
pub struct Engine<'a, C, S> {
    machine: LineMachine,
    cascade: C,
    scanout: S,
    timing: &'a Timing,
    signals: &'a Signals,
    /// Pixel buffer row the stream is positioned at.
    row: usize,
    /// Words streamed per row in the current frame.
    row_words: usize,
}

impl<'a, C: Cascade, S: Scanout> Engine<'a, C, S> {
    pub fn new(
        cascade: C,
        scanout: S,
        timing: &'a Timing,
        signals: &'a Signals,
        config: &OsdConfig,
    ) -> Self {
        let mut params = FrameParams::new(config.polarity);
        params.h_offset = config.h_offset;
        params.v_offset = config.v_offset;
        Engine {
            machine: LineMachine::new(timing.long_pulse_cycles(), params),
            cascade,
            scanout,
            timing,
            signals,
            row: 0,
            row_words: crate::scanout::row_words(0),
        }
    }

    /// Loads the initial configuration into the hardware. Sync edges may be
    /// delivered once this returns.
    pub fn start(&mut self) {
        let next = *self.machine.next_params();
        self.cascade.set_master_mode(MasterMode::Off);
        self.load_frame(&next);
        self.cascade
            .load_box(&cascade::box_compare(self.timing, next.width));
        self.signals.set_line(self.machine.line());
    }

    pub fn cascade(&mut self) -> &mut C {
        &mut self.cascade
    }

    pub fn scanout(&mut self) -> &mut S {
        &mut self.scanout
    }

    /// Parameters of the frame in progress.
    pub fn current(&self) -> &FrameParams {
        self.machine.current()
    }

    /// Handles a transition of the sync pin to `level` at `at`.
    pub fn sync_edge(&mut self, level: bool, at: Instant) {
        let step = self.machine.sync_edge(level, at.0);
        self.apply(&step);
    }

    /// Handles a pulse on the vertical sync input.
    pub fn vsync(&mut self) {
        let step = self.machine.vsync();
        self.apply(&step);
    }

    /// Handles the interrupt raised shortly before the pixel stream is
    /// released: retasks the master to time the box from the first pixel,
    /// then holds the processor for the guard window.
    pub fn pre_start(&mut self) {
        self.cascade.set_master_mode(MasterMode::CountFromData);
        self.cascade.ack_pre_start();
        self.cascade.quiesce(self.timing.guard_cycles);
    }

    /// Handles the interrupt raised shortly before the end of the box.
    pub fn pre_end(&mut self) {
        self.cascade.ack_pre_end();
        self.cascade.quiesce(self.timing.guard_cycles);
    }

    /// Handles completion of the end-of-box transfer: stops the master and
    /// positions the stream at the next row.
    pub fn line_end(&mut self) {
        self.cascade.end_line();
        self.row = scanout::next_row(self.row);
        self.scanout.point_at(self.row, self.row_words);
    }

    /// Abandons the frame in progress. Used when sync has been lost.
    pub fn force_end_of_frame(&mut self) {
        let step = self.machine.force_end_of_frame();
        self.apply(&step);
    }

    /// Sets polarity and placement for frames starting after this call.
    pub fn configure(&mut self, config: &OsdConfig) {
        let next = self.machine.next_params();
        next.polarity = config.polarity;
        next.h_offset = config.h_offset;
        next.v_offset = config.v_offset;
    }

    /// Sets the box size for frames starting after this call. A height of zero
    /// disables the overlay. Oversized boxes are clamped.
    ///
    /// The end-of-box compare is loaded immediately, so this should only be
    /// called while no box line is being output.
    pub fn commit(&mut self, height: u16, width: u16) {
        let g = OverlayGeometry { height, width }.clamped();
        if g.height != 0 {
            self.cascade
                .load_box(&cascade::box_compare(self.timing, g.width));
        }
        let next = self.machine.next_params();
        next.width = g.width;
        next.height = g.height;
    }

    fn load_frame(&mut self, params: &FrameParams) {
        self.cascade
            .load_slaves(&cascade::slave_reloads(self.timing, params.h_offset));
        self.cascade.set_polarity(params.polarity);
        self.row_words = scanout::row_words(params.width);
    }

    fn apply(&mut self, step: &Step) {
        for action in &step.actions {
            match *action {
                Action::SenseBothEdges => self.cascade.sense_both_edges(),
                Action::LoadFrame(params) => self.load_frame(&params),
                Action::MasterResetOnSync => {
                    self.cascade.set_master_mode(MasterMode::ResetOnSync)
                }
                Action::MasterOff => {
                    self.cascade.set_master_mode(MasterMode::Off)
                }
                Action::RewindPixels => {
                    self.row = 0;
                    self.scanout.point_at(0, self.row_words);
                }
                Action::FrameDone => self.signals.frame_done(),
            }
        }
        self.signals.set_line(step.line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Polarity;
    use crate::timing::TIMING_72MHZ;

    #[derive(Default)]
    struct Log {
        modes: Vec<MasterMode>,
        slaves: Vec<cascade::SlaveReloads>,
        boxes: Vec<cascade::BoxCompare>,
        polarity: Option<Polarity>,
        both_edges: bool,
        lines_ended: usize,
        quiesced: u32,
    }

    impl Cascade for Log {
        fn load_slaves(&mut self, r: &cascade::SlaveReloads) {
            self.slaves.push(*r);
        }
        fn load_box(&mut self, b: &cascade::BoxCompare) {
            self.boxes.push(*b);
        }
        fn set_polarity(&mut self, p: Polarity) {
            self.polarity = Some(p);
            self.both_edges = false;
        }
        fn sense_both_edges(&mut self) {
            self.both_edges = true;
        }
        fn set_master_mode(&mut self, mode: MasterMode) {
            self.modes.push(mode);
        }
        fn end_line(&mut self) {
            self.lines_ended += 1;
        }
        fn ack_pre_start(&mut self) {}
        fn ack_pre_end(&mut self) {}
        fn quiesce(&mut self, cycles: u32) {
            self.quiesced += cycles;
        }
    }

    #[derive(Default)]
    struct Rows(Vec<(usize, usize)>);

    impl Scanout for Rows {
        fn point_at(&mut self, row: usize, words: usize) {
            self.0.push((row, words));
        }
    }

    fn config() -> OsdConfig {
        OsdConfig::new(Polarity::ActiveLow, 2, 3)
    }

    #[test]
    fn start_loads_hardware() {
        let signals = Signals::new();
        let mut e = Engine::new(
            Log::default(),
            Rows::default(),
            &TIMING_72MHZ,
            &signals,
            &config(),
        );
        e.start();
        let c = e.cascade();
        assert_eq!(c.modes, vec![MasterMode::Off]);
        assert_eq!(c.slaves, vec![cascade::slave_reloads(&TIMING_72MHZ, 2)]);
        assert_eq!(c.polarity, Some(Polarity::ActiveLow));
        assert_eq!(signals.phase(), SyncPhase::EndOfFrame);
    }

    #[test]
    fn commit_loads_box_unless_disabled() {
        let signals = Signals::new();
        let mut e = Engine::new(
            Log::default(),
            Rows::default(),
            &TIMING_72MHZ,
            &signals,
            &config(),
        );
        e.commit(10, 256);
        e.commit(0, 64);
        let boxes = &e.cascade().boxes;
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0], cascade::box_compare(&TIMING_72MHZ, 256));
    }

    #[test]
    fn commit_clamps() {
        let signals = Signals::new();
        let mut e = Engine::new(
            Log::default(),
            Rows::default(),
            &TIMING_72MHZ,
            &signals,
            &config(),
        );
        e.commit(500, 5000);
        let next = *e.machine.next_params();
        assert_eq!(usize::from(next.height), crate::config::MAX_DISPLAY_HEIGHT);
        assert_eq!(usize::from(next.width), crate::config::MAX_DISPLAY_WIDTH);
    }

    #[test]
    fn guard_handlers() {
        let signals = Signals::new();
        let mut e = Engine::new(
            Log::default(),
            Rows::default(),
            &TIMING_72MHZ,
            &signals,
            &config(),
        );
        e.pre_start();
        e.pre_end();
        let c = e.cascade();
        assert_eq!(c.modes, vec![MasterMode::CountFromData]);
        assert_eq!(c.quiesced, 2 * TIMING_72MHZ.guard_cycles);
    }

    #[test]
    fn line_end_walks_rows_and_sticks() {
        let signals = Signals::new();
        let mut e = Engine::new(
            Log::default(),
            Rows::default(),
            &TIMING_72MHZ,
            &signals,
            &config(),
        );
        for _ in 0..60 {
            e.line_end();
        }
        let rows = &e.scanout().0;
        assert_eq!(rows[0].0, 1);
        assert_eq!(rows[59].0, crate::config::MAX_DISPLAY_HEIGHT - 1);
        assert_eq!(e.cascade().lines_ended, 60);
    }

    #[test]
    fn frame_start_latches_words_and_rewinds() {
        let signals = Signals::new();
        let mut e = Engine::new(
            Log::default(),
            Rows::default(),
            &TIMING_72MHZ,
            &signals,
            &config(),
        );
        e.start();
        e.commit(10, 256);

        // Long pulse, then short pulse.
        e.sync_edge(false, Instant(0));
        e.sync_edge(true, Instant(1080));
        e.sync_edge(false, Instant(4608));
        e.sync_edge(true, Instant(4608 + 288));
        assert_eq!(signals.phase(), SyncPhase::ActiveLine(1));
        assert!(!e.cascade().both_edges);

        // Line 2, then the top of the box on line 3.
        e.sync_edge(false, Instant(2 * 4608));
        e.sync_edge(false, Instant(3 * 4608));
        assert_eq!(e.scanout().0, vec![(0, 17)]);
        assert_eq!(e.cascade().modes.last(), Some(&MasterMode::ResetOnSync));

        e.force_end_of_frame();
        assert_eq!(signals.phase(), SyncPhase::EndOfFrame);
        assert_eq!(e.cascade().modes.last(), Some(&MasterMode::Off));
        assert_eq!(signals.frames(), 0);
    }
}
