//! Simulated hardware for running the line engine on the host.
//!
//! [`SimOsd`] wires an [`Engine`] to an in-memory cascade and pixel stream and
//! synthesizes the sync signal a line at a time. Edges are only delivered when
//! the simulated edge detector is armed for them, and a line of pixels is only
//! "output" when the master unit was armed to restart at the end of the sync
//! pulse, so the simulation exercises the same handshakes as the real thing.
//!
//! [`SimOsd`]: struct.SimOsd.html
//! [`Engine`]: ../engine/struct.Engine.html

use crate::cascade::{BoxCompare, Cascade, MasterMode, SlaveReloads};
use crate::config::{OsdConfig, Polarity};
use crate::engine::{Engine, Signals};
use crate::orchestrator::{Busy, OsdControl};
use crate::scanout::{PixelBuffer, Scanout};
use crate::sync;
use crate::timing::{Clock, Instant, Timing};

/// In-memory timer cascade and edge detector.
#[derive(Debug)]
pub struct SimCascade {
    /// Polarity the edge detector and master input are armed for.
    pub polarity: Polarity,
    pub both_edges: bool,
    pub master: MasterMode,
    /// The master is counting out a line.
    pub running: bool,
    pub slaves: Option<SlaveReloads>,
    pub box_compare: Option<BoxCompare>,
    pub lines_ended: usize,
    pub quiesced_cycles: u64,
}

impl SimCascade {
    pub fn new() -> Self {
        SimCascade {
            polarity: Polarity::ActiveLow,
            both_edges: false,
            master: MasterMode::Off,
            running: false,
            slaves: None,
            box_compare: None,
            lines_ended: 0,
            quiesced_cycles: 0,
        }
    }

    /// Would the edge detector fire on a transition to `level`?
    pub fn senses(&self, level: bool) -> bool {
        self.both_edges || level == self.polarity.active_level()
    }
}

impl Cascade for SimCascade {
    fn load_slaves(&mut self, reloads: &SlaveReloads) {
        self.slaves = Some(*reloads);
    }

    fn load_box(&mut self, compare: &BoxCompare) {
        self.box_compare = Some(*compare);
    }

    fn set_polarity(&mut self, polarity: Polarity) {
        self.polarity = polarity;
        self.both_edges = false;
    }

    fn sense_both_edges(&mut self) {
        self.both_edges = true;
    }

    fn set_master_mode(&mut self, mode: MasterMode) {
        self.master = mode;
    }

    fn end_line(&mut self) {
        self.lines_ended += 1;
        self.running = false;
        self.master = match self.master {
            MasterMode::CountFromData => MasterMode::Off,
            m => m,
        };
    }

    fn ack_pre_start(&mut self) {}

    fn ack_pre_end(&mut self) {}

    fn quiesce(&mut self, cycles: u32) {
        self.quiesced_cycles += u64::from(cycles);
    }
}

/// In-memory pixel stream position.
#[derive(Debug, Default)]
pub struct SimScanout {
    pub row: Option<usize>,
    pub words: usize,
    pub rewinds: usize,
}

impl Scanout for SimScanout {
    fn point_at(&mut self, row: usize, words: usize) {
        if row == 0 {
            self.rewinds += 1;
        }
        self.row = Some(row);
        self.words = words;
    }
}

/// One line of overlay output seen by the simulator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OutputLine {
    /// Host line number at which it was output.
    pub line: i32,
    /// Pixel buffer row streamed.
    pub row: usize,
    /// Words streamed.
    pub words: usize,
}

/// A line engine running against simulated hardware and a synthetic sync
/// signal.
pub struct SimOsd<'a> {
    engine: Engine<'a, SimCascade, SimScanout>,
    signals: &'a Signals,
    timing: &'a Timing,
    config: OsdConfig,
    /// Polarity of the synthesized signal, which need not match the
    /// configured one.
    pub signal_polarity: Polarity,
    /// Line period, in cycles.
    pub line_cycles: u32,
    now: u32,
    pixels: PixelBuffer,
    output: Vec<OutputLine>,
    edges: usize,
    forced: usize,
}

impl<'a> SimOsd<'a> {
    pub fn new(
        timing: &'a Timing,
        signals: &'a Signals,
        config: &OsdConfig,
    ) -> Self {
        let mut engine = Engine::new(
            SimCascade::new(),
            SimScanout::default(),
            timing,
            signals,
            config,
        );
        engine.start();
        SimOsd {
            engine,
            signals,
            timing,
            config: *config,
            signal_polarity: config.polarity,
            // 64us, a PAL/NTSC-ish line.
            line_cycles: 64 * timing.cycles_per_us(),
            now: 0,
            pixels: PixelBuffer::new(),
            output: Vec::new(),
            edges: 0,
            forced: 0,
        }
    }

    pub fn cascade(&mut self) -> &mut SimCascade {
        self.engine.cascade()
    }

    pub fn scanout(&mut self) -> &mut SimScanout {
        self.engine.scanout()
    }

    pub fn phase(&self) -> sync::SyncPhase {
        self.signals.phase()
    }

    /// Number of sync edges delivered to the engine so far.
    pub fn edges(&self) -> usize {
        self.edges
    }

    /// Number of times sync loss forced the engine to end of frame.
    pub fn forced(&self) -> usize {
        self.forced
    }

    /// Lines of overlay output so far.
    pub fn output(&self) -> &[OutputLine] {
        &self.output
    }

    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// The pixel buffer, as the stream sees it.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Lets `ms` milliseconds pass with no sync signal.
    pub fn advance_ms(&mut self, ms: u32) {
        self.now = self.now.wrapping_add(self.timing.ms(ms));
    }

    /// Synthesizes one line: a sync pulse `width_us` microseconds wide, then
    /// the rest of the line period.
    pub fn pulse(&mut self, width_us: u32) {
        self.sync_line(width_us, false)
    }

    /// Like `pulse`, but the vertical sync input fires while the line's
    /// pixels are being shifted out.
    pub fn pulse_with_vsync(&mut self, width_us: u32) {
        self.sync_line(width_us, true)
    }

    fn sync_line(&mut self, width_us: u32, vsync_mid_line: bool) {
        let start = self.now;
        let width = width_us * self.timing.cycles_per_us();
        let active = self.signal_polarity.active_level();

        self.edge(active, start);
        self.edge(!active, start.wrapping_add(width));

        // The end of the pulse restarts the master if it was armed, which
        // runs one line of output.
        if self.engine.cascade().master == MasterMode::ResetOnSync {
            self.output_line(vsync_mid_line);
        } else if vsync_mid_line {
            self.engine.vsync();
        }

        self.now = start.wrapping_add(self.line_cycles.max(width + 1));
    }

    /// Synthesizes `n` pulses of `width_us` microseconds.
    pub fn pulses(&mut self, n: usize, width_us: u32) {
        for _ in 0..n {
            self.pulse(width_us);
        }
    }

    /// Synthesizes a pulse on the vertical sync input.
    pub fn vsync_pulse(&mut self) {
        self.engine.vsync();
    }

    fn edge(&mut self, level: bool, at: u32) {
        if self.engine.cascade().senses(level) {
            self.edges += 1;
            self.engine.sync_edge(level, Instant(at));
        }
    }

    fn output_line(&mut self, vsync_mid_line: bool) {
        self.engine.cascade().running = true;
        self.engine.pre_start();
        if vsync_mid_line {
            self.engine.vsync();
        }
        // The end-of-box transfer needs the master to reach its compare.
        if !self.engine.cascade().running {
            return;
        }
        self.engine.pre_end();
        let scanout = self.engine.scanout();
        let out = OutputLine {
            line: self.signals.line(),
            row: scanout.row.unwrap_or(usize::max_value()),
            words: scanout.words,
        };
        self.output.push(out);
        self.engine.line_end();
    }

    fn is_quiescent(&self) -> bool {
        sync::is_quiescent(self.signals.line(), self.config.v_offset)
    }
}

impl<'a> OsdControl for SimOsd<'a> {
    fn frames(&self) -> usize {
        self.signals.frames()
    }

    fn line(&self) -> i32 {
        self.signals.line()
    }

    fn force_end_of_frame(&mut self) {
        self.forced += 1;
        self.engine.force_end_of_frame();
    }

    fn configure(&mut self, config: &OsdConfig) {
        self.config = *config;
        self.engine.configure(config);
    }

    fn commit(&mut self, height: u16, width: u16) -> Result<(), Busy> {
        if !self.is_quiescent() {
            return Err(Busy);
        }
        self.engine.commit(height, width);
        Ok(())
    }

    fn with_pixels<R>(
        &mut self,
        body: impl FnOnce(&mut PixelBuffer) -> R,
    ) -> Result<R, Busy> {
        if !self.is_quiescent() {
            return Err(Busy);
        }
        Ok(body(&mut self.pixels))
    }
}

impl<'a> Clock for SimOsd<'a> {
    fn now(&self) -> Instant {
        Instant(self.now)
    }
}
