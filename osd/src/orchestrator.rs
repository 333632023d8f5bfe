//! Thread-mode frame orchestration.
//!
//! The orchestrator runs from the firmware's main loop. Each time the engine
//! reports a completed frame it picks what to show next, renders it into the
//! pixel buffer and commits the new box size. It also watches for loss of sync,
//! and turns key and button activity into input for the configuration
//! subsystem.
//!
//! The orchestrator never touches hardware directly. It drives the engine
//! through [`OsdControl`], which the driver and the simulator both implement.
//!
//! [`OsdControl`]: trait.OsdControl.html

use textrows::{Display, Glyphs, PixelRow, MAX_COLS};

use crate::buttons::{self, ButtonLatch};
use crate::config::{OsdConfig, MAX_DISPLAY_HEIGHT};
use crate::scanout::PixelBuffer;
use crate::sync;
use crate::timing::{Instant, Timing};

/// Frames must keep arriving at least this often, or sync is considered lost.
pub const SYNC_TIMEOUT_MS: u32 = 100;
/// How long a notification stays up.
pub const NOTIFY_MS: u32 = 2000;
/// Upper bound on the wait for the engine to move away from the box, in
/// milliseconds.
pub const QUIESCE_BUDGET_MS: u32 = 5;

/// Error returned by operations that would disturb a box being output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Busy;

/// Thread-side control of the line engine.
pub trait OsdControl {
    /// Number of frames completed so far. Wraps.
    fn frames(&self) -> usize;
    /// Current line counter.
    fn line(&self) -> i32;
    /// Abandons the frame in progress and waits for the next vertical blank.
    fn force_end_of_frame(&mut self);
    /// Sets polarity and placement for subsequent frames.
    fn configure(&mut self, config: &OsdConfig);
    /// Sets the box size for subsequent frames. Zero height disables the box.
    fn commit(&mut self, height: u16, width: u16) -> Result<(), Busy>;
    /// Runs `body` with the pixel buffer, if no box is being output.
    fn with_pixels<R>(
        &mut self,
        body: impl FnOnce(&mut PixelBuffer) -> R,
    ) -> Result<R, Busy>;
}

/// The configuration subsystem, as seen by the orchestrator.
pub trait Content {
    /// The display shown when nothing more important is up.
    fn normal(&self) -> &Display;
    /// The menu display, if the menu is open.
    fn menu(&self) -> Option<&Display>;
    /// Current sync polarity and box placement.
    fn config(&self) -> OsdConfig;
    /// Handles a mask of button bits.
    fn buttons(&mut self, b: u8);
}

/// Renders scanlines of a display.
pub trait Rasterizer {
    /// Renders box line `line` of `display` into `out`.
    fn render(&self, line: usize, display: &Display, out: &mut PixelRow);
}

/// Rasterizer for text displays, using glyphs from `G`.
pub struct TextRasterizer<G>(pub G);

impl<G: Glyphs> Rasterizer for TextRasterizer<G> {
    fn render(&self, line: usize, display: &Display, out: &mut PixelRow) {
        textrows::render_line(line, display, &self.0, out)
    }
}

/// A keyboard, or anything else that can press keys.
pub trait KeySource {
    /// Bitmask of keys currently pressed (`buttons::K_*`).
    fn keys(&mut self) -> u8;
    /// Whether the keyboard is currently held off the host.
    fn keyboard_held(&self) -> bool;
    /// Buttons pressed remotely since the last call.
    fn remote_buttons(&mut self) -> u8 {
        0
    }
}

/// Change in sync health reported by `poll`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncChange {
    Lost,
    Found,
}

/// What happened during one `poll`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Outcome {
    pub sync: Option<SyncChange>,
    /// A new frame was rendered and committed.
    pub frame: bool,
}

pub struct Orchestrator<'a> {
    timing: &'a Timing,
    seen_frames: usize,
    /// A completed frame has been seen but its successor isn't committed yet.
    pending: bool,
    /// Time of the last completed frame, or of the last forced reset.
    frame_time: Instant,
    lost_sync: bool,
    notify: Display,
    notify_time: Instant,
    keyboard_held: bool,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator at boot. The keyboard's state at this point is
    /// taken as given, so a keyboard already held isn't announced.
    pub fn new(
        timing: &'a Timing,
        now: Instant,
        keys: &impl KeySource,
    ) -> Self {
        Orchestrator {
            timing,
            seen_frames: 0,
            pending: false,
            frame_time: now,
            lost_sync: false,
            notify: Display::blank(),
            notify_time: now,
            keyboard_held: keys.keyboard_held(),
        }
    }

    pub fn is_sync_lost(&self) -> bool {
        self.lost_sync
    }

    /// Shows `text` on a single row for a couple of seconds, in preference to
    /// anything else.
    pub fn notify(&mut self, text: &[u8], now: Instant) {
        self.notify = Display::blank();
        self.notify.set_row(0, text);
        self.notify.cols = text.len().min(MAX_COLS) as u8;
        self.notify.rows = 1;
        self.notify.on = true;
        self.notify_time = now;
    }

    /// The notification, if one is up.
    pub fn notification(&self) -> Option<&Display> {
        if self.notify.on {
            Some(&self.notify)
        } else {
            None
        }
    }

    /// Checks sync health, and renders and commits the next frame if the
    /// engine has finished one. A frame that can't be committed is retried on
    /// the next call.
    pub fn poll(
        &mut self,
        now: Instant,
        osd: &mut impl OsdControl,
        content: &impl Content,
        raster: &impl Rasterizer,
    ) -> Outcome {
        let mut outcome = Outcome::default();

        // Sync is lost if no frame has completed in a while. Keep kicking the
        // engine back to end-of-frame until one does.
        if now.since(self.frame_time) > self.timing.ms(SYNC_TIMEOUT_MS) {
            if !self.lost_sync {
                outcome.sync = Some(SyncChange::Lost);
            }
            self.lost_sync = true;
            self.frame_time = now;
            osd.force_end_of_frame();
        }

        let frames = osd.frames();
        if frames != self.seen_frames {
            self.seen_frames = frames;
            self.pending = true;
            if self.lost_sync {
                outcome.sync = Some(SyncChange::Found);
                self.lost_sync = false;
            }
            self.frame_time = now;
        }
        if !self.pending {
            return outcome;
        }

        if self.notify.on
            && now.since(self.notify_time) > self.timing.ms(NOTIFY_MS)
        {
            self.notify.on = false;
        }
        let display = if self.notify.on {
            &self.notify
        } else {
            content.menu().unwrap_or_else(|| content.normal())
        };

        let height = display.required_height().min(MAX_DISPLAY_HEIGHT);
        let rendered = osd.with_pixels(|buf| {
            for (i, row) in buf.rows.iter_mut().take(height).enumerate() {
                raster.render(i, display, row);
            }
        });
        if rendered.is_err() {
            return outcome;
        }

        osd.configure(&content.config());
        let committed = if display.on {
            osd.commit(height as u16, display.width_pixels() as u16)
        } else {
            osd.commit(0, 0)
        };
        // Until a commit lands, every poll renders again, so new pixels are
        // never left in an old box.
        if committed.is_ok() {
            self.pending = false;
            outcome.frame = true;
        }
        outcome
    }

    /// Posts keyboard notifications and passes button presses on to the
    /// configuration subsystem.
    pub fn poll_input(
        &mut self,
        now: Instant,
        keys: &mut impl KeySource,
        latch: &ButtonLatch,
        content: &mut impl Content,
    ) {
        let held = keys.keyboard_held();
        if held != self.keyboard_held {
            let text: &[u8] = if held {
                b"Keyboard Held"
            } else {
                b"Keyboard Released"
            };
            self.notify(text, now);
            self.keyboard_held = held;
        }

        // Any further key press dismisses a notification.
        let pressed = keys.keys();
        if pressed != 0 {
            self.notify.on = false;
        }

        if latch.is_set() {
            let b = buttons::fold(
                latch.take(),
                pressed,
                content.menu().is_some(),
                keys.remote_buttons(),
            );
            content.buttons(b);
        }
    }
}

/// Waits for the engine to be clear of the box, calling `idle` to pass each
/// millisecond. Gives up after `QUIESCE_BUDGET_MS` calls; returns whether the
/// engine was quiescent at the last check.
pub fn wait_quiescent(
    osd: &impl OsdControl,
    v_offset: u16,
    mut idle: impl FnMut(),
) -> bool {
    for _ in 0..QUIESCE_BUDGET_MS {
        if sync::is_quiescent(osd.line(), v_offset) {
            return true;
        }
        idle();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{B_LEFT, B_PROCESSED, B_SELECT, K_MENU};
    use crate::config::Polarity;
    use crate::timing::TIMING_72MHZ;
    use core::cell::Cell;

    struct FakeOsd {
        frames: usize,
        line: i32,
        forced: usize,
        renders: usize,
        /// Line the engine has moved on to by the time a render finishes.
        line_after_render: Option<i32>,
        commits: Vec<(u16, u16)>,
        configs: Vec<OsdConfig>,
        pixels: PixelBuffer,
    }

    impl FakeOsd {
        fn new() -> Self {
            FakeOsd {
                frames: 0,
                line: sync::HLINE_EOF,
                forced: 0,
                renders: 0,
                line_after_render: None,
                commits: vec![],
                configs: vec![],
                pixels: PixelBuffer::new(),
            }
        }

        fn busy(&self) -> bool {
            !sync::is_quiescent(self.line, 30)
        }
    }

    impl OsdControl for FakeOsd {
        fn frames(&self) -> usize {
            self.frames
        }
        fn line(&self) -> i32 {
            self.line
        }
        fn force_end_of_frame(&mut self) {
            self.forced += 1;
            self.line = sync::HLINE_EOF;
        }
        fn configure(&mut self, config: &OsdConfig) {
            self.configs.push(*config);
        }
        fn commit(&mut self, height: u16, width: u16) -> Result<(), Busy> {
            if self.busy() {
                return Err(Busy);
            }
            self.commits.push((height, width));
            Ok(())
        }
        fn with_pixels<R>(
            &mut self,
            body: impl FnOnce(&mut PixelBuffer) -> R,
        ) -> Result<R, Busy> {
            if self.busy() {
                return Err(Busy);
            }
            self.renders += 1;
            let r = body(&mut self.pixels);
            if let Some(line) = self.line_after_render.take() {
                self.line = line;
            }
            Ok(r)
        }
    }

    struct Menu {
        normal: Display,
        menu: Display,
        menu_active: bool,
        pressed: Vec<u8>,
    }

    impl Menu {
        fn new() -> Self {
            let mut normal = Display::blank();
            normal.set_row(0, b"Track 00.0");
            normal.set_row(1, b"image.adf");
            normal.cols = 16;
            normal.rows = 2;
            normal.on = true;
            let mut menu = Display::blank();
            menu.set_row(0, b"Settings");
            menu.cols = 8;
            menu.rows = 1;
            menu.heights = 1;
            menu.on = true;
            Menu {
                normal,
                menu,
                menu_active: false,
                pressed: vec![],
            }
        }
    }

    impl Content for Menu {
        fn normal(&self) -> &Display {
            &self.normal
        }
        fn menu(&self) -> Option<&Display> {
            if self.menu_active {
                Some(&self.menu)
            } else {
                None
            }
        }
        fn config(&self) -> OsdConfig {
            OsdConfig::new(Polarity::ActiveHigh, 10, 30)
        }
        fn buttons(&mut self, b: u8) {
            self.pressed.push(b);
        }
    }

    /// Rasterizer that marks each rendered row with its line number.
    struct Stamp;

    impl Rasterizer for Stamp {
        fn render(&self, line: usize, _: &Display, out: &mut PixelRow) {
            out[0] = line as u16 + 1;
        }
    }

    struct Keys {
        keys: u8,
        held: bool,
        remote: u8,
    }

    impl Keys {
        fn idle() -> Self {
            Keys {
                keys: 0,
                held: false,
                remote: 0,
            }
        }
    }

    impl KeySource for Keys {
        fn keys(&mut self) -> u8 {
            self.keys
        }
        fn keyboard_held(&self) -> bool {
            self.held
        }
        fn remote_buttons(&mut self) -> u8 {
            core::mem::replace(&mut self.remote, 0)
        }
    }

    fn ms(n: u32) -> u32 {
        TIMING_72MHZ.ms(n)
    }

    #[test]
    fn renders_and_commits_on_new_frame() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let content = Menu::new();

        let r = o.poll(Instant(ms(10)), &mut osd, &content, &Stamp);
        assert_eq!(r, Outcome::default());
        assert!(osd.commits.is_empty());

        osd.frames = 1;
        let r = o.poll(Instant(ms(20)), &mut osd, &content, &Stamp);
        assert!(r.frame);
        // Two rows: 22 lines, 16 columns.
        assert_eq!(osd.commits, vec![(22, 128)]);
        assert_eq!(osd.configs[0].polarity, Polarity::ActiveHigh);
        assert_eq!(osd.pixels.rows[0][0], 1);
        assert_eq!(osd.pixels.rows[21][0], 22);
        assert_eq!(osd.pixels.rows[22][0], 0);

        // Same frame count: nothing more to do.
        let r = o.poll(Instant(ms(30)), &mut osd, &content, &Stamp);
        assert!(!r.frame);
        assert_eq!(osd.commits.len(), 1);
    }

    #[test]
    fn menu_takes_priority_over_normal() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let mut content = Menu::new();
        content.menu_active = true;
        osd.frames = 1;
        o.poll(Instant(ms(1)), &mut osd, &content, &Stamp);
        // One double-height row.
        assert_eq!(osd.commits, vec![(20, 64)]);
    }

    #[test]
    fn display_off_commits_zero_height() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let mut content = Menu::new();
        content.normal.on = false;
        osd.frames = 1;
        assert!(o.poll(Instant(ms(1)), &mut osd, &content, &Stamp).frame);
        assert_eq!(osd.commits, vec![(0, 0)]);
    }

    #[test]
    fn height_is_clamped() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let mut content = Menu::new();
        content.normal.rows = 4;
        content.normal.heights = 0b1111;
        osd.frames = 1;
        o.poll(Instant(ms(1)), &mut osd, &content, &Stamp);
        assert_eq!(osd.commits[0].0 as usize, MAX_DISPLAY_HEIGHT);
    }

    #[test]
    fn busy_engine_skips_frame() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let content = Menu::new();
        osd.frames = 1;
        osd.line = 35;
        let r = o.poll(Instant(ms(1)), &mut osd, &content, &Stamp);
        assert!(!r.frame);
        assert!(osd.commits.is_empty());
        assert_eq!(osd.pixels.rows[0][0], 0);
    }

    #[test]
    fn refused_commit_is_retried() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let content = Menu::new();
        osd.frames = 1;
        // The engine gets near the box while the frame is being rendered.
        osd.line_after_render = Some(28);
        let r = o.poll(Instant(ms(1)), &mut osd, &content, &Stamp);
        assert!(!r.frame);
        assert_eq!(osd.renders, 1);
        assert!(osd.commits.is_empty());

        // Still busy: nothing is touched.
        let r = o.poll(Instant(ms(2)), &mut osd, &content, &Stamp);
        assert!(!r.frame);
        assert_eq!(osd.renders, 1);

        osd.line = sync::HLINE_EOF;
        let r = o.poll(Instant(ms(3)), &mut osd, &content, &Stamp);
        assert!(r.frame);
        assert_eq!(osd.renders, 2);
        assert_eq!(osd.commits, vec![(22, 128)]);

        // Committed: the frame isn't rendered again.
        let r = o.poll(Instant(ms(4)), &mut osd, &content, &Stamp);
        assert!(!r.frame);
        assert_eq!(osd.renders, 2);
    }

    #[test]
    fn pending_frame_does_not_hide_sync_loss() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let content = Menu::new();
        osd.frames = 1;
        osd.line = 35;
        assert!(!o.poll(Instant(ms(1)), &mut osd, &content, &Stamp).frame);
        assert!(!o.poll(Instant(ms(50)), &mut osd, &content, &Stamp).frame);

        let r = o.poll(Instant(ms(102)), &mut osd, &content, &Stamp);
        assert_eq!(r.sync, Some(SyncChange::Lost));
        assert_eq!(osd.forced, 1);
        // The reset clears the way for the waiting frame.
        assert!(r.frame);
        assert_eq!(osd.commits, vec![(22, 128)]);
    }

    #[test]
    fn sync_loss_and_recovery() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let content = Menu::new();

        let r = o.poll(Instant(ms(100)), &mut osd, &content, &Stamp);
        assert_eq!(r.sync, None);
        assert_eq!(osd.forced, 0);

        let r = o.poll(Instant(ms(101)), &mut osd, &content, &Stamp);
        assert_eq!(r.sync, Some(SyncChange::Lost));
        assert!(o.is_sync_lost());
        assert_eq!(osd.forced, 1);

        // Reported once, but the reset repeats every timeout.
        let r = o.poll(Instant(ms(150)), &mut osd, &content, &Stamp);
        assert_eq!(r.sync, None);
        assert_eq!(osd.forced, 1);
        let r = o.poll(Instant(ms(202)), &mut osd, &content, &Stamp);
        assert_eq!(r.sync, None);
        assert_eq!(osd.forced, 2);

        osd.frames = 1;
        let r = o.poll(Instant(ms(210)), &mut osd, &content, &Stamp);
        assert_eq!(r.sync, Some(SyncChange::Found));
        assert!(r.frame);
        assert!(!o.is_sync_lost());
    }

    #[test]
    fn notification_shows_then_expires() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let mut osd = FakeOsd::new();
        let content = Menu::new();
        o.notify(b"Hello", Instant(0));

        osd.frames = 1;
        o.poll(Instant(ms(50)), &mut osd, &content, &Stamp);
        assert_eq!(osd.commits[0], (12, 40));

        osd.frames = 2;
        o.poll(Instant(ms(2001)), &mut osd, &content, &Stamp);
        assert_eq!(osd.commits[1], (22, 128));
        assert!(o.notification().is_none());
    }

    #[test]
    fn keyboard_hold_notifies_and_keys_dismiss() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let latch = ButtonLatch::new();
        let mut content = Menu::new();
        let mut keys = Keys {
            keys: 0,
            held: true,
            remote: 0,
        };

        o.poll_input(Instant(0), &mut keys, &latch, &mut content);
        let n = o.notification().map(|d| d.text[0]);
        assert_eq!(&n.unwrap()[..13], b"Keyboard Held");

        keys.held = false;
        o.poll_input(Instant(1), &mut keys, &latch, &mut content);
        let n = o.notification().unwrap();
        assert_eq!(usize::from(n.cols), b"Keyboard Released".len());

        keys.keys = K_MENU;
        o.poll_input(Instant(2), &mut keys, &latch, &mut content);
        assert!(o.notification().is_none());
    }

    #[test]
    fn keyboard_held_at_boot_is_not_announced() {
        let latch = ButtonLatch::new();
        let mut content = Menu::new();
        let mut keys = Keys {
            held: true,
            ..Keys::idle()
        };
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &keys);
        o.poll_input(Instant(0), &mut keys, &latch, &mut content);
        assert!(o.notification().is_none());

        keys.held = false;
        o.poll_input(Instant(1), &mut keys, &latch, &mut content);
        let n = o.notification().unwrap();
        assert_eq!(usize::from(n.cols), b"Keyboard Released".len());
    }

    #[test]
    fn buttons_are_folded_and_forwarded() {
        let mut o = Orchestrator::new(&TIMING_72MHZ, Instant(0), &Keys::idle());
        let latch = ButtonLatch::new();
        let mut content = Menu::new();
        let mut keys = Keys {
            keys: K_MENU,
            held: false,
            remote: B_LEFT,
        };

        // Nothing latched: keys alone aren't forwarded.
        o.poll_input(Instant(0), &mut keys, &latch, &mut content);
        assert!(content.pressed.is_empty());

        latch.post(B_PROCESSED);
        o.poll_input(Instant(0), &mut keys, &latch, &mut content);
        assert_eq!(content.pressed, vec![B_SELECT | B_LEFT]);
        assert!(!latch.is_set());
    }

    #[test]
    fn quiescence_wait_is_bounded() {
        let mut osd = FakeOsd::new();
        let idles = Cell::new(0);
        assert!(wait_quiescent(&osd, 30, || idles.set(idles.get() + 1)));
        assert_eq!(idles.get(), 0);

        osd.line = 40;
        assert!(!wait_quiescent(&osd, 30, || idles.set(idles.get() + 1)));
        assert_eq!(idles.get(), QUIESCE_BUDGET_MS);
    }

    #[test]
    fn text_rasterizer_uses_glyphs() {
        struct Solid;
        impl Glyphs for Solid {
            fn line(&self, _: u8, _: usize) -> u8 {
                0xFF
            }
        }
        let mut d = Display::blank();
        d.set_row(0, b"AB");
        d.cols = 2;
        d.rows = 1;
        d.on = true;
        let mut row = [0; textrows::ROW_WORDS];
        TextRasterizer(Solid).render(2, &d, &mut row);
        assert_eq!(row[0], 0xFFFF);
        assert_eq!(row[1], 0);
    }
}
