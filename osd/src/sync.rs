//! Sync pulse classification and the line/frame state machine.
//!
//! Everything in this module is pure: it is driven from the sync-edge
//! interrupt on hardware, and from synthetic edges in tests. Hardware effects
//! are described as a list of [`Action`]s for the caller to apply.
//!
//! # Line numbering
//!
//! The state is a single signed line counter:
//!
//! - `-1`: end of frame. The box is done (or was never started) and we're
//!   waiting for the vertical blanking interval.
//! - `0`: vertical blank. We've seen at least one long sync pulse.
//! - `n > 0`: counting lines. Line 1 is the first line after the first short
//!   pulse following vertical blank.
//!
//! [`Action`]: enum.Action.html

use arrayvec::ArrayVec;

use crate::config::Polarity;

/// Line counter value at end of frame.
pub const HLINE_EOF: i32 = -1;
/// Line counter value during vertical blank.
pub const HLINE_VBL: i32 = 0;
/// Line counter value on the first line of a frame.
pub const HLINE_SOF: i32 = 1;

/// Position of the state machine within the host's frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncPhase {
    EndOfFrame,
    VerticalBlank,
    /// Entered on the short pulse that ends vertical blank. This is never a
    /// resting state: the line counter reads `ActiveLine(1)` right after.
    StartOfFrame,
    ActiveLine(u16),
}

impl SyncPhase {
    /// Decodes a line counter value.
    pub fn from_line(line: i32) -> Self {
        match line {
            l if l < HLINE_VBL => SyncPhase::EndOfFrame,
            HLINE_VBL => SyncPhase::VerticalBlank,
            l => SyncPhase::ActiveLine(l as u16),
        }
    }
}

/// Frame-level parameters consulted by the state machine. A copy is latched
/// at each start of frame so that changes never land mid-frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameParams {
    pub polarity: Polarity,
    pub h_offset: u16,
    pub v_offset: u16,
    /// Box height in lines. Zero disables the overlay.
    pub height: u16,
    /// Box width in pixels.
    pub width: u16,
}

impl FrameParams {
    pub const fn new(polarity: Polarity) -> Self {
        FrameParams {
            polarity,
            h_offset: 0,
            v_offset: 0,
            height: 0,
            width: 0,
        }
    }

    /// First line on which the box is drawn. Line 1 is spent setting up the
    /// frame, so the box can't start before line 2.
    ///
    /// The box still ends at `v_offset + height`: with `v_offset` below 2 it
    /// starts late and loses its bottom `2 - v_offset` lines.
    pub fn first_box_line(&self) -> i32 {
        i32::from(self.v_offset).max(HLINE_SOF + 1)
    }

    /// Line at which the frame ends.
    pub fn end_line(&self) -> i32 {
        i32::from(self.v_offset) + i32::from(self.height)
    }
}

/// Hardware effects requested by a state transition, in the order they must
/// be applied.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Action {
    /// Interrupt on both sync edges, so that pulse width can be measured.
    SenseBothEdges,
    /// Load horizontal placement, box width and sync polarity for the frame
    /// that is starting. Restores single-edge sensing.
    LoadFrame(FrameParams),
    /// Make the next end-of-sync edge restart the master timer, which starts
    /// output of one line.
    MasterResetOnSync,
    /// Stop the master timer from responding to sync edges.
    MasterOff,
    /// Point the pixel stream at the first row of the pixel buffer.
    RewindPixels,
    /// A frame has completed.
    FrameDone,
}

/// List of actions produced by one transition.
pub type Actions = ArrayVec<[Action; 4]>;

/// A sync event after classification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncEvent {
    /// A dedicated vertical sync input fired.
    VSync,
    /// A sync pulse began; only its width is of interest.
    PulseStart,
    /// A sync pulse longer than the long-pulse threshold ended.
    LongPulse,
    /// A normal-width sync pulse ended.
    ShortPulse,
    /// A sync pulse began while counting lines.
    Line,
}

/// Result of one transition.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Step {
    /// New value of the line counter.
    pub line: i32,
    /// Phase entered by this transition; `StartOfFrame` when a frame began.
    pub entered: SyncPhase,
    pub actions: Actions,
}

/// The line/frame transition function.
///
/// `cur` holds the parameters of the frame in progress; `next` holds the
/// parameters that will be latched if this event starts a frame.
pub fn transition(
    line: i32,
    event: SyncEvent,
    cur: &FrameParams,
    next: &FrameParams,
) -> Step {
    let mut actions = Actions::new();

    let line = match event {
        SyncEvent::VSync => {
            actions.push(Action::MasterOff);
            HLINE_VBL
        }
        SyncEvent::Line if line > HLINE_VBL => {
            let line = line + 1;
            if line < i32::from(cur.v_offset) {
                // Above the box.
            } else if line >= cur.end_line() {
                actions.push(Action::MasterOff);
                actions.push(Action::FrameDone);
                return Step {
                    line: HLINE_EOF,
                    entered: SyncPhase::EndOfFrame,
                    actions,
                };
            } else if line >= cur.first_box_line() {
                actions.push(Action::MasterResetOnSync);
                if line == cur.first_box_line() {
                    actions.push(Action::RewindPixels);
                }
            }
            line
        }
        // A stray line event outside the frame is just another edge.
        SyncEvent::Line | SyncEvent::PulseStart => {
            actions.push(Action::SenseBothEdges);
            line
        }
        SyncEvent::LongPulse => {
            actions.push(Action::SenseBothEdges);
            HLINE_VBL
        }
        SyncEvent::ShortPulse => {
            actions.push(Action::SenseBothEdges);
            if line != HLINE_VBL {
                line
            } else if next.height == 0 {
                // Overlay disabled: finish the frame without drawing it.
                actions.push(Action::MasterOff);
                actions.push(Action::FrameDone);
                return Step {
                    line: HLINE_EOF,
                    entered: SyncPhase::EndOfFrame,
                    actions,
                };
            } else {
                actions.push(Action::LoadFrame(*next));
                return Step {
                    line: HLINE_SOF,
                    entered: SyncPhase::StartOfFrame,
                    actions,
                };
            }
        }
    };

    Step {
        line,
        entered: SyncPhase::from_line(line),
        actions,
    }
}

/// Measures sync pulse widths, independent of polarity. Only meaningful while
/// the state machine is outside the counted lines, when both edges are sensed.
#[derive(Clone, Debug)]
pub struct Classifier {
    /// Cycle count at the most recent start of a sync pulse.
    pulse_start: u32,
    long_pulse_cycles: u32,
}

impl Classifier {
    pub const fn new(long_pulse_cycles: u32) -> Self {
        Classifier {
            pulse_start: 0,
            long_pulse_cycles,
        }
    }

    /// Classifies an edge that left the sync pin at `level` at cycle count
    /// `at`.
    pub fn classify(
        &mut self,
        level: bool,
        at: u32,
        polarity: Polarity,
    ) -> SyncEvent {
        if level == polarity.active_level() {
            self.pulse_start = at;
            SyncEvent::PulseStart
        } else if at.wrapping_sub(self.pulse_start) > self.long_pulse_cycles {
            SyncEvent::LongPulse
        } else {
            SyncEvent::ShortPulse
        }
    }
}

/// The line/frame state machine with its classifier and parameters.
#[derive(Clone, Debug)]
pub struct LineMachine {
    line: i32,
    classifier: Classifier,
    cur: FrameParams,
    next: FrameParams,
}

impl LineMachine {
    pub const fn new(long_pulse_cycles: u32, params: FrameParams) -> Self {
        LineMachine {
            line: HLINE_EOF,
            classifier: Classifier::new(long_pulse_cycles),
            cur: params,
            next: params,
        }
    }

    pub fn line(&self) -> i32 {
        self.line
    }

    pub fn phase(&self) -> SyncPhase {
        SyncPhase::from_line(self.line)
    }

    /// Parameters of the frame in progress.
    pub fn current(&self) -> &FrameParams {
        &self.cur
    }

    /// Parameters for the next frame.
    pub fn next_params(&mut self) -> &mut FrameParams {
        &mut self.next
    }

    /// Handles a transition of the composite/horizontal sync pin to `level`
    /// at cycle count `at`.
    pub fn sync_edge(&mut self, level: bool, at: u32) -> Step {
        let event = if self.line > HLINE_VBL {
            SyncEvent::Line
        } else {
            // Pulses are measured against the polarity of the frame that
            // will start, since that's what the edge sensing was armed with.
            self.classifier.classify(level, at, self.next.polarity)
        };
        self.apply(event)
    }

    /// Handles the start of a pulse on the dedicated vertical sync input.
    pub fn vsync(&mut self) -> Step {
        self.apply(SyncEvent::VSync)
    }

    /// Abandons whatever frame is in progress, as on loss of sync.
    pub fn force_end_of_frame(&mut self) -> Step {
        self.line = HLINE_EOF;
        let mut actions = Actions::new();
        actions.push(Action::MasterOff);
        Step {
            line: HLINE_EOF,
            entered: SyncPhase::EndOfFrame,
            actions,
        }
    }

    fn apply(&mut self, event: SyncEvent) -> Step {
        let step = transition(self.line, event, &self.cur, &self.next);
        if step.entered == SyncPhase::StartOfFrame {
            self.cur = self.next;
        }
        self.line = step.line;
        step
    }
}

/// Checks whether the state machine is far enough from the box that shared
/// geometry and content can change without tearing: outside the counted lines,
/// or more than three lines above the box.
pub fn is_quiescent(line: i32, v_offset: u16) -> bool {
    line <= HLINE_VBL || line < i32::from(v_offset) - 3
}
