//! Real-time transport: runs once per audio cycle on the driver thread.
//!
//! Nothing in this module allocates, blocks or logs once the controller is
//! built. Input arrives over `rtrb` queues; retired snapshots are handed to
//! the `basedrop` collector instead of being freed here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use basedrop::Shared;
use rtrb::{Consumer, Producer};

use daw_core::{CapturedEvent, ParamId, TrackId};

use crate::snapshot::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum TransportState {
    #[default]
    Stopped = 0,
    Rolling = 1,
    Recording = 2,
    Seeking = 3,
}

impl TransportState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Rolling,
            2 => TransportState::Recording,
            3 => TransportState::Seeking,
            _ => TransportState::Stopped,
        }
    }

    /// Whether the playhead advances.
    pub fn is_moving(&self) -> bool {
        matches!(self, TransportState::Rolling | TransportState::Recording)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    Play,
    Stop,
    /// Arms or disarms recording.
    Record(bool),
    Locate(u64),
    SetLooping(bool),
}

/// Reports from the real-time side, drained by [`crate::SessionEngine::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Position(u64),
    State(TransportState),
    Xrun(u64),
    /// The capture queue was full and recorded automation was lost.
    CaptureOverflow,
    /// Parameter changes dropped in one cycle because the plugin host fell
    /// behind draining them.
    ParamOverflow(u64),
}

/// Live control movement from a MIDI surface or UI, `offset` frames into
/// the next cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlEvent {
    pub track: TrackId,
    pub param: ParamId,
    pub value: f64,
    pub offset: u32,
}

/// Parameter value for the plugin host to apply at `frame`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamChange {
    pub track: TrackId,
    pub param: ParamId,
    pub frame: u64,
    pub value: f64,
}

/// Transport readings shared with non-real-time threads.
#[derive(Debug, Default)]
pub struct SharedTransport {
    position: AtomicU64,
    state: AtomicU8,
    xruns: AtomicU64,
}

impl SharedTransport {
    pub fn current_position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn transport_state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn xrun_count(&self) -> u64 {
        self.xruns.load(Ordering::Acquire)
    }
}

/// Queue endpoints owned by the real-time side.
pub(crate) struct ControllerQueues {
    pub commands: Consumer<TransportCommand>,
    pub snapshots: Consumer<Shared<SessionSnapshot>>,
    pub controls: Consumer<ControlEvent>,
    pub status: Producer<Status>,
    pub params: Producer<ParamChange>,
    pub captures: Producer<CapturedEvent>,
}

pub struct TransportController {
    snapshot: Shared<SessionSnapshot>,
    queues: ControllerQueues,
    shared: Arc<SharedTransport>,
    state: TransportState,
    /// State to enter once a pending seek completes.
    resume: TransportState,
    position: u64,
    pending_seek: Option<u64>,
    record_armed: bool,
    looping: bool,
    max_block_size: usize,
}

impl TransportController {
    pub(crate) fn new(
        snapshot: Shared<SessionSnapshot>,
        queues: ControllerQueues,
        shared: Arc<SharedTransport>,
        max_block_size: usize,
    ) -> Self {
        Self {
            snapshot,
            queues,
            shared,
            state: TransportState::Stopped,
            resume: TransportState::Stopped,
            position: 0,
            pending_seek: None,
            record_armed: false,
            looping: false,
            max_block_size,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_record_armed(&self) -> bool {
        self.record_armed
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    /// Runs one cycle of `frames` frames and returns the frame the cycle
    /// starts at. Automation and punch decisions all use that frame.
    pub fn process(&mut self, frames: usize) -> u64 {
        if frames > self.max_block_size {
            self.xrun();
            return self.position;
        }

        let seek_requested = self.drain_commands();
        while let Ok(snapshot) = self.queues.snapshots.pop() {
            self.snapshot = snapshot;
        }

        // A seek completes on the first cycle with no newer locate.
        if self.state == TransportState::Seeking && !seek_requested {
            if let Some(frame) = self.pending_seek.take() {
                self.position = frame;
            }
            self.set_state(self.resume);
        }

        let cycle_start = self.position;
        let dropped = if self.state.is_moving() {
            self.apply_punch(cycle_start);
            let dropped = self.apply_automation(cycle_start) + self.forward_controls(cycle_start, frames);
            self.position = self.advance(cycle_start, frames as u64);
            dropped
        } else {
            self.forward_controls(cycle_start, 0)
        };
        if dropped > 0 {
            let _ = self.queues.status.push(Status::ParamOverflow(dropped));
        }

        self.shared.position.store(self.position, Ordering::Release);
        let _ = self.queues.status.push(Status::Position(self.position));
        cycle_start
    }

    /// Records a buffer glitch reported by the driver. The playhead stays at
    /// the last position that was fully processed.
    pub fn xrun(&mut self) {
        let count = self.shared.xruns.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.queues.status.push(Status::Xrun(count));
    }

    fn set_state(&mut self, state: TransportState) {
        if self.state != state {
            self.state = state;
            self.shared.state.store(state as u8, Ordering::Release);
            let _ = self.queues.status.push(Status::State(state));
        }
    }

    /// Applies queued transport commands; returns whether a locate arrived.
    fn drain_commands(&mut self) -> bool {
        let mut seek_requested = false;
        while let Ok(command) = self.queues.commands.pop() {
            match command {
                TransportCommand::Play => match self.state {
                    TransportState::Stopped => self.set_state(TransportState::Rolling),
                    TransportState::Seeking => self.resume = TransportState::Rolling,
                    _ => {}
                },
                TransportCommand::Stop => match self.state {
                    TransportState::Rolling | TransportState::Recording => {
                        self.set_state(TransportState::Stopped)
                    }
                    TransportState::Seeking => self.resume = TransportState::Stopped,
                    TransportState::Stopped => {}
                },
                TransportCommand::Record(armed) => {
                    self.record_armed = armed;
                    if !armed && self.state == TransportState::Recording {
                        self.set_state(TransportState::Rolling);
                    }
                }
                TransportCommand::Locate(frame) => {
                    if self.state != TransportState::Seeking {
                        self.resume = if self.state.is_moving() {
                            TransportState::Rolling
                        } else {
                            TransportState::Stopped
                        };
                        self.set_state(TransportState::Seeking);
                    }
                    self.pending_seek = Some(frame);
                    seek_requested = true;
                }
                TransportCommand::SetLooping(looping) => self.looping = looping,
            }
        }
        seek_requested
    }

    /// Enters or leaves Recording. Without a punch range, arming while
    /// rolling records straight away.
    fn apply_punch(&mut self, frame: u64) {
        let in_window = self
            .snapshot
            .punch_range
            .is_none_or(|range| range.contains(frame));
        let record = self.record_armed && in_window;
        match (self.state, record) {
            (TransportState::Rolling, true) => self.set_state(TransportState::Recording),
            (TransportState::Recording, false) => self.set_state(TransportState::Rolling),
            _ => {}
        }
    }

    /// Sends curve values for this cycle; returns how many did not fit.
    fn apply_automation(&mut self, frame: u64) -> u64 {
        let recording = self.state == TransportState::Recording;
        let mut dropped = 0;
        for entry in &self.snapshot.curves {
            let curve = &entry.curve;
            // While recording, a record-enabled curve on an armed track
            // follows the live control.
            let overridden = recording && curve.is_record_enabled() && self.snapshot.is_armed(entry.track);
            if !curve.is_play_enabled() || overridden {
                continue;
            }
            let change = ParamChange {
                track: entry.track,
                param: curve.param(),
                frame,
                value: curve.evaluate(frame),
            };
            if self.queues.params.push(change).is_err() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Passes live controls on to the plugin host and, while recording,
    /// captures them for armed tracks whose curve is record-enabled.
    fn forward_controls(&mut self, cycle_start: u64, frames: usize) -> u64 {
        let recording = self.state == TransportState::Recording;
        let last = frames.saturating_sub(1) as u64;
        let mut dropped = 0;
        while let Ok(event) = self.queues.controls.pop() {
            let frame = cycle_start + (event.offset as u64).min(last);
            let change = ParamChange {
                track: event.track,
                param: event.param,
                frame,
                value: event.value,
            };
            if self.queues.params.push(change).is_err() {
                dropped += 1;
            }

            if !recording {
                continue;
            }
            let capture = self.snapshot.is_armed(event.track)
                && self
                    .snapshot
                    .curve(event.track, event.param)
                    .is_some_and(|c| c.is_record_enabled());
            if capture {
                let captured = CapturedEvent {
                    track: event.track,
                    param: event.param,
                    frame,
                    value: event.value,
                };
                if self.queues.captures.push(captured).is_err() {
                    let _ = self.queues.status.push(Status::CaptureOverflow);
                }
            }
        }
        dropped
    }

    /// Next cycle start. Crossing the loop end continues from the loop start
    /// with the overshoot carried over, so no frame is repeated or skipped.
    fn advance(&self, start: u64, frames: u64) -> u64 {
        let next = start + frames;
        if !self.looping {
            return next;
        }
        match self.snapshot.loop_range {
            Some(range) if start < range.end && next >= range.end => {
                range.start + (next - range.end) % range.len()
            }
            _ => next,
        }
    }
}
