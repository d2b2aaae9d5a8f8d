//! Conversions between sample frames, seconds and bar/beat/tick positions.
//!
//! Everything here is a pure function of the [`TempoMap`] passed in.

use serde::{Deserialize, Serialize};

use crate::tempo::TempoMap;

/// Ticks per beat.
pub const PPQN: u32 = 960;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.numerator >= 1 && self.denominator >= 1 && self.denominator.is_power_of_two()
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }

    pub fn ticks_per_bar(&self) -> u64 {
        PPQN as u64 * self.numerator as u64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<(u32, u32)> for TimeSignature {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

impl From<TimeSignature> for (u32, u32) {
    fn from(ts: TimeSignature) -> Self {
        (ts.numerator, ts.denominator)
    }
}

/// Musical position. `bar` and `beat` are 1-based; `tick` is the fractional
/// tick offset inside the beat, in `[0, PPQN)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbt {
    pub bar: u32,
    pub beat: u32,
    pub tick: f64,
}

impl Bbt {
    pub fn new(bar: u32, beat: u32, tick: f64) -> Self {
        Self { bar, beat, tick }
    }
}

impl std::fmt::Display for Bbt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{:03}", self.bar, self.beat, self.tick.floor() as u32)
    }
}

/// A sample frame together with its musical projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    frame: u64,
    bbt: Bbt,
}

impl Position {
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn bbt(&self) -> Bbt {
        self.bbt
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.bbt, self.frame)
    }
}

pub fn to_position(map: &TempoMap, frame: u64) -> Position {
    let index = map.find_segment(frame);
    let node = &map.nodes()[index];
    let ticks_in = (frame - node.frame) as f64 * map.segment_ticks_per_frame(index);

    let whole_beats = (ticks_in / PPQN as f64).floor();
    let tick = (ticks_in - whole_beats * PPQN as f64).max(0.0);
    let whole_beats = whole_beats as u64;
    let beats_per_bar = node.numerator as u64;

    let bar = map.segment_bar(index) + whole_beats / beats_per_bar;
    let beat = whole_beats % beats_per_bar;

    Position {
        frame,
        bbt: Bbt {
            bar: (bar + 1) as u32,
            beat: (beat + 1) as u32,
            tick,
        },
    }
}

/// Frame for a musical position, rounded to the nearest frame.
pub fn to_frame(map: &TempoMap, bbt: Bbt) -> u64 {
    let bar = bbt.bar.saturating_sub(1) as u64;
    let index = map.segment_for_bar(bar);
    let node = &map.nodes()[index];

    let beats = (bar - map.segment_bar(index)) * node.numerator as u64
        + bbt.beat.saturating_sub(1) as u64;
    let ticks = beats as f64 * PPQN as f64 + bbt.tick.max(0.0);

    node.frame + (ticks * map.segment_frames_per_tick(index)).round() as u64
}

pub fn add_duration(map: &TempoMap, position: Position, frames: u64) -> Position {
    to_position(map, position.frame.saturating_add(frames))
}

pub fn frames_to_seconds(frames: u64, sample_rate: u32) -> f64 {
    frames as f64 / sample_rate as f64
}

pub fn seconds_to_frames(seconds: f64, sample_rate: u32) -> u64 {
    (seconds.max(0.0) * sample_rate as f64).round() as u64
}

impl TempoMap {
    pub fn position(&self, frame: u64) -> Position {
        to_position(self, frame)
    }

    pub fn frame_of(&self, bar: u32, beat: u32, tick: f64) -> u64 {
        to_frame(self, Bbt::new(bar, beat, tick))
    }
}
