use serde::{Deserialize, Serialize};

use daw_transport::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u64);

/// Opaque reference to decoded source material (audio file or MIDI sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TakeGroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Midi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FadeCurve {
    #[default]
    Linear,
    EqualPower,
    SCurve,
    Exponential,
    Logarithmic,
}

impl FadeCurve {
    /// Rising gain shape over `t` in `[0, 1]`. Fade-outs use the mirror image,
    /// so a fade-out and fade-in of the same curve are complementary.
    pub fn shape(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => t,
            FadeCurve::EqualPower => (t * std::f64::consts::FRAC_PI_2).sin(),
            FadeCurve::SCurve => (1.0 - (t * std::f64::consts::PI).cos()) * 0.5,
            FadeCurve::Exponential => t * t,
            FadeCurve::Logarithmic => (1.0 + t * 9.0).log10(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FadeEdge {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Fade {
    pub length: u64,
    pub curve: FadeCurve,
}

impl Fade {
    pub fn new(length: u64, curve: FadeCurve) -> Self {
        Self { length, curve }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.length > 0
    }

    /// Gain `frames` into a fade-in.
    pub fn gain_in(&self, frames: u64) -> f64 {
        if self.length == 0 || frames >= self.length {
            return 1.0;
        }
        self.curve.shape(frames as f64 / self.length as f64)
    }

    /// Gain `frames` into a fade-out.
    pub fn gain_out(&self, frames: u64) -> f64 {
        if self.length == 0 {
            return 1.0;
        }
        if frames >= self.length {
            return 0.0;
        }
        self.curve.shape(1.0 - frames as f64 / self.length as f64)
    }

    fn clamped(self, length: u64) -> Self {
        Self {
            length: self.length.min(length),
            curve: self.curve,
        }
    }
}

/// Non-destructive window onto source material, placed on a track.
///
/// `start` and `length` are timeline frames; `offset` is measured in source
/// frames. With a time-stretch ratio `r`, a clip of `length` timeline frames
/// consumes `floor(length / r)` source frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub kind: TrackKind,
    pub name: String,
    pub source: SourceId,
    pub source_length: u64,
    pub start: u64,
    pub offset: u64,
    pub length: u64,
    pub gain_db: f64,
    pub fade_in: Fade,
    pub fade_out: Fade,
    pub time_stretch: f64,
    pub pitch_shift: f64,
    pub take_group: Option<TakeGroupId>,
}

impl Clip {
    /// A clip spanning the whole source, starting at frame 0.
    pub fn new(id: ClipId, kind: TrackKind, source: SourceId, source_length: u64) -> Self {
        Self {
            id,
            kind,
            name: format!("Clip {}", id.0),
            source,
            source_length,
            start: 0,
            offset: 0,
            length: source_length,
            gain_db: 0.0,
            fade_in: Fade::none(),
            fade_out: Fade::none(),
            time_stretch: 1.0,
            pitch_shift: 0.0,
            take_group: None,
        }
    }

    pub fn at(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_window(mut self, offset: u64, length: u64) -> Self {
        self.offset = offset;
        self.length = length;
        self
    }

    /// Exclusive end frame on the timeline.
    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.start && frame < self.end()
    }

    /// Ranges overlap if start_a < end_b && start_b < end_a.
    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start < end && start < self.end()
    }

    /// Source frames consumed by `length` timeline frames.
    pub fn source_span(&self, length: u64) -> u64 {
        (length as f64 / self.time_stretch).floor() as u64
    }

    pub fn gain_linear(&self) -> f64 {
        10f64.powf(self.gain_db / 20.0)
    }

    /// Fade envelope at a timeline frame; 0.0 outside the clip.
    pub fn fade_gain_at(&self, frame: u64) -> f64 {
        if !self.contains(frame) {
            return 0.0;
        }
        let rel = frame - self.start;
        let mut gain = self.fade_in.gain_in(rel);
        if self.fade_out.is_active() {
            let fade_start = self.length.saturating_sub(self.fade_out.length);
            if rel >= fade_start {
                gain *= self.fade_out.gain_out(rel - fade_start);
            }
        }
        gain
    }

    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(Error::InvariantViolation(format!(
                "clip {} has zero length",
                self.id.0
            )));
        }
        if !(self.time_stretch.is_finite() && self.time_stretch > 0.0) {
            return Err(Error::InvariantViolation(format!(
                "clip {} has invalid time-stretch ratio {}",
                self.id.0, self.time_stretch
            )));
        }
        if self.kind == TrackKind::Midi && (self.time_stretch != 1.0 || self.pitch_shift != 0.0) {
            return Err(Error::InvariantViolation(format!(
                "MIDI clip {} cannot be time-stretched or pitch-shifted",
                self.id.0
            )));
        }
        if self.offset + self.source_span(self.length) > self.source_length {
            return Err(Error::InvariantViolation(format!(
                "clip {} reads past the end of its source ({} + {} > {})",
                self.id.0,
                self.offset,
                self.source_span(self.length),
                self.source_length
            )));
        }
        if !self.gain_db.is_finite() || !self.pitch_shift.is_finite() {
            return Err(Error::InvariantViolation(format!(
                "clip {} has a non-finite gain or pitch",
                self.id.0
            )));
        }
        Ok(())
    }

    pub(crate) fn clamp_fades(&mut self) {
        self.fade_in = self.fade_in.clamped(self.length);
        self.fade_out = self.fade_out.clamped(self.length);
    }
}

/// Alternate recordings sharing one slot; exactly one is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeGroup {
    pub id: TakeGroupId,
    /// Take order, first to last.
    pub takes: Vec<ClipId>,
    pub active: usize,
}

impl TakeGroup {
    pub fn new(id: TakeGroupId, takes: Vec<ClipId>) -> Result<Self> {
        if takes.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "take group {} has no takes",
                id.0
            )));
        }
        let active = takes.len() - 1;
        Ok(Self { id, takes, active })
    }

    pub fn active_take(&self) -> ClipId {
        self.takes[self.active]
    }

    pub fn is_active(&self, clip: ClipId) -> bool {
        self.active_take() == clip
    }

    pub fn len(&self) -> usize {
        self.takes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }
}
