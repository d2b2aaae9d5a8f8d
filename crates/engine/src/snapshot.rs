use daw_core::{AutomationCurve, BusId, Clip, FrameRange, ParamId, Session, TrackId};
use daw_transport::{Position, TempoMap};

/// Per-track data the real-time side needs for one cycle.
#[derive(Debug, Clone)]
pub struct TrackMix {
    pub id: TrackId,
    pub audible: bool,
    pub armed: bool,
    pub monitoring: bool,
    pub output: Option<BusId>,
    /// Audible clips only, in timeline order.
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone)]
pub struct TrackCurve {
    pub track: TrackId,
    pub curve: AutomationCurve,
}

/// Immutable copy of the session state published to the real-time thread.
///
/// A new snapshot is built after every edit and swapped in whole; the
/// real-time side never sees a half-applied command.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub revision: u64,
    pub tempo: TempoMap,
    pub loop_range: Option<FrameRange>,
    pub punch_range: Option<FrameRange>,
    pub tracks: Vec<TrackMix>,
    /// Curves with playback or recording enabled.
    pub curves: Vec<TrackCurve>,
}

impl SessionSnapshot {
    pub fn from_session(session: &Session, revision: u64) -> Self {
        let graph = session.graph();
        let audibility = graph.audibility();

        let tracks = graph
            .tracks()
            .iter()
            .zip(audibility)
            .map(|(track, (_, audible))| {
                let state = track.state();
                TrackMix {
                    id: track.id,
                    audible,
                    armed: state.armed,
                    monitoring: state.monitoring,
                    output: track.output,
                    clips: track.audible_clips().cloned().collect(),
                }
            })
            .collect();

        let curves = graph
            .tracks()
            .iter()
            .flat_map(|track| {
                track
                    .curves()
                    .filter(|c| c.is_play_enabled() || c.is_record_enabled())
                    .map(move |curve| TrackCurve {
                        track: track.id,
                        curve: curve.clone(),
                    })
            })
            .collect();

        Self {
            revision,
            tempo: session.tempo().clone(),
            loop_range: session.loop_range(),
            punch_range: session.punch_range(),
            tracks,
            curves,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.tempo.sample_rate()
    }

    pub fn position(&self, frame: u64) -> Position {
        self.tempo.position(frame)
    }

    pub fn curve(&self, track: TrackId, param: ParamId) -> Option<&AutomationCurve> {
        self.curves
            .iter()
            .find(|c| c.track == track && c.curve.param() == param)
            .map(|c| &c.curve)
    }

    pub fn is_audible(&self, track: TrackId) -> bool {
        self.tracks.iter().any(|t| t.id == track && t.audible)
    }

    pub fn is_armed(&self, track: TrackId) -> bool {
        self.tracks.iter().any(|t| t.id == track && t.armed)
    }
}
