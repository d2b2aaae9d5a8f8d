pub mod automation;
pub mod clip;
pub mod clip_ops;
pub mod command;
pub mod graph;
pub mod record;
pub mod session;
pub mod track;

pub use automation::{AutomationCurve, CurveFlags, CurveNode, Interpolation, ParamId, ValueRange};
pub use clip::{Clip, ClipId, Fade, FadeCurve, FadeEdge, SourceId, TakeGroup, TakeGroupId, TrackKind};
pub use command::{Command, History, HistoryEntry, TakeSelect};
pub use graph::{ChainOwner, TrackBusGraph};
pub use record::{CapturedEvent, RecordPass};
pub use session::{FrameRange, Marker, MarkerId, Session};
pub use track::{Bus, BusId, PluginChain, PluginHandle, Track, TrackFlag, TrackId, TrackState};

pub use daw_transport::{
    Bbt, Error, PPQN, Position, Result, TempoMap, TempoNode, TimeSignature,
};
