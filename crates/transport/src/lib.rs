//! Session timebase: sample frames, musical time and the tempo map.

pub mod error;
pub mod tempo;
pub mod time;

pub use error::{Error, Result};
pub use tempo::{TempoMap, TempoNode};
pub use time::{
    Bbt, PPQN, Position, TimeSignature, add_duration, frames_to_seconds, seconds_to_frames,
    to_frame, to_position,
};
