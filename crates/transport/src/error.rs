use serde::{Deserialize, Serialize};

/// Reasons a session edit can be rejected.
///
/// Every variant except [`Error::RealtimeGlitch`] is produced before any
/// mutation happens, so a rejected edit never leaves the session half-applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum Error {
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("edit locked: {0}")]
    EditLocked(String),

    #[error("clips cannot be merged: {0}")]
    Unmergeable(String),

    #[error("bus {bus} is still referenced by track {track}")]
    BusInUse { bus: u64, track: u64 },

    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("real-time glitch ({xruns} xruns so far)")]
    RealtimeGlitch { xruns: u64 },
}

impl Error {
    pub fn not_found(kind: &str, id: u64) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            id,
        }
    }

    /// Stable reason code shown to the user when an action is rejected.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Error::InvariantViolation(_) => "invariant-violation",
            Error::EditLocked(_) => "edit-locked",
            Error::Unmergeable(_) => "unmergeable",
            Error::BusInUse { .. } => "bus-in-use",
            Error::NotFound { .. } => "not-found",
            Error::InvalidArgument(_) => "invalid-argument",
            Error::RealtimeGlitch { .. } => "realtime-glitch",
        }
    }

    /// Glitches are reported but never abort playback.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::RealtimeGlitch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
