//! Project files: a [`Session`] together with its undo history.
//!
//! Files are written as pretty JSON by default or as MessagePack with
//! [`save_project_packed`]. Loading accepts either.

mod load;
mod save;

use serde::{Deserialize, Serialize};

use daw_core::{History, Session};

pub use load::{ProjectMetadata, load_project, load_project_metadata};
pub use save::{save_project, save_project_packed};

/// Format version written into every file.
pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub version: u32,
    pub session: Session,
    pub history: History,
}

impl ProjectFile {
    pub fn new(session: Session, history: History) -> Self {
        Self {
            version: PROJECT_VERSION,
            session,
            history,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] rmp_serde::encode::Error),

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] rmp_serde::decode::Error),

    #[error("Unsupported project version {found} (newest known is {PROJECT_VERSION})")]
    UnsupportedVersion { found: u32 },

    #[error("Invalid session: {0}")]
    Invalid(#[from] daw_core::Error),
}
