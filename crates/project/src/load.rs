use crate::{PROJECT_VERSION, ProjectError, ProjectFile};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Summary of a project file, read without validating or starting an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectMetadata {
    pub name: String,
    pub sample_rate: u32,
    /// Tempo at the session start.
    pub tempo: f64,
    pub time_signature: (u32, u32),
    pub track_count: usize,
    pub bus_count: usize,
    pub clip_count: usize,
}

fn load_project_data(path: &Path) -> Result<ProjectFile, ProjectError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    // Try JSON first, fall back to MessagePack
    let project: ProjectFile = serde_json::from_reader(reader).or_else(|_| {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        rmp_serde::decode::from_read(reader).map_err(ProjectError::from)
    })?;

    if project.version > PROJECT_VERSION {
        return Err(ProjectError::UnsupportedVersion {
            found: project.version,
        });
    }
    Ok(project)
}

pub fn load_project_metadata(path: &Path) -> Result<ProjectMetadata, ProjectError> {
    let project = load_project_data(path)?;
    let session = &project.session;
    let graph = session.graph();
    let first = session.tempo().node(0);

    Ok(ProjectMetadata {
        name: session.name.clone(),
        sample_rate: session.sample_rate(),
        tempo: first.map_or(0.0, |n| n.bpm),
        time_signature: first.map_or((4, 4), |n| (n.numerator, n.denominator)),
        track_count: graph.tracks().len(),
        bus_count: graph.buses().len(),
        clip_count: graph.tracks().iter().map(|t| t.clips().len()).sum(),
    })
}

/// Reads a project and checks every session invariant before handing it out.
pub fn load_project(path: &Path) -> Result<ProjectFile, ProjectError> {
    let project = load_project_data(path)?;
    project.session.validate()?;

    log::info!(
        "loaded '{}' from {} ({} undo steps)",
        project.session.name,
        path.display(),
        project.history.undo_len()
    );
    Ok(project)
}
