use crate::{ProjectError, ProjectFile};
use daw_core::{History, Session};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn project_file(session: &Session, history: &History) -> ProjectFile {
    ProjectFile::new(session.clone(), history.clone())
}

/// Writes the session and its history as pretty JSON.
pub fn save_project(path: &Path, session: &Session, history: &History) -> Result<(), ProjectError> {
    let project = project_file(session, history);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &project)?;
    writer.flush()?;

    log::info!("saved '{}' to {}", session.name, path.display());
    Ok(())
}

/// Writes the session and its history as MessagePack.
pub fn save_project_packed(path: &Path, session: &Session, history: &History) -> Result<(), ProjectError> {
    let project = project_file(session, history);

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    rmp_serde::encode::write_named(&mut writer, &project)?;
    writer.flush()?;

    log::info!("saved '{}' to {} (packed)", session.name, path.display());
    Ok(())
}
