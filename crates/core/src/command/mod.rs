//! Reversible session edits.
//!
//! A [`Command`] is the only way to change a [`Session`]. Applying one checks
//! every precondition before touching state and returns the command that
//! undoes it; a rejected command leaves the session exactly as it was.

mod edit;
mod history;

pub use edit::*;
pub use history::{History, HistoryEntry};

use serde::{Deserialize, Serialize};

use daw_transport::{Result, TempoNode};

use crate::automation::{AutomationCurve, CurveFlags, CurveNode, ParamId};
use crate::clip::{Clip, ClipId, TakeGroup, TakeGroupId};
use crate::graph::ChainOwner;
use crate::session::{FrameRange, Marker, MarkerId, Session};
use crate::track::{Bus, BusId, PluginHandle, Track, TrackFlag, TrackId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    InsertTempoNode { node: TempoNode },
    UpdateTempoNode { index: usize, node: TempoNode },
    RemoveTempoNode { index: usize },

    AddMarker { marker: Marker },
    RemoveMarker { id: MarkerId },
    MoveMarker { id: MarkerId, frame: u64 },

    SetLoopRange { range: Option<FrameRange> },
    SetPunchRange { range: Option<FrameRange> },

    InsertTrack { index: usize, track: Box<Track> },
    RemoveTrack { track: TrackId },
    MoveTrack { track: TrackId, index: usize },
    RenameTrack { track: TrackId, name: String },
    SetTrackFlag { track: TrackId, flag: TrackFlag, value: bool },
    SetTrackRouting { track: TrackId, input: Option<BusId>, output: Option<BusId> },

    InsertBus { index: usize, bus: Box<Bus> },
    RemoveBus { bus: BusId },
    MoveBus { bus: BusId, index: usize },
    SetBusMix { bus: BusId, gain_db: f64, pan: f64 },

    InsertPlugin { chain: ChainOwner, index: usize, plugin: PluginHandle },
    RemovePlugin { chain: ChainOwner, index: usize },
    MovePlugin { chain: ChainOwner, from: usize, to: usize },

    /// Atomically removes and inserts clips on one track.
    ReplaceClips { track: TrackId, remove: Vec<ClipId>, insert: Vec<Clip> },
    SetTakeGroup { track: TrackId, id: TakeGroupId, group: Option<TakeGroup> },

    SetCurve { track: TrackId, param: ParamId, curve: Option<Box<AutomationCurve>> },
    SetCurveNode { track: TrackId, param: ParamId, node: CurveNode },
    RemoveCurveNode { track: TrackId, param: ParamId, frame: u64 },
    SetCurveFlags { track: TrackId, param: ParamId, flags: CurveFlags },

    /// Several commands applied as one; rolled back as a whole on failure.
    Macro { label: String, commands: Vec<Command> },
}

impl Command {
    /// Applies the command and returns its inverse.
    pub fn apply(&self, session: &mut Session) -> Result<Command> {
        let inverse = match self {
            Command::InsertTempoNode { node } => {
                let index = session.tempo_mut().insert_node(*node)?;
                Command::RemoveTempoNode { index }
            }
            Command::UpdateTempoNode { index, node } => {
                let old = session.tempo_mut().update_node(*index, *node)?;
                Command::UpdateTempoNode {
                    index: *index,
                    node: old,
                }
            }
            Command::RemoveTempoNode { index } => {
                let node = session.tempo_mut().remove_node(*index)?;
                Command::InsertTempoNode { node }
            }

            Command::AddMarker { marker } => {
                session.add_marker(marker.clone())?;
                Command::RemoveMarker { id: marker.id }
            }
            Command::RemoveMarker { id } => {
                let marker = session.remove_marker(*id)?;
                Command::AddMarker { marker }
            }
            Command::MoveMarker { id, frame } => {
                let mut marker = session.remove_marker(*id)?;
                let old = std::mem::replace(&mut marker.frame, *frame);
                session.add_marker(marker)?;
                Command::MoveMarker { id: *id, frame: old }
            }

            Command::SetLoopRange { range } => Command::SetLoopRange {
                range: session.set_loop_range(*range)?,
            },
            Command::SetPunchRange { range } => Command::SetPunchRange {
                range: session.set_punch_range(*range)?,
            },

            Command::InsertTrack { index, track } => {
                session.graph_mut().insert_track(*index, track.as_ref().clone())?;
                Command::RemoveTrack { track: track.id }
            }
            Command::RemoveTrack { track } => {
                let (index, track) = session.graph_mut().remove_track(*track)?;
                Command::InsertTrack {
                    index,
                    track: Box::new(track),
                }
            }
            Command::MoveTrack { track, index } => {
                let from = session.graph_mut().move_track(*track, *index)?;
                Command::MoveTrack {
                    track: *track,
                    index: from,
                }
            }
            Command::RenameTrack { track, name } => {
                let old = session.graph_mut().rename_track(*track, name.clone())?;
                Command::RenameTrack {
                    track: *track,
                    name: old,
                }
            }
            Command::SetTrackFlag { track, flag, value } => {
                let old = session.graph_mut().set_track_flag(*track, *flag, *value)?;
                Command::SetTrackFlag {
                    track: *track,
                    flag: *flag,
                    value: old,
                }
            }
            Command::SetTrackRouting { track, input, output } => {
                let (input, output) = session.graph_mut().set_track_routing(*track, *input, *output)?;
                Command::SetTrackRouting {
                    track: *track,
                    input,
                    output,
                }
            }

            Command::InsertBus { index, bus } => {
                session.graph_mut().insert_bus(*index, bus.as_ref().clone())?;
                Command::RemoveBus { bus: bus.id }
            }
            Command::RemoveBus { bus } => {
                let (index, bus) = session.graph_mut().remove_bus(*bus)?;
                Command::InsertBus {
                    index,
                    bus: Box::new(bus),
                }
            }
            Command::MoveBus { bus, index } => {
                let from = session.graph_mut().move_bus(*bus, *index)?;
                Command::MoveBus {
                    bus: *bus,
                    index: from,
                }
            }
            Command::SetBusMix { bus, gain_db, pan } => {
                let (gain_db, pan) = session.graph_mut().set_bus_mix(*bus, *gain_db, *pan)?;
                Command::SetBusMix {
                    bus: *bus,
                    gain_db,
                    pan,
                }
            }

            Command::InsertPlugin { chain, index, plugin } => {
                session.graph_mut().insert_plugin(*chain, *index, *plugin)?;
                Command::RemovePlugin {
                    chain: *chain,
                    index: *index,
                }
            }
            Command::RemovePlugin { chain, index } => {
                let plugin = session.graph_mut().remove_plugin(*chain, *index)?;
                Command::InsertPlugin {
                    chain: *chain,
                    index: *index,
                    plugin,
                }
            }
            Command::MovePlugin { chain, from, to } => {
                session.graph_mut().move_plugin(*chain, *from, *to)?;
                Command::MovePlugin {
                    chain: *chain,
                    from: *to,
                    to: *from,
                }
            }

            Command::ReplaceClips { track, remove, insert } => {
                let removed = session
                    .graph_mut()
                    .track_mut(*track)?
                    .replace_clips(remove, insert)?;
                Command::ReplaceClips {
                    track: *track,
                    remove: insert.iter().map(|c| c.id).collect(),
                    insert: removed,
                }
            }
            Command::SetTakeGroup { track, id, group } => {
                let old = session
                    .graph_mut()
                    .track_mut(*track)?
                    .set_take_group(*id, group.clone())?;
                Command::SetTakeGroup {
                    track: *track,
                    id: *id,
                    group: old,
                }
            }

            Command::SetCurve { track, param, curve } => {
                let old = session
                    .graph_mut()
                    .track_mut(*track)?
                    .set_curve(*param, curve.as_deref().cloned())?;
                Command::SetCurve {
                    track: *track,
                    param: *param,
                    curve: old.map(Box::new),
                }
            }
            Command::SetCurveNode { track, param, node } => {
                let curve = session.graph_mut().track_mut(*track)?.curve_mut(*param)?;
                match curve.set_node(*node)? {
                    Some(old) => Command::SetCurveNode {
                        track: *track,
                        param: *param,
                        node: old,
                    },
                    None => Command::RemoveCurveNode {
                        track: *track,
                        param: *param,
                        frame: node.frame,
                    },
                }
            }
            Command::RemoveCurveNode { track, param, frame } => {
                let curve = session.graph_mut().track_mut(*track)?.curve_mut(*param)?;
                let node = curve.remove_node_at(*frame)?;
                Command::SetCurveNode {
                    track: *track,
                    param: *param,
                    node,
                }
            }
            Command::SetCurveFlags { track, param, flags } => {
                let curve = session.graph_mut().track_mut(*track)?.curve_mut(*param)?;
                let old = curve.set_flags(*flags);
                Command::SetCurveFlags {
                    track: *track,
                    param: *param,
                    flags: old,
                }
            }

            Command::Macro { label, commands } => {
                let mut inverses = Vec::with_capacity(commands.len());
                for command in commands {
                    match command.apply(session) {
                        Ok(inverse) => inverses.push(inverse),
                        Err(err) => {
                            rollback(session, inverses);
                            return Err(err);
                        }
                    }
                }
                inverses.reverse();
                Command::Macro {
                    label: label.clone(),
                    commands: inverses,
                }
            }
        };
        Ok(inverse)
    }

    /// Short human-readable description, shown in undo/redo menus.
    pub fn label(&self) -> String {
        match self {
            Command::InsertTempoNode { .. } => "Add Tempo Change".into(),
            Command::UpdateTempoNode { .. } => "Edit Tempo Change".into(),
            Command::RemoveTempoNode { .. } => "Remove Tempo Change".into(),
            Command::AddMarker { .. } => "Add Marker".into(),
            Command::RemoveMarker { .. } => "Remove Marker".into(),
            Command::MoveMarker { .. } => "Move Marker".into(),
            Command::SetLoopRange { .. } => "Set Loop Range".into(),
            Command::SetPunchRange { .. } => "Set Punch Range".into(),
            Command::InsertTrack { .. } => "Add Track".into(),
            Command::RemoveTrack { .. } => "Remove Track".into(),
            Command::MoveTrack { .. } => "Move Track".into(),
            Command::RenameTrack { .. } => "Rename Track".into(),
            Command::SetTrackFlag { flag, value, .. } => {
                let verb = match (flag, value) {
                    (TrackFlag::Armed, true) => "Arm",
                    (TrackFlag::Armed, false) => "Disarm",
                    (TrackFlag::Muted, true) => "Mute",
                    (TrackFlag::Muted, false) => "Unmute",
                    (TrackFlag::Soloed, true) => "Solo",
                    (TrackFlag::Soloed, false) => "Unsolo",
                    (TrackFlag::Monitoring, true) => "Monitor",
                    (TrackFlag::Monitoring, false) => "Stop Monitoring",
                };
                format!("{verb} Track")
            }
            Command::SetTrackRouting { .. } => "Route Track".into(),
            Command::InsertBus { .. } => "Add Bus".into(),
            Command::RemoveBus { .. } => "Remove Bus".into(),
            Command::MoveBus { .. } => "Move Bus".into(),
            Command::SetBusMix { .. } => "Bus Mix".into(),
            Command::InsertPlugin { .. } => "Insert Plugin".into(),
            Command::RemovePlugin { .. } => "Remove Plugin".into(),
            Command::MovePlugin { .. } => "Move Plugin".into(),
            Command::ReplaceClips { .. } => "Edit Clips".into(),
            Command::SetTakeGroup { .. } => "Select Take".into(),
            Command::SetCurve { curve: Some(_), .. } => "Add Automation".into(),
            Command::SetCurve { curve: None, .. } => "Remove Automation".into(),
            Command::SetCurveNode { .. } => "Automation Point".into(),
            Command::RemoveCurveNode { .. } => "Remove Automation Point".into(),
            Command::SetCurveFlags { .. } => "Automation Mode".into(),
            Command::Macro { label, .. } => label.clone(),
        }
    }

    pub fn with_label(self, label: impl Into<String>) -> Command {
        match self {
            Command::Macro { commands, .. } => Command::Macro {
                label: label.into(),
                commands,
            },
            other => Command::Macro {
                label: label.into(),
                commands: vec![other],
            },
        }
    }
}

/// Undoes already-applied parts of a failed macro, newest first.
fn rollback(session: &mut Session, inverses: Vec<Command>) {
    for inverse in inverses.into_iter().rev() {
        if let Err(err) = inverse.apply(session) {
            log::error!("rollback of '{}' failed: {err}", inverse.label());
        }
    }
}
