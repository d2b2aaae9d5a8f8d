//! Builders that turn user-level edits into primitive [`Command`]s.
//!
//! These read the session to work out exact before/after values and fresh
//! ids; nothing here mutates it.

use daw_transport::{Error, Result, TempoNode};

use super::Command;
use crate::automation::{AutomationCurve, CurveFlags, ParamId, ValueRange};
use crate::clip::{Clip, ClipId, FadeCurve, FadeEdge, TakeGroupId, TrackKind};
use crate::clip_ops;
use crate::session::{FrameRange, Marker, Session};
use crate::track::{Bus, BusId, Track, TrackId};

/// Which take of a take group to make active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeSelect {
    First,
    Previous,
    Next,
    Last,
}

/// Curve applied where a moved clip lands on a neighbour.
pub const AUTO_CROSS_FADE: FadeCurve = FadeCurve::EqualPower;

pub fn add_track(session: &Session, kind: TrackKind, name: impl Into<String>) -> Command {
    Command::InsertTrack {
        index: session.graph().tracks().len(),
        track: Box::new(Track::new(session.next_track_id(), name, kind)),
    }
}

/// Copies a track with its clips, takes and automation right below the
/// original. Every copied clip and take group gets a fresh id.
pub fn duplicate_track(session: &Session, id: TrackId) -> Result<Command> {
    let graph = session.graph();
    let index = graph.track_index(id)?;
    let source = graph.track(id)?;

    let mut copy = Track::new(session.next_track_id(), format!("{} copy", source.name), source.kind);
    copy.input = source.input;
    copy.output = source.output;
    copy.plugins = source.plugins.clone();

    let mut next_clip = session.next_clip_id().0;
    let mut next_group = session.next_take_group_id().0;
    let mut clip_map = Vec::new();
    let mut group_map = Vec::new();
    for group in source.takes() {
        group_map.push((group.id, TakeGroupId(next_group)));
        next_group += 1;
    }
    let group_for = |old: TakeGroupId| {
        group_map
            .iter()
            .find(|(from, _)| *from == old)
            .map(|(_, to)| *to)
    };

    let mut clips = Vec::with_capacity(source.clips().len());
    for clip in source.clips() {
        let mut clip = clip.clone();
        clip_map.push((clip.id, ClipId(next_clip)));
        clip.id = ClipId(next_clip);
        next_clip += 1;
        clip.take_group = clip.take_group.and_then(group_for);
        clips.push(clip);
    }
    let clip_for = |old: ClipId| {
        clip_map
            .iter()
            .find(|(from, _)| *from == old)
            .map(|(_, to)| *to)
            .ok_or_else(|| Error::not_found("clip", old.0))
    };

    copy.replace_clips(&[], &clips)?;
    for group in source.takes() {
        let mut group = group.clone();
        group.id = group_for(group.id).ok_or_else(|| Error::not_found("take group", group.id.0))?;
        group.takes = group.takes.iter().map(|c| clip_for(*c)).collect::<Result<_>>()?;
        copy.set_take_group(group.id, Some(group))?;
    }
    for curve in source.curves() {
        let mut curve = curve.clone();
        // A copy starts unlocked so it can be edited independently.
        curve.set_flags(CurveFlags {
            locked: false,
            ..curve.flags()
        });
        copy.set_curve(curve.param(), Some(curve))?;
    }

    Ok(Command::InsertTrack {
        index: index + 1,
        track: Box::new(copy),
    }
    .with_label("Duplicate Track"))
}

pub fn add_bus(session: &Session, kind: TrackKind, name: impl Into<String>) -> Command {
    Command::InsertBus {
        index: session.graph().buses().len(),
        bus: Box::new(Bus::new(session.next_bus_id(), name, kind)),
    }
}

pub fn duplicate_bus(session: &Session, id: BusId) -> Result<Command> {
    let graph = session.graph();
    let index = graph.bus_index(id)?;
    let mut copy = graph.bus(id)?.clone();
    copy.id = session.next_bus_id();
    copy.name = format!("{} copy", copy.name);
    Ok(Command::InsertBus {
        index: index + 1,
        bus: Box::new(copy),
    }
    .with_label("Duplicate Bus"))
}

pub fn add_marker(session: &Session, name: impl Into<String>, frame: u64) -> Command {
    Command::AddMarker {
        marker: Marker {
            id: session.next_marker_id(),
            name: name.into(),
            frame,
        },
    }
}

/// Sets the tempo from `frame` onward: edits a node sitting exactly there,
/// otherwise inserts one that keeps the current meter.
pub fn set_tempo(session: &Session, frame: u64, bpm: f64) -> Command {
    let map = session.tempo();
    let index = map.find_segment(frame);
    let current = map.nodes()[index];
    let node = TempoNode::new(frame, bpm, current.numerator, current.denominator);
    if current.frame == frame {
        Command::UpdateTempoNode { index, node }
    } else {
        Command::InsertTempoNode { node }
    }
}

pub fn set_loop_range(start: u64, end: u64) -> Result<Command> {
    Ok(Command::SetLoopRange {
        range: Some(FrameRange::new(start, end)?),
    })
}

pub fn set_punch_range(start: u64, end: u64) -> Result<Command> {
    Ok(Command::SetPunchRange {
        range: Some(FrameRange::new(start, end)?),
    })
}

pub fn add_curve(track: TrackId, param: ParamId, range: ValueRange) -> Command {
    Command::SetCurve {
        track,
        param,
        curve: Some(Box::new(AutomationCurve::new(param, range))),
    }
}

/// Changes some curve flags, keeping the rest.
pub fn update_curve_flags(
    session: &Session,
    track: TrackId,
    param: ParamId,
    update: impl FnOnce(&mut CurveFlags),
) -> Result<Command> {
    let mut flags = session.graph().track(track)?.curve(param)?.flags();
    update(&mut flags);
    Ok(Command::SetCurveFlags { track, param, flags })
}

fn replace_one(track: TrackId, old: &Clip, new: Clip, label: &str) -> Command {
    Command::ReplaceClips {
        track,
        remove: vec![old.id],
        insert: vec![new],
    }
    .with_label(label)
}

/// Places a clip in overwrite mode: whatever it covers is trimmed, split or
/// removed. The clip gets a fresh id. An active take may be trimmed but not
/// removed or split, since its group would lose track of it.
pub fn insert_clip(session: &Session, track: TrackId, clip: Clip) -> Result<Command> {
    let target = session.graph().track(track)?;
    let mut clip = clip;
    clip.id = session.next_clip_id();
    clip.validate()?;

    let audible: Vec<Clip> = target.audible_clips().cloned().collect();
    let resolved = clip_ops::resolve_overlaps(&audible, &clip, clip.id.0 + 1);

    let mut remove = Vec::new();
    let mut insert = Vec::new();
    for existing in &audible {
        match resolved.clips.iter().find(|c| c.id == existing.id) {
            Some(kept) if kept == existing => {}
            Some(kept) => {
                remove.push(existing.id);
                insert.push(kept.clone());
            }
            None if existing.take_group.is_some() => return Err(take_cut(existing)),
            None => remove.push(existing.id),
        }
    }
    for added in resolved.clips.iter().filter(|c| !audible.iter().any(|a| a.id == c.id)) {
        if added.take_group.is_some() {
            return Err(take_cut(added));
        }
        insert.push(added.clone());
    }
    insert.push(clip);

    Ok(Command::ReplaceClips {
        track,
        remove,
        insert,
    }
    .with_label("Insert Clip"))
}

fn take_cut(clip: &Clip) -> Error {
    Error::InvalidArgument(format!(
        "inserting here would cut take {} out of its group; reset the takes first",
        clip.id.0
    ))
}

/// Moves a clip, possibly to another track. Where it lands partly over a
/// neighbour both get matching cross-fades; landing wholly inside or over a
/// clip is rejected.
pub fn move_clip(
    session: &Session,
    from: TrackId,
    clip: ClipId,
    to: TrackId,
    start: u64,
) -> Result<Command> {
    let graph = session.graph();
    let source = graph.track(from)?;
    let original = source.clip(clip)?.clone();
    if original.take_group.is_some() {
        return Err(Error::InvalidArgument(format!(
            "clip {} is a take; move the take group instead",
            clip.0
        )));
    }
    let destination = graph.track(to)?;
    if destination.kind != original.kind {
        return Err(Error::InvariantViolation(format!(
            "{:?} clip cannot move to {:?} track {}",
            original.kind, destination.kind, to.0
        )));
    }

    let mut moved = clip_ops::move_to(&original, start);
    let mut neighbours = Vec::new();
    for other in destination.audible_clips() {
        if other.id == clip || !other.overlaps(moved.start, moved.end()) {
            continue;
        }
        let (a, b) = clip_ops::cross_fade(&moved, other, AUTO_CROSS_FADE)?;
        let (updated_self, updated_other) = if a.id == clip { (a, b) } else { (b, a) };
        // Keep the fade on the other edge from an earlier neighbour.
        if updated_self.start == moved.start && updated_other.start < moved.start {
            moved.fade_in = updated_self.fade_in;
        } else {
            moved.fade_out = updated_self.fade_out;
        }
        neighbours.push((other.id, updated_other));
    }

    let mut commands = Vec::new();
    if from == to {
        let mut remove = vec![clip];
        let mut insert = vec![moved];
        for (id, updated) in neighbours {
            remove.push(id);
            insert.push(updated);
        }
        commands.push(Command::ReplaceClips { track: to, remove, insert });
    } else {
        commands.push(Command::ReplaceClips {
            track: from,
            remove: vec![clip],
            insert: vec![],
        });
        let mut remove = Vec::new();
        let mut insert = vec![moved];
        for (id, updated) in neighbours {
            remove.push(id);
            insert.push(updated);
        }
        commands.push(Command::ReplaceClips { track: to, remove, insert });
    }

    Ok(Command::Macro {
        label: "Move Clip".into(),
        commands,
    })
}

pub fn split_clip(session: &Session, track: TrackId, clip: ClipId, at: u64) -> Result<Command> {
    let original = session.graph().track(track)?.clip(clip)?;
    if original.take_group.is_some() {
        return Err(Error::InvalidArgument(format!("clip {} is a take", clip.0)));
    }
    let (left, right) = clip_ops::split(original, at, session.next_clip_id())?;
    Ok(Command::ReplaceClips {
        track,
        remove: vec![clip],
        insert: vec![left, right],
    }
    .with_label("Split Clip"))
}

pub fn merge_clips(session: &Session, track: TrackId, a: ClipId, b: ClipId) -> Result<Command> {
    let target = session.graph().track(track)?;
    let merged = clip_ops::merge(target.clip(a)?, target.clip(b)?)?;
    Ok(Command::ReplaceClips {
        track,
        remove: vec![a, b],
        insert: vec![merged],
    }
    .with_label("Merge Clips"))
}

pub fn resize_clip(session: &Session, track: TrackId, clip: ClipId, length: u64) -> Result<Command> {
    let original = session.graph().track(track)?.clip(clip)?;
    let resized = clip_ops::resize(original, length)?;
    Ok(replace_one(track, original, resized, "Resize Clip"))
}

pub fn set_clip_fade(
    session: &Session,
    track: TrackId,
    clip: ClipId,
    edge: FadeEdge,
    length: u64,
    curve: FadeCurve,
) -> Result<Command> {
    let original = session.graph().track(track)?.clip(clip)?;
    let faded = clip_ops::set_fade(original, edge, length, curve)?;
    let label = match edge {
        FadeEdge::In => "Fade In",
        FadeEdge::Out => "Fade Out",
    };
    Ok(replace_one(track, original, faded, label))
}

pub fn set_clip_gain(session: &Session, track: TrackId, clip: ClipId, gain_db: f64) -> Result<Command> {
    let original = session.graph().track(track)?.clip(clip)?;
    let changed = clip_ops::set_gain(original, gain_db)?;
    Ok(replace_one(track, original, changed, "Clip Gain"))
}

pub fn set_clip_time_stretch(session: &Session, track: TrackId, clip: ClipId, ratio: f64) -> Result<Command> {
    let original = session.graph().track(track)?.clip(clip)?;
    let stretched = clip_ops::set_time_stretch(original, ratio)?;
    Ok(replace_one(track, original, stretched, "Time Stretch"))
}

pub fn set_clip_pitch_shift(session: &Session, track: TrackId, clip: ClipId, semitones: f64) -> Result<Command> {
    let original = session.graph().track(track)?.clip(clip)?;
    let shifted = clip_ops::set_pitch_shift(original, semitones)?;
    Ok(replace_one(track, original, shifted, "Pitch Shift"))
}

pub fn cross_fade_clips(
    session: &Session,
    track: TrackId,
    a: ClipId,
    b: ClipId,
    curve: FadeCurve,
) -> Result<Command> {
    let target = session.graph().track(track)?;
    let (left, right) = clip_ops::cross_fade(target.clip(a)?, target.clip(b)?, curve)?;
    Ok(Command::ReplaceClips {
        track,
        remove: vec![a, b],
        insert: vec![left, right],
    }
    .with_label("Cross Fade"))
}

/// Groups clips as alternate takes of one slot; the last becomes active.
pub fn fold_takes(session: &Session, track: TrackId, clips: &[ClipId]) -> Result<Command> {
    let target = session.graph().track(track)?;
    let originals = clips
        .iter()
        .map(|id| target.clip(*id).cloned())
        .collect::<Result<Vec<_>>>()?;
    let id = session.next_take_group_id();
    let (group, folded) = clip_ops::fold_takes(id, &originals)?;

    Ok(Command::Macro {
        label: "Fold Takes".into(),
        commands: vec![
            Command::ReplaceClips {
                track,
                remove: clips.to_vec(),
                insert: folded,
            },
            Command::SetTakeGroup {
                track,
                id,
                group: Some(group),
            },
        ],
    })
}

pub fn select_take(
    session: &Session,
    track: TrackId,
    group: TakeGroupId,
    select: TakeSelect,
) -> Result<Command> {
    let current = session.graph().track(track)?.take_group(group)?;
    let selected = match select {
        TakeSelect::First => clip_ops::first_take(current),
        TakeSelect::Previous => clip_ops::previous_take(current),
        TakeSelect::Next => clip_ops::next_take(current),
        TakeSelect::Last => clip_ops::last_take(current),
    };
    Ok(Command::SetTakeGroup {
        track,
        id: group,
        group: Some(selected),
    })
}

/// Dissolves a take group, laying its takes out one after another.
pub fn reset_takes(session: &Session, track: TrackId, group: TakeGroupId) -> Result<Command> {
    let target = session.graph().track(track)?;
    let current = target.take_group(group)?;
    let laid_out = clip_ops::reset_takes(current, target.clips())?;

    Ok(Command::Macro {
        label: "Reset Takes".into(),
        commands: vec![
            Command::ReplaceClips {
                track,
                remove: current.takes.clone(),
                insert: laid_out,
            },
            Command::SetTakeGroup {
                track,
                id: group,
                group: None,
            },
        ],
    })
}
