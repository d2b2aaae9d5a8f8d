//! Pure functions for clip operations, testable without a session.
//!
//! Every operation takes clips by reference and returns new values; callers
//! wrap the results into reversible commands.

use daw_transport::{Error, Result};

use crate::clip::{Clip, ClipId, Fade, FadeCurve, FadeEdge, TakeGroup, TakeGroupId, TrackKind};

/// Result of resolving overlaps between a new clip and existing clips.
pub struct OverlapResolution {
    /// Clips to keep (possibly modified)
    pub clips: Vec<Clip>,
    /// The next clip ID to use (incremented if splits occurred)
    pub next_clip_id: u64,
}

/// Resolve overlaps between a new clip and a list of existing clips.
/// The new clip takes priority - existing clips are trimmed, split, or removed.
///
/// # Arguments
/// * `existing_clips` - The current clips on the track
/// * `new_clip` - The new clip being added (not included in output - caller adds it)
/// * `next_clip_id` - The next available clip ID (used for split clips)
///
/// # Returns
/// The modified list of existing clips and the updated next_clip_id
pub fn resolve_overlaps(
    existing_clips: &[Clip],
    new_clip: &Clip,
    mut next_clip_id: u64,
) -> OverlapResolution {
    let new_start = new_clip.start;
    let new_end = new_clip.end();

    let mut result_clips: Vec<Clip> = Vec::new();

    for existing in existing_clips {
        let existing_start = existing.start;
        let existing_end = existing.end();

        if !existing.overlaps(new_start, new_end) {
            result_clips.push(existing.clone());
            continue;
        }

        if new_start <= existing_start && new_end >= existing_end {
            // Covered entirely
            continue;
        } else if new_start > existing_start && new_end < existing_end {
            // New clip in the middle: keep both outer parts
            let mut left = existing.clone();
            left.length = new_start - existing_start;
            left.fade_out = Fade::none();
            left.clamp_fades();
            result_clips.push(left);

            let mut right = trim_start(existing, new_end);
            right.id = ClipId(next_clip_id);
            next_clip_id += 1;
            right.fade_in = Fade::none();
            result_clips.push(right);
        } else if new_start <= existing_start {
            // Covers the start: trim it
            let mut trimmed = trim_start(existing, new_end);
            trimmed.fade_in = Fade::none();
            result_clips.push(trimmed);
        } else {
            // Covers the end: shorten it
            let mut trimmed = existing.clone();
            trimmed.length = new_start - existing_start;
            trimmed.fade_out = Fade::none();
            trimmed.clamp_fades();
            result_clips.push(trimmed);
        }
    }

    OverlapResolution {
        clips: result_clips,
        next_clip_id,
    }
}

/// Copy of `clip` starting at `at`, with the source offset advanced to match.
fn trim_start(clip: &Clip, at: u64) -> Clip {
    let cut = at - clip.start;
    let mut trimmed = clip.clone();
    trimmed.start = at;
    trimmed.offset = clip.offset + clip.source_span(cut);
    trimmed.length = clip.length - cut;
    trimmed.clamp_fades();
    trimmed
}

/// Splits `clip` at timeline frame `at`. The left half keeps the id and the
/// fade-in; the right half takes `right_id` and the fade-out.
pub fn split(clip: &Clip, at: u64, right_id: ClipId) -> Result<(Clip, Clip)> {
    if at <= clip.start || at >= clip.end() {
        return Err(Error::InvalidArgument(format!(
            "split point {at} is not inside clip {} [{}, {})",
            clip.id.0,
            clip.start,
            clip.end()
        )));
    }

    let mut left = clip.clone();
    left.length = at - clip.start;
    left.fade_out = Fade::none();
    left.clamp_fades();

    let mut right = trim_start(clip, at);
    right.id = right_id;
    right.fade_in = Fade::none();

    Ok((left, right))
}

/// Joins two adjacent clips that read contiguous material from one source.
pub fn merge(a: &Clip, b: &Clip) -> Result<Clip> {
    let (left, right) = if a.start <= b.start { (a, b) } else { (b, a) };

    if left.kind != right.kind {
        return Err(Error::Unmergeable("clips are of different kinds".into()));
    }
    if left.end() != right.start {
        return Err(Error::Unmergeable(format!(
            "clip {} ends at {} but clip {} starts at {}",
            left.id.0,
            left.end(),
            right.id.0,
            right.start
        )));
    }
    if left.source != right.source {
        return Err(Error::Unmergeable("clips read different sources".into()));
    }
    if left.time_stretch != right.time_stretch
        || left.pitch_shift != right.pitch_shift
        || left.gain_db != right.gain_db
    {
        return Err(Error::Unmergeable(
            "clips differ in gain, stretch or pitch".into(),
        ));
    }
    if right.offset != left.offset + left.source_span(left.length) {
        return Err(Error::Unmergeable("source material is not contiguous".into()));
    }
    if left.take_group.is_some() || right.take_group.is_some() {
        return Err(Error::Unmergeable("clips belong to a take group".into()));
    }

    let mut merged = left.clone();
    merged.length = left.length + right.length;
    merged.fade_out = right.fade_out;
    merged
        .validate()
        .map_err(|e| Error::Unmergeable(e.to_string()))?;
    Ok(merged)
}

pub fn move_to(clip: &Clip, start: u64) -> Clip {
    let mut moved = clip.clone();
    moved.start = start;
    moved
}

/// Changes the timeline length, keeping the start and offset.
pub fn resize(clip: &Clip, length: u64) -> Result<Clip> {
    let mut resized = clip.clone();
    resized.length = length;
    resized.clamp_fades();
    resized.validate()?;
    Ok(resized)
}

pub fn set_fade(clip: &Clip, edge: FadeEdge, length: u64, curve: FadeCurve) -> Result<Clip> {
    if length > clip.length {
        return Err(Error::InvalidArgument(format!(
            "fade of {length} frames is longer than clip {} ({} frames)",
            clip.id.0, clip.length
        )));
    }
    let mut faded = clip.clone();
    match edge {
        FadeEdge::In => faded.fade_in = Fade::new(length, curve),
        FadeEdge::Out => faded.fade_out = Fade::new(length, curve),
    }
    Ok(faded)
}

pub fn set_gain(clip: &Clip, gain_db: f64) -> Result<Clip> {
    if !gain_db.is_finite() {
        return Err(Error::InvalidArgument(format!("gain {gain_db} dB")));
    }
    let mut changed = clip.clone();
    changed.gain_db = gain_db;
    Ok(changed)
}

/// Sets the stretch ratio. The timeline length is rescaled so the clip keeps
/// reading the same source window.
pub fn set_time_stretch(clip: &Clip, ratio: f64) -> Result<Clip> {
    if clip.kind == TrackKind::Midi {
        return Err(Error::InvalidArgument(
            "MIDI clips cannot be time-stretched".into(),
        ));
    }
    if !(ratio.is_finite() && ratio > 0.0) {
        return Err(Error::InvalidArgument(format!("time-stretch ratio {ratio}")));
    }
    let span = clip.source_span(clip.length);
    let mut stretched = clip.clone();
    stretched.time_stretch = ratio;
    stretched.length = ((span as f64 * ratio).floor() as u64).max(1);
    stretched.clamp_fades();
    stretched.validate()?;
    Ok(stretched)
}

pub fn set_pitch_shift(clip: &Clip, semitones: f64) -> Result<Clip> {
    if clip.kind == TrackKind::Midi {
        return Err(Error::InvalidArgument(
            "MIDI clips cannot be pitch-shifted".into(),
        ));
    }
    if !semitones.is_finite() {
        return Err(Error::InvalidArgument(format!("pitch shift {semitones}")));
    }
    let mut shifted = clip.clone();
    shifted.pitch_shift = semitones;
    Ok(shifted)
}

/// Gives two partially overlapping clips matched fades across the overlap.
/// Returns the updated clips in timeline order.
pub fn cross_fade(a: &Clip, b: &Clip, curve: FadeCurve) -> Result<(Clip, Clip)> {
    let (left, right) = if a.start <= b.start { (a, b) } else { (b, a) };
    if right.start >= left.end() {
        return Err(Error::InvalidArgument(format!(
            "clips {} and {} do not overlap",
            left.id.0, right.id.0
        )));
    }
    if right.end() <= left.end() {
        return Err(Error::InvariantViolation(format!(
            "clip {} lies entirely inside clip {}",
            right.id.0, left.id.0
        )));
    }

    let overlap = left.end() - right.start;
    let mut left = left.clone();
    let mut right = right.clone();
    left.fade_out = Fade::new(overlap, curve);
    right.fade_in = Fade::new(overlap, curve);
    Ok((left, right))
}

/// Whether two clips overlap only across fades long enough to cover it.
pub fn is_cross_faded(a: &Clip, b: &Clip) -> bool {
    let (left, right) = if a.start <= b.start { (a, b) } else { (b, a) };
    if right.start >= left.end() {
        return true;
    }
    if right.end() <= left.end() {
        return false;
    }
    let overlap = left.end() - right.start;
    left.fade_out.length >= overlap && right.fade_in.length >= overlap
}

fn select_take(group: &TakeGroup, active: usize) -> TakeGroup {
    let mut selected = group.clone();
    selected.active = active;
    selected
}

pub fn first_take(group: &TakeGroup) -> TakeGroup {
    select_take(group, 0)
}

pub fn last_take(group: &TakeGroup) -> TakeGroup {
    select_take(group, group.len().saturating_sub(1))
}

pub fn previous_take(group: &TakeGroup) -> TakeGroup {
    select_take(group, group.active.saturating_sub(1))
}

pub fn next_take(group: &TakeGroup) -> TakeGroup {
    select_take(group, (group.active + 1).min(group.len().saturating_sub(1)))
}

/// Folds clips into a take group over their shared slot. The newest take
/// (last in `clips`) becomes active.
pub fn fold_takes(id: TakeGroupId, clips: &[Clip]) -> Result<(TakeGroup, Vec<Clip>)> {
    if let Some(grouped) = clips.iter().find(|c| c.take_group.is_some()) {
        return Err(Error::InvariantViolation(format!(
            "clip {} already belongs to a take group",
            grouped.id.0
        )));
    }
    let group = TakeGroup::new(id, clips.iter().map(|c| c.id).collect())?;
    let folded = clips
        .iter()
        .map(|c| {
            let mut c = c.clone();
            c.take_group = Some(id);
            c
        })
        .collect();
    Ok((group, folded))
}

/// Unfolds a take group: takes are laid out one after another from the
/// group's earliest start, in take order, and leave the group.
pub fn reset_takes(group: &TakeGroup, clips: &[Clip]) -> Result<Vec<Clip>> {
    let mut takes = Vec::with_capacity(group.len());
    for id in &group.takes {
        let clip = clips
            .iter()
            .find(|c| c.id == *id)
            .ok_or_else(|| Error::not_found("clip", id.0))?;
        takes.push(clip);
    }

    let mut cursor = takes.iter().map(|c| c.start).min().unwrap_or(0);
    let laid_out = takes
        .into_iter()
        .map(|clip| {
            let mut clip = move_to(clip, cursor);
            clip.take_group = None;
            cursor = clip.end();
            clip
        })
        .collect();
    Ok(laid_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::SourceId;
    use proptest::prelude::*;

    const BEAT: u64 = 22050;

    /// Audio clip with `length` frames of a 10-second source
    fn make_clip(id: u64, start: u64, length: u64) -> Clip {
        Clip::new(ClipId(id), TrackKind::Audio, SourceId(1), 441_000)
            .at(start)
            .with_window(0, length)
    }

    #[test]
    fn test_no_overlap() {
        let existing = vec![make_clip(1, 0, BEAT)];
        let new_clip = make_clip(2, BEAT * 2, BEAT);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0], existing[0]);
    }

    #[test]
    fn test_new_completely_covers_existing() {
        let existing = vec![make_clip(1, BEAT, BEAT)];
        let new_clip = make_clip(2, 0, BEAT * 3);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips.len(), 0, "Existing clip should be removed");
    }

    #[test]
    fn test_new_covers_start_of_existing() {
        let existing = vec![make_clip(1, 0, BEAT * 2)];
        let new_clip = make_clip(2, 0, BEAT);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].start, BEAT);
        assert_eq!(result.clips[0].length, BEAT);
        assert_eq!(result.clips[0].offset, BEAT);
    }

    #[test]
    fn test_new_covers_end_of_existing() {
        let existing = vec![make_clip(1, 0, BEAT * 2)];
        let new_clip = make_clip(2, BEAT, BEAT);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips.len(), 1);
        assert_eq!(result.clips[0].start, 0);
        assert_eq!(result.clips[0].length, BEAT);
        assert_eq!(result.clips[0].offset, 0);
    }

    #[test]
    fn test_new_in_middle_splits_existing() {
        let existing = vec![make_clip(1, 0, BEAT * 3)];
        let new_clip = make_clip(2, BEAT, BEAT);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips.len(), 2);
        let left = result.clips.iter().find(|c| c.start == 0).unwrap();
        let right = result.clips.iter().find(|c| c.start == BEAT * 2).unwrap();

        assert_eq!(left.length, BEAT);
        assert_eq!(right.length, BEAT);
        assert_eq!(right.offset, BEAT * 2);
        assert_eq!(right.id.0, 100, "Right part should have new ID");
        assert_eq!(result.next_clip_id, 101);
    }

    #[test]
    fn test_multiple_overlapping_clips() {
        let existing = vec![
            make_clip(1, 0, BEAT),
            make_clip(2, BEAT, BEAT),
            make_clip(3, BEAT * 2, BEAT),
        ];
        let new_clip = make_clip(4, BEAT / 2, BEAT * 2);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips.len(), 2);
        let first = result.clips.iter().find(|c| c.id.0 == 1).unwrap();
        assert_eq!(first.length, BEAT / 2);
        let third = result.clips.iter().find(|c| c.id.0 == 3).unwrap();
        assert_eq!(third.start, BEAT / 2 + BEAT * 2);
    }

    #[test]
    fn test_adjacent_clips_no_overlap() {
        let existing = vec![make_clip(1, 0, BEAT)];
        let new_clip = make_clip(2, BEAT, BEAT);

        let result = resolve_overlaps(&existing, &new_clip, 100);

        assert_eq!(result.clips[0], existing[0]);
    }

    #[test]
    fn test_split_outside_clip_rejected() {
        let clip = make_clip(1, 1000, BEAT);
        assert!(split(&clip, 1000, ClipId(2)).is_err());
        assert!(split(&clip, 1000 + BEAT, ClipId(2)).is_err());
    }

    #[test]
    fn test_split_moves_fades_to_outer_edges() {
        let mut clip = make_clip(1, 0, BEAT * 2);
        clip.fade_in = Fade::new(100, FadeCurve::Linear);
        clip.fade_out = Fade::new(200, FadeCurve::SCurve);

        let (left, right) = split(&clip, BEAT, ClipId(9)).unwrap();
        assert_eq!(left.fade_in, clip.fade_in);
        assert!(!left.fade_out.is_active());
        assert!(!right.fade_in.is_active());
        assert_eq!(right.fade_out, clip.fade_out);
        assert_eq!(right.offset, BEAT);
        assert_eq!(right.id, ClipId(9));
    }

    #[test]
    fn test_merge_requires_adjacency() {
        let a = make_clip(1, 0, BEAT);
        let b = make_clip(2, BEAT + 1, BEAT).with_window(BEAT, BEAT);
        assert!(matches!(merge(&a, &b), Err(Error::Unmergeable(_))));
    }

    #[test]
    fn test_merge_requires_contiguous_source() {
        let a = make_clip(1, 0, BEAT);
        let b = make_clip(2, BEAT, BEAT).with_window(BEAT * 3, BEAT);
        assert!(matches!(merge(&a, &b), Err(Error::Unmergeable(_))));
    }

    #[test]
    fn test_merge_rejects_other_source() {
        let a = make_clip(1, 0, BEAT);
        let mut b = make_clip(2, BEAT, BEAT).with_window(BEAT, BEAT);
        b.source = SourceId(2);
        assert!(matches!(merge(&a, &b), Err(Error::Unmergeable(_))));
    }

    #[test]
    fn test_resize_rejects_reading_past_source() {
        let clip = make_clip(1, 0, BEAT);
        assert!(resize(&clip, 441_001).is_err());
        assert!(resize(&clip, 0).is_err());
        assert_eq!(resize(&clip, 441_000).unwrap().length, 441_000);
    }

    #[test]
    fn test_set_fade_longer_than_clip_rejected() {
        let clip = make_clip(1, 0, 100);
        assert!(set_fade(&clip, FadeEdge::In, 101, FadeCurve::Linear).is_err());
        let faded = set_fade(&clip, FadeEdge::Out, 50, FadeCurve::Exponential).unwrap();
        assert_eq!(faded.fade_out, Fade::new(50, FadeCurve::Exponential));
    }

    #[test]
    fn test_time_stretch_keeps_source_window() {
        let clip = make_clip(1, 0, BEAT);
        let stretched = set_time_stretch(&clip, 2.0).unwrap();
        assert_eq!(stretched.length, BEAT * 2);
        assert_eq!(stretched.source_span(stretched.length), BEAT);
    }

    #[test]
    fn test_midi_rejects_pitch_and_stretch() {
        let clip = Clip::new(ClipId(1), TrackKind::Midi, SourceId(1), 960);
        assert!(set_pitch_shift(&clip, 3.0).is_err());
        assert!(set_time_stretch(&clip, 2.0).is_err());
    }

    #[test]
    fn test_cross_fade_matches_overlap() {
        let a = make_clip(1, 0, 1000);
        let b = make_clip(2, 800, 1000);
        assert!(!is_cross_faded(&a, &b));

        let (left, right) = cross_fade(&b, &a, FadeCurve::EqualPower).unwrap();
        assert_eq!(left.id, ClipId(1));
        assert_eq!(left.fade_out.length, 200);
        assert_eq!(right.fade_in.length, 200);
        assert!(is_cross_faded(&left, &right));
    }

    #[test]
    fn test_cross_fade_rejects_containment() {
        let a = make_clip(1, 0, 1000);
        let b = make_clip(2, 100, 200);
        assert!(matches!(
            cross_fade(&a, &b, FadeCurve::Linear),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_take_navigation() {
        let group = TakeGroup::new(TakeGroupId(1), vec![ClipId(1), ClipId(2), ClipId(3)]).unwrap();
        assert_eq!(group.active_take(), ClipId(3));
        assert_eq!(next_take(&group).active_take(), ClipId(3));
        assert_eq!(previous_take(&group).active_take(), ClipId(2));
        assert_eq!(first_take(&group).active_take(), ClipId(1));
        assert_eq!(previous_take(&first_take(&group)).active_take(), ClipId(1));
        assert_eq!(last_take(&first_take(&group)).active_take(), ClipId(3));
    }

    #[test]
    fn test_fold_then_reset_takes() {
        let takes = vec![make_clip(1, 500, 100), make_clip(2, 500, 100), make_clip(3, 500, 100)];
        let (group, folded) = fold_takes(TakeGroupId(7), &takes).unwrap();
        assert!(folded.iter().all(|c| c.take_group == Some(TakeGroupId(7))));

        let laid_out = reset_takes(&group, &folded).unwrap();
        let starts: Vec<u64> = laid_out.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![500, 600, 700]);
        assert!(laid_out.iter().all(|c| c.take_group.is_none()));
    }

    proptest! {
        #[test]
        fn prop_split_then_merge_is_identity(
            start in 0u64..100_000,
            length in 2u64..200_000,
            cut in 1u64..199_999,
            stretch in prop_oneof![Just(1.0f64), Just(0.5), Just(2.0), Just(1.25)],
        ) {
            prop_assume!(cut < length);
            let mut clip = make_clip(1, start, length);
            clip.time_stretch = stretch;
            prop_assume!(clip.validate().is_ok());

            let (left, right) = split(&clip, start + cut, ClipId(2)).unwrap();
            prop_assert!(left.validate().is_ok());
            prop_assert!(right.validate().is_ok());
            prop_assert_eq!(left.length + right.length, clip.length);

            let merged = merge(&left, &right).unwrap();
            prop_assert_eq!(merged, clip);
        }
    }
}
