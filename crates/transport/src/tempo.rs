//! Piecewise-constant tempo and time-signature map.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::time::{PPQN, TimeSignature};

/// A tempo/meter change anchored at a sample frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoNode {
    pub frame: u64,
    /// Beats per minute, where a beat is one `denominator` note.
    pub bpm: f64,
    pub numerator: u32,
    pub denominator: u32,
}

impl TempoNode {
    pub fn new(frame: u64, bpm: f64, numerator: u32, denominator: u32) -> Self {
        Self {
            frame,
            bpm,
            numerator,
            denominator,
        }
    }

    pub fn time_signature(&self) -> TimeSignature {
        TimeSignature::new(self.numerator, self.denominator)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "tempo must be positive, got {}",
                self.bpm
            )));
        }
        if !self.time_signature().is_valid() {
            return Err(Error::InvalidArgument(format!(
                "invalid time signature {}/{}",
                self.numerator, self.denominator
            )));
        }
        Ok(())
    }

    #[inline]
    fn ticks_per_frame(&self, sample_rate: u32) -> f64 {
        self.bpm * PPQN as f64 / (60.0 * sample_rate as f64)
    }

    #[inline]
    fn frames_per_tick(&self, sample_rate: u32) -> f64 {
        60.0 * sample_rate as f64 / (self.bpm * PPQN as f64)
    }
}

/// Musical origin of a segment, derived from the nodes before it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Anchor {
    /// Absolute ticks elapsed at the node.
    tick: f64,
    /// Zero-based bar index at which the node's segment starts.
    bar: u64,
}

#[derive(Serialize, Deserialize)]
struct TempoMapRepr {
    sample_rate: u32,
    nodes: Vec<TempoNode>,
}

/// Ordered tempo nodes; node 0 always sits at frame 0.
///
/// A node that lands in the middle of a bar closes that bar early: its own
/// segment always starts on beat 1 of a fresh bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "TempoMapRepr", into = "TempoMapRepr")]
pub struct TempoMap {
    sample_rate: u32,
    nodes: Vec<TempoNode>,
    anchors: Vec<Anchor>,
    revision: u64,
}

impl TempoMap {
    pub fn new(sample_rate: u32, bpm: f64, numerator: u32, denominator: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidArgument("sample rate must be non-zero".into()));
        }
        let first = TempoNode::new(0, bpm, numerator, denominator);
        first.validate()?;

        let mut map = Self {
            sample_rate,
            nodes: vec![first],
            anchors: Vec::new(),
            revision: 0,
        };
        map.rebuild();
        Ok(map)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn nodes(&self) -> &[TempoNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&TempoNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bumped on every mutation; dependents compare it to drop cached projections.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Index of the segment containing `frame`. A frame exactly on a node
    /// belongs to that node's segment.
    pub fn find_segment(&self, frame: u64) -> usize {
        self.nodes
            .partition_point(|node| node.frame <= frame)
            .saturating_sub(1)
    }

    pub fn tempo_at(&self, frame: u64) -> &TempoNode {
        &self.nodes[self.find_segment(frame)]
    }

    /// Insert a new node; returns its index.
    pub fn insert_node(&mut self, node: TempoNode) -> Result<usize> {
        node.validate()?;
        let index = self.nodes.partition_point(|n| n.frame < node.frame);
        if self.nodes.get(index).is_some_and(|n| n.frame == node.frame) {
            return Err(Error::InvariantViolation(format!(
                "a tempo node already exists at frame {}",
                node.frame
            )));
        }

        self.nodes.insert(index, node);
        self.rebuild();
        Ok(index)
    }

    /// Replace the node at `index`, returning the prior value.
    pub fn update_node(&mut self, index: usize, node: TempoNode) -> Result<TempoNode> {
        if index >= self.nodes.len() {
            return Err(Error::not_found("tempo node", index as u64));
        }
        node.validate()?;
        if index == 0 && node.frame != 0 {
            return Err(Error::InvariantViolation(
                "the first tempo node must stay at frame 0".into(),
            ));
        }
        if index > 0 && self.nodes[index - 1].frame >= node.frame {
            return Err(Error::InvariantViolation(format!(
                "tempo node at frame {} would not follow its predecessor",
                node.frame
            )));
        }
        if let Some(next) = self.nodes.get(index + 1) {
            if next.frame <= node.frame {
                return Err(Error::InvariantViolation(format!(
                    "tempo node at frame {} would not precede its successor",
                    node.frame
                )));
            }
        }

        let old = std::mem::replace(&mut self.nodes[index], node);
        self.rebuild();
        Ok(old)
    }

    /// Remove the node at `index`, returning it. The node at frame 0 is permanent.
    pub fn remove_node(&mut self, index: usize) -> Result<TempoNode> {
        if index == 0 {
            return Err(Error::InvariantViolation(
                "the first tempo node cannot be removed".into(),
            ));
        }
        if index >= self.nodes.len() {
            return Err(Error::not_found("tempo node", index as u64));
        }

        let old = self.nodes.remove(index);
        self.rebuild();
        Ok(old)
    }

    /// Absolute (fractional) ticks elapsed at `frame`.
    pub fn ticks_at(&self, frame: u64) -> f64 {
        let index = self.find_segment(frame);
        let node = &self.nodes[index];
        self.anchors[index].tick + (frame - node.frame) as f64 * node.ticks_per_frame(self.sample_rate)
    }

    /// Frame reached after `ticks` absolute ticks, rounded to the nearest frame.
    pub fn frame_at_ticks(&self, ticks: f64) -> u64 {
        let ticks = ticks.max(0.0);
        let index = self
            .anchors
            .partition_point(|anchor| anchor.tick <= ticks)
            .saturating_sub(1);
        let node = &self.nodes[index];
        let delta = (ticks - self.anchors[index].tick) * node.frames_per_tick(self.sample_rate);
        node.frame + delta.round() as u64
    }

    /// Segment whose first bar is the last one at or before the zero-based `bar`.
    pub(crate) fn segment_for_bar(&self, bar: u64) -> usize {
        self.anchors
            .partition_point(|anchor| anchor.bar <= bar)
            .saturating_sub(1)
    }

    pub(crate) fn segment_bar(&self, index: usize) -> u64 {
        self.anchors[index].bar
    }

    pub(crate) fn segment_frames_per_tick(&self, index: usize) -> f64 {
        self.nodes[index].frames_per_tick(self.sample_rate)
    }

    pub(crate) fn segment_ticks_per_frame(&self, index: usize) -> f64 {
        self.nodes[index].ticks_per_frame(self.sample_rate)
    }

    fn rebuild(&mut self) {
        self.anchors.clear();
        self.anchors.reserve(self.nodes.len());
        self.anchors.push(Anchor { tick: 0.0, bar: 0 });

        for i in 1..self.nodes.len() {
            let prev = &self.nodes[i - 1];
            let origin = self.anchors[i - 1];
            let ticks = (self.nodes[i].frame - prev.frame) as f64 * prev.ticks_per_frame(self.sample_rate);
            let bars = ticks / PPQN as f64 / prev.numerator as f64;
            // Absorb float noise before rounding a partial bar up.
            let whole_bars = if (bars - bars.round()).abs() < 1e-9 {
                bars.round()
            } else {
                bars.ceil()
            };

            self.anchors.push(Anchor {
                tick: origin.tick + ticks,
                bar: origin.bar + whole_bars as u64,
            });
        }

        self.revision = self.revision.wrapping_add(1);
    }
}

impl PartialEq for TempoMap {
    fn eq(&self, other: &Self) -> bool {
        self.sample_rate == other.sample_rate && self.nodes == other.nodes
    }
}

impl TryFrom<TempoMapRepr> for TempoMap {
    type Error = Error;

    fn try_from(repr: TempoMapRepr) -> Result<Self> {
        let mut nodes = repr.nodes.into_iter();
        let first = nodes
            .next()
            .ok_or_else(|| Error::InvariantViolation("tempo map has no nodes".into()))?;
        if first.frame != 0 {
            return Err(Error::InvariantViolation(
                "the first tempo node must be at frame 0".into(),
            ));
        }

        let mut map = TempoMap::new(repr.sample_rate, first.bpm, first.numerator, first.denominator)?;
        for node in nodes {
            if map.nodes.last().is_some_and(|last| last.frame >= node.frame) {
                return Err(Error::InvariantViolation(
                    "tempo nodes must be strictly increasing".into(),
                ));
            }
            map.insert_node(node)?;
        }
        Ok(map)
    }
}

impl From<TempoMap> for TempoMapRepr {
    fn from(map: TempoMap) -> Self {
        Self {
            sample_rate: map.sample_rate,
            nodes: map.nodes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: u32 = 44100;

    fn map_120() -> TempoMap {
        TempoMap::new(SR, 120.0, 4, 4).unwrap()
    }

    #[test]
    fn test_new_map_has_node_at_zero() {
        let map = map_120();
        assert_eq!(map.len(), 1);
        assert_eq!(map.nodes()[0].frame, 0);
        assert_eq!(map.nodes()[0].bpm, 120.0);
    }

    #[test]
    fn test_rejects_bad_tempo_and_meter() {
        assert!(matches!(
            TempoMap::new(SR, 0.0, 4, 4),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            TempoMap::new(SR, 120.0, 4, 3),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            TempoMap::new(SR, 120.0, 0, 4),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut map = map_120();
        assert_eq!(map.insert_node(TempoNode::new(88200, 90.0, 3, 4)).unwrap(), 1);
        assert_eq!(map.insert_node(TempoNode::new(44100, 140.0, 4, 4)).unwrap(), 1);

        let frames: Vec<u64> = map.nodes().iter().map(|n| n.frame).collect();
        assert_eq!(frames, vec![0, 44100, 88200]);
    }

    #[test]
    fn test_insert_duplicate_frame_is_invariant_violation() {
        let mut map = map_120();
        map.insert_node(TempoNode::new(1000, 100.0, 4, 4)).unwrap();
        let err = map.insert_node(TempoNode::new(1000, 90.0, 4, 4)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        let err = map.insert_node(TempoNode::new(0, 90.0, 4, 4)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_remove_first_node_fails() {
        let mut map = map_120();
        let err = map.remove_node(0).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove_returns_prior_node() {
        let mut map = map_120();
        let node = TempoNode::new(22050, 60.0, 6, 8);
        map.insert_node(node).unwrap();
        assert_eq!(map.remove_node(1).unwrap(), node);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_update_returns_prior_and_guards_order() {
        let mut map = map_120();
        map.insert_node(TempoNode::new(1000, 100.0, 4, 4)).unwrap();
        map.insert_node(TempoNode::new(2000, 100.0, 4, 4)).unwrap();

        let old = map.update_node(1, TempoNode::new(1500, 80.0, 4, 4)).unwrap();
        assert_eq!(old.frame, 1000);
        assert_eq!(map.nodes()[1].frame, 1500);

        let err = map.update_node(1, TempoNode::new(2000, 80.0, 4, 4)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        let err = map.update_node(0, TempoNode::new(10, 80.0, 4, 4)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        let old = map.update_node(0, TempoNode::new(0, 90.0, 3, 4)).unwrap();
        assert_eq!(old.bpm, 120.0);
    }

    #[test]
    fn test_find_segment_boundary_uses_node() {
        let mut map = map_120();
        map.insert_node(TempoNode::new(44100, 60.0, 4, 4)).unwrap();

        assert_eq!(map.find_segment(0), 0);
        assert_eq!(map.find_segment(44099), 0);
        assert_eq!(map.find_segment(44100), 1);
        assert_eq!(map.find_segment(u64::MAX), 1);
        assert_eq!(map.tempo_at(44100).bpm, 60.0);
    }

    #[test]
    fn test_ticks_across_tempo_change() {
        let mut map = map_120();
        // one second at 120 BPM = 2 beats
        map.insert_node(TempoNode::new(44100, 60.0, 4, 4)).unwrap();

        assert_relative_eq!(map.ticks_at(44100), 2.0 * PPQN as f64);
        // one more second at 60 BPM = 1 beat
        assert_relative_eq!(map.ticks_at(88200), 3.0 * PPQN as f64);
        assert_eq!(map.frame_at_ticks(3.0 * PPQN as f64), 88200);
    }

    #[test]
    fn test_mid_bar_node_starts_new_bar() {
        let mut map = map_120();
        // 6 beats in: bar 0 full, bar 1 cut after two beats
        map.insert_node(TempoNode::new(3 * 44100, 120.0, 3, 4)).unwrap();
        assert_eq!(map.segment_bar(1), 2);
    }

    #[test]
    fn test_revision_changes_on_mutation() {
        let mut map = map_120();
        let before = map.revision();
        map.insert_node(TempoNode::new(500, 100.0, 4, 4)).unwrap();
        assert_ne!(map.revision(), before);
    }

    #[test]
    fn test_serde_roundtrip_rebuilds_anchors() {
        let mut map = map_120();
        map.insert_node(TempoNode::new(44100, 90.0, 7, 8)).unwrap();

        let decoded = reencode(&map);
        assert_eq!(decoded, map);
        assert_relative_eq!(decoded.ticks_at(88200), map.ticks_at(88200));
    }

    fn reencode(map: &TempoMap) -> TempoMap {
        let repr: TempoMapRepr = map.clone().into();
        TempoMap::try_from(repr).unwrap()
    }

    #[test]
    fn test_repr_rejects_unordered_nodes() {
        let repr = TempoMapRepr {
            sample_rate: SR,
            nodes: vec![
                TempoNode::new(0, 120.0, 4, 4),
                TempoNode::new(500, 120.0, 4, 4),
                TempoNode::new(400, 120.0, 4, 4),
            ],
        };
        assert!(matches!(
            TempoMap::try_from(repr),
            Err(Error::InvariantViolation(_))
        ));
    }
}
