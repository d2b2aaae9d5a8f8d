use serde::{Deserialize, Serialize};

use daw_transport::{Error, Result, TempoMap};

use crate::clip::{ClipId, TakeGroupId};
use crate::graph::TrackBusGraph;
use crate::track::{BusId, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub name: String,
    pub frame: u64,
}

/// Half-open frame range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: u64,
    pub end: u64,
}

impl FrameRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidArgument(format!(
                "empty range [{start}, {end})"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.start && frame < self.end
    }
}

/// The whole editable state of a project.
///
/// Only [`crate::command::Command`] mutates a session; everything else reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    tempo: TempoMap,
    markers: Vec<Marker>,
    loop_range: Option<FrameRange>,
    punch_range: Option<FrameRange>,
    graph: TrackBusGraph,
}

impl Session {
    pub fn new(name: impl Into<String>, sample_rate: u32, bpm: f64, numerator: u32, denominator: u32) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            tempo: TempoMap::new(sample_rate, bpm, numerator, denominator)?,
            markers: Vec::new(),
            loop_range: None,
            punch_range: None,
            graph: TrackBusGraph::new(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.tempo.sample_rate()
    }

    pub fn tempo(&self) -> &TempoMap {
        &self.tempo
    }

    pub(crate) fn tempo_mut(&mut self) -> &mut TempoMap {
        &mut self.tempo
    }

    pub fn graph(&self) -> &TrackBusGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut TrackBusGraph {
        &mut self.graph
    }

    pub fn loop_range(&self) -> Option<FrameRange> {
        self.loop_range
    }

    pub fn punch_range(&self) -> Option<FrameRange> {
        self.punch_range
    }

    pub(crate) fn set_loop_range(&mut self, range: Option<FrameRange>) -> Result<Option<FrameRange>> {
        check_range(range)?;
        Ok(std::mem::replace(&mut self.loop_range, range))
    }

    pub(crate) fn set_punch_range(&mut self, range: Option<FrameRange>) -> Result<Option<FrameRange>> {
        check_range(range)?;
        Ok(std::mem::replace(&mut self.punch_range, range))
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn marker(&self, id: MarkerId) -> Result<&Marker> {
        self.markers
            .iter()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::not_found("marker", id.0))
    }

    pub(crate) fn add_marker(&mut self, marker: Marker) -> Result<()> {
        if self.markers.iter().any(|m| m.id == marker.id) {
            return Err(Error::InvariantViolation(format!(
                "marker {} already exists",
                marker.id.0
            )));
        }
        let index = self
            .markers
            .partition_point(|m| (m.frame, m.id) < (marker.frame, marker.id));
        self.markers.insert(index, marker);
        Ok(())
    }

    pub(crate) fn remove_marker(&mut self, id: MarkerId) -> Result<Marker> {
        let index = self
            .markers
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| Error::not_found("marker", id.0))?;
        Ok(self.markers.remove(index))
    }

    /// First marker strictly after `frame`.
    pub fn next_marker(&self, frame: u64) -> Option<&Marker> {
        self.markers.iter().find(|m| m.frame > frame)
    }

    /// Last marker strictly before `frame`.
    pub fn previous_marker(&self, frame: u64) -> Option<&Marker> {
        self.markers.iter().rev().find(|m| m.frame < frame)
    }

    pub fn next_track_id(&self) -> TrackId {
        TrackId(self.graph.tracks().iter().map(|t| t.id.0 + 1).max().unwrap_or(1))
    }

    pub fn next_bus_id(&self) -> BusId {
        BusId(self.graph.buses().iter().map(|b| b.id.0 + 1).max().unwrap_or(1))
    }

    /// Clip ids are unique across the whole session.
    pub fn next_clip_id(&self) -> ClipId {
        let next = self
            .graph
            .tracks()
            .iter()
            .flat_map(|t| t.clips())
            .map(|c| c.id.0 + 1)
            .max()
            .unwrap_or(1);
        ClipId(next)
    }

    pub fn next_take_group_id(&self) -> TakeGroupId {
        let next = self
            .graph
            .tracks()
            .iter()
            .flat_map(|t| t.takes())
            .map(|g| g.id.0 + 1)
            .max()
            .unwrap_or(1);
        TakeGroupId(next)
    }

    pub fn next_marker_id(&self) -> MarkerId {
        MarkerId(self.markers.iter().map(|m| m.id.0 + 1).max().unwrap_or(1))
    }

    /// Timeline end: the furthest clip end, marker or range bound.
    pub fn end_frame(&self) -> u64 {
        let clips = self
            .graph
            .tracks()
            .iter()
            .filter_map(|t| t.extent())
            .map(|(_, end)| end);
        let markers = self.markers.iter().map(|m| m.frame);
        let ranges = [self.loop_range, self.punch_range]
            .into_iter()
            .flatten()
            .map(|r| r.end);
        clips.chain(markers).chain(ranges).max().unwrap_or(0)
    }

    /// Checks every structural invariant. Used after loading a project.
    pub fn validate(&self) -> Result<()> {
        for node in self.tempo.nodes() {
            node.validate()?;
        }
        check_range(self.loop_range)?;
        check_range(self.punch_range)?;
        if !self
            .markers
            .windows(2)
            .all(|w| (w[0].frame, w[0].id) < (w[1].frame, w[1].id))
        {
            return Err(Error::InvariantViolation("markers out of order".into()));
        }
        self.graph.validate()?;

        let mut clip_ids: Vec<ClipId> = self
            .graph
            .tracks()
            .iter()
            .flat_map(|t| t.clips())
            .map(|c| c.id)
            .collect();
        let total = clip_ids.len();
        clip_ids.sort();
        clip_ids.dedup();
        if clip_ids.len() != total {
            return Err(Error::InvariantViolation(
                "clip ids are not unique across tracks".into(),
            ));
        }
        Ok(())
    }
}

fn check_range(range: Option<FrameRange>) -> Result<()> {
    match range {
        Some(r) if r.is_empty() => Err(Error::InvalidArgument(format!(
            "empty range [{}, {})",
            r.start, r.end
        ))),
        _ => Ok(()),
    }
}
