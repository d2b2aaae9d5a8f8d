//! Ordered tracks and buses, their routing and solo/mute audibility.

use serde::{Deserialize, Serialize};

use daw_transport::{Error, Result};

use crate::clip::TrackKind;
use crate::track::{Bus, BusId, PluginChain, PluginHandle, Track, TrackFlag, TrackId};

/// Owner of a plugin chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainOwner {
    Track(TrackId),
    Bus(BusId),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GraphRepr {
    tracks: Vec<Track>,
    buses: Vec<Bus>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "GraphRepr", into = "GraphRepr")]
pub struct TrackBusGraph {
    tracks: Vec<Track>,
    buses: Vec<Bus>,
    /// Number of soloed tracks; kept in step with every solo change.
    soloed: usize,
}

impl From<GraphRepr> for TrackBusGraph {
    fn from(repr: GraphRepr) -> Self {
        let mut graph = Self {
            tracks: repr.tracks,
            buses: repr.buses,
            soloed: 0,
        };
        graph.recount_solo();
        graph
    }
}

impl From<TrackBusGraph> for GraphRepr {
    fn from(graph: TrackBusGraph) -> Self {
        Self {
            tracks: graph.tracks,
            buses: graph.buses,
        }
    }
}

impl TrackBusGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn recount_solo(&mut self) {
        self.soloed = self.tracks.iter().filter(|t| t.state().soloed).count();
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn track_index(&self, id: TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::not_found("track", id.0))
    }

    pub fn track(&self, id: TrackId) -> Result<&Track> {
        Ok(&self.tracks[self.track_index(id)?])
    }

    pub(crate) fn track_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        let index = self.track_index(id)?;
        Ok(&mut self.tracks[index])
    }

    pub fn bus_index(&self, id: BusId) -> Result<usize> {
        self.buses
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| Error::not_found("bus", id.0))
    }

    pub fn bus(&self, id: BusId) -> Result<&Bus> {
        Ok(&self.buses[self.bus_index(id)?])
    }

    fn check_route(&self, kind: TrackKind, bus: Option<BusId>) -> Result<()> {
        let Some(bus) = bus else {
            return Ok(());
        };
        let bus = self.bus(bus)?;
        if bus.kind != kind {
            return Err(Error::InvariantViolation(format!(
                "{:?} track cannot route through {:?} bus {}",
                kind, bus.kind, bus.id.0
            )));
        }
        Ok(())
    }

    pub fn insert_track(&mut self, index: usize, track: Track) -> Result<()> {
        if index > self.tracks.len() {
            return Err(Error::InvalidArgument(format!(
                "track index {index} past end ({})",
                self.tracks.len()
            )));
        }
        if self.tracks.iter().any(|t| t.id == track.id) {
            return Err(Error::InvariantViolation(format!(
                "track {} already exists",
                track.id.0
            )));
        }
        self.check_route(track.kind, track.input)?;
        self.check_route(track.kind, track.output)?;
        track.validate()?;

        let soloed = track.state().soloed;
        self.tracks.insert(index, track);
        if soloed {
            self.soloed += 1;
        }
        Ok(())
    }

    /// Removes a track, returning it with the index it occupied.
    pub fn remove_track(&mut self, id: TrackId) -> Result<(usize, Track)> {
        let index = self.track_index(id)?;
        let track = self.tracks.remove(index);
        if track.state().soloed {
            self.soloed -= 1;
        }
        Ok((index, track))
    }

    /// Moves a track to `to`, returning its previous index.
    pub fn move_track(&mut self, id: TrackId, to: usize) -> Result<usize> {
        let from = self.track_index(id)?;
        if to >= self.tracks.len() {
            return Err(Error::InvalidArgument(format!(
                "track index {to} past end ({})",
                self.tracks.len()
            )));
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);
        Ok(from)
    }

    /// Sets a track flag and returns the previous value.
    pub fn set_track_flag(&mut self, id: TrackId, flag: TrackFlag, value: bool) -> Result<bool> {
        let track = self.track_mut(id)?;
        let prior = track.set_flag(flag, value);
        if flag == TrackFlag::Soloed && prior != value {
            if value {
                self.soloed += 1;
            } else {
                self.soloed -= 1;
            }
        }
        Ok(prior)
    }

    pub fn rename_track(&mut self, id: TrackId, name: String) -> Result<String> {
        let track = self.track_mut(id)?;
        Ok(std::mem::replace(&mut track.name, name))
    }

    /// Reroutes a track, returning the previous `(input, output)`.
    pub fn set_track_routing(
        &mut self,
        id: TrackId,
        input: Option<BusId>,
        output: Option<BusId>,
    ) -> Result<(Option<BusId>, Option<BusId>)> {
        let kind = self.track(id)?.kind;
        self.check_route(kind, input)?;
        self.check_route(kind, output)?;
        let track = self.track_mut(id)?;
        let prior = (track.input, track.output);
        track.input = input;
        track.output = output;
        Ok(prior)
    }

    pub fn any_soloed(&self) -> bool {
        self.soloed > 0
    }

    /// A track sounds when it is not muted and either nothing is soloed or it
    /// is soloed itself.
    pub fn is_audible(&self, id: TrackId) -> Result<bool> {
        let state = self.track(id)?.state();
        Ok(!state.muted && (!self.any_soloed() || state.soloed))
    }

    /// Audibility of every track, in track order.
    pub fn audibility(&self) -> Vec<(TrackId, bool)> {
        let any_soloed = self.any_soloed();
        self.tracks
            .iter()
            .map(|t| {
                let state = t.state();
                (t.id, !state.muted && (!any_soloed || state.soloed))
            })
            .collect()
    }

    pub fn insert_bus(&mut self, index: usize, bus: Bus) -> Result<()> {
        if index > self.buses.len() {
            return Err(Error::InvalidArgument(format!(
                "bus index {index} past end ({})",
                self.buses.len()
            )));
        }
        if self.buses.iter().any(|b| b.id == bus.id) {
            return Err(Error::InvariantViolation(format!(
                "bus {} already exists",
                bus.id.0
            )));
        }
        self.buses.insert(index, bus);
        Ok(())
    }

    /// Removes an unreferenced bus, returning it with its former index.
    pub fn remove_bus(&mut self, id: BusId) -> Result<(usize, Bus)> {
        let index = self.bus_index(id)?;
        if let Some(track) = self
            .tracks
            .iter()
            .find(|t| t.input == Some(id) || t.output == Some(id))
        {
            return Err(Error::BusInUse {
                bus: id.0,
                track: track.id.0,
            });
        }
        Ok((index, self.buses.remove(index)))
    }

    pub fn move_bus(&mut self, id: BusId, to: usize) -> Result<usize> {
        let from = self.bus_index(id)?;
        if to >= self.buses.len() {
            return Err(Error::InvalidArgument(format!(
                "bus index {to} past end ({})",
                self.buses.len()
            )));
        }
        let bus = self.buses.remove(from);
        self.buses.insert(to, bus);
        Ok(from)
    }

    /// Sets bus gain and pan, returning the previous pair.
    pub fn set_bus_mix(&mut self, id: BusId, gain_db: f64, pan: f64) -> Result<(f64, f64)> {
        if !gain_db.is_finite() || !(-1.0..=1.0).contains(&pan) {
            return Err(Error::InvalidArgument(format!(
                "bus mix gain {gain_db} dB pan {pan}"
            )));
        }
        let index = self.bus_index(id)?;
        let bus = &mut self.buses[index];
        let prior = (bus.gain_db, bus.pan);
        bus.gain_db = gain_db;
        bus.pan = pan;
        Ok(prior)
    }

    pub fn chain(&self, owner: ChainOwner) -> Result<&PluginChain> {
        match owner {
            ChainOwner::Track(id) => Ok(&self.track(id)?.plugins),
            ChainOwner::Bus(id) => Ok(&self.bus(id)?.plugins),
        }
    }

    fn chain_mut(&mut self, owner: ChainOwner) -> Result<&mut PluginChain> {
        match owner {
            ChainOwner::Track(id) => Ok(&mut self.track_mut(id)?.plugins),
            ChainOwner::Bus(id) => {
                let index = self.bus_index(id)?;
                Ok(&mut self.buses[index].plugins)
            }
        }
    }

    pub fn insert_plugin(&mut self, owner: ChainOwner, index: usize, plugin: PluginHandle) -> Result<()> {
        self.chain_mut(owner)?.insert(index, plugin)
    }

    pub fn remove_plugin(&mut self, owner: ChainOwner, index: usize) -> Result<PluginHandle> {
        self.chain_mut(owner)?.remove(index)
    }

    pub fn move_plugin(&mut self, owner: ChainOwner, from: usize, to: usize) -> Result<()> {
        self.chain_mut(owner)?.move_plugin(from, to)
    }

    pub fn validate(&self) -> Result<()> {
        for (i, track) in self.tracks.iter().enumerate() {
            if self.tracks[..i].iter().any(|t| t.id == track.id) {
                return Err(Error::InvariantViolation(format!(
                    "duplicate track id {}",
                    track.id.0
                )));
            }
            self.check_route(track.kind, track.input)?;
            self.check_route(track.kind, track.output)?;
            track.validate()?;
        }
        for (i, bus) in self.buses.iter().enumerate() {
            if self.buses[..i].iter().any(|b| b.id == bus.id) {
                return Err(Error::InvariantViolation(format!(
                    "duplicate bus id {}",
                    bus.id.0
                )));
            }
        }
        let soloed = self.tracks.iter().filter(|t| t.state().soloed).count();
        if soloed != self.soloed {
            return Err(Error::InvariantViolation(format!(
                "solo count {} does not match {} soloed tracks",
                self.soloed, soloed
            )));
        }
        Ok(())
    }
}
