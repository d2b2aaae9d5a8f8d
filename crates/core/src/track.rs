use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use daw_transport::{Error, Result};

use crate::automation::{AutomationCurve, ParamId};
use crate::clip::{Clip, ClipId, TakeGroup, TakeGroupId, TrackKind};
use crate::clip_ops;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BusId(pub u64);

/// Reference to a plugin instance owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackFlag {
    Armed,
    Muted,
    Soloed,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackState {
    pub armed: bool,
    pub muted: bool,
    pub soloed: bool,
    pub monitoring: bool,
}

impl TrackState {
    pub fn get(&self, flag: TrackFlag) -> bool {
        match flag {
            TrackFlag::Armed => self.armed,
            TrackFlag::Muted => self.muted,
            TrackFlag::Soloed => self.soloed,
            TrackFlag::Monitoring => self.monitoring,
        }
    }

    /// Sets a flag and returns its previous value.
    pub fn set(&mut self, flag: TrackFlag, value: bool) -> bool {
        let slot = match flag {
            TrackFlag::Armed => &mut self.armed,
            TrackFlag::Muted => &mut self.muted,
            TrackFlag::Soloed => &mut self.soloed,
            TrackFlag::Monitoring => &mut self.monitoring,
        };
        std::mem::replace(slot, value)
    }
}

/// Ordered insert chain of plugin references.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginChain {
    plugins: Vec<PluginHandle>,
}

impl PluginChain {
    pub fn plugins(&self) -> &[PluginHandle] {
        &self.plugins
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn insert(&mut self, index: usize, plugin: PluginHandle) -> Result<()> {
        if index > self.plugins.len() {
            return Err(Error::InvalidArgument(format!(
                "plugin slot {index} past end of chain ({})",
                self.plugins.len()
            )));
        }
        if self.plugins.contains(&plugin) {
            return Err(Error::InvariantViolation(format!(
                "plugin {} is already in this chain",
                plugin.0
            )));
        }
        self.plugins.insert(index, plugin);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<PluginHandle> {
        if index >= self.plugins.len() {
            return Err(Error::not_found("plugin slot", index as u64));
        }
        Ok(self.plugins.remove(index))
    }

    pub fn move_plugin(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.plugins.len() || to >= self.plugins.len() {
            return Err(Error::InvalidArgument(format!(
                "cannot move plugin slot {from} to {to} in a chain of {}",
                self.plugins.len()
            )));
        }
        let plugin = self.plugins.remove(from);
        self.plugins.insert(to, plugin);
        Ok(())
    }
}

/// Mix destination or source shared by several tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub kind: TrackKind,
    pub gain_db: f64,
    pub pan: f64,
    pub plugins: PluginChain,
}

impl Bus {
    pub fn new(id: BusId, name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            gain_db: 0.0,
            pan: 0.0,
            plugins: PluginChain::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    pub input: Option<BusId>,
    pub output: Option<BusId>,
    pub plugins: PluginChain,
    clips: Vec<Clip>,
    takes: Vec<TakeGroup>,
    curves: BTreeMap<ParamId, AutomationCurve>,
    state: TrackState,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            input: None,
            output: None,
            plugins: PluginChain::default(),
            clips: Vec::new(),
            takes: Vec::new(),
            curves: BTreeMap::new(),
            state: TrackState::default(),
        }
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Flag writes go through the graph so solo bookkeeping stays current.
    pub(crate) fn set_flag(&mut self, flag: TrackFlag, value: bool) -> bool {
        self.state.set(flag, value)
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Result<&Clip> {
        self.clips
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("clip", id.0))
    }

    pub fn is_audible_clip(&self, clip: &Clip) -> bool {
        match clip.take_group {
            None => true,
            Some(group) => self
                .take_group(group)
                .map(|g| g.is_active(clip.id))
                .unwrap_or(false),
        }
    }

    /// Clips that sound during playback: ungrouped clips plus the active take
    /// of each take group.
    pub fn audible_clips(&self) -> impl Iterator<Item = &Clip> {
        self.clips.iter().filter(|c| self.is_audible_clip(c))
    }

    /// Ends of the clip area, or `None` for an empty track.
    pub fn extent(&self) -> Option<(u64, u64)> {
        let start = self.clips.iter().map(|c| c.start).min()?;
        let end = self.clips.iter().map(|c| c.end()).max()?;
        Some((start, end))
    }

    /// Removes the `remove` clips and adds the `insert` clips as one atomic
    /// step. The resulting clip list is checked before anything is changed;
    /// the removed clips are returned in their previous order.
    pub fn replace_clips(&mut self, remove: &[ClipId], insert: &[Clip]) -> Result<Vec<Clip>> {
        for id in remove {
            self.clip(*id)?;
        }

        let mut next: Vec<Clip> = self
            .clips
            .iter()
            .filter(|c| !remove.contains(&c.id))
            .cloned()
            .collect();

        for clip in insert {
            if clip.kind != self.kind {
                return Err(Error::InvariantViolation(format!(
                    "{:?} clip {} cannot live on {:?} track {}",
                    clip.kind, clip.id.0, self.kind, self.id.0
                )));
            }
            clip.validate()?;
            if next.iter().any(|c| c.id == clip.id) {
                return Err(Error::InvariantViolation(format!(
                    "clip {} already exists on track {}",
                    clip.id.0, self.id.0
                )));
            }
            next.push(clip.clone());
        }

        next.sort_by_key(|c| (c.start, c.id));
        self.check_overlaps(&next)?;

        let removed = self
            .clips
            .iter()
            .filter(|c| remove.contains(&c.id))
            .cloned()
            .collect();
        self.clips = next;
        Ok(removed)
    }

    /// Audible clips may only overlap across matching cross-fades.
    fn check_overlaps(&self, clips: &[Clip]) -> Result<()> {
        let audible: Vec<&Clip> = clips.iter().filter(|c| self.is_audible_clip(c)).collect();
        for (i, a) in audible.iter().enumerate() {
            for b in audible[i + 1..].iter().take_while(|b| b.start < a.end()) {
                if !clip_ops::is_cross_faded(a, b) {
                    return Err(Error::InvariantViolation(format!(
                        "clips {} and {} overlap without a cross-fade",
                        a.id.0, b.id.0
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn takes(&self) -> &[TakeGroup] {
        &self.takes
    }

    pub fn take_group(&self, id: TakeGroupId) -> Result<&TakeGroup> {
        self.takes
            .iter()
            .find(|g| g.id == id)
            .ok_or_else(|| Error::not_found("take group", id.0))
    }

    /// Installs, replaces or (with `None`) removes a take group, returning
    /// the previous value. Clip membership is checked by [`Self::validate`],
    /// since grouping edits touch clips and groups in separate steps. The
    /// take that becomes audible must not collide with the other clips.
    pub fn set_take_group(
        &mut self,
        id: TakeGroupId,
        group: Option<TakeGroup>,
    ) -> Result<Option<TakeGroup>> {
        let saved = self.takes.clone();
        let previous = self.store_take_group(id, group)?;
        if let Err(err) = self.check_overlaps(&self.clips) {
            self.takes = saved;
            return Err(err);
        }
        Ok(previous)
    }

    fn store_take_group(
        &mut self,
        id: TakeGroupId,
        group: Option<TakeGroup>,
    ) -> Result<Option<TakeGroup>> {
        let index = self.takes.iter().position(|g| g.id == id);
        match group {
            Some(group) => {
                if group.id != id {
                    return Err(Error::InvalidArgument(format!(
                        "take group {} stored under id {}",
                        group.id.0, id.0
                    )));
                }
                if group.active >= group.len() {
                    return Err(Error::InvariantViolation(format!(
                        "take group {} has no take at index {}",
                        id.0, group.active
                    )));
                }
                match index {
                    Some(i) => Ok(Some(std::mem::replace(&mut self.takes[i], group))),
                    None => {
                        self.takes.push(group);
                        Ok(None)
                    }
                }
            }
            None => match index {
                Some(i) => Ok(Some(self.takes.remove(i))),
                None => Ok(None),
            },
        }
    }

    pub fn curves(&self) -> impl Iterator<Item = &AutomationCurve> {
        self.curves.values()
    }

    pub fn curve(&self, param: ParamId) -> Result<&AutomationCurve> {
        self.curves
            .get(&param)
            .ok_or_else(|| Error::not_found("automation curve for parameter", param.0 as u64))
    }

    pub(crate) fn curve_mut(&mut self, param: ParamId) -> Result<&mut AutomationCurve> {
        self.curves
            .get_mut(&param)
            .ok_or_else(|| Error::not_found("automation curve for parameter", param.0 as u64))
    }

    /// Installs, replaces or removes the curve for `param`. Locked curves
    /// cannot be replaced or removed, and a curve cannot arrive locked: the
    /// lock is set through its flags so the previous curve can always be
    /// put back.
    pub fn set_curve(
        &mut self,
        param: ParamId,
        curve: Option<AutomationCurve>,
    ) -> Result<Option<AutomationCurve>> {
        if let Some(curve) = &curve
            && curve.is_locked()
        {
            return Err(Error::EditLocked(format!(
                "automation curve for parameter {} cannot be installed locked",
                param.0
            )));
        }
        if let Some(existing) = self.curves.get(&param)
            && existing.is_locked()
        {
            return Err(Error::EditLocked(format!(
                "automation curve for parameter {} is locked",
                param.0
            )));
        }
        match curve {
            Some(curve) => {
                if curve.param() != param {
                    return Err(Error::InvalidArgument(format!(
                        "curve for parameter {} stored under parameter {}",
                        curve.param().0,
                        param.0
                    )));
                }
                Ok(self.curves.insert(param, curve))
            }
            None => Ok(self.curves.remove(&param)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.clips.windows(2).all(|w| (w[0].start, w[0].id) < (w[1].start, w[1].id)) {
            return Err(Error::InvariantViolation(format!(
                "clips on track {} are out of order",
                self.id.0
            )));
        }
        for clip in &self.clips {
            clip.validate()?;
            if clip.kind != self.kind {
                return Err(Error::InvariantViolation(format!(
                    "clip {} kind does not match track {}",
                    clip.id.0, self.id.0
                )));
            }
            if let Some(group) = clip.take_group {
                let group = self.take_group(group)?;
                if !group.takes.contains(&clip.id) {
                    return Err(Error::InvariantViolation(format!(
                        "clip {} is not listed in take group {}",
                        clip.id.0, group.id.0
                    )));
                }
            }
        }
        for group in &self.takes {
            if group.active >= group.len() {
                return Err(Error::InvariantViolation(format!(
                    "take group {} has an out-of-range active take",
                    group.id.0
                )));
            }
            for take in &group.takes {
                self.clip(*take)?;
            }
        }
        for curve in self.curves.values() {
            let range = curve.range();
            let ordered = curve.nodes().windows(2).all(|w| w[0].frame < w[1].frame);
            let bounded = curve
                .nodes()
                .iter()
                .all(|n| (range.min..=range.max).contains(&n.value));
            if !ordered || !bounded {
                return Err(Error::InvariantViolation(format!(
                    "automation curve {} on track {} is malformed",
                    curve.param().0,
                    self.id.0
                )));
            }
        }
        self.check_overlaps(&self.clips)
    }
}
