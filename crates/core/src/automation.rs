//! Automation curves: time-ordered breakpoints evaluated at any frame.
//!
//! A curve belongs to exactly one parameter of one track. Values are always
//! kept inside the parameter's [`ValueRange`]; inserts clamp, evaluation clamps
//! spline overshoot.

use serde::{Deserialize, Serialize};

use daw_transport::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

impl ParamId {
    pub const GAIN: ParamId = ParamId(0);
    pub const PAN: ParamId = ParamId(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64, default: f64) -> Result<Self> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(Error::InvalidArgument(format!(
                "value range [{min}, {max}] is empty"
            )));
        }
        if !(min..=max).contains(&default) {
            return Err(Error::InvalidArgument(format!(
                "default {default} outside [{min}, {max}]"
            )));
        }
        Ok(Self { min, max, default })
    }

    pub fn unit() -> Self {
        Self {
            min: 0.0,
            max: 1.0,
            default: 0.0,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        Self::unit()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    Hold,
    #[default]
    Linear,
    Spline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveNode {
    pub frame: u64,
    pub value: f64,
}

impl CurveNode {
    pub fn new(frame: u64, value: f64) -> Self {
        Self { frame, value }
    }
}

/// Mode switches of a curve, changed together as one edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveFlags {
    pub interpolation: Interpolation,
    pub logarithmic: bool,
    pub locked: bool,
    pub play: bool,
    pub record: bool,
}

impl Default for CurveFlags {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Linear,
            logarithmic: false,
            locked: false,
            play: true,
            record: false,
        }
    }
}

/// Fraction of the range span treated as silence in logarithmic mode.
const LOG_FLOOR: f64 = 1e-5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationCurve {
    param: ParamId,
    range: ValueRange,
    nodes: Vec<CurveNode>,
    flags: CurveFlags,
}

impl AutomationCurve {
    pub fn new(param: ParamId, range: ValueRange) -> Self {
        Self {
            param,
            range,
            nodes: Vec::new(),
            flags: CurveFlags::default(),
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.flags.interpolation = interpolation;
        self
    }

    pub fn with_logarithmic(mut self, logarithmic: bool) -> Self {
        self.flags.logarithmic = logarithmic;
        self
    }

    pub fn param(&self) -> ParamId {
        self.param
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn flags(&self) -> CurveFlags {
        self.flags
    }

    pub fn interpolation(&self) -> Interpolation {
        self.flags.interpolation
    }

    pub fn is_locked(&self) -> bool {
        self.flags.locked
    }

    pub fn is_play_enabled(&self) -> bool {
        self.flags.play
    }

    pub fn is_record_enabled(&self) -> bool {
        self.flags.record
    }

    /// Replaces the mode flags, returning the previous ones. Allowed on a
    /// locked curve so the lock itself can be released.
    pub fn set_flags(&mut self, flags: CurveFlags) -> CurveFlags {
        std::mem::replace(&mut self.flags, flags)
    }

    pub fn nodes(&self) -> &[CurveNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&CurveNode> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, frame: u64) -> Option<usize> {
        self.nodes.binary_search_by_key(&frame, |n| n.frame).ok()
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.flags.locked {
            return Err(Error::EditLocked(format!(
                "automation curve for parameter {} is locked",
                self.param.0
            )));
        }
        Ok(())
    }

    fn checked(&self, node: CurveNode) -> Result<CurveNode> {
        if !node.value.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "non-finite automation value at frame {}",
                node.frame
            )));
        }
        Ok(CurveNode {
            frame: node.frame,
            value: self.range.clamp(node.value),
        })
    }

    /// Inserts a breakpoint, clamping its value. A breakpoint already at the
    /// same frame is an invariant violation; use [`Self::set_node`] to replace.
    pub fn insert_node(&mut self, node: CurveNode) -> Result<usize> {
        self.ensure_unlocked()?;
        let node = self.checked(node)?;
        match self.nodes.binary_search_by_key(&node.frame, |n| n.frame) {
            Ok(_) => Err(Error::InvariantViolation(format!(
                "automation node already exists at frame {}",
                node.frame
            ))),
            Err(index) => {
                self.nodes.insert(index, node);
                Ok(index)
            }
        }
    }

    /// Inserts or replaces the breakpoint at `node.frame`, returning the one
    /// it replaced.
    pub fn set_node(&mut self, node: CurveNode) -> Result<Option<CurveNode>> {
        self.ensure_unlocked()?;
        let node = self.checked(node)?;
        match self.nodes.binary_search_by_key(&node.frame, |n| n.frame) {
            Ok(index) => Ok(Some(std::mem::replace(&mut self.nodes[index], node))),
            Err(index) => {
                self.nodes.insert(index, node);
                Ok(None)
            }
        }
    }

    /// Moves or re-values an existing breakpoint without changing its rank.
    pub fn update_node(&mut self, index: usize, node: CurveNode) -> Result<CurveNode> {
        self.ensure_unlocked()?;
        let node = self.checked(node)?;
        if index >= self.nodes.len() {
            return Err(Error::not_found("automation node", index as u64));
        }
        let after_prev = index == 0 || self.nodes[index - 1].frame < node.frame;
        let before_next = index + 1 >= self.nodes.len() || node.frame < self.nodes[index + 1].frame;
        if !(after_prev && before_next) {
            return Err(Error::InvariantViolation(format!(
                "moving node {index} to frame {} would reorder the curve",
                node.frame
            )));
        }
        Ok(std::mem::replace(&mut self.nodes[index], node))
    }

    pub fn remove_node(&mut self, index: usize) -> Result<CurveNode> {
        self.ensure_unlocked()?;
        if index >= self.nodes.len() {
            return Err(Error::not_found("automation node", index as u64));
        }
        Ok(self.nodes.remove(index))
    }

    pub fn remove_node_at(&mut self, frame: u64) -> Result<CurveNode> {
        match self.index_of(frame) {
            Some(index) => self.remove_node(index),
            None => Err(Error::not_found("automation node at frame", frame)),
        }
    }

    /// Value at `frame`. Holds the first value before the first node and the
    /// last value after the last; an empty curve yields the range default.
    pub fn evaluate(&self, frame: u64) -> f64 {
        let nodes = &self.nodes;
        let Some(first) = nodes.first() else {
            return self.range.default;
        };
        // Number of nodes at or before `frame`
        let after = nodes.partition_point(|n| n.frame <= frame);
        if after == 0 {
            return first.value;
        }
        if after == nodes.len() {
            return nodes[after - 1].value;
        }

        let left = after - 1;
        let (a, b) = (nodes[left], nodes[after]);
        if self.flags.interpolation == Interpolation::Hold || a.frame == frame {
            return a.value;
        }

        let t = (frame - a.frame) as f64 / (b.frame - a.frame) as f64;
        let spline = self.flags.interpolation == Interpolation::Spline
            && left > 0
            && after + 1 < nodes.len();

        let value = if spline {
            let p = [
                self.to_curve_space(nodes[left - 1].value),
                self.to_curve_space(a.value),
                self.to_curve_space(b.value),
                self.to_curve_space(nodes[after + 1].value),
            ];
            self.from_curve_space(catmull_rom(p, t))
        } else {
            let (va, vb) = (self.to_curve_space(a.value), self.to_curve_space(b.value));
            self.from_curve_space(va + (vb - va) * t)
        };
        self.range.clamp(value)
    }

    fn log_floor(&self) -> f64 {
        self.range.span() * LOG_FLOOR
    }

    fn to_curve_space(&self, value: f64) -> f64 {
        if !self.flags.logarithmic {
            return value;
        }
        (value - self.range.min).max(self.log_floor()).ln()
    }

    fn from_curve_space(&self, value: f64) -> f64 {
        if !self.flags.logarithmic {
            return value;
        }
        let x = value.exp();
        // The floor stands in for "minus infinity": snap it back to the minimum.
        if x <= self.log_floor() * (1.0 + 1e-9) {
            self.range.min
        } else {
            self.range.min + x
        }
    }
}

/// Uniform Catmull-Rom between `p[1]` and `p[2]`.
fn catmull_rom(p: [f64; 4], t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * (2.0 * p[1]
        + (p[2] - p[0]) * t
        + (2.0 * p[0] - 5.0 * p[1] + 4.0 * p[2] - p[3]) * t2
        + (3.0 * p[1] - p[0] - 3.0 * p[2] + p[3]) * t3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn curve(interpolation: Interpolation) -> AutomationCurve {
        let mut curve =
            AutomationCurve::new(ParamId::GAIN, ValueRange::unit()).with_interpolation(interpolation);
        curve.insert_node(CurveNode::new(0, 0.2)).unwrap();
        curve.insert_node(CurveNode::new(10, 0.8)).unwrap();
        curve
    }

    #[test]
    fn test_hold_returns_left_value() {
        assert_relative_eq!(curve(Interpolation::Hold).evaluate(5), 0.2);
        assert_relative_eq!(curve(Interpolation::Hold).evaluate(10), 0.8);
    }

    #[test]
    fn test_linear_midpoint() {
        assert_relative_eq!(curve(Interpolation::Linear).evaluate(5), 0.5);
    }

    #[test]
    fn test_outside_nodes_holds_edges() {
        let mut curve = AutomationCurve::new(ParamId::GAIN, ValueRange::unit());
        curve.insert_node(CurveNode::new(100, 0.3)).unwrap();
        curve.insert_node(CurveNode::new(200, 0.6)).unwrap();
        assert_relative_eq!(curve.evaluate(0), 0.3);
        assert_relative_eq!(curve.evaluate(10_000), 0.6);
    }

    #[test]
    fn test_empty_curve_uses_default() {
        let range = ValueRange::new(-1.0, 1.0, 0.25).unwrap();
        let curve = AutomationCurve::new(ParamId::PAN, range);
        assert_relative_eq!(curve.evaluate(42), 0.25);
    }

    #[test]
    fn test_insert_clamps_to_range() {
        let mut curve = AutomationCurve::new(ParamId::GAIN, ValueRange::unit());
        curve.insert_node(CurveNode::new(0, 4.0)).unwrap();
        curve.insert_node(CurveNode::new(5, -1.0)).unwrap();
        assert_eq!(curve.nodes()[0].value, 1.0);
        assert_eq!(curve.nodes()[1].value, 0.0);
    }

    #[test]
    fn test_duplicate_frame_rejected() {
        let mut curve = curve(Interpolation::Linear);
        let err = curve.insert_node(CurveNode::new(10, 0.1)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(curve.len(), 2);
    }

    #[test]
    fn test_set_node_replaces_existing() {
        let mut curve = curve(Interpolation::Linear);
        let prior = curve.set_node(CurveNode::new(10, 0.1)).unwrap();
        assert_eq!(prior, Some(CurveNode::new(10, 0.8)));
        assert_eq!(curve.set_node(CurveNode::new(20, 0.5)).unwrap(), None);
        assert_eq!(curve.len(), 3);
    }

    #[test]
    fn test_update_cannot_reorder() {
        let mut curve = curve(Interpolation::Linear);
        curve.insert_node(CurveNode::new(20, 0.5)).unwrap();
        assert!(curve.update_node(1, CurveNode::new(25, 0.5)).is_err());
        let old = curve.update_node(1, CurveNode::new(15, 0.5)).unwrap();
        assert_eq!(old, CurveNode::new(10, 0.8));
    }

    #[test]
    fn test_locked_curve_rejects_edits() {
        let mut curve = curve(Interpolation::Linear);
        let before = curve.clone();
        curve.set_flags(CurveFlags {
            locked: true,
            ..curve.flags()
        });

        assert!(matches!(
            curve.insert_node(CurveNode::new(3, 0.1)),
            Err(Error::EditLocked(_))
        ));
        assert!(matches!(curve.remove_node(0), Err(Error::EditLocked(_))));
        assert!(matches!(
            curve.update_node(0, CurveNode::new(0, 0.9)),
            Err(Error::EditLocked(_))
        ));
        assert_eq!(curve.nodes(), before.nodes());
    }

    #[test]
    fn test_spline_falls_back_to_linear_at_edges() {
        let curve = curve(Interpolation::Spline);
        assert_relative_eq!(curve.evaluate(5), 0.5);
    }

    #[test]
    fn test_spline_passes_through_nodes() {
        let mut curve = AutomationCurve::new(ParamId::GAIN, ValueRange::unit())
            .with_interpolation(Interpolation::Spline);
        for (frame, value) in [(0, 0.1), (10, 0.4), (20, 0.9), (30, 0.3)] {
            curve.insert_node(CurveNode::new(frame, value)).unwrap();
        }
        assert_relative_eq!(curve.evaluate(10), 0.4);
        assert_relative_eq!(curve.evaluate(20), 0.9);
        let mid = curve.evaluate(15);
        assert!(mid > 0.4 && mid < 1.0, "spline midpoint {mid}");
    }

    #[test]
    fn test_logarithmic_interpolates_in_log_space() {
        let range = ValueRange::new(0.0, 2.0, 1.0).unwrap();
        let mut curve = AutomationCurve::new(ParamId::GAIN, range).with_logarithmic(true);
        curve.insert_node(CurveNode::new(0, 0.5)).unwrap();
        curve.insert_node(CurveNode::new(100, 2.0)).unwrap();
        // geometric mean of 0.5 and 2.0
        assert_relative_eq!(curve.evaluate(50), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_logarithmic_zero_stays_zero() {
        let mut curve =
            AutomationCurve::new(ParamId::GAIN, ValueRange::unit()).with_logarithmic(true);
        curve.insert_node(CurveNode::new(0, 0.0)).unwrap();
        curve.insert_node(CurveNode::new(10, 0.0)).unwrap();
        assert_eq!(curve.evaluate(5), 0.0);
    }

    proptest! {
        #[test]
        fn prop_evaluate_stays_in_range(
            values in proptest::collection::vec(-2.0f64..3.0, 1..12),
            frame in 0u64..2000,
            interp in 0usize..3,
            log in any::<bool>(),
        ) {
            let interpolation = [Interpolation::Hold, Interpolation::Linear, Interpolation::Spline][interp];
            let mut curve = AutomationCurve::new(ParamId::GAIN, ValueRange::unit())
                .with_interpolation(interpolation)
                .with_logarithmic(log);
            for (i, value) in values.iter().enumerate() {
                curve.insert_node(CurveNode::new(i as u64 * 150, *value)).unwrap();
            }
            let v = curve.evaluate(frame);
            prop_assert!((0.0..=1.0).contains(&v), "value {} out of range", v);
        }

        #[test]
        fn prop_nodes_stay_sorted(frames in proptest::collection::vec(0u64..500, 1..30)) {
            let mut curve = AutomationCurve::new(ParamId::GAIN, ValueRange::unit());
            for frame in frames {
                let _ = curve.insert_node(CurveNode::new(frame, 0.5));
            }
            prop_assert!(curve.nodes().windows(2).all(|w| w[0].frame < w[1].frame));
        }
    }
}
