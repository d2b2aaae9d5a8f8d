//! Automation recording: control movements captured while the transport is
//! recording land on the curve immediately and become one undo step when the
//! pass ends.

use serde::{Deserialize, Serialize};

use daw_transport::{Error, Result};

use crate::automation::{CurveNode, ParamId};
use crate::command::{Command, History};
use crate::session::Session;
use crate::track::TrackId;

/// A control value observed at a transport frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub track: TrackId,
    pub param: ParamId,
    pub frame: u64,
    pub value: f64,
}

#[derive(Debug, Default)]
pub struct RecordPass {
    applied: Vec<Command>,
    inverses: Vec<Command>,
}

impl RecordPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Writes one captured value into its curve. The curve must exist, be
    /// record-enabled and unlocked.
    pub fn capture(&mut self, session: &mut Session, event: CapturedEvent) -> Result<()> {
        let curve = session.graph().track(event.track)?.curve(event.param)?;
        if !curve.is_record_enabled() {
            return Err(Error::InvalidArgument(format!(
                "automation for parameter {} on track {} is not armed for recording",
                event.param.0, event.track.0
            )));
        }

        let command = Command::SetCurveNode {
            track: event.track,
            param: event.param,
            node: CurveNode::new(event.frame, event.value),
        };
        let inverse = command.apply(session)?;
        self.applied.push(command);
        self.inverses.push(inverse);
        Ok(())
    }

    /// Ends the pass, recording everything captured as a single history
    /// entry. Returns whether an entry was added.
    pub fn finish(self, history: &mut History) -> bool {
        if self.applied.is_empty() {
            return false;
        }
        let label = "Record Automation".to_string();
        log::info!("{label}: {} points", self.applied.len());
        let mut inverses = self.inverses;
        inverses.reverse();
        history.push_applied(
            label.clone(),
            Command::Macro {
                label: label.clone(),
                commands: self.applied,
            },
            Command::Macro {
                label,
                commands: inverses,
            },
        );
        true
    }

    /// Throws the pass away, restoring every touched curve.
    pub fn abort(self, session: &mut Session) -> Result<()> {
        for inverse in self.inverses.into_iter().rev() {
            inverse.apply(session)?;
        }
        Ok(())
    }
}
