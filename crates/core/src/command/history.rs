use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use daw_transport::Result;

use super::Command;
use crate::session::Session;

/// A committed edit: the command that redoes it and the one that undoes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub label: String,
    pub redo: Command,
    pub undo: Command,
}

/// Linear undo/redo history.
///
/// Executing a new command drops everything that could have been redone.
/// Undo and redo re-capture the inverse each time they run, so entries stay
/// valid for the state they are applied to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct History {
    undo_stack: VecDeque<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_depth: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(History::DEFAULT_DEPTH)
    }
}

impl History {
    pub const DEFAULT_DEPTH: usize = 500;

    pub fn new(max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_depth: max_depth.max(1),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Applies `command` to `session` and records it. A rejected command
    /// leaves both the session and the history untouched.
    pub fn execute(&mut self, session: &mut Session, command: Command) -> Result<()> {
        let undo = command.apply(session)?;
        let label = command.label();
        log::debug!("execute '{label}'");
        self.push_applied(label, command, undo);
        Ok(())
    }

    /// Records an edit that has already been applied to the session.
    pub fn push_applied(&mut self, label: String, redo: Command, undo: Command) {
        if self.undo_stack.len() >= self.max_depth {
            self.undo_stack.pop_front();
        }
        self.undo_stack.push_back(HistoryEntry { label, redo, undo });
        self.redo_stack.clear();
    }

    /// Undoes the newest entry, returning its label, or `None` when there is
    /// nothing to undo.
    pub fn undo(&mut self, session: &mut Session) -> Result<Option<String>> {
        let Some(mut entry) = self.undo_stack.pop_back() else {
            return Ok(None);
        };
        match entry.undo.apply(session) {
            Ok(redo) => {
                log::debug!("undo '{}'", entry.label);
                entry.redo = redo;
                let label = entry.label.clone();
                self.redo_stack.push(entry);
                Ok(Some(label))
            }
            Err(err) => {
                self.undo_stack.push_back(entry);
                Err(err)
            }
        }
    }

    pub fn redo(&mut self, session: &mut Session) -> Result<Option<String>> {
        let Some(mut entry) = self.redo_stack.pop() else {
            return Ok(None);
        };
        match entry.redo.apply(session) {
            Ok(undo) => {
                log::debug!("redo '{}'", entry.label);
                entry.undo = undo;
                let label = entry.label.clone();
                self.undo_stack.push_back(entry);
                Ok(Some(label))
            }
            Err(err) => {
                self.redo_stack.push(entry);
                Err(err)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo_stack.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo_stack.last().map(|e| e.label.as_str())
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::TrackKind;
    use crate::track::{Track, TrackFlag, TrackId};
    use daw_transport::{Error, TempoNode};
    use proptest::prelude::*;

    fn session() -> Session {
        Session::new("Test", 44100, 120.0, 4, 4).unwrap()
    }

    fn add_track(id: u64) -> Command {
        Command::InsertTrack {
            index: 0,
            track: Box::new(Track::new(TrackId(id), format!("T{id}"), TrackKind::Audio)),
        }
    }

    #[test]
    fn test_undo_redo_labels() {
        let mut session = session();
        let mut history = History::default();
        history.execute(&mut session, add_track(1)).unwrap();
        history
            .execute(
                &mut session,
                Command::SetTrackFlag {
                    track: TrackId(1),
                    flag: TrackFlag::Muted,
                    value: true,
                },
            )
            .unwrap();

        assert_eq!(history.undo_label(), Some("Mute Track"));
        assert_eq!(history.undo(&mut session).unwrap().as_deref(), Some("Mute Track"));
        assert_eq!(history.redo_label(), Some("Mute Track"));
        assert_eq!(history.undo_label(), Some("Add Track"));
    }

    #[test]
    fn test_execute_clears_redo() {
        let mut session = session();
        let mut history = History::default();
        history.execute(&mut session, add_track(1)).unwrap();
        history.undo(&mut session).unwrap();
        assert!(history.can_redo());

        history.execute(&mut session, add_track(2)).unwrap();
        assert!(!history.can_redo());
        assert_eq!(history.redo(&mut session).unwrap(), None);
    }

    #[test]
    fn test_rejected_execute_leaves_history() {
        let mut session = session();
        let mut history = History::default();
        history.execute(&mut session, add_track(1)).unwrap();
        let err = history.execute(&mut session, add_track(1)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(history.undo_len(), 1);
    }

    #[test]
    fn test_depth_limit_drops_oldest() {
        let mut session = session();
        let mut history = History::new(2);
        for id in 1..=3 {
            history.execute(&mut session, add_track(id)).unwrap();
        }
        assert_eq!(history.undo_len(), 2);
        history.undo(&mut session).unwrap();
        history.undo(&mut session).unwrap();
        assert_eq!(history.undo(&mut session).unwrap(), None);
        assert_eq!(session.graph().tracks().len(), 1);
    }

    #[test]
    fn test_undo_on_empty_history() {
        let mut session = session();
        let mut history = History::default();
        assert_eq!(history.undo(&mut session).unwrap(), None);
        assert!(!history.can_undo());
    }

    fn arbitrary_command(seed: u8, step: u64) -> Command {
        match seed % 4 {
            0 => add_track(step + 1),
            1 => Command::InsertTempoNode {
                node: TempoNode::new(1000 * (step + 1), 60.0 + step as f64, 3, 4),
            },
            2 => Command::SetLoopRange {
                range: Some(crate::session::FrameRange::new(step, step + 10).unwrap()),
            },
            _ => Command::SetTrackFlag {
                track: TrackId(1),
                flag: TrackFlag::Soloed,
                value: step % 2 == 0,
            },
        }
    }

    proptest! {
        #[test]
        fn prop_undo_all_restores_initial_state(seeds in proptest::collection::vec(any::<u8>(), 1..25)) {
            let mut session = session();
            let initial = session.clone();
            let mut history = History::default();

            let mut applied = 0;
            for (step, seed) in seeds.iter().enumerate() {
                if history.execute(&mut session, arbitrary_command(*seed, step as u64)).is_ok() {
                    applied += 1;
                }
            }
            let edited = session.clone();

            for _ in 0..applied {
                prop_assert!(history.undo(&mut session).unwrap().is_some());
            }
            prop_assert_eq!(&session, &initial);

            for _ in 0..applied {
                prop_assert!(history.redo(&mut session).unwrap().is_some());
            }
            prop_assert_eq!(&session, &edited);
        }
    }
}
