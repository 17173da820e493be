//! Undo and redo replay.

use std::fmt;

use tracing::{debug, warn};

use crate::command::StackItem;
use crate::error::{EditResult, ExecutionError};
use crate::id::SettingId;

use super::{CommandOutcome, ConfigEditor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigEditor {
    /// Reverts the most recent command (a whole group at once) and moves it
    /// to the redo sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::EmptyStack`] if there is nothing to undo and
    /// [`ExecutionError::UndoInProgress`] if called while a replay runs.
    pub fn undo(&mut self) -> EditResult<CommandOutcome> {
        self.replay(Direction::Undo)
    }

    /// Re-applies the most recently undone command.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::undo`].
    pub fn redo(&mut self) -> EditResult<CommandOutcome> {
        self.replay(Direction::Redo)
    }

    fn replay(&mut self, direction: Direction) -> EditResult<CommandOutcome> {
        if self.performing_undo {
            warn!(%direction, "nested replay rejected");
            return Err(ExecutionError::UndoInProgress.into());
        }
        let popped = match direction {
            Direction::Undo => self.stack.pop_undo_group(),
            Direction::Redo => self.stack.pop_redo_group(),
        };
        if popped.is_empty() {
            return Err(ExecutionError::EmptyStack {
                direction: direction.as_str(),
            }
            .into());
        }
        self.performing_undo = true;
        let result = self.replay_items(direction, popped);
        self.performing_undo = false;
        let ids = result?;
        debug!(%direction, changed = ids.len(), "replay finished");
        Ok(self.finish(ids))
    }

    /// Executes each entry's inverse in pop order and files the resulting
    /// entries on the opposite sequence. On failure, the steps already
    /// replayed are reversed and the whole group goes back where it came
    /// from.
    fn replay_items(
        &mut self,
        direction: Direction,
        popped: Vec<StackItem>,
    ) -> EditResult<Vec<SettingId>> {
        let mut ids = Vec::new();
        let mut replayed: Vec<StackItem> = Vec::new();
        let mut failure = None;
        for item in &popped {
            match self.execute(&item.inverse) {
                Ok(Some(applied)) => {
                    ids.extend(applied.ids.iter().cloned());
                    replayed.push(self.record(applied, item.group));
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, %direction, name = %item.name, "replay step failed");
                    failure = Some(error);
                    break;
                }
            }
        }
        if let Some(error) = failure {
            self.roll_back(replayed.iter().map(|entry| &entry.inverse));
            match direction {
                Direction::Undo => self.stack.restore_undo(popped),
                Direction::Redo => self.stack.restore_redo(popped),
            }
            return Err(error);
        }
        for entry in replayed {
            match direction {
                Direction::Undo => self.stack.push_redo(entry),
                Direction::Redo => self.stack.push_undo(entry),
            }
        }
        Ok(ids)
    }

    /// Undo listing, most recent first.
    #[must_use]
    pub fn undo_labels(&self) -> Vec<String> {
        self.stack.undo_labels()
    }

    /// Redo listing, most recent first.
    #[must_use]
    pub fn redo_labels(&self) -> Vec<String> {
        self.stack.redo_labels()
    }

    /// Returns true if there is something to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.stack.can_undo()
    }

    /// Returns true if there is something to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.stack.can_redo()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::editor;
    use crate::error::{EditError, ExecutionError};
    use crate::id::SettingId;
    use crate::setting::Variable;
    use crate::storage::SettingView;

    #[test]
    fn empty_stacks_report_direction() {
        let mut editor = editor();
        assert_eq!(
            editor.undo().unwrap_err(),
            EditError::Execution(ExecutionError::EmptyStack { direction: "undo" })
        );
        assert_eq!(
            editor.redo().unwrap_err(),
            EditError::Execution(ExecutionError::EmptyStack { direction: "redo" })
        );
    }

    #[test]
    fn undo_then_redo_restores_value() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        editor.set_value(&a, "2").unwrap();
        editor.set_value(&a, "3").unwrap();
        assert_eq!(editor.undo_labels(), vec!["Changed env=A", "Changed env=A"]);

        let outcome = editor.undo().unwrap();
        assert_eq!(outcome.ids, vec![a.clone()]);
        assert_eq!(editor.get_setting(&a).unwrap().value(), Some("2"));
        assert_eq!(editor.redo_labels(), vec!["Changed env=A"]);

        editor.redo().unwrap();
        assert_eq!(editor.get_setting(&a).unwrap().value(), Some("3"));
        assert!(!editor.can_redo());
    }

    #[test]
    fn new_command_clears_redo() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        editor.set_value(&a, "2").unwrap();
        editor.undo().unwrap();
        assert!(editor.can_redo());
        editor.set_value(&a, "5").unwrap();
        assert!(!editor.can_redo());
    }

    #[test]
    fn failed_group_replay_is_reverted_whole() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        let renamed = SettingId::option("env", "A2");
        editor.rename_variable(&a, "A2").unwrap();
        let before = editor.dump();
        let labels = editor.undo_labels();
        assert_eq!(labels.len(), 2);

        // Bring the old name back behind the stack's back so the group's
        // last step cannot run.
        editor.store.add_variable(Variable::new(a.clone(), "9"));
        let err = editor.undo().unwrap_err();
        assert!(err.is_validation());

        assert!(editor.store().is_real(&renamed));
        assert_eq!(editor.undo_labels(), labels);
        assert!(!editor.can_redo());
        editor.store.remove_variable(&a);
        assert_eq!(editor.dump(), before);
    }

    #[test]
    fn failed_replay_keeps_entry() {
        let mut editor = editor();
        let a = SettingId::option("env", "A");
        editor.set_value(&a, "2").unwrap();
        // Remove the variable behind the stack's back so the inverse cannot run.
        editor.store.remove_variable(&a);
        assert!(editor.undo().unwrap_err().is_execution());
        assert_eq!(editor.undo_labels(), vec!["Changed env=A"]);
        assert!(!editor.performing_undo);
    }
}
