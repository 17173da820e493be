//! Reversible commands.
//!
//! Each mutation is recorded as a [`StackItem`] holding the [`Action`] that
//! reverses it. Entries sharing a [`GroupTag`] are undone and redone as one.

mod action;
mod stack;

pub use action::{Action, GroupTag, Snapshot, StackAction, StackItem};
pub use stack::UndoStack;
