//! Undo and redo sequences.

use super::action::{GroupTag, StackItem};

/// Ordered undo and redo entries with optional depth limit.
#[derive(Debug, Clone, Default)]
pub struct UndoStack {
    undo: Vec<StackItem>,
    redo: Vec<StackItem>,
    max_depth: Option<usize>,
}

/// Pops the top entry and every directly preceding entry sharing its group.
/// The result is in pop order, newest first.
fn pop_group(items: &mut Vec<StackItem>) -> Vec<StackItem> {
    let Some(top) = items.pop() else {
        return Vec::new();
    };
    let group = top.group;
    let mut popped = vec![top];
    if group.is_some() {
        while items.last().is_some_and(|item| item.group == group) {
            if let Some(item) = items.pop() {
                popped.push(item);
            }
        }
    }
    popped
}

impl UndoStack {
    /// Creates an empty stack. `None` keeps every entry.
    #[must_use]
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            max_depth,
            ..Self::default()
        }
    }

    /// Records a new mutation. Clears the redo sequence.
    pub fn push(&mut self, item: StackItem) {
        self.redo.clear();
        self.push_undo(item);
    }

    /// Records an entry produced by a redo.
    pub fn push_undo(&mut self, item: StackItem) {
        self.undo.push(item);
        self.trim();
    }

    /// Records an entry produced by an undo.
    pub fn push_redo(&mut self, item: StackItem) {
        self.redo.push(item);
    }

    /// Removes the most recent undo entry together with its group.
    pub fn pop_undo_group(&mut self) -> Vec<StackItem> {
        pop_group(&mut self.undo)
    }

    /// Removes the most recent redo entry together with its group.
    pub fn pop_redo_group(&mut self) -> Vec<StackItem> {
        pop_group(&mut self.redo)
    }

    /// Puts back entries returned by a pop, given in pop order.
    pub fn restore_undo(&mut self, popped: Vec<StackItem>) {
        self.undo.extend(popped.into_iter().rev());
    }

    /// Puts back entries returned by a pop, given in pop order.
    pub fn restore_redo(&mut self, popped: Vec<StackItem>) {
        self.redo.extend(popped.into_iter().rev());
    }

    fn trim(&mut self) {
        let Some(max) = self.max_depth else {
            return;
        };
        while self.undo.len() > max {
            let group: Option<GroupTag> = self.undo[0].group;
            let end = match group {
                Some(tag) => self
                    .undo
                    .iter()
                    .position(|item| item.group != Some(tag))
                    .unwrap_or(self.undo.len()),
                None => 1,
            };
            self.undo.drain(..end);
        }
    }

    /// Undo entries, oldest first.
    #[must_use]
    pub fn undo_items(&self) -> &[StackItem] {
        &self.undo
    }

    /// Redo entries, oldest first.
    #[must_use]
    pub fn redo_items(&self) -> &[StackItem] {
        &self.redo
    }

    /// Undo listing, most recent first.
    #[must_use]
    pub fn undo_labels(&self) -> Vec<String> {
        self.undo.iter().rev().map(StackItem::label).collect()
    }

    /// Redo listing, most recent first.
    #[must_use]
    pub fn redo_labels(&self) -> Vec<String> {
        self.redo.iter().rev().map(StackItem::label).collect()
    }

    /// Returns true if there is something to undo.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Returns true if there is something to redo.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}
