//! Bounded undo/redo over [`EditAction`]s

use std::collections::VecDeque;

use crate::annotations::AnnotationStore;
use crate::operations::EditAction;
use tracing::debug;

#[derive(Debug)]
pub struct HistoryManager {
    capacity: usize,
    undo: VecDeque<EditAction>,
    redo: Vec<EditAction>,
}

impl HistoryManager {
    /// A capacity of zero keeps no history at all
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            undo: VecDeque::with_capacity(capacity.min(256)),
            redo: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an action that has already been applied to the store
    pub fn push(&mut self, action: EditAction) {
        self.redo.clear();
        if self.capacity == 0 {
            return;
        }
        if self.undo.len() == self.capacity {
            if let Some(dropped) = self.undo.pop_front() {
                debug!(kind = dropped.kind(), "history full, dropping oldest action");
            }
        }
        self.undo.push_back(action);
    }

    pub fn undo(&mut self, store: &mut AnnotationStore) -> Option<&EditAction> {
        let action = self.undo.pop_back()?;
        action.revert(store);
        self.redo.push(action);
        self.redo.last()
    }

    pub fn redo(&mut self, store: &mut AnnotationStore) -> Option<&EditAction> {
        let action = self.redo.pop()?;
        action.apply(store);
        self.undo.push_back(action);
        self.undo.back()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
