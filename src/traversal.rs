//! Traversal: operation arena, discovery frontier and completion tracking.
//!
//! Pure bookkeeping. Hooks are never invoked from here; the loader pulls
//! [`OperationHooks`] out, runs them without holding any lock, and reports back.

use crate::error::{DocumentError, HookResult, LoaderError};
use crate::operation::{CompletionCallback, Operation, OperationHooks, OperationId, OperationSpec};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

pub(crate) enum Visit {
    Prepare(OperationHooks),
    Skip(OperationId),
}

/// A completion callback due to fire, with the operation's errors.
pub(crate) struct Notification {
    pub id: OperationId,
    pub callback: CompletionCallback,
    pub errors: Option<Vec<DocumentError>>,
}

#[derive(Default)]
pub(crate) struct Traversal {
    operations: BTreeMap<OperationId, Operation>,
    unvisited: VecDeque<OperationId>,
    visited: BTreeSet<OperationId>,
    next_id: u64,
}

impl Traversal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new operation and queue it for discovery.
    ///
    /// A parent that is no longer tracked has already completed; the operation
    /// becomes a root instead.
    pub fn insert(&mut self, spec: OperationSpec, parent: Option<OperationId>) -> OperationId {
        let id = OperationId(self.next_id);
        self.next_id += 1;

        let parent = match parent {
            Some(parent_id) => match self.operations.get_mut(&parent_id) {
                Some(parent) => {
                    parent.children.push(id);
                    Some(parent_id)
                }
                None => {
                    warn!(
                        operation = %id,
                        parent = %parent_id,
                        "Parent operation no longer tracked, enqueueing as root"
                    );
                    None
                }
            },
            None => None,
        };

        self.operations.insert(id, Operation::new(id, spec, parent));
        self.unvisited.push_back(id);
        id
    }

    pub fn has_unvisited(&self) -> bool {
        !self.unvisited.is_empty()
    }

    pub fn unvisited_len(&self) -> usize {
        self.unvisited.len()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Next operation in FIFO discovery order.
    pub fn next_unvisited(&mut self) -> Option<Visit> {
        let id = self.unvisited.pop_front()?;
        match self.operations.get(&id) {
            Some(op) if !op.visited => Some(Visit::Prepare(op.hooks())),
            _ => Some(Visit::Skip(id)),
        }
    }

    /// Record the prepare outcome. The operation counts as visited either way.
    pub fn finish_prepare(&mut self, id: OperationId, result: HookResult) {
        if let Some(op) = self.operations.get_mut(&id) {
            op.visited = true;
            if let Err(err) = result {
                op.errors.push(err);
            }
            self.visited.insert(id);
        }
    }

    pub fn parent_of(&self, id: OperationId) -> Option<OperationId> {
        self.operations.get(&id)?.parent
    }

    pub fn children_of(&self, id: OperationId) -> Vec<OperationId> {
        self.operations
            .get(&id)
            .map(|op| op.children.clone())
            .unwrap_or_default()
    }

    /// Returns `false` when the operation is no longer tracked.
    pub fn add_pending_command(&mut self, id: OperationId) -> bool {
        match self.operations.get_mut(&id) {
            Some(op) => {
                op.add_pending_command();
                true
            }
            None => false,
        }
    }

    pub fn complete_pending_command(&mut self, id: OperationId) {
        if let Some(op) = self.operations.get_mut(&id) {
            op.complete_pending_command();
        }
    }

    pub fn commands_sent(&self, id: OperationId) -> usize {
        self.operations.get(&id).map_or(0, |op| op.commands_sent)
    }

    pub fn push_error(&mut self, id: OperationId, error: DocumentError) {
        match self.operations.get_mut(&id) {
            Some(op) => op.errors.push(error),
            None => warn!(operation = %id, error = %error, "Error for untracked operation"),
        }
    }

    /// Visited operations with nothing in flight, in creation order.
    pub fn ready_for_post_processing(&self) -> Vec<OperationHooks> {
        self.visited
            .iter()
            .filter_map(|id| self.operations.get(id))
            .filter(|op| op.ready_for_post_process())
            .map(Operation::hooks)
            .collect()
    }

    pub fn begin_post_process(&self, id: OperationId) -> Result<(), LoaderError> {
        match self.operations.get(&id) {
            Some(op) if op.post_process_complete => Err(LoaderError::PostProcessAlreadyComplete(id)),
            _ => Ok(()),
        }
    }

    pub fn finish_post_process(&mut self, id: OperationId) {
        if let Some(op) = self.operations.get_mut(&id) {
            op.post_process_complete = true;
        }
    }

    /// Recomputed from scratch on every call.
    pub fn is_tree_complete(&self, id: OperationId) -> bool {
        match self.operations.get(&id) {
            Some(op) => {
                op.node_complete() && op.children.iter().all(|child| self.is_tree_complete(*child))
            }
            None => true,
        }
    }

    /// Collect the callbacks of every newly tree-complete operation, children before
    /// parents. Completed roots are dropped from the arena along with their subtree.
    pub fn take_completed(&mut self) -> Vec<Notification> {
        let completed: Vec<OperationId> = self
            .visited
            .iter()
            .copied()
            .filter(|id| self.is_tree_complete(*id))
            .collect();

        let mut notifications = Vec::new();
        for id in &completed {
            if self.visited.remove(id) {
                self.collect_notifications(*id, &mut notifications);
            }
        }

        for id in completed {
            let is_root = self
                .operations
                .get(&id)
                .map_or(false, |op| op.parent.is_none());
            if is_root {
                self.remove_subtree(id);
            }
        }
        notifications
    }

    fn collect_notifications(&mut self, id: OperationId, out: &mut Vec<Notification>) {
        for child in self.children_of(id) {
            self.visited.remove(&child);
            self.collect_notifications(child, out);
        }
        if let Some(op) = self.operations.get_mut(&id) {
            if let Some(callback) = op.on_complete.take() {
                let errors = (!op.errors.is_empty()).then(|| op.errors.clone());
                out.push(Notification {
                    id,
                    callback,
                    errors,
                });
            }
        }
    }

    fn remove_subtree(&mut self, id: OperationId) {
        if let Some(op) = self.operations.remove(&id) {
            self.visited.remove(&id);
            debug!(
                operation = %id,
                action = %op.action(),
                commands_sent = op.commands_sent,
                errors = op.errors.len(),
                "Operation tree complete"
            );
            for child in op.children {
                self.remove_subtree(child);
            }
        }
    }
}
