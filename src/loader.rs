//! Loader: per-request orchestrator of documents, operations and commands.
//!
//! A loader owns one traversal, one command queue and one active-operation stack.
//! Discovery runs synchronously at the call site; store round trips and
//! post-processing run on an exclusive tick task, one generation at a time.

use crate::command::Command;
use crate::command_queue::CommandQueue;
use crate::config::LoaderConfig;
use crate::document::Documents;
use crate::error::{DocumentFailure, LoaderError};
use crate::operation::{Action, OperationId, OperationSpec, TraverseOptions};
use crate::pipeline::Pipeline;
use crate::runner::ExclusiveRunner;
use crate::store::Store;
use crate::traversal::{Traversal, Visit};
use futures::future::join_all;
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

struct LoaderState {
    traversal: Traversal,
    commands: CommandQueue,
    active: Vec<OperationId>,
}

struct LoaderInner {
    store: Arc<dyn Store>,
    state: Mutex<LoaderState>,
    /// Serializes discovery, command resolution and queue draining. Lock order is
    /// `control` then `state`; `state` is never held while user code runs.
    control: ReentrantMutex<()>,
    tick_runner: ExclusiveRunner,
    round_trips: AtomicU64,
}

/// Snapshot of a loader's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoaderStats {
    pub tracked_operations: usize,
    pub unvisited_operations: usize,
    pub queued_commands: usize,
    pub round_trips: u64,
    pub active_depth: usize,
}

/// Handle to a loader. Clones share the same state.
///
/// Must be used from within a tokio runtime: enqueueing work schedules the engine
/// tick with `tokio::spawn`.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

/// Keeps an operation on the active stack for as long as it lives.
struct ActiveGuard {
    inner: Weak<LoaderInner>,
    id: OperationId,
}

impl ActiveGuard {
    fn push(inner: &Weak<LoaderInner>, id: OperationId) -> Self {
        if let Some(inner) = inner.upgrade() {
            inner.state.lock().active.push(id);
        }
        Self {
            inner: inner.clone(),
            id,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.state.lock();
        match state.active.last() {
            Some(top) if *top == self.id => {
                state.active.pop();
            }
            _ => {
                warn!(operation = %self.id, "Active operation popped out of order");
                if let Some(position) = state.active.iter().rposition(|id| *id == self.id) {
                    state.active.remove(position);
                }
            }
        }
    }
}

/// One in-flight command attributed to an operation. Dropping it settles the count.
struct PendingCommand {
    inner: Weak<LoaderInner>,
    id: OperationId,
}

impl Drop for PendingCommand {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state.lock().traversal.complete_pending_command(self.id);
        }
    }
}

impl Loader {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_config(store, &LoaderConfig::default())
    }

    pub fn with_config(store: Arc<dyn Store>, config: &LoaderConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<LoaderInner>| {
            let weak = weak.clone();
            let tick_runner = ExclusiveRunner::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(inner) = weak.upgrade() {
                        Loader { inner }.tick().await;
                    }
                })
            });
            LoaderInner {
                store,
                state: Mutex::new(LoaderState {
                    traversal: Traversal::new(),
                    commands: CommandQueue::new(config.atomic),
                    active: Vec::new(),
                }),
                control: ReentrantMutex::new(()),
                tick_runner,
                round_trips: AtomicU64::new(0),
            }
        });
        debug!(
            store = inner.store.name(),
            atomic = config.atomic,
            "Loader created"
        );
        Loader { inner }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn load(
        &self,
        documents: impl Into<Documents>,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        self.run_action(Action::Load, documents.into(), TraverseOptions::default())
    }

    pub fn save(
        &self,
        documents: impl Into<Documents>,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        self.run_action(Action::Save, documents.into(), TraverseOptions::default())
    }

    pub fn delete(
        &self,
        documents: impl Into<Documents>,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        self.run_action(Action::Delete, documents.into(), TraverseOptions::default())
    }

    pub fn load_with(
        &self,
        documents: impl Into<Documents>,
        options: TraverseOptions,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        self.run_action(Action::Load, documents.into(), options)
    }

    pub fn save_with(
        &self,
        documents: impl Into<Documents>,
        options: TraverseOptions,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        self.run_action(Action::Save, documents.into(), options)
    }

    pub fn delete_with(
        &self,
        documents: impl Into<Documents>,
        options: TraverseOptions,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        self.run_action(Action::Delete, documents.into(), options)
    }

    /// Enqueue one operation per document right away; the returned future resolves
    /// once every one of them is tree-complete.
    fn run_action(
        &self,
        action: Action,
        documents: Documents,
        options: TraverseOptions,
    ) -> impl Future<Output = Result<(), LoaderError>> + Send + 'static {
        let mut waiting = Vec::with_capacity(documents.len());
        for document in documents {
            let document_type = document.document_type();
            let (tx, rx) = oneshot::channel();
            let spec = OperationSpec::new(document, action)
                .options(options)
                .on_complete(move |errors| {
                    let _ = tx.send(errors);
                });
            self.enqueue_operation(spec);
            waiting.push(async move { (document_type, rx.await) });
        }

        async move {
            let mut failures = Vec::new();
            for (document_type, outcome) in join_all(waiting).await {
                match outcome {
                    Err(_) => return Err(LoaderError::Interrupted),
                    Ok(None) => {}
                    Ok(Some(errors)) => failures.push(DocumentFailure {
                        document_type,
                        action,
                        errors,
                    }),
                }
            }
            if failures.is_empty() {
                Ok(())
            } else {
                Err(LoaderError::Documents(failures))
            }
        }
    }

    /// Track a new operation as a child of the active operation, if any, and run
    /// discovery before returning.
    pub fn enqueue_operation(&self, spec: OperationSpec) -> OperationId {
        let _control = self.inner.control.lock();
        let id = {
            let mut state = self.inner.state.lock();
            let parent = state.active.last().copied();
            let id = state.traversal.insert(spec, parent);
            debug!(operation = %id, parent = ?parent, "Operation enqueued");
            id
        };
        self.run_discovery();
        id
    }

    pub fn enqueue_command(&self, command: Command) -> bool {
        self.push_command(command, false)
    }

    /// Like `enqueue_command`, but skipped when an equal command is already waiting
    /// for the next round trip.
    pub fn enqueue_command_once(&self, command: Command) -> bool {
        self.push_command(command, true)
    }

    /// Operation new work is currently attributed to.
    pub fn active_operation(&self) -> Option<OperationId> {
        self.inner.state.lock().active.last().copied()
    }

    pub fn parent_of(&self, id: OperationId) -> Option<OperationId> {
        self.inner.state.lock().traversal.parent_of(id)
    }

    /// Commands an operation has issued so far. Zero once it is no longer tracked.
    pub fn commands_sent(&self, id: OperationId) -> usize {
        self.inner.state.lock().traversal.commands_sent(id)
    }

    pub fn stats(&self) -> LoaderStats {
        let state = self.inner.state.lock();
        LoaderStats {
            tracked_operations: state.traversal.len(),
            unvisited_operations: state.traversal.unvisited_len(),
            queued_commands: state.commands.len(),
            round_trips: self.inner.round_trips.load(Ordering::Relaxed),
            active_depth: state.active.len(),
        }
    }

    /// Stop scheduling engine ticks and wait for the one in flight. Operations still
    /// outstanding never complete; their `load`/`save`/`delete` futures stay pending
    /// until the loader is dropped.
    pub async fn close(&self) {
        self.inner.tick_runner.close().await;
        debug!("Loader closed");
    }

    fn push_command(&self, command: Command, once: bool) -> bool {
        let _control = self.inner.control.lock();
        let accepted = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let issuer = state.active.last().copied();
            match state.commands.enqueue(command, once) {
                None => false,
                Some(command) => {
                    if let Some(id) = issuer {
                        if state.traversal.add_pending_command(id) {
                            self.capture_context(command, id);
                        }
                    }
                    true
                }
            }
        };
        self.inner.tick_runner.run();
        accepted
    }

    /// Re-establish the issuing operation as active context around the command's
    /// result callbacks, record failures on it, and settle its pending count.
    fn capture_context(&self, command: &mut Command, id: OperationId) {
        let weak = Arc::downgrade(&self.inner);
        let active: Arc<Mutex<Option<ActiveGuard>>> = Arc::default();

        {
            let active = Arc::clone(&active);
            let weak = weak.clone();
            command.add_before_callbacks_listener(move || {
                *active.lock() = Some(ActiveGuard::push(&weak, id));
            });
        }
        {
            let active = Arc::clone(&active);
            command.add_after_callbacks_listener(move || {
                let guard = active.lock().take();
                drop(guard);
            });
        }

        let pending = PendingCommand {
            inner: weak.clone(),
            id,
        };
        command.on_completed(move |outcome| {
            // After listeners are skipped when a result callback fails.
            let guard = active.lock().take();
            drop(guard);
            if let Err(err) = outcome {
                if let Some(inner) = weak.upgrade() {
                    inner.state.lock().traversal.push_error(id, err.clone());
                }
            }
            drop(pending);
        });
    }

    /// Visit every undiscovered operation, in FIFO order, running prepare hooks with
    /// the operation active. Nested calls from inside a hook drain the frontier
    /// themselves.
    fn run_discovery(&self) {
        let _control = self.inner.control.lock();
        let mut visited_any = false;
        loop {
            let next = self.inner.state.lock().traversal.next_unvisited();
            let hooks = match next {
                None => break,
                Some(Visit::Skip(id)) => {
                    debug!(operation = %id, "Operation already visited");
                    continue;
                }
                Some(Visit::Prepare(hooks)) => hooks,
            };
            visited_any = true;

            let result = {
                let _active = ActiveGuard::push(&Arc::downgrade(&self.inner), hooks.id);
                hooks.prepare(self)
            };
            if let Err(err) = &result {
                debug!(
                    operation = %hooks.id,
                    action = %hooks.action(),
                    document_type = hooks.document_type(),
                    error = %err,
                    "Prepare hook failed"
                );
            }
            self.inner
                .state
                .lock()
                .traversal
                .finish_prepare(hooks.id, result);
        }
        if visited_any {
            self.inner.tick_runner.run();
        }
    }

    /// One engine tick: round trips and post-processing until there is nothing left
    /// to send, or discovery has to run again first.
    async fn tick(&self) {
        loop {
            self.flush_command_queue().await;
            self.post_process_documents().await;

            let (unvisited, queued) = {
                let state = self.inner.state.lock();
                (state.traversal.has_unvisited(), !state.commands.is_empty())
            };
            if unvisited {
                let loader = self.clone();
                tokio::spawn(async move { loader.run_discovery() });
                return;
            }
            if !queued {
                break;
            }
        }
    }

    async fn flush_command_queue(&self) {
        let mut pipeline = Pipeline::new(Arc::clone(&self.inner.store));
        let flush = {
            let _control = self.inner.control.lock();
            let mut state = self.inner.state.lock();
            state.commands.write_to_pipeline(&mut pipeline)
        };
        let Some(flush) = flush else {
            return;
        };

        self.inner.round_trips.fetch_add(1, Ordering::Relaxed);
        debug!(
            pipeline_id = pipeline.id(),
            commands = flush.len(),
            "Flushing command queue"
        );
        let loader = self.clone();
        futures::join!(
            pipeline.exec(),
            flush.settle_with(move |commands| loader.resolve_commands(commands))
        );
    }

    fn resolve_commands(&self, mut commands: Vec<Command>) {
        let _control = self.inner.control.lock();
        for command in &mut commands {
            command.resolve();
        }
    }

    /// Run post hooks one at a time for every ready operation, then fire completion
    /// callbacks for whatever became tree-complete.
    async fn post_process_documents(&self) {
        let ready = {
            let _control = self.inner.control.lock();
            self.inner.state.lock().traversal.ready_for_post_processing()
        };

        for hooks in ready {
            let check = self.inner.state.lock().traversal.begin_post_process(hooks.id);
            if let Err(err) = check {
                error!(operation = %hooks.id, error = %err, "Refusing to post-process twice");
                continue;
            }

            let result = {
                let _active = ActiveGuard::push(&Arc::downgrade(&self.inner), hooks.id);
                hooks.post_process(self).await
            };
            if let Err(err) = result {
                warn!(
                    operation = %hooks.id,
                    action = %hooks.action(),
                    document_type = hooks.document_type(),
                    error = %err,
                    "Post-processing hook failed"
                );
            }
            self.inner
                .state
                .lock()
                .traversal
                .finish_post_process(hooks.id);
        }

        let completed = self.inner.state.lock().traversal.take_completed();
        for notification in completed {
            debug!(
                operation = %notification.id,
                errors = notification.errors.as_ref().map_or(0, Vec::len),
                "Operation complete"
            );
            (notification.callback)(notification.errors);
        }
    }
}
