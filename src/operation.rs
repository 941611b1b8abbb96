//! Operation: one (document, action) node of the traversal tree.

use crate::document::Document;
use crate::error::{DocumentError, HookResult};
use crate::loader::Loader;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Index of an operation in the loader's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OperationId(pub(crate) u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Load,
    Save,
    Delete,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Load => "load",
            Action::Save => "save",
            Action::Delete => "delete",
        })
    }
}

/// Options applied to every operation of one `load`/`save`/`delete` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraverseOptions {
    /// Run the load hooks as part of saving.
    pub load_on_save: bool,
}

/// Opaque caller data handed through to hooks.
pub type CustomData = Arc<dyn Any + Send + Sync>;

/// Receives an operation's errors once its whole subtree is complete.
pub type CompletionCallback = Box<dyn FnOnce(Option<Vec<DocumentError>>) + Send>;

/// What a hook knows about the operation invoking it.
#[derive(Clone)]
pub struct HookContext {
    pub action: Action,
    pub custom_data: Option<CustomData>,
    pub options: TraverseOptions,
}

impl HookContext {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            custom_data: None,
            options: TraverseOptions::default(),
        }
    }

    /// Custom data, if present and of type `T`.
    pub fn custom_data<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.custom_data.as_ref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("action", &self.action)
            .field("custom_data", &self.custom_data.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// Request for a new operation, handed to `Loader::enqueue_operation`.
pub struct OperationSpec {
    pub(crate) document: Arc<dyn Document>,
    pub(crate) action: Action,
    pub(crate) custom_data: Option<CustomData>,
    pub(crate) options: TraverseOptions,
    pub(crate) on_complete: Option<CompletionCallback>,
}

impl OperationSpec {
    pub fn new(document: Arc<dyn Document>, action: Action) -> Self {
        Self {
            document,
            action,
            custom_data: None,
            options: TraverseOptions::default(),
            on_complete: None,
        }
    }

    pub fn load(document: Arc<dyn Document>) -> Self {
        Self::new(document, Action::Load)
    }

    pub fn save(document: Arc<dyn Document>) -> Self {
        Self::new(document, Action::Save)
    }

    pub fn delete(document: Arc<dyn Document>) -> Self {
        Self::new(document, Action::Delete)
    }

    pub fn custom_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.custom_data = Some(Arc::new(data));
        self
    }

    pub fn options(mut self, options: TraverseOptions) -> Self {
        self.options = options;
        self
    }

    /// Called with the accumulated errors (or `None`) once this operation and every
    /// descendant is complete.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<Vec<DocumentError>>) + Send + 'static,
    {
        self.on_complete = Some(Box::new(callback));
        self
    }
}

pub(crate) struct Operation {
    pub id: OperationId,
    pub document: Arc<dyn Document>,
    pub cx: HookContext,
    pub on_complete: Option<CompletionCallback>,
    pub parent: Option<OperationId>,
    pub children: Vec<OperationId>,
    pub pending_commands: usize,
    pub commands_sent: usize,
    pub visited: bool,
    pub post_process_complete: bool,
    pub errors: Vec<DocumentError>,
}

impl Operation {
    pub fn new(id: OperationId, spec: OperationSpec, parent: Option<OperationId>) -> Self {
        Self {
            id,
            document: spec.document,
            cx: HookContext {
                action: spec.action,
                custom_data: spec.custom_data,
                options: spec.options,
            },
            on_complete: spec.on_complete,
            parent,
            children: Vec::new(),
            pending_commands: 0,
            commands_sent: 0,
            visited: false,
            post_process_complete: false,
            errors: Vec::new(),
        }
    }

    pub fn action(&self) -> Action {
        self.cx.action
    }

    /// Visited, nothing in flight, and not yet post-processed.
    pub fn ready_for_post_process(&self) -> bool {
        self.visited && self.pending_commands == 0 && !self.post_process_complete
    }

    /// This node alone, ignoring children.
    pub fn node_complete(&self) -> bool {
        self.visited && self.post_process_complete && self.pending_commands == 0
    }

    pub fn add_pending_command(&mut self) {
        self.pending_commands += 1;
        self.commands_sent += 1;
    }

    pub fn complete_pending_command(&mut self) {
        self.pending_commands = self.pending_commands.saturating_sub(1);
    }

    pub fn hooks(&self) -> OperationHooks {
        OperationHooks {
            id: self.id,
            document: Arc::clone(&self.document),
            cx: self.cx.clone(),
        }
    }
}

/// Everything needed to invoke an operation's hooks without holding loader state.
#[derive(Clone)]
pub(crate) struct OperationHooks {
    pub id: OperationId,
    pub document: Arc<dyn Document>,
    pub cx: HookContext,
}

impl OperationHooks {
    pub fn action(&self) -> Action {
        self.cx.action
    }

    pub fn document_type(&self) -> &'static str {
        self.document.document_type()
    }

    pub fn prepare(&self, loader: &Loader) -> HookResult {
        let document = Arc::clone(&self.document);
        match self.cx.action {
            Action::Load => document.prepare_load(loader, &self.cx),
            Action::Save => document.prepare_save(loader, &self.cx),
            Action::Delete => document.prepare_delete(loader, &self.cx),
        }
    }

    pub async fn post_process(&self, loader: &Loader) -> HookResult {
        let document = Arc::clone(&self.document);
        match self.cx.action {
            Action::Load => document.post_load(loader, &self.cx).await,
            Action::Save => document.post_save(loader, &self.cx).await,
            Action::Delete => document.post_delete(loader, &self.cx).await,
        }
    }
}
