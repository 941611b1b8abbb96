//! Document capability and batch input.

use crate::error::HookResult;
use crate::loader::Loader;
use crate::operation::HookContext;
use async_trait::async_trait;
use std::sync::Arc;

/// A unit of store-backed state with load/save/delete behavior.
///
/// Prepare hooks run synchronously during discovery and may enqueue commands and
/// child operations on the loader; anything they enqueue is attributed to this
/// document's operation. Post hooks run once every command the operation issued has
/// returned.
///
/// Post hooks must not await `load`/`save`/`delete` on the same loader: the outer
/// operation cannot complete until its post hook returns. Enqueue child operations
/// instead.
#[async_trait]
pub trait Document: Send + Sync {
    fn document_type(&self) -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }

    fn prepare_load(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult;

    fn prepare_save(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        Ok(())
    }

    fn prepare_delete(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        Ok(())
    }

    async fn post_load(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        Ok(())
    }

    async fn post_save(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        Ok(())
    }

    async fn post_delete(self: Arc<Self>, _loader: &Loader, _cx: &HookContext) -> HookResult {
        Ok(())
    }
}

/// One or more documents for a single `load`/`save`/`delete` call.
#[derive(Default, Clone)]
pub struct Documents(Vec<Arc<dyn Document>>);

impl Documents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, document: Arc<dyn Document>) -> Self {
        self.0.push(document);
        self
    }

    pub fn push(&mut self, document: Arc<dyn Document>) {
        self.0.push(document);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Document + 'static> From<Arc<T>> for Documents {
    fn from(document: Arc<T>) -> Self {
        Documents(vec![document])
    }
}

impl<T: Document + 'static> From<Vec<Arc<T>>> for Documents {
    fn from(documents: Vec<Arc<T>>) -> Self {
        Documents(
            documents
                .into_iter()
                .map(|document| document as Arc<dyn Document>)
                .collect(),
        )
    }
}

impl FromIterator<Arc<dyn Document>> for Documents {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Document>>>(iter: I) -> Self {
        Documents(iter.into_iter().collect())
    }
}

impl IntoIterator for Documents {
    type Item = Arc<dyn Document>;
    type IntoIter = std::vec::IntoIter<Arc<dyn Document>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
