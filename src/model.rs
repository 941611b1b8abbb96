//! Typed models: per-type hook tables instead of runtime hook registration.
//!
//! A [`Model`] exposes one static [`HookTable`], built once (usually in a
//! `OnceLock`). Field helpers such as [`StringField`] register the hooks that move a
//! property between the struct and a store key. Every model is a
//! [`Document`](crate::document::Document) through a blanket impl.

use crate::command::Command;
use crate::document::Document;
use crate::error::{DocumentError, HookResult};
use crate::loader::Loader;
use crate::operation::{Action, HookContext};
use crate::value::Value;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;

pub type PrepareHook<M> =
    Box<dyn Fn(&Arc<M>, &Loader, &HookContext) -> HookResult + Send + Sync>;
pub type PostHook<M> =
    Box<dyn Fn(Arc<M>, Loader, HookContext) -> BoxFuture<'static, HookResult> + Send + Sync>;

struct ActionHooks<M> {
    prepare: Vec<PrepareHook<M>>,
    post: Vec<PostHook<M>>,
}

impl<M> Default for ActionHooks<M> {
    fn default() -> Self {
        Self {
            prepare: Vec::new(),
            post: Vec::new(),
        }
    }
}

/// Ordered prepare and post hooks for each action of one model type.
pub struct HookTable<M> {
    load: ActionHooks<M>,
    save: ActionHooks<M>,
    delete: ActionHooks<M>,
}

impl<M> Default for HookTable<M> {
    fn default() -> Self {
        Self {
            load: ActionHooks::default(),
            save: ActionHooks::default(),
            delete: ActionHooks::default(),
        }
    }
}

impl<M: Send + Sync + 'static> HookTable<M> {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_action(&self, action: Action) -> &ActionHooks<M> {
        match action {
            Action::Load => &self.load,
            Action::Save => &self.save,
            Action::Delete => &self.delete,
        }
    }

    fn for_action_mut(&mut self, action: Action) -> &mut ActionHooks<M> {
        match action {
            Action::Load => &mut self.load,
            Action::Save => &mut self.save,
            Action::Delete => &mut self.delete,
        }
    }

    pub fn on_prepare<F>(mut self, action: Action, hook: F) -> Self
    where
        F: Fn(&Arc<M>, &Loader, &HookContext) -> HookResult + Send + Sync + 'static,
    {
        self.for_action_mut(action).prepare.push(Box::new(hook));
        self
    }

    pub fn on_post<F>(mut self, action: Action, hook: F) -> Self
    where
        F: Fn(Arc<M>, Loader, HookContext) -> BoxFuture<'static, HookResult>
            + Send
            + Sync
            + 'static,
    {
        self.for_action_mut(action).post.push(Box::new(hook));
        self
    }

    /// Register the load, save and delete hooks of a string property.
    pub fn field(self, field: StringField<M>) -> Self {
        let field = Arc::new(field);
        let (load, save, delete) = (Arc::clone(&field), Arc::clone(&field), field);
        self.on_prepare(Action::Load, move |model, loader, _| load.prepare_load(model, loader))
            .on_prepare(Action::Save, move |model, loader, _| save.prepare_save(model, loader))
            .on_prepare(Action::Delete, move |model, loader, _| {
                delete.prepare_delete(model, loader)
            })
    }

    pub fn prepare_hooks(&self, action: Action) -> usize {
        self.for_action(action).prepare.len()
    }

    /// Run the prepare hooks for `action` in registration order, stopping at the
    /// first failure.
    pub fn run_prepare(
        &self,
        action: Action,
        model: &Arc<M>,
        loader: &Loader,
        cx: &HookContext,
    ) -> HookResult {
        for hook in &self.for_action(action).prepare {
            hook(model, loader, cx)?;
        }
        Ok(())
    }

    /// Run the post hooks for `action` one after another, stopping at the first
    /// failure.
    pub async fn run_post(
        &self,
        action: Action,
        model: Arc<M>,
        loader: &Loader,
        cx: &HookContext,
    ) -> HookResult {
        for hook in &self.for_action(action).post {
            hook(Arc::clone(&model), loader.clone(), cx.clone()).await?;
        }
        Ok(())
    }
}

/// A document type whose behavior is described by a static hook table.
pub trait Model: Send + Sync + Sized + 'static {
    fn hooks() -> &'static HookTable<Self>;

    fn model_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

#[async_trait]
impl<M: Model> Document for M {
    fn document_type(&self) -> &'static str {
        M::model_name()
    }

    fn prepare_load(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult {
        M::hooks().run_prepare(Action::Load, &self, loader, cx)
    }

    fn prepare_save(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult {
        let hooks = M::hooks();
        hooks.run_prepare(Action::Save, &self, loader, cx)?;
        if cx.options.load_on_save {
            hooks.run_prepare(Action::Load, &self, loader, cx)?;
        }
        Ok(())
    }

    fn prepare_delete(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult {
        M::hooks().run_prepare(Action::Delete, &self, loader, cx)
    }

    async fn post_load(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult {
        M::hooks().run_post(Action::Load, self, loader, cx).await
    }

    async fn post_save(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult {
        M::hooks().run_post(Action::Save, self, loader, cx).await
    }

    async fn post_delete(self: Arc<Self>, loader: &Loader, cx: &HookContext) -> HookResult {
        M::hooks().run_post(Action::Delete, self, loader, cx).await
    }
}

/// A property stored as a plain string under its own key.
///
/// Load issues `GET key` (or `command`), save issues `SET key value` with `NX` when
/// the field is read-only, delete issues `DEL key`.
pub struct StringField<M> {
    property: &'static str,
    key: fn(&M) -> String,
    get: fn(&M) -> Option<String>,
    set: fn(&M, Option<String>),
    command: &'static str,
    readonly: bool,
    required: bool,
}

impl<M: Send + Sync + 'static> StringField<M> {
    pub fn new(
        property: &'static str,
        key: fn(&M) -> String,
        get: fn(&M) -> Option<String>,
        set: fn(&M, Option<String>),
    ) -> Self {
        Self {
            property,
            key,
            get,
            set,
            command: "get",
            readonly: false,
            required: false,
        }
    }

    /// Read with a different single-key command, e.g. `GETDEL`.
    pub fn command(mut self, command: &'static str) -> Self {
        self.command = command;
        self
    }

    /// Never overwrite an existing value.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Loading a missing value and saving an unset value are errors.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn prepare_load(&self, model: &Arc<M>, loader: &Loader) -> HookResult {
        let model = Arc::clone(model);
        let (property, command, required, set) =
            (self.property, self.command, self.required, self.set);
        let key = (self.key)(&model);
        loader.enqueue_command(Command::new(command).arg(key).then(move |reply| {
            let value = match reply {
                None | Some(Value::Nil) => None,
                Some(value) => match value.as_text() {
                    Some(text) => Some(text),
                    None => {
                        return Err(DocumentError::UnexpectedReply {
                            command: command.to_string(),
                            reply: value.to_string(),
                        })
                    }
                },
            };
            if value.is_none() && required {
                return Err(DocumentError::MissingProperty(property.to_string()));
            }
            set(&model, value);
            Ok(())
        }));
        Ok(())
    }

    fn prepare_save(&self, model: &Arc<M>, loader: &Loader) -> HookResult {
        let Some(value) = (self.get)(model) else {
            if self.required {
                return Err(DocumentError::MissingProperty(self.property.to_string()));
            }
            debug!(property = self.property, "Skipping unset property");
            return Ok(());
        };
        let mut command = Command::new("set").arg((self.key)(model)).arg(value);
        if self.readonly {
            command = command.arg("NX");
        }
        loader.enqueue_command(command);
        Ok(())
    }

    fn prepare_delete(&self, model: &Arc<M>, loader: &Loader) -> HookResult {
        loader.enqueue_command(Command::new("del").arg((self.key)(model)));
        Ok(())
    }
}
