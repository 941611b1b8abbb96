//! Store command descriptor with lifecycle callbacks.

use crate::error::{DocumentError, HookResult};
use crate::value::{Arg, Value};
use std::fmt;
use tracing::debug;

/// Called with the command's result once its round trip is back.
pub type ResultCallback = Box<dyn FnOnce(Option<&Value>) -> HookResult + Send>;
/// Called immediately before or after the result callbacks.
pub type Listener = Box<dyn FnOnce() + Send>;
/// Called once the command has resolved, with the outcome of its callbacks.
pub type CompletionListener = Box<dyn FnOnce(Result<(), &DocumentError>) + Send>;

enum Completion {
    Pending(Vec<CompletionListener>),
    Settled(Result<(), DocumentError>),
}

/// An immutable request (`name` + `args`) whose result arrives later.
///
/// Names are normalized to lower case. Two commands are equal when their names match
/// and their arguments are positionally equal; callbacks play no part in equality.
pub struct Command {
    name: String,
    args: Vec<Arg>,
    result: Option<Value>,
    before: Vec<Listener>,
    callbacks: Vec<ResultCallback>,
    after: Vec<Listener>,
    completion: Completion,
}

impl Command {
    pub fn new(name: &str) -> Self {
        Self::parse(name, Vec::new())
    }

    pub fn parse(name: &str, args: Vec<Arg>) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            args,
            result: None,
            before: Vec::new(),
            callbacks: Vec::new(),
            after: Vec::new(),
            completion: Completion::Pending(Vec::new()),
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a result callback.
    pub fn then<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Option<&Value>) -> HookResult + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Option<Value>) {
        self.result = result;
    }

    pub fn add_result_callback<F>(&mut self, callback: F)
    where
        F: FnOnce(Option<&Value>) -> HookResult + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn add_before_callbacks_listener<F>(&mut self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.before.push(Box::new(listener));
    }

    pub fn add_after_callbacks_listener<F>(&mut self, listener: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.after.push(Box::new(listener));
    }

    /// Observe the completion signal. Runs immediately if already resolved.
    pub fn on_completed<F>(&mut self, listener: F)
    where
        F: FnOnce(Result<(), &DocumentError>) + Send + 'static,
    {
        match &mut self.completion {
            Completion::Pending(listeners) => listeners.push(Box::new(listener)),
            Completion::Settled(outcome) => listener(outcome.as_ref().map(|_| ())),
        }
    }

    /// Outcome of `resolve`, once it has run.
    pub fn completed(&self) -> Option<Result<(), &DocumentError>> {
        match &self.completion {
            Completion::Pending(_) => None,
            Completion::Settled(outcome) => Some(outcome.as_ref().map(|_| ())),
        }
    }

    /// Run before listeners, result callbacks, then after listeners, and settle the
    /// completion signal.
    ///
    /// A failing result callback stops this pass: later result callbacks and the
    /// after listeners are skipped and the completion signal carries the error.
    /// Callback lists are emptied either way, so only the first call does anything.
    pub fn resolve(&mut self) {
        let before = std::mem::take(&mut self.before);
        let callbacks = std::mem::take(&mut self.callbacks);
        let after = std::mem::take(&mut self.after);

        let outcome = self.run_callbacks(before, callbacks, after);
        if let Err(error) = &outcome {
            debug!(command = %self.name, error = %error, "Command callback failed");
        }
        debug!(command = %self, result = ?self.result, "Command resolved");

        let listeners = match &mut self.completion {
            Completion::Pending(listeners) => std::mem::take(listeners),
            Completion::Settled(_) => return,
        };
        for listener in listeners {
            listener(outcome.as_ref().map(|_| ()));
        }
        self.completion = Completion::Settled(outcome);
    }

    fn run_callbacks(
        &self,
        before: Vec<Listener>,
        callbacks: Vec<ResultCallback>,
        after: Vec<Listener>,
    ) -> HookResult {
        for listener in before {
            listener();
        }
        for callback in callbacks {
            callback(self.result.as_ref())?;
        }
        for listener in after {
            listener();
        }
        Ok(())
    }
}

impl PartialEq for Command {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.args == other.args
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("result", &self.result)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
