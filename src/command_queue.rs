//! Command queue: buffers commands for the next pipeline round trip.

use crate::command::Command;
use crate::latch::CountDownLatch;
use crate::pipeline::Pipeline;
use crate::store::Reply;
use crate::value::Value;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

type ResultSlots = Arc<Mutex<Vec<Option<Value>>>>;

/// Ordered buffer of commands, drained into a pipeline one batch at a time.
///
/// In atomic mode every drained batch is wrapped in `MULTI`/`EXEC` and results come
/// from the `EXEC` reply.
#[derive(Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
    atomic: bool,
}

impl CommandQueue {
    pub fn new(atomic: bool) -> Self {
        Self {
            commands: Vec::new(),
            atomic,
        }
    }

    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a command. With `once`, a command equal to one still waiting in this
    /// batch is rejected and `None` is returned.
    ///
    /// The returned reference stays valid until the queue is drained, for attaching
    /// listeners to the accepted command.
    pub fn enqueue(&mut self, command: Command, once: bool) -> Option<&mut Command> {
        if once && self.commands.iter().any(|queued| *queued == command) {
            debug!(command = %command, "Skipping duplicate command");
            return None;
        }
        self.commands.push(command);
        self.commands.last_mut()
    }

    /// Drain the queue into `pipeline`. Returns `None` when there was nothing to send.
    ///
    /// The pipeline's `exec` does not finish before the returned flush has settled,
    /// so commands enqueued by result callbacks are visible once `exec` returns.
    pub fn write_to_pipeline(&mut self, pipeline: &mut Pipeline) -> Option<QueueFlush> {
        if self.commands.is_empty() {
            return None;
        }

        let commands = std::mem::take(&mut self.commands);
        let count = commands.len();
        let latch = Arc::new(CountDownLatch::new(if self.atomic { count + 1 } else { count }));
        let results: ResultSlots = Arc::new(Mutex::new(vec![None; count]));

        for command in &commands {
            debug!(
                pipeline_id = pipeline.id(),
                command = command.name(),
                keys = ?pipeline.command_keys(command.name(), command.args()),
                "Writing command to pipeline"
            );
        }

        if self.atomic {
            pipeline.enqueue("multi", Vec::new(), None);
            for command in &commands {
                pipeline.enqueue(command.name(), command.args().to_vec(), None);
            }
            let latch = Arc::clone(&latch);
            let results = Arc::clone(&results);
            pipeline.enqueue(
                "exec",
                Vec::new(),
                Some(Box::new(move |reply| {
                    settle_transaction(reply, count, &results, &latch)
                })),
            );
        } else {
            for (index, command) in commands.iter().enumerate() {
                let latch = Arc::clone(&latch);
                let results = Arc::clone(&results);
                pipeline.enqueue(
                    command.name(),
                    command.args().to_vec(),
                    Some(Box::new(move |reply| {
                        if let Ok(value) = reply {
                            results.lock()[index] = Some(value);
                        }
                        latch.count_down();
                    })),
                );
            }
        }

        let (done, settled) = oneshot::channel();
        pipeline.wait_after_exec(Box::pin(async move {
            let _ = settled.await;
        }));

        Some(QueueFlush {
            commands,
            results,
            latch,
            done,
        })
    }
}

fn settle_transaction(reply: Reply, count: usize, results: &ResultSlots, latch: &CountDownLatch) {
    match reply {
        Ok(Value::Array(values)) if values.len() == count => {
            for (index, value) in values.into_iter().enumerate() {
                match value {
                    Value::Error(message) => {
                        warn!(index, error = %message, "Command in atomic batch failed");
                    }
                    value => results.lock()[index] = Some(value),
                }
                latch.count_down();
            }
            latch.count_down();
        }
        Ok(Value::Nil) => {
            debug!(commands = count, "Atomic batch aborted");
            latch.drain();
        }
        Ok(other) => {
            warn!(commands = count, reply = %other, "Unexpected EXEC reply");
            latch.drain();
        }
        Err(err) => {
            warn!(commands = count, error = %err, "Atomic batch failed");
            latch.drain();
        }
    }
}

/// One drained batch waiting for its replies.
pub struct QueueFlush {
    commands: Vec<Command>,
    results: ResultSlots,
    latch: Arc<CountDownLatch>,
    done: oneshot::Sender<()>,
}

impl QueueFlush {
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Wait for every reply, store results on the commands and hand them to
    /// `resolve`. Releases the pipeline's `exec` afterwards.
    pub async fn settle_with<F>(self, resolve: F)
    where
        F: FnOnce(Vec<Command>),
    {
        let QueueFlush {
            mut commands,
            results,
            latch,
            done,
        } = self;

        latch.wait().await;
        let values = std::mem::take(&mut *results.lock());
        for (command, value) in commands.iter_mut().zip(values) {
            command.set_result(value);
        }
        resolve(commands);
        let _ = done.send(());
    }

    /// `settle_with` resolving every command in submission order.
    pub async fn settle(self) {
        self.settle_with(|mut commands| {
            for command in &mut commands {
                command.resolve();
            }
        })
        .await
    }
}
