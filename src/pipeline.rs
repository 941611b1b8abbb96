//! Pipeline: one batched round trip to the store.

use crate::error::StoreError;
use crate::store::{Reply, Store, StoreCommand};
use crate::value::Arg;
use futures::future::{join_all, BoxFuture};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Called with the reply to one pipelined command.
pub type ReplyCallback = Box<dyn FnOnce(Reply) + Send>;

struct Entry {
    command: StoreCommand,
    callback: Option<ReplyCallback>,
}

/// Accumulates commands and sends them to the store in a single round trip.
///
/// Every enqueued callback is invoked exactly once per `exec`, with the command's
/// reply or the error that prevented it. Failures are logged here and never returned
/// from `exec`: each command observes its own outcome through its callback.
pub struct Pipeline {
    id: u64,
    store: Arc<dyn Store>,
    entries: Vec<Entry>,
    post_waits: Vec<BoxFuture<'static, ()>>,
    executed: bool,
}

impl Pipeline {
    pub fn new(store: Arc<dyn Store>) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            store,
            entries: Vec::new(),
            post_waits: Vec::new(),
            executed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best-effort key extraction, for diagnostics only.
    pub fn command_keys(&self, name: &str, args: &[Arg]) -> Vec<String> {
        self.store.command_keys(name, args)
    }

    pub fn enqueue(&mut self, name: &str, args: Vec<Arg>, callback: Option<ReplyCallback>) {
        self.entries.push(Entry {
            command: StoreCommand::new(name, args),
            callback,
        });
    }

    /// Delay completion of `exec` until `signal` resolves.
    pub fn wait_after_exec(&mut self, signal: BoxFuture<'static, ()>) {
        self.post_waits.push(signal);
    }

    /// Send the batch and dispatch replies, then wait on every `wait_after_exec`
    /// signal. A pipeline executes at most once.
    pub async fn exec(&mut self) {
        if self.executed {
            error!(pipeline_id = self.id, "Pipeline already executed");
            return;
        }
        if self.entries.is_empty() {
            return;
        }
        self.executed = true;

        let (commands, callbacks): (Vec<StoreCommand>, Vec<Option<ReplyCallback>>) = self
            .entries
            .drain(..)
            .map(|entry| (entry.command, entry.callback))
            .unzip();

        debug!(
            pipeline_id = self.id,
            store = self.store.name(),
            commands = commands.len(),
            "Executing pipeline"
        );

        let replies = match self.store.execute(&commands).await {
            Ok(replies) => replies,
            Err(err) => {
                error!(pipeline_id = self.id, error = %err, "Pipeline round trip failed");
                vec![Err(err); commands.len()]
            }
        };
        if replies.len() != commands.len() {
            warn!(
                pipeline_id = self.id,
                expected = commands.len(),
                received = replies.len(),
                "Pipeline reply count mismatch"
            );
        }

        let mut replies = replies.into_iter();
        for (command, callback) in commands.iter().zip(callbacks) {
            let reply = replies.next().unwrap_or_else(|| {
                Err(StoreError::Protocol(format!("no reply for {}", command.name)))
            });
            if let Err(err) = &reply {
                warn!(
                    pipeline_id = self.id,
                    command = %command.name,
                    args = command.args.len(),
                    error = %err,
                    "Pipeline command error"
                );
            }
            if let Some(callback) = callback {
                callback(reply);
            }
        }

        let waits = std::mem::take(&mut self.post_waits);
        join_all(waits).await;
    }
}

fn string_keys<'a>(args: impl Iterator<Item = &'a Arg>) -> Vec<String> {
    args.map(|arg| arg.to_string()).collect()
}

/// Key positions of well-known commands.
///
/// Unknown commands report every string argument. Never fails: malformed argument
/// lists simply yield fewer keys.
pub fn command_keys(name: &str, args: &[Arg]) -> Vec<String> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "PING" | "ECHO" | "MULTI" | "EXEC" | "DISCARD" | "UNWATCH" | "FLUSHDB" | "FLUSHALL"
        | "DBSIZE" | "INFO" | "TIME" | "KEYS" | "SCAN" | "SELECT" => Vec::new(),

        "DEL" | "UNLINK" | "EXISTS" | "TOUCH" | "MGET" | "WATCH" | "SINTER" | "SUNION"
        | "SDIFF" => string_keys(args.iter()),

        "MSET" | "MSETNX" => string_keys(args.iter().step_by(2)),

        "RENAME" | "RENAMENX" | "SMOVE" | "RPOPLPUSH" | "LMOVE" | "COPY" => {
            string_keys(args.iter().take(2))
        }

        "EVAL" | "EVALSHA" => {
            let count = args
                .get(1)
                .and_then(|arg| arg.to_string().parse::<usize>().ok())
                .unwrap_or(0);
            string_keys(args.iter().skip(2).take(count))
        }

        "GET" | "SET" | "SETNX" | "SETEX" | "PSETEX" | "GETSET" | "GETDEL" | "GETRANGE"
        | "SETRANGE" | "APPEND" | "STRLEN" | "INCR" | "INCRBY" | "INCRBYFLOAT" | "DECR"
        | "DECRBY" | "EXPIRE" | "PEXPIRE" | "EXPIREAT" | "TTL" | "PTTL" | "PERSIST" | "TYPE"
        | "HSET" | "HSETNX" | "HGET" | "HMGET" | "HMSET" | "HGETALL" | "HDEL" | "HEXISTS"
        | "HLEN" | "HKEYS" | "HVALS" | "HINCRBY" | "SADD" | "SREM" | "SMEMBERS"
        | "SISMEMBER" | "SCARD" | "SPOP" | "SRANDMEMBER" | "LPUSH" | "RPUSH" | "LPOP"
        | "RPOP" | "LRANGE" | "LLEN" | "LINDEX" | "LSET" | "LREM" | "LTRIM" | "ZADD"
        | "ZREM" | "ZRANGE" | "ZREVRANGE" | "ZRANGEBYSCORE" | "ZSCORE" | "ZCARD"
        | "ZINCRBY" | "ZRANK" => string_keys(args.iter().take(1)),

        _ => args
            .iter()
            .filter_map(|arg| arg.as_str().map(str::to_string))
            .collect(),
    }
}
