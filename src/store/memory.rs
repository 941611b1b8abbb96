//! In-process store
//!
//! Implements the subset of string, hash, set and key-space commands the loader and
//! models use, plus per-batch `MULTI`/`EXEC`/`DISCARD`. Every batch is recorded so
//! callers can count round trips.

use super::{Reply, Store, StoreCommand};
use crate::error::StoreError;
use crate::value::{Arg, Value};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
enum Entry {
    Str(Vec<u8>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<Vec<u8>, Entry>,
}

#[derive(Debug, Default)]
struct MemoryState {
    keyspace: Keyspace,
    round_trips: u64,
    batches: Vec<Vec<StoreCommand>>,
    abort_next_transaction: bool,
    fail_next_round_trip: bool,
}

/// Store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every round trip by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            latency: Some(latency),
        }
    }

    pub fn round_trips(&self) -> u64 {
        self.state.lock().round_trips
    }

    /// Every batch executed so far, in order.
    pub fn batches(&self) -> Vec<Vec<StoreCommand>> {
        self.state.lock().batches.clone()
    }

    /// The next `EXEC` replies nil, as if a watched key changed.
    pub fn abort_next_transaction(&self) {
        self.state.lock().abort_next_transaction = true;
    }

    /// The next round trip fails as a whole.
    pub fn fail_next_round_trip(&self) {
        self.state.lock().fail_next_round_trip = true;
    }

    /// Current value of a string key.
    pub fn peek_string(&self, key: &str) -> Option<String> {
        match self.state.lock().keyspace.entries.get(key.as_bytes()) {
            Some(Entry::Str(bytes)) => String::from_utf8(bytes.clone()).ok(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.lock().keyspace.entries.contains_key(key.as_bytes())
    }

    fn execute_batch(&self, batch: &[StoreCommand]) -> Result<Vec<Reply>, StoreError> {
        let mut state = self.state.lock();
        state.round_trips += 1;
        state.batches.push(batch.to_vec());
        if std::mem::take(&mut state.fail_next_round_trip) {
            return Err(StoreError::Connection(
                "simulated transport failure".to_string(),
            ));
        }

        let mut replies = Vec::with_capacity(batch.len());
        let mut transaction: Option<Vec<&StoreCommand>> = None;

        for command in batch {
            let reply = match command.name.to_ascii_lowercase().as_str() {
                "multi" => {
                    if transaction.is_some() {
                        Err(StoreError::command("multi", "MULTI calls can not be nested"))
                    } else {
                        transaction = Some(Vec::new());
                        Ok(Value::Okay)
                    }
                }
                "exec" => match transaction.take() {
                    None => Err(StoreError::command("exec", "EXEC without MULTI")),
                    Some(_) if std::mem::take(&mut state.abort_next_transaction) => {
                        debug!(store = "memory", "Transaction aborted");
                        Ok(Value::Nil)
                    }
                    Some(queued) => Ok(Value::Array(
                        queued
                            .into_iter()
                            .map(|queued| match state.keyspace.apply(queued) {
                                Ok(value) => value,
                                Err(err) => Value::Error(err.to_string()),
                            })
                            .collect(),
                    )),
                },
                "discard" => match transaction.take() {
                    None => Err(StoreError::command("discard", "DISCARD without MULTI")),
                    Some(_) => Ok(Value::Okay),
                },
                _ => match transaction.as_mut() {
                    Some(queued) => {
                        queued.push(command);
                        Ok(Value::Status("QUEUED".to_string()))
                    }
                    None => state.keyspace.apply(command),
                },
            };
            replies.push(reply);
        }

        if transaction.is_some() {
            debug!(store = "memory", "Discarding unterminated transaction");
        }
        Ok(replies)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute(&self, batch: &[StoreCommand]) -> Result<Vec<Reply>, StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.execute_batch(batch)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn arity(command: &str) -> StoreError {
    StoreError::command(command, "wrong number of arguments")
}

fn wrong_type(command: &str) -> StoreError {
    StoreError::command(
        command,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    )
}

fn exact<'a, const N: usize>(
    command: &str,
    args: &'a [Vec<u8>],
) -> Result<[&'a [u8]; N], StoreError> {
    if args.len() != N {
        return Err(arity(command));
    }
    Ok(std::array::from_fn(|i| args[i].as_slice()))
}

fn at_least(command: &str, args: &[Vec<u8>], n: usize) -> Result<(), StoreError> {
    if args.len() < n {
        return Err(arity(command));
    }
    Ok(())
}

fn parse_int(command: &str, bytes: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::command(command, "value is not an integer or out of range"))
}

fn flag(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_ascii_uppercase()
}

fn count(n: usize) -> Value {
    Value::Int(n as i64)
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text)
                || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

impl Keyspace {
    fn string(&self, command: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Str(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type(command)),
        }
    }

    fn hash(
        &self,
        command: &str,
        key: &[u8],
    ) -> Result<Option<&BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Hash(hash)) => Ok(Some(hash)),
            Some(_) => Err(wrong_type(command)),
        }
    }

    fn hash_mut(
        &mut self,
        command: &str,
        key: &[u8],
    ) -> Result<&mut BTreeMap<Vec<u8>, Vec<u8>>, StoreError> {
        match self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::Hash(BTreeMap::new()))
        {
            Entry::Hash(hash) => Ok(hash),
            _ => Err(wrong_type(command)),
        }
    }

    fn set(&self, command: &str, key: &[u8]) -> Result<Option<&BTreeSet<Vec<u8>>>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Set(set)) => Ok(Some(set)),
            Some(_) => Err(wrong_type(command)),
        }
    }

    fn set_mut(&mut self, command: &str, key: &[u8]) -> Result<&mut BTreeSet<Vec<u8>>, StoreError> {
        match self
            .entries
            .entry(key.to_vec())
            .or_insert_with(|| Entry::Set(BTreeSet::new()))
        {
            Entry::Set(set) => Ok(set),
            _ => Err(wrong_type(command)),
        }
    }

    /// Drop collection keys left empty.
    fn prune(&mut self, key: &[u8]) {
        let empty = match self.entries.get(key) {
            Some(Entry::Hash(hash)) => hash.is_empty(),
            Some(Entry::Set(set)) => set.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn incr_by(&mut self, command: &str, key: &[u8], delta: i64) -> Reply {
        let current = match self.string(command, key)? {
            None => 0,
            Some(bytes) => parse_int(command, &bytes)?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::command(command, "increment or decrement would overflow"))?;
        self.entries
            .insert(key.to_vec(), Entry::Str(next.to_string().into_bytes()));
        Ok(Value::Int(next))
    }

    fn apply(&mut self, command: &StoreCommand) -> Reply {
        let name = command.name.to_ascii_lowercase();
        let cmd = name.as_str();
        let args: Vec<Vec<u8>> = command.args.iter().map(Arg::to_bytes).collect();

        match cmd {
            "ping" => Ok(match args.first() {
                Some(message) => Value::Data(message.clone()),
                None => Value::Status("PONG".to_string()),
            }),
            "get" => {
                let [key] = exact::<1>(cmd, &args)?;
                Ok(self.string(cmd, key)?.map(Value::Data).unwrap_or(Value::Nil))
            }
            "set" => {
                at_least(cmd, &args, 2)?;
                let (mut nx, mut xx) = (false, false);
                for option in &args[2..] {
                    match flag(option).as_str() {
                        "NX" => nx = true,
                        "XX" => xx = true,
                        _ => return Err(StoreError::command(cmd, "syntax error")),
                    }
                }
                let exists = self.entries.contains_key(args[0].as_slice());
                if (nx && exists) || (xx && !exists) {
                    return Ok(Value::Nil);
                }
                self.entries
                    .insert(args[0].clone(), Entry::Str(args[1].clone()));
                Ok(Value::Okay)
            }
            "getset" => {
                let [key, value] = exact::<2>(cmd, &args)?;
                let previous = self.string(cmd, key)?;
                self.entries.insert(key.to_vec(), Entry::Str(value.to_vec()));
                Ok(previous.map(Value::Data).unwrap_or(Value::Nil))
            }
            "mget" => {
                at_least(cmd, &args, 1)?;
                let values = args
                    .iter()
                    .map(|key| match self.entries.get(key.as_slice()) {
                        Some(Entry::Str(bytes)) => Value::Data(bytes.clone()),
                        _ => Value::Nil,
                    })
                    .collect();
                Ok(Value::Array(values))
            }
            "mset" => {
                if args.is_empty() || args.len() % 2 != 0 {
                    return Err(arity(cmd));
                }
                for pair in args.chunks(2) {
                    self.entries
                        .insert(pair[0].clone(), Entry::Str(pair[1].clone()));
                }
                Ok(Value::Okay)
            }
            "del" => {
                at_least(cmd, &args, 1)?;
                let removed = args
                    .iter()
                    .filter(|key| self.entries.remove(key.as_slice()).is_some())
                    .count();
                Ok(count(removed))
            }
            "exists" => {
                at_least(cmd, &args, 1)?;
                let found = args
                    .iter()
                    .filter(|key| self.entries.contains_key(key.as_slice()))
                    .count();
                Ok(count(found))
            }
            "incr" => {
                let [key] = exact::<1>(cmd, &args)?;
                self.incr_by(cmd, key, 1)
            }
            "decr" => {
                let [key] = exact::<1>(cmd, &args)?;
                self.incr_by(cmd, key, -1)
            }
            "incrby" => {
                let [key, delta] = exact::<2>(cmd, &args)?;
                let delta = parse_int(cmd, delta)?;
                self.incr_by(cmd, key, delta)
            }
            "decrby" => {
                let [key, delta] = exact::<2>(cmd, &args)?;
                let delta = parse_int(cmd, delta)?;
                self.incr_by(cmd, key, delta.checked_neg().unwrap_or(i64::MAX))
            }
            "append" => {
                let [key, suffix] = exact::<2>(cmd, &args)?;
                let mut value = self.string(cmd, key)?.unwrap_or_default();
                value.extend_from_slice(suffix);
                let len = value.len();
                self.entries.insert(key.to_vec(), Entry::Str(value));
                Ok(count(len))
            }
            "strlen" => {
                let [key] = exact::<1>(cmd, &args)?;
                Ok(count(self.string(cmd, key)?.map_or(0, |v| v.len())))
            }
            "hset" => {
                if args.len() < 3 || args.len() % 2 != 1 {
                    return Err(arity(cmd));
                }
                let hash = self.hash_mut(cmd, &args[0])?;
                let added = args[1..]
                    .chunks(2)
                    .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                    .count();
                Ok(count(added))
            }
            "hget" => {
                let [key, field] = exact::<2>(cmd, &args)?;
                let value = self
                    .hash(cmd, key)?
                    .and_then(|hash| hash.get(field).cloned());
                Ok(value.map(Value::Data).unwrap_or(Value::Nil))
            }
            "hgetall" => {
                let [key] = exact::<1>(cmd, &args)?;
                let flat: Vec<Value> = self
                    .hash(cmd, key)?
                    .map(|hash| {
                        hash.iter()
                            .flat_map(|(f, v)| [Value::Data(f.clone()), Value::Data(v.clone())])
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(Value::Array(flat))
            }
            "hdel" => {
                at_least(cmd, &args, 2)?;
                if self.hash(cmd, &args[0])?.is_none() {
                    return Ok(count(0));
                }
                let hash = self.hash_mut(cmd, &args[0])?;
                let removed = args[1..]
                    .iter()
                    .filter(|field| hash.remove(field.as_slice()).is_some())
                    .count();
                self.prune(&args[0]);
                Ok(count(removed))
            }
            "hexists" => {
                let [key, field] = exact::<2>(cmd, &args)?;
                let found = self
                    .hash(cmd, key)?
                    .map_or(false, |hash| hash.contains_key(field));
                Ok(count(found as usize))
            }
            "hlen" => {
                let [key] = exact::<1>(cmd, &args)?;
                Ok(count(self.hash(cmd, key)?.map_or(0, |hash| hash.len())))
            }
            "sadd" => {
                at_least(cmd, &args, 2)?;
                let set = self.set_mut(cmd, &args[0])?;
                let added = args[1..]
                    .iter()
                    .filter(|member| set.insert(member.to_vec()))
                    .count();
                Ok(count(added))
            }
            "srem" => {
                at_least(cmd, &args, 2)?;
                if self.set(cmd, &args[0])?.is_none() {
                    return Ok(count(0));
                }
                let set = self.set_mut(cmd, &args[0])?;
                let removed = args[1..]
                    .iter()
                    .filter(|member| set.remove(member.as_slice()))
                    .count();
                self.prune(&args[0]);
                Ok(count(removed))
            }
            "smembers" => {
                let [key] = exact::<1>(cmd, &args)?;
                let members: Vec<Value> = self
                    .set(cmd, key)?
                    .map(|set| set.iter().cloned().map(Value::Data).collect())
                    .unwrap_or_default();
                Ok(Value::Array(members))
            }
            "sismember" => {
                let [key, member] = exact::<2>(cmd, &args)?;
                let found = self
                    .set(cmd, key)?
                    .map_or(false, |set| set.contains(member));
                Ok(count(found as usize))
            }
            "scard" => {
                let [key] = exact::<1>(cmd, &args)?;
                Ok(count(self.set(cmd, key)?.map_or(0, |set| set.len())))
            }
            "keys" => {
                let [pattern] = exact::<1>(cmd, &args)?;
                let mut keys: Vec<&Vec<u8>> = self
                    .entries
                    .keys()
                    .filter(|key| glob_match(pattern, key))
                    .collect();
                keys.sort();
                Ok(Value::Array(
                    keys.into_iter().cloned().map(Value::Data).collect(),
                ))
            }
            "flushdb" => {
                self.entries.clear();
                Ok(Value::Okay)
            }
            _ => Err(StoreError::command(cmd, "unknown command")),
        }
    }
}
