//! Redis store over a multiplexed tokio connection.

use super::{Reply, Store, StoreCommand};
use crate::error::StoreError;
use crate::value::{server_error_message, Arg, Value};
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use tracing::{debug, info};

pub struct RedisStore {
    url: String,
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        info!(url = %url, "Connected to redis");
        Ok(Self {
            url: url.to_string(),
            connection,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn to_redis_cmd(command: &StoreCommand) -> ::redis::Cmd {
    let mut cmd = ::redis::cmd(&command.name);
    for arg in &command.args {
        match arg {
            Arg::Str(s) => cmd.arg(s.as_str()),
            Arg::Bytes(b) => cmd.arg(b.as_slice()),
            Arg::Int(i) => cmd.arg(*i),
            Arg::Float(f) => cmd.arg(*f),
        };
    }
    cmd
}

/// One pipeline reply. A server error at the top level fails only its own command.
fn to_reply(command: &StoreCommand, value: ::redis::Value) -> Reply {
    match value {
        ::redis::Value::ServerError(err) => Err(StoreError::command(
            command.name.as_str(),
            server_error_message(&err),
        )),
        other => Ok(Value::from(other)),
    }
}

#[async_trait]
impl Store for RedisStore {
    /// Sends the batch as one redis pipeline. Error replies are kept per command.
    async fn execute(&self, batch: &[StoreCommand]) -> Result<Vec<Reply>, StoreError> {
        let mut pipe = ::redis::pipe();
        pipe.ignore_errors();
        for command in batch {
            pipe.add_command(to_redis_cmd(command));
        }

        let mut connection = self.connection.clone();
        let replies: Vec<::redis::Value> = pipe.query_async(&mut connection).await?;
        debug!(commands = batch.len(), replies = replies.len(), "Redis pipeline replied");
        Ok(batch
            .iter()
            .zip(replies)
            .map(|(command, value)| to_reply(command, value))
            .collect())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
