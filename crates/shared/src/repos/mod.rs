use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Role, Turn};
use crate::session::SessionAddress;

mod memory;
mod postgres;
mod redis_store;

pub use memory::MemoryTranscriptStore;
pub use postgres::PostgresTranscriptStore;
pub use redis_store::RedisTranscriptStore;

pub const TRANSCRIPT_FORMAT_VERSION_V1: &str = "2026-01-01";

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Key-value persistence of transcripts, keyed by session address.
///
/// Only the owning session actor writes a given key.
pub trait TranscriptStore: Send + Sync {
    fn load<'a>(&'a self, address: &'a SessionAddress) -> StoreFuture<'a, Option<Vec<Turn>>>;

    fn save<'a>(&'a self, address: &'a SessionAddress, turns: &'a [Turn]) -> StoreFuture<'a, ()>;

    fn ping(&self) -> StoreFuture<'_, ()>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct PersistedTranscript {
    version: String,
    turns: Vec<Turn>,
}

pub(crate) fn encode_transcript(turns: &[Turn]) -> Result<serde_json::Value, StoreError> {
    if turns.iter().any(|turn| turn.role == Role::System) {
        return Err(StoreError::InvalidData(
            "system turns are never persisted".to_string(),
        ));
    }

    serde_json::to_value(PersistedTranscript {
        version: TRANSCRIPT_FORMAT_VERSION_V1.to_string(),
        turns: turns.to_vec(),
    })
    .map_err(|err| StoreError::InvalidData(format!("transcript encode failed: {err}")))
}

pub(crate) fn decode_transcript(value: serde_json::Value) -> Result<Vec<Turn>, StoreError> {
    let persisted = serde_json::from_value::<PersistedTranscript>(value)
        .map_err(|err| StoreError::InvalidData(format!("transcript invalid: {err}")))?;

    if persisted.version != TRANSCRIPT_FORMAT_VERSION_V1 {
        return Err(StoreError::InvalidData(format!(
            "unknown transcript version persisted: {}",
            persisted.version
        )));
    }

    if persisted.turns.iter().any(|turn| turn.role == Role::System) {
        return Err(StoreError::InvalidData(
            "persisted transcript contains a system turn".to_string(),
        ));
    }

    Ok(persisted.turns)
}
