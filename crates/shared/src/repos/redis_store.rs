use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{StoreError, StoreFuture, TranscriptStore, decode_transcript, encode_transcript};
use crate::models::Turn;
use crate::session::SessionAddress;

#[derive(Clone)]
pub struct RedisTranscriptStore {
    connection: ConnectionManager,
    key_prefix: String,
}

impl RedisTranscriptStore {
    pub async fn connect(redis_url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;

        let mut health_connection = connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut health_connection)
            .await
            .map_err(|err| StoreError::Unavailable(format!("failed to connect to redis: {err}")))?;

        Ok(Self {
            connection,
            key_prefix: key_prefix.trim_end_matches(':').to_string(),
        })
    }

    fn session_key(&self, address: &SessionAddress) -> String {
        format!("{}:{}", self.key_prefix, address)
    }

    async fn load_transcript(
        &self,
        address: &SessionAddress,
    ) -> Result<Option<Vec<Turn>>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(self.session_key(address)).await?;

        raw.map(|raw| {
            let value = serde_json::from_str(&raw)
                .map_err(|err| StoreError::InvalidData(format!("transcript invalid: {err}")))?;
            decode_transcript(value)
        })
        .transpose()
    }

    async fn save_transcript(
        &self,
        address: &SessionAddress,
        turns: &[Turn],
    ) -> Result<(), StoreError> {
        let encoded = encode_transcript(turns)?.to_string();
        let mut connection = self.connection.clone();
        let _: () = connection.set(self.session_key(address), encoded).await?;
        Ok(())
    }
}

impl TranscriptStore for RedisTranscriptStore {
    fn load<'a>(&'a self, address: &'a SessionAddress) -> StoreFuture<'a, Option<Vec<Turn>>> {
        Box::pin(self.load_transcript(address))
    }

    fn save<'a>(&'a self, address: &'a SessionAddress, turns: &'a [Turn]) -> StoreFuture<'a, ()> {
        Box::pin(self.save_transcript(address, turns))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            redis::cmd("PING")
                .query_async::<String>(&mut connection)
                .await?;
            Ok(())
        })
    }
}
