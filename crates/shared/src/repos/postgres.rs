use std::path::Path;

use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{StoreError, StoreFuture, TranscriptStore, decode_transcript, encode_transcript};
use crate::models::Turn;
use crate::session::SessionAddress;

#[derive(Clone)]
pub struct PostgresTranscriptStore {
    pool: PgPool,
}

impl PostgresTranscriptStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self, migrations_dir: &Path) -> Result<(), StoreError> {
        let migrator = sqlx::migrate::Migrator::new(migrations_dir.to_path_buf())
            .await
            .map_err(|err| StoreError::Unavailable(format!("failed to load migrations: {err}")))?;
        migrator
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Unavailable(format!("failed to run migrations: {err}")))
    }

    async fn load_transcript(
        &self,
        address: &SessionAddress,
    ) -> Result<Option<Vec<Turn>>, StoreError> {
        let row = sqlx::query(
            "SELECT transcript
             FROM chat_sessions
             WHERE session_address = $1",
        )
        .bind(address.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let transcript: Value = row.try_get("transcript")?;
            decode_transcript(transcript)
        })
        .transpose()
    }

    async fn save_transcript(
        &self,
        address: &SessionAddress,
        turns: &[Turn],
    ) -> Result<(), StoreError> {
        let transcript = encode_transcript(turns)?;
        let turn_count = i32::try_from(turns.len()).map_err(|_| {
            StoreError::InvalidData("chat session turn_count exceeds i32".to_string())
        })?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO chat_sessions (
                session_address,
                transcript,
                turn_count,
                created_at,
                updated_at
             ) VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (session_address)
             DO UPDATE SET
               transcript = EXCLUDED.transcript,
               turn_count = EXCLUDED.turn_count,
               updated_at = EXCLUDED.updated_at",
        )
        .bind(address.as_str())
        .bind(transcript)
        .bind(turn_count)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

impl TranscriptStore for PostgresTranscriptStore {
    fn load<'a>(&'a self, address: &'a SessionAddress) -> StoreFuture<'a, Option<Vec<Turn>>> {
        Box::pin(self.load_transcript(address))
    }

    fn save<'a>(&'a self, address: &'a SessionAddress, turns: &'a [Turn]) -> StoreFuture<'a, ()> {
        Box::pin(self.save_transcript(address, turns))
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}
