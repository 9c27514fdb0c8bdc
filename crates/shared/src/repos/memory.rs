use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;

use super::{StoreFuture, TranscriptStore, decode_transcript, encode_transcript};
use crate::models::Turn;
use crate::session::SessionAddress;

/// Process-local store. Contents vanish with the process; clones share state.
#[derive(Clone, Default)]
pub struct MemoryTranscriptStore {
    records: Arc<Mutex<HashMap<String, Value>>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.lock_records().len()
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl TranscriptStore for MemoryTranscriptStore {
    fn load<'a>(&'a self, address: &'a SessionAddress) -> StoreFuture<'a, Option<Vec<Turn>>> {
        Box::pin(async move {
            let record = self.lock_records().get(address.as_str()).cloned();
            record.map(decode_transcript).transpose()
        })
    }

    fn save<'a>(&'a self, address: &'a SessionAddress, turns: &'a [Turn]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let encoded = encode_transcript(turns)?;
            self.lock_records()
                .insert(address.as_str().to_string(), encoded);
            Ok(())
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryTranscriptStore;
    use crate::models::{Role, Turn};
    use crate::repos::TranscriptStore;
    use crate::session::SessionAddress;

    #[tokio::test]
    async fn missing_sessions_load_as_none() {
        let store = MemoryTranscriptStore::new();
        let address = SessionAddress::derive("never-written");

        let loaded = store.load(&address).await.expect("load should succeed");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn clones_share_saved_transcripts() {
        let store = MemoryTranscriptStore::new();
        let other_handle = store.clone();
        let address = SessionAddress::derive("shared");
        let turns = vec![Turn {
            role: Role::User,
            content: "ping".to_string(),
            timestamp: 5,
        }];

        store.save(&address, &turns).await.expect("save should succeed");

        let loaded = other_handle
            .load(&address)
            .await
            .expect("load should succeed")
            .expect("transcript should exist");
        assert_eq!(loaded, turns);
        assert_eq!(other_handle.session_count(), 1);
    }
}
