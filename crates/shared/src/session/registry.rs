use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::{SessionActor, SessionAddress, SessionId};
use crate::config::SessionConfig;
use crate::llm::LlmGateway;
use crate::repos::TranscriptStore;

/// In-process directory of live session actors.
///
/// The map lock is only held to look up or insert an actor, never while an
/// actor runs, so unrelated sessions do not wait on each other.
#[derive(Clone)]
pub struct SessionRegistry {
    actors: Arc<Mutex<HashMap<SessionAddress, Arc<SessionActor>>>>,
    store: Arc<dyn TranscriptStore>,
    gateway: Arc<dyn LlmGateway>,
    config: Arc<SessionConfig>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        gateway: Arc<dyn LlmGateway>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            actors: Arc::new(Mutex::new(HashMap::new())),
            store,
            gateway,
            config,
        }
    }

    pub fn actor_for(&self, session_id: &SessionId) -> Arc<SessionActor> {
        let address = session_id.address();
        let mut actors = self.lock_actors();

        if let Some(actor) = actors.get(&address) {
            return Arc::clone(actor);
        }

        debug!(session = %address, "creating session actor");
        let actor = Arc::new(SessionActor::new(
            address.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.gateway),
            Arc::clone(&self.config),
        ));
        actors.insert(address, Arc::clone(&actor));
        actor
    }

    pub fn resident_sessions(&self) -> usize {
        self.lock_actors().len()
    }

    pub fn store(&self) -> &Arc<dyn TranscriptStore> {
        &self.store
    }

    fn lock_actors(&self) -> MutexGuard<'_, HashMap<SessionAddress, Arc<SessionActor>>> {
        match self.actors.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
