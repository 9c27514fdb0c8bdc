use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::{SessionAddress, SessionError};
use crate::config::SessionConfig;
use crate::llm::{LlmGateway, LlmGatewayError, LlmGatewayRequest};
use crate::models::{Role, Turn};
use crate::repos::{StoreError, TranscriptStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOutcome {
    pub response: String,
    pub model: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorySnapshot {
    pub turns: Vec<Turn>,
    pub message_count: usize,
}

#[derive(Default)]
struct SessionState {
    loaded: bool,
    turns: Vec<Turn>,
}

/// Sole owner of one session's transcript.
///
/// Every operation holds the state lock from start to finish, including
/// across backend and storage awaits. tokio's mutex queues waiters in
/// arrival order, so concurrent calls for one session run FIFO.
pub struct SessionActor {
    address: SessionAddress,
    state: Mutex<SessionState>,
    store: Arc<dyn TranscriptStore>,
    gateway: Arc<dyn LlmGateway>,
    config: Arc<SessionConfig>,
}

impl SessionActor {
    pub fn new(
        address: SessionAddress,
        store: Arc<dyn TranscriptStore>,
        gateway: Arc<dyn LlmGateway>,
        config: Arc<SessionConfig>,
    ) -> Self {
        Self {
            address,
            state: Mutex::new(SessionState::default()),
            store,
            gateway,
            config,
        }
    }

    pub fn address(&self) -> &SessionAddress {
        &self.address
    }

    /// Append & Generate. A backend failure or timeout rolls the user turn
    /// back; a failed persist rolls both turns back. Dropping the returned
    /// future part way through also rolls back.
    pub async fn message(&self, text: &str) -> Result<MessageOutcome, SessionError> {
        let content = validate_message(text, self.config.max_message_chars)?;

        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        let checkpoint = state.turns.len();
        let user_timestamp = next_timestamp(&state.turns);
        state.turns.push(Turn {
            role: Role::User,
            content,
            timestamp: user_timestamp,
        });
        let mut pending = PendingAppend::new(&self.address, state, checkpoint);

        let request =
            LlmGatewayRequest::from_transcript(&self.config.system_prompt, &pending.state.turns)
                .with_requester_id(self.address.as_str());

        let started_at = Instant::now();
        let generated = match timeout(self.config.backend_timeout, self.gateway.generate(request))
            .await
        {
            Ok(Ok(generated)) if !generated.content.trim().is_empty() => generated,
            Ok(Ok(_)) => {
                return Err(self.roll_back_backend_failure(
                    pending,
                    LlmGatewayError::InvalidProviderPayload("empty_completion".to_string()),
                ));
            }
            Ok(Err(err)) => return Err(self.roll_back_backend_failure(pending, err)),
            Err(_) => {
                return Err(self.roll_back_backend_failure(pending, LlmGatewayError::Timeout));
            }
        };
        let backend_latency_ms = started_at.elapsed().as_millis() as u64;

        let assistant_timestamp = next_timestamp(&pending.state.turns);
        pending.state.turns.push(Turn {
            role: Role::Assistant,
            content: generated.content.clone(),
            timestamp: assistant_timestamp,
        });

        if let Err(err) = self.persist(&pending.state.turns).await {
            pending.roll_back();
            error!(
                session = %self.address,
                error = %err,
                "failed to persist transcript; rolled back message"
            );
            return Err(SessionError::Storage(err));
        }

        let message_count = pending.commit();
        info!(
            session = %self.address,
            model = %generated.model,
            message_count,
            backend_latency_ms,
            "session message completed"
        );

        Ok(MessageOutcome {
            response: generated.content,
            model: generated.model,
            message_count,
        })
    }

    pub async fn history(&self) -> Result<HistorySnapshot, SessionError> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await?;

        Ok(HistorySnapshot {
            turns: state.turns.clone(),
            message_count: state.turns.len(),
        })
    }

    /// Resets to an empty transcript without reading the old durable copy.
    pub async fn clear(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;

        let previous_loaded = state.loaded;
        let previous_turns = std::mem::take(&mut state.turns);
        state.loaded = true;

        if let Err(err) = self.persist(&[]).await {
            state.turns = previous_turns;
            state.loaded = previous_loaded;
            error!(
                session = %self.address,
                error = %err,
                "failed to persist cleared transcript; kept previous state"
            );
            return Err(SessionError::Storage(err));
        }

        info!(
            session = %self.address,
            cleared_turns = previous_turns.len(),
            "session cleared"
        );
        Ok(())
    }

    async fn ensure_loaded(
        &self,
        state: &mut MutexGuard<'_, SessionState>,
    ) -> Result<(), SessionError> {
        if state.loaded {
            return Ok(());
        }

        let stored = self.store.load(&self.address).await.map_err(|err| {
            error!(session = %self.address, error = %err, "failed to load transcript");
            SessionError::Storage(err)
        })?;

        state.turns = stored.unwrap_or_default();
        state.loaded = true;
        debug!(
            session = %self.address,
            message_count = state.turns.len(),
            "session transcript loaded"
        );
        Ok(())
    }

    async fn persist(&self, turns: &[Turn]) -> Result<(), StoreError> {
        let mut attempt = 0_u32;

        loop {
            match self.store.save(&self.address, turns).await {
                Ok(()) => return Ok(()),
                Err(err) if is_retryable(&err) && attempt < self.config.persist_max_retries => {
                    let backoff = self
                        .config
                        .persist_retry_backoff
                        .saturating_mul(2_u32.saturating_pow(attempt));
                    warn!(
                        session = %self.address,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transcript persist failed; retrying"
                    );
                    sleep(backoff).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn roll_back_backend_failure(
        &self,
        pending: PendingAppend<'_>,
        err: LlmGatewayError,
    ) -> SessionError {
        pending.roll_back();
        warn!(
            session = %self.address,
            error = %err,
            "generative backend failed; user turn rolled back"
        );
        SessionError::Backend(err)
    }
}

/// Turns appended by an in-flight `message`, owning the session lock.
///
/// Unless settled through `commit` or `roll_back`, dropping it truncates the
/// transcript to the checkpoint and marks it unloaded, so the next operation
/// re-reads whatever the store actually holds.
struct PendingAppend<'a> {
    address: &'a SessionAddress,
    state: MutexGuard<'a, SessionState>,
    checkpoint: usize,
    settled: bool,
}

impl<'a> PendingAppend<'a> {
    fn new(
        address: &'a SessionAddress,
        state: MutexGuard<'a, SessionState>,
        checkpoint: usize,
    ) -> Self {
        Self {
            address,
            state,
            checkpoint,
            settled: false,
        }
    }

    fn commit(mut self) -> usize {
        self.settled = true;
        self.state.turns.len()
    }

    fn roll_back(mut self) {
        self.state.turns.truncate(self.checkpoint);
        self.settled = true;
    }
}

impl Drop for PendingAppend<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        self.state.turns.truncate(self.checkpoint);
        self.state.loaded = false;
        warn!(
            session = %self.address,
            "session message abandoned before completion; appended turns discarded"
        );
    }
}

fn validate_message(text: &str, max_chars: usize) -> Result<String, SessionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SessionError::Validation("Message is required".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        return Err(SessionError::Validation(format!(
            "Message must be at most {max_chars} characters"
        )));
    }

    Ok(trimmed.to_string())
}

fn is_retryable(err: &StoreError) -> bool {
    !matches!(err, StoreError::InvalidData(_))
}

fn next_timestamp(turns: &[Turn]) -> i64 {
    let now = Utc::now().timestamp_millis();
    turns
        .last()
        .map(|last| last.timestamp.max(now))
        .unwrap_or(now)
}
