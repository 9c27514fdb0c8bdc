use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::llm::LlmGatewayError;
use crate::repos::StoreError;

mod actor;
mod registry;

pub use actor::{HistorySnapshot, MessageOutcome, SessionActor};
pub use registry::SessionRegistry;

pub const MAX_SESSION_ID_BYTES: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("x-session-id header is required")]
    MissingSession,
    #[error("generative backend failed: {0}")]
    Backend(#[from] LlmGatewayError),
    #[error("session storage failed: {0}")]
    Storage(#[from] StoreError),
}

/// Client-chosen opaque session token, trimmed and bounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: Option<&str>) -> Result<Self, SessionError> {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return Err(SessionError::MissingSession);
        }
        if trimmed.len() > MAX_SESSION_ID_BYTES {
            return Err(SessionError::Validation(format!(
                "x-session-id must be at most {MAX_SESSION_ID_BYTES} bytes"
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn address(&self) -> SessionAddress {
        SessionAddress::derive(&self.0)
    }
}

/// Stable actor and storage key, a pure function of the session id bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionAddress(String);

impl SessionAddress {
    pub fn derive(session_id: &str) -> Self {
        let digest = Sha256::digest(session_id.as_bytes());
        Self(URL_SAFE_NO_PAD.encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
