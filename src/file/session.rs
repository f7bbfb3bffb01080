//! In-memory registry of upload sessions.
//!
//! A session is opened by the first chunk of an upload and closed when the
//! upload is assembled or when the sweeper finds it idle past its TTL.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{Result, VaultError};

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting chunks.
    Receiving,
    /// Claimed by a completion request.
    Completing,
}

/// One in-progress chunked upload.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Client-chosen upload id.
    pub upload_id: String,
    /// Owner who sent the first chunk.
    pub owner_id: String,
    /// When the first chunk arrived.
    pub created_at: DateTime<Utc>,
    /// Current state.
    pub state: SessionState,
    /// Size of each received chunk, keyed by index.
    chunks: BTreeMap<u32, u64>,
    last_activity: Instant,
}

impl UploadSession {
    fn new(upload_id: &str, owner_id: &str) -> Self {
        Self {
            upload_id: upload_id.to_string(),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
            state: SessionState::Receiving,
            chunks: BTreeMap::new(),
            last_activity: Instant::now(),
        }
    }

    /// Number of distinct chunk indices received.
    pub fn received_count(&self) -> usize {
        self.chunks.len()
    }

    /// Whether chunk `index` has been received.
    pub fn has_chunk(&self, index: u32) -> bool {
        self.chunks.contains_key(&index)
    }

    /// Total bytes across received chunks, counting each index once.
    pub fn total_bytes(&self) -> u64 {
        self.chunks.values().sum()
    }

    /// Time since the last chunk or completion attempt.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Thread-safe registry of upload sessions keyed by upload id.
#[derive(Debug, Clone, Default)]
pub struct UploadSessions {
    sessions: Arc<RwLock<HashMap<String, UploadSession>>>,
}

impl UploadSessions {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an incoming chunk, opening the session if needed.
    ///
    /// Fails when another owner holds the upload id, when the session is
    /// being completed, or when the chunk would push the upload past
    /// `max_total_bytes`. Returns the number of distinct chunks received.
    pub async fn admit_chunk(
        &self,
        upload_id: &str,
        owner_id: &str,
        chunk_index: u32,
        chunk_len: u64,
        max_total_bytes: u64,
    ) -> Result<usize> {
        let mut sessions = self.sessions.write().await;

        let (current, previous) = match sessions.get(upload_id) {
            Some(session) => {
                if session.owner_id != owner_id {
                    return Err(VaultError::Permission(
                        "upload belongs to another user".to_string(),
                    ));
                }
                if session.state == SessionState::Completing {
                    return Err(VaultError::Validation(
                        "upload is already being completed".to_string(),
                    ));
                }
                let previous = session.chunks.get(&chunk_index).copied().unwrap_or(0);
                (session.total_bytes(), previous)
            }
            None => (0, 0),
        };

        // Checked before the session exists, so a rejected first chunk opens nothing.
        if current - previous + chunk_len > max_total_bytes {
            return Err(VaultError::Validation(format!(
                "upload exceeds the maximum size of {max_total_bytes} bytes"
            )));
        }

        let session = sessions
            .entry(upload_id.to_string())
            .or_insert_with(|| UploadSession::new(upload_id, owner_id));
        session.chunks.insert(chunk_index, chunk_len);
        session.touch();
        Ok(session.received_count())
    }

    /// Forget a chunk that was admitted but could not be staged.
    pub async fn discard_chunk(&self, upload_id: &str, chunk_index: u32) {
        let mut sessions = self.sessions.write().await;
        let drop_session = match sessions.get_mut(upload_id) {
            Some(session) => {
                session.chunks.remove(&chunk_index);
                session.chunks.is_empty()
            }
            None => false,
        };
        if drop_session {
            sessions.remove(upload_id);
        }
    }

    /// Claim a session for completion.
    ///
    /// Only one claim can be held at a time; a second claim, or a claim on
    /// an unknown id, is `UnknownUpload`.
    pub async fn claim(&self, upload_id: &str, owner_id: &str) -> Result<UploadSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(upload_id)
            .ok_or_else(|| VaultError::UnknownUpload(upload_id.to_string()))?;

        if session.owner_id != owner_id {
            return Err(VaultError::Permission(
                "upload belongs to another user".to_string(),
            ));
        }
        if session.state == SessionState::Completing {
            return Err(VaultError::UnknownUpload(upload_id.to_string()));
        }

        session.state = SessionState::Completing;
        session.touch();
        Ok(session.clone())
    }

    /// Return a claimed session to `Receiving` after a failed completion.
    pub async fn release(&self, upload_id: &str) {
        if let Some(session) = self.sessions.write().await.get_mut(upload_id) {
            session.state = SessionState::Receiving;
            session.touch();
        }
    }

    /// Remove a session after successful completion.
    pub async fn finish(&self, upload_id: &str) -> Option<UploadSession> {
        self.sessions.write().await.remove(upload_id)
    }

    /// Remove receiving sessions idle for at least `ttl` and return their ids.
    pub async fn expire(&self, ttl: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let stale: Vec<String> = sessions
            .values()
            .filter(|s| s.state == SessionState::Receiving && s.idle_time() >= ttl)
            .map(|s| s.upload_id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
        }
        stale
    }

    /// Snapshot of one session.
    pub async fn get(&self, upload_id: &str) -> Option<UploadSession> {
        self.sessions.read().await.get(upload_id).cloned()
    }

    /// Ids of all live sessions.
    pub async fn live_ids(&self) -> HashSet<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
