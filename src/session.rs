//! Session state store: in-progress multi-step workflows that span CLI invocations.
//!
//! Records live under `workflow_session:{id}` in whichever storage backend is active.
//! A record holds the merged workflow state plus the arguments of the last step, so a
//! resumed step keeps the original goal, model and tool options.
//!
//! Concurrent resumes of one session from two processes are not coordinated; the last
//! write wins.

use crate::clock::SharedClock;
use crate::error::{ApiError, StorageError};
use crate::storage::SharedStorage;
use crate::workflow::{StepArguments, StepResult, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

pub const SESSION_KEY_PREFIX: &str = "workflow_session:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub tool_name: String,
    pub state: WorkflowState,
    /// Arguments of the most recent step.
    pub arguments: StepArguments,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

pub struct SessionStore {
    storage: SharedStorage,
    clock: SharedClock,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(storage: SharedStorage, clock: SharedClock) -> Self {
        Self {
            storage,
            clock,
            ttl: None,
        }
    }

    /// Override the backend's default TTL for session records.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(session_id: &str) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, session_id)
    }

    /// Merge `result` into the state described by `arguments` and persist it.
    ///
    /// The merge starts from `arguments`, not from the stored record, so saving the same
    /// result twice yields the same record apart from `last_updated`.
    pub fn save(
        &self,
        session_id: &str,
        tool_name: &str,
        result: &StepResult,
        arguments: &StepArguments,
    ) -> Result<SessionRecord, StorageError> {
        let now = self.clock.now();
        let created_at = self
            .load(session_id)?
            .map(|existing| existing.created_at)
            .unwrap_or(now);

        let mut state = WorkflowState::from_arguments(tool_name, session_id, arguments);
        state.apply(result);

        let record = SessionRecord {
            session_id: session_id.to_string(),
            tool_name: tool_name.to_string(),
            state,
            arguments: arguments.clone(),
            created_at,
            last_updated: now,
        };
        let body = serde_json::to_string(&record)?;
        self.storage.set(&Self::key(session_id), &body, self.ttl)?;
        debug!(
            session_id,
            tool = tool_name,
            step = record.state.current_step,
            "session saved"
        );
        Ok(record)
    }

    /// Load a session; unreadable records are deleted and reported absent.
    pub fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        let key = Self::key(session_id);
        let Some(raw) = self.storage.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str::<SessionRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(session_id, error = %e, "discarding unreadable session record");
                self.storage.delete(&key)?;
                Ok(None)
            }
        }
    }

    pub fn delete(&self, session_id: &str) -> Result<(), StorageError> {
        self.storage.delete(&Self::key(session_id))
    }

    /// Live sessions, most recently updated first.
    pub fn list_active(
        &self,
        tool_filter: Option<&str>,
    ) -> Result<Vec<(String, SessionRecord)>, StorageError> {
        let mut sessions = Vec::new();
        for key in self.storage.list_keys(&format!("{}*", SESSION_KEY_PREFIX))? {
            let Some(session_id) = key.strip_prefix(SESSION_KEY_PREFIX) else {
                continue;
            };
            let Some(record) = self.load(session_id)? else {
                continue;
            };
            if tool_filter.is_some_and(|tool| tool != record.tool_name) {
                continue;
            }
            sessions.push((session_id.to_string(), record));
        }
        sessions.sort_by(|a, b| b.1.last_updated.cmp(&a.1.last_updated));
        Ok(sessions)
    }
}

/// `{tool}_{unix_timestamp}_{8 hex chars}`.
pub fn generate_session_id(tool_name: &str, now: DateTime<Utc>) -> Result<String, ApiError> {
    Ok(format!(
        "{}_{}_{}",
        tool_name,
        now.timestamp(),
        random_hex(4)?
    ))
}

pub(crate) fn random_hex(bytes: usize) -> Result<String, ApiError> {
    let mut buf = vec![0u8; bytes];
    getrandom::getrandom(&mut buf).map_err(|e| {
        ApiError::ConfigError(format!("Failed to generate random identifier: {}", e))
    })?;
    Ok(hex::encode(buf))
}
