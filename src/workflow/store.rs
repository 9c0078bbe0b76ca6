//! Generic workflow state, keyed `{tool_name}:{continuation_id}`.
//!
//! Batch runs keep their in-flight state here between steps so that a crash mid-run
//! leaves an inspectable record that expires on its own.

use crate::error::StorageError;
use crate::storage::SharedStorage;
use crate::workflow::WorkflowState;
use std::time::Duration;
use tracing::warn;

pub struct WorkflowStateStore {
    storage: SharedStorage,
    ttl: Option<Duration>,
}

impl WorkflowStateStore {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage, ttl: None }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn key(tool_name: &str, continuation_id: &str) -> String {
        format!("{}:{}", tool_name, continuation_id)
    }

    /// Overwrites any live state for the same tool and continuation id.
    pub fn save(&self, state: &WorkflowState) -> Result<(), StorageError> {
        let body = serde_json::to_string(state)?;
        self.storage.set(
            &Self::key(&state.tool_name, &state.continuation_id),
            &body,
            self.ttl,
        )
    }

    /// Corrupt records are deleted and read as absent.
    pub fn load(
        &self,
        tool_name: &str,
        continuation_id: &str,
    ) -> Result<Option<WorkflowState>, StorageError> {
        let key = Self::key(tool_name, continuation_id);
        let Some(raw) = self.storage.get(&key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(key = %key, error = %e, "discarding unreadable workflow state");
                self.storage.delete(&key)?;
                Ok(None)
            }
        }
    }

    pub fn delete(&self, tool_name: &str, continuation_id: &str) -> Result<(), StorageError> {
        self.storage.delete(&Self::key(tool_name, continuation_id))
    }
}
