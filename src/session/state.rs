//! Per-query session state
//!
//! A key -> JSON value map scoped to one pipeline run. The orchestrator owns
//! it; stages receive a mutable borrow for the duration of their turn and
//! write under their own keys.

use crate::cli::config::SessionConfig;
use crate::errors::{PipelineError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Key holding the validated plan
pub const PLAN_KEY: &str = "planner_plan";

/// Key holding the final answer
pub const ANSWER_KEY: &str = "final_response";

/// Transient key holding the submitted query
pub const QUERY_KEY: &str = "user_query";

/// Transient key holding the aggregated retrieval output
pub const RETRIEVER_CONTENT_KEY: &str = "retriever_content";

/// Opaque identifiers scoping one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIds {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionIds {
    pub fn new(app_name: impl Into<String>, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Fresh ids with a random session id
    pub fn generate(app_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::new(app_name, user_id, uuid::Uuid::new_v4().to_string())
    }
}

impl From<&SessionConfig> for SessionIds {
    fn from(config: &SessionConfig) -> Self {
        Self::new(&config.app_name, &config.user_id, &config.session_id)
    }
}

/// Mutable key/value state for one query lifecycle
#[derive(Debug, Clone)]
pub struct SessionState {
    ids: SessionIds,
    values: BTreeMap<String, Value>,
}

impl SessionState {
    pub fn new(ids: SessionIds) -> Self {
        Self {
            ids,
            values: BTreeMap::new(),
        }
    }

    pub fn ids(&self) -> &SessionIds {
        &self.ids
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Store a raw value, replacing any previous one
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        tracing::debug!(session_id = %self.ids.session_id, key = %key, "Session state write");
        self.values.insert(key, value);
    }

    /// Store a serializable value
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.insert(key, value);
        Ok(())
    }

    /// Read a typed value; `Ok(None)` when absent
    pub fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.values.get(key) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| PipelineError::Generic(format!("Session key '{}' has unexpected shape: {}", key, e))),
            None => Ok(None),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
