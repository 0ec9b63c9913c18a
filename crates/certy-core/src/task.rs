//! Background task status tracking
//!
//! A task is created when files are uploaded and is then driven by a single
//! background job. HTTP handlers only read it. Storage sits behind
//! [`TaskStore`] so the in-memory map can be swapped for a persistent or
//! shared store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{DeliveryReport, Result};

/// Lifecycle state of a batch task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl TaskState {
    /// Whether the task has stopped changing
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uploaded => write!(f, "uploaded"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Status record of a batch task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub state: TaskState,
    pub message: String,
    pub processed_count: usize,
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
    pub results: Option<DeliveryReport>,
}

impl TaskStatus {
    /// Status of a freshly uploaded task
    pub fn uploaded(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Uploaded,
            message: "Files uploaded successfully".to_string(),
            processed_count: 0,
            total_count: 0,
            timestamp: Utc::now(),
            results: None,
        }
    }

    /// Move to a new state with a message, refreshing the timestamp
    pub fn transition(&mut self, state: TaskState, message: impl Into<String>) {
        self.state = state;
        self.message = message.into();
        self.timestamp = Utc::now();
    }

    /// Update the message without changing state
    pub fn note(&mut self, message: impl Into<String>) {
        self.message = message.into();
        self.timestamp = Utc::now();
    }
}

/// Outcome of [`TaskStore::try_transition`]
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The task moved to the requested state; holds the new status
    Applied(TaskStatus),
    /// The task was already in the requested state and was left untouched
    Rejected(TaskStatus),
    /// No task with that id
    Missing,
}

/// Storage for task status records, keyed by task id
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Get a task's status
    async fn get(&self, task_id: &str) -> Result<Option<TaskStatus>>;

    /// Insert or replace a task's status
    async fn put(&self, status: TaskStatus) -> Result<()>;

    /// Move a task to `state` in one step, unless it is already there.
    ///
    /// The check and the write happen atomically, so of two concurrent
    /// callers asking for the same state at most one sees `Applied`.
    async fn try_transition(
        &self,
        task_id: &str,
        state: TaskState,
        message: &str,
    ) -> Result<Transition>;

    /// Remove a task, returning whether it existed
    async fn delete(&self, task_id: &str) -> Result<bool>;

    /// All known tasks, oldest first
    async fn list(&self) -> Result<Vec<TaskStatus>>;

    /// Check if a task exists
    async fn contains(&self, task_id: &str) -> Result<bool> {
        Ok(self.get(task_id).await?.is_some())
    }
}

/// Process-local task store
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, TaskStatus>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn get(&self, task_id: &str) -> Result<Option<TaskStatus>> {
        Ok(self.tasks.read().await.get(task_id).cloned())
    }

    async fn put(&self, status: TaskStatus) -> Result<()> {
        self.tasks
            .write()
            .await
            .insert(status.task_id.clone(), status);
        Ok(())
    }

    async fn try_transition(
        &self,
        task_id: &str,
        state: TaskState,
        message: &str,
    ) -> Result<Transition> {
        let mut tasks = self.tasks.write().await;
        let Some(status) = tasks.get_mut(task_id) else {
            return Ok(Transition::Missing);
        };

        if status.state == state {
            tracing::debug!("Task {} is already {}", task_id, state);
            return Ok(Transition::Rejected(status.clone()));
        }

        tracing::debug!("Task {}: {} -> {}", task_id, status.state, state);
        status.transition(state, message);
        Ok(Transition::Applied(status.clone()))
    }

    async fn delete(&self, task_id: &str) -> Result<bool> {
        Ok(self.tasks.write().await.remove(task_id).is_some())
    }

    async fn list(&self) -> Result<Vec<TaskStatus>> {
        let mut tasks: Vec<TaskStatus> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by_key(|t| t.timestamp);
        Ok(tasks)
    }
}
