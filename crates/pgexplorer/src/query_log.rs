//! Query history.
//!
//! Every successful ad-hoc or mutating execution is mirrored to a
//! [`QueryLogSink`] as a [`QueryLogEntry`] carrying the statement with its
//! values inlined. Durable storage is the sink implementor's concern;
//! [`MemoryQueryLog`] keeps entries in process.

use crate::error::ExplorerResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Who issued the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorKind {
    /// Typed or submitted by a person.
    User,
    /// Issued by the explorer on a person's behalf (browsing, stored queries).
    System,
}

/// One executed statement group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub connection_id: i64,
    /// SQL with bind values inlined; never executed.
    pub query: String,
    pub executor: ExecutorKind,
    pub executor_id: Option<i64>,
    /// Short description, e.g. `Query on public.users with filters`.
    pub tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueryLogEntry {
    pub fn new(connection_id: i64, query: impl Into<String>, executor: ExecutorKind) -> Self {
        Self {
            connection_id,
            query: query.into(),
            executor,
            executor_id: None,
            tag: None,
            created_at: Utc::now(),
        }
    }

    pub fn user(connection_id: i64, query: impl Into<String>, executor_id: Option<i64>) -> Self {
        Self::new(connection_id, query, ExecutorKind::User).executor_id(executor_id)
    }

    pub fn system(connection_id: i64, query: impl Into<String>) -> Self {
        Self::new(connection_id, query, ExecutorKind::System)
    }

    pub fn executor_id(mut self, id: Option<i64>) -> Self {
        self.executor_id = id;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Receiver of executed-statement records.
pub trait QueryLogSink: Send + Sync {
    /// Append an entry.
    fn record(&self, entry: QueryLogEntry) -> impl Future<Output = ExplorerResult<()>> + Send;

    /// Newest-first entries for a connection, at most `limit`.
    fn recent(
        &self,
        connection_id: i64,
        limit: usize,
    ) -> impl Future<Output = ExplorerResult<Vec<QueryLogEntry>>> + Send;

    /// Drop every entry of a deleted connection; returns how many were removed.
    fn purge_connection(&self, connection_id: i64)
    -> impl Future<Output = ExplorerResult<usize>> + Send;
}

/// Entries kept per connection by [`MemoryQueryLog::new`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// In-process sink keeping the newest `capacity` entries per connection.
#[derive(Debug)]
pub struct MemoryQueryLog {
    entries: Mutex<HashMap<i64, Vec<QueryLogEntry>>>,
    capacity: usize,
}

impl Default for MemoryQueryLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MemoryQueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<i64, Vec<QueryLogEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Entries held for a connection.
    pub fn len(&self, connection_id: i64) -> usize {
        self.entries().get(&connection_id).map_or(0, Vec::len)
    }
}

impl QueryLogSink for MemoryQueryLog {
    async fn record(&self, entry: QueryLogEntry) -> ExplorerResult<()> {
        let mut entries = self.entries();
        let list = entries.entry(entry.connection_id).or_default();
        list.push(entry);
        // Evict the oldest; ties on created_at go to the earlier insert.
        while list.len() > self.capacity {
            let oldest = list
                .iter()
                .enumerate()
                .min_by_key(|(idx, e)| (e.created_at, *idx))
                .map(|(idx, _)| idx);
            match oldest {
                Some(idx) => {
                    list.remove(idx);
                }
                None => break,
            }
        }
        Ok(())
    }

    async fn recent(&self, connection_id: i64, limit: usize) -> ExplorerResult<Vec<QueryLogEntry>> {
        let entries = self.entries();
        let Some(list) = entries.get(&connection_id) else {
            return Ok(Vec::new());
        };
        // Ties on created_at fall back to insertion order.
        let mut sorted: Vec<_> = list.iter().enumerate().collect();
        sorted.sort_by_key(|(idx, e)| (e.created_at, *idx));
        Ok(sorted
            .into_iter()
            .rev()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn purge_connection(&self, connection_id: i64) -> ExplorerResult<usize> {
        Ok(self.entries().remove(&connection_id).map_or(0, |v| v.len()))
    }
}
