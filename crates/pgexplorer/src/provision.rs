//! Per-request connection provisioning.
//!
//! [`ConnectionFactory`] owns the registry of driver configurations keyed by
//! connection name. Each acquire registers a fresh pool under its key,
//! replacing any previous one, and returns a [`ConnectionHandle`] that tears
//! the registration down again when dropped.
//!
//! ```ignore
//! let factory = ConnectionFactory::new(ExplorerConfig::default());
//! let handle = factory.acquire(&profile, None).await?;
//! let rows = Executor::new().execute_single(handle.client(), "SELECT 1", &[]).await?;
//! // `handle` dropped: key released
//! ```

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, ExplorerResult};
use crate::pool;
use crate::profile::{ConnectionProfile, Credentials};
use deadpool_postgres::Pool;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry key for a stored profile, optionally against another database.
pub fn connection_key(profile_id: i64, database: Option<&str>) -> String {
    match database.filter(|db| !db.is_empty()) {
        Some(db) => format!("postgres_{profile_id}_{db}"),
        None => format!("postgres_{profile_id}"),
    }
}

fn test_key() -> String {
    format!("postgres_test_{}", uuid::Uuid::new_v4().simple())
}

struct Slot {
    generation: u64,
    pool: Pool,
}

struct Inner {
    config: ExplorerConfig,
    slots: Mutex<HashMap<String, Slot>>,
    next_generation: AtomicU64,
}

/// Cloneable handle over the connection registry.
#[derive(Clone)]
pub struct ConnectionFactory {
    inner: Arc<Inner>,
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionFactory")
            .field("keys", &self.registered_keys())
            .finish()
    }
}

impl ConnectionFactory {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                slots: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.inner.config
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.inner.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Keys with a live registration, sorted.
    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.slots().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.slots().contains_key(key)
    }

    /// Register a fresh pool under `key`, closing whatever was there.
    fn register(&self, key: String, credentials: &Credentials) -> ExplorerResult<(Pool, SlotGuard)> {
        let pool = pool::create_pool(credentials, &self.inner.config)?;
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        let previous = self.slots().insert(
            key.clone(),
            Slot {
                generation,
                pool: pool.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(key = %key, generation, "replacing registered connection");
            previous.pool.close();
        }

        let guard = SlotGuard {
            factory: self.clone(),
            key,
            generation,
        };
        Ok((pool, guard))
    }

    /// Remove `key` only if it still holds `generation`.
    fn release_slot(&self, key: &str, generation: u64) {
        let mut slots = self.slots();
        if slots.get(key).is_some_and(|s| s.generation == generation) {
            if let Some(slot) = slots.remove(key) {
                slot.pool.close();
            }
            tracing::debug!(key = %key, generation, "connection released");
        }
    }

    /// Provision a handle for a stored profile, optionally against another database.
    pub async fn acquire(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
    ) -> ExplorerResult<ConnectionHandle> {
        let key = connection_key(profile.id, database);
        match database.filter(|db| !db.is_empty()) {
            Some(db) => self.acquire_key(key, &profile.credentials.with_database(db)).await,
            None => self.acquire_key(key, &profile.credentials).await,
        }
    }

    /// Register `credentials` under `key` and open a connection.
    ///
    /// The registration is removed again if opening fails.
    pub async fn acquire_key(
        &self,
        key: String,
        credentials: &Credentials,
    ) -> ExplorerResult<ConnectionHandle> {
        let (pool, guard) = self.register(key, credentials)?;
        let timeout = self.inner.config.connect_timeout();

        tracing::debug!(
            key = %guard.key,
            host = %credentials.host,
            port = credentials.port,
            database = %credentials.database,
            sslmode = %credentials.sslmode,
            "opening connection"
        );
        let client = match tokio::time::timeout(timeout, pool.get()).await {
            Ok(client) => client?,
            Err(_) => return Err(ExplorerError::Timeout(timeout)),
        };

        Ok(ConnectionHandle { client, guard })
    }

    /// Attempt a live round-trip with throwaway credentials.
    pub async fn try_test_connection(&self, credentials: &Credentials) -> ExplorerResult<()> {
        let handle = self.acquire_key(test_key(), credentials).await?;
        handle.client().batch_execute("SELECT 1").await?;
        handle.release();
        Ok(())
    }

    /// [`ConnectionFactory::try_test_connection`] as a boolean.
    pub async fn test_connection(&self, credentials: &Credentials) -> bool {
        match self.try_test_connection(credentials).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    host = %credentials.host,
                    port = credentials.port,
                    error = %e,
                    "connection test failed"
                );
                false
            }
        }
    }
}

/// Releases a registration on drop.
struct SlotGuard {
    factory: ConnectionFactory,
    key: String,
    generation: u64,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.factory.release_slot(&self.key, self.generation);
    }
}

/// A live connection bound to one registration.
///
/// Dropping the handle returns the connection and removes the registration.
pub struct ConnectionHandle {
    // Declared before `guard` so the connection is returned before the pool closes.
    client: deadpool_postgres::Client,
    guard: SlotGuard,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("key", &self.guard.key)
            .field("generation", &self.guard.generation)
            .finish()
    }
}

impl ConnectionHandle {
    pub fn key(&self) -> &str {
        &self.guard.key
    }

    pub fn client(&self) -> &deadpool_postgres::Client {
        &self.client
    }

    /// The driver client, for opening transactions.
    pub fn client_mut(&mut self) -> &mut tokio_postgres::Client {
        &mut self.client
    }

    /// Release explicitly; equivalent to dropping.
    pub fn release(self) {}
}
