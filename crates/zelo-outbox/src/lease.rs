//! Worker lease.
//!
//! At most one worker drains the outbox at a time. The lease is a
//! conditional upsert on a named resource row: acquisition succeeds when
//! the row is free, expired, or already held by the same owner. Expiry is
//! purely time based, so a crashed holder is displaced once its TTL runs
//! out without any cleanup step.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use zelo_core::error::Result;

/// Resource name guarding the delivery pass.
pub const WORKER_LOCK_RESOURCE: &str = "outbox-worker";

/// Lease acquisition and release over a named resource.
#[async_trait::async_trait]
pub trait LeaseStore: Send + Sync + fmt::Debug {
    /// Attempts to take the lease for `ttl`. Returns false when another
    /// live owner holds it. Re-acquisition by the current owner extends
    /// the expiry.
    async fn acquire(
        &self,
        resource: &str,
        owner: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Releases the lease if still held by `owner`. Returns false when the
    /// lease had already moved on.
    async fn release(&self, resource: &str, owner: Uuid) -> Result<bool>;
}

/// Production lease over the `worker_locks` table.
pub struct PgLeaseStore {
    storage: Arc<zelo_core::Storage>,
}

impl PgLeaseStore {
    /// Wraps the concrete storage layer.
    pub fn new(storage: Arc<zelo_core::Storage>) -> Self {
        Self { storage }
    }
}

impl fmt::Debug for PgLeaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgLeaseStore").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl LeaseStore for PgLeaseStore {
    async fn acquire(
        &self,
        resource: &str,
        owner: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        self.storage
            .worker_locks
            .acquire(resource, owner, expires_at, now)
            .await
    }

    async fn release(&self, resource: &str, owner: Uuid) -> Result<bool> {
        self.storage.worker_locks.release(resource, owner).await
    }
}

/// In-memory lease for tests, with the same expiry semantics.
#[derive(Debug, Default)]
pub struct InMemoryLeaseStore {
    locks: tokio::sync::Mutex<HashMap<String, (Uuid, DateTime<Utc>)>>,
}

impl InMemoryLeaseStore {
    /// Creates an empty lease store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a resource, ignoring expiry. For assertions.
    pub async fn holder(&self, resource: &str) -> Option<Uuid> {
        self.locks
            .lock()
            .await
            .get(resource)
            .map(|(owner, _)| *owner)
    }
}

#[async_trait::async_trait]
impl LeaseStore for InMemoryLeaseStore {
    async fn acquire(
        &self,
        resource: &str,
        owner: Uuid,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let expires_at = now
            + chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));
        let mut locks = self.locks.lock().await;
        match locks.get(resource) {
            Some((holder, held_until)) if *holder != owner && *held_until > now => Ok(false),
            _ => {
                locks.insert(resource.to_string(), (owner, expires_at));
                Ok(true)
            }
        }
    }

    async fn release(&self, resource: &str, owner: Uuid) -> Result<bool> {
        let mut locks = self.locks.lock().await;
        match locks.get(resource) {
            Some((holder, _)) if *holder == owner => {
                locks.remove(resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn second_owner_is_refused_while_lease_lives() {
        let store = InMemoryLeaseStore::new();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.acquire(WORKER_LOCK_RESOURCE, a, TTL, now).await.unwrap());
        assert!(!store.acquire(WORKER_LOCK_RESOURCE, b, TTL, now).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_displaced() {
        let store = InMemoryLeaseStore::new();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.acquire(WORKER_LOCK_RESOURCE, a, TTL, now).await.unwrap());
        let later = now + chrono::Duration::seconds(31);
        assert!(store.acquire(WORKER_LOCK_RESOURCE, b, TTL, later).await.unwrap());
        assert_eq!(store.holder(WORKER_LOCK_RESOURCE).await, Some(b));
    }

    #[tokio::test]
    async fn owner_can_reacquire_to_extend() {
        let store = InMemoryLeaseStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();

        assert!(store.acquire(WORKER_LOCK_RESOURCE, owner, TTL, now).await.unwrap());
        let mid = now + chrono::Duration::seconds(10);
        assert!(store.acquire(WORKER_LOCK_RESOURCE, owner, TTL, mid).await.unwrap());
    }

    #[tokio::test]
    async fn release_only_succeeds_for_the_holder() {
        let store = InMemoryLeaseStore::new();
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store.acquire(WORKER_LOCK_RESOURCE, a, TTL, now).await.unwrap();
        assert!(!store.release(WORKER_LOCK_RESOURCE, b).await.unwrap());
        assert!(store.release(WORKER_LOCK_RESOURCE, a).await.unwrap());
        assert!(store.holder(WORKER_LOCK_RESOURCE).await.is_none());
    }
}
