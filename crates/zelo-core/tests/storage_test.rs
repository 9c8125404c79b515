//! Repository integration tests against a real Postgres database.
//!
//! Opt-in via `DATABASE_URL`; each test connects through
//! `TestDatabase::connect` and returns early when no database is
//! configured. Rows are keyed with fresh UUIDs so tests can share one
//! database and run in parallel.

use anyhow::Result;
use chrono::{Duration, Utc};
use uuid::Uuid;
use zelo_testing::{ItemBuilder, TestDatabase};

#[tokio::test]
async fn storage_reports_healthy() -> Result<()> {
    let Some(db) = TestDatabase::connect().await? else {
        return Ok(());
    };
    db.storage().health_check().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_claims_admit_exactly_one_winner() -> Result<()> {
    let Some(db) = TestDatabase::connect().await? else {
        return Ok(());
    };
    let storage = db.storage();
    let now = Utc::now();

    let item = ItemBuilder::text("disputado").build();
    let id = storage.outbox_items.create(&item).await?;

    let (first, second) = tokio::join!(
        storage.outbox_items.claim(id, now),
        storage.outbox_items.claim(id, now),
    );
    let wins = usize::from(first?) + usize::from(second?);
    assert_eq!(wins, 1);

    // A claimed item is no longer claimable.
    assert!(!storage.outbox_items.claim(id, now).await?);
    Ok(())
}

#[tokio::test]
async fn due_batch_puts_unscheduled_items_first() -> Result<()> {
    let Some(db) = TestDatabase::connect().await? else {
        return Ok(());
    };
    let storage = db.storage();
    let now = Utc::now();

    let older_null = ItemBuilder::text("sem agenda, mais antigo")
        .created_at(now - Duration::minutes(10))
        .build();
    let newer_null = ItemBuilder::text("sem agenda, mais novo")
        .created_at(now - Duration::minutes(5))
        .build();
    let past = ItemBuilder::text("agendado no passado")
        .scheduled_at(now - Duration::minutes(1))
        .created_at(now - Duration::minutes(30))
        .build();
    let future = ItemBuilder::text("agendado no futuro")
        .scheduled_at(now + Duration::hours(1))
        .build();

    let older_null_id = storage.outbox_items.create(&older_null).await?;
    let newer_null_id = storage.outbox_items.create(&newer_null).await?;
    let past_id = storage.outbox_items.create(&past).await?;
    let future_id = storage.outbox_items.create(&future).await?;

    let due = storage.outbox_items.find_due(now, 10_000).await?;
    let ours: Vec<_> = due
        .iter()
        .map(|item| item.id)
        .filter(|id| [older_null_id, newer_null_id, past_id, future_id].contains(id))
        .collect();

    // NULL schedules come first in enqueue order, then scheduled rows;
    // the future item is not due at all.
    assert_eq!(ours, vec![older_null_id, newer_null_id, past_id]);
    Ok(())
}

#[tokio::test]
async fn duplicate_idempotency_key_violates_the_unique_index() -> Result<()> {
    let Some(db) = TestDatabase::connect().await? else {
        return Ok(());
    };
    let storage = db.storage();
    let key = format!("dup-{}", Uuid::new_v4().simple());

    let first = ItemBuilder::text("original").idempotency_key(&key).build();
    storage.outbox_items.create(&first).await?;

    let second = ItemBuilder::text("repetido").idempotency_key(&key).build();
    let error = storage.outbox_items.create(&second).await.unwrap_err();
    assert!(error.is_constraint_violation());

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM outbox_items WHERE idempotency_key = $1",
    )
    .bind(&key)
    .fetch_one(storage.pool())
    .await?;
    assert_eq!(count, 1);
    Ok(())
}

#[tokio::test]
async fn expired_lease_changes_hands() -> Result<()> {
    let Some(db) = TestDatabase::connect().await? else {
        return Ok(());
    };
    let storage = db.storage();
    let resource = format!("outbox-worker-{}", Uuid::new_v4().simple());
    let (holder, contender) = (Uuid::new_v4(), Uuid::new_v4());
    let now = Utc::now();

    let lease_end = now + Duration::seconds(30);
    assert!(storage.worker_locks.acquire(&resource, holder, lease_end, now).await?);

    // A live lease refuses other owners but renews for its holder.
    assert!(!storage.worker_locks.acquire(&resource, contender, lease_end, now).await?);
    assert!(storage.worker_locks.acquire(&resource, holder, lease_end, now).await?);

    // Past the expiry the contender takes over.
    let later = now + Duration::seconds(31);
    assert!(
        storage
            .worker_locks
            .acquire(&resource, contender, later + Duration::seconds(30), later)
            .await?
    );
    let lock = storage.worker_locks.find(&resource).await?.expect("lock row");
    assert_eq!(lock.owner, contender);

    // The displaced holder can no longer release it.
    assert!(!storage.worker_locks.release(&resource, holder).await?);
    assert!(storage.worker_locks.release(&resource, contender).await?);
    Ok(())
}
