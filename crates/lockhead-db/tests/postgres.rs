//! Tests against a live PostgreSQL server.
//!
//! Ignored by default. Run with:
//!
//! ```sh
//! DATABASE_URL=postgres://... cargo test -p lockhead-db -- --ignored
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lockhead_config::DatabaseConfig;
use lockhead_core::{
    ClaimEngine, ClaimWindow, Job, JobId, JobStore, LockQuery, Wake, WakeChannel,
};
use lockhead_db::{PgJobStore, PgWakeChannel, create_pool, reset_schema, run_migrations};
use sqlx::PgPool;

// Every test resets the same table.
static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

async fn fresh_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let config = DatabaseConfig {
        url,
        max_connections: 32,
        quiet: true,
    };
    let pool = create_pool(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    reset_schema(&pool).await.unwrap();
    pool
}

async fn db_now(pool: &PgPool) -> DateTime<Utc> {
    sqlx::query_scalar("SELECT NOW()")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_insert_and_count() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let store = PgJobStore::new(pool.clone());

    let a = store.insert("a").await.unwrap();
    let b = store.insert("b").await.unwrap();
    assert!(a < b);
    assert_eq!(store.count_eligible().await.unwrap(), 2);

    let ids = store
        .insert_batch(&["c".to_string(), "d".to_string()])
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] > b && ids[1] > ids[0]);
    assert_eq!(store.count_eligible().await.unwrap(), 4);

    let job = store.get(b).await.unwrap().unwrap();
    assert_eq!(job.details, "b");
    assert!(job.locked_at.is_none());
}

#[tokio::test]
#[ignore]
async fn test_try_lock_one_at_offset() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let store = PgJobStore::new(pool.clone());
    for d in ["a", "b", "c"] {
        store.insert(d).await.unwrap();
    }

    let job = store.try_lock_one(LockQuery::at(2)).await.unwrap().unwrap();
    assert_eq!(job.details, "c");
    assert!(job.locked_at.is_some());

    assert!(store.try_lock_one(LockQuery::at(2)).await.unwrap().is_none());
    assert_eq!(store.count_eligible().await.unwrap(), 2);
}

#[tokio::test]
#[ignore]
async fn test_claim_empty_table() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let engine = ClaimEngine::new(Arc::new(PgJobStore::new(pool)), ClaimWindow::default());

    let attempt = engine.attempt().await.unwrap();
    assert_eq!(attempt.job_count, 0);
    assert!(attempt.job.is_none());
}

#[tokio::test]
#[ignore]
async fn test_low_load_claims_in_order() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let store = Arc::new(PgJobStore::new(pool));
    let mut inserted = Vec::new();
    for i in 0..5 {
        inserted.push(store.insert(&format!("job-{}", i)).await.unwrap());
    }

    let engine = ClaimEngine::new(store.clone(), ClaimWindow::default());
    for expected in inserted {
        let job = engine.claim().await.unwrap().unwrap();
        assert_eq!(job.id, expected);
    }
    assert!(engine.claim().await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_single_job_one_winner() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let store = Arc::new(PgJobStore::new(pool));
    let id = store.insert("only").await.unwrap();
    let engine = Arc::new(ClaimEngine::new(store.clone(), ClaimWindow::default()));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.claim().await })
        })
        .collect();

    let winners: Vec<Job> = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter_map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_claimers_partition_jobs() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let start = db_now(&pool).await;
    let store = Arc::new(PgJobStore::new(pool));
    let details: Vec<String> = (1..=12).map(|i| format!("job-{}", i)).collect();
    let ids: HashSet<JobId> = store.insert_batch(&details).await.unwrap().into_iter().collect();
    let engine = Arc::new(ClaimEngine::new(store.clone(), ClaimWindow::default()));

    // A claim that loses a row race comes back empty; claimers poll again.
    let handles: Vec<_> = (0..12)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    if let Some(job) = engine.claim().await.unwrap() {
                        return Some(job);
                    }
                }
                None
            })
        })
        .collect();

    let jobs: Vec<Job> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().expect("claimer got a job"))
        .collect();

    let claimed: HashSet<JobId> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(claimed.len(), 12, "a job was returned twice");
    assert_eq!(claimed, ids);
    for job in &jobs {
        assert!(job.locked_at.unwrap() >= start);
    }
    assert_eq!(store.count_eligible().await.unwrap(), 0);
}

#[tokio::test]
#[ignore]
async fn test_delete_claimed_job() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let store = PgJobStore::new(pool);
    let id = store.insert("a").await.unwrap();
    store.try_lock_one(LockQuery::head()).await.unwrap().unwrap();

    assert!(store.delete(id).await.unwrap());
    assert!(!store.delete(id).await.unwrap());
    assert!(store.get(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_notify_wakes_listener() {
    let _guard = DB_LOCK.lock().await;
    let pool = fresh_pool().await;
    let channel = PgWakeChannel::new(pool, "lockhead_test");
    let mut sub = channel.subscribe().await.unwrap();

    assert_eq!(
        sub.wait(Duration::from_millis(100)).await.unwrap(),
        Wake::TimedOut
    );

    for _ in 0..3 {
        channel.publish().await.unwrap();
    }
    assert_eq!(
        sub.wait(Duration::from_secs(5)).await.unwrap(),
        Wake::Signalled
    );
}
