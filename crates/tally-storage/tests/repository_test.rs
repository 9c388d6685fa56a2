//! Repository behaviour under concurrency and transient failure.

use async_trait::async_trait;
use sqlx::Executor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tally_common::{MetricUpdate, RetryPolicy};
use tally_storage::{
    MemoryRepository, PostgresRepository, Repository, Result, RetryingRepository, StorageError,
};

/// Fails the first `failures` mutating calls with the given error, without
/// touching the wrapped repository, then delegates.
struct Flaky {
    inner: MemoryRepository,
    failures: AtomicUsize,
    calls: AtomicUsize,
    transient: bool,
}

impl Flaky {
    fn new(failures: usize, transient: bool) -> Self {
        Self {
            inner: MemoryRepository::new(),
            failures: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
            transient,
        }
    }

    fn trip(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(if self.transient {
                StorageError::Transient("connection reset".into())
            } else {
                StorageError::Fatal("unique violation".into())
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for Flaky {
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()> {
        self.trip()?;
        self.inner.update_gauge(id, value).await
    }

    async fn update_counter(&self, id: &str, delta: i64) -> Result<()> {
        self.trip()?;
        self.inner.update_counter(id, delta).await
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>> {
        self.inner.get_gauge(id).await
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>> {
        self.inner.get_counter(id).await
    }

    async fn get_all_gauges(&self) -> Result<HashMap<String, f64>> {
        self.inner.get_all_gauges().await
    }

    async fn get_all_counters(&self) -> Result<HashMap<String, i64>> {
        self.inner.get_all_counters().await
    }

    async fn update_batch(&self, updates: &[MetricUpdate]) -> Result<()> {
        self.trip()?;
        self.inner.update_batch(updates).await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Concurrency (memory backend)
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_counter_sum() {
    let repo = Arc::new(MemoryRepository::new());
    let mut tasks = Vec::new();

    for writer in 0..8i64 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            for i in 1..=250i64 {
                repo.update_counter("shared", i).await.unwrap();
                repo.update_counter(&format!("own-{}", writer), 1).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let per_writer: i64 = (1..=250).sum();
    assert_eq!(repo.get_counter("shared").await.unwrap(), Some(8 * per_writer));
    for writer in 0..8 {
        assert_eq!(
            repo.get_counter(&format!("own-{}", writer)).await.unwrap(),
            Some(250)
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gauge_is_one_of_written_values() {
    let repo = Arc::new(MemoryRepository::new());
    let mut tasks = Vec::new();

    for writer in 0..4 {
        let repo = repo.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..100 {
                repo.update_gauge("g", writer as f64 + 0.5).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let value = repo.get_gauge("g").await.unwrap().unwrap();
    assert!([0.5, 1.5, 2.5, 3.5].contains(&value));

    repo.update_gauge("g", 42.0).await.unwrap();
    assert_eq!(repo.get_gauge("g").await.unwrap(), Some(42.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batches_do_not_interleave_with_single_updates() {
    let repo = Arc::new(MemoryRepository::new());

    let batcher = {
        let repo = repo.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                repo.update_batch(&[
                    MetricUpdate::counter("a", 1),
                    MetricUpdate::counter("b", 1),
                ])
                .await
                .unwrap();
            }
        })
    };
    let reader = {
        let repo = repo.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                let counters = repo.get_all_counters().await.unwrap();
                assert_eq!(counters.get("a"), counters.get("b"));
            }
        })
    };

    batcher.await.unwrap();
    reader.await.unwrap();
    assert_eq!(repo.get_counter("a").await.unwrap(), Some(200));
}

// ============================================================================
// Retry decorator
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_twice_then_success_counts_once() {
    let repo = RetryingRepository::new(Flaky::new(2, true));
    let started = tokio::time::Instant::now();

    repo.update_batch(&[MetricUpdate::counter("Requests", 5)])
        .await
        .unwrap();

    assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 3);
    assert_eq!(repo.get_counter("Requests").await.unwrap(), Some(5));
    assert!(started.elapsed() >= Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_is_not_retried() {
    let repo = RetryingRepository::new(Flaky::new(1, false));

    let result = repo.update_counter("Requests", 5).await;

    assert!(matches!(result, Err(StorageError::Fatal(_))));
    assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 1);
    assert_eq!(repo.get_counter("Requests").await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted_surfaces_transient() {
    let repo = RetryingRepository::new(Flaky::new(10, true));

    let result = repo.update_gauge("g", 1.0).await;

    assert!(matches!(result, Err(StorageError::Transient(_))));
    assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_custom_policy() {
    let policy = RetryPolicy::new(vec![Duration::from_millis(10)]);
    let repo = RetryingRepository::with_policy(Flaky::new(1, true), policy);

    repo.update_gauge("g", 3.0).await.unwrap();
    assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 2);
    assert_eq!(repo.get_gauge("g").await.unwrap(), Some(3.0));
}

// ============================================================================
// PostgreSQL (runs only when TALLY_TEST_DATABASE_URL is set)
// ============================================================================

#[tokio::test]
async fn test_postgres_semantics() {
    let Ok(dsn) = std::env::var("TALLY_TEST_DATABASE_URL") else {
        eprintln!("TALLY_TEST_DATABASE_URL not set, skipping");
        return;
    };

    let repo = PostgresRepository::connect(&dsn).await.unwrap();
    repo.pool()
        .execute(include_str!("../migrations/0001_create_metrics.sql"))
        .await
        .unwrap();
    repo.ping().await.unwrap();

    let id = format!("it-{}", std::process::id());
    let repo = RetryingRepository::new(repo);

    repo.update_counter(&id, 3).await.unwrap();
    repo.update_batch(&[MetricUpdate::counter(id.clone(), 4), MetricUpdate::gauge(id.clone(), 1.5)])
        .await
        .unwrap();
    assert_eq!(repo.get_counter(&id).await.unwrap(), Some(7));
    assert_eq!(repo.get_gauge(&id).await.unwrap(), Some(1.5));

    // overflow in the middle rolls the batch back
    let result = repo
        .update_batch(&[
            MetricUpdate::gauge(id.clone(), 9.0),
            MetricUpdate::counter(id.clone(), i64::MAX),
        ])
        .await;
    assert!(matches!(result, Err(StorageError::CounterOverflow(_))));
    assert_eq!(repo.get_gauge(&id).await.unwrap(), Some(1.5));
    assert_eq!(repo.get_counter(&id).await.unwrap(), Some(7));
}
