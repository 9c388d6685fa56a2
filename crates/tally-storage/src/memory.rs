use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tally_common::{MetricUpdate, MetricValue};

use crate::error::{Result, StorageError};
use crate::repository::Repository;

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// In-process backend. Both namespaces share one lock, so a batch never
/// interleaves with a single update.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    maps: Mutex<Maps>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn maps(&self) -> MutexGuard<'_, Maps> {
        // no critical section can panic half-way through a write
        self.maps.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn accumulate(id: &str, current: i64, delta: i64) -> Result<i64> {
    current.checked_add(delta).ok_or_else(|| {
        StorageError::CounterOverflow(format!("{}: {} + {} exceeds i64", id, current, delta))
    })
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()> {
        self.maps().gauges.insert(id.to_string(), value);
        Ok(())
    }

    async fn update_counter(&self, id: &str, delta: i64) -> Result<()> {
        let mut maps = self.maps();
        let current = maps.counters.get(id).copied().unwrap_or(0);
        let next = accumulate(id, current, delta)?;
        maps.counters.insert(id.to_string(), next);
        Ok(())
    }

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>> {
        Ok(self.maps().gauges.get(id).copied())
    }

    async fn get_counter(&self, id: &str) -> Result<Option<i64>> {
        Ok(self.maps().counters.get(id).copied())
    }

    async fn get_all_gauges(&self) -> Result<HashMap<String, f64>> {
        Ok(self.maps().gauges.clone())
    }

    async fn get_all_counters(&self) -> Result<HashMap<String, i64>> {
        Ok(self.maps().counters.clone())
    }

    async fn update_batch(&self, updates: &[MetricUpdate]) -> Result<()> {
        let mut maps = self.maps();

        // Compute every counter total first; nothing is written until the
        // whole batch is known to succeed.
        let mut counters: HashMap<&str, i64> = HashMap::new();
        for update in updates {
            if let MetricValue::Counter(delta) = update.value {
                let current = match counters.get(update.id.as_str()) {
                    Some(staged) => *staged,
                    None => maps.counters.get(&update.id).copied().unwrap_or(0),
                };
                counters.insert(&update.id, accumulate(&update.id, current, delta)?);
            }
        }

        for update in updates {
            if let MetricValue::Gauge(v) = update.value {
                maps.gauges.insert(update.id.clone(), v);
            }
        }
        for (id, total) in counters {
            maps.counters.insert(id.to_string(), total);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
