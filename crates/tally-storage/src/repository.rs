// Copyright 2025 Tally Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use async_trait::async_trait;
use std::collections::HashMap;

use tally_common::{Metric, MetricKind, MetricUpdate, MetricValue};

use crate::error::Result;

/// Kind-aware metric storage.
///
/// Gauge and counter ids live in separate namespaces. Reads of whole
/// namespaces return owned copies the caller may mutate freely.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Replaces the gauge value.
    async fn update_gauge(&self, id: &str, value: f64) -> Result<()>;

    /// Adds `delta` to the counter, creating it at zero first if needed.
    async fn update_counter(&self, id: &str, delta: i64) -> Result<()>;

    async fn get_gauge(&self, id: &str) -> Result<Option<f64>>;

    async fn get_counter(&self, id: &str) -> Result<Option<i64>>;

    async fn get_all_gauges(&self) -> Result<HashMap<String, f64>>;

    async fn get_all_counters(&self) -> Result<HashMap<String, i64>>;

    /// Applies every update or none of them.
    async fn update_batch(&self, updates: &[MetricUpdate]) -> Result<()>;

    /// Backend connectivity check.
    async fn ping(&self) -> Result<()>;

    async fn apply(&self, update: &MetricUpdate) -> Result<()> {
        match update.value {
            MetricValue::Gauge(v) => self.update_gauge(&update.id, v).await,
            MetricValue::Counter(d) => self.update_counter(&update.id, d).await,
        }
    }

    async fn get(&self, id: &str, kind: MetricKind) -> Result<Option<MetricValue>> {
        Ok(match kind {
            MetricKind::Gauge => self.get_gauge(id).await?.map(MetricValue::Gauge),
            MetricKind::Counter => self.get_counter(id).await?.map(MetricValue::Counter),
        })
    }

    /// Every stored metric, gauges first, each namespace sorted by id.
    async fn export(&self) -> Result<Vec<Metric>> {
        let mut gauges: Vec<_> = self.get_all_gauges().await?.into_iter().collect();
        let mut counters: Vec<_> = self.get_all_counters().await?.into_iter().collect();
        gauges.sort_by(|a, b| a.0.cmp(&b.0));
        counters.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(gauges
            .into_iter()
            .map(|(id, v)| Metric::gauge(id, v))
            .chain(counters.into_iter().map(|(id, d)| Metric::counter(id, d)))
            .collect())
    }
}
