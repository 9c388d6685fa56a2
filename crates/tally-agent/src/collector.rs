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

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use sysinfo::{CpuExt, Pid, PidExt, ProcessExt, System, SystemExt};
use tokio::runtime::Handle;

use tally_common::{MetricUpdate, MetricValue};

/// Synthetic counter added to every snapshot.
pub const POLL_COUNT: &str = "PollCount";

/// Gauge readings produced by one sampling pass.
pub type Gauges = Vec<(String, f64)>;

/// A source of gauge readings.
///
/// `sample` runs without the collector lock held, so it may do blocking
/// reads (`/proc` and similar).
pub trait Sampler: Send + 'static {
    fn name(&self) -> &'static str;

    fn sample(&mut self) -> Gauges;

    /// Whether a pass of this sampler counts as one poll cycle.
    fn counts_poll(&self) -> bool {
        false
    }
}

/// Point-in-time copy of the collector: every known gauge plus the
/// [`POLL_COUNT`] counter for the cycles since the previous snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub metrics: Vec<MetricUpdate>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn poll_count(&self) -> i64 {
        self.metrics
            .iter()
            .find(|m| m.id == POLL_COUNT)
            .and_then(|m| match m.value {
                MetricValue::Counter(delta) => Some(delta),
                MetricValue::Gauge(_) => None,
            })
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct State {
    gauges: BTreeMap<String, f64>,
    poll_count: i64,
}

/// Shared metrics map written by the samplers and drained by the reporter.
///
/// The mutex guards map writes only; sampling happens before it is taken
/// and delivery after it is released.
#[derive(Debug, Default)]
pub struct Collector {
    state: Mutex<State>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Samples, then records the readings.
    pub fn poll(&self, sampler: &mut dyn Sampler) {
        let gauges = sampler.sample();
        self.record(gauges, sampler.counts_poll());
    }

    pub fn record(&self, gauges: Gauges, count_poll: bool) {
        let mut state = self.lock();
        for (id, value) in gauges {
            state.gauges.insert(id, value);
        }
        if count_poll {
            state.poll_count = state.poll_count.saturating_add(1);
        }
    }

    /// Copies the gauges and resets the poll counter.
    pub fn snapshot(&self) -> Snapshot {
        let (gauges, poll_count) = {
            let mut state = self.lock();
            let poll_count = std::mem::take(&mut state.poll_count);
            (state.gauges.clone(), poll_count)
        };

        let mut metrics: Vec<MetricUpdate> = gauges
            .into_iter()
            .map(|(id, value)| MetricUpdate::gauge(id, value))
            .collect();
        metrics.push(MetricUpdate::counter(POLL_COUNT, poll_count.max(0)));
        Snapshot { metrics }
    }

    pub fn poll_count(&self) -> i64 {
        self.lock().poll_count
    }

    pub fn gauge(&self, id: &str) -> Option<f64> {
        self.lock().gauges.get(id).copied()
    }
}

/// Process and async-runtime statistics of the agent itself, plus a fresh
/// `RandomValue` each pass.
///
/// | Gauge | Source |
/// |---|---|
/// | `ProcessResidentMemory`, `ProcessVirtualMemory` | bytes |
/// | `ProcessCpuUsage` | percent of one core since the previous pass |
/// | `ProcessRunTime` | seconds |
/// | `ProcessDiskRead`, `ProcessDiskWritten` | bytes since the previous pass |
/// | `ProcessTotalDiskRead`, `ProcessTotalDiskWritten` | bytes |
/// | `RuntimeWorkers`, `RuntimeAliveTasks` | tokio runtime |
/// | `RandomValue` | uniform in `[0, 1)` |
pub struct RuntimeSampler {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn process_gauges(&mut self, out: &mut Gauges) {
        let Some(pid) = self.pid else {
            return;
        };
        if !self.system.refresh_process(pid) {
            return;
        }
        let Some(process) = self.system.process(pid) else {
            return;
        };

        let disk = process.disk_usage();
        out.extend([
            ("ProcessResidentMemory".to_string(), process.memory() as f64),
            ("ProcessVirtualMemory".to_string(), process.virtual_memory() as f64),
            ("ProcessCpuUsage".to_string(), process.cpu_usage() as f64),
            ("ProcessRunTime".to_string(), process.run_time() as f64),
            ("ProcessDiskRead".to_string(), disk.read_bytes as f64),
            ("ProcessDiskWritten".to_string(), disk.written_bytes as f64),
            ("ProcessTotalDiskRead".to_string(), disk.total_read_bytes as f64),
            ("ProcessTotalDiskWritten".to_string(), disk.total_written_bytes as f64),
        ]);
    }
}

impl Default for RuntimeSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RuntimeSampler {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn sample(&mut self) -> Gauges {
        let mut out = Gauges::with_capacity(11);
        self.process_gauges(&mut out);

        if let Ok(handle) = Handle::try_current() {
            let metrics = handle.metrics();
            out.push(("RuntimeWorkers".to_string(), metrics.num_workers() as f64));
            out.push(("RuntimeAliveTasks".to_string(), metrics.num_alive_tasks() as f64));
        }

        out.push(("RandomValue".to_string(), rand::thread_rng().gen::<f64>()));
        out
    }

    fn counts_poll(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for RuntimeSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeSampler")
            .field("pid", &self.pid.map(|p| p.as_u32()))
            .finish()
    }
}

/// `TotalMemory`, `FreeMemory` and one `CPUutilization<N>` per core,
/// numbered from 1.
pub struct HostSampler {
    system: System,
}

impl HostSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first one.
        system.refresh_cpu();
        Self { system }
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for HostSampler {
    fn name(&self) -> &'static str {
        "host"
    }

    fn sample(&mut self) -> Gauges {
        self.system.refresh_memory();
        self.system.refresh_cpu();

        let mut out = Gauges::with_capacity(2 + self.system.cpus().len());
        out.push(("TotalMemory".to_string(), self.system.total_memory() as f64));
        out.push(("FreeMemory".to_string(), self.system.free_memory() as f64));
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            out.push((format!("CPUutilization{}", i + 1), cpu.cpu_usage() as f64));
        }
        out
    }
}

impl std::fmt::Debug for HostSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSampler")
            .field("cpus", &self.system.cpus().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Asserts the collector lock is free while sampling.
    struct ProbeSampler {
        collector: Arc<Collector>,
        observed_free: bool,
    }

    impl Sampler for ProbeSampler {
        fn name(&self) -> &'static str {
            "probe"
        }

        fn sample(&mut self) -> Gauges {
            self.observed_free = self.collector.state.try_lock().is_ok();
            vec![("Probe".to_string(), 1.0)]
        }

        fn counts_poll(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_sampling_happens_outside_lock() {
        let collector = Arc::new(Collector::new());
        let mut sampler = ProbeSampler {
            collector: collector.clone(),
            observed_free: false,
        };

        collector.poll(&mut sampler);

        assert!(sampler.observed_free);
        assert_eq!(collector.gauge("Probe"), Some(1.0));
        assert_eq!(collector.poll_count(), 1);
    }

    #[test]
    fn test_snapshot_resets_poll_count_only() {
        let collector = Collector::new();
        collector.record(vec![("Alloc".to_string(), 5.0)], true);
        collector.record(vec![("Alloc".to_string(), 6.0)], true);
        collector.record(vec![("TotalMemory".to_string(), 100.0)], false);

        let first = collector.snapshot();
        assert_eq!(first.poll_count(), 2);
        assert_eq!(
            first.metrics,
            vec![
                MetricUpdate::gauge("Alloc", 6.0),
                MetricUpdate::gauge("TotalMemory", 100.0),
                MetricUpdate::counter(POLL_COUNT, 2),
            ]
        );

        let second = collector.snapshot();
        assert_eq!(second.poll_count(), 0);
        assert_eq!(second.len(), 3);
        assert_eq!(collector.gauge("Alloc"), Some(6.0));
    }

    #[test]
    fn test_empty_collector_snapshot_has_poll_count() {
        let snapshot = Collector::new().snapshot();
        assert_eq!(snapshot.metrics, vec![MetricUpdate::counter(POLL_COUNT, 0)]);
    }

    #[test]
    fn test_concurrent_polls_are_all_counted() {
        let collector = Arc::new(Collector::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        collector.record(vec![(format!("T{}", t), i as f64)], true);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.poll_count(), 800);
        assert_eq!(collector.gauge("T3"), Some(99.0));
    }

    #[tokio::test]
    async fn test_runtime_sampler_gauges() {
        let mut sampler = RuntimeSampler::new();
        let gauges: BTreeMap<String, f64> = sampler.sample().into_iter().collect();

        let random = gauges["RandomValue"];
        assert!((0.0..1.0).contains(&random));
        assert!(gauges["RuntimeWorkers"] >= 1.0);
        if cfg!(target_os = "linux") {
            assert!(gauges["ProcessResidentMemory"] > 0.0);
            assert!(gauges.contains_key("ProcessTotalDiskWritten"));
        }
        assert!(sampler.counts_poll());
    }

    #[test]
    fn test_host_sampler_names_cpus_from_one() {
        let mut sampler = HostSampler::new();
        let gauges = sampler.sample();
        let names: Vec<&str> = gauges.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(&names[..2], &["TotalMemory", "FreeMemory"]);
        if names.len() > 2 {
            assert_eq!(names[2], "CPUutilization1");
        }
        assert!(!names.contains(&"CPUutilization0"));
        assert!(!sampler.counts_poll());
    }

    #[test]
    fn test_poll_count_counter_value() {
        let collector = Collector::new();
        collector.record(Vec::new(), true);
        let snapshot = collector.snapshot();
        let last = snapshot.metrics.last().unwrap();
        assert_eq!(last.value, MetricValue::Counter(1));
    }
}
