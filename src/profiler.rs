//! Profiling engine orchestrator
//!
//! `Profiler` owns the event log, the per-metric periodic tasks, the CPU
//! sampler and the optional GPU monitor, and exposes the public surface
//! of the engine. One instance profiles one process; independent
//! instances are fully isolated, so tests (or embedders) can run several
//! side by side.
//!
//! No operation here returns an error: the engine must never destabilize
//! the application it measures, so every failure path degrades to a
//! logged no-op.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::error;
use parking_lot::Mutex;

use crate::clock::{timestamp_ms, TimestampUnit};
use crate::cpu::CpuSampler;
use crate::events::{EventKind, EventLog};
use crate::gpu::GpuMonitor;
use crate::memory::{read_process_memory, read_system_memory};
use crate::task::PeriodicTask;

/// State shared with the periodic sampling tasks.
///
/// Each field sits behind its own lock: metrics are sampled under their
/// component's lock, then written under the log's lock, always in that
/// order, so the tasks can never deadlock against a caller.
struct Shared {
    log: Mutex<Option<EventLog>>,
    sections: Mutex<HashMap<String, u64>>,
    cpu: Mutex<CpuSampler>,
    gpu: Mutex<Option<Arc<dyn GpuMonitor>>>,
    ts_unit: Mutex<TimestampUnit>,
}

impl Shared {
    fn timestamp(&self) -> u64 {
        timestamp_ms(*self.ts_unit.lock())
    }

    fn write(&self, kind: EventKind, fields: &[String]) {
        let timestamp = self.timestamp();
        if let Some(log) = self.log.lock().as_mut() {
            log.write(kind, timestamp, fields);
        }
    }

    fn dump_process_memory(&self) {
        let (rss, shared) = read_process_memory();
        self.write(
            EventKind::ProcessMemory,
            &[rss.to_string(), shared.to_string()],
        );
    }

    fn dump_system_memory(&self) {
        let (total, available, free) = read_system_memory();
        self.write(
            EventKind::SystemMemory,
            &[total.to_string(), available.to_string(), free.to_string()],
        );
    }

    fn dump_cpu_usage(&self) {
        let usages = self.cpu.lock().usage();
        for (index, usage) in usages.iter().enumerate() {
            self.write(EventKind::Cpu, &[index.to_string(), usage.to_string()]);
        }
    }

    fn dump_gpu_usage(&self) {
        let Some(monitor) = self.gpu.lock().clone() else {
            return;
        };
        if !monitor.is_watching() {
            return;
        }
        for (index, usage) in monitor.usage().iter().enumerate() {
            self.write(EventKind::GpuUsage, &[index.to_string(), usage.to_string()]);
        }
    }

    fn dump_gpu_memory(&self) {
        let Some(monitor) = self.gpu.lock().clone() else {
            return;
        };
        if !monitor.is_watching() {
            return;
        }
        let (used, total) = monitor.memory();
        for (index, (used, total)) in used.iter().zip(total.iter()).enumerate() {
            self.write(
                EventKind::GpuMemory,
                &[index.to_string(), used.to_string(), total.to_string()],
            );
        }
    }
}

/// The profiling engine.
pub struct Profiler {
    shared: Arc<Shared>,
    process_memory_task: PeriodicTask,
    system_memory_task: PeriodicTask,
    cpu_task: PeriodicTask,
    gpu_usage_task: PeriodicTask,
    gpu_memory_task: PeriodicTask,
}

impl Profiler {
    pub fn new() -> Self {
        Profiler {
            shared: Arc::new(Shared {
                log: Mutex::new(None),
                sections: Mutex::new(HashMap::new()),
                cpu: Mutex::new(CpuSampler::new()),
                gpu: Mutex::new(None),
                ts_unit: Mutex::new(TimestampUnit::default()),
            }),
            process_memory_task: PeriodicTask::new(),
            system_memory_task: PeriodicTask::new(),
            cpu_task: PeriodicTask::new(),
            gpu_usage_task: PeriodicTask::new(),
            gpu_memory_task: PeriodicTask::new(),
        }
    }

    /// Open the event log at `path`; monitored events are recorded from
    /// here on. `cap_bytes` bounds total on-disk usage across two
    /// rotating files, 0 means a single unbounded file.
    ///
    /// Calling `start` while already started replaces the log.
    pub fn start(&self, path: impl AsRef<Path>, cap_bytes: u64) {
        *self.shared.log.lock() = Some(EventLog::open(path, cap_bytes));
    }

    /// Stop every monitoring task and the GPU monitor, then release the
    /// log. Blocks until everything has quiesced. Safe to call without a
    /// prior `start`, and idempotent.
    pub async fn stop(&mut self) {
        self.process_memory_task.stop().await;
        self.system_memory_task.stop().await;
        self.cpu_task.stop().await;
        self.gpu_usage_task.stop().await;
        self.gpu_memory_task.stop().await;

        let monitor = self.shared.gpu.lock().clone();
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        *self.shared.log.lock() = None;
    }

    /// Change the timestamp unit used for every subsequent record.
    ///
    /// Call this before `start`: switching mid-run produces a timebase
    /// discontinuity in the log.
    pub fn set_timestamp_unit(&self, unit: TimestampUnit) {
        *self.shared.ts_unit.lock() = unit;
    }

    /// Begin a named timed section.
    ///
    /// A second `time_begin` with the same title before the matching
    /// `time_end` silently overwrites the earlier start time.
    pub fn time_begin(&self, title: impl Into<String>) {
        let timestamp = self.shared.timestamp();
        self.shared.sections.lock().insert(title.into(), timestamp);
    }

    /// End a named timed section and record it.
    ///
    /// A matching section produces a `time_exec` record holding its
    /// start timestamp; an unmatched title degrades to a bare
    /// `time_event` marker rather than an error.
    pub fn time_end(&self, title: &str) {
        let begin = self.shared.sections.lock().remove(title);
        match begin {
            Some(start) => self.shared.write(
                EventKind::TimeExec,
                &[start.to_string(), title.to_string()],
            ),
            None => self.shared.write(EventKind::TimeEvent, &[title.to_string()]),
        }
    }

    /// Periodically record the process's resident and shared memory.
    /// Re-issuing while running restarts the schedule with `period_ms`.
    pub async fn start_process_memory_monitoring(&mut self, period_ms: u64) {
        let shared = Arc::clone(&self.shared);
        restart_task(
            &mut self.process_memory_task,
            period_ms,
            Arc::new(move || shared.dump_process_memory()),
        )
        .await;
    }

    /// Periodically record system-wide memory figures.
    pub async fn start_system_memory_monitoring(&mut self, period_ms: u64) {
        let shared = Arc::clone(&self.shared);
        restart_task(
            &mut self.system_memory_task,
            period_ms,
            Arc::new(move || shared.dump_system_memory()),
        )
        .await;
    }

    /// Periodically record per-core CPU usage.
    pub async fn start_cpu_monitoring(&mut self, period_ms: u64) {
        let shared = Arc::clone(&self.shared);
        restart_task(
            &mut self.cpu_task,
            period_ms,
            Arc::new(move || shared.dump_cpu_usage()),
        )
        .await;
    }

    /// Periodically record per-device GPU usage. Requires an injected
    /// monitor; the sampling callback skips records while the monitor is
    /// not watching (helper not producing data yet, or failed).
    pub async fn start_gpu_usage_monitoring(&mut self, period_ms: u64) {
        let Some(monitor) = self.shared.gpu.lock().clone() else {
            error!("cannot monitor GPU usage: no GPU monitor set");
            return;
        };
        monitor.start(period_ms).await;

        let shared = Arc::clone(&self.shared);
        restart_task(
            &mut self.gpu_usage_task,
            period_ms,
            Arc::new(move || shared.dump_gpu_usage()),
        )
        .await;
    }

    /// Periodically record per-device GPU memory. Same contract as
    /// `start_gpu_usage_monitoring`.
    pub async fn start_gpu_memory_monitoring(&mut self, period_ms: u64) {
        let Some(monitor) = self.shared.gpu.lock().clone() else {
            error!("cannot monitor GPU memory: no GPU monitor set");
            return;
        };
        monitor.start(period_ms).await;

        let shared = Arc::clone(&self.shared);
        restart_task(
            &mut self.gpu_memory_task,
            period_ms,
            Arc::new(move || shared.dump_gpu_memory()),
        )
        .await;
    }

    /// Inject the GPU monitor the engine will sample. The engine owns it
    /// from here on; a previously injected monitor is stopped and
    /// released first.
    pub async fn set_gpu_monitor(&mut self, monitor: Box<dyn GpuMonitor>) {
        let previous = self.shared.gpu.lock().replace(Arc::from(monitor));
        if let Some(previous) = previous {
            previous.stop().await;
        }
    }

    /// Stop and release the injected GPU monitor, if any.
    pub async fn remove_gpu_monitor(&mut self) {
        let previous = self.shared.gpu.lock().take();
        if let Some(previous) = previous {
            previous.stop().await;
        }
    }

    /// Instantaneous per-core CPU usage: two samples taken 100 ms apart,
    /// returning the second.
    pub async fn instant_cpu_usage(&self) -> Vec<f32> {
        self.shared.cpu.lock().usage();
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.shared.cpu.lock().usage()
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop a task if it is running, then rewire and start it with the new
/// period and callback.
async fn restart_task(task: &mut PeriodicTask, period_ms: u64, callback: crate::task::TaskCallback) {
    task.stop().await;
    task.set_interval_ms(period_ms);
    task.set_callback(callback);
    task.start();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::testing::StubMonitor;
    use std::fs;
    use std::path::PathBuf;

    fn temp_log(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("perfmon_profiler_{}_{}", std::process::id(), name))
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[tokio::test]
    async fn test_start_stop_without_monitoring_leaves_empty_file() {
        let path = temp_log("empty.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);
        profiler.stop().await;

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let mut profiler = Profiler::new();
        profiler.stop().await;
        profiler.stop().await;
    }

    #[tokio::test]
    async fn test_matched_section_writes_time_exec() {
        let path = temp_log("timeexec.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);

        profiler.time_begin("Workload");
        profiler.time_end("Workload");
        profiler.stop().await;

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        let fields: Vec<&str> = lines[0].split(';').collect();
        assert_eq!(fields[0], "time_exec");
        // end timestamp >= start timestamp
        let end: u64 = fields[1].parse().unwrap();
        let start: u64 = fields[2].parse().unwrap();
        assert!(end >= start);
        assert_eq!(fields[3], "Workload");
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_unmatched_time_end_degrades_to_time_event() {
        let path = temp_log("timeevent.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);

        profiler.time_end("NeverBegun");
        profiler.stop().await;

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("time_event;"));
        assert!(lines[0].ends_with(";NeverBegun"));
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_cpu_monitoring_grows_the_log() {
        let path = temp_log("cpugrow.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);
        profiler.start_cpu_monitoring(20).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let size_early = fs::metadata(&path).unwrap().len();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let size_late = fs::metadata(&path).unwrap().len();
        profiler.stop().await;

        assert!(size_early > 0);
        assert!(size_late > size_early);
        assert!(read_lines(&path).iter().all(|l| l.starts_with("cpu;")));
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_restart_replaces_log() {
        let first = temp_log("first.log");
        let second = temp_log("second.log");
        let mut profiler = Profiler::new();

        profiler.start(&first, 0);
        profiler.time_end("marker");
        profiler.start(&second, 0);
        profiler.time_end("marker");
        profiler.stop().await;

        assert_eq!(read_lines(&first).len(), 1);
        assert_eq!(read_lines(&second).len(), 1);
        fs::remove_file(&first).unwrap();
        fs::remove_file(&second).unwrap();
    }

    #[tokio::test]
    async fn test_gpu_monitoring_records_stub_readings() {
        let path = temp_log("gpustub.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);
        profiler
            .set_gpu_monitor(Box::new(StubMonitor::new(
                vec![55.5, 10.0],
                vec![2048, 1024],
                vec![8192, 8192],
            )))
            .await;
        profiler.start_gpu_usage_monitoring(20).await;
        profiler.start_gpu_memory_monitoring(20).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        profiler.stop().await;

        let lines = read_lines(&path);
        assert!(lines.iter().any(|l| l.starts_with("gpu;") && l.ends_with(";0;55.5")));
        assert!(lines
            .iter()
            .any(|l| l.starts_with("gpu_mem;") && l.ends_with(";1;1024;8192")));
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_gpu_monitoring_without_monitor_is_noop() {
        let path = temp_log("gpunone.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);
        profiler.start_gpu_usage_monitoring(20).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        profiler.stop().await;

        assert!(read_lines(&path).is_empty());
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_non_watching_monitor_writes_nothing() {
        let path = temp_log("gpusleep.log");
        let mut profiler = Profiler::new();
        profiler.start(&path, 0);
        profiler
            .set_gpu_monitor(Box::new(StubMonitor::new(vec![1.0], vec![1], vec![2])))
            .await;
        profiler.start_gpu_usage_monitoring(20).await;

        // Force the monitor out of its watching state mid-run
        let monitor = profiler.shared.gpu.lock().clone().unwrap();
        monitor.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let size_stopped = fs::metadata(&path).unwrap().len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fs::metadata(&path).unwrap().len(), size_stopped);

        profiler.stop().await;
        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_instant_cpu_usage_in_range() {
        let profiler = Profiler::new();
        for usage in profiler.instant_cpu_usage().await {
            assert!((0.0..=100.0).contains(&usage));
        }
    }

    #[tokio::test]
    async fn test_capped_profiling_respects_total_size() {
        let cap = 512u64;
        let path = temp_log("capped.log");
        let file0 = temp_log("capped_0.log");
        let file1 = temp_log("capped_1.log");

        let mut profiler = Profiler::new();
        profiler.start(&path, cap);
        profiler.start_cpu_monitoring(10).await;
        profiler.start_system_memory_monitoring(10).await;
        profiler.start_process_memory_monitoring(10).await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        profiler.stop().await;

        assert!(file0.exists());
        assert!(file1.exists());
        let total = fs::metadata(&file0).unwrap().len() + fs::metadata(&file1).unwrap().len();
        assert!(total <= cap);
        fs::remove_file(&file0).unwrap();
        fs::remove_file(&file1).unwrap();
    }
}
