//! Per-core CPU utilization
//!
//! Utilization is computed from the cumulative counters in /proc/stat as
//! the non-idle share of the time elapsed since the previous reading.
//! The first reading after construction has no baseline (it is computed
//! against zero counters) and is meaningless; callers wanting an
//! instantaneous value take two readings at least 100 ms apart.

use std::fs;

/// Stateful per-core CPU usage calculator.
///
/// The core count is detected once at construction; if it cannot be
/// detected, the sampler reports no cores and `usage` returns empty.
pub struct CpuSampler {
    nb_cpus: usize,
    last_idle: Vec<u64>,
    last_total: Vec<u64>,
}

impl CpuSampler {
    pub fn new() -> Self {
        let nb_cpus = detect_core_count();
        CpuSampler {
            nb_cpus,
            last_idle: vec![0; nb_cpus],
            last_total: vec![0; nb_cpus],
        }
    }

    pub fn core_count(&self) -> usize {
        self.nb_cpus
    }

    /// Usage percentage per core since the previous call, in [0, 100].
    ///
    /// A transient /proc/stat read failure yields zero readings without
    /// touching the stored baselines.
    pub fn usage(&mut self) -> Vec<f32> {
        let mut usages = vec![0.0; self.nb_cpus];
        let Ok(stat) = fs::read_to_string("/proc/stat") else {
            return usages;
        };

        for (index, usage) in usages.iter_mut().enumerate() {
            let prefix = format!("cpu{index} ");
            let Some(line) = stat.lines().find(|l| l.starts_with(&prefix)) else {
                continue;
            };
            let (idle, total) = extract_cpu_times(line);

            let delta_idle = idle.saturating_sub(self.last_idle[index]);
            let delta_total = total.saturating_sub(self.last_total[index]);
            if delta_total > 0 {
                *usage = 100.0 * (1.0 - delta_idle as f32 / delta_total as f32);
            }

            self.last_idle[index] = idle;
            self.last_total[index] = total;
        }
        usages
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Count `processor` entries in /proc/cpuinfo; 0 if unreadable.
fn detect_core_count() -> usize {
    match fs::read_to_string("/proc/cpuinfo") {
        Ok(cpuinfo) => cpuinfo
            .lines()
            .filter(|l| l.starts_with("processor"))
            .count(),
        Err(_) => 0,
    }
}

/// Idle and total jiffies from one `cpuN ...` line of /proc/stat.
///
/// The idle time is the 4th counter; the total is the sum of all
/// counters on the line.
fn extract_cpu_times(line: &str) -> (u64, u64) {
    let mut idle = 0;
    let mut total = 0;
    for (index, token) in line.split_whitespace().skip(1).enumerate() {
        let Ok(time) = token.parse::<u64>() else {
            continue;
        };
        if index == 3 {
            idle = time;
        }
        total += time;
    }
    (idle, total)
}
