//! Best-effort memory readers
//!
//! - System: /proc/meminfo (MemTotal / MemAvailable / MemFree)
//! - Process: /proc/self/status (VmRSS; shared = RssFile + RssShmem)
//!
//! Values are reported in kB as listed by the kernel. Any read or parse
//! failure yields zeros; these readers never fail.

use std::fs;

/// System-wide memory in kB: (total, available, free).
pub fn read_system_memory() -> (u64, u64, u64) {
    let Ok(meminfo) = fs::read_to_string("/proc/meminfo") else {
        return (0, 0, 0);
    };
    let mut total = 0;
    let mut available = 0;
    let mut free = 0;
    for line in meminfo.lines() {
        if line.starts_with("MemTotal:") {
            total = parse_kb_field(line);
        } else if line.starts_with("MemAvailable:") {
            available = parse_kb_field(line);
        } else if line.starts_with("MemFree:") {
            free = parse_kb_field(line);
        }
    }
    (total, available, free)
}

/// Current process memory in kB: (resident, shared).
pub fn read_process_memory() -> (u64, u64) {
    let Ok(status) = fs::read_to_string("/proc/self/status") else {
        return (0, 0);
    };
    let mut rss = 0;
    let mut shared = 0;
    for line in status.lines() {
        if line.starts_with("VmRSS:") {
            rss = parse_kb_field(line);
        } else if line.starts_with("RssFile:") || line.starts_with("RssShmem:") {
            shared += parse_kb_field(line);
        }
    }
    (rss, shared)
}

/// Numeric part of a "Label:    123456 kB" line, 0 on failure.
fn parse_kb_field(line: &str) -> u64 {
    line.split_whitespace()
        .nth(1)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}
