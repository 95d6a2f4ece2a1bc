//! Rotating event log
//!
//! Typed, timestamped records serialized as one `;`-separated line each
//! and flushed on every write. With a byte cap, output round-robins
//! across two files (`<base>_0.<ext>` / `<base>_1.<ext>`) so that total
//! on-disk size never exceeds the cap; without a cap, a single file at
//! the given path grows unbounded.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::error;

/// Number of files a capped log rotates across.
const ROTATING_FILES: usize = 2;

/// Kind tag written as the first column of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TimeExec,
    TimeEvent,
    ProcessMemory,
    SystemMemory,
    Cpu,
    GpuUsage,
    GpuMemory,
}

impl EventKind {
    pub fn tag(self) -> &'static str {
        match self {
            EventKind::TimeExec => "time_exec",
            EventKind::TimeEvent => "time_event",
            EventKind::ProcessMemory => "proc_mem",
            EventKind::SystemMemory => "sys_mem",
            EventKind::Cpu => "cpu",
            EventKind::GpuUsage => "gpu",
            EventKind::GpuMemory => "gpu_mem",
        }
    }
}

/// Append-only event writer with optional two-file rotation.
///
/// Serialization across writers is the caller's business: the profiler
/// keeps the log behind a single mutex, which is what guarantees whole,
/// non-interleaved lines.
pub struct EventLog {
    file: Option<File>,
    paths: Vec<PathBuf>,
    current_idx: usize,
    current_size: u64,
    cap_bytes: u64,
}

impl EventLog {
    /// Open the log. `cap_bytes == 0` creates a single unbounded file at
    /// `path`; otherwise two rotating files are derived from `path` and
    /// each is limited to half the cap.
    ///
    /// An unwritable path is logged and leaves the log in a discard
    /// state: subsequent writes go nowhere and callers are never failed.
    pub fn open(path: impl AsRef<Path>, cap_bytes: u64) -> Self {
        let paths = if cap_bytes > 0 {
            rotating_paths(path.as_ref())
        } else {
            vec![path.as_ref().to_path_buf()]
        };
        let file = create_file(&paths[0]);
        EventLog {
            file,
            paths,
            current_idx: 0,
            current_size: 0,
            cap_bytes,
        }
    }

    /// Append one record and flush it.
    pub fn write(&mut self, kind: EventKind, timestamp: u64, fields: &[String]) {
        if self.file.is_none() {
            return;
        }

        let mut line = format!("{};{}", kind.tag(), timestamp);
        for field in fields {
            line.push(';');
            line.push_str(field);
        }
        line.push('\n');

        // Total size of the rotating files must never exceed the cap
        if self.cap_bytes > 0
            && self.current_size + line.len() as u64 > self.cap_bytes / ROTATING_FILES as u64
        {
            self.rotate();
        }

        if let Some(file) = self.file.as_mut() {
            match file.write_all(line.as_bytes()).and_then(|_| file.flush()) {
                Ok(()) => self.current_size += line.len() as u64,
                Err(e) => {
                    error!(
                        "failed to write event log {}: {}",
                        self.paths[self.current_idx].display(),
                        e
                    );
                    self.file = None;
                }
            }
        }
    }

    /// Truncate-open the other file and make it current.
    fn rotate(&mut self) {
        self.current_size = 0;
        self.current_idx = (self.current_idx + 1) % self.paths.len();
        self.file = create_file(&self.paths[self.current_idx]);
    }
}

fn create_file(path: &Path) -> Option<File> {
    match File::create(path) {
        Ok(file) => Some(file),
        Err(e) => {
            error!("failed to open event log {}: {}", path.display(), e);
            None
        }
    }
}

/// `trace.log` -> `trace_0.log` / `trace_1.log`; a path without an
/// extension gets a plain `_0` / `_1` suffix.
fn rotating_paths(path: &Path) -> Vec<PathBuf> {
    let full = path.to_string_lossy();
    let (base, extension) = match full.rfind('.') {
        Some(pos) => (&full[..pos], &full[pos..]),
        None => (full.as_ref(), ""),
    };
    (0..ROTATING_FILES)
        .map(|i| PathBuf::from(format!("{base}_{i}{extension}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("perfmon_events_{}_{}", std::process::id(), name))
    }

    fn file_size(path: &Path) -> u64 {
        fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }

    #[test]
    fn test_rotating_paths_with_extension() {
        let paths = rotating_paths(Path::new("/tmp/trace.log"));
        assert_eq!(paths[0], PathBuf::from("/tmp/trace_0.log"));
        assert_eq!(paths[1], PathBuf::from("/tmp/trace_1.log"));
    }

    #[test]
    fn test_rotating_paths_without_extension() {
        let paths = rotating_paths(Path::new("/tmp/trace"));
        assert_eq!(paths[0], PathBuf::from("/tmp/trace_0"));
        assert_eq!(paths[1], PathBuf::from("/tmp/trace_1"));
    }

    #[test]
    fn test_uncapped_log_single_file() {
        let path = temp_path("uncapped.log");
        let mut log = EventLog::open(&path, 0);
        for _ in 0..200 {
            log.write(EventKind::Cpu, 1234, &["0".into(), "42.5".into()]);
        }
        drop(log);

        assert!(file_size(&path) > 0);
        // No rotation siblings appear in the uncapped mode
        assert!(!temp_path("uncapped_0.log").exists());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_capped_log_respects_total_cap() {
        let cap = 200u64;
        let path = temp_path("capped.log");
        let file0 = temp_path("capped_0.log");
        let file1 = temp_path("capped_1.log");

        let mut log = EventLog::open(&path, cap);
        // Each record is ~20 bytes; write far more than the cap
        for i in 0..100 {
            log.write(EventKind::Cpu, i, &[i.to_string()]);
        }
        drop(log);

        assert!(file0.exists());
        assert!(file1.exists());
        assert!(file_size(&file0) + file_size(&file1) <= cap);
        fs::remove_file(&file0).unwrap();
        fs::remove_file(&file1).unwrap();
    }

    #[test]
    fn test_record_format() {
        let path = temp_path("format.log");
        let mut log = EventLog::open(&path, 0);
        log.write(
            EventKind::SystemMemory,
            42,
            &["100".into(), "80".into(), "60".into()],
        );
        drop(log);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "sys_mem;42;100;80;60\n");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_unwritable_path_discards_writes() {
        let mut log = EventLog::open("/nonexistent-dir/trace.log", 0);
        // Must not panic, must not create anything
        log.write(EventKind::TimeEvent, 1, &["marker".into()]);
    }
}
