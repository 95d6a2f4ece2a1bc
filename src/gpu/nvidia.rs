//! Nvidia backend driving the `nvidia-smi` helper process
//!
//! The device count is probed once at construction with a one-shot
//! query. `start` launches a long-lived `nvidia-smi -lms=<period>` child
//! emitting one CSV line per device at the requested period, plus a
//! reader task that consumes its stdout through the framing in
//! `stream`. A dead or garbled helper tears the watch down; `stop` also
//! kills the child so a blocked read returns immediately instead of
//! hanging on a stalled pipe.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::stream::{parse_gpu_line, LineBuffer};
use super::GpuMonitor;
use crate::error::ProfileError;

const HELPER: &str = "nvidia-smi";

/// Latest per-device readings, shared between the reader task and
/// sampling callers.
#[derive(Default)]
struct GpuState {
    usage: Vec<f32>,
    used_mem_kib: Vec<u64>,
    total_mem_kib: Vec<u64>,
}

impl GpuState {
    fn with_devices(device_count: usize) -> Self {
        GpuState {
            usage: vec![0.0; device_count],
            used_mem_kib: vec![0; device_count],
            total_mem_kib: vec![0; device_count],
        }
    }
}

/// GPU monitor backed by the `nvidia-smi` command-line helper.
pub struct NvidiaMonitor {
    device_count: usize,
    watching: Arc<AtomicBool>,
    state: Arc<Mutex<GpuState>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl NvidiaMonitor {
    /// Probe the device count and build an idle monitor.
    ///
    /// On a machine without a usable helper the probe fails, the monitor
    /// reports zero devices and every operation is a no-op.
    pub fn new() -> Self {
        let device_count = probe_device_count().unwrap_or(0);
        NvidiaMonitor {
            device_count,
            watching: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(GpuState::with_devices(device_count))),
            shutdown: Mutex::new(None),
            reader: Mutex::new(None),
        }
    }

    pub fn device_count(&self) -> usize {
        self.device_count
    }
}

impl Default for NvidiaMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GpuMonitor for NvidiaMonitor {
    async fn start(&self, period_ms: u64) {
        if self.device_count == 0 || self.watching.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut child = match spawn_helper(period_ms) {
            Ok(child) => child,
            Err(e) => {
                error!("failed to start {HELPER}: {e}");
                self.watching.store(false, Ordering::SeqCst);
                return;
            }
        };
        let Some(stdout) = child.stdout.take() else {
            error!("no stdout pipe from {HELPER}");
            self.watching.store(false, Ordering::SeqCst);
            return;
        };

        let (tx, rx) = watch::channel(false);
        let watching = Arc::clone(&self.watching);
        let state = Arc::clone(&self.state);
        let device_count = self.device_count;

        let handle = tokio::spawn(async move {
            read_helper_stream(stdout, rx, watching, state, device_count).await;
            let _ = child.kill().await;
        });

        *self.shutdown.lock() = Some(tx);
        *self.reader.lock() = Some(handle);
    }

    async fn stop(&self) {
        if let Some(tx) = self.shutdown.lock().take() {
            let _ = tx.send(true);
        }
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            let _ = reader.await;
        }
        self.watching.store(false, Ordering::SeqCst);
    }

    fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    fn usage(&self) -> Vec<f32> {
        self.state.lock().usage.clone()
    }

    fn memory(&self) -> (Vec<u64>, Vec<u64>) {
        let state = self.state.lock();
        (state.used_mem_kib.clone(), state.total_mem_kib.clone())
    }
}

/// Consume the helper's output until it ends, fails, or a shutdown is
/// signalled, then leave the watching flag cleared.
///
/// Generic over the byte source so the loop can be exercised without a
/// real helper process.
async fn read_helper_stream<R>(
    mut stdout: R,
    mut shutdown: watch::Receiver<bool>,
    watching: Arc<AtomicBool>,
    state: Arc<Mutex<GpuState>>,
    device_count: usize,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 4096];
    while watching.load(Ordering::SeqCst) {
        tokio::select! {
            _ = shutdown.changed() => break,
            read = stdout.read(&mut chunk) => match read {
                Ok(0) => {
                    error!("{HELPER} closed its output");
                    break;
                }
                Ok(n) => {
                    if let Err(e) = consume_chunk(&chunk[..n], &mut buffer, &state, device_count) {
                        error!("{HELPER} stream error: {e}");
                        break;
                    }
                }
                Err(e) => {
                    error!("failed to read {HELPER} output: {e}");
                    break;
                }
            },
        }
    }
    watching.store(false, Ordering::SeqCst);
}

/// One-shot device-count query; `None` on any failure (missing binary,
/// non-zero exit, unparsable output).
fn probe_device_count() -> Option<usize> {
    let output = std::process::Command::new(HELPER)
        .arg("--query-gpu=count")
        .arg("--format=csv,noheader")
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Launch the continuous-streaming helper with a piped stdout.
fn spawn_helper(period_ms: u64) -> Result<Child, ProfileError> {
    let child = Command::new(HELPER)
        .arg(format!("-lms={period_ms}"))
        .arg("--query-gpu=index,utilization.gpu,memory.used,memory.total")
        .arg("--format=csv,noheader,nounits")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;
    Ok(child)
}

/// Apply one chunk of helper output to the shared state.
///
/// Framing or parse failures are hard errors that end the watch. A
/// record for a device outside `[0, device_count)` is logged and
/// dropped: one corrupt record must not cost the whole watcher.
fn consume_chunk(
    chunk: &[u8],
    buffer: &mut LineBuffer,
    state: &Mutex<GpuState>,
    device_count: usize,
) -> Result<(), ProfileError> {
    for line in buffer.push(chunk) {
        let parsed = parse_gpu_line(&line)?;
        if parsed.device_index >= device_count {
            warn!(
                "dropping record for unknown GPU device {}",
                parsed.device_index
            );
            continue;
        }
        let mut state = state.lock();
        state.usage[parsed.device_index] = parsed.usage_percent;
        state.used_mem_kib[parsed.device_index] = parsed.used_mem_kib;
        state.total_mem_kib[parsed.device_index] = parsed.total_mem_kib;
    }
    Ok(())
}
