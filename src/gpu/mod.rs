//! GPU monitoring
//!
//! No portable GPU metrics interface exists on Linux or Windows, so
//! monitoring is defined as a trait over vendor-specific backends: the
//! bundled `NvidiaMonitor` drives the `nvidia-smi` helper; other vendors
//! (AMD, Broadcom...) plug in by implementing `GpuMonitor`.

mod nvidia;
mod stream;

pub use nvidia::NvidiaMonitor;

use async_trait::async_trait;

/// Vendor-neutral source of per-device GPU metrics.
///
/// `start` begins watching at the given period and `usage`/`memory`
/// return the latest per-device readings; `is_watching` reports whether
/// those readings are currently fresh. Implementations must be safe to
/// share across tasks.
#[async_trait]
pub trait GpuMonitor: Send + Sync {
    /// Begin watching. A second call while already watching is a no-op.
    async fn start(&self, period_ms: u64);

    /// Stop watching and release the underlying resources, waiting until
    /// the backend has fully quiesced.
    async fn stop(&self);

    /// Whether fresh data is currently being received.
    fn is_watching(&self) -> bool;

    /// Latest usage percentage per device.
    fn usage(&self) -> Vec<f32>;

    /// Latest (used, total) memory per device, in KiB.
    fn memory(&self) -> (Vec<u64>, Vec<u64>);
}
