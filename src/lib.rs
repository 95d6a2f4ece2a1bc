//! Embeddable profiling engine
//!
//! Periodically samples CPU, process/system memory and (optionally) GPU
//! metrics, stamps them and appends them to a size-capped rotating event
//! log; named sections bracket arbitrary code to record durations. The
//! engine is designed to sit inside a host application without ever
//! destabilizing it: no public operation fails, it degrades and logs.
//!
//! Module organization:
//! - `profiler`: engine orchestrator and public entry point
//! - `events`: rotating event log writer
//! - `cpu` / `memory`: OS counter sampling
//! - `gpu`: vendor-pluggable GPU monitoring over a helper process
//! - `task`: periodic task scheduling
//! - `clock`: timestamp unit selection
//! - `config`: engine configuration

pub mod clock;
pub mod config;
pub mod cpu;
pub mod error;
pub mod events;
pub mod gpu;
pub mod memory;
pub mod profiler;
pub mod task;

pub use clock::TimestampUnit;
pub use config::ProfileConfig;
pub use error::ProfileError;
pub use gpu::{GpuMonitor, NvidiaMonitor};
pub use memory::{read_process_memory, read_system_memory};
pub use profiler::Profiler;
