//! Demonstration binary driving the whole engine
//!
//! Mirrors a typical embedding: dump instant CPU usage, enable every
//! monitor, run a memory-churn workload bracketed by timed sections,
//! then shut down. Configuration comes from the `PERFMON_*` environment
//! variables (see `ProfileConfig::from_env`).

use std::time::Duration;

use anyhow::Result;
use perfmon::{read_system_memory, NvidiaMonitor, ProfileConfig, Profiler};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("perfmon sample v{}", env!("CARGO_PKG_VERSION"));

    let config = ProfileConfig::from_env();
    println!("Recording events to {}\n", config.log_path.display());

    let mut profiler = Profiler::new();
    profiler.set_timestamp_unit(config.timestamp_unit);
    profiler.start(&config.log_path, config.max_cap_bytes);

    // --- DUMP CPU USAGE ---
    let loads: Vec<String> = profiler
        .instant_cpu_usage()
        .await
        .iter()
        .map(|l| format!("{l:.2}%"))
        .collect();
    println!("CPU usage = ({})", loads.join(" "));

    // --- START MONITORING ---
    let monitor = NvidiaMonitor::new();
    if monitor.device_count() > 0 {
        println!("Monitoring {} GPU device(s)", monitor.device_count());
        profiler.set_gpu_monitor(Box::new(monitor)).await;
        profiler.start_gpu_usage_monitoring(config.gpu_period_ms).await;
        profiler.start_gpu_memory_monitoring(config.gpu_period_ms).await;
    } else {
        println!("No GPU detected, skipping GPU monitoring");
    }
    profiler.start_cpu_monitoring(config.cpu_period_ms).await;
    profiler
        .start_system_memory_monitoring(config.memory_period_ms)
        .await;
    profiler
        .start_process_memory_monitoring(config.memory_period_ms)
        .await;

    print_system_memory();

    // --- USE MEMORY ---
    profiler.time_begin("UseMemory");
    let length = 100_000_000usize;
    println!("Allocating {:.1} MB", length as f64 / 1_000_000.0);
    let mut buffer = vec![0u8; length];
    for (i, byte) in buffer.iter_mut().enumerate() {
        *byte = b'a' + (i % 26) as u8;
    }
    profiler.time_end("UseMemory");
    print_system_memory();

    // --- WAIT 5 SECONDS ---
    profiler.time_begin("Sleep1");
    tokio::time::sleep(Duration::from_secs(5)).await;
    profiler.time_end("Sleep1");

    // --- RELEASE MEMORY ---
    profiler.time_begin("FreeMemory");
    drop(buffer);
    profiler.time_end("FreeMemory");
    println!("Releasing memory");
    print_system_memory();

    // --- WAIT 5 SECONDS ---
    profiler.time_begin("Sleep2");
    tokio::time::sleep(Duration::from_secs(5)).await;
    profiler.time_end("Sleep2");

    profiler.stop().await;
    println!("\nDone");
    Ok(())
}

fn print_system_memory() {
    let (total, available, free) = read_system_memory();
    println!(
        "Memory: total = {} MB, available = {} MB, free = {} MB",
        total / 1000,
        available / 1000,
        free / 1000
    );
}
