// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `hpt bench` command - Loop packets through an echo stack.
//!
//! consumer write → inbound ring → pump → echo stack → outbound ring →
//! consumer read. The writer runs on a blocking thread, the reader waits on
//! the doorbell asynchronously.

use std::time::{Duration, Instant};

use hpt_core::shm::SLOT_USABLE_SIZE;
use hpt_core::{Device, Hpt, HptResult, LoopbackMode, LoopbackStack, RingError, StatsSnapshot};
use serde::Serialize;

use super::load_config;

const BENCH_ENDPOINT: &str = "hpt-bench0";

/// Give up if the loop makes no progress for this long.
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Re-check the counters at least this often.
const POLL_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
struct BenchReport {
    endpoint: String,
    capacity: usize,
    packet_size: usize,
    packets_sent: usize,
    packets_received: u64,
    elapsed_ms: f64,
    packets_per_sec: f64,
    megabytes_per_sec: f64,
    stats: StatsSnapshot,
}

/// Wait for `readable` or until `tick` passes. A timeout is not an error;
/// a failed wait is.
async fn wait_or_tick<F>(readable: F, tick: Duration) -> HptResult<()>
where
    F: std::future::Future<Output = HptResult<()>>,
{
    match tokio::time::timeout(tick, readable).await {
        Ok(result) => result,
        Err(_) => Ok(()),
    }
}

pub async fn execute(
    config_path: Option<&str>,
    capacity: usize,
    packets: usize,
    size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if size == 0 || size > SLOT_USABLE_SIZE {
        return Err(format!("packet size must be between 1 and {}", SLOT_USABLE_SIZE).into());
    }

    let config = load_config(config_path)?;
    let stack = LoopbackStack::new_shared(LoopbackMode::Echo);
    let device = Device::new(config.device.clone(), stack);

    let hpt = Hpt::alloc(&device, BENCH_ENDPOINT, capacity)?;
    let name = hpt.name().clone();
    let (mut reader, mut writer) = hpt.split();

    tracing::info!(
        endpoint = %name,
        capacity,
        packets,
        size,
        "Starting benchmark"
    );

    let start = Instant::now();

    let producer = tokio::task::spawn_blocking(move || {
        // IPv4 version nibble so the pump accepts it
        let mut payload = vec![0xABu8; size];
        payload[0] = 0x45;

        let mut sent = 0;
        while sent < packets {
            match writer.write(&payload) {
                Ok(()) => sent += 1,
                Err(RingError::Full) => std::thread::yield_now(),
                Err(e) => return Err(e),
            }
        }
        Ok(writer)
    });

    let mut received = 0u64;
    let mut last_progress = Instant::now();
    loop {
        // Wake on the doorbell, or periodically to re-check the counters.
        wait_or_tick(reader.readable(), POLL_TICK).await?;

        let drained = reader.drain(|_| {}) as u64;
        if drained > 0 {
            received += drained;
            last_progress = Instant::now();
        }

        let stats = device.endpoint_stats(&name)?;
        let inbound_done = stats.inbound.packets + stats.inbound.drops.total();
        let outbound_done = stats.outbound.packets + stats.outbound.drops.total();
        if inbound_done == packets as u64
            && outbound_done == stats.inbound.packets
            && reader.pending() == 0
        {
            break;
        }

        if last_progress.elapsed() > STALL_TIMEOUT {
            tracing::warn!(received, "Benchmark stalled");
            break;
        }
    }

    let elapsed = start.elapsed();
    let writer = producer.await??;
    let stats = writer.stats()?;

    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let report = BenchReport {
        endpoint: name.to_string(),
        capacity,
        packet_size: size,
        packets_sent: packets,
        packets_received: received,
        elapsed_ms: secs * 1000.0,
        packets_per_sec: received as f64 / secs,
        megabytes_per_sec: (received as f64 * size as f64) / secs / (1024.0 * 1024.0),
        stats,
    };

    println!(
        "{} packets of {} bytes in {:.2}ms: {:.0} pkt/s, {:.1} MiB/s",
        report.packets_received,
        report.packet_size,
        report.elapsed_ms,
        report.packets_per_sec,
        report.megabytes_per_sec
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
