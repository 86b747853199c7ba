// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Ring and pump microbenchmarks.
//!
//! Measures slot push/peek/pop at various payload sizes, and one full pump
//! cycle over a batch of packets.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hpt_core::pump::Pump;
use hpt_core::shm::{Region, Ring, RingLayout, ShmBlockAllocator, SLOT_USABLE_SIZE};
use hpt_core::stats::EndpointStats;
use hpt_core::{Direction, EndpointName, LoopbackMode, LoopbackStack, RingCapacity, MAX_ITEMS};

/// Payload sizes to benchmark (in bytes).
const PAYLOAD_SIZES: &[usize] = &[64, 256, 1024, SLOT_USABLE_SIZE];

/// Region plus producer and consumer handles on its inbound ring.
fn ring_pair(capacity: usize) -> (Region, Ring, Ring) {
    let layout = RingLayout::new(RingCapacity::new(capacity, MAX_ITEMS).unwrap());
    let region = Region::allocate(Arc::new(ShmBlockAllocator), layout.region_size())
        .expect("Failed to allocate region");

    // SAFETY: the region is returned alongside the rings and outlives them
    let (mut producer, consumer) = unsafe {
        (
            Ring::from_region(&region, &layout, Direction::Inbound).unwrap(),
            Ring::from_region(&region, &layout, Direction::Inbound).unwrap(),
        )
    };
    producer.initialize(&layout, Direction::Inbound);
    (region, producer, consumer)
}

/// Benchmark a push followed by peek + pop.
fn bench_ring_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_roundtrip");
    group.measurement_time(Duration::from_secs(5));

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (_region, mut producer, mut consumer) = ring_pair(1024);
            let mut payload = vec![0xABu8; size];
            payload[0] = 0x45;

            b.iter(|| {
                producer.push(black_box(&payload)).ok();
                black_box(consumer.peek().map(|p| p.len()).ok());
                consumer.pop().ok();
            });
        });
    }

    group.finish();
}

/// Benchmark filling and draining a whole ring.
fn bench_ring_batch(c: &mut Criterion) {
    const CAPACITY: usize = 256;

    let mut group = c.benchmark_group("ring_batch");
    group.throughput(Throughput::Elements(CAPACITY as u64));

    group.bench_function("fill_drain_256", |b| {
        let (_region, mut producer, mut consumer) = ring_pair(CAPACITY);
        let payload = [0x45u8; 128];

        b.iter(|| {
            while producer.push(&payload).is_ok() {}
            while let Ok(p) = consumer.peek() {
                black_box(p.len());
                consumer.pop().ok();
            }
        });
    });

    group.finish();
}

/// Benchmark one pump cycle delivering a full ring to the loopback stack.
fn bench_pump_cycle(c: &mut Criterion) {
    const CAPACITY: usize = 256;

    let mut group = c.benchmark_group("pump_cycle");
    group.throughput(Throughput::Elements(CAPACITY as u64));

    group.bench_function("deliver_256", |b| {
        let (_region, mut producer, consumer) = ring_pair(CAPACITY);
        let stack = LoopbackStack::new_shared(LoopbackMode::Record);
        let mut pump = Pump::new(
            EndpointName::new("bench0").unwrap(),
            consumer,
            stack,
            Arc::new(EndpointStats::new()),
        );
        let payload = [0x45u8; 512];

        b.iter(|| {
            while producer.push(&payload).is_ok() {}
            black_box(pump.run_cycle());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ring_roundtrip, bench_ring_batch, bench_pump_cycle);
criterion_main!(benches);
