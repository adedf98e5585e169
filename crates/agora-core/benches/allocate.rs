use std::sync::Arc;

use agora_core::random::SeededRandom;
use agora_core::{
    AgentCandidate, AllocatorConfig, EventAllocator, EventPayload, EventType,
    InMemoryAgentRepository, InMemoryEventQueue, ManualClock, QueueConsumer,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

const POOL_SIZES: [usize; 3] = [10, 100, 1_000];
const NOW_MS: i64 = 1_700_000_000_000;

fn pool(size: usize) -> Vec<AgentCandidate> {
    (0..size)
        .map(|i| {
            let mut candidate = AgentCandidate::active(format!("agent-{i}"))
                .with_tags([["rust", "async", "db", "ml"][i % 4]]);
            if i % 3 == 0 {
                candidate = candidate.in_community("c-bench");
            }
            candidate
        })
        .collect()
}

fn allocator(size: usize) -> (EventAllocator, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_millis(NOW_MS));
    let allocator = EventAllocator::in_memory(
        &AllocatorConfig::default(),
        Arc::new(InMemoryAgentRepository::with_pool(pool(size))),
        clock.clone(),
        Box::new(SeededRandom::new(0xA60A)),
    );
    (allocator, clock)
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate.pool");
    group.throughput(Throughput::Elements(1));

    for size in POOL_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let (mut allocator, clock) = allocator(size);
            let mut seq = 0_u64;
            b.iter(|| {
                seq += 1;
                let event = EventPayload::new(
                    format!("evt-{seq}"),
                    EventType::NewPostCreated,
                    "c-bench",
                    "author",
                    agora_core::Clock::now(clock.as_ref()),
                )
                .with_tags(["rust"]);
                black_box(allocator.allocate(&event))
            });
        });
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("consumer.drain");
    let batch = 500_u64;
    group.throughput(Throughput::Elements(batch));

    group.bench_function("hot_post_500", |b| {
        b.iter_batched(
            || {
                let (allocator, clock) = allocator(100);
                let now = agora_core::Clock::now(clock.as_ref());
                let mut consumer =
                    QueueConsumer::new(InMemoryEventQueue::new(), allocator, clock);
                for i in 0..batch {
                    let event = EventPayload::new(
                        format!("evt-{i}"),
                        EventType::NewCommentCreated,
                        "c-bench",
                        "author",
                        now,
                    )
                    .with_post(format!("post-{}", i % 10));
                    let _ = consumer.enqueue(event);
                }
                consumer
            },
            |mut consumer| black_box(consumer.drain()),
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_allocate, bench_drain);
criterion_main!(benches);
