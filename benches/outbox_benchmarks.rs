//! Performance benchmarks for the outbox hot paths.
//!
//! The queue is low-volume, so these are regression tripwires rather than
//! throughput targets: payload validation and template rendering sit on
//! every delivery, and a worker pass over the in-memory store bounds the
//! per-item bookkeeping cost.

use std::{collections::HashMap, hint::black_box, time::Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;
use zelo_core::payload::{Channel, MessageIntent, MessagePayload};
use zelo_outbox::{render_template, PassOptions, RetrySchedule, SendOptions};
use zelo_testing::TestEnv;

fn sample_payload() -> MessagePayload {
    MessagePayload {
        channel: Channel::Whatsapp,
        idempotency_key: "bench-key-0001".to_string(),
        internal_message_id: "msg-bench-0001".to_string(),
        created_at: chrono::Utc::now(),
        context: None,
        metadata: None,
        intent: MessageIntent::SendText {
            text: "Olá, sua consulta foi confirmada.".to_string(),
        },
    }
}

/// Benchmarks payload validation and the stored-JSON round trip.
fn bench_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");
    let payload = sample_payload();

    group.bench_function("validate", |b| {
        b.iter(|| black_box(&payload).validate().unwrap());
    });

    let value = payload.to_value().unwrap();
    group.bench_function("from_value", |b| {
        b.iter(|| MessagePayload::from_value(black_box(&value)).unwrap());
    });

    group.finish();
}

/// Benchmarks backoff schedule lookups across the ladder.
fn bench_backoff(c: &mut Criterion) {
    let schedule = RetrySchedule::new();
    c.bench_function("backoff/delay", |b| {
        b.iter(|| {
            for attempt in 1..=8 {
                black_box(schedule.delay(black_box(attempt)));
            }
        });
    });
}

/// Benchmarks template substitution with a varying variable count.
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    for var_count in [1usize, 4, 16] {
        let variables: HashMap<String, String> = (0..var_count)
            .map(|n| (format!("var{n}"), format!("valor {n}")))
            .collect();
        let template: String = (0..var_count)
            .map(|n| format!("campo {n}: {{{{var{n}}}}}. "))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("variables", var_count),
            &(template, variables),
            |b, (template, variables)| {
                b.iter(|| render_template(black_box(template), black_box(variables)).unwrap());
            },
        );
    }

    group.finish();
}

/// Benchmarks a full worker pass over the in-memory wiring: enqueue,
/// lease, claim, bridge stub, settle.
fn bench_worker_pass(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("worker/pass_per_item", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let env = TestEnv::new();
                for n in 0..iters {
                    env.service()
                        .send_text(
                            "+5511999998888",
                            format!("mensagem {n}"),
                            SendOptions::default(),
                        )
                        .await
                        .unwrap();
                    env.bridge.push_success(format!("wamid-{n}"));
                }

                let start = Instant::now();
                let mut remaining = iters;
                while remaining > 0 {
                    let report = env
                        .worker()
                        .process_once(PassOptions {
                            limit: Some(usize::try_from(remaining).unwrap_or(usize::MAX)),
                            max_retries: None,
                        })
                        .await
                        .unwrap();
                    remaining -= u64::try_from(report.sent).unwrap();
                }
                start.elapsed()
            })
        });
    });
}

criterion_group!(benches, bench_payload, bench_backoff, bench_render, bench_worker_pass);
criterion_main!(benches);
