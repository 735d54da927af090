//! Benchmarks for the batch orchestration hot path
//!
//! This benchmark measures:
//! - Restrict fan-out over a 32-channel group with all waits zeroed out
//! - A remove sweep over a populated channel
//! - Report rendering and serialization

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use warden::directory::InMemoryDirectory;
use warden::progress::NoopProgressSink;
use warden::registry::{InMemoryStore, Registry};
use warden::resilience::RetryPolicy;
use warden::types::{ChannelId, GroupName, Participant, SubjectId};
use warden::{BatchRunner, OperationRequest, Subject, TargetScope};

const CHANNELS: i64 = 32;
const MEMBERS: i64 = 64;

fn fixture(runtime: &tokio::runtime::Runtime) -> (BatchRunner, Arc<InMemoryDirectory>) {
    runtime.block_on(async {
        let directory = Arc::new(InMemoryDirectory::new());
        let registry = Arc::new(
            Registry::open(Arc::new(InMemoryStore::new()), BTreeSet::new())
                .await
                .unwrap(),
        );
        for id in 1..=CHANNELS {
            let channel = ChannelId(-id);
            directory.add_channel(channel, &format!("Channel {id}"));
            registry
                .add_channel(GroupName::new("bench"), channel)
                .await
                .unwrap();
        }
        directory.add_subject(SubjectId(7), "subject");
        for id in 1..=MEMBERS {
            directory.add_subject(SubjectId(1000 + id), &format!("member{id}"));
        }
        directory.set_members(
            ChannelId(-1),
            (1..=MEMBERS)
                .map(|id| Participant::new(SubjectId(1000 + id)))
                .collect(),
        );

        let runner = BatchRunner::builder()
            .with_directory(directory.clone())
            .with_registry(registry)
            .with_policy(RetryPolicy::new().with_base_delay(Duration::ZERO))
            .with_throttle_interval(Duration::ZERO)
            .with_progress_sink(Arc::new(NoopProgressSink))
            .build()
            .unwrap();
        (runner, directory)
    })
}

fn bench_restrict_fanout(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (runner, directory) = fixture(&runtime);
    let request = OperationRequest::restrict(
        Subject::new(SubjectId(7)).with_handle("subject"),
        TargetScope::group("bench"),
    );

    let mut group = c.benchmark_group("batch_orchestration");
    group.throughput(Throughput::Elements(CHANNELS as u64));
    group.bench_function("restrict_32_channels", |b| {
        b.to_async(&runtime).iter(|| async {
            let report = runner.run(black_box(&request)).await.unwrap();
            directory.clear_applied();
            black_box(report.total())
        })
    });
    group.finish();
}

fn bench_remove_sweep(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (runner, directory) = fixture(&runtime);
    let request = OperationRequest::remove(TargetScope::Channels(vec![ChannelId(-1)]));

    let mut group = c.benchmark_group("batch_orchestration");
    group.throughput(Throughput::Elements(MEMBERS as u64));
    group.bench_function("remove_sweep_64_members", |b| {
        b.to_async(&runtime).iter(|| async {
            let report = runner.run(black_box(&request)).await.unwrap();
            directory.clear_applied();
            black_box(report.total())
        })
    });
    group.finish();
}

fn bench_report_rendering(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let (runner, directory) = fixture(&runtime);
    let request = OperationRequest::restrict(
        Subject::new(SubjectId(7)).with_handle("subject"),
        TargetScope::group("bench"),
    );
    let report = runtime.block_on(runner.run(&request)).unwrap();
    directory.clear_applied();

    let mut group = c.benchmark_group("report_rendering");
    group.bench_function("summary_32_rows", |b| b.iter(|| black_box(report.summary())));
    group.bench_function("json_32_rows", |b| {
        b.iter(|| black_box(report.to_json().unwrap()))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_restrict_fanout,
    bench_remove_sweep,
    bench_report_rendering,
);
criterion_main!(benches);
