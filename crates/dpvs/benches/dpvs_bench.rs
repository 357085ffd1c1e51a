use criterion::{Criterion, criterion_group, criterion_main};
use dpvs::stats::{ESTATS_NAMES, ExtendedWorkerEntry};
use dpvs::{Address, Command, Endpoint, ServiceEntry, ServiceKey, StatsSnapshot};
use std::hint::black_box;

fn parse_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    group.bench_function("address", |b| {
        b.iter(|| black_box(Address::parse(black_box("192.168.100.254"))))
    });

    group.bench_function("endpoint", |b| {
        b.iter(|| black_box(Endpoint::parse(black_box("10.0.0.1:8080"))))
    });

    group.bench_function("service_key", |b| {
        b.iter(|| black_box(black_box("tcp:10.0.0.1:80").parse::<ServiceKey>()))
    });

    group.finish();
}

fn encode_benchmark(c: &mut Criterion) {
    let key: ServiceKey = "tcp:10.0.0.1:80".parse().unwrap();
    let command = Command::GetDests { service: key, limit: 0 };

    c.bench_function("encode_get_dests", |b| {
        b.iter(|| black_box(command.encode()))
    });
}

fn render_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");

    let service = ServiceEntry {
        protocol: 6,
        addr: Address::parse("10.0.0.1").unwrap(),
        sched_name: "wrr".to_string(),
        conns: 123_456,
        inbytes: 987_654_321,
        ..Default::default()
    };
    group.bench_function("service_line", |b| b.iter(|| black_box(service.to_string())));

    // Every core reports every counter
    let cores: Vec<ExtendedWorkerEntry> = (0..16)
        .map(|core| ExtendedWorkerEntry {
            core,
            counters: ESTATS_NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| (name.to_string(), (i as u64) * 1000 + core as u64))
                .collect(),
        })
        .collect();
    let snapshot = StatsSnapshot::ExtendedWorker(cores);
    group.bench_function("estats_16_cores", |b| {
        b.iter(|| black_box(snapshot.to_string()))
    });

    group.finish();
}

criterion_group!(benches, parse_benchmark, encode_benchmark, render_benchmark);
criterion_main!(benches);
