use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use guacbot::client::{ClientEvent, Message};
use guacbot::mask;
use std::hint::black_box;

fn message_parsing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("parsing");
    let raw = "@time=2023-01-01T12:00:00.000Z :sender!user@host PRIVMSG #channel :guacbot: af bob o";
    group.throughput(Throughput::Bytes(raw.len() as u64));

    group.bench_function("parse_privmsg", |b| {
        b.iter(|| black_box(raw).parse::<Message>().unwrap())
    });

    group.bench_function("parse_to_event", |b| {
        b.iter(|| {
            let msg = black_box(raw).parse::<Message>().unwrap();
            ClientEvent::from_message(&msg)
        })
    });

    group.finish();
}

fn hostmask_matching_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("hostmask");
    let patterns: Vec<String> = (0..100)
        .map(|i| format!("*!*@host{}.example.com", i))
        .collect();
    group.throughput(Throughput::Elements(patterns.len() as u64));

    group.bench_function("match_any_miss", |b| {
        b.iter(|| mask::match_any(black_box("alice!a@other.net"), &patterns))
    });

    group.bench_function("match_any_last", |b| {
        b.iter(|| mask::match_any(black_box("alice!a@host99.example.com"), &patterns))
    });

    group.finish();
}

criterion_group!(benches, message_parsing_benchmark, hostmask_matching_benchmark);
criterion_main!(benches);
