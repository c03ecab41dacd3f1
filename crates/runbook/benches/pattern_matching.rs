//! Pattern matching benchmarks.
#![allow(missing_docs)]

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use runbook::expect::{Expectation, Matcher, Pattern, RingBuffer};
use runbook::scrape::find_pid;

fn bench_literal_pattern(c: &mut Criterion) {
    let pattern = Pattern::literal("(lldb) ");
    let haystack = "Process 4242 stopped\n* thread #1, name = 'codex', stop reason = signal SIGSTOP\n(lldb) ";

    c.bench_function("literal_pattern_match", |b| {
        b.iter(|| pattern.matches(black_box(haystack)));
    });
}

fn bench_regex_pattern(c: &mut Criterion) {
    let pattern = Pattern::regex(r"Process (\d+) stopped").unwrap();
    let haystack = "Process 4242 stopped\n(lldb) ";

    c.bench_function("regex_pattern_match", |b| {
        b.iter(|| pattern.matches(black_box(haystack)));
    });
}

fn bench_expectation_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("expectation_size");
    let haystack = "shell@device:/data/local/tmp $ ";

    for size in &[2, 5, 10, 20] {
        let mut expectation = Expectation::new();
        for i in 0..*size {
            expectation.add(Pattern::literal(format!("marker{i}")));
        }
        expectation.add(Pattern::literal("$"));

        group.bench_with_input(BenchmarkId::from_parameter(size), &expectation, |b, e| {
            b.iter(|| e.find_match(black_box(haystack)));
        });
    }
    group.finish();
}

fn bench_matcher_streaming(c: &mut Criterion) {
    let chunk = "Compiling codex-core v0.25.0 (/src/codex-rs/core)\n".repeat(20);
    let expectation = Expectation::from(["Error:", "Android build completed successfully!"]);

    c.bench_function("matcher_streaming_build_log", |b| {
        b.iter(|| {
            let mut matcher = Matcher::new(64 * 1024);
            for _ in 0..50 {
                matcher.append(black_box(chunk.as_bytes()));
                black_box(matcher.try_match_any(&expectation));
            }
        });
    });
}

fn bench_ring_buffer_append(c: &mut Criterion) {
    let data = vec![b'x'; 4096];

    c.bench_function("ring_buffer_append_4k", |b| {
        b.iter(|| {
            let mut buffer = RingBuffer::new(1024 * 1024);
            for _ in 0..64 {
                buffer.append(black_box(&data));
            }
            black_box(buffer.len())
        });
    });
}

fn bench_find_pid(c: &mut Criterion) {
    let mut listing = String::from("USER PID PPID VSZ RSS WCHAN ADDR S NAME\n");
    for pid in 1..500 {
        listing.push_str(&format!("root {pid} 1 0 0 0 0 S kworker/{pid}\n"));
    }
    listing.push_str("shell 4242 4100 0 0 0 0 S codex\n");

    c.bench_function("find_pid_500_lines", |b| {
        b.iter(|| find_pid(black_box(&listing), "codex"));
    });
}

criterion_group!(
    benches,
    bench_literal_pattern,
    bench_regex_pattern,
    bench_expectation_sizes,
    bench_matcher_streaming,
    bench_ring_buffer_append,
    bench_find_pid,
);
criterion_main!(benches);
