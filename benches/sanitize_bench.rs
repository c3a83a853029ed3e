//! Benchmarks for overlay text sanitising and filter construction.
//!
//! Run with: `cargo bench --bench sanitize_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use textburn::overlay::text::{escape, wrap};
use textburn::{sanitize, DrawtextBuilder, LayoutPreset};

/// Overlay text of roughly `target_chars`, mixing plain words with every
/// character the escaper has to handle.
fn generate_text(target_chars: usize) -> String {
    let words = [
        "Hello:", "World's", "[best]", "day", "C:\\path", "ünïcödé", "%{pts}", "ever\n",
    ];
    let mut text = String::with_capacity(target_chars + 16);
    let mut idx = 0;

    while text.chars().count() < target_chars {
        text.push_str(words[idx % words.len()]);
        text.push(' ');
        idx += 1;
    }

    text
}

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize");

    for &(chars, label) in &[(32, "32c"), (300, "300c"), (3_000, "3000c")] {
        let text = generate_text(chars);

        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("wrap", label), &text, |b, text| {
            b.iter(|| black_box(wrap(black_box(text), 32)));
        });
        group.bench_with_input(BenchmarkId::new("escape", label), &text, |b, text| {
            b.iter(|| black_box(escape(black_box(text))));
        });
        group.bench_with_input(BenchmarkId::new("sanitize", label), &text, |b, text| {
            b.iter(|| black_box(sanitize(black_box(text), 32)));
        });
    }

    group.finish();
}

fn bench_filter_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_build");

    let font = tempfile::NamedTempFile::new().unwrap();
    let builder = DrawtextBuilder::new(font.path()).unwrap();
    let text = sanitize(&generate_text(300), 32);

    for preset in LayoutPreset::ALL {
        group.bench_function(preset.name(), |b| {
            b.iter(|| black_box(builder.build(black_box(&text), preset)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sanitize, bench_filter_build);
criterion_main!(benches);
