//! Throughput of the output-rate conversion used when the device cannot run
//! at the file's sample rate.

use std::{f32::consts::PI, hint::black_box};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use pickplay::audio::resampler::AudioResampler;

const CHANNELS: usize = 2;

/// One second of an interleaved 1 kHz sine.
fn sine(sample_rate: u32) -> Vec<f32> {
    (0..sample_rate)
        .flat_map(|i| {
            let value = (2.0 * PI * 1000.0 * i as f32 / sample_rate as f32).sin();
            [value; CHANNELS]
        })
        .collect()
}

fn bench_rate_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_block");

    for (source_rate, target_rate) in [(44_100, 48_000), (48_000, 44_100), (96_000, 48_000)] {
        let input = sine(source_rate);
        group.throughput(Throughput::Elements(u64::from(source_rate)));

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{source_rate}->{target_rate}")),
            &input,
            |b, input| {
                let mut resampler =
                    AudioResampler::new(source_rate, target_rate, CHANNELS).unwrap();
                b.iter(|| {
                    black_box(
                        resampler
                            .resample_block(black_box(input))
                            .map(<[f32]>::len)
                            .unwrap(),
                    )
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_rate_conversions);
criterion_main!(benches);
