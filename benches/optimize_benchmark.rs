//! Benchmarks for tinyimg optimization.
//!
//! Presets against each other, plus the lossy path and the `image` crate's
//! own PNG encoder as a baseline.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::ImageEncoder;

use tinyimg::{png, ColorType, Driver, ImageDocument, LossyOptions, Options};

/// Generate a test image with gradient pattern.
fn generate_test_image(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width) as u8;
            let g = ((y * 255) / height) as u8;
            let b = (((x + y) * 127) / (width + height)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

/// Generate a test image with random-ish pattern (harder to compress).
fn generate_noisy_image(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    let mut seed = 12345u32;
    for _ in 0..(width * height * 3) {
        seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        pixels.push((seed >> 16) as u8);
    }
    pixels
}

fn input_png(pixels: &[u8], size: u32) -> Vec<u8> {
    let doc = ImageDocument::from_pixels(size, size, 8, ColorType::Rgb, pixels).unwrap();
    png::encode(&doc, 1).unwrap()
}

fn preset_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Optimize presets");
    group.sample_size(10);

    for size in [64u32, 256] {
        let input = input_png(&generate_test_image(size, size), size);
        group.throughput(Throughput::Bytes(input.len() as u64));
        for level in [0u8, 2, 4, 6] {
            group.bench_with_input(
                BenchmarkId::new(format!("level{level}"), format!("{size}x{size}")),
                &input,
                |b, input| {
                    b.iter(|| {
                        Driver::new(Options::from_preset(level))
                            .run(black_box(input))
                            .unwrap()
                    });
                },
            );
        }

        let pixels = generate_test_image(size, size);
        group.bench_with_input(
            BenchmarkId::new("image_crate", format!("{size}x{size}")),
            &pixels,
            |b, pixels| {
                b.iter(|| {
                    let mut output = Vec::new();
                    let encoder = image::codecs::png::PngEncoder::new(&mut output);
                    encoder
                        .write_image(black_box(pixels), size, size, image::ExtendedColorType::Rgb8)
                        .unwrap();
                    output
                });
            },
        );
    }
    group.finish();
}

fn lossy_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Lossy");
    group.sample_size(10);

    let size = 128u32;
    let input = input_png(&generate_noisy_image(size, size), size);
    for dithering in [false, true] {
        let options = Options {
            lossy: Some(LossyOptions {
                dithering,
                ..LossyOptions::default()
            }),
            ..Options::from_preset(2)
        };
        group.bench_with_input(
            BenchmarkId::new(if dithering { "dither" } else { "plain" }, format!("{size}x{size}")),
            &input,
            |b, input| {
                b.iter(|| Driver::new(options.clone()).run(black_box(input)).unwrap());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, preset_benchmark, lossy_benchmark);
criterion_main!(benches);
