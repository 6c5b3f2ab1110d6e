use std::hint::black_box;

use astrosight::{CfaPattern, Image, ImageDimensions, demosaic_bilinear};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use strum::IntoEnumIterator;

fn make_mosaic(width: usize, height: usize) -> Image {
    let dims = ImageDimensions::new(width, height, 1);
    let pixels = (0..width * height)
        .map(|j| {
            let hash = (j as u32).wrapping_mul(2654435761) as f32;
            hash / u32::MAX as f32
        })
        .collect();
    Image::from_pixels(dims, pixels).expect("buffer matches dimensions")
}

fn demosaic_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("demosaic_bilinear");
    group.sample_size(20);

    for (width, height) in [(640, 480), (2048, 1536)] {
        let mosaic = make_mosaic(width, height);
        group.bench_with_input(
            BenchmarkId::new("rggb", format!("{width}x{height}")),
            &mosaic,
            |b, mosaic| b.iter(|| demosaic_bilinear(black_box(mosaic), CfaPattern::Rggb).unwrap()),
        );
    }

    let mosaic = make_mosaic(1024, 768);
    for pattern in CfaPattern::iter() {
        group.bench_with_input(BenchmarkId::new("pattern", pattern), &pattern, |b, &pattern| {
            b.iter(|| demosaic_bilinear(black_box(&mosaic), pattern).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, demosaic_benchmarks);
criterion_main!(benches);
