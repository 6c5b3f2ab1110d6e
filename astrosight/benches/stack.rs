use std::hint::black_box;

use astrosight::{ClipCenter, CombineMethod, FrameRole, Image, ImageDimensions, SigmaClip, combine_images};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const WIDTH: usize = 1024;
const HEIGHT: usize = 768;
const FRAMES: usize = 16;

/// Dark-like frames: pedestal, hash noise, and a sprinkle of hot pixels.
fn make_frames(count: usize) -> Vec<Image> {
    let dims = ImageDimensions::new(WIDTH, HEIGHT, 1);
    let npix = WIDTH * HEIGHT;

    (0..count)
        .map(|i| {
            let pedestal = 0.1 + (i % 5) as f32 * 0.001;
            let mut pixels: Vec<f32> = (0..npix)
                .map(|j| {
                    let hash = ((j as u32).wrapping_mul(2654435761) ^ (i as u32 * 31)) as f32;
                    pedestal + (hash / u32::MAX as f32 - 0.5) * 0.01
                })
                .collect();
            for h in 0..npix / 1000 {
                let idx = ((h as u32).wrapping_mul(2654435761) ^ (i as u32 * 53)) as usize % npix;
                pixels[idx] = 1.0;
            }
            Image::from_pixels(dims, pixels).expect("buffer matches dimensions")
        })
        .collect()
}

fn stack_benchmarks(c: &mut Criterion) {
    let frames = make_frames(FRAMES);
    let refs: Vec<&Image> = frames.iter().collect();

    let methods = [
        CombineMethod::Mean,
        CombineMethod::Median,
        CombineMethod::SigmaClippedMean(SigmaClip::new(2.5)),
        CombineMethod::SigmaClippedMedian(
            SigmaClip::new(2.5)
                .with_center(ClipCenter::Mean)
                .with_max_iterations(3),
        ),
    ];

    let mut group = c.benchmark_group("combine");
    group.sample_size(10);
    for method in methods {
        group.bench_with_input(BenchmarkId::from_parameter(method), &method, |b, &method| {
            b.iter(|| combine_images(FrameRole::Light, black_box(&refs), method).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, stack_benchmarks);
criterion_main!(benches);
