//! Benchmarks for pano detection, auto-crop and stitching on synthetic views.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{GrayImage, Luma};
use panorama::core::FeatureMatch;
use panorama::photo::synthetic::render_view;
use panorama::photo::{find_largest_crop, find_panos, stitch, Match, StitchAlgorithmOptions, StitchContext};
use panorama::runtime::ProgressMonitor;
use std::time::Duration;

/// Elliptical validity mask, roughly what a spherical warp leaves behind.
fn warped_mask(width: u32, height: u32) -> GrayImage {
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    GrayImage::from_fn(width, height, |x, y| {
        let dx = (x as f64 - cx) / cx;
        let dy = (y as f64 - cy) / (cy * 1.3);
        Luma([if dx * dx + dy * dy <= 1.0 { 255 } else { 0 }])
    })
}

/// Chain of neighbour matches with a break every `run` images.
fn chained_matches(num_images: usize, run: usize) -> Vec<Match> {
    (1..num_images)
        .map(|j| {
            let count = if j % run == 0 { 5 } else { 120 };
            let matches = (0..count).map(|k| FeatureMatch::new(k, k, 10.0)).collect();
            Match::new(j - 1, j, matches, 40.0)
        })
        .collect()
}

fn benchmark_auto_crop(c: &mut Criterion) {
    let mut group = c.benchmark_group("auto_crop");
    group.sample_size(20);

    for size in [256u32, 1024, 2048] {
        let mask = warped_mask(size, size / 2);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}x{}", size, size / 2)), &mask, |b, m| {
            b.iter(|| find_largest_crop(black_box(m)));
        });
    }

    group.finish();
}

fn benchmark_find_panos(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_panos");

    for n in [100usize, 1000, 10_000] {
        let matches = chained_matches(n, 7);
        group.bench_with_input(BenchmarkId::from_parameter(n), &matches, |b, m| {
            b.iter(|| find_panos(black_box(m), 70, 0.0));
        });
    }

    group.finish();
}

fn benchmark_stitch(c: &mut Criterion) {
    let mut group = c.benchmark_group("stitch");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    let images: Vec<_> = [-0.3, 0.0, 0.3]
        .iter()
        .map(|&yaw| render_view(11, yaw, 0.02, 240, 180, 220.0))
        .collect();
    let options = StitchAlgorithmOptions::default();

    group.bench_function("three_views_240x180", |b| {
        b.iter(|| {
            let progress = ProgressMonitor::new();
            stitch(black_box(&images), None, &options, &StitchContext::new(&progress))
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_auto_crop, benchmark_find_panos, benchmark_stitch);
criterion_main!(benches);
