//! Pipeline hot-path benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{Luma, Rgb, RgbImage};

use grainscan::{metrics, PipelineConfig, ScatterPipeline};

fn disc_scene(size: u32, count: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
    let spacing = size as i32 / (count as i32 + 1);
    for i in 0..count as i32 {
        let cx = spacing * (i + 1);
        for y in 0..size as i32 {
            for x in 0..size as i32 {
                let dx = x - cx;
                let dy = y - size as i32 / 2;
                if dx * dx + dy * dy <= 15 * 15 {
                    image.put_pixel(x as u32, y as u32, Rgb([10, 10, 10]));
                }
            }
        }
    }
    image
}

fn bench_metrics(c: &mut Criterion) {
    let gray = image::imageops::grayscale(&disc_scene(256, 4));

    c.bench_function("laplacian_variance_256", |b| {
        b.iter(|| metrics::laplacian_variance(black_box(&gray)))
    });

    c.bench_function("tenengrad_256", |b| {
        b.iter(|| metrics::tenengrad(black_box(&gray)))
    });

    c.bench_function("edge_density_256", |b| {
        b.iter(|| metrics::edge_density(black_box(&gray)))
    });
}

fn bench_detection(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let gray = image::imageops::grayscale(&disc_scene(256, 4));

    c.bench_function("detect_objects_256", |b| {
        b.iter(|| {
            grainscan::detect::detect_objects(
                black_box(&gray),
                &config.detection,
                &config.fusion,
            )
        })
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let pipeline = ScatterPipeline::new(PipelineConfig::default());
    let image = disc_scene(256, 4);

    c.bench_function("process_256", |b| {
        b.iter(|| pipeline.process(black_box(&image)))
    });
}

fn bench_restoration(c: &mut Criterion) {
    use grainscan::classify::ObjectBlurProfile;
    use grainscan::restore::Deconvolver;

    let gray = image::GrayImage::from_fn(48, 48, |x, y| {
        let dx = x as f64 - 24.0;
        let dy = y as f64 - 24.0;
        let d = (dx * dx + dy * dy).sqrt();
        Luma([(255.0 / (1.0 + ((d - 15.0) / 3.0).exp())) as u8])
    });

    let profile = ObjectBlurProfile {
        laplacian_variance: 20.0,
        sobel_magnitude: 10.0,
        pixel_variance: 5000.0,
        tenengrad: 1e6,
        is_blurred: true,
    };
    let config = PipelineConfig::default();

    c.bench_function("richardson_lucy_48", |b| {
        b.iter(|| Deconvolver::restore(black_box(&gray), 700.0, &profile, &config.restore))
    });
}

criterion_group!(
    benches,
    bench_metrics,
    bench_detection,
    bench_full_pipeline,
    bench_restoration
);
criterion_main!(benches);
