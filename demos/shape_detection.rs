//! Shape Detection Example
//!
//! Classifies sampled primitives with the standalone shape detector, outside
//! of the perception pipeline.

use std::f32::consts::{PI, TAU};

use rand::prelude::*;
use rand::rngs::StdRng;
use tabletop_algorithms::{ShapeDetectionConfig, ShapeDetector};
use tabletop_core::Point3f;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    println!("=== Shape Detection Example ===\n");

    let config = ShapeDetectionConfig {
        distance_threshold: 0.002,
        ..ShapeDetectionConfig::default()
    };
    config.validate()?;
    let detector = ShapeDetector::new(config);
    let mut rng = StdRng::seed_from_u64(42);

    let samples = [
        ("box", create_box(0.1, 0.06, 0.08, 0.005)),
        ("cylinder", create_cylinder(0.04, 0.12, 0.005)),
        ("sphere", create_sphere(0.05, 1500)),
        ("noise", create_noise(1500, &mut rng)),
    ];

    for (name, points) in &samples {
        let fit = detector.detect(points, &mut rng);
        println!("{} ({} points):", name, points.len());
        println!("   detected:  {:?}", fit.shape);
        println!(
            "   ratios:    box {:.3}, cylinder {:.3}, sphere {:.3}",
            fit.box_ratio, fit.cylinder_ratio, fit.sphere_ratio
        );
    }

    Ok(())
}

/// Open box (no bottom face) as seen standing on a table
fn create_box(x: f32, y: f32, height: f32, step: f32) -> Vec<Point3f> {
    let grid = |length: f32| (0..=(length / step).round() as usize).map(move |i| i as f32 * step);
    let mut points = Vec::new();
    for px in grid(x) {
        for py in grid(y) {
            points.push(Point3f::new(px, py, height));
        }
    }
    for pz in grid(height).filter(|&z| z < height) {
        for px in grid(x) {
            points.push(Point3f::new(px, 0.0, pz));
            points.push(Point3f::new(px, y, pz));
        }
        for py in grid(y) {
            points.push(Point3f::new(0.0, py, pz));
            points.push(Point3f::new(x, py, pz));
        }
    }
    points
}

/// Lateral surface plus top cap
fn create_cylinder(radius: f32, height: f32, step: f32) -> Vec<Point3f> {
    let around = (TAU * radius / step).ceil() as usize;
    let mut points = Vec::new();
    for level in 0..=(height / step).round() as usize {
        let z = level as f32 * step;
        for k in 0..around {
            let angle = TAU * k as f32 / around as f32;
            points.push(Point3f::new(radius * angle.cos(), radius * angle.sin(), z));
        }
    }
    let rings = (radius / step) as usize;
    for ring in 0..rings {
        let r = ring as f32 * step;
        let count = ((TAU * r / step).ceil() as usize).max(1);
        for k in 0..count {
            let angle = TAU * k as f32 / count as f32;
            points.push(Point3f::new(r * angle.cos(), r * angle.sin(), height));
        }
    }
    points
}

/// Fibonacci sampling of a sphere
fn create_sphere(radius: f32, n: usize) -> Vec<Point3f> {
    (0..n)
        .map(|i| {
            let t = i as f32 + 0.5;
            let polar = (1.0 - 2.0 * t / n as f32).acos();
            let azimuth = PI * (1.0 + 5.0_f32.sqrt()) * t;
            Point3f::new(
                radius * polar.sin() * azimuth.cos(),
                radius * polar.sin() * azimuth.sin(),
                radius * polar.cos(),
            )
        })
        .collect()
}

fn create_noise(n: usize, rng: &mut StdRng) -> Vec<Point3f> {
    (0..n)
        .map(|_| {
            Point3f::new(
                rng.gen_range(-0.05..0.05),
                rng.gen_range(-0.05..0.05),
                rng.gen_range(-0.05..0.05),
            )
        })
        .collect()
}
