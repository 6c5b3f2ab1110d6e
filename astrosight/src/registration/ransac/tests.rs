use glam::DVec2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use super::homography::{centroid, normalize_points};
use super::*;

fn grid_points() -> Vec<DVec2> {
    let mut points = Vec::new();
    for y in 0..6 {
        for x in 0..6 {
            points.push(DVec2::new(20.0 + x as f64 * 37.0, 15.0 + y as f64 * 29.0 + x as f64));
        }
    }
    points
}

fn perspective() -> Homography {
    Homography::from_row_major([1.02, 0.03, 12.5, -0.02, 0.98, -7.25, 1e-5, -2e-5, 1.0])
}

fn assert_homography_close(a: &Homography, b: &Homography, tol: f64) {
    for (x, y) in a.to_row_major().iter().zip(b.to_row_major()) {
        assert!((x - y).abs() < tol, "{:?} vs {:?}", a, b);
    }
}

#[test]
fn test_adaptive_iterations() {
    assert_eq!(adaptive_iterations(1.0, 4, 0.99), 1);
    assert_eq!(adaptive_iterations(0.0, 4, 0.99), usize::MAX);

    // 0.5^4 = 0.0625, ln(0.01) / ln(0.9375) ≈ 71.4
    assert_eq!(adaptive_iterations(0.5, 4, 0.99), 72);
    assert!(adaptive_iterations(0.9, 4, 0.99) < adaptive_iterations(0.5, 4, 0.99));
}

#[test]
fn test_random_sample_unique() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let mut buffer = Vec::new();
    for _ in 0..200 {
        random_sample_into(&mut rng, 10, 4, &mut buffer);
        assert_eq!(buffer.len(), 4);
        let mut sorted = buffer.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 4);
        assert!(buffer.iter().all(|&i| i < 10));
    }
}

#[test]
fn test_normalize_points_mean_distance() {
    let points = grid_points();
    let (normalized, t) = normalize_points(&points);

    assert!(centroid(&normalized).length() < 1e-9);
    let mean = normalized.iter().map(|p| p.length()).sum::<f64>() / normalized.len() as f64;
    assert!((mean - std::f64::consts::SQRT_2).abs() < 1e-9);
    for (p, n) in points.iter().zip(&normalized) {
        assert!((t.apply(*p) - *n).length() < 1e-9);
    }
}

#[test]
fn test_dlt_recovers_exact_homography() {
    let h = perspective();
    let src = grid_points();
    let dst: Vec<DVec2> = src.iter().map(|p| h.apply(*p)).collect();

    let estimated = estimate_homography(&src, &dst).unwrap();
    assert_homography_close(&estimated, &h, 1e-7);
}

#[test]
fn test_dlt_minimal_sample() {
    let src = [
        DVec2::new(0.0, 0.0),
        DVec2::new(100.0, 0.0),
        DVec2::new(100.0, 80.0),
        DVec2::new(0.0, 80.0),
    ];
    let h = Homography::translation(3.0, -4.0);
    let dst: Vec<DVec2> = src.iter().map(|p| h.apply(*p)).collect();

    let estimated = estimate_homography(&src, &dst).unwrap();
    assert_homography_close(&estimated, &h, 1e-9);
}

#[test]
fn test_degenerate_sample_detection() {
    let collinear = [
        DVec2::new(0.0, 0.0),
        DVec2::new(1.0, 1.0),
        DVec2::new(2.0, 2.0),
        DVec2::new(5.0, 0.0),
    ];
    assert!(is_degenerate_sample(&collinear));

    let coincident = [DVec2::new(3.0, 3.0); 4];
    assert!(is_degenerate_sample(&coincident));

    let square = [
        DVec2::new(0.0, 0.0),
        DVec2::new(10.0, 0.0),
        DVec2::new(10.0, 10.0),
        DVec2::new(0.0, 10.0),
    ];
    assert!(!is_degenerate_sample(&square));
}

#[test]
fn test_ransac_rejects_outliers() {
    let h = perspective();
    let src = grid_points();
    let mut dst: Vec<DVec2> = src.iter().map(|p| h.apply(*p)).collect();

    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let outliers = [1usize, 5, 8, 13, 21, 30, 34];
    for &i in &outliers {
        dst[i] += DVec2::new(rng.random_range(30.0..80.0), rng.random_range(-80.0..-30.0));
    }

    let config = RansacConfig::default();
    let result = RansacEstimator::new(&config).estimate(&src, &dst).unwrap();

    assert_eq!(result.inliers.len(), src.len() - outliers.len());
    assert!(outliers.iter().all(|i| !result.inliers.contains(i)));
    assert!(result.rms_error < 1e-6);
    assert_homography_close(&result.homography, &h, 1e-6);
}

#[test]
fn test_ransac_drops_one_pixel_near_misses() {
    let h = Homography::translation(7.0, -4.0);
    let src = grid_points();
    let mut dst: Vec<DVec2> = src.iter().map(|p| h.apply(*p)).collect();

    // Neighbouring-corner matches: inside the 2 px threshold but a pixel off.
    let near_misses = [2usize, 9, 16, 27];
    for (k, &i) in near_misses.iter().enumerate() {
        dst[i] += if k % 2 == 0 {
            DVec2::new(1.0, 0.0)
        } else {
            DVec2::new(-1.0, 1.0)
        };
    }

    let config = RansacConfig::default();
    assert!(config.inlier_threshold > 2.0_f64.sqrt());
    let result = RansacEstimator::new(&config).estimate(&src, &dst).unwrap();

    assert_eq!(result.inliers.len(), src.len() - near_misses.len());
    assert!(near_misses.iter().all(|i| !result.inliers.contains(i)));
    assert!(result.rms_error < 1e-6);
    assert_homography_close(&result.homography, &h, 1e-6);
}

#[test]
fn test_ransac_is_deterministic_for_seed() {
    let h = perspective();
    let src = grid_points();
    let mut dst: Vec<DVec2> = src.iter().map(|p| h.apply(*p)).collect();
    dst[3] += DVec2::new(50.0, 50.0);
    dst[17] -= DVec2::new(40.0, 10.0);

    let config = RansacConfig::default();
    let a = RansacEstimator::new(&config).estimate(&src, &dst).unwrap();
    let b = RansacEstimator::new(&config).estimate(&src, &dst).unwrap();
    assert_eq!(a.homography, b.homography);
    assert_eq!(a.inliers, b.inliers);
    assert_eq!(a.iterations, b.iterations);
}

#[test]
fn test_ransac_too_few_points() {
    let src = [DVec2::ZERO, DVec2::X, DVec2::Y];
    let config = RansacConfig::default();
    let err = RansacEstimator::new(&config).estimate(&src, &src).unwrap_err();
    assert_eq!(
        err,
        RegistrationError::InsufficientCorrespondence {
            found: 3,
            required: 4
        }
    );
}

#[test]
fn test_ransac_collinear_points_fail() {
    let src: Vec<DVec2> = (0..10).map(|i| DVec2::new(i as f64, 2.0 * i as f64)).collect();
    let config = RansacConfig {
        max_iterations: 50,
        ..RansacConfig::default()
    };
    let err = RansacEstimator::new(&config).estimate(&src, &src).unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::RansacFailed {
            reason: RansacFailureReason::DegeneratePointSet,
            iterations: 50,
            best_inlier_count: 0,
        }
    ));
}

#[test]
fn test_ransac_random_correspondences_fail() {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let src: Vec<DVec2> = (0..30)
        .map(|_| DVec2::new(rng.random_range(0.0..500.0), rng.random_range(0.0..500.0)))
        .collect();
    let dst: Vec<DVec2> = (0..30)
        .map(|_| DVec2::new(rng.random_range(0.0..500.0), rng.random_range(0.0..500.0)))
        .collect();

    let config = RansacConfig {
        inlier_threshold: 0.1,
        max_iterations: 500,
        ..RansacConfig::default()
    };
    let err = RansacEstimator::new(&config).estimate(&src, &dst).unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::RansacFailed {
            reason: RansacFailureReason::InsufficientInliers,
            ..
        }
    ));
}
