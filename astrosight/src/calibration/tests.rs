use common::CancelToken;

use super::*;
use crate::testing::{constant_frame, constant_image, init_tracing};

fn stack_of(role: FrameRole, values: &[f32]) -> FrameStack {
    let mut stack = FrameStack::new(role);
    for (i, &v) in values.iter().enumerate() {
        stack
            .push(constant_frame(&format!("{role}-{i}"), 6, 4, 1, v))
            .unwrap();
    }
    stack
}

fn assert_all_close(image: &Image, expected: f32) {
    for &v in image.pixels() {
        assert!((v - expected).abs() < 1e-5, "expected {expected}, got {v}");
    }
}

// ── Synthesis ──────────────────────────────────────────────────────

#[test]
fn test_master_flat_from_constant_frames() {
    let stack = stack_of(FrameRole::Flat, &[100.0; 5]);
    let master = synthesize_master(&stack).unwrap();
    assert_eq!(master.role(), FrameRole::Flat);
    assert_eq!(master.frame_count(), 5);
    assert_all_close(master.image(), 100.0);
}

#[test]
fn test_master_is_mean() {
    let stack = stack_of(FrameRole::Dark, &[1.0, 2.0, 6.0]);
    let master = synthesize_master(&stack).unwrap();
    assert_all_close(master.image(), 3.0);
}

#[test]
fn test_master_order_independent() {
    let a = synthesize_master(&stack_of(FrameRole::Bias, &[0.1, 0.7, 0.3, 1e4])).unwrap();
    let b = synthesize_master(&stack_of(FrameRole::Bias, &[1e4, 0.3, 0.7, 0.1])).unwrap();
    assert_eq!(a.image(), b.image());
}

#[test]
fn test_master_does_not_mutate_inputs() {
    let stack = stack_of(FrameRole::Dark, &[1.0, 3.0]);
    let before: Vec<Image> = stack.images().cloned().collect();
    synthesize_master(&stack).unwrap();
    let after: Vec<Image> = stack.images().cloned().collect();
    assert_eq!(before, after);
}

#[test]
fn test_master_rejects_empty_stack() {
    let stack = FrameStack::new(FrameRole::Dark);
    let err = synthesize_master(&stack).unwrap_err();
    assert_eq!(
        err,
        CalibrationError::Validation(ValidationError::Empty {
            role: FrameRole::Dark
        })
    );
}

#[test]
fn test_master_rejects_mismatched_stack() {
    let mut stack = stack_of(FrameRole::Flat, &[1.0, 1.0]);
    stack.push(constant_frame("odd", 7, 4, 1, 1.0)).unwrap();
    let err = synthesize_master(&stack).unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::Validation(ValidationError::Mismatch { index: 2, .. })
    ));
}

#[test]
fn test_master_rejects_light_role() {
    let stack = stack_of(FrameRole::Light, &[1.0]);
    assert_eq!(
        synthesize_master(&stack).unwrap_err(),
        CalibrationError::NotCalibrationRole {
            role: FrameRole::Light
        }
    );
}

#[test]
fn test_master_set_caches_until_stack_changes() {
    let mut set = MasterSet::new();
    let mut stack = stack_of(FrameRole::Dark, &[2.0, 4.0]);

    assert_all_close(set.synthesize(&stack).unwrap().image(), 3.0);
    assert_eq!(set.len(), 1);
    assert_all_close(set.synthesize(&stack).unwrap().image(), 3.0);

    stack.push(constant_frame("late", 6, 4, 1, 9.0)).unwrap();
    let master = set.synthesize(&stack).unwrap();
    assert_eq!(master.frame_count(), 3);
    assert_all_close(master.image(), 5.0);
    assert_eq!(set.len(), 1);
}

// ── Per-pixel calibration ──────────────────────────────────────────

#[test]
fn test_calibration_scenario_dark_and_flat() {
    let dark = constant_image(6, 4, 1, 50.0);
    let flat = constant_image(6, 4, 1, 200.0);
    let masters = CalibrationMasters::new(
        Some(&dark),
        Some(&flat),
        None,
        None,
        FlatDivisorPolicy::default(),
    )
    .unwrap();

    let mut frame = constant_frame("light", 6, 4, 1, 500.0);
    assert_eq!(masters.calibrate(&mut frame).unwrap(), Some(0));
    assert!(frame.is_calibrated());
    assert_all_close(frame.image(), 2.25);
}

#[test]
fn test_calibration_is_idempotent() {
    let dark = constant_image(6, 4, 1, 50.0);
    let flat = constant_image(6, 4, 1, 200.0);
    let masters = CalibrationMasters::new(
        Some(&dark),
        Some(&flat),
        None,
        None,
        FlatDivisorPolicy::default(),
    )
    .unwrap();

    let mut frame = constant_frame("light", 6, 4, 1, 500.0);
    masters.calibrate(&mut frame).unwrap();
    let once = frame.image().clone();
    assert_eq!(masters.calibrate(&mut frame).unwrap(), None);
    assert_eq!(frame.image(), &once);
}

#[test]
fn test_dark_flat_takes_priority_over_bias() {
    let flat = constant_image(6, 4, 1, 200.0);
    let dark_flat = constant_image(6, 4, 1, 20.0);
    let bias = constant_image(6, 4, 1, 10.0);
    let masters = CalibrationMasters::new(
        None,
        Some(&flat),
        Some(&dark_flat),
        Some(&bias),
        FlatDivisorPolicy::default(),
    )
    .unwrap();

    let mut image = constant_image(6, 4, 1, 360.0);
    masters.calibrate_image(&mut image).unwrap();
    assert_all_close(&image, 2.0);
}

#[test]
fn test_bias_used_without_dark_flat() {
    let flat = constant_image(6, 4, 1, 200.0);
    let bias = constant_image(6, 4, 1, 10.0);
    let masters =
        CalibrationMasters::new(None, Some(&flat), None, Some(&bias), FlatDivisorPolicy::default())
            .unwrap();

    let mut image = constant_image(6, 4, 1, 380.0);
    masters.calibrate_image(&mut image).unwrap();
    assert_all_close(&image, 2.0);
}

#[test]
fn test_dark_only_skips_division() {
    let dark = constant_image(6, 4, 1, 5.0);
    let masters =
        CalibrationMasters::new(Some(&dark), None, None, None, FlatDivisorPolicy::default())
            .unwrap();

    let mut image = constant_image(6, 4, 1, 12.0);
    masters.calibrate_image(&mut image).unwrap();
    assert_all_close(&image, 7.0);
}

#[test]
fn test_no_masters_is_noop() {
    let masters =
        CalibrationMasters::new(None, None, None, None, FlatDivisorPolicy::default()).unwrap();
    assert!(masters.is_empty());

    let mut frame = constant_frame("light", 3, 3, 1, 4.0);
    masters.calibrate(&mut frame).unwrap();
    assert!(frame.is_calibrated());
    assert_all_close(frame.image(), 4.0);
}

#[test]
fn test_divisor_policies() {
    let (v, hit) = FlatDivisorPolicy::default().divide(1.0, 0.0);
    assert!(hit);
    assert!((v - 1e6).abs() < 1.0);
    assert_eq!(
        FlatDivisorPolicy::Clamp { min: 0.5 }.divide(1.0, -3.0),
        (2.0, true)
    );
    assert_eq!(FlatDivisorPolicy::Passthrough.divide(7.0, 0.0), (7.0, true));
    assert_eq!(FlatDivisorPolicy::Passthrough.divide(8.0, 2.0), (4.0, false));

    let (v, hit) = FlatDivisorPolicy::Sentinel.divide(7.0, -1.0);
    assert!(v.is_nan());
    assert!(hit);
    assert_eq!(FlatDivisorPolicy::Sentinel.divide(6.0, 3.0), (2.0, false));
}

#[test]
fn test_clamp_minimum_must_be_positive() {
    assert!(FlatDivisorPolicy::default().validate().is_ok());
    assert!(FlatDivisorPolicy::Sentinel.validate().is_ok());

    let flat = constant_image(4, 2, 1, 10.0);
    for min in [0.0, -2.0, f32::NAN, f32::INFINITY] {
        let policy = FlatDivisorPolicy::Clamp { min };
        assert!(policy.validate().is_err(), "{min}");

        let err = CalibrationMasters::new(None, Some(&flat), None, None, policy).unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidFlatClamp { .. }), "{min}");
    }
}

#[test]
fn test_zero_flat_term_counts_flagged_pixels() {
    let flat = constant_image(4, 2, 1, 10.0);
    let bias = constant_image(4, 2, 1, 10.0);
    let masters =
        CalibrationMasters::new(None, Some(&flat), None, Some(&bias), FlatDivisorPolicy::Sentinel)
            .unwrap();

    let mut image = constant_image(4, 2, 1, 3.0);
    assert_eq!(masters.calibrate_image(&mut image).unwrap(), 8);
    assert!(image.pixels().iter().all(|v| v.is_nan()));
}

#[test]
fn test_master_dimension_mismatch() {
    let dark = constant_image(6, 4, 1, 1.0);
    let flat = constant_image(5, 4, 1, 1.0);
    let err = CalibrationMasters::new(
        Some(&dark),
        Some(&flat),
        None,
        None,
        FlatDivisorPolicy::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        CalibrationError::MasterMismatch {
            role: FrameRole::Flat,
            ..
        }
    ));
}

#[test]
fn test_frame_dimension_mismatch_names_frame() {
    let dark = constant_image(6, 4, 1, 1.0);
    let masters =
        CalibrationMasters::new(Some(&dark), None, None, None, FlatDivisorPolicy::default())
            .unwrap();
    let mut frame = constant_frame("wide", 8, 4, 1, 1.0);
    let err = masters.calibrate(&mut frame).unwrap_err();
    assert!(err.to_string().contains("wide"));
    assert!(!frame.is_calibrated());
}

#[test]
fn test_from_set_uses_available_masters() {
    let mut set = MasterSet::new();
    set.synthesize(&stack_of(FrameRole::Dark, &[50.0, 50.0]))
        .unwrap();
    set.synthesize(&stack_of(FrameRole::Flat, &[200.0, 200.0]))
        .unwrap();

    let masters = CalibrationMasters::from_set(&set, FlatDivisorPolicy::default()).unwrap();
    let mut image = constant_image(6, 4, 1, 500.0);
    masters.calibrate_image(&mut image).unwrap();
    assert_all_close(&image, 2.25);
}

// ── Stack calibration ──────────────────────────────────────────────

#[test]
fn test_calibrate_stack_summary() {
    init_tracing();

    let dark = constant_image(6, 4, 1, 1.0);
    let masters =
        CalibrationMasters::new(Some(&dark), None, None, None, FlatDivisorPolicy::default())
            .unwrap();
    let mut lights = stack_of(FrameRole::Light, &[3.0, 4.0, 5.0]);
    let cancel = CancelToken::new();

    let first = calibrate_stack(&masters, &mut lights, &cancel).unwrap();
    assert_eq!(first.calibrated, 3);
    assert_eq!(first.skipped, 0);
    assert_all_close(lights.frames()[2].image(), 4.0);

    let second = calibrate_stack(&masters, &mut lights, &cancel).unwrap();
    assert_eq!(second.calibrated, 0);
    assert_eq!(second.skipped, 3);
    assert_all_close(lights.frames()[2].image(), 4.0);
}

#[test]
fn test_calibrate_stack_cancelled() {
    let dark = constant_image(6, 4, 1, 1.0);
    let masters =
        CalibrationMasters::new(Some(&dark), None, None, None, FlatDivisorPolicy::default())
            .unwrap();
    let mut lights = stack_of(FrameRole::Light, &[3.0, 4.0]);
    let cancel = CancelToken::new();
    cancel.cancel();

    let err = calibrate_stack(&masters, &mut lights, &cancel).unwrap_err();
    assert_eq!(err, CalibrationError::Cancelled(Cancelled));
    assert!(lights.iter().all(|f| !f.is_calibrated()));
    assert_all_close(lights.frames()[0].image(), 3.0);
}
