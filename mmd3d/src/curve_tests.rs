use crate::model::{channel, BoneCurve, Keyframe};
use glam::{Quat, Vec2, Vec3};
use std::collections::HashMap;

/// Control points at 1/3 and 2/3 of the diagonal make the quantized Bezier
/// degenerate to `y = 127 t`, i.e. plain linear interpolation.
fn linear_controls() -> [Vec2; 2] {
    [Vec2::splat(127.0 / 3.0), Vec2::splat(2.0 * 127.0 / 3.0)]
}

fn key(frame: u32, rotation: Option<Quat>, translation: Option<Vec3>) -> Keyframe {
    let mut key = Keyframe::new(frame);
    for slot in &mut key.channels {
        slot.control = linear_controls();
    }
    if let Some(t) = translation {
        key.channels[channel::TX].value = t.x;
        key.channels[channel::TY].value = t.y;
        key.channels[channel::TZ].value = t.z;
    }
    if let Some(q) = rotation {
        key.channels[channel::QX].value = q.x;
        key.channels[channel::QY].value = q.y;
        key.channels[channel::QZ].value = q.z;
        key.channels[channel::QW].value = q.w;
    }
    key
}

fn curve(keys: Vec<Keyframe>) -> BoneCurve {
    BoneCurve {
        bone: "arm".to_string(),
        keys,
    }
}

fn assert_approx(actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "expected {expected}, got {actual} (diff {diff})"
    );
}

fn assert_quat_approx(actual: Quat, expected: Quat) {
    // q and -q are the same rotation.
    let dot = actual.dot(expected).abs();
    assert!(dot > 1.0 - 1.0e-4, "expected {expected}, got {actual}");
}

#[test]
fn empty_curve_reports_nothing() {
    assert_eq!(curve(Vec::new()).evaluate(0), (None, None));
}

#[test]
fn exact_hit_returns_raw_values() {
    let curve = curve(vec![
        key(0, Some(Quat::IDENTITY), Some(Vec3::new(1.0, 0.0, 0.0))),
        key(
            10,
            Some(Quat::from_rotation_y(1.0)),
            Some(Vec3::new(2.0, 3.0, 4.0)),
        ),
        key(20, Some(Quat::IDENTITY), Some(Vec3::new(5.0, 0.0, 0.0))),
    ]);

    let (rotation, translation) = curve.evaluate(10);
    assert_eq!(translation.unwrap(), Vec3::new(2.0, 3.0, 4.0));
    assert_quat_approx(rotation.unwrap(), Quat::from_rotation_y(1.0));
}

#[test]
fn exact_hit_on_last_keyframe_returns_raw_values() {
    let curve = curve(vec![
        key(0, None, Some(Vec3::new(1.0, 0.0, 0.0))),
        key(20, None, Some(Vec3::new(9.0, 0.0, 0.0))),
    ]);

    let (rotation, translation) = curve.evaluate(20);
    assert!(rotation.is_none());
    assert_eq!(translation.unwrap(), Vec3::new(9.0, 0.0, 0.0));
}

#[test]
fn past_last_keyframe_reports_nothing() {
    let curve = curve(vec![key(10, Some(Quat::IDENTITY), None)]);
    assert_eq!(curve.evaluate(11), (None, None));
    assert_eq!(curve.evaluate(1000), (None, None));
}

#[test]
fn before_first_keyframe_clamps_to_first() {
    let curve = curve(vec![
        key(5, None, Some(Vec3::new(7.0, 0.0, 0.0))),
        key(10, None, Some(Vec3::new(9.0, 0.0, 0.0))),
    ]);

    let (rotation, translation) = curve.evaluate(2);
    assert!(rotation.is_none());
    assert_eq!(translation.unwrap(), Vec3::new(7.0, 0.0, 0.0));
}

#[test]
fn linear_controls_interpolate_linearly() {
    let curve = curve(vec![
        key(0, None, Some(Vec3::new(1.0, 10.0, -2.0))),
        key(10, None, Some(Vec3::new(3.0, 20.0, -6.0))),
    ]);

    let (_, translation) = curve.evaluate(5);
    let translation = translation.unwrap();
    assert_approx(translation.x, 2.0);
    assert_approx(translation.y, 15.0);
    assert_approx(translation.z, -4.0);

    let (_, translation) = curve.evaluate(1);
    assert_approx(translation.unwrap().x, 1.2);
}

#[test]
fn slow_start_controls_bias_toward_left_value() {
    // Both control points pinned at (127, 0) leave only the cubic term:
    // y(t) = 127 t^3, so the blend fraction at t = 0.5 is exactly 0.125.
    let mut left = key(0, None, Some(Vec3::new(8.0, 0.0, 0.0)));
    left.channels[channel::TX].control = [Vec2::new(127.0, 0.0), Vec2::new(127.0, 0.0)];
    let right = key(10, None, Some(Vec3::new(16.0, 0.0, 0.0)));

    let (_, translation) = curve(vec![left, right]).evaluate(5);
    assert_approx(translation.unwrap().x, 9.0);
}

#[test]
fn rotation_slerps_with_its_own_curve() {
    let curve = curve(vec![
        key(0, Some(Quat::IDENTITY), None),
        key(10, Some(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)), None),
    ]);

    let (rotation, translation) = curve.evaluate(5);
    assert!(translation.is_none());
    assert_quat_approx(
        rotation.unwrap(),
        Quat::from_rotation_y(std::f32::consts::FRAC_PI_4),
    );
}

#[test]
fn zero_channels_mean_absent() {
    // Translation all zero and rotation identity on the left key: only the
    // rotation group has a nonzero component (w = 1).
    let curve = curve(vec![
        key(0, Some(Quat::IDENTITY), None),
        key(10, Some(Quat::from_rotation_x(0.5)), None),
    ]);

    let (rotation, translation) = curve.evaluate(3);
    assert!(rotation.is_some());
    assert!(translation.is_none());
}

#[test]
fn motion_sample_without_curve_reports_nothing() {
    let motion = crate::Motion {
        label: String::new(),
        model_name: String::new(),
        curves: vec![curve(vec![key(0, None, Some(Vec3::X))])],
        curve_index: HashMap::from([("arm".to_string(), 0)]),
        morph_frames: Default::default(),
        last_frame: 0,
    };

    assert_eq!(motion.sample("leg", 0), (None, None));
    let (_, translation) = motion.sample("arm", 0);
    assert_eq!(translation.unwrap(), Vec3::X);
}
