//! Keyframe interpolation over quantized cubic Bezier segments.

use crate::model::{channel, BoneCurve, Keyframe, Motion};
use glam::{Quat, Vec2, Vec3};

/// Quantized control points run 0..=127; the curve endpoints are pinned at
/// (0, 0) and (127, 127).
const QUANT_MAX: f32 = 127.0;

impl BoneCurve {
    /// Interpolated (rotation, translation) at `frame`.
    ///
    /// Exact keyframe hits return that keyframe's raw values. A channel whose
    /// keyframe values are all zero reports `None` so the solver can fall
    /// back to the bind pose. Frames past the last keyframe report
    /// `(None, None)`; frames before the first clamp to the first keyframe.
    pub fn evaluate(&self, frame: u32) -> (Option<Quat>, Option<Vec3>) {
        if self.keys.is_empty() {
            return (None, None);
        }

        // First keyframe strictly after `frame`.
        let upper = self.keys.partition_point(|key| key.frame <= frame);
        if upper > 0 && self.keys[upper - 1].frame == frame {
            return raw(&self.keys[upper - 1]);
        }
        if upper == self.keys.len() {
            return (None, None);
        }
        if upper == 0 {
            return raw(&self.keys[0]);
        }

        let left = &self.keys[upper - 1];
        let right = &self.keys[upper];

        let t = (frame - left.frame) as f32 / (right.frame - left.frame) as f32;
        let translation = if left.has_translation() {
            Some(interpolate_translation(left, right, t))
        } else {
            None
        };
        let rotation = if left.has_rotation() {
            Some(interpolate_rotation(left, right, t))
        } else {
            None
        };

        (rotation, translation)
    }
}

impl Motion {
    /// Curve lookup by bone name plus evaluation; bones without a curve
    /// report `(None, None)`.
    pub fn sample(&self, bone: &str, frame: u32) -> (Option<Quat>, Option<Vec3>) {
        match self.curve(bone) {
            Some(curve) => curve.evaluate(frame),
            None => (None, None),
        }
    }
}

fn raw(key: &Keyframe) -> (Option<Quat>, Option<Vec3>) {
    let rotation = key.has_rotation().then(|| key.rotation());
    let translation = key.has_translation().then(|| key.translation());
    (rotation, translation)
}

/// `B(t) = 127t^3 + 3t^2(1-t)P3 + 3t(1-t)^2 P2`, evaluated per component.
fn sample_bezier(p2: Vec2, p3: Vec2, t: f32) -> Vec2 {
    let tt = t * t;
    let ttt = tt * t * QUANT_MAX;
    let u = 1.0 - t;
    let a = 3.0 * tt * u;
    let b = 3.0 * t * u * u;
    Vec2::new(ttt + a * p3.x + b * p2.x, ttt + a * p3.y + b * p2.y)
}

fn interpolate_axis(left: &Keyframe, right: &Keyframe, slot: usize, t: f32) -> f32 {
    let segment = &left.channels[slot];
    let curve = sample_bezier(segment.control[0], segment.control[1], t);
    segment.value + (right.channels[slot].value - segment.value) * curve.y / QUANT_MAX
}

fn interpolate_translation(left: &Keyframe, right: &Keyframe, t: f32) -> Vec3 {
    Vec3::new(
        interpolate_axis(left, right, channel::TX, t),
        interpolate_axis(left, right, channel::TY, t),
        interpolate_axis(left, right, channel::TZ, t),
    )
}

/// Rotation uses SLERP with the rotation group's own Bezier-derived blend
/// factor, not the linear `t`.
fn interpolate_rotation(left: &Keyframe, right: &Keyframe, t: f32) -> Quat {
    let segment = &left.channels[channel::QW];
    let curve = sample_bezier(segment.control[0], segment.control[1], t);
    left.rotation().slerp(right.rotation(), curve.y / QUANT_MAX)
}
