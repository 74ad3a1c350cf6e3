//! Per-frame pose solving: FK, CCD IK, additive grants, composition, and the
//! physics hand-off.

use crate::model::{Model, Motion, RigidBodyMode};
use crate::runtime::PhysicsEngine;
use glam::{Mat4, Quat, Vec3};
use std::sync::Arc;

/// Transient per-bone pose, indexed identically to the model's bone array.
/// Owned by one [`Pose`] instance and rewritten every frame.
#[derive(Clone, Debug)]
pub struct Posture {
    pub rotation: Quat,
    pub translation: Vec3,
    pub world: Mat4,
}

impl Posture {
    fn identity() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
            world: Mat4::IDENTITY,
        }
    }
}

/// One model instance's solver state. The model and motion data are shared
/// immutably; the posture array is exclusive to this instance.
#[derive(Clone, Debug)]
pub struct Pose {
    pub data: Arc<Model>,
    pub motion: Arc<Motion>,
    pub postures: Vec<Posture>,
    /// Bone index -> curve index in the motion, resolved by name once.
    bound_curves: Vec<Option<usize>>,
}

impl Pose {
    pub fn new(data: Arc<Model>, motion: Arc<Motion>) -> Self {
        let bound_curves = data
            .bones
            .iter()
            .map(|bone| motion.curve_index.get(&bone.name).copied())
            .collect();
        let postures = vec![Posture::identity(); data.bones.len()];

        for body in &data.rigid_bodies {
            if body.bone.is_none() {
                log::warn!("rigid body '{}' has no bone binding, not synchronized", body.name);
            }
        }

        Self {
            data,
            motion,
            postures,
            bound_curves,
        }
    }

    /// Run the four solver passes for `frame`, using each IK descriptor's own
    /// loop count.
    pub fn solve(&mut self, frame: u32) {
        self.solve_passes(frame, None);
    }

    /// Like [`Pose::solve`], but caps every IK chain at `ik_iterations`.
    pub fn solve_with_ik_iterations(&mut self, frame: u32, ik_iterations: u32) {
        self.solve_passes(frame, Some(ik_iterations));
    }

    fn solve_passes(&mut self, frame: u32, ik_iterations: Option<u32>) {
        self.solve_fk(frame);
        self.solve_ik(ik_iterations);
        self.solve_grant();
        self.compose();
    }

    /// World-space position of a bone's bind point under its current matrix.
    pub fn world_position(&self, index: usize) -> Vec3 {
        self.postures[index]
            .world
            .transform_point3(self.data.bones[index].position)
    }

    pub fn world_rotation(&self, index: usize) -> Quat {
        Quat::from_mat4(&self.postures[index].world)
    }

    /// Flat world-matrix array in bone-index order (the skinning palette).
    pub fn matrix_palette(&self) -> Vec<Mat4> {
        self.postures.iter().map(|posture| posture.world).collect()
    }

    /// `world = parent.world * T(translation) * R(rotation) * T(-bind)`.
    /// Correct in a single forward pass because parents precede children in
    /// the bone array (validated at load).
    fn update_world(&mut self, index: usize) {
        let bone = &self.data.bones[index];
        let local = Mat4::from_translation(self.postures[index].translation)
            * Mat4::from_quat(self.postures[index].rotation)
            * Mat4::from_translation(-bone.position);
        self.postures[index].world = match bone.parent {
            Some(parent) => self.postures[parent].world * local,
            None => local,
        };
    }

    fn solve_fk(&mut self, frame: u32) {
        let data = Arc::clone(&self.data);
        let motion = Arc::clone(&self.motion);

        for (index, bone) in data.bones.iter().enumerate() {
            let (rotation, translation) = match self.bound_curves[index] {
                Some(curve) => motion.curves[curve].evaluate(frame),
                None => (None, None),
            };

            self.postures[index].rotation = rotation.unwrap_or(Quat::IDENTITY);
            // Curve translation is relative to the bone's bind position.
            self.postures[index].translation =
                bone.position + translation.unwrap_or(Vec3::ZERO);
            self.update_world(index);
        }
    }

    /// Cyclic coordinate descent. Each link adjustment is followed by an
    /// immediate world refresh of the link and the effector; later links in
    /// the same sweep depend on those fresh matrices.
    fn solve_ik(&mut self, max_iterations: Option<u32>) {
        let data = Arc::clone(&self.data);

        for (index, bone) in data.bones.iter().enumerate() {
            let Some(ik) = &bone.ik else {
                continue;
            };
            if ik.links.is_empty() {
                continue;
            }

            let target_pos = self.world_position(index);
            let iterations = max_iterations.unwrap_or(ik.loop_count);

            for _ in 0..iterations {
                for link in &ik.links {
                    let link_pos = self.world_position(link.bone);
                    let inv_link_rot = self.world_rotation(link.bone).inverse();
                    let effector_pos = self.world_position(ik.target);

                    let effector_vec =
                        (inv_link_rot * (effector_pos - link_pos)).normalize_or_zero();
                    let target_vec = (inv_link_rot * (target_pos - link_pos)).normalize_or_zero();

                    let mut angle = target_vec.dot(effector_vec).clamp(-1.0, 1.0).acos();
                    if angle > ik.angular_limit {
                        angle = ik.angular_limit;
                    }

                    let axis = effector_vec.cross(target_vec);
                    if axis.length_squared() <= f32::EPSILON {
                        // effector already aligned with the target direction
                        continue;
                    }
                    let step = Quat::from_axis_angle(axis.normalize(), angle);
                    let mut rotation = self.postures[link.bone].rotation * step;

                    if link.limit.is_some() {
                        // Collapse to a hinge about X. The sign flip keeps the
                        // hinge from reversing past the pole (knee joints).
                        let c = rotation.w.min(1.0);
                        let c2 = (1.0 - c * c).max(0.0).sqrt();
                        rotation = if c >= 0.0 {
                            Quat::from_xyzw(c2, 0.0, 0.0, c)
                        } else {
                            Quat::from_xyzw(-c2, 0.0, 0.0, c)
                        };
                    }

                    self.postures[link.bone].rotation = rotation;
                    self.update_world(link.bone);
                    self.update_world(ik.target);
                }
            }
        }
    }

    /// Additive influences read the source bone's already-solved posture from
    /// this same frame. Rotation blends a fraction of the source rotation;
    /// translation inherits the source translation outright (intentionally
    /// asymmetric, preserved from the format as shipped).
    fn solve_grant(&mut self) {
        let data = Arc::clone(&self.data);

        for (index, bone) in data.bones.iter().enumerate() {
            let Some(grant) = &bone.grant else {
                continue;
            };

            let mut dirty = false;
            if grant.rotation {
                let source = self.postures[grant.source].rotation;
                let blended = Quat::IDENTITY.slerp(source, grant.rate);
                self.postures[index].rotation = self.postures[index].rotation * blended;
                dirty = true;
            }
            if grant.translation {
                self.postures[index].translation = self.postures[grant.source].translation;
                dirty = true;
            }
            if dirty {
                self.update_world(index);
            }
        }
    }

    /// Final composition sweep in array order, so grant adjustments cascade
    /// to every descendant.
    fn compose(&mut self) {
        for index in 0..self.postures.len() {
            self.update_world(index);
        }
    }

    /// Physics hand-off: push bone-driven bodies, step, pull back dynamic
    /// bodies. Pulled results overwrite the bone's world matrix outright,
    /// bypassing hierarchical composition for this frame.
    pub fn sync_physics(&mut self, engine: &mut dyn PhysicsEngine) {
        let data = Arc::clone(&self.data);

        for body in &data.rigid_bodies {
            let Some(bone) = body.bone else {
                continue;
            };
            if body.mode != RigidBodyMode::FollowBone {
                continue;
            }
            engine.push(bone, self.world_rotation(bone), self.world_position(bone));
        }

        engine.step();

        for body in &data.rigid_bodies {
            let Some(bone) = body.bone else {
                continue;
            };
            if body.mode == RigidBodyMode::FollowBone {
                continue;
            }
            let Some((rotation, position)) = engine.pull(bone) else {
                continue;
            };
            let bind = data.bones[bone].position;
            self.postures[bone].world = Mat4::from_translation(position)
                * Mat4::from_quat(rotation)
                * Mat4::from_translation(-bind);
        }
    }
}
