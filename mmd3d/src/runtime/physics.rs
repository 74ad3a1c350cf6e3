//! Narrow contract with an external rigid-body solver.

use glam::{Quat, Vec3};

/// The pose solver pushes bone-driven transforms before the step and pulls
/// dynamic results back afterward. Any concrete engine satisfies this; tests
/// and headless use rely on [`NoopPhysics`].
pub trait PhysicsEngine {
    /// Hand a kinematic bone's world rotation and position to the engine.
    fn push(&mut self, bone: usize, rotation: Quat, position: Vec3);

    /// Advance the simulation by one frame.
    fn step(&mut self);

    /// Dynamic result for a bone, if the engine has a body bound to it.
    fn pull(&mut self, bone: usize) -> Option<(Quat, Vec3)>;
}

/// Accepts pushes and never reports dynamic results.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopPhysics;

impl PhysicsEngine for NoopPhysics {
    fn push(&mut self, _bone: usize, _rotation: Quat, _position: Vec3) {}

    fn step(&mut self) {}

    fn pull(&mut self, _bone: usize) -> Option<(Quat, Vec3)> {
        None
    }
}
