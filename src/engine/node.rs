// Influence nodes: particles for the integrator and ball sources for the field.

use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Sits near the origin, follows a scripted wobble, contributes a boosted ball.
    Core,
    /// Fully simulated.
    Satellite,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: u32,
    pub position: Vec3,
    pub velocity: Vec3,
    /// Linear RGB.
    pub color: Vec3,
    pub strength: f32,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_core(&self) -> bool {
        self.kind == NodeKind::Core
    }
}
