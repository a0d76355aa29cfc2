// Node simulator: a stylized force integrator, not a rigid-body solver.
//
// Per satellite, per frame:
//   turbulence kick → center pull → pointer pull → orbit swirl → mood force
//   → integrate + damp → reflect off the bounce sphere.
// The core node skips all of that and follows a Lissajous wobble in `t`.
//
// Forces are accelerations (scaled by dt); velocity is in world units per second.

use glam::{Quat, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::SimConfig;
use super::error::BlobResult;
use super::mood::{ModulationParams, Mood, MoodPalette};
use super::node::{Node, NodeKind};
use super::noise;

/// 2π(1 − 1/φ): successive Fibonacci-sphere points are this far apart in azimuth.
pub const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Floor on the pointer distance so the 1/d pull stays finite.
const POINTER_EPSILON: f32 = 0.05;

/// Satellites that cross the bounce sphere are put back at this fraction of it.
const BOUNCE_REPROJECT: f32 = 0.9;

/// Energy re-injected on a bounce, before the mood's turbulence factor.
const BOUNCE_ENERGY: f32 = 1.2;

/// Clamp a frame delta into `[0, max_dt]`. NaN and negative deltas become 0.
pub fn clamp_dt(dt: f32, max_dt: f32) -> f32 {
    if dt.is_finite() { dt.clamp(0.0, max_dt) } else { 0.0 }
}

/// `n` unit vectors spread evenly over the sphere (golden-angle spiral).
pub fn fibonacci_sphere(n: usize) -> Vec<Vec3> {
    (0..n)
        .map(|i| {
            let y = 1.0 - (i as f32 + 0.5) * 2.0 / n as f32;
            let ring = (1.0 - y * y).max(0.0).sqrt();
            let theta = GOLDEN_ANGLE * i as f32;
            Vec3::new(theta.cos() * ring, y, theta.sin() * ring)
        })
        .collect()
}

/// Core position at time `t`: zero at t = 0, never farther than `amplitude * √3`.
pub fn core_wobble(t: f32, amplitude: f32) -> Vec3 {
    if !t.is_finite() {
        return Vec3::ZERO;
    }
    amplitude * Vec3::new((t * 1.3).sin(), (t * 1.7).sin() * 0.8, (t * 1.1).sin())
}

fn core_wobble_velocity(t: f32, amplitude: f32) -> Vec3 {
    if !t.is_finite() {
        return Vec3::ZERO;
    }
    amplitude * Vec3::new(1.3 * (t * 1.3).cos(), 1.36 * (t * 1.7).cos(), 1.1 * (t * 1.1).cos())
}

#[inline]
fn safe_normalize(v: Vec3, fallback: Vec3) -> Vec3 {
    v.try_normalize().unwrap_or(fallback)
}

pub struct NodeSimulator {
    config: SimConfig,
    palette: MoodPalette,
    mood: Mood,
    nodes: Vec<Node>,
    noise_seed: u32,
    tick: u64,
    /// Maps the pointer's view plane into world space.
    view_rotation: Quat,
}

impl NodeSimulator {
    pub fn new(config: SimConfig, palette: MoodPalette) -> BlobResult<Self> {
        config.validate()?;
        palette.validate()?;
        Ok(Self {
            config,
            palette,
            mood: Mood::default(),
            nodes: Vec::new(),
            noise_seed: 0,
            tick: 0,
            view_rotation: Quat::IDENTITY,
        })
    }

    pub fn config(&self) -> &SimConfig { &self.config }
    pub fn mood(&self) -> Mood { self.mood }
    pub fn nodes(&self) -> &[Node] { &self.nodes }

    pub fn core(&self) -> Option<&Node> {
        self.nodes.iter().find(|n| n.is_core())
    }

    pub fn view_rotation(&self) -> Quat { self.view_rotation }

    /// Orientation of the viewer: the pointer's x/y axes become
    /// `rotation * X` / `rotation * Y`. Non-finite or zero input resets it
    /// to identity.
    pub fn set_view_rotation(&mut self, rotation: Quat) {
        self.view_rotation = if rotation.is_finite() && rotation.length_squared() > 1e-12 {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };
    }

    /// Select the mood force used by `step` and the palette used by `reset`.
    /// Existing nodes keep their colors until the next reset.
    pub fn set_mood(&mut self, mood: Mood) {
        self.mood = mood;
    }

    /// Discard every node and spawn `count` fresh ones: the core (if enabled)
    /// at the origin, the rest on a Fibonacci sphere of `base_radius`.
    /// Fully determined by `seed` and the current mood.
    pub fn reset(&mut self, count: u32, seed: u64) {
        self.nodes.clear();
        self.tick = 0;
        self.noise_seed = (seed ^ (seed >> 32)) as u32;

        let count = count as usize;
        if count == 0 {
            log::debug!("simulator reset to zero nodes");
            return;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let colors = self.palette.colors_for(self.mood);
        let strength = self.config.node_strength;

        if self.config.core_enabled {
            self.nodes.push(Node {
                id: 0,
                position: Vec3::ZERO,
                velocity: Vec3::ZERO,
                color: Vec3::from_array(colors[0]),
                strength,
                kind: NodeKind::Core,
            });
        }

        let first_id = self.nodes.len();
        let satellites = count - first_id;
        for (i, dir) in fibonacci_sphere(satellites).into_iter().enumerate() {
            // Radial start velocities carry no angular momentum, so the layout
            // does not spin as a whole.
            let speed = rng.gen_range(-1.0f32..=1.0) * self.config.initial_speed;
            let shade = rng.gen_range(0.85f32..=1.0);
            self.nodes.push(Node {
                id: (first_id + i) as u32,
                position: dir * self.config.base_radius,
                velocity: dir * speed,
                color: Vec3::from_array(colors[i % colors.len()]) * shade,
                strength,
                kind: NodeKind::Satellite,
            });
        }

        // Remove any net drift left by the random speeds.
        if satellites > 0 {
            let mean = self.nodes[first_id..].iter().map(|n| n.velocity).sum::<Vec3>()
                / satellites as f32;
            for node in &mut self.nodes[first_id..] {
                node.velocity -= mean;
            }
        }

        log::debug!(
            "simulator reset: {} nodes ({} satellites), mood {}, seed {}",
            self.nodes.len(),
            satellites,
            self.mood,
            seed
        );
    }

    /// Advance all nodes by one frame.
    ///
    /// `pointer` is in normalized device coordinates; it is clamped to
    /// `[-1, 1]`, scaled by the bounce radius onto the view plane through the
    /// origin (z = 0 with the default view rotation).
    /// Returns how many nodes had non-finite state that was reset to rest.
    pub fn step(
        &mut self,
        dt: f32,
        params: &ModulationParams,
        pointer: Option<Vec2>,
        t: f32,
    ) -> usize {
        let dt = clamp_dt(dt, self.config.max_dt);
        self.tick = self.tick.wrapping_add(1);

        let cfg = &self.config;
        let bounce = cfg.bounce_radius;
        let pointer_world = pointer
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(Vec2::NEG_ONE, Vec2::ONE))
            .map(|p| self.view_rotation * Vec3::new(p.x * bounce, p.y * bounce, 0.0));
        let frame = (self.tick & 0xFFFF) as f32;
        let mut repairs = 0;

        for node in &mut self.nodes {
            if node.kind == NodeKind::Core {
                node.position = core_wobble(t, cfg.core_wobble);
                node.velocity = core_wobble_velocity(t, cfg.core_wobble);
                continue;
            }

            let mut vel = node.velocity;
            let pos = node.position;
            let g = &cfg.gains;

            let kick = noise::signed3(node.id as f32, frame, node.id as f32 * 0.5, self.noise_seed);
            vel += kick * params.turbulence * dt;

            let r = pos.length();
            vel += -safe_normalize(pos, Vec3::ZERO) * r * g.center_attraction * dt;

            if let Some(target) = pointer_world {
                let to_pointer = target - pos;
                let d = to_pointer.length();
                if d < g.pointer_radius {
                    vel += safe_normalize(to_pointer, Vec3::ZERO) * g.pointer
                        / d.max(POINTER_EPSILON)
                        * dt;
                }
            }

            vel += orbit_force(pos, g.orbit, params) * dt;

            vel += mood_force(self.mood, cfg, node.id, pos, params, t) * dt;
            vel = vel.clamp_length_max(cfg.max_speed);

            let mut next = pos + vel * dt;
            vel *= cfg.damping;

            let r = next.length();
            if r > bounce {
                let normal = next / r;
                let outward = vel.dot(normal);
                if outward > 0.0 {
                    vel -= 2.0 * outward * normal;
                }
                next = normal * bounce * BOUNCE_REPROJECT;
                vel = (vel * BOUNCE_ENERGY * params.turbulence).clamp_length_max(cfg.max_speed);
            }

            if !next.is_finite() || !vel.is_finite() {
                log::warn!("node {} went non-finite, resetting to rest", node.id);
                repairs += 1;
                next = Vec3::ZERO;
                vel = Vec3::ZERO;
            }

            node.position = next;
            node.velocity = vel;
        }

        repairs
    }
}

/// Swirl about the vertical axis.
fn orbit_force(pos: Vec3, gain: f32, params: &ModulationParams) -> Vec3 {
    safe_normalize(pos.cross(Vec3::Y), Vec3::X) * gain * params.rotation_speed
}

/// Mood-specific acceleration for one satellite.
fn mood_force(
    mood: Mood,
    cfg: &SimConfig,
    id: u32,
    pos: Vec3,
    params: &ModulationParams,
    t: f32,
) -> Vec3 {
    let g = &cfg.gains;
    let phase = id as f32 * GOLDEN_ANGLE;
    match mood {
        Mood::Idle => {
            let sway = 0.5 + 0.5 * (t * 0.5 + phase).sin();
            safe_normalize(Vec3::Z.cross(pos), Vec3::Y) * g.idle_swirl * sway
        }
        Mood::Listening => {
            let f = params.pulse_frequency;
            Vec3::new(
                (t * f * 2.0 + phase).sin(),
                (t * f * 2.6 + phase * 1.7).cos(),
                (t * f * 1.4 + phase * 2.3).sin(),
            ) * g.listening_jitter
        }
        Mood::Thinking => {
            let angle = t * params.rotation_speed * 2.0 + id as f32 * 0.5;
            let axis = Vec3::new(angle.cos(), 0.35, angle.sin()).normalize();
            safe_normalize(pos.cross(axis), Vec3::X) * g.thinking_swirl
        }
        Mood::Talking => {
            let breath = (t * params.pulse_frequency * 2.0).sin();
            safe_normalize(pos, Vec3::Y) * breath * g.talking_pulse
        }
    }
}
