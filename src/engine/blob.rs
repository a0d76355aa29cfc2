// BlobEngine: the frame-synchronous core.
//
//   pointer + dt → NodeSimulator::step → FieldAccumulator::accumulate
//                → MarchingCubes::extract_into → &BlobMesh
//
// Everything runs to completion inside `step`; there is nothing to cancel
// beyond not calling it again.

use glam::{Quat, Vec2};

use super::config::BlobConfig;
use super::error::BlobResult;
use super::field::{FieldAccumulator, VoxelGrid};
use super::marching_cubes::MarchingCubes;
use super::mesh::BlobMesh;
use super::mood::{ModulationParams, Mood};
use super::node::Node;
use super::observer::{FrameObserver, FrameStats, NoopObserver};
use super::simulator::{clamp_dt, NodeSimulator};

/// A frame this many times longer than `max_dt` is reported as a stall.
const STALL_FACTOR: f32 = 4.0;

/// The animation clock handed to the simulator wraps at this many seconds,
/// keeping `sin(t·f)` precise in f32 on long runs.
pub const CLOCK_WRAP: f64 = std::f64::consts::TAU * 1000.0;

pub struct BlobEngine<O: FrameObserver = NoopObserver> {
    config: BlobConfig,
    simulator: NodeSimulator,
    accumulator: FieldAccumulator,
    mesher: MarchingCubes,
    grid: VoxelGrid,
    mesh: BlobMesh,
    mood: Mood,
    params: ModulationParams,
    pointer: Option<Vec2>,
    elapsed: f64,
    observer: O,
}

impl BlobEngine<NoopObserver> {
    pub fn new(config: BlobConfig) -> BlobResult<Self> {
        Self::with_observer(config, NoopObserver)
    }
}

impl<O: FrameObserver> BlobEngine<O> {
    /// Validate `config`, allocate the lattice and start in the idle mood.
    pub fn with_observer(config: BlobConfig, observer: O) -> BlobResult<Self> {
        config.validate()?;
        let simulator = NodeSimulator::new(config.sim.clone(), config.palette.clone())?;
        let accumulator = FieldAccumulator::new(config.field.clone())?
            .with_dither_seed(config.seed as u32);
        let grid = VoxelGrid::from_config(&config.grid)?;
        let mesher = MarchingCubes::new().with_uvs(config.grid.generate_uvs);
        let mood = Mood::default();
        let params = config.modulation.params_for(mood);

        log::info!(
            "blob engine: {}^3 lattice, scale {}, seed {}",
            config.grid.resolution,
            config.grid.scale,
            config.seed
        );

        let mut engine = Self {
            config,
            simulator,
            accumulator,
            mesher,
            grid,
            mesh: BlobMesh::default(),
            mood,
            params,
            pointer: None,
            elapsed: 0.0,
            observer,
        };
        engine.set_state(mood);
        Ok(engine)
    }

    /// Switch mood: swap the modulation parameters and respawn the node set
    /// with the mood's node count. Takes effect for the next `step`.
    pub fn set_state(&mut self, mood: Mood) {
        self.mood = mood;
        self.params = self.config.modulation.params_for(mood);
        self.simulator.set_mood(mood);
        self.simulator.reset(self.params.node_count, self.config.seed);
        self.observer.on_reset(mood, self.simulator.nodes().len());
        log::info!("mood -> {mood} ({} nodes)", self.simulator.nodes().len());
    }

    /// Pointer in normalized device coordinates. Out-of-range values are
    /// clamped to `[-1, 1]`; non-finite ones clear the pointer.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        let p = Vec2::new(x, y);
        self.pointer = p.is_finite().then(|| p.clamp(Vec2::NEG_ONE, Vec2::ONE));
    }

    pub fn clear_pointer(&mut self) {
        self.pointer = None;
    }

    /// Orientation of the viewer, so the pointer pulls along the screen axes
    /// rather than the world's. Identity means looking down -Z.
    pub fn set_view_rotation(&mut self, rotation: Quat) {
        self.simulator.set_view_rotation(rotation);
    }

    /// Advance one frame and rebuild the mesh. `dt` is clamped to
    /// `[0, sim.max_dt]`.
    pub fn step(&mut self, dt: f32) -> &BlobMesh {
        let max_dt = self.config.sim.max_dt;
        let used = clamp_dt(dt, max_dt);
        let dt_clamped = used != dt;
        if !(dt <= max_dt * STALL_FACTOR) {
            log::warn!("frame delta {dt} clamped to {used}");
        }
        self.elapsed += used as f64;

        let t = self.animation_time();
        let repairs = self.simulator.step(used, &self.params, self.pointer, t);
        self.accumulator.accumulate(&mut self.grid, self.simulator.nodes(), &self.params);

        let isolation = self.accumulator.isolation_for(&self.params);
        if let Err(err) = self.mesher.extract_into(&self.grid, isolation, &mut self.mesh) {
            log::warn!("mesh extraction skipped: {err}");
            self.mesh.clear();
        }

        let stats = FrameStats {
            mood: self.mood,
            node_count: self.simulator.nodes().len(),
            vertex_count: self.mesh.vertex_count(),
            triangle_count: self.mesh.triangle_count(),
            dt: used,
            dt_clamped,
            repairs,
            elapsed: self.elapsed,
        };
        log::trace!("frame: {stats:?}");
        self.observer.on_frame(&stats);

        &self.mesh
    }

    pub fn mood(&self) -> Mood { self.mood }
    pub fn params(&self) -> &ModulationParams { &self.params }
    pub fn nodes(&self) -> &[Node] { self.simulator.nodes() }
    pub fn pointer(&self) -> Option<Vec2> { self.pointer }
    /// Total engine time in seconds, without wrapping.
    pub fn elapsed(&self) -> f64 { self.elapsed }

    /// The clock the forces and the core wobble see.
    pub fn animation_time(&self) -> f32 {
        (self.elapsed % CLOCK_WRAP) as f32
    }
    pub fn grid(&self) -> &VoxelGrid { &self.grid }
    pub fn mesh(&self) -> &BlobMesh { &self.mesh }
    pub fn config(&self) -> &BlobConfig { &self.config }
    pub fn observer(&self) -> &O { &self.observer }
    pub fn observer_mut(&mut self) -> &mut O { &mut self.observer }

    /// Current surface threshold (base isolation times the mood's multiplier).
    pub fn isolation(&self) -> f32 {
        self.accumulator.isolation_for(&self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::BlobError;
    use crate::engine::observer::FrameCounters;

    #[test]
    fn invalid_config_fails_at_construction() {
        let mut config = BlobConfig::default();
        config.grid.resolution = 0;
        assert!(matches!(BlobEngine::new(config), Err(BlobError::InvalidConfig(_))));
    }

    #[test]
    fn starts_idle_with_the_idle_node_count() {
        let engine = BlobEngine::new(BlobConfig::default()).unwrap();
        assert_eq!(engine.mood(), Mood::Idle);
        assert_eq!(engine.nodes().len(), engine.config().modulation.idle.node_count as usize);
        assert!(engine.mesh().is_empty());
    }

    #[test]
    fn pointer_is_clamped_and_clearable() {
        let mut engine = BlobEngine::new(BlobConfig::default()).unwrap();
        engine.set_pointer(3.0, -7.5);
        assert_eq!(engine.pointer(), Some(Vec2::new(1.0, -1.0)));
        engine.set_pointer(0.25, f32::NAN);
        assert_eq!(engine.pointer(), None);
        engine.set_pointer(0.25, 0.5);
        engine.clear_pointer();
        assert_eq!(engine.pointer(), None);
    }

    #[test]
    fn step_produces_a_surface() {
        let mut engine = BlobEngine::new(BlobConfig::default()).unwrap();
        let mesh = engine.step(1.0 / 60.0);
        assert!(mesh.triangle_count() > 0);
        assert_eq!(mesh.colors.as_ref().map(Vec::len), Some(mesh.vertex_count()));
        assert!(mesh.positions.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn observer_sees_resets_and_frames() {
        let mut engine = BlobEngine::with_observer(BlobConfig::default(), FrameCounters::default())
            .unwrap();
        engine.set_state(Mood::Talking);
        engine.step(1.0 / 60.0);
        engine.step(2.0);
        engine.step(f32::NAN);

        let counters = engine.observer();
        assert_eq!(counters.resets, 2);
        assert_eq!(counters.frames, 3);
        assert_eq!(counters.clamped_frames, 2);
        let last = counters.last.expect("frame recorded");
        assert_eq!(last.mood, Mood::Talking);
        assert_eq!(last.dt, 0.0);
        assert_eq!(last.node_count, engine.nodes().len());
        assert!(counters.triangles > 0);
    }

    #[test]
    fn elapsed_time_uses_clamped_deltas() {
        let mut engine = BlobEngine::new(BlobConfig::default()).unwrap();
        let max_dt = engine.config().sim.max_dt;
        engine.step(10.0);
        engine.step(-1.0);
        assert!((engine.elapsed() - max_dt as f64).abs() < 1e-6);
    }

    #[test]
    fn mood_changes_the_isolation() {
        let mut engine = BlobEngine::new(BlobConfig::default()).unwrap();
        let idle = engine.isolation();
        engine.set_state(Mood::Talking);
        let talking = engine.isolation();
        let table = &engine.config().modulation;
        let base = engine.config().field.isolation;
        assert!((idle - base * table.idle.field_threshold).abs() < 1e-6);
        assert!((talking - base * table.talking.field_threshold).abs() < 1e-6);
    }

    #[test]
    fn animation_clock_wraps_on_long_runs() {
        let mut engine = BlobEngine::new(BlobConfig::default()).unwrap();
        // Five hours in.
        engine.elapsed = 5.0 * 3600.0;
        engine.step(1.0 / 60.0);
        let t = engine.animation_time();
        assert!(engine.elapsed() > CLOCK_WRAP);
        assert!((0.0..CLOCK_WRAP as f32).contains(&t));
        let expected = ((5.0 * 3600.0 + 1.0 / 60.0) % CLOCK_WRAP) as f32;
        assert!((t - expected).abs() < 1e-3);

        // Sub-frame deltas still move the clock this late.
        let before = engine.animation_time();
        engine.step(1.0 / 240.0);
        assert!(engine.animation_time() > before);
    }

    #[test]
    fn view_rotation_reaches_the_simulator() {
        let mut engine = BlobEngine::new(BlobConfig::default()).unwrap();
        let rotation = Quat::from_rotation_y(1.0);
        engine.set_view_rotation(rotation);
        assert!(engine.simulator.view_rotation().abs_diff_eq(rotation, 1e-6));
    }
}
