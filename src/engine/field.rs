// Metaball field on a cubic lattice.
//
// Each node deposits `max(0, S / (1 + k·d²) − cutoff)` into every lattice
// sample within the box where that can be positive. Colors are deposited
// weighted by the same contribution and normalized by the summed field when
// the mesher reads them back.

use glam::Vec3;

use super::config::{FieldConfig, GridConfig, MAX_RESOLUTION};
use super::error::{BlobError, BlobResult};
use super::mood::ModulationParams;
use super::node::Node;
use super::noise;

// ============================================================================
// BOUNDS
// ============================================================================

/// Inclusive range of lattice samples that received a contribution this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridBounds {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl GridBounds {
    pub fn cell(x: usize, y: usize, z: usize) -> Self {
        Self { min: [x, y, z], max: [x, y, z] }
    }

    pub fn union(self, other: GridBounds) -> Self {
        Self {
            min: [0, 1, 2].map(|a| self.min[a].min(other.min[a])),
            max: [0, 1, 2].map(|a| self.max[a].max(other.max[a])),
        }
    }

    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        let p = [x, y, z];
        (0..3).all(|a| p[a] >= self.min[a] && p[a] <= self.max[a])
    }
}

// ============================================================================
// VOXEL GRID
// ============================================================================

/// `resolution³` field samples spanning `origin ± scale` on every axis,
/// plus an optional parallel lattice of contribution-weighted colors.
/// Sample `(x, y, z)` lives at index `x + y·res + z·res²`.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    resolution: usize,
    scale: f32,
    origin: Vec3,
    step: f32,
    field: Vec<f32>,
    colors: Option<Vec<Vec3>>,
    bounds: Option<GridBounds>,
}

impl VoxelGrid {
    pub fn new(resolution: usize, scale: f32, origin: Vec3, with_colors: bool) -> BlobResult<Self> {
        if resolution < 2 || resolution > MAX_RESOLUTION {
            return Err(BlobError::InvalidConfig(format!(
                "grid resolution must be in 2..={MAX_RESOLUTION}, got {resolution}"
            )));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(BlobError::InvalidConfig(format!("grid scale must be positive, got {scale}")));
        }
        if !origin.is_finite() {
            return Err(BlobError::InvalidConfig("grid origin must be finite".into()));
        }
        let len = resolution * resolution * resolution;
        Ok(Self {
            resolution,
            scale,
            origin,
            step: 2.0 * scale / (resolution - 1) as f32,
            field: vec![0.0; len],
            colors: with_colors.then(|| vec![Vec3::ZERO; len]),
            bounds: None,
        })
    }

    pub fn from_config(config: &GridConfig) -> BlobResult<Self> {
        config.validate()?;
        Self::new(config.resolution, config.scale, Vec3::ZERO, config.with_colors)
    }

    pub fn resolution(&self) -> usize { self.resolution }
    pub fn scale(&self) -> f32 { self.scale }
    pub fn origin(&self) -> Vec3 { self.origin }
    /// World distance between neighboring samples.
    pub fn step(&self) -> f32 { self.step }
    pub fn has_colors(&self) -> bool { self.colors.is_some() }
    pub fn bounds(&self) -> Option<GridBounds> { self.bounds }
    pub fn field(&self) -> &[f32] { &self.field }

    /// World position of the lattice corner with index (0, 0, 0).
    pub fn min_corner(&self) -> Vec3 {
        self.origin - Vec3::splat(self.scale)
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.resolution * (y + self.resolution * z)
    }

    #[inline]
    pub fn value(&self, x: usize, y: usize, z: usize) -> f32 {
        self.field[self.index(x, y, z)]
    }

    /// Overwrite one sample. Marks it as touched for the mesher.
    pub fn set_value(&mut self, x: usize, y: usize, z: usize, value: f32) {
        let i = self.index(x, y, z);
        self.field[i] = value;
        self.touch(GridBounds::cell(x, y, z));
    }

    /// Contribution-weighted color sum at a sample (not normalized).
    pub fn color_sum(&self, x: usize, y: usize, z: usize) -> Option<Vec3> {
        let i = self.index(x, y, z);
        self.colors.as_ref().map(|c| c[i])
    }

    /// Blended node color at a sample, or `None` without a color lattice or
    /// where nothing contributed.
    pub fn color(&self, x: usize, y: usize, z: usize) -> Option<Vec3> {
        let weight = self.value(x, y, z);
        let sum = self.color_sum(x, y, z)?;
        (weight > f32::EPSILON).then(|| sum / weight)
    }

    pub fn sample_position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        self.min_corner() + Vec3::new(x as f32, y as f32, z as f32) * self.step
    }

    /// Trilinear field value at a world position, clamped to the lattice.
    pub fn sample(&self, p: Vec3) -> f32 {
        let last = (self.resolution - 1) as f32;
        let l = ((p - self.min_corner()) / self.step).clamp(Vec3::ZERO, Vec3::splat(last));
        let base = l.floor().min(Vec3::splat(last - 1.0));
        let f = l - base;
        let (x, y, z) = (base.x as usize, base.y as usize, base.z as usize);

        let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
        let c00 = lerp(self.value(x, y, z), self.value(x + 1, y, z), f.x);
        let c10 = lerp(self.value(x, y + 1, z), self.value(x + 1, y + 1, z), f.x);
        let c01 = lerp(self.value(x, y, z + 1), self.value(x + 1, y, z + 1), f.x);
        let c11 = lerp(self.value(x, y + 1, z + 1), self.value(x + 1, y + 1, z + 1), f.x);
        lerp(lerp(c00, c10, f.y), lerp(c01, c11, f.y), f.z)
    }

    /// Field gradient at a sample: central differences inside, one-sided at
    /// the lattice border.
    pub fn gradient(&self, x: usize, y: usize, z: usize) -> Vec3 {
        let p = [x, y, z];
        let mut g = [0.0f32; 3];
        for (axis, out) in g.iter_mut().enumerate() {
            let lo = p[axis].saturating_sub(1);
            let hi = (p[axis] + 1).min(self.resolution - 1);
            let mut a = p;
            let mut b = p;
            a[axis] = lo;
            b[axis] = hi;
            let span = (hi - lo) as f32 * self.step;
            *out = (self.value(b[0], b[1], b[2]) - self.value(a[0], a[1], a[2])) / span;
        }
        Vec3::from_array(g)
    }

    /// Zero the field and colors and forget the touched region.
    pub fn clear(&mut self) {
        self.field.fill(0.0);
        if let Some(colors) = self.colors.as_mut() {
            colors.fill(Vec3::ZERO);
        }
        self.bounds = None;
    }

    fn touch(&mut self, region: GridBounds) {
        self.bounds = Some(match self.bounds {
            Some(b) => b.union(region),
            None => region,
        });
    }

    /// Lattice box of samples within `radius` of `center`, or `None` if it
    /// misses the lattice.
    fn box_around(&self, center: Vec3, radius: f32) -> Option<GridBounds> {
        let last = (self.resolution - 1) as f32;
        let lo = ((center - Vec3::splat(radius) - self.min_corner()) / self.step).ceil();
        let hi = ((center + Vec3::splat(radius) - self.min_corner()) / self.step).floor();
        if lo.max_element() > last || hi.min_element() < 0.0 {
            return None;
        }
        let lo = lo.clamp(Vec3::ZERO, Vec3::splat(last));
        let hi = hi.clamp(Vec3::ZERO, Vec3::splat(last));
        if lo.cmpgt(hi).any() {
            return None;
        }
        Some(GridBounds {
            min: [lo.x as usize, lo.y as usize, lo.z as usize],
            max: [hi.x as usize, hi.y as usize, hi.z as usize],
        })
    }
}

// ============================================================================
// FIELD ACCUMULATOR
// ============================================================================

pub struct FieldAccumulator {
    config: FieldConfig,
    dither_seed: u32,
}

impl FieldAccumulator {
    pub fn new(config: FieldConfig) -> BlobResult<Self> {
        config.validate()?;
        Ok(Self { config, dither_seed: 0x5eed })
    }

    pub fn with_dither_seed(mut self, seed: u32) -> Self {
        self.dither_seed = seed;
        self
    }

    pub fn config(&self) -> &FieldConfig { &self.config }

    /// Surface threshold for a mood.
    pub fn isolation_for(&self, params: &ModulationParams) -> f32 {
        self.config.isolation * params.field_threshold
    }

    /// Clear `grid` and deposit every node. The core's strength is multiplied
    /// by `core_boost`; every contribution by `params.field_strength`.
    pub fn accumulate(&self, grid: &mut VoxelGrid, nodes: &[Node], params: &ModulationParams) {
        grid.clear();
        for node in nodes {
            let boost = if node.is_core() { self.config.core_boost } else { 1.0 };
            let strength = node.strength * boost * params.field_strength;
            self.add_ball(grid, node.position, strength, node.color);
        }
        if self.config.dither > 0.0 {
            self.dither(grid);
        }
    }

    /// Deposit a single ball without clearing the grid.
    pub fn add_ball(&self, grid: &mut VoxelGrid, center: Vec3, strength: f32, color: Vec3) {
        if !center.is_finite() || !strength.is_finite() {
            log::warn!("skipping non-finite ball at {center:?} with strength {strength}");
            return;
        }
        let cutoff = self.config.cutoff;
        let k = self.config.falloff;
        if strength <= cutoff {
            return;
        }
        // S / (1 + k·r²) = cutoff  ⇒  r² = (S / cutoff − 1) / k
        let reach = if cutoff > 0.0 {
            ((strength / cutoff - 1.0) / k).sqrt()
        } else {
            f32::INFINITY
        };
        let reach = reach.min(4.0 * grid.scale);
        let Some(region) = grid.box_around(center, reach) else {
            return;
        };

        let res = grid.resolution;
        for z in region.min[2]..=region.max[2] {
            for y in region.min[1]..=region.max[1] {
                let row = res * (y + res * z);
                for x in region.min[0]..=region.max[0] {
                    let d2 = grid.sample_position(x, y, z).distance_squared(center);
                    let v = strength / (1.0 + k * d2) - cutoff;
                    if v > 0.0 {
                        grid.field[row + x] += v;
                        if let Some(colors) = grid.colors.as_mut() {
                            colors[row + x] += color * v;
                        }
                    }
                }
            }
        }
        grid.touch(region);
    }

    /// Multiplicative hash dither on non-zero samples; empty samples stay zero.
    fn dither(&self, grid: &mut VoxelGrid) {
        let Some(region) = grid.bounds else { return };
        let amp = self.config.dither;
        let res = grid.resolution;
        for z in region.min[2]..=region.max[2] {
            for y in region.min[1]..=region.max[1] {
                for x in region.min[0]..=region.max[0] {
                    let i = x + res * (y + res * z);
                    if grid.field[i] == 0.0 {
                        continue;
                    }
                    let h = noise::hash3(x as f32, y as f32, z as f32, self.dither_seed);
                    let factor = 1.0 + amp * (h - 0.5);
                    grid.field[i] *= factor;
                    if let Some(colors) = grid.colors.as_mut() {
                        colors[i] *= factor;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mood::ModulationTable;
    use crate::engine::node::NodeKind;

    fn grid(res: usize) -> VoxelGrid {
        VoxelGrid::new(res, 1.0, Vec3::ZERO, true).expect("valid grid")
    }

    fn unit_params() -> ModulationParams {
        ModulationParams { field_strength: 1.0, field_threshold: 1.0, ..ModulationTable::default().idle }
    }

    fn node(id: u32, position: Vec3, color: Vec3, kind: NodeKind) -> Node {
        Node { id, position, velocity: Vec3::ZERO, color, strength: 1.0, kind }
    }

    #[test]
    fn invalid_lattices_are_rejected() {
        assert!(VoxelGrid::new(1, 1.0, Vec3::ZERO, false).is_err());
        assert!(VoxelGrid::new(0, 1.0, Vec3::ZERO, false).is_err());
        assert!(VoxelGrid::new(8, 0.0, Vec3::ZERO, false).is_err());
        assert!(VoxelGrid::new(8, 1.0, Vec3::NAN, false).is_err());
    }

    #[test]
    fn no_nodes_leaves_zero_field() {
        let acc = FieldAccumulator::new(FieldConfig { dither: 0.3, ..Default::default() }).unwrap();
        let mut g = grid(10);
        g.set_value(3, 3, 3, 5.0);
        acc.accumulate(&mut g, &[], &unit_params());
        assert!(g.field().iter().all(|&v| v == 0.0));
        assert!(g.bounds().is_none());
    }

    #[test]
    fn full_dither_never_makes_samples_negative() {
        let acc = FieldAccumulator::new(FieldConfig { dither: 1.0, ..Default::default() }).unwrap();
        let mut g = grid(16);
        let nodes = [node(1, Vec3::new(0.1, -0.2, 0.05), Vec3::ONE, NodeKind::Satellite)];
        acc.accumulate(&mut g, &nodes, &unit_params());
        assert!(g.field().iter().any(|&v| v > 0.0));
        assert_eq!(g.field().iter().filter(|&&v| v < 0.0).count(), 0);

        assert!(FieldAccumulator::new(FieldConfig { dither: 4.0, ..Default::default() }).is_err());
    }

    #[test]
    fn single_ball_peaks_at_its_center() {
        let acc = FieldAccumulator::new(FieldConfig::default()).unwrap();
        let mut g = grid(9);
        let center = g.sample_position(4, 4, 4);
        acc.add_ball(&mut g, center, 2.0, Vec3::X);
        let peak = g.value(4, 4, 4);
        assert!((peak - (2.0 - acc.config().cutoff)).abs() < 1e-5);
        assert_eq!(g.value(3, 4, 4), g.value(5, 4, 4));
        assert_eq!(g.value(4, 3, 4), g.value(4, 4, 5));
        assert!(g.value(3, 4, 4) < peak);
        assert!(g.bounds().unwrap().contains(4, 4, 4));
    }

    #[test]
    fn cutoff_limits_the_touched_region() {
        let config = FieldConfig { falloff: 50.0, cutoff: 0.2, ..Default::default() };
        let acc = FieldAccumulator::new(config).unwrap();
        let mut g = grid(21);
        acc.add_ball(&mut g, Vec3::ZERO, 1.0, Vec3::ONE);
        let b = g.bounds().unwrap();
        assert!(b.min[0] > 0 && b.max[0] < 20);
        assert_eq!(g.value(0, 0, 0), 0.0);
        // Everything outside the box is untouched.
        for z in 0..21 {
            for y in 0..21 {
                for x in 0..21 {
                    if !b.contains(x, y, z) {
                        assert_eq!(g.value(x, y, z), 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn colors_blend_by_contribution() {
        let acc = FieldAccumulator::new(FieldConfig::default()).unwrap();
        let mut g = grid(9);
        let red = Vec3::new(1.0, 0.0, 0.0);
        let blue = Vec3::new(0.0, 0.0, 1.0);
        let nodes = [
            node(0, g.sample_position(2, 4, 4), red, NodeKind::Satellite),
            node(1, g.sample_position(6, 4, 4), blue, NodeKind::Satellite),
        ];
        acc.accumulate(&mut g, &nodes, &unit_params());

        let near_red = g.color(2, 4, 4).unwrap();
        let middle = g.color(4, 4, 4).unwrap();
        assert!(near_red.x > near_red.z);
        assert!((middle.x - middle.z).abs() < 1e-4);
        assert!((middle.x + middle.z - 1.0).abs() < 1e-4);
    }

    #[test]
    fn core_contributes_boosted_strength() {
        let acc = FieldAccumulator::new(FieldConfig::default()).unwrap();
        let mut with_core = grid(9);
        let mut with_satellite = grid(9);
        let c = with_core.sample_position(4, 4, 4);
        acc.accumulate(&mut with_core, &[node(0, c, Vec3::ONE, NodeKind::Core)], &unit_params());
        acc.accumulate(&mut with_satellite, &[node(0, c, Vec3::ONE, NodeKind::Satellite)], &unit_params());
        let cutoff = acc.config().cutoff;
        let ratio = (with_core.value(4, 4, 4) + cutoff) / (with_satellite.value(4, 4, 4) + cutoff);
        assert!((ratio - acc.config().core_boost).abs() < 1e-4);
    }

    #[test]
    fn field_strength_scales_contributions() {
        let acc = FieldAccumulator::new(FieldConfig { cutoff: 0.0, ..Default::default() }).unwrap();
        let mut a = grid(7);
        let mut b = grid(7);
        let n = [node(0, Vec3::ZERO, Vec3::ONE, NodeKind::Satellite)];
        acc.accumulate(&mut a, &n, &unit_params());
        acc.accumulate(&mut b, &n, &ModulationParams { field_strength: 2.0, ..unit_params() });
        assert!((b.value(3, 3, 3) - 2.0 * a.value(3, 3, 3)).abs() < 1e-5);
    }

    #[test]
    fn dither_is_deterministic_and_small() {
        let acc = FieldAccumulator::new(FieldConfig { dither: 0.1, ..Default::default() }).unwrap();
        let plain = FieldAccumulator::new(FieldConfig::default()).unwrap();
        let n = [node(0, Vec3::ZERO, Vec3::ONE, NodeKind::Satellite)];
        let (mut a, mut b, mut c) = (grid(9), grid(9), grid(9));
        acc.accumulate(&mut a, &n, &unit_params());
        acc.accumulate(&mut b, &n, &unit_params());
        plain.accumulate(&mut c, &n, &unit_params());
        assert_eq!(a.field(), b.field());
        for (d, p) in a.field().iter().zip(c.field()) {
            assert!((d - p).abs() <= p * 0.05 + 1e-7);
        }
    }

    #[test]
    fn trilinear_sample_matches_lattice_points() {
        let acc = FieldAccumulator::new(FieldConfig::default()).unwrap();
        let mut g = grid(8);
        acc.add_ball(&mut g, Vec3::new(0.1, -0.2, 0.05), 1.5, Vec3::ONE);
        for &(x, y, z) in &[(0, 0, 0), (3, 4, 2), (7, 7, 7), (6, 0, 3)] {
            let p = g.sample_position(x, y, z);
            assert!((g.sample(p) - g.value(x, y, z)).abs() < 1e-5);
        }
        // Halfway between two samples is their average.
        let mid = (g.sample_position(3, 3, 3) + g.sample_position(4, 3, 3)) * 0.5;
        let expected = 0.5 * (g.value(3, 3, 3) + g.value(4, 3, 3));
        assert!((g.sample(mid) - expected).abs() < 1e-5);
    }

    #[test]
    fn gradient_points_toward_the_ball() {
        let acc = FieldAccumulator::new(FieldConfig::default()).unwrap();
        let mut g = grid(11);
        acc.add_ball(&mut g, Vec3::ZERO, 2.0, Vec3::ONE);
        let grad = g.gradient(7, 5, 5);
        assert!(grad.x < 0.0);
        assert!(grad.y.abs() < 1e-5 && grad.z.abs() < 1e-5);
        // Border samples use one-sided differences and stay finite.
        assert!(g.gradient(0, 0, 0).is_finite());
        assert!(g.gradient(10, 10, 10).is_finite());
    }

    #[test]
    fn ball_outside_the_lattice_touches_nothing() {
        let acc = FieldAccumulator::new(FieldConfig { cutoff: 0.3, ..Default::default() }).unwrap();
        let mut g = grid(8);
        acc.add_ball(&mut g, Vec3::new(50.0, 0.0, 0.0), 1.0, Vec3::ONE);
        assert!(g.bounds().is_none());
        assert!(g.field().iter().all(|&v| v == 0.0));
    }
}
