// Marching cubes isosurface extraction.
//
// Walks every cube of the touched lattice region in z, y, x order, looks up
// its corner-sign case and emits the case's triangles. One vertex is created
// per crossing lattice edge and shared by every cube around that edge, so a
// surface that stays inside the lattice comes out closed.
//
// Normals come from the field gradient, not the faces, so the blob shades
// smoothly. Colors are the contribution-weighted node colors, interpolated
// along the crossing edge and normalized there.

use glam::{Vec2, Vec3};

use super::error::{BlobError, BlobResult};
use super::field::VoxelGrid;
use super::mc_tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use super::mesh::BlobMesh;

const UNSET: u32 = u32::MAX;

/// Reusable mesher. Holds the per-edge vertex cache between frames so a
/// steady-state frame does not allocate.
pub struct MarchingCubes {
    /// Vertex index per lattice edge, keyed `3 * sample_index + axis`.
    edge_cache: Vec<u32>,
    /// Cache slots written this frame, reset at the end of extraction.
    written: Vec<usize>,
    generate_uvs: bool,
}

impl Default for MarchingCubes {
    fn default() -> Self {
        Self::new()
    }
}

impl MarchingCubes {
    pub fn new() -> Self {
        Self { edge_cache: Vec::new(), written: Vec::new(), generate_uvs: false }
    }

    /// Also emit planar XZ texture coordinates in `[0, 1]`.
    pub fn with_uvs(mut self, generate_uvs: bool) -> Self {
        self.generate_uvs = generate_uvs;
        self
    }

    pub fn extract(&mut self, grid: &VoxelGrid, isolation: f32) -> BlobResult<BlobMesh> {
        let mut mesh = BlobMesh::default();
        self.extract_into(grid, isolation, &mut mesh)?;
        Ok(mesh)
    }

    /// Like `extract`, but reuses `mesh`'s buffers.
    ///
    /// A grid that never crosses `isolation` yields an empty mesh, not an error.
    pub fn extract_into(
        &mut self,
        grid: &VoxelGrid,
        isolation: f32,
        mesh: &mut BlobMesh,
    ) -> BlobResult<()> {
        if !isolation.is_finite() || isolation < 0.0 {
            return Err(BlobError::InvalidIsolation(isolation));
        }

        mesh.clear();
        if grid.has_colors() {
            mesh.colors.get_or_insert_with(Vec::new);
        } else {
            mesh.colors = None;
        }
        if self.generate_uvs {
            mesh.uvs.get_or_insert_with(Vec::new);
        } else {
            mesh.uvs = None;
        }

        let Some(bounds) = grid.bounds() else {
            return Ok(());
        };

        let res = grid.resolution();
        let slots = 3 * res * res * res;
        if self.edge_cache.len() != slots {
            self.edge_cache.clear();
            self.edge_cache.resize(slots, UNSET);
        }

        // A cube belongs to the region if any of its corners does.
        let lo = bounds.min.map(|m| m.saturating_sub(1));
        let hi = bounds.max.map(|m| m.min(res - 2));

        let mut edge_ids = [0u32; 12];
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    let mut case = 0usize;
                    for (i, o) in CORNER_OFFSETS.iter().enumerate() {
                        if grid.value(x + o[0], y + o[1], z + o[2]) > isolation {
                            case |= 1 << i;
                        }
                    }
                    let crossing = EDGE_TABLE[case];
                    if crossing == 0 {
                        continue;
                    }

                    for (e, id) in edge_ids.iter_mut().enumerate() {
                        if crossing & (1 << e) != 0 {
                            *id = self.edge_vertex(grid, mesh, [x, y, z], e, isolation);
                        }
                    }

                    for &e in TRI_TABLE[case].iter().take_while(|&&e| e >= 0) {
                        mesh.indices.push(edge_ids[e as usize]);
                    }
                }
            }
        }

        for &slot in &self.written {
            self.edge_cache[slot] = UNSET;
        }
        self.written.clear();

        log::trace!(
            "extracted {} vertices / {} triangles at isolation {isolation}",
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(())
    }

    /// Index of the vertex on cube edge `edge` of the cube at `cube`,
    /// creating it on first use.
    fn edge_vertex(
        &mut self,
        grid: &VoxelGrid,
        mesh: &mut BlobMesh,
        cube: [usize; 3],
        edge: usize,
        isolation: f32,
    ) -> u32 {
        let [ca, cb] = EDGE_CORNERS[edge];
        let (oa, ob) = (CORNER_OFFSETS[ca], CORNER_OFFSETS[cb]);
        let axis = (0..3).find(|&k| oa[k] != ob[k]).unwrap_or(0);
        // Always walk the lattice edge from its lower end so the vertex does
        // not depend on which cube reaches it first.
        let low = if oa[axis] < ob[axis] { oa } else { ob };
        let s0 = [cube[0] + low[0], cube[1] + low[1], cube[2] + low[2]];
        let mut s1 = s0;
        s1[axis] += 1;

        let slot = 3 * grid.index(s0[0], s0[1], s0[2]) + axis;
        if self.edge_cache[slot] != UNSET {
            return self.edge_cache[slot];
        }

        let v0 = grid.value(s0[0], s0[1], s0[2]);
        let v1 = grid.value(s1[0], s1[1], s1[2]);
        let dv = v1 - v0;
        let t = if dv.abs() > f32::EPSILON { ((isolation - v0) / dv).clamp(0.0, 1.0) } else { 0.5 };

        let p0 = grid.sample_position(s0[0], s0[1], s0[2]);
        let p1 = grid.sample_position(s1[0], s1[1], s1[2]);
        let position = p0.lerp(p1, t);

        let g = grid
            .gradient(s0[0], s0[1], s0[2])
            .lerp(grid.gradient(s1[0], s1[1], s1[2]), t);
        // The field falls off outward, so the outward normal is −∇f.
        let normal = (-g).try_normalize().unwrap_or(Vec3::Y);

        if let Some(colors) = mesh.colors.as_mut() {
            colors.push(edge_color(grid, s0, s1, t));
        }
        if let Some(uvs) = mesh.uvs.as_mut() {
            let rel = (position - grid.min_corner()) / (2.0 * grid.scale());
            uvs.push(Vec2::new(rel.x, rel.z).clamp(Vec2::ZERO, Vec2::ONE));
        }

        let id = mesh.positions.len() as u32;
        mesh.positions.push(position);
        mesh.normals.push(normal);
        self.edge_cache[slot] = id;
        self.written.push(slot);
        id
    }
}

fn edge_color(grid: &VoxelGrid, s0: [usize; 3], s1: [usize; 3], t: f32) -> Vec3 {
    let (Some(c0), Some(c1)) = (grid.color_sum(s0[0], s0[1], s0[2]), grid.color_sum(s1[0], s1[1], s1[2]))
    else {
        return Vec3::ONE;
    };
    let weight = grid.value(s0[0], s0[1], s0[2]) * (1.0 - t) + grid.value(s1[0], s1[1], s1[2]) * t;
    if weight > f32::EPSILON {
        return c0.lerp(c1, t) / weight;
    }
    grid.color(s0[0], s0[1], s0[2])
        .or_else(|| grid.color(s1[0], s1[1], s1[2]))
        .unwrap_or(Vec3::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::FieldConfig;
    use crate::engine::field::FieldAccumulator;

    fn ball_grid(res: usize, strength: f32) -> VoxelGrid {
        let mut grid = VoxelGrid::new(res, 1.0, Vec3::ZERO, true).unwrap();
        let acc = FieldAccumulator::new(FieldConfig { falloff: 8.0, cutoff: 0.001, ..Default::default() })
            .unwrap();
        acc.add_ball(&mut grid, Vec3::new(0.03, -0.02, 0.01), strength, Vec3::new(0.9, 0.2, 0.1));
        grid
    }

    #[test]
    fn untouched_grid_gives_empty_mesh() {
        let grid = VoxelGrid::new(8, 1.0, Vec3::ZERO, false).unwrap();
        let mesh = MarchingCubes::new().extract(&grid, 0.5).unwrap();
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
    }

    #[test]
    fn fully_inside_grid_gives_empty_mesh() {
        let mut grid = VoxelGrid::new(6, 1.0, Vec3::ZERO, false).unwrap();
        for z in 0..6 {
            for y in 0..6 {
                for x in 0..6 {
                    grid.set_value(x, y, z, 3.0);
                }
            }
        }
        let mesh = MarchingCubes::new().extract(&grid, 1.0).unwrap();
        assert!(mesh.is_empty());
    }

    #[test]
    fn invalid_isolation_is_rejected() {
        let grid = ball_grid(8, 2.0);
        let mut mc = MarchingCubes::new();
        for iso in [f32::NAN, f32::INFINITY, -0.5] {
            assert!(matches!(mc.extract(&grid, iso), Err(BlobError::InvalidIsolation(_))));
        }
    }

    #[test]
    fn single_spike_becomes_an_octahedron() {
        let mut grid = VoxelGrid::new(5, 1.0, Vec3::ZERO, false).unwrap();
        grid.set_value(2, 2, 2, 1.0);
        let mesh = MarchingCubes::new().extract(&grid, 0.5).unwrap();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.triangle_count(), 8);
        // Each vertex sits halfway along its lattice edge.
        for p in &mesh.positions {
            let off_axis = p.to_array().iter().filter(|c| c.abs() > 1e-6).count();
            assert_eq!(off_axis, 1);
            assert!((p.length() - 0.25).abs() < 1e-5);
        }
    }

    #[test]
    fn normals_point_away_from_the_ball() {
        let grid = ball_grid(12, 2.0);
        let mesh = MarchingCubes::new().extract(&grid, 0.5).unwrap();
        assert!(!mesh.is_empty());
        let center = Vec3::new(0.03, -0.02, 0.01);
        for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
            assert!((n.length() - 1.0).abs() < 1e-4);
            assert!(n.dot(*p - center) > 0.0);
        }
    }

    #[test]
    fn faces_wind_outward() {
        let grid = ball_grid(12, 2.0);
        let mesh = MarchingCubes::new().extract(&grid, 0.5).unwrap();
        let center = Vec3::new(0.03, -0.02, 0.01);
        for [a, b, c] in mesh.triangles() {
            let (pa, pb, pc) = (
                mesh.positions[a as usize],
                mesh.positions[b as usize],
                mesh.positions[c as usize],
            );
            let face = (pb - pa).cross(pc - pa);
            let centroid = (pa + pb + pc) / 3.0;
            assert!(face.dot(centroid - center) > 0.0);
        }
    }

    #[test]
    fn single_ball_colors_are_the_ball_color() {
        let grid = ball_grid(10, 2.0);
        let mesh = MarchingCubes::new().extract(&grid, 0.5).unwrap();
        let colors = mesh.colors.as_ref().expect("grid has colors");
        assert_eq!(colors.len(), mesh.vertex_count());
        for c in colors {
            assert!((*c - Vec3::new(0.9, 0.2, 0.1)).length() < 1e-3);
        }
    }

    #[test]
    fn uvs_are_normalized() {
        let grid = ball_grid(10, 2.0);
        let mesh = MarchingCubes::new().with_uvs(true).extract(&grid, 0.5).unwrap();
        let uvs = mesh.uvs.as_ref().expect("uvs requested");
        assert_eq!(uvs.len(), mesh.vertex_count());
        assert!(uvs.iter().all(|uv| (0.0..=1.0).contains(&uv.x) && (0.0..=1.0).contains(&uv.y)));
        let plain = MarchingCubes::new().extract(&grid, 0.5).unwrap();
        assert!(plain.uvs.is_none());
    }

    #[test]
    fn repeated_extraction_is_identical() {
        let grid = ball_grid(14, 2.0);
        let mut mc = MarchingCubes::new();
        let first = mc.extract(&grid, 0.6).unwrap();
        let second = mc.extract(&grid, 0.6).unwrap();
        let mut reused = BlobMesh::default();
        mc.extract_into(&grid, 0.6, &mut reused).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, reused);
    }

    #[test]
    fn mesher_adapts_to_a_new_resolution() {
        let mut mc = MarchingCubes::new();
        let small = mc.extract(&ball_grid(8, 2.0), 0.5).unwrap();
        let large = mc.extract(&ball_grid(16, 2.0), 0.5).unwrap();
        assert!(!small.is_empty());
        assert!(large.triangle_count() > small.triangle_count());
    }

    #[test]
    fn isolation_above_the_peak_is_empty() {
        let grid = ball_grid(10, 2.0);
        let mesh = MarchingCubes::new().extract(&grid, 100.0).unwrap();
        assert!(mesh.is_empty());
    }
}
