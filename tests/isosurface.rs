use std::collections::HashMap;

use glam::Vec3;
use metablob::engine::config::FieldConfig;
use metablob::engine::{
    BlobMesh, FieldAccumulator, MarchingCubes, ModulationTable, Mood, Node, NodeKind, VoxelGrid,
};

fn single_ball_grid(resolution: usize, strength: f32) -> VoxelGrid {
    let mut grid = VoxelGrid::new(resolution, 1.0, Vec3::ZERO, true).expect("grid");
    // Steep enough that the surface sits well inside the lattice.
    let field = FieldAccumulator::new(FieldConfig {
        falloff: 8.0,
        cutoff: 0.01,
        core_boost: 1.0,
        isolation: 0.5,
        dither: 0.0,
    })
    .expect("field config");

    let node = Node {
        id: 0,
        position: Vec3::ZERO,
        velocity: Vec3::ZERO,
        color: Vec3::new(0.9, 0.3, 0.6),
        strength,
        kind: NodeKind::Satellite,
    };
    let mut params = ModulationTable::default().params_for(Mood::Idle);
    params.field_strength = 1.0;
    field.accumulate(&mut grid, &[node], &params);
    grid
}

/// Every undirected edge is used by exactly two triangles, once in each
/// direction.
fn assert_closed_and_oriented(mesh: &BlobMesh) {
    let mut directed: HashMap<(u32, u32), usize> = HashMap::new();
    for [a, b, c] in mesh.triangles() {
        assert!(a != b && b != c && a != c, "degenerate triangle {a} {b} {c}");
        for edge in [(a, b), (b, c), (c, a)] {
            *directed.entry(edge).or_default() += 1;
        }
    }
    for (&(a, b), &count) in &directed {
        assert_eq!(count, 1, "directed edge {a}->{b} used {count} times");
        assert_eq!(
            directed.get(&(b, a)).copied().unwrap_or(0),
            1,
            "edge {a}-{b} is not shared by exactly two triangles"
        );
    }
}

#[test]
fn single_node_on_small_grid_gives_closed_mesh() {
    let grid = single_ball_grid(8, 2.0);
    let mesh = MarchingCubes::new().extract(&grid, 0.5).expect("extract");

    assert!(!mesh.is_empty());
    assert_closed_and_oriented(&mesh);
}

#[test]
fn vertices_lie_on_the_isosurface() {
    let isolation = 0.5;
    let grid = single_ball_grid(12, 2.0);
    let mesh = MarchingCubes::new().extract(&grid, isolation).expect("extract");

    assert!(!mesh.is_empty());
    for p in &mesh.positions {
        let f = grid.sample(*p);
        assert!(
            (f - isolation).abs() < 1e-3,
            "field {f} at {p:?} is off the surface"
        );
    }
}

#[test]
fn normals_point_away_from_the_ball() {
    let grid = single_ball_grid(12, 2.0);
    let mesh = MarchingCubes::new().extract(&grid, 0.5).expect("extract");

    for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
        assert!((n.length() - 1.0).abs() < 1e-4);
        assert!(n.dot(*p) > 0.0, "normal {n:?} at {p:?} points inward");
    }
}

#[test]
fn empty_field_gives_empty_mesh() {
    let mut grid = VoxelGrid::new(8, 1.0, Vec3::ZERO, false).expect("grid");
    let field = FieldAccumulator::new(FieldConfig::default()).expect("field config");
    let params = ModulationTable::default().params_for(Mood::Thinking);

    field.accumulate(&mut grid, &[], &params);
    assert!(grid.field().iter().all(|&v| v == 0.0));
    assert!(grid.bounds().is_none());

    let mut mesher = MarchingCubes::new();
    for isolation in [0.01, 0.5, 3.0] {
        let mesh = mesher.extract(&grid, isolation).expect("extract");
        assert_eq!(mesh.triangle_count(), 0);
        assert_eq!(mesh.vertex_count(), 0);
    }
}

#[test]
fn extraction_is_deterministic() {
    let grid = single_ball_grid(16, 2.0);
    let mut mesher = MarchingCubes::new();
    let first = mesher.extract(&grid, 0.5).expect("extract");
    let second = mesher.extract(&grid, 0.5).expect("extract");
    let fresh = MarchingCubes::new().extract(&grid, 0.5).expect("extract");

    assert_eq!(first, second);
    assert_eq!(first, fresh);
}

#[test]
fn overlapping_balls_merge_into_one_closed_surface() {
    let mut grid = VoxelGrid::new(20, 1.0, Vec3::ZERO, true).expect("grid");
    let field = FieldAccumulator::new(FieldConfig {
        falloff: 12.0,
        cutoff: 0.01,
        core_boost: 1.0,
        isolation: 0.5,
        dither: 0.0,
    })
    .expect("field config");
    field.add_ball(&mut grid, Vec3::new(-0.25, 0.0, 0.0), 1.5, Vec3::X);
    field.add_ball(&mut grid, Vec3::new(0.25, 0.05, 0.0), 1.5, Vec3::Z);

    let mesh = MarchingCubes::new().extract(&grid, 0.5).expect("extract");
    assert!(!mesh.is_empty());
    assert_closed_and_oriented(&mesh);

    // Colors blend between the two sources.
    let colors = mesh.colors.as_ref().expect("colors");
    assert!(colors.iter().any(|c| c.x > 0.1 && c.z > 0.1));
}
