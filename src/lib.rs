// Animated metaball blob: node simulation, field accumulation, marching cubes.
// The blob core is plain data in, plain data out; engine::{input, camera,
// debug_overlay} are the viewer glue that main.rs drives.

pub mod engine;

pub use engine::{BlobConfig, BlobEngine, BlobError, BlobMesh, BlobResult, Mood};
