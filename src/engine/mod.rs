// Engine module: blob simulation core plus the demo-side glue
// (input, camera, debug overlay) that main.rs drives.

pub mod blob;
pub mod camera;
pub mod config;
pub mod debug_overlay;
pub mod error;
pub mod field;
pub mod input;
pub mod marching_cubes;
pub mod mc_tables;
pub mod mesh;
pub mod mood;
pub mod node;
pub mod noise;
pub mod observer;
pub mod simulator;

// Re-export commonly used items
pub use blob::BlobEngine;
pub use config::BlobConfig;
pub use error::{BlobError, BlobResult};
pub use field::{FieldAccumulator, GridBounds, VoxelGrid};
pub use marching_cubes::MarchingCubes;
pub use mesh::{BlobMesh, GpuVertex};
pub use mood::{ModulationParams, ModulationTable, Mood, MoodPalette};
pub use node::{Node, NodeKind};
pub use observer::{FrameCounters, FrameObserver, FrameStats, NoopObserver};
pub use simulator::NodeSimulator;
