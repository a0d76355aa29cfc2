// Blob mesh: the per-frame output of the mesher.
//
// Plain data only. The renderer decides how to mirror it on the GPU; the
// GpuVertex packing below is what the demo uploads.

use glam::{Vec2, Vec3};

// ============================================================================
// GPU VERTEX
// ============================================================================

/// GPU-ready vertex:
///   @location(0) position: vec3<f32>
///   @location(1) normal:   vec3<f32>
///   @location(2) color:    vec3<f32>
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuVertex {
    pub position: [f32; 3],
    pub normal:   [f32; 3],
    pub color:    [f32; 3],
}

impl GpuVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<GpuVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

// ============================================================================
// BLOB MESH
// ============================================================================

/// Indexed triangle list with per-vertex normals and optional colors/UVs.
/// Vertices are shared between neighboring cubes, triangles wind CCW seen
/// from outside the surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobMesh {
    pub positions: Vec<Vec3>,
    pub normals:   Vec<Vec3>,
    pub colors:    Option<Vec<Vec3>>,
    pub uvs:       Option<Vec<Vec2>>,
    pub indices:   Vec<u32>,
}

impl BlobMesh {
    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        if let Some(c) = self.colors.as_mut() { c.clear(); }
        if let Some(u) = self.uvs.as_mut() { u.clear(); }
        self.indices.clear();
    }

    pub fn vertex_count(&self) -> usize { self.positions.len() }
    pub fn triangle_count(&self) -> usize { self.indices.len() / 3 }
    pub fn is_empty(&self) -> bool { self.indices.is_empty() }

    /// Triangles as index triples, in emission order.
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Pack for upload. Meshes without colors are shaded white.
    pub fn gpu_vertices(&self) -> Vec<GpuVertex> {
        (0..self.positions.len())
            .map(|i| GpuVertex {
                position: self.positions[i].to_array(),
                normal:   self.normals[i].to_array(),
                color:    self.colors.as_ref().map_or([1.0; 3], |c| c[i].to_array()),
            })
            .collect()
    }

    /// Cast index slice to raw bytes for wgpu buffer upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_defaults_to_white_without_colors() {
        let mesh = BlobMesh {
            positions: vec![Vec3::X, Vec3::Y, Vec3::Z],
            normals: vec![Vec3::Z; 3],
            colors: None,
            uvs: None,
            indices: vec![0, 1, 2],
        };
        let packed = mesh.gpu_vertices();
        assert_eq!(packed.len(), 3);
        assert_eq!(packed[1].position, [0.0, 1.0, 0.0]);
        assert_eq!(packed[2].color, [1.0, 1.0, 1.0]);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.index_bytes().len(), 12);
        assert_eq!(bytemuck::cast_slice::<GpuVertex, u8>(&packed).len(), 3 * 36);
    }

    #[test]
    fn clear_keeps_optional_channels() {
        let mut mesh = BlobMesh {
            positions: vec![Vec3::ZERO],
            normals: vec![Vec3::Y],
            colors: Some(vec![Vec3::ONE]),
            uvs: Some(vec![Vec2::ZERO]),
            indices: vec![],
        };
        mesh.clear();
        assert!(mesh.is_empty());
        assert_eq!(mesh.colors, Some(vec![]));
        assert_eq!(mesh.uvs, Some(vec![]));
    }
}
