use glam::Vec3;

/// Triangle mesh with one index list per material slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    positions: Vec<Vec3>,
    submeshes: Vec<Vec<[u32; 3]>>,
}

impl Mesh {
    pub fn new(positions: Vec<Vec3>, submeshes: Vec<Vec<[u32; 3]>>) -> Self {
        Self {
            positions,
            submeshes,
        }
    }

    /// Axis-aligned box whose six faces are dealt round-robin across
    /// `submesh_count` submeshes, so every slot covers some surface.
    pub fn cuboid(min: [f32; 3], max: [f32; 3], submesh_count: usize) -> Self {
        let (min, max) = (Vec3::from(min), Vec3::from(max));
        let positions = vec![
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
        ];
        // front (+z), back, left, right, top, bottom
        let faces: [[u32; 4]; 6] = [
            [4, 5, 6, 7],
            [1, 0, 3, 2],
            [0, 4, 7, 3],
            [5, 1, 2, 6],
            [7, 6, 2, 3],
            [0, 1, 5, 4],
        ];
        let count = submesh_count.max(1);
        let mut submeshes = vec![Vec::new(); count];
        for (face_index, [a, b, c, d]) in faces.into_iter().enumerate() {
            let submesh = &mut submeshes[face_index % count];
            submesh.push([a, b, c]);
            submesh.push([a, c, d]);
        }
        Self::new(positions, submeshes)
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn submeshes(&self) -> &[Vec<[u32; 3]>] {
        &self.submeshes
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

}
