//! Mesh geometry and placement.

use cgmath::{One, Rotation3};

/// Identity of a mesh inside one scene graph. Never reused by that scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub(crate) u64);

/// Position, rotation and scale of a mesh, applied in scale-rotate-translate order.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Translation only.
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: cgmath::Vector3::new(x, y, z),
            ..Default::default()
        }
    }

    /// Turn around the world Y axis by `radians`.
    pub fn rotate_y(&mut self, radians: f32) {
        self.rotation = cgmath::Quaternion::from_angle_y(cgmath::Rad(radians)) * self.rotation;
    }

    /// Model matrix: translation * rotation * scale.
    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }
}

/// Triangle list geometry. `normals` is either empty or as long as `positions`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// An axis aligned cube with edge length `size`, centred on the origin.
    pub fn cuboid(size: f32) -> Self {
        let p = size / 2.0;
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-p, -p, p], [p, -p, p], [p, p, p], [-p, p, p]]),
            ([0.0, 0.0, -1.0], [[p, -p, -p], [-p, -p, -p], [-p, p, -p], [p, p, -p]]),
            ([1.0, 0.0, 0.0], [[p, -p, p], [p, -p, -p], [p, p, -p], [p, p, p]]),
            ([-1.0, 0.0, 0.0], [[-p, -p, -p], [-p, -p, p], [-p, p, p], [-p, p, -p]]),
            ([0.0, 1.0, 0.0], [[-p, p, p], [p, p, p], [p, p, -p], [-p, p, -p]]),
            ([0.0, -1.0, 0.0], [[-p, -p, -p], [p, -p, -p], [p, -p, p], [-p, -p, p]]),
        ];
        let mut data = MeshData::default();
        for (normal, corners) in faces {
            let base = data.positions.len() as u32;
            data.positions.extend_from_slice(&corners);
            data.normals.extend_from_slice(&[normal; 4]);
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        data
    }

    /// A flat `width` x `depth` quad in the XZ plane facing up.
    pub fn ground(width: f32, depth: f32) -> Self {
        let (w, d) = (width / 2.0, depth / 2.0);
        MeshData {
            positions: vec![[-w, 0.0, d], [w, 0.0, d], [w, 0.0, -d], [-w, 0.0, -d]],
            normals: vec![[0.0, 1.0, 0.0]; 4],
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles described by `indices`.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Named geometry placed in the scene.
#[derive(Clone, Debug)]
pub struct Mesh {
    pub name: String,
    pub data: MeshData,
    pub transform: Transform,
    pub visible: bool,
}

impl Mesh {
    /// A visible mesh at the origin.
    pub fn new(name: impl Into<String>, data: MeshData) -> Self {
        Self {
            name: name.into(),
            data,
            transform: Transform::default(),
            visible: true,
        }
    }

    /// Place the mesh with `transform`.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }
}
