//! glTF 2.0 (`.gltf` and binary `.glb`) model loading.

use std::rc::Rc;

use cgmath::{Matrix, Matrix3, Matrix4, SquareMatrix, Transform as _};
use futures::{FutureExt, future::LocalBoxFuture};

use super::{LoadedAsset, ModelLoader, fetch::{Fetch, resolve_relative}};
use crate::{
    error::LoadError,
    scene::{Mesh, MeshData, Transform},
};

/// Loads every triangle mesh of a glTF file. Materials, textures and
/// animations are ignored.
pub struct GltfLoader<F> {
    fetch: Rc<F>,
}

impl<F: Fetch + 'static> GltfLoader<F> {
    /// Load models through `fetch`.
    pub fn new(fetch: F) -> Self {
        Self {
            fetch: Rc::new(fetch),
        }
    }
}

impl<F: Fetch + 'static> ModelLoader for GltfLoader<F> {
    fn import(&self, source: &str) -> LocalBoxFuture<'static, Result<LoadedAsset, LoadError>> {
        let fetch = self.fetch.clone();
        let source = source.to_string();
        async move {
            let bytes = fetch.fetch(&source).await?;
            let gltf = parse(&source, &bytes)?;
            let buffers = load_buffers(fetch.as_ref(), &source, &gltf).await?;
            let meshes = read_meshes(&source, &gltf, &buffers)?;
            if meshes.is_empty() {
                return Err(LoadError::NoMeshes(source));
            }
            log::debug!("{}: {} meshes", source, meshes.len());
            Ok(LoadedAsset { meshes })
        }
        .boxed_local()
    }
}

fn parse(source: &str, bytes: &[u8]) -> Result<::gltf::Gltf, LoadError> {
    ::gltf::Gltf::from_slice(bytes).map_err(|e| LoadError::Parse {
        uri: source.to_string(),
        reason: e.to_string(),
    })
}

async fn load_buffers<F: Fetch + ?Sized>(
    fetch: &F,
    source: &str,
    gltf: &::gltf::Gltf,
) -> Result<Vec<Vec<u8>>, LoadError> {
    let mut buffer_data = Vec::new();
    for buffer in gltf.buffers() {
        match buffer.source() {
            ::gltf::buffer::Source::Bin => match gltf.blob.as_deref() {
                Some(blob) => buffer_data.push(blob.to_vec()),
                None => {
                    return Err(LoadError::Parse {
                        uri: source.to_string(),
                        reason: "binary chunk referenced but missing".to_string(),
                    });
                }
            },
            ::gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                return Err(LoadError::Parse {
                    uri: source.to_string(),
                    reason: "embedded data URIs are not supported".to_string(),
                });
            }
            ::gltf::buffer::Source::Uri(uri) => {
                let bin = fetch.fetch(&resolve_relative(source, uri)).await?;
                buffer_data.push(bin);
            }
        }
    }
    Ok(buffer_data)
}

fn read_meshes(source: &str, gltf: &::gltf::Gltf, buffers: &[Vec<u8>]) -> Result<Vec<Mesh>, LoadError> {
    let mut meshes = Vec::new();
    let scene = gltf.default_scene().or_else(|| gltf.scenes().next());
    match scene {
        Some(scene) => {
            for node in scene.nodes() {
                visit(node, Matrix4::identity(), buffers, &mut meshes)?;
            }
        }
        // no scene at all: take the meshes as they are
        None => {
            for mesh in gltf.meshes() {
                let name = mesh
                    .name()
                    .map_or_else(|| format!("mesh{}", mesh.index()), str::to_string);
                let data = read_mesh_data(&mesh, buffers, Matrix4::identity())?;
                meshes.push(Mesh::new(name, data));
            }
        }
    }
    if meshes.iter().all(|m| m.data.positions.is_empty()) && !meshes.is_empty() {
        return Err(LoadError::Parse {
            uri: source.to_string(),
            reason: "meshes carry no vertex positions".to_string(),
        });
    }
    Ok(meshes)
}

/// Meshes get their node's world transform. When it is a plain
/// translate-rotate-scale it becomes the mesh [`Transform`] and the vertices
/// stay as stored; otherwise (shear from non-uniform scale up the hierarchy)
/// it is baked into the vertices and the mesh keeps the identity transform.
fn visit(
    node: ::gltf::Node<'_>,
    parent: Matrix4<f32>,
    buffers: &[Vec<u8>],
    out: &mut Vec<Mesh>,
) -> Result<(), LoadError> {
    let world = parent * Matrix4::from(node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        let name = mesh
            .name()
            .or(node.name())
            .map_or_else(|| format!("mesh{}", mesh.index()), str::to_string);
        let placed = match world_transform(world) {
            Some(transform) => {
                Mesh::new(name, read_mesh_data(&mesh, buffers, Matrix4::identity())?)
                    .with_transform(transform)
            }
            None => Mesh::new(name, read_mesh_data(&mesh, buffers, world)?),
        };
        out.push(placed);
    }
    for child in node.children() {
        visit(child, world, buffers, out)?;
    }
    Ok(())
}

/// `world` as a [`Transform`], or `None` if the decomposition does not
/// reproduce it.
fn world_transform(world: Matrix4<f32>) -> Option<Transform> {
    let (translation, [x, y, z, w], scale) = ::gltf::scene::Transform::Matrix {
        matrix: world.into(),
    }
    .decomposed();
    let transform = Transform {
        position: translation.into(),
        rotation: cgmath::Quaternion::new(w, x, y, z),
        scale: scale.into(),
    };
    let rebuilt = transform.to_matrix();
    let matches = (0..4).all(|col| {
        (0..4).all(|row| {
            let expected = world[col][row];
            (rebuilt[col][row] - expected).abs() <= 1e-4 * (1.0 + expected.abs())
        })
    });
    matches.then_some(transform)
}

fn read_mesh_data(
    mesh: &::gltf::Mesh<'_>,
    buffers: &[Vec<u8>],
    bake: Matrix4<f32>,
) -> Result<MeshData, LoadError> {
    let mut data = MeshData::default();
    let normal_matrix = bake
        .invert()
        .map(|m| {
            let m = m.transpose();
            Matrix3::from_cols(m.x.truncate(), m.y.truncate(), m.z.truncate())
        })
        .unwrap_or_else(Matrix3::identity);
    let identity = bake == Matrix4::identity();

    for primitive in mesh.primitives() {
        if primitive.mode() != ::gltf::mesh::Mode::Triangles {
            log::warn!(
                "Skipping primitive {} of mesh {:?}: mode {:?} is not supported",
                primitive.index(),
                mesh.name(),
                primitive.mode()
            );
            continue;
        }
        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_slice()));
        let Some(positions) = reader.read_positions() else {
            continue;
        };
        let base = data.positions.len() as u32;
        let positions: Vec<[f32; 3]> = positions
            .map(|p| {
                if identity {
                    p
                } else {
                    bake.transform_point(cgmath::Point3::from(p)).into()
                }
            })
            .collect();
        let count = positions.len() as u32;

        let mut normals: Vec<[f32; 3]> = reader
            .read_normals()
            .map(|n| {
                n.map(|n| {
                    if identity {
                        n
                    } else {
                        use cgmath::InnerSpace;
                        (normal_matrix * cgmath::Vector3::from(n)).normalize().into()
                    }
                })
                .collect()
            })
            .unwrap_or_default();
        if normals.len() != positions.len() {
            normals.clear();
        }

        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().map(|i| i + base).collect(),
            None => (base..base + count).collect(),
        };

        // once one primitive lacks normals the whole mesh goes without
        let keep_normals = !normals.is_empty() && data.normals.len() == data.positions.len();
        data.positions.extend(positions);
        if keep_normals {
            data.normals.extend(normals);
        } else {
            data.normals.clear();
        }
        data.indices.extend(indices);
    }
    Ok(data)
}
