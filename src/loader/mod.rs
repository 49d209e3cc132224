//! Asynchronous model loading into a live scene graph.
//!
//! The fetch and parse steps run as a future on whatever [`LocalSpawn`]
//! executor the host provides. The attach step runs when that future resumes
//! and first checks the scene: a disposed scene, or a newer load for the same
//! scene, makes the result be dropped without touching the graph. Neither
//! case is an error.
//!
//! # Concurrent loads
//!
//! [`ConcurrentLoadPolicy::LatestWins`] lets every call start; only the most
//! recent call attaches. [`ConcurrentLoadPolicy::RejectConcurrent`] fails a
//! call with [`LoadError::Busy`] while another load is in flight.

use std::rc::Rc;

use futures::{
    FutureExt,
    future::LocalBoxFuture,
    task::{LocalSpawn, LocalSpawnExt},
};

use crate::{
    error::LoadError,
    scene::{Mesh, MeshId, SceneGraph},
    status::{Status, StatusChannel},
};

pub mod fetch;
pub mod gltf;

pub use self::fetch::Fetch;
pub use self::gltf::GltfLoader;

/// Meshes materialised from a model file, not yet part of any scene.
#[derive(Clone, Debug, Default)]
pub struct LoadedAsset {
    pub meshes: Vec<Mesh>,
}

/// Turns a source reference into meshes. The file format is the loader's business.
pub trait ModelLoader {
    fn import(&self, source: &str) -> LocalBoxFuture<'static, Result<LoadedAsset, LoadError>>;
}

impl<L: ModelLoader + ?Sized> ModelLoader for Rc<L> {
    fn import(&self, source: &str) -> LocalBoxFuture<'static, Result<LoadedAsset, LoadError>> {
        (**self).import(source)
    }
}

/// What happens when `load` is called while another load is in flight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConcurrentLoadPolicy {
    #[default]
    LatestWins,
    RejectConcurrent,
}

/// What to do with the scene once an asset is attached.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttachPlan {
    /// Mesh disposed once the asset is in place.
    pub placeholder: Option<MeshId>,
    /// Height the first loaded mesh is moved to.
    pub lift: Option<f32>,
    /// Rotation of the first loaded mesh around Y, radians per frame. `0.0` for none.
    pub spin_per_frame: f32,
}

/// Why a finished load did not attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscardReason {
    Disposed,
    Superseded,
}

/// Result of a load that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Attached(Vec<MeshId>),
    Discarded(DiscardReason),
}

/// A load in progress, see [`AssetLoader::load`].
pub type LoadTask = LocalBoxFuture<'static, Result<LoadOutcome, LoadError>>;

/// Starts loads against a scene under a [`ConcurrentLoadPolicy`].
pub struct AssetLoader<L> {
    loader: Rc<L>,
    policy: ConcurrentLoadPolicy,
}

impl<L> Clone for AssetLoader<L> {
    fn clone(&self) -> Self {
        Self {
            loader: self.loader.clone(),
            policy: self.policy,
        }
    }
}

impl<L: ModelLoader + 'static> AssetLoader<L> {
    /// Wrap `loader` with `policy`.
    pub fn new(loader: Rc<L>, policy: ConcurrentLoadPolicy) -> Self {
        Self { loader, policy }
    }

    /// The policy concurrent calls follow.
    pub fn policy(&self) -> ConcurrentLoadPolicy {
        self.policy
    }

    /// Start loading `source` for `scene`. Nothing happens until the task is polled.
    pub fn load(&self, scene: &SceneGraph, source: &str, plan: AttachPlan) -> Result<LoadTask, LoadError> {
        if scene.is_disposed() {
            return Ok(futures::future::ready(Ok(LoadOutcome::Discarded(DiscardReason::Disposed))).boxed_local());
        }
        if self.policy == ConcurrentLoadPolicy::RejectConcurrent && scene.loads_in_flight() > 0 {
            return Err(LoadError::Busy);
        }
        log::info!("Attempting to load {}", source);
        let ticket = scene.begin_load();
        let weak = scene.downgrade();
        let import = self.loader.import(source);
        let source = source.to_string();

        Ok(async move {
            let result = import.await;
            let Some(scene) = weak.upgrade() else {
                log::debug!("{} resolved after the scene was disposed, dropped", source);
                return Ok(LoadOutcome::Discarded(DiscardReason::Disposed));
            };
            scene.finish_load();
            if !scene.is_latest_load(ticket) {
                log::debug!("{} was superseded by a newer load, dropped", source);
                return Ok(LoadOutcome::Discarded(DiscardReason::Superseded));
            }
            let asset = result?;
            if asset.meshes.is_empty() {
                return Err(LoadError::NoMeshes(source));
            }
            Ok(LoadOutcome::Attached(attach(&scene, asset, &plan)))
        }
        .boxed_local())
    }

    /// Fire-and-forget [`load`](Self::load): the outcome goes to `status`.
    pub fn spawn(
        &self,
        spawner: &dyn LocalSpawn,
        scene: &SceneGraph,
        source: &str,
        plan: AttachPlan,
        status: StatusChannel,
    ) -> Result<(), LoadError> {
        let task = self.load(scene, source, plan)?;
        let name = source.to_string();
        let spawned = spawner.spawn_local(async move {
            match task.await {
                Ok(LoadOutcome::Attached(ids)) => {
                    log::info!("{} loaded successfully ({} meshes)", name, ids.len());
                    status.publish(Status::AssetLoaded);
                }
                Ok(LoadOutcome::Discarded(reason)) => {
                    log::debug!("{} discarded ({:?})", name, reason);
                }
                Err(e) => {
                    log::warn!("Loading {} failed: {}", name, e);
                    status.publish_load_error(&e);
                }
            }
        });
        spawned.map_err(|e| {
            scene.finish_load();
            LoadError::Spawn(e.to_string())
        })
    }
}

fn attach(scene: &SceneGraph, asset: LoadedAsset, plan: &AttachPlan) -> Vec<MeshId> {
    let ids: Vec<MeshId> = asset
        .meshes
        .into_iter()
        .filter_map(|mesh| scene.add_mesh(mesh))
        .collect();

    if let Some(placeholder) = plan.placeholder {
        scene.dispose_mesh(placeholder);
    }

    if let Some(&first) = ids.first() {
        if let Some(lift) = plan.lift {
            scene.with_mut(|data| {
                if let Some(mesh) = data.mesh_mut(first) {
                    mesh.transform.position.y = lift;
                }
            });
        }
        let spin = plan.spin_per_frame;
        if spin != 0.0 {
            scene.register_before_render(move |data| {
                if let Some(mesh) = data.mesh_mut(first) {
                    mesh.transform.rotate_y(spin);
                }
            });
        }
    }
    ids
}
