//! The scene graph: camera, lights, meshes and the per-frame hooks mutating them.
//!
//! [`SceneGraph`] is a cheap, clonable handle to one scene. It carries two
//! one-way states:
//!
//! - ready: `not-ready -> ready`, observable via [`SceneGraph::when_ready`]
//! - disposed: `alive -> disposed`, terminal
//!
//! Once disposed, every mutating entry point refuses to act (`None` / `false`),
//! so a late asset attach or a late frame cannot touch a torn down scene.

use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::{Rc, Weak},
};

use crate::{error::DisposedRace, observable::Observable};

pub mod camera;
pub mod debug;
pub mod light;
pub mod mesh;

pub use camera::ArcRotateCamera;
pub use debug::DebugLayer;
pub use light::HemisphericLight;
pub use mesh::{Mesh, MeshData, MeshId, Transform};

/// Handle of a registered before-render hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// Runs once per frame before the scene is drawn.
pub type BeforeRender = Box<dyn FnMut(&mut SceneData)>;

/// Everything a scene contains.
#[derive(Default)]
pub struct SceneData {
    pub camera: Option<ArcRotateCamera>,
    pub lights: Vec<HemisphericLight>,
    pub debug_layer: DebugLayer,
    meshes: Vec<(MeshId, Mesh)>,
    next_mesh: u64,
    hooks: Vec<(HookId, BeforeRender)>,
    next_hook: u64,
}

impl Debug for SceneData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneData")
            .field("camera", &self.camera)
            .field("lights", &self.lights)
            .field("meshes", &self.meshes.len())
            .field("hooks", &self.hooks.len())
            .field("debug_layer", &self.debug_layer)
            .finish()
    }
}

impl SceneData {
    /// Add `mesh` and return its new id.
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.next_mesh);
        self.next_mesh += 1;
        self.meshes.push((id, mesh));
        id
    }

    /// The mesh with `id`, if still present.
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.iter().find(|(i, _)| *i == id).map(|(_, m)| m)
    }

    /// Mutable access to the mesh with `id`.
    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|(i, _)| *i == id).map(|(_, m)| m)
    }

    /// Id of the first mesh called `name`.
    pub fn find_mesh(&self, name: &str) -> Option<MeshId> {
        self.meshes
            .iter()
            .find(|(_, m)| m.name == name)
            .map(|(id, _)| *id)
    }

    /// All meshes in insertion order.
    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Mesh)> {
        self.meshes.iter().map(|(id, m)| (*id, m))
    }

    /// Number of meshes.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    fn remove_mesh(&mut self, id: MeshId) -> Option<Mesh> {
        let idx = self.meshes.iter().position(|(i, _)| *i == id)?;
        Some(self.meshes.remove(idx).1)
    }

    /// Run `hook` every frame before drawing.
    pub fn register_before_render(&mut self, hook: impl FnMut(&mut SceneData) + 'static) -> HookId {
        let id = HookId(self.next_hook);
        self.next_hook += 1;
        self.hooks.push((id, Box::new(hook)));
        id
    }

    /// Remove hook `id`. Returns `false` if it was not registered.
    pub fn unregister_before_render(&mut self, id: HookId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(i, _)| *i != id);
        self.hooks.len() != before
    }

    /// Number of registered before-render hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    fn run_before_render(&mut self) {
        let mut hooks = std::mem::take(&mut self.hooks);
        for (_, hook) in hooks.iter_mut() {
            hook(self);
        }
        // hooks registered while the pass ran
        hooks.append(&mut self.hooks);
        self.hooks = hooks;
    }
}

/// Ticket handed to an asset load; only the newest ticket may attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LoadTicket(u64);

struct SceneInner {
    data: RefCell<SceneData>,
    ready: Cell<bool>,
    disposed: Cell<bool>,
    on_ready: Observable<SceneGraph>,
    on_mesh_disposed: Observable<MeshId>,
    latest_load: Cell<u64>,
    loads_in_flight: Cell<usize>,
}

/// Shared handle to one scene. Clones refer to the same scene.
#[derive(Clone)]
pub struct SceneGraph {
    inner: Rc<SceneInner>,
}

impl Debug for SceneGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneGraph")
            .field("ready", &self.inner.ready.get())
            .field("disposed", &self.inner.disposed.get())
            .field("meshes", &self.mesh_count())
            .finish()
    }
}

impl SceneGraph {
    pub(crate) fn new() -> Self {
        Self {
            inner: Rc::new(SceneInner {
                data: RefCell::new(SceneData::default()),
                ready: Cell::new(false),
                disposed: Cell::new(false),
                on_ready: Observable::new(),
                on_mesh_disposed: Observable::new(),
                latest_load: Cell::new(0),
                loads_in_flight: Cell::new(0),
            }),
        }
    }

    /// A non-owning handle for async continuations and listeners.
    pub fn downgrade(&self) -> WeakScene {
        WeakScene(Rc::downgrade(&self.inner))
    }

    /// `true` if both handles refer to the same scene.
    pub fn ptr_eq(&self, other: &SceneGraph) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// `true` once [`mark_ready`](Self::mark_ready) ran.
    pub fn is_ready(&self) -> bool {
        self.inner.ready.get()
    }

    /// Flip to ready and notify waiters. Returns `false` if already ready or disposed.
    pub fn mark_ready(&self) -> bool {
        if self.is_disposed() || self.inner.ready.replace(true) {
            return false;
        }
        log::info!("Scene is ready");
        self.inner.on_ready.notify(self);
        self.inner.on_ready.clear();
        true
    }

    /// Run `callback` now if the scene is ready, otherwise once when it becomes ready.
    pub fn when_ready(&self, callback: impl Fn(&SceneGraph) + 'static) {
        if self.is_disposed() {
            return;
        }
        if self.is_ready() {
            callback(self);
        } else {
            self.inner.on_ready.add_once(callback);
        }
    }

    /// `true` once [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub(crate) fn ensure_alive(&self) -> Result<(), DisposedRace> {
        if self.is_disposed() {
            Err(DisposedRace)
        } else {
            Ok(())
        }
    }

    /// Release every mesh, light, camera and hook. Returns `false` if already disposed.
    pub fn dispose(&self) -> bool {
        if self.inner.disposed.replace(true) {
            return false;
        }
        let released: Vec<MeshId> = {
            let mut data = self.inner.data.borrow_mut();
            let ids = data.meshes.iter().map(|(id, _)| *id).collect();
            data.meshes.clear();
            data.hooks.clear();
            data.lights.clear();
            data.camera = None;
            data.debug_layer.hide();
            ids
        };
        for id in &released {
            self.inner.on_mesh_disposed.notify(id);
        }
        self.inner.on_ready.clear();
        self.inner.on_mesh_disposed.clear();
        log::info!("Scene disposed ({} meshes released)", released.len());
        true
    }

    /// Read access. A disposed scene reads as empty.
    pub fn with<R>(&self, f: impl FnOnce(&SceneData) -> R) -> R {
        f(&*self.inner.data.borrow())
    }

    /// Write access, refused once disposed.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut SceneData) -> R) -> Option<R> {
        self.ensure_alive().ok()?;
        Some(f(&mut *self.inner.data.borrow_mut()))
    }

    /// Add `mesh`. `None` once disposed.
    pub fn add_mesh(&self, mesh: Mesh) -> Option<MeshId> {
        self.with_mut(|data| data.add_mesh(mesh))
    }

    /// Returns `true` only for the call that actually removed the mesh.
    pub fn dispose_mesh(&self, id: MeshId) -> bool {
        let removed = self.with_mut(|data| data.remove_mesh(id)).flatten();
        match removed {
            Some(mesh) => {
                log::debug!("Disposed mesh {}", mesh.name);
                self.inner.on_mesh_disposed.notify(&id);
                true
            }
            None => false,
        }
    }

    /// Number of meshes. Zero once disposed.
    pub fn mesh_count(&self) -> usize {
        self.with(|data| data.mesh_count())
    }

    /// Notified with the id of every mesh removed from the scene.
    pub fn on_mesh_disposed(&self) -> &Observable<MeshId> {
        &self.inner.on_mesh_disposed
    }

    /// Run `hook` every frame before drawing. `None` once disposed.
    pub fn register_before_render(&self, hook: impl FnMut(&mut SceneData) + 'static) -> Option<HookId> {
        self.with_mut(|data| data.register_before_render(hook))
    }

    /// Remove hook `id`. Returns `false` if it was not registered.
    pub fn unregister_before_render(&self, id: HookId) -> bool {
        self.with_mut(|data| data.unregister_before_render(id))
            .unwrap_or(false)
    }

    /// Runs the before-render hooks. Hooks receive the scene data directly
    /// and must not call back into this handle.
    pub fn run_before_render(&self) {
        if self.ensure_alive().is_ok() {
            self.inner.data.borrow_mut().run_before_render();
        }
    }

    /// Returns `None` if the scene was disposed, `false` if the debug layer is now hidden.
    pub fn toggle_debug_layer(&self) -> Option<bool> {
        self.with_mut(|data| data.debug_layer.toggle())
    }

    pub(crate) fn begin_load(&self) -> LoadTicket {
        let ticket = self.inner.latest_load.get() + 1;
        self.inner.latest_load.set(ticket);
        self.inner
            .loads_in_flight
            .set(self.inner.loads_in_flight.get() + 1);
        LoadTicket(ticket)
    }

    pub(crate) fn finish_load(&self) {
        let in_flight = self.inner.loads_in_flight.get();
        self.inner.loads_in_flight.set(in_flight.saturating_sub(1));
    }

    pub(crate) fn is_latest_load(&self, ticket: LoadTicket) -> bool {
        self.inner.latest_load.get() == ticket.0
    }

    /// Loads started on this scene that have not resolved yet.
    pub fn loads_in_flight(&self) -> usize {
        self.inner.loads_in_flight.get()
    }
}

/// Non-owning reference used by async continuations and input listeners.
#[derive(Clone, Debug, Default)]
pub struct WeakScene(Weak<SceneInner>);

impl WeakScene {
    /// `None` once the scene was dropped or disposed.
    pub fn upgrade(&self) -> Option<SceneGraph> {
        let scene = SceneGraph {
            inner: self.0.upgrade()?,
        };
        scene.ensure_alive().ok()?;
        Some(scene)
    }
}
