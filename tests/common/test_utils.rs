use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use futures::{
    FutureExt,
    channel::oneshot,
    executor::LocalPool,
    future::LocalBoxFuture,
    task::LocalSpawn,
};
use scene_mount::{
    BackendFactory, EngineOptions, EventTarget, GraphicsBackend, InitializationError,
    LifecycleController, LoadError, ModelLoader, RenderError, SurfaceHandle,
    engine::Engine,
    loader::{LoadedAsset, fetch::Fetch},
    scene::{Mesh, MeshData, SceneData},
};
use winit::dpi::PhysicalSize;

/// A surface whose size the test changes at will.
pub struct FakeSurface {
    width: Cell<u32>,
    height: Cell<u32>,
    ratio: Cell<f64>,
}

impl FakeSurface {
    pub fn new(width: u32, height: u32, ratio: f64) -> Rc<Self> {
        Rc::new(Self {
            width: Cell::new(width),
            height: Cell::new(height),
            ratio: Cell::new(ratio),
        })
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.width.set(width);
        self.height.set(height);
    }
}

impl SurfaceHandle for FakeSurface {
    fn width(&self) -> u32 {
        self.width.get()
    }

    fn height(&self) -> u32 {
        self.height.get()
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.ratio.get()
    }
}

/// Everything the headless backends were asked to do.
#[derive(Default)]
pub struct BackendLog {
    pub created: Cell<u32>,
    pub prepared: Cell<u32>,
    pub renders: Cell<u32>,
    pub disposed: Cell<u32>,
    pub resizes: RefCell<Vec<PhysicalSize<u32>>>,
    pub last_options: RefCell<Option<EngineOptions>>,
    pub last_mesh_count: Cell<usize>,
    pub fail_create: Cell<bool>,
    pub fail_prepare: Cell<bool>,
    pub fail_render: Cell<bool>,
}

impl BackendLog {
    pub fn resize_count(&self) -> usize {
        self.resizes.borrow().len()
    }
}

pub struct HeadlessFactory {
    pub log: Rc<BackendLog>,
}

pub struct HeadlessBackend {
    log: Rc<BackendLog>,
}

impl BackendFactory for HeadlessFactory {
    type Backend = HeadlessBackend;

    fn create(
        &self,
        _surface: &dyn SurfaceHandle,
        _size: PhysicalSize<u32>,
        options: &EngineOptions,
    ) -> Result<HeadlessBackend, InitializationError> {
        if self.log.fail_create.get() {
            return Err(InitializationError::DeviceRequest("no device in tests".to_string()));
        }
        self.log.created.set(self.log.created.get() + 1);
        *self.log.last_options.borrow_mut() = Some(options.clone());
        Ok(HeadlessBackend {
            log: self.log.clone(),
        })
    }
}

impl GraphicsBackend for HeadlessBackend {
    fn prepare_scene(&mut self) -> Result<(), InitializationError> {
        if self.log.fail_prepare.get() {
            return Err(InitializationError::SceneCreation("out of memory".to_string()));
        }
        self.log.prepared.set(self.log.prepared.get() + 1);
        Ok(())
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        self.log.resizes.borrow_mut().push(size);
    }

    fn render(&mut self, scene: &SceneData) -> Result<(), RenderError> {
        if self.log.fail_render.get() {
            return Err(RenderError::Surface("timeout".to_string()));
        }
        self.log.renders.set(self.log.renders.get() + 1);
        self.log.last_mesh_count.set(scene.mesh_count());
        Ok(())
    }

    fn dispose(&mut self) {
        self.log.disposed.set(self.log.disposed.get() + 1);
    }
}

type Pending = (String, oneshot::Sender<Result<LoadedAsset, LoadError>>);

/// A model loader whose imports stay pending until the test resolves them.
#[derive(Clone, Default)]
pub struct ScriptedLoader {
    pending: Rc<RefCell<Vec<Pending>>>,
    requested: Rc<RefCell<Vec<String>>>,
}

impl ScriptedLoader {
    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.borrow().clone()
    }

    /// Resolve the oldest pending import. Returns `false` if none is pending
    /// or its receiver is gone.
    pub fn resolve_next(&self, result: Result<LoadedAsset, LoadError>) -> bool {
        let next = {
            let mut pending = self.pending.borrow_mut();
            if pending.is_empty() {
                None
            } else {
                Some(pending.remove(0))
            }
        };
        match next {
            Some((_, sender)) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

impl ModelLoader for ScriptedLoader {
    fn import(&self, source: &str) -> LocalBoxFuture<'static, Result<LoadedAsset, LoadError>> {
        let (sender, receiver) = oneshot::channel();
        self.pending.borrow_mut().push((source.to_string(), sender));
        self.requested.borrow_mut().push(source.to_string());
        receiver
            .map(|result| result.unwrap_or(Err(LoadError::Cancelled)))
            .boxed_local()
    }
}

pub fn asset_named(name: &str) -> LoadedAsset {
    LoadedAsset {
        meshes: vec![Mesh::new(name, MeshData::cuboid(1.0))],
    }
}

pub fn cube_asset() -> LoadedAsset {
    asset_named("Cube")
}

pub fn network_error() -> LoadError {
    LoadError::Fetch {
        uri: "cube.glb".to_string(),
        reason: "connection reset".to_string(),
    }
}

/// A controller on a headless backend with everything a test pokes at.
pub struct Harness {
    pub pool: LocalPool,
    pub host: Rc<EventTarget>,
    pub backend: Rc<BackendLog>,
    pub loader: ScriptedLoader,
    pub surface: Rc<FakeSurface>,
    pub controller: LifecycleController<HeadlessFactory, ScriptedLoader>,
}

impl Harness {
    pub fn new() -> Self {
        Self::on_host(Rc::new(EventTarget::new()))
    }

    pub fn on_host(host: Rc<EventTarget>) -> Self {
        let pool = LocalPool::new();
        let backend = Rc::new(BackendLog::default());
        let loader = ScriptedLoader::default();
        let spawner: Rc<dyn LocalSpawn> = Rc::new(pool.spawner());
        let controller = LifecycleController::new(
            host.clone(),
            HeadlessFactory {
                log: backend.clone(),
            },
            loader.clone(),
            spawner,
        );
        Self {
            pool,
            host,
            backend,
            loader,
            surface: FakeSurface::new(800, 600, 1.0),
            controller,
        }
    }

    pub fn surface(&self) -> Rc<dyn SurfaceHandle> {
        self.surface.clone()
    }

    /// Let resolved loads continue.
    pub fn settle(&mut self) {
        self.pool.run_until_stalled();
    }
}

/// Drive `ticks` display refreshes the way the app does.
pub fn tick<B: GraphicsBackend + 'static>(engine: &Engine<B>, pool: &mut LocalPool, ticks: u32) {
    for _ in 0..ticks {
        engine.begin_frame();
        pool.run_until_stalled();
    }
}

/// Serves bytes from memory.
#[derive(Default)]
pub struct MemoryFetch {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryFetch {
    pub fn with(mut self, uri: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(uri.to_string(), bytes);
        self
    }
}

impl Fetch for MemoryFetch {
    fn fetch(&self, uri: &str) -> LocalBoxFuture<'static, Result<Vec<u8>, LoadError>> {
        let result = self.files.get(uri).cloned().ok_or_else(|| LoadError::Fetch {
            uri: uri.to_string(),
            reason: "404 Not Found".to_string(),
        });
        futures::future::ready(result).boxed_local()
    }
}
