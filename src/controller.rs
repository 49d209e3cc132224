//! Mount and unmount of one scene onto one surface.
//!
//! [`LifecycleController::start`] builds, in order: the device handle, the
//! scene graph, camera/light/static meshes, the resize and debug-toggle
//! listeners and the render loop; then marks the scene ready and kicks off the
//! asset load. [`LifecycleController::stop`] tears down in reverse and never
//! waits for the load.
//!
//! All state lives in the controller instance. Two controllers mounted on two
//! surfaces are fully independent.

use std::rc::Rc;

use futures::task::LocalSpawn;

use crate::{
    engine::{BackendFactory, Engine, GraphicsBackend},
    error::{InitializationError, LoadError},
    events::{EventKind, EventTarget, HostEvent, Listener},
    loader::{AssetLoader, AttachPlan, ModelLoader},
    options::{MountOptions, ScenePreset},
    render_loop::{RenderLoopDriver, scene_frame},
    scene::{ArcRotateCamera, HemisphericLight, Mesh, MeshData, MeshId, SceneGraph, Transform},
    status::{Status, StatusChannel},
    surface::SurfaceHandle,
};

/// What `start` hands back: the live device handle and scene.
pub struct ControllerHandle<B> {
    pub engine: Engine<B>,
    pub scene: SceneGraph,
}

impl<B> Clone for ControllerHandle<B> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            scene: self.scene.clone(),
        }
    }
}

impl<B> std::fmt::Debug for ControllerHandle<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("engine", &self.engine)
            .field("scene", &self.scene)
            .finish()
    }
}

struct Mounted<B: GraphicsBackend + 'static, L> {
    engine: Engine<B>,
    scene: SceneGraph,
    render_loop: RenderLoopDriver<B>,
    resize_listener: Listener,
    debug_listener: Listener,
    assets: AssetLoader<L>,
    plan: AttachPlan,
}

/// Owns everything one mounted scene needs and tears it down in order.
pub struct LifecycleController<F: BackendFactory, L: ModelLoader + 'static> {
    host: Rc<EventTarget>,
    factory: F,
    loader: Rc<L>,
    spawner: Rc<dyn LocalSpawn>,
    status: StatusChannel,
    mounted: Option<Mounted<F::Backend, L>>,
}

impl<F: BackendFactory, L: ModelLoader + 'static> LifecycleController<F, L> {
    /// `host` delivers resize and keyboard signals, `spawner` runs asset loads.
    pub fn new(host: Rc<EventTarget>, factory: F, loader: L, spawner: Rc<dyn LocalSpawn>) -> Self {
        Self {
            host,
            factory,
            loader: Rc::new(loader),
            spawner,
            status: StatusChannel::new(),
            mounted: None,
        }
    }

    /// Publish to `status` instead of a private channel.
    pub fn with_status(mut self, status: StatusChannel) -> Self {
        self.status = status;
        self
    }

    /// Mount a scene on `surface`. Calling it again while mounted returns the
    /// existing handle and builds nothing.
    pub fn start(
        &mut self,
        surface: Rc<dyn SurfaceHandle>,
        options: MountOptions,
    ) -> Result<ControllerHandle<F::Backend>, InitializationError> {
        if let Some(handle) = self.handle() {
            log::debug!("start called on a mounted controller, ignored");
            return Ok(handle);
        }
        self.status.publish(Status::Initializing);

        let engine = Engine::new(&self.factory, surface, options.engine.clone())?;
        let scene = match engine.create_scene() {
            Ok(scene) => scene,
            Err(e) => {
                log::error!("Scene creation failed: {}", e);
                engine.dispose();
                return Err(e);
            }
        };
        let placeholder = build_static_content(&scene, &options.scene);

        let resize_listener = resize_listener(&engine);
        self.host.add_listener(EventKind::Resize, &resize_listener);
        let debug_listener = debug_listener(&scene, options.debug_toggle);
        self.host.add_listener(EventKind::KeyDown, &debug_listener);

        let render_loop = RenderLoopDriver::start(&engine, scene_frame(scene.clone(), options.on_render.clone()));

        let status = self.status.clone();
        let on_scene_ready = options.on_scene_ready.clone();
        scene.when_ready(move |scene| {
            status.publish(Status::SceneReady);
            if let Some(callback) = &on_scene_ready {
                callback(scene);
            }
        });
        scene.mark_ready();

        let mounted = Mounted {
            engine: engine.clone(),
            scene: scene.clone(),
            render_loop,
            resize_listener,
            debug_listener,
            assets: AssetLoader::new(self.loader.clone(), options.load_policy),
            plan: AttachPlan {
                placeholder,
                lift: Some(options.scene.asset_lift),
                spin_per_frame: options.scene.spin_per_frame,
            },
        };
        self.mounted = Some(mounted);
        log::info!("Scene mounted");

        if let Some(source) = &options.asset_source {
            // load failures are published, never returned from start
            if let Err(e) = self.load(source) {
                self.status.publish_load_error(&e);
            }
        }
        Ok(ControllerHandle { engine, scene })
    }

    /// Load `source` into the mounted scene in the background.
    ///
    /// The outcome is published on the status channel. Fails right away,
    /// without publishing, when nothing is mounted or the load policy refuses
    /// the call.
    pub fn load(&self, source: &str) -> Result<(), LoadError> {
        let Some(mounted) = &self.mounted else {
            log::warn!("Cannot load {} without a mounted scene", source);
            return Err(LoadError::Cancelled);
        };
        mounted
            .assets
            .spawn(
                self.spawner.as_ref(),
                &mounted.scene,
                source,
                mounted.plan.clone(),
                self.status.clone(),
            )
            .inspect_err(|e| log::warn!("Loading {} could not start: {}", source, e))
    }

    /// Unmount. Returns `false` if nothing was mounted.
    pub fn stop(&mut self) -> bool {
        let Some(mut mounted) = self.mounted.take() else {
            return false;
        };
        self.host.remove_listener(EventKind::Resize, &mounted.resize_listener);
        self.host.remove_listener(EventKind::KeyDown, &mounted.debug_listener);
        mounted.render_loop.stop();
        if !mounted.scene.is_disposed() {
            mounted.scene.dispose();
        }
        mounted.engine.dispose();
        self.status.publish(Status::Stopped);
        log::info!("Scene unmounted");
        true
    }

    /// `true` between a successful `start` and the next `stop`.
    pub fn is_mounted(&self) -> bool {
        self.mounted.is_some()
    }

    /// Engine and scene of the current mount, if any.
    pub fn handle(&self) -> Option<ControllerHandle<F::Backend>> {
        self.mounted.as_ref().map(|m| ControllerHandle {
            engine: m.engine.clone(),
            scene: m.scene.clone(),
        })
    }

    /// The channel this controller publishes to.
    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    /// The signal target the listeners are registered on.
    pub fn host(&self) -> &Rc<EventTarget> {
        &self.host
    }
}

impl<F: BackendFactory, L: ModelLoader + 'static> Drop for LifecycleController<F, L> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Camera, light, ground and placeholder. Returns the placeholder's id.
fn build_static_content(scene: &SceneGraph, preset: &ScenePreset) -> Option<MeshId> {
    scene
        .with_mut(|data| {
            let [x, y, z] = preset.camera_target;
            data.camera = Some(ArcRotateCamera::new(
                "camera",
                preset.camera_alpha,
                preset.camera_beta,
                preset.camera_radius,
                cgmath::Point3::new(x, y, z),
            ));
            data.lights.push(
                HemisphericLight::new("light", preset.light_direction.into())
                    .with_intensity(preset.light_intensity),
            );
            if let Some((width, depth)) = preset.ground {
                data.add_mesh(Mesh::new("ground", MeshData::ground(width, depth)));
            }
            preset.placeholder_size.map(|size| {
                data.add_mesh(
                    Mesh::new("box", MeshData::cuboid(size))
                        .with_transform(Transform::at(0.0, preset.placeholder_height, 0.0)),
                )
            })
        })
        .flatten()
}

fn resize_listener<B: GraphicsBackend + 'static>(engine: &Engine<B>) -> Listener {
    let engine = engine.downgrade();
    Rc::new(move |_: &HostEvent| match engine.upgrade() {
        Some(engine) => engine.resize(),
        None => log::debug!("Resize after the engine was disposed, ignored"),
    })
}

fn debug_listener(scene: &SceneGraph, combo: crate::events::KeyCombo) -> Listener {
    let scene = scene.downgrade();
    Rc::new(move |event: &HostEvent| {
        let HostEvent::KeyDown(pressed) = event else {
            return;
        };
        if *pressed != combo {
            return;
        }
        let Some(scene) = scene.upgrade() else {
            log::debug!("Debug toggle after the scene was disposed, ignored");
            return;
        };
        if let Some(visible) = scene.toggle_debug_layer() {
            log::info!("Debug layer {}", if visible { "shown" } else { "hidden" });
        }
    })
}
