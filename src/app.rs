//! The hosting component: a winit application that mounts one scene on its
//! window and forwards window signals to it.
//!
//! | winit                          | scene                                  |
//! |--------------------------------|----------------------------------------|
//! | `resumed`                      | create window + GPU, then `start`      |
//! | `suspended`                    | `stop`                                 |
//! | `CloseRequested`               | `stop`, exit                           |
//! | `Resized`                      | resize signal                          |
//! | `KeyboardInput` (+ modifiers)  | key-down signal                        |
//! | `RedrawRequested`              | one frame tick, then request the next  |
//!
//! On the web the window is bound to `<canvas id="canvas">` and GPU setup
//! finishes asynchronously through a user event.

use std::{rc::Rc, sync::Arc};

use futures::task::LocalSpawn;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{ModifiersState, PhysicalKey},
    window::Window,
};

use crate::{
    controller::LifecycleController,
    error::{InitializationError, LoadError},
    events::{EventTarget, HostEvent, KeyCombo},
    gpu::{GpuContext, WgpuFactory},
    loader::{GltfLoader, fetch::AssetFetch},
    options::MountOptions,
    status::StatusChannel,
    surface::SurfaceHandle,
};

type SceneController = LifecycleController<WgpuFactory, GltfLoader<AssetFetch>>;

/// Results delivered back to the event loop from async setup.
pub enum AppEvent {
    GpuReady(Result<GpuContext, InitializationError>),
}

impl std::fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GpuReady(Ok(_)) => f.write_str("GpuReady(Ok)"),
            Self::GpuReady(Err(e)) => f.debug_tuple("GpuReady").field(e).finish(),
        }
    }
}

/// The winit host owning the window and the scene controller.
pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[cfg(not(target_arch = "wasm32"))]
    pool: futures::executor::LocalPool,
    #[cfg(target_arch = "wasm32")]
    proxy: winit::event_loop::EventLoopProxy<AppEvent>,
    options: MountOptions,
    host: Rc<EventTarget>,
    status: StatusChannel,
    window: Option<Arc<Window>>,
    controller: Option<SceneController>,
    modifiers: ModifiersState,
}

impl App {
    /// Set up the runtime, the host signal target and the status channel.
    #[allow(unused_variables)]
    pub fn new(event_loop: &EventLoop<AppEvent>, options: MountOptions) -> anyhow::Result<Self> {
        let status = StatusChannel::new();
        status.subscribe(|status| log::info!("{}", status));
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            #[cfg(not(target_arch = "wasm32"))]
            pool: futures::executor::LocalPool::new(),
            #[cfg(target_arch = "wasm32")]
            proxy: event_loop.create_proxy(),
            options,
            host: Rc::new(EventTarget::new()),
            status,
            window: None,
            controller: None,
            modifiers: ModifiersState::empty(),
        })
    }

    /// Status published by the mounted scene.
    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    fn asset_fetch(&self) -> Result<AssetFetch, LoadError> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Ok(AssetFetch::assets(self.async_runtime.handle().clone()))
        }
        #[cfg(target_arch = "wasm32")]
        {
            AssetFetch::assets()
        }
    }

    fn spawner(&self) -> Rc<dyn LocalSpawn> {
        #[cfg(not(target_arch = "wasm32"))]
        {
            Rc::new(self.pool.spawner())
        }
        #[cfg(target_arch = "wasm32")]
        {
            Rc::new(WasmSpawner)
        }
    }

    /// GPU is up: build the controller and mount.
    fn install(&mut self, gpu: GpuContext) {
        let fetch = match self.asset_fetch() {
            Ok(fetch) => fetch,
            Err(e) => {
                log::error!("Assets are unreachable: {}", e);
                return;
            }
        };
        let controller = LifecycleController::new(
            self.host.clone(),
            WgpuFactory::new(Rc::new(gpu)),
            GltfLoader::new(fetch),
            self.spawner(),
        )
        .with_status(self.status.clone());
        self.controller = Some(controller);
        self.mount();
    }

    fn mount(&mut self) {
        let (Some(controller), Some(window)) = (&mut self.controller, &self.window) else {
            return;
        };
        let surface: Rc<dyn SurfaceHandle> = Rc::new(window.clone());
        match controller.start(surface, self.options.clone()) {
            Ok(_) => window.request_redraw(),
            Err(e) => log::error!("Could not mount the scene: {}", e),
        }
    }

    fn unmount(&mut self) {
        if let Some(controller) = &mut self.controller {
            controller.stop();
        }
    }

    fn frame(&mut self) {
        let Some(controller) = &self.controller else {
            return;
        };
        if let Some(handle) = controller.handle() {
            handle.engine.begin_frame();
        }
        // resume loads whose fetch finished
        #[cfg(not(target_arch = "wasm32"))]
        self.pool.run_until_stalled();

        if controller.is_mounted() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            // back from suspension
            self.mount();
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("scene-mount");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|w| w.document())
                .and_then(|d| d.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => {
                    let html_canvas_element = canvas.unchecked_into();
                    window_attributes = window_attributes.with_canvas(Some(html_canvas_element));
                }
                None => log::warn!("No <canvas id=\"{}\"> found, winit creates one", CANVAS_ID),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create a window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(GpuContext::new(window)) {
                Ok(gpu) => self.install(gpu),
                Err(e) => {
                    log::error!("GPU initialisation failed: {}", e);
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                let gpu = GpuContext::new(window).await;
                if proxy.send_event(AppEvent::GpuReady(gpu)).is_err() {
                    log::error!("Event loop closed before the GPU was ready");
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::GpuReady(Ok(gpu)) => self.install(gpu),
            AppEvent::GpuReady(Err(e)) => {
                log::error!("GPU initialisation failed: {}", e);
                event_loop.exit();
            }
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.unmount();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                self.unmount();
                event_loop.exit();
            }
            WindowEvent::Resized(_) => self.host.dispatch(&HostEvent::Resize),
            WindowEvent::ModifiersChanged(modifiers) => self.modifiers = modifiers.state(),
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                if let PhysicalKey::Code(code) = event.physical_key {
                    self.host.dispatch(&HostEvent::KeyDown(KeyCombo {
                        code,
                        ctrl: self.modifiers.control_key(),
                        alt: self.modifiers.alt_key(),
                        shift: self.modifiers.shift_key(),
                    }));
                }
            }
            WindowEvent::RedrawRequested => self.frame(),
            _ => {}
        }
    }
}

/// Runs load tasks on the browser's microtask queue.
#[cfg(target_arch = "wasm32")]
struct WasmSpawner;

#[cfg(target_arch = "wasm32")]
impl LocalSpawn for WasmSpawner {
    fn spawn_local_obj(
        &self,
        future: futures::task::LocalFutureObj<'static, ()>,
    ) -> Result<(), futures::task::SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// Open a window and mount a scene on it with `options`. Returns when the
/// window is closed.
pub fn run(options: MountOptions) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        console_log::init_with_level(log::Level::Info)?;
    }

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    let mut app = App::new(&event_loop, options)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}
