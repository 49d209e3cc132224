//! The device handle: a graphics backend bound to one surface, plus the frame
//! scheduler that drives render loops.
//!
//! # Key types
//!
//! - [`GraphicsBackend`] is the seam to the actual GPU code (see [`crate::gpu`])
//! - [`BackendFactory`] turns a surface and [`EngineOptions`] into a backend
//! - [`Engine`] owns the backend, tracks the surface size and runs the
//!   registered render loops once per [`Engine::begin_frame`]
//!
//! The host calls `begin_frame` once per display refresh. Loops run in
//! registration order and every loop finishes before the next one starts;
//! a loop stopped during a frame is not invoked for the rest of that frame.

use std::{
    cell::{Cell, RefCell},
    fmt::Debug,
    rc::{Rc, Weak},
};

use instant::{Duration, Instant};
use winit::dpi::PhysicalSize;

use crate::{
    error::{InitializationError, RenderError},
    options::EngineOptions,
    scene::{SceneData, SceneGraph},
    surface::{SurfaceHandle, render_size},
};

/// GPU side of a device handle.
pub trait GraphicsBackend {
    /// Allocate whatever a scene needs to be drawn (pipelines, uniform buffers).
    fn prepare_scene(&mut self) -> Result<(), InitializationError>;

    /// Recreate size dependent buffers. `size` is never zero.
    fn resize(&mut self, size: PhysicalSize<u32>);

    fn render(&mut self, scene: &SceneData) -> Result<(), RenderError>;

    /// Release every GPU resource. Called exactly once.
    fn dispose(&mut self);
}

/// Creates a backend for a surface, once per mount.
pub trait BackendFactory {
    type Backend: GraphicsBackend + 'static;

    fn create(
        &self,
        surface: &dyn SurfaceHandle,
        size: PhysicalSize<u32>,
        options: &EngineOptions,
    ) -> Result<Self::Backend, InitializationError>;
}

/// Identifies a registered render loop on one engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderLoopId(u64);

type FrameCallback<B> = Rc<RefCell<dyn FnMut(&Engine<B>)>>;

struct FpsCounter {
    window_start: Instant,
    frames_in_window: u32,
    fps: f32,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    /// Returns `true` when a new measurement was taken.
    fn frame(&mut self) -> bool {
        self.frames_in_window += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed < Self::WINDOW {
            return false;
        }
        self.fps = self.frames_in_window as f32 / elapsed.as_secs_f32();
        self.frames_in_window = 0;
        self.window_start = Instant::now();
        true
    }
}

struct EngineInner<B> {
    backend: RefCell<B>,
    surface: Rc<dyn SurfaceHandle>,
    options: EngineOptions,
    size: Cell<PhysicalSize<u32>>,
    loops: RefCell<Vec<(RenderLoopId, FrameCallback<B>)>>,
    next_loop: Cell<u64>,
    in_frame: Cell<bool>,
    disposed: Cell<bool>,
    frames: Cell<u64>,
    fps: RefCell<FpsCounter>,
    stats_due: Cell<bool>,
}

/// Device handle. Clones share the same backend.
pub struct Engine<B> {
    inner: Rc<EngineInner<B>>,
}

impl<B> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B> Debug for Engine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("size", &self.inner.size.get())
            .field("render_loops", &self.inner.loops.borrow().len())
            .field("frames", &self.inner.frames.get())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl<B: GraphicsBackend + 'static> Engine<B> {
    /// Open a device on `surface`. Fails if the surface has no usable size.
    pub fn new<F>(
        factory: &F,
        surface: Rc<dyn SurfaceHandle>,
        options: EngineOptions,
    ) -> Result<Self, InitializationError>
    where
        F: BackendFactory<Backend = B>,
    {
        if !surface.is_usable() {
            return Err(InitializationError::InvalidSurface {
                width: surface.width(),
                height: surface.height(),
                ratio: surface.device_pixel_ratio(),
            });
        }
        let size = render_size(surface.as_ref(), options.adapt_to_device_ratio);
        let backend = factory.create(surface.as_ref(), size, &options)?;
        log::info!(
            "Engine created at {}x{} (stencil: {}, preserve buffer: {})",
            size.width,
            size.height,
            options.stencil,
            options.preserve_drawing_buffer
        );
        Ok(Self {
            inner: Rc::new(EngineInner {
                backend: RefCell::new(backend),
                surface,
                options,
                size: Cell::new(size),
                loops: RefCell::new(Vec::new()),
                next_loop: Cell::new(0),
                in_frame: Cell::new(false),
                disposed: Cell::new(false),
                frames: Cell::new(0),
                fps: RefCell::new(FpsCounter {
                    window_start: Instant::now(),
                    frames_in_window: 0,
                    fps: 0.0,
                }),
                stats_due: Cell::new(false),
            }),
        })
    }

    /// Create a scene graph drawn by this device.
    pub fn create_scene(&self) -> Result<SceneGraph, InitializationError> {
        if self.is_disposed() {
            return Err(InitializationError::Disposed);
        }
        self.inner.backend.borrow_mut().prepare_scene()?;
        Ok(SceneGraph::new())
    }

    /// Re-read the surface size and resize the backend buffers.
    pub fn resize(&self) {
        if self.is_disposed() {
            log::debug!("Ignoring resize of a disposed engine");
            return;
        }
        let size = render_size(
            self.inner.surface.as_ref(),
            self.inner.options.adapt_to_device_ratio,
        );
        if size.width == 0 || size.height == 0 {
            log::debug!("Ignoring resize to {}x{}", size.width, size.height);
            return;
        }
        self.inner.size.set(size);
        self.inner.backend.borrow_mut().resize(size);
    }

    /// Register `callback` to run once per frame.
    pub fn run_render_loop(&self, callback: impl FnMut(&Engine<B>) + 'static) -> RenderLoopId {
        let id = RenderLoopId(self.inner.next_loop.get());
        self.inner.next_loop.set(id.0 + 1);
        if self.is_disposed() {
            log::warn!("Render loop registered on a disposed engine will never run");
            return id;
        }
        let callback: FrameCallback<B> = Rc::new(RefCell::new(callback));
        self.inner.loops.borrow_mut().push((id, callback));
        id
    }

    /// Once this returns the loop is never invoked again.
    pub fn stop_render_loop(&self, id: RenderLoopId) -> bool {
        let mut loops = self.inner.loops.borrow_mut();
        let before = loops.len();
        loops.retain(|(i, _)| *i != id);
        loops.len() != before
    }

    /// `true` while loop `id` is registered.
    pub fn is_running(&self, id: RenderLoopId) -> bool {
        self.inner.loops.borrow().iter().any(|(i, _)| *i == id)
    }

    /// Number of registered render loops.
    pub fn active_render_loops(&self) -> usize {
        self.inner.loops.borrow().len()
    }

    /// One display refresh: run every registered render loop once.
    pub fn begin_frame(&self) {
        if self.is_disposed() {
            return;
        }
        if self.inner.in_frame.replace(true) {
            log::warn!("begin_frame called from inside a frame, ignored");
            return;
        }
        let snapshot: Vec<(RenderLoopId, FrameCallback<B>)> = self
            .inner
            .loops
            .borrow()
            .iter()
            .map(|(id, cb)| (*id, cb.clone()))
            .collect();
        for (id, callback) in snapshot {
            if self.is_running(id) {
                let mut frame = callback.borrow_mut();
                (&mut *frame)(self);
            }
        }
        self.inner.frames.set(self.inner.frames.get() + 1);
        let rolled = self.inner.fps.borrow_mut().frame();
        self.inner.stats_due.set(rolled);
        self.inner.in_frame.set(false);
    }

    /// Draw `scene` once.
    pub fn render(&self, scene: &SceneGraph) -> Result<(), RenderError> {
        if self.is_disposed() {
            return Err(RenderError::Disposed);
        }
        scene.with(|data| self.inner.backend.borrow_mut().render(data))
    }

    /// Stop every loop and release the backend. Returns `false` if already disposed.
    pub fn dispose(&self) -> bool {
        if self.inner.disposed.replace(true) {
            return false;
        }
        self.inner.loops.borrow_mut().clear();
        self.inner.backend.borrow_mut().dispose();
        log::info!("Engine disposed after {} frames", self.frame_count());
        true
    }

    /// `true` once [`dispose`](Self::dispose) ran.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Current back buffer size in physical pixels.
    pub fn render_size(&self) -> PhysicalSize<u32> {
        self.inner.size.get()
    }

    /// Options the engine was created with.
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Frames ticked since creation.
    pub fn frame_count(&self) -> u64 {
        self.inner.frames.get()
    }

    /// Frames per second over the last measurement window.
    pub fn fps(&self) -> f32 {
        self.inner.fps.borrow().fps
    }

    /// `true` on the frame a new fps measurement was taken.
    pub fn stats_due(&self) -> bool {
        self.inner.stats_due.get()
    }

    /// `true` if both handles refer to the same device.
    pub fn ptr_eq(&self, other: &Engine<B>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// A non-owning handle for listeners.
    pub fn downgrade(&self) -> WeakEngine<B> {
        WeakEngine(Rc::downgrade(&self.inner))
    }
}

/// Non-owning engine handle, see [`Engine::downgrade`].
pub struct WeakEngine<B>(Weak<EngineInner<B>>);

impl<B> Clone for WeakEngine<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: GraphicsBackend + 'static> WeakEngine<B> {
    /// `None` once the engine was dropped or disposed.
    pub fn upgrade(&self) -> Option<Engine<B>> {
        let engine = Engine {
            inner: self.0.upgrade()?,
        };
        (!engine.is_disposed()).then_some(engine)
    }
}
