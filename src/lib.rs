//! scene-mount
//!
//! Mounts a small 3D scene (arc-rotate camera, hemispheric light, ground, a
//! placeholder box and an asynchronously loaded glTF model) onto a drawable
//! surface, and unmounts it again without leaving listeners, render loops or
//! GPU resources behind. Runs natively and in the browser (WebGL).
//!
//! High-level modules
//! - `controller`: start/stop of one mounted scene, the only owner of its state
//! - `engine`: the device handle and its frame scheduler, generic over the GPU backend
//! - `gpu`: the wgpu backend (surface, depth buffer, pipeline, mesh buffers)
//! - `scene`: scene graph with camera, lights, meshes and per-frame hooks
//! - `loader`: async model loading that races safely against teardown
//! - `render_loop`: per-frame scene drawing with synchronous cancellation
//! - `events`: resize and key-down signals and their listeners
//! - `status`: status channel for the hosting UI
//! - `app`: a winit host wiring window events to a controller
//!

pub mod app;
pub mod controller;
pub mod engine;
pub mod error;
pub mod events;
pub mod gpu;
pub mod loader;
pub mod observable;
pub mod options;
pub mod render_loop;
pub mod scene;
pub mod status;
pub mod surface;

// Re-exports commonly used types for convenience in downstream code.
pub use controller::{ControllerHandle, LifecycleController};
pub use engine::{BackendFactory, Engine, GraphicsBackend};
pub use error::{InitializationError, LoadError, RenderError};
pub use events::{EventKind, EventTarget, HostEvent, KeyCombo};
pub use loader::{ConcurrentLoadPolicy, ModelLoader};
pub use options::{EngineOptions, MountOptions, ScenePreset};
pub use scene::SceneGraph;
pub use status::{Status, StatusChannel};
pub use surface::SurfaceHandle;

/// Browser entry point: mount the default scene on `<canvas id="canvas">`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() -> Result<(), wasm_bindgen::JsValue> {
    app::run(MountOptions::default()).map_err(|e| wasm_bindgen::JsValue::from_str(&e.to_string()))
}
