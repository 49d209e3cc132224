//! Error types for mounting, loading and rendering a scene.
//!
//! Construction failures ([`InitializationError`]) bubble to the caller of
//! [`LifecycleController::start`](crate::controller::LifecycleController::start).
//! Load failures ([`LoadError`]) are contained and published on the status
//! channel. [`DisposedRace`] never leaves the crate.

use thiserror::Error;

/// Creating the device handle or the scene graph failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitializationError {
    #[error("surface handle is unusable ({width}x{height} at ratio {ratio})")]
    InvalidSurface { width: u32, height: u32, ratio: f64 },

    #[error("could not create a render surface: {0}")]
    SurfaceCreation(String),

    #[error("no graphics adapter is compatible with the surface: {0}")]
    NoAdapter(String),

    #[error("the graphics device could not be opened: {0}")]
    DeviceRequest(String),

    #[error("the surface does not support the adapter")]
    UnsupportedSurface,

    #[error("scene resources could not be created: {0}")]
    SceneCreation(String),

    #[error("the device handle was already disposed")]
    Disposed,
}

/// Fetching or parsing a model failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("failed to fetch {uri}: {reason}")]
    Fetch { uri: String, reason: String },

    #[error("failed to parse {uri}: {reason}")]
    Parse { uri: String, reason: String },

    #[error("{0} does not contain any mesh")]
    NoMeshes(String),

    #[error("a load is already in flight for this scene")]
    Busy,

    #[error("the load task could not be spawned: {0}")]
    Spawn(String),

    #[error("the load was cancelled before it produced a result")]
    Cancelled,
}

/// Drawing a single frame failed. Contained by the render loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("surface error: {0}")]
    Surface(String),

    #[error("the device handle was disposed")]
    Disposed,
}

/// A frame, load completion or input callback arrived after disposal.
///
/// Always absorbed by the disposed-state check that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DisposedRace;
