//! Everything that can be configured when mounting a scene.
//!
//! Every recognised option is a named field with a documented default; there
//! is no untyped options bag.

use std::{fmt::Debug, rc::Rc};

use crate::{events::KeyCombo, loader::ConcurrentLoadPolicy, scene::SceneGraph};

/// Device-level flags.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    /// Keep presented frames readable (surface usage gains `COPY_SRC`). Default `false`.
    pub preserve_drawing_buffer: bool,
    /// Allocate a stencil aspect next to the depth buffer. Default `false`.
    pub stencil: bool,
    /// Size the back buffer in physical rather than logical pixels. Default `true`.
    pub adapt_to_device_ratio: bool,
    pub clear_colour: wgpu::Color,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            preserve_drawing_buffer: false,
            stencil: false,
            adapt_to_device_ratio: true,
            clear_colour: wgpu::Color {
                r: 0.2,
                g: 0.2,
                b: 0.3,
                a: 1.0,
            },
        }
    }
}

/// The static content built synchronously on mount.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenePreset {
    pub camera_alpha: f32,
    pub camera_beta: f32,
    pub camera_radius: f32,
    pub camera_target: [f32; 3],
    pub light_direction: [f32; 3],
    pub light_intensity: f32,
    /// `(width, depth)` of the ground plane, `None` for no ground.
    pub ground: Option<(f32, f32)>,
    /// Edge length of the box shown until the asset arrives, `None` for no placeholder.
    pub placeholder_size: Option<f32>,
    pub placeholder_height: f32,
    /// Height the first loaded mesh is raised to.
    pub asset_lift: f32,
    /// Rotation of the first loaded mesh around Y, radians per frame.
    pub spin_per_frame: f32,
}

impl Default for ScenePreset {
    fn default() -> Self {
        Self {
            camera_alpha: std::f32::consts::FRAC_PI_2,
            camera_beta: std::f32::consts::FRAC_PI_3,
            camera_radius: 10.0,
            camera_target: [0.0, 0.0, 0.0],
            light_direction: [0.0, 1.0, 0.0],
            light_intensity: 0.7,
            ground: Some((6.0, 6.0)),
            placeholder_size: Some(2.0),
            placeholder_height: 1.0,
            asset_lift: 1.0,
            spin_per_frame: 0.01,
        }
    }
}

/// Callback receiving the mounted scene.
pub type SceneCallback = Rc<dyn Fn(&SceneGraph)>;

/// Options passed by the hosting component on mount.
#[derive(Clone)]
pub struct MountOptions {
    pub engine: EngineOptions,
    pub scene: ScenePreset,
    /// Model loaded after mount. Default `"cube.glb"`.
    pub asset_source: Option<String>,
    pub load_policy: ConcurrentLoadPolicy,
    /// Key combination toggling the debug layer. Default Ctrl+Alt+I.
    pub debug_toggle: KeyCombo,
    /// Called once when the scene becomes ready.
    pub on_scene_ready: Option<SceneCallback>,
    /// Called every frame after the disposed-state check passed, before drawing.
    pub on_render: Option<SceneCallback>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            scene: ScenePreset::default(),
            asset_source: Some("cube.glb".to_string()),
            load_policy: ConcurrentLoadPolicy::default(),
            debug_toggle: KeyCombo::INSPECTOR,
            on_scene_ready: None,
            on_render: None,
        }
    }
}

impl Debug for MountOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountOptions")
            .field("engine", &self.engine)
            .field("scene", &self.scene)
            .field("asset_source", &self.asset_source)
            .field("load_policy", &self.load_policy)
            .field("debug_toggle", &self.debug_toggle)
            .field("on_scene_ready", &self.on_scene_ready.is_some())
            .field("on_render", &self.on_render.is_some())
            .finish()
    }
}

impl MountOptions {
    /// Replace all device options.
    pub fn with_engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }

    /// Keep presented frames readable.
    pub fn with_preserve_drawing_buffer(mut self, preserve: bool) -> Self {
        self.engine.preserve_drawing_buffer = preserve;
        self
    }

    /// Request a stencil buffer.
    pub fn with_stencil(mut self, stencil: bool) -> Self {
        self.engine.stencil = stencil;
        self
    }

    /// Size the back buffer in physical instead of logical pixels.
    pub fn with_adapt_to_device_ratio(mut self, adapt: bool) -> Self {
        self.engine.adapt_to_device_ratio = adapt;
        self
    }

    /// Replace the static scene content.
    pub fn with_scene(mut self, scene: ScenePreset) -> Self {
        self.scene = scene;
        self
    }

    /// Model loaded after mount, `None` to load nothing.
    pub fn with_asset(mut self, source: Option<impl Into<String>>) -> Self {
        self.asset_source = source.map(Into::into);
        self
    }

    /// How repeated loads into the same scene behave.
    pub fn with_load_policy(mut self, policy: ConcurrentLoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Key combination showing and hiding the debug layer.
    pub fn with_debug_toggle(mut self, combo: KeyCombo) -> Self {
        self.debug_toggle = combo;
        self
    }

    /// Called once when the scene becomes ready.
    pub fn on_scene_ready(mut self, callback: impl Fn(&SceneGraph) + 'static) -> Self {
        self.on_scene_ready = Some(Rc::new(callback));
        self
    }

    /// Called every frame before the scene is drawn.
    pub fn on_render(mut self, callback: impl Fn(&SceneGraph) + 'static) -> Self {
        self.on_render = Some(Rc::new(callback));
        self
    }
}
