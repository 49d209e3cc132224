//! Continuous redraw of one scene, driven by the engine's frame scheduler.

use crate::{
    engine::{Engine, GraphicsBackend, RenderLoopId},
    options::SceneCallback,
    scene::SceneGraph,
};

/// A registered render loop. Stopping is synchronous: once [`stop`](Self::stop)
/// returns the callback is never invoked again, even if the host keeps ticking.
#[derive(Debug)]
pub struct RenderLoopDriver<B: GraphicsBackend + 'static> {
    engine: Engine<B>,
    id: Option<RenderLoopId>,
}

impl<B: GraphicsBackend + 'static> RenderLoopDriver<B> {
    /// Register `frame_callback` on `engine`.
    pub fn start(engine: &Engine<B>, frame_callback: impl FnMut(&Engine<B>) + 'static) -> Self {
        let id = engine.run_render_loop(frame_callback);
        log::debug!("Render loop {:?} started", id);
        Self {
            engine: engine.clone(),
            id: Some(id),
        }
    }

    /// Unregister the loop. Calling it again does nothing.
    pub fn stop(&mut self) {
        if let Some(id) = self.id.take() {
            self.engine.stop_render_loop(id);
            log::debug!("Render loop {:?} stopped", id);
        }
    }

    /// `true` until stopped.
    pub fn is_running(&self) -> bool {
        self.id.is_some_and(|id| self.engine.is_running(id))
    }
}

impl<B: GraphicsBackend + 'static> Drop for RenderLoopDriver<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The per-frame callback drawing `scene`.
///
/// A frame that arrives after the scene was disposed does nothing. Render
/// errors are logged and the loop keeps running.
pub fn scene_frame<B: GraphicsBackend + 'static>(
    scene: SceneGraph,
    on_render: Option<SceneCallback>,
) -> impl FnMut(&Engine<B>) + 'static {
    move |engine: &Engine<B>| {
        if scene.ensure_alive().is_err() {
            log::debug!("Frame arrived after the scene was disposed, skipped");
            return;
        }
        if let Some(on_render) = &on_render {
            on_render(&scene);
            if scene.ensure_alive().is_err() {
                log::debug!("Scene was disposed by its render callback, frame skipped");
                return;
            }
        }
        scene.run_before_render();
        if let Err(e) = engine.render(&scene) {
            log::error!("Unable to render {}", e);
        }
        if engine.stats_due() && scene.with(|data| data.debug_layer.is_visible()) {
            log::info!(
                "{:.1} fps, {} meshes, frame {}",
                engine.fps(),
                scene.mesh_count(),
                engine.frame_count()
            );
        }
    }
}
