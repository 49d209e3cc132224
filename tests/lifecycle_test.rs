use std::{cell::Cell, rc::Rc};

use scene_mount::{
    ConcurrentLoadPolicy, EventKind, EventTarget, HostEvent, InitializationError, KeyCombo,
    LoadError, MountOptions, Status,
};
use winit::{dpi::PhysicalSize, keyboard::KeyCode};

use crate::common::test_utils::{
    FakeSurface, Harness, asset_named, cube_asset, network_error, tick,
};

mod common;

fn counter() -> (Rc<Cell<u32>>, impl Fn() + 'static) {
    let hits = Rc::new(Cell::new(0));
    let inner = hits.clone();
    (hits, move || inner.set(inner.get() + 1))
}

#[test]
fn every_subscription_is_removed_on_stop() {
    let mut h = Harness::new();
    let surface = h.surface();
    h.controller.start(surface, MountOptions::default()).unwrap();
    assert_eq!(h.host.added(), 2);
    assert_eq!(h.host.listener_count(EventKind::Resize), 1);
    assert_eq!(h.host.listener_count(EventKind::KeyDown), 1);

    assert!(h.controller.stop());
    assert_eq!(h.host.removed(), 2);
    assert_eq!(h.host.listener_count(EventKind::Resize), 0);
    assert_eq!(h.host.listener_count(EventKind::KeyDown), 0);

    // a second mount cycle balances the same way
    let surface = h.surface();
    h.controller.start(surface, MountOptions::default()).unwrap();
    h.controller.stop();
    assert_eq!(h.host.added(), 4);
    assert_eq!(h.host.removed(), 4);
}

#[test]
fn signals_after_stop_reach_nothing() {
    let mut h = Harness::new();
    let surface = h.surface();
    let handle = h.controller.start(surface, MountOptions::default()).unwrap();
    h.controller.stop();

    h.host.dispatch(&HostEvent::Resize);
    h.host.dispatch(&HostEvent::KeyDown(KeyCombo::INSPECTOR));

    assert_eq!(h.backend.resize_count(), 0);
    assert!(!handle.scene.with(|data| data.debug_layer.is_visible()));
}

#[test]
fn start_reports_progress_and_a_loaded_asset_replaces_the_placeholder() {
    let mut h = Harness::new();
    let options = MountOptions::default()
        .with_preserve_drawing_buffer(true)
        .with_stencil(true);
    let surface = h.surface();
    let handle = h.controller.start(surface, options).unwrap();
    let status = h.controller.status().clone();

    assert_eq!(status.history(), vec![Status::Initializing, Status::SceneReady]);
    assert_eq!(status.current().map(|s| s.to_string()).as_deref(), Some("Scene is ready"));
    let device_options = h.backend.last_options.borrow().clone().unwrap();
    assert!(device_options.preserve_drawing_buffer);
    assert!(device_options.stencil);

    let placeholder = handle.scene.with(|data| data.find_mesh("box")).unwrap();
    let released = Rc::new(Cell::new(0));
    let counter = released.clone();
    handle.scene.on_mesh_disposed().add(move |id| {
        if *id == placeholder {
            counter.set(counter.get() + 1);
        }
    });
    assert_eq!(h.loader.requested(), vec!["cube.glb".to_string()]);
    assert_eq!(handle.scene.with(|data| data.hook_count()), 0);

    assert!(h.loader.resolve_next(Ok(cube_asset())));
    h.settle();

    assert_eq!(status.current(), Some(Status::AssetLoaded));
    assert_eq!(
        status.current().map(|s| s.to_string()).as_deref(),
        Some("Cube model loaded successfully!")
    );
    assert_eq!(released.get(), 1);
    let cube = handle.scene.with(|data| data.find_mesh("Cube")).unwrap();
    assert!(handle.scene.with(|data| data.find_mesh("box")).is_none());
    assert_eq!(handle.scene.mesh_count(), 2);
    let lifted = handle.scene.with(|data| data.mesh(cube).map(|m| m.transform.position.y));
    assert_eq!(lifted, Some(1.0));
    assert_eq!(handle.scene.with(|data| data.hook_count()), 1);

    // the spin hook turns the cube every frame
    let before = handle.scene.with(|data| data.mesh(cube).map(|m| m.transform.rotation));
    tick(&handle.engine, &mut h.pool, 3);
    let after = handle.scene.with(|data| data.mesh(cube).map(|m| m.transform.rotation));
    assert_ne!(before, after);
    assert_eq!(h.backend.renders.get(), 3);
    assert_eq!(released.get(), 1);
}

#[test]
fn failed_load_keeps_the_placeholder_and_the_loop_running() {
    let mut h = Harness::new();
    let (frames, on_render) = counter();
    let surface = h.surface();
    let handle = h
        .controller
        .start(surface, MountOptions::default().on_render(move |_| on_render()))
        .unwrap();

    assert!(h.loader.resolve_next(Err(network_error())));
    h.settle();

    let status = h.controller.status();
    assert_eq!(status.current(), Some(Status::AssetLoadFailed));
    assert_eq!(status.last_error(), Some(network_error()));
    assert!(handle.scene.with(|data| data.find_mesh("box")).is_some());
    assert_eq!(handle.scene.mesh_count(), 2);

    tick(&handle.engine, &mut h.pool, 4);
    assert_eq!(frames.get(), 4);
    assert_eq!(h.backend.renders.get(), 4);
    assert_eq!(h.backend.last_mesh_count.get(), 2);
}

#[test]
fn render_errors_do_not_stop_the_loop() {
    let mut h = Harness::new();
    let (frames, on_render) = counter();
    let surface = h.surface();
    let handle = h
        .controller
        .start(surface, MountOptions::default().on_render(move |_| on_render()))
        .unwrap();
    h.backend.fail_render.set(true);

    tick(&handle.engine, &mut h.pool, 3);

    assert_eq!(frames.get(), 3);
    assert_eq!(handle.engine.frame_count(), 3);
    assert_eq!(h.backend.renders.get(), 0);
}

#[test]
fn stop_before_the_load_resolves_never_attaches() {
    let mut h = Harness::new();
    let surface = h.surface();
    let handle = h.controller.start(surface, MountOptions::default()).unwrap();
    assert_eq!(h.loader.pending(), 1);

    assert!(h.controller.stop());
    let meshes_after_stop = handle.scene.mesh_count();

    assert!(h.loader.resolve_next(Ok(cube_asset())));
    h.settle();

    assert_eq!(handle.scene.mesh_count(), meshes_after_stop);
    assert!(handle.scene.with(|data| data.find_mesh("Cube")).is_none());
    assert_eq!(
        h.controller.status().history(),
        vec![Status::Initializing, Status::SceneReady, Status::Stopped]
    );
}

#[test]
fn a_failure_after_stop_is_not_published() {
    let mut h = Harness::new();
    let surface = h.surface();
    h.controller.start(surface, MountOptions::default()).unwrap();
    h.controller.stop();

    h.loader.resolve_next(Err(network_error()));
    h.settle();

    assert_eq!(h.controller.status().current(), Some(Status::Stopped));
    assert!(h.controller.status().last_error().is_none());
}

#[test]
fn starting_twice_builds_nothing_new() {
    let mut h = Harness::new();
    let surface = h.surface();
    let first = h.controller.start(surface.clone(), MountOptions::default()).unwrap();
    let second = h.controller.start(surface, MountOptions::default()).unwrap();

    assert!(first.engine.ptr_eq(&second.engine));
    assert!(first.scene.ptr_eq(&second.scene));
    assert_eq!(h.backend.created.get(), 1);
    assert_eq!(first.scene.with(|data| data.lights.len()), 1);
    assert!(first.scene.with(|data| data.camera.is_some()));
    assert_eq!(first.scene.mesh_count(), 2);
    assert_eq!(first.engine.active_render_loops(), 1);
    assert_eq!(h.host.listener_count(EventKind::Resize), 1);
    assert_eq!(h.loader.pending(), 1);
    assert_eq!(
        h.controller.status().history(),
        vec![Status::Initializing, Status::SceneReady]
    );
}

#[test]
fn no_frames_fire_after_stop() {
    let mut h = Harness::new();
    let (frames, on_render) = counter();
    let surface = h.surface();
    let handle = h
        .controller
        .start(surface, MountOptions::default().on_render(move |_| on_render()))
        .unwrap();

    tick(&handle.engine, &mut h.pool, 3);
    assert_eq!(frames.get(), 3);

    h.controller.stop();
    tick(&handle.engine, &mut h.pool, 10);

    assert_eq!(frames.get(), 3);
    assert_eq!(h.backend.renders.get(), 3);
    assert_eq!(handle.engine.active_render_loops(), 0);
    assert!(handle.engine.is_disposed());
    assert!(handle.scene.is_disposed());
    assert_eq!(h.backend.disposed.get(), 1);
}

#[test]
fn frames_on_a_disposed_scene_do_nothing() {
    let mut h = Harness::new();
    let (frames, on_render) = counter();
    let surface = h.surface();
    let handle = h
        .controller
        .start(surface, MountOptions::default().on_render(move |_| on_render()))
        .unwrap();
    tick(&handle.engine, &mut h.pool, 2);
    assert_eq!(h.backend.renders.get(), 2);

    // the loop is still registered when the scene goes away
    assert!(handle.scene.dispose());
    assert_eq!(handle.engine.active_render_loops(), 1);
    tick(&handle.engine, &mut h.pool, 5);

    assert_eq!(frames.get(), 2);
    assert_eq!(h.backend.renders.get(), 2);

    assert!(h.controller.stop());
    assert!(handle.engine.is_disposed());
    assert_eq!(h.backend.disposed.get(), 1);
    assert_eq!(h.controller.status().current(), Some(Status::Stopped));
}

#[test]
fn a_render_callback_disposing_the_scene_skips_the_draw() {
    let mut h = Harness::new();
    let (frames, on_render) = counter();
    let surface = h.surface();
    let handle = h
        .controller
        .start(
            surface,
            MountOptions::default().on_render(move |scene| {
                on_render();
                scene.dispose();
            }),
        )
        .unwrap();

    tick(&handle.engine, &mut h.pool, 3);

    assert_eq!(frames.get(), 1);
    assert_eq!(h.backend.renders.get(), 0);
    assert!(handle.scene.is_disposed());

    h.controller.stop();
    assert_eq!(h.backend.disposed.get(), 1);
}

#[test]
fn two_resize_signals_resize_twice() {
    let mut h = Harness::new();
    h.surface = FakeSurface::new(800, 600, 2.0);
    let surface = h.surface();
    let handle = h.controller.start(surface, MountOptions::default()).unwrap();
    assert_eq!(handle.engine.render_size(), PhysicalSize::new(1600, 1200));

    h.surface.set_size(1024, 768);
    h.host.dispatch(&HostEvent::Resize);
    h.host.dispatch(&HostEvent::Resize);

    assert_eq!(h.backend.resize_count(), 2);
    assert_eq!(h.host.listener_count(EventKind::Resize), 1);
    assert_eq!(
        h.backend.resizes.borrow().last().copied(),
        Some(PhysicalSize::new(2048, 1536))
    );
    assert_eq!(handle.engine.render_size(), PhysicalSize::new(2048, 1536));
}

#[test]
fn device_ratio_is_ignored_unless_adapting() {
    let mut h = Harness::new();
    h.surface = FakeSurface::new(800, 600, 2.0);
    let surface = h.surface();
    let handle = h
        .controller
        .start(surface, MountOptions::default().with_adapt_to_device_ratio(false))
        .unwrap();

    assert_eq!(handle.engine.render_size(), PhysicalSize::new(800, 600));
}

#[test]
fn device_failure_leaves_nothing_behind() {
    let mut h = Harness::new();
    h.backend.fail_create.set(true);
    let surface = h.surface();

    let err = h.controller.start(surface, MountOptions::default()).unwrap_err();

    assert!(matches!(err, InitializationError::DeviceRequest(_)));
    assert!(!h.controller.is_mounted());
    assert_eq!(h.host.added(), 0);
    assert_eq!(h.loader.pending(), 0);
    assert_eq!(h.controller.status().history(), vec![Status::Initializing]);
}

#[test]
fn scene_failure_disposes_the_device() {
    let mut h = Harness::new();
    h.backend.fail_prepare.set(true);
    let surface = h.surface();

    let err = h.controller.start(surface, MountOptions::default()).unwrap_err();

    assert!(matches!(err, InitializationError::SceneCreation(_)));
    assert_eq!(h.backend.created.get(), 1);
    assert_eq!(h.backend.disposed.get(), 1);
    assert_eq!(h.host.added(), 0);
    assert!(!h.controller.is_mounted());

    // the controller can still be mounted once the cause is gone
    h.backend.fail_prepare.set(false);
    let surface = h.surface();
    assert!(h.controller.start(surface, MountOptions::default()).is_ok());
}

#[test]
fn unusable_surface_is_rejected() {
    let mut h = Harness::new();
    h.surface = FakeSurface::new(0, 0, 1.0);
    let surface = h.surface();

    let err = h.controller.start(surface, MountOptions::default()).unwrap_err();

    assert!(matches!(err, InitializationError::InvalidSurface { .. }));
    assert_eq!(h.backend.created.get(), 0);
}

#[test]
fn debug_layer_follows_the_key_combination() {
    let mut h = Harness::new();
    let surface = h.surface();
    let handle = h.controller.start(surface, MountOptions::default()).unwrap();
    let visible = || handle.scene.with(|data| data.debug_layer.is_visible());

    h.host.dispatch(&HostEvent::KeyDown(KeyCombo::INSPECTOR));
    assert!(visible());

    h.host.dispatch(&HostEvent::KeyDown(KeyCombo::plain(KeyCode::KeyI)));
    assert!(visible());

    h.host.dispatch(&HostEvent::KeyDown(KeyCombo::INSPECTOR));
    assert!(!visible());
    assert_eq!(h.host.listener_count(EventKind::KeyDown), 1);
}

#[test]
fn scene_ready_callback_runs_once_with_static_content() {
    let mut h = Harness::new();
    let seen = Rc::new(Cell::new(None));
    let (calls, count) = counter();
    let recorder = seen.clone();
    let options = MountOptions::default().on_scene_ready(move |scene| {
        count();
        let camera = scene.with(|data| data.camera.is_some());
        recorder.set(Some((camera, scene.mesh_count())));
    });
    let surface = h.surface();
    h.controller.start(surface.clone(), options.clone()).unwrap();
    h.controller.start(surface, options).unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(seen.get(), Some((true, 2)));
}

#[test]
fn latest_load_wins() {
    let mut h = Harness::new();
    let surface = h.surface();
    let handle = h.controller.start(surface, MountOptions::default()).unwrap();
    h.controller.load("other.glb").unwrap();
    assert_eq!(h.loader.pending(), 2);

    // the older load resolves first and is dropped
    h.loader.resolve_next(Ok(cube_asset()));
    h.settle();
    assert!(handle.scene.with(|data| data.find_mesh("Cube")).is_none());
    assert!(handle.scene.with(|data| data.find_mesh("box")).is_some());
    assert_eq!(h.controller.status().current(), Some(Status::SceneReady));

    h.loader.resolve_next(Ok(asset_named("Other")));
    h.settle();
    assert!(handle.scene.with(|data| data.find_mesh("Other")).is_some());
    assert!(handle.scene.with(|data| data.find_mesh("box")).is_none());
    assert_eq!(h.controller.status().current(), Some(Status::AssetLoaded));
    assert_eq!(handle.scene.loads_in_flight(), 0);
}

#[test]
fn concurrent_loads_can_be_rejected() {
    let mut h = Harness::new();
    let surface = h.surface();
    let options = MountOptions::default().with_load_policy(ConcurrentLoadPolicy::RejectConcurrent);
    let handle = h.controller.start(surface, options).unwrap();

    assert_eq!(h.controller.load("again.glb"), Err(LoadError::Busy));
    assert_eq!(h.loader.pending(), 1);
    assert_eq!(h.controller.status().current(), Some(Status::SceneReady));

    h.loader.resolve_next(Ok(cube_asset()));
    h.settle();
    assert_eq!(h.controller.status().current(), Some(Status::AssetLoaded));

    // nothing in flight any more
    assert!(h.controller.load("again.glb").is_ok());
    assert_eq!(handle.scene.loads_in_flight(), 1);
}

#[test]
fn loading_without_a_mounted_scene_fails() {
    let h = Harness::new();
    assert_eq!(h.controller.load("cube.glb"), Err(LoadError::Cancelled));
}

#[test]
fn controllers_sharing_a_host_are_independent() {
    let host = Rc::new(EventTarget::new());
    let mut left = Harness::on_host(host.clone());
    let mut right = Harness::on_host(host.clone());
    let surface = left.surface();
    let left_handle = left.controller.start(surface, MountOptions::default()).unwrap();
    let surface = right.surface();
    right.controller.start(surface, MountOptions::default()).unwrap();
    assert_eq!(host.listener_count(EventKind::Resize), 2);

    left.controller.stop();
    host.dispatch(&HostEvent::Resize);

    assert!(left_handle.engine.is_disposed());
    assert_eq!(left.backend.resize_count(), 0);
    assert_eq!(right.backend.resize_count(), 1);
    assert_eq!(host.listener_count(EventKind::Resize), 1);
}

#[test]
fn dropping_the_controller_unmounts() {
    let mut h = Harness::new();
    let surface = h.surface();
    let handle = h.controller.start(surface, MountOptions::default()).unwrap();
    let host = h.host.clone();
    drop(h);

    assert!(handle.engine.is_disposed());
    assert!(handle.scene.is_disposed());
    assert_eq!(host.listener_count(EventKind::Resize), 0);
    assert_eq!(host.listener_count(EventKind::KeyDown), 0);
}
