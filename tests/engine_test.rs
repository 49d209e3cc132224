use std::{cell::Cell, rc::Rc};

use scene_mount::{
    EngineOptions, SurfaceHandle,
    engine::Engine,
    render_loop::RenderLoopDriver,
};

use crate::common::test_utils::{BackendLog, FakeSurface, HeadlessBackend, HeadlessFactory};

mod common;

fn engine() -> (Engine<HeadlessBackend>, Rc<BackendLog>) {
    let log = Rc::new(BackendLog::default());
    let factory = HeadlessFactory { log: log.clone() };
    let surface: Rc<dyn SurfaceHandle> = FakeSurface::new(640, 480, 1.0);
    let engine = Engine::new(&factory, surface, EngineOptions::default()).unwrap();
    (engine, log)
}

#[test]
fn a_loop_stopped_mid_frame_is_not_invoked_again() {
    let (engine, _) = engine();
    let hits = Rc::new(Cell::new(0));

    let second_hits = hits.clone();
    let second = Rc::new(Cell::new(None));
    let first_target = second.clone();
    engine.run_render_loop(move |engine| {
        if let Some(id) = first_target.get() {
            engine.stop_render_loop(id);
        }
    });
    let id = engine.run_render_loop(move |_| second_hits.set(second_hits.get() + 1));
    second.set(Some(id));

    engine.begin_frame();
    engine.begin_frame();

    assert_eq!(hits.get(), 0);
    assert!(!engine.is_running(id));
    assert_eq!(engine.active_render_loops(), 1);
}

#[test]
fn dropping_the_driver_stops_its_loop() {
    let (engine, _) = engine();
    let hits = Rc::new(Cell::new(0));
    let counter = hits.clone();
    let driver = RenderLoopDriver::start(&engine, move |_| counter.set(counter.get() + 1));
    assert!(driver.is_running());

    engine.begin_frame();
    drop(driver);
    engine.begin_frame();

    assert_eq!(hits.get(), 1);
    assert_eq!(engine.active_render_loops(), 0);
}

#[test]
fn dispose_is_once_and_final() {
    let (engine, log) = engine();
    let weak = engine.downgrade();
    assert!(weak.upgrade().is_some());

    assert!(engine.dispose());
    assert!(!engine.dispose());
    assert_eq!(log.disposed.get(), 1);
    assert!(weak.upgrade().is_none());
    assert!(engine.create_scene().is_err());

    engine.resize();
    assert_eq!(log.resize_count(), 0);
}

#[test]
fn zero_sized_resizes_are_skipped() {
    let log = Rc::new(BackendLog::default());
    let factory = HeadlessFactory { log: log.clone() };
    let surface = FakeSurface::new(640, 480, 1.0);
    let handle: Rc<dyn SurfaceHandle> = surface.clone();
    let engine = Engine::new(&factory, handle, EngineOptions::default()).unwrap();

    surface.set_size(0, 480);
    engine.resize();
    surface.set_size(320, 240);
    engine.resize();

    assert_eq!(log.resize_count(), 1);
    assert_eq!(engine.render_size().width, 320);
}
