// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use std::time::Duration;

use common::*;
use frames_in_flight::images::threaded::RenderThread;

#[test]
fn each_sync_sees_the_next_frame() {
    let (control, engine) = engine();
    let thread = RenderThread::spawn(engine, |engine| {
        engine.begin_frame();
        engine.queue_clear_render_target([0.0, 0.0, 1.0, 1.0]);
        engine.end_frame();
        engine.present();
    })
    .expect("spawn");

    let frames: Vec<Option<u64>> = (0..5)
        .map(|_| thread.sync(|engine| engine.frame_index()))
        .collect();
    assert_eq!(frames, (0..5).map(Some).collect::<Vec<_>>());

    let engine = thread.stop().expect("engine");
    assert_eq!(engine.frame_index(), 5);
    assert_eq!(engine.present_index(), 5);
    assert!(control.wait_for_presents(5, Duration::from_secs(5)));
    let shown = control.last_presented().expect("presented");
    assert_eq!(shown.pixel(0, 0), Some(&[0, 0, 255, 255][..]));
}

#[test]
fn jobs_can_create_resources() {
    let (control, engine) = engine();
    let thread = RenderThread::spawn(engine, |engine| {
        engine.begin_frame();
        if engine.buffer_len(1).is_some() && engine.finalize_pipeline(&solid([1.0; 4])) {
            engine.queue_draw(&triangles(1, 3));
        }
        engine.end_frame();
    })
    .expect("spawn");
    let id = thread.sync(|engine| buffer(engine, &[8; 12]));
    assert_eq!(id, Some(1));
    thread.sync(|_| ());
    drop(thread);
    assert_eq!(control.stats().draws, 2);
    assert_eq!(control.draws()[1].vertex_data, vec![8; 12]);
}

#[test]
fn a_panicking_render_thread_is_reported() {
    let (_control, engine) = engine();
    let thread = RenderThread::spawn(engine, |_| panic!("render failed")).expect("spawn");
    assert_eq!(thread.sync(|engine| engine.frame_index()), Some(0));
    assert_eq!(thread.sync(|engine| engine.frame_index()), None);
    assert_eq!(thread.sync(|_| ()), None);
    assert!(thread.stop().is_none());
}
