// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use common::*;
use frames_in_flight::EngineConfig;
use frames_in_flight::images::render_pass::{DrawingMode, Rect};

#[test]
fn third_frame_waits_for_the_first() {
    let (control, mut engine) = engine_with(config(2), 1);
    control.set_manual(true);

    for _ in 0..2 {
        engine.begin_frame();
        engine.queue_clear_render_target([0.0, 0.0, 0.0, 1.0]);
        engine.end_frame();
    }
    // both frames are queued and nothing has run
    assert_eq!(control.pending_main_submissions(), 2);
    assert_eq!(engine.completed_frames(), 0);

    // frame 2 reuses frame 0's slot
    engine.begin_frame();
    assert_eq!(engine.completed_frames(), 1);
    assert_eq!(control.pending_main_submissions(), 1);
    engine.end_frame();

    engine.wait_gpu();
    assert_eq!(engine.completed_frames(), 3);
    assert_eq!(control.pending_main_submissions(), 0);
    assert_eq!(engine.frame_index(), 3);
    assert_eq!(engine.stats().frames_begun, 3);
}

#[test]
fn one_frame_in_flight_waits_every_frame() {
    let (control, mut engine) = engine_with(config(1), 1);
    control.set_manual(true);
    engine.begin_frame();
    engine.end_frame();
    assert_eq!(control.pending_main_submissions(), 1);
    engine.begin_frame();
    assert_eq!(control.pending_main_submissions(), 0);
    assert_eq!(engine.completed_frames(), 1);
    engine.end_frame();
}

#[test]
fn swap_chain_latency_limits_queued_frames() {
    let config = EngineConfig {
        frames_in_flight: 3,
        waitable_swap_chain_max_latency: 1,
        ..EngineConfig::default()
    };
    let (control, mut engine) = engine_with(config, 1);
    control.set_manual(true);
    for _ in 0..2 {
        engine.begin_frame();
        engine.end_frame();
    }
    assert_eq!(engine.completed_frames(), 0);
    // slot 2 is free, but only one frame may stay queued
    engine.begin_frame();
    assert_eq!(engine.completed_frames(), 1);
    assert_eq!(control.pending_main_submissions(), 1);
    engine.end_frame();
}

#[test]
fn long_frames_are_split_and_state_is_replayed() {
    let config = EngineConfig {
        max_draw_calls_per_list: 2,
        ..EngineConfig::default()
    };
    let (control, mut engine) = engine_with(config, 1);
    let vertices = buffer(&mut engine, &[0; 36]);

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&solid([1.0, 0.0, 0.0, 1.0])));
    engine.queue_set_blend_factor([0.5, 0.5, 0.5, 0.5]);
    engine.queue_set_stencil_ref(7);
    engine.queue_scissor(Rect::new(4, 4, 8, 8));
    for _ in 0..5 {
        engine.queue_draw(&triangles(vertices, 3));
    }
    engine.end_frame();

    let stats = engine.stats();
    assert_eq!(stats.draws_recorded, 5);
    assert_eq!(stats.command_lists_submitted, 3);
    let backend = control.stats();
    assert_eq!(backend.draws, 5);
    // each list binds the pipeline once
    assert_eq!(backend.pipeline_binds, 3);
    assert_eq!(backend.layout_binds, 3);
    for draw in control.draws() {
        assert_eq!(draw.blend_factor, [0.5; 4]);
        assert_eq!(draw.stencil_ref, 7);
        assert_eq!(draw.scissor, Some(Rect::new(4, 4, 8, 8)));
        assert_eq!(draw.count, 3);
    }
}

#[test]
fn invalid_draws_are_skipped_or_rejected() {
    let (control, mut engine) = engine();
    let vertices = buffer(&mut engine, &[0; 36]);
    engine.begin_frame();

    engine.queue_draw(&triangles(vertices, 3));
    assert_eq!(engine.stats().draws_rejected, 1);

    assert!(engine.finalize_pipeline(&solid([0.0, 1.0, 0.0, 1.0])));
    let mut lines = triangles(vertices, 2);
    lines.mode = DrawingMode::Lines;
    engine.queue_draw(&lines);
    assert_eq!(engine.stats().draws_rejected, 2);

    // the scissor is clamped to the 32x32 target and ends up empty
    engine.queue_scissor(Rect::new(40, 40, 10, 10));
    engine.queue_draw(&triangles(vertices, 3));
    assert_eq!(engine.stats().draws_skipped_empty_scissor, 1);

    engine.queue_scissor(Rect::new(0, 0, 8, 8));
    assert!(engine.finalize_pipeline(&textured(1)));
    engine.queue_draw(&triangles(vertices, 3));
    assert_eq!(engine.stats().draws_rejected, 3);

    assert!(engine.finalize_pipeline(&solid([0.0, 1.0, 0.0, 1.0])));
    engine.queue_draw(&triangles(vertices, 3));
    engine.end_frame();

    assert_eq!(engine.stats().draws_recorded, 1);
    let draws = control.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].scissor, Some(Rect::new(0, 0, 8, 8)));
}

#[test]
fn recording_outside_a_frame_is_ignored() {
    let (control, mut engine) = engine();
    let vertices = buffer(&mut engine, &[0; 12]);
    assert!(!engine.finalize_pipeline(&solid([1.0; 4])));
    engine.queue_draw(&triangles(vertices, 3));
    engine.end_frame();
    assert_eq!(engine.stats().draws_recorded, 0);
    assert_eq!(control.stats().draws, 0);
    assert_eq!(engine.frame_index(), 0);
}

#[test]
fn layer_opened_outside_a_frame_joins_it() {
    let (_control, mut engine) = engine();
    let target = engine.gen_render_target();
    engine.create_render_target(target, (8, 8), [0.0, 0.0, 0.0, 0.0], 1);

    engine.begin_layer();
    assert!(engine.is_in_frame());
    engine.begin_frame();
    assert_eq!(engine.stats().frames_begun, 1);

    engine.queue_set_render_target(target);
    assert_eq!(engine.active_render_target(), target);
    engine.queue_clear_render_target([0.0, 0.0, 1.0, 1.0]);
    engine.end_layer();
    assert_eq!(engine.stats().command_lists_submitted, 1);
    assert!(engine.is_in_frame());

    engine.queue_set_render_target(0);
    engine.end_frame();
    assert_eq!(engine.stats().command_lists_submitted, 2);
    assert_eq!(engine.frame_index(), 1);

    let pixels = engine.execute_and_wait_readback_render_target(target);
    assert_eq!(pixels.pixel(7, 7), Some(&[0, 0, 255, 255][..]));
}

#[test]
fn present_shows_the_back_buffer_and_drops_failures() {
    let (control, mut engine) = engine();
    engine.begin_frame();
    engine.queue_clear_render_target([1.0, 0.0, 0.0, 1.0]);
    engine.end_frame();
    engine.present();
    let shown = control.last_presented().expect("presented");
    assert_eq!((shown.width(), shown.height()), SIZE);
    assert_eq!(shown.pixel(5, 5), Some(&[255, 0, 0, 255][..]));
    assert_eq!(engine.stats().presents, 1);

    control.fail_next_presents(1);
    engine.begin_frame();
    engine.end_frame();
    engine.present();
    assert_eq!(engine.stats().dropped_presents, 1);
    assert_eq!(engine.stats().presents, 1);
    assert_eq!(engine.present_index(), 2);
    assert_eq!(control.stats().failed_presents, 1);
    assert!(engine.has_resources());
}

#[test]
fn readback_of_the_default_target() {
    let (_control, mut engine) = engine_with(EngineConfig::default(), 4);
    engine.begin_frame();
    engine.queue_clear_render_target([0.0, 1.0, 0.0, 1.0]);
    engine.end_frame();
    let pixels = engine.execute_and_wait_readback_render_target(0);
    assert_eq!((pixels.width(), pixels.height()), SIZE);
    assert_eq!(pixels.pixel(31, 0), Some(&[0, 255, 0, 255][..]));

    engine.begin_frame();
    let inside = engine.execute_and_wait_readback_render_target(0);
    assert!(inside.is_empty());
    engine.end_frame();
}

#[test]
fn resize_recreates_the_default_target() {
    let (control, mut engine) = engine();
    engine.resize((16, 8), 2.0);
    assert_eq!(engine.surface_size(), Some((16, 8)));
    assert_eq!(engine.scale_factor(), Some(2.0));
    engine.resize((0, 8), 1.0);
    assert_eq!(engine.surface_size(), Some((16, 8)));

    engine.begin_frame();
    engine.queue_clear_render_target([1.0, 1.0, 1.0, 1.0]);
    engine.end_frame();
    engine.present();
    let shown = control.last_presented().expect("presented");
    assert_eq!((shown.width(), shown.height()), (16, 8));
    assert_eq!(engine.stats().dropped_presents, 0);
}
