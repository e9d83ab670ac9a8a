// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use common::*;
use frames_in_flight::Engine;

fn draw_with(engine: &mut Engine, buffer: u32) {
    assert!(engine.finalize_pipeline(&solid([1.0; 4])));
    engine.queue_draw(&triangles(buffer, 3));
}

#[test]
fn writes_are_carried_into_the_next_slot() {
    let (control, mut engine) = engine_with(config(2), 1);
    let b = buffer(&mut engine, &[0; 64]);

    // frame 0, slot 0
    engine.begin_frame();
    engine.write_buffer(b, 0, &[1; 16]);
    draw_with(&mut engine, b);
    engine.end_frame();

    // frame 1, slot 1: slot 1 has no object yet, so it is written in full
    engine.begin_frame();
    engine.write_buffer(b, 16, &[2; 16]);
    draw_with(&mut engine, b);
    engine.end_frame();
    assert_eq!(engine.stats().carry_forward_invalidations, 1);

    // frame 2, slot 0: only frame 1's range and this frame's range are copied
    engine.begin_frame();
    engine.write_buffer(b, 32, &[3; 16]);
    draw_with(&mut engine, b);
    engine.end_frame();
    assert_eq!(engine.stats().carry_forward_merges, 1);

    let backend = control.stats();
    assert_eq!(backend.memory_writes, 3);
    assert_eq!(backend.bytes_written, 64 + 64 + 32);

    let expected = engine.buffer_data(b).expect("buffer").to_vec();
    assert_eq!(&expected[..16], &[1; 16]);
    assert_eq!(&expected[32..48], &[3; 16]);
    assert_eq!(engine.inspect_buffer_slot(b, 0), Some(expected.clone()));

    // slot 1 hasn't drawn since frame 2's write
    let mut stale = expected;
    stale[32..48].fill(0);
    assert_eq!(engine.inspect_buffer_slot(b, 1), Some(stale));
}

#[test]
fn slots_catch_up_after_skipping_frames() {
    let (_control, mut engine) = engine_with(config(2), 1);
    let b = buffer(&mut engine, &[0; 64]);

    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();

    // frames 1 to 3 write without drawing
    for frame in 1..4u8 {
        engine.begin_frame();
        engine.write_buffer(b, frame as u64 * 8, &[frame; 8]);
        engine.end_frame();
    }

    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();

    let expected = engine.buffer_data(b).expect("buffer").to_vec();
    assert_eq!(&expected[8..32], &[[1; 8], [2; 8], [3; 8]].concat()[..]);
    assert_eq!(engine.inspect_buffer_slot(b, 0), Some(expected));
    assert_eq!(engine.inspect_buffer_slot(b, 1), None);
}

#[test]
fn writes_outside_a_frame_reach_every_slot() {
    let (_control, mut engine) = engine_with(config(3), 1);
    let b = buffer(&mut engine, &[0; 32]);
    for _ in 0..3 {
        engine.begin_frame();
        draw_with(&mut engine, b);
        engine.end_frame();
    }
    engine.write_buffer(b, 4, &[9; 4]);
    for _ in 0..3 {
        engine.begin_frame();
        draw_with(&mut engine, b);
        engine.end_frame();
    }
    let expected = engine.buffer_data(b).expect("buffer").to_vec();
    assert_eq!(&expected[4..8], &[9; 4]);
    for slot in 0..3 {
        assert_eq!(engine.inspect_buffer_slot(b, slot), Some(expected.clone()));
    }
}

#[test]
fn marking_dirty_after_writing_in_place() {
    let (_control, mut engine) = engine_with(config(1), 1);
    let b = buffer(&mut engine, &[0; 16]);
    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();

    engine.begin_frame();
    engine.buffer_data_mut(b).expect("buffer")[2..4].copy_from_slice(&[5, 6]);
    engine.mark_buffer_dirty(b, 2, 100);
    draw_with(&mut engine, b);
    engine.end_frame();
    let data = engine.inspect_buffer_slot(b, 0).expect("slot 0");
    assert_eq!(&data[..4], &[0, 0, 5, 6]);

    // out of bounds writes are ignored
    engine.write_buffer(b, 15, &[1, 2]);
    assert_eq!(engine.buffer_len(b), Some(16));
    assert_eq!(engine.buffer_data(b).expect("buffer")[15], 0);
}

#[test]
fn failed_map_keeps_ranges_pending() {
    let (control, mut engine) = engine_with(config(2), 1);
    let b = buffer(&mut engine, &[7; 64]);

    control.fail_next_maps(1);
    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();
    // the draw saw the object as it was
    assert_eq!(control.draws()[0].vertex_data, vec![0; 64]);
    assert_eq!(engine.inspect_buffer_slot(b, 0), Some(vec![0; 64]));

    engine.begin_frame();
    engine.end_frame();

    // slot 0 draws again and the copy is retried
    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();
    assert_eq!(engine.inspect_buffer_slot(b, 0), Some(vec![7; 64]));
    assert_eq!(control.draws()[1].vertex_data, vec![7; 64]);
}

#[test]
fn growing_a_buffer_replaces_its_objects() {
    let (control, mut engine) = engine_with(config(2), 1);
    let b = buffer(&mut engine, &[1; 64]);
    for _ in 0..2 {
        engine.begin_frame();
        draw_with(&mut engine, b);
        engine.end_frame();
    }
    assert_eq!(control.stats().memories_created, 2);

    // frame 2, slot 0: larger than the 4096-byte objects
    engine.begin_frame();
    engine.reset_buffer(b, &[2; 5000]);
    draw_with(&mut engine, b);
    engine.end_frame();

    // frame 3, slot 1: its object holds the old, shorter content
    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();

    let stats = engine.stats();
    assert_eq!(stats.carry_forward_invalidations, 1);
    assert_eq!(stats.carry_forward_merges, 0);
    assert_eq!(control.stats().memories_created, 4);
    assert_eq!(engine.inspect_buffer_slot(b, 0), Some(vec![2; 5000]));
    assert_eq!(engine.inspect_buffer_slot(b, 1), Some(vec![2; 5000]));
}

#[test]
fn shrinking_a_buffer_with_pending_writes() {
    let (control, mut engine) = engine_with(config(1), 1);
    let b = buffer(&mut engine, &[0; 64]);
    engine.begin_frame();
    draw_with(&mut engine, b);
    engine.end_frame();

    engine.begin_frame();
    engine.write_buffer(b, 32, &[1; 32]);
    engine.reset_buffer(b, &[2; 16]);
    draw_with(&mut engine, b);
    engine.end_frame();

    assert_eq!(engine.buffer_len(b), Some(16));
    assert_eq!(control.draws()[1].vertex_data, vec![2; 16]);
    assert_eq!(engine.inspect_buffer_slot(b, 0), Some(vec![2; 16]));
}
