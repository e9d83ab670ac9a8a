// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use common::*;
use frames_in_flight::bindings::visible_to::TextureCreateFlags;
use frames_in_flight::pixel_formats::ImageFormat;

#[test]
fn ids_are_reused_once_the_slot_cycles() {
    let (_control, mut engine) = engine_with(config(2), 1);
    let a = engine.gen_buffer();
    assert_eq!(a, 1);

    engine.begin_frame();
    engine.release_buffer(a);
    assert_eq!(engine.buffer_len(a), None);
    assert_eq!(engine.gen_buffer(), 2);
    engine.end_frame();

    engine.begin_frame();
    assert_eq!(engine.gen_buffer(), 3);
    engine.end_frame();

    // frame 2 reuses frame 0's slot, which frees the ID
    engine.begin_frame();
    assert_eq!(engine.gen_buffer(), a);
    engine.end_frame();
}

#[test]
fn releases_between_frames_wait_an_extra_cycle() {
    let (_control, mut engine) = engine_with(config(2), 1);
    let t = engine.gen_texture();
    engine.create_texture(t, (4, 4), ImageFormat::Rgba8, TextureCreateFlags::default());
    engine.release_texture(t);
    assert_eq!(engine.texture_size(t), None);

    // frame 0 takes the release over, frame 2 retires it
    engine.begin_frame();
    engine.end_frame();
    engine.begin_frame();
    engine.end_frame();
    assert_ne!(engine.gen_texture(), t);
    engine.begin_frame();
    engine.end_frame();
    assert_eq!(engine.gen_texture(), t);
}

#[test]
fn released_objects_live_until_their_frame_retires() {
    let (control, mut engine) = engine_with(config(2), 1);
    let t = engine.gen_texture();
    engine.create_texture(t, (4, 4), ImageFormat::Rgba8, TextureCreateFlags::default());
    control.set_manual(true);

    engine.begin_frame();
    let destroyed = control.stats().objects_destroyed;
    engine.release_texture(t);
    engine.end_frame();
    engine.begin_frame();
    engine.end_frame();
    assert_eq!(control.stats().objects_destroyed, destroyed);

    // slot 0's frame has to finish first
    engine.begin_frame();
    assert_eq!(control.stats().objects_destroyed, destroyed + 1);
    engine.end_frame();
    control.set_manual(false);
}

#[test]
fn releasing_the_active_target_returns_to_the_default() {
    let (_control, mut engine) = engine();
    let rt = engine.gen_render_target();
    engine.create_render_target(rt, (8, 8), [0.0; 4], 1);
    assert_eq!(engine.render_target_size(rt), Some((8, 8)));

    engine.begin_frame();
    engine.queue_set_render_target(rt);
    assert_eq!(engine.active_render_target(), rt);
    engine.release_render_target(rt);
    assert_eq!(engine.active_render_target(), 0);
    assert_eq!(engine.render_target_size(rt), None);
    engine.end_frame();

    // the default target can't be released
    engine.release_render_target(0);
}

#[test]
fn unknown_ids_are_ignored() {
    let (_control, mut engine) = engine();
    engine.release_buffer(42);
    engine.release_texture(42);
    engine.release_render_target(42);
    engine.write_buffer(42, 0, &[1]);
    assert_eq!(engine.buffer_data(0), None);
    engine.begin_frame();
    engine.use_texture(42);
    engine.use_render_target_as_texture(42);
    engine.queue_set_render_target(42);
    assert_eq!(engine.active_render_target(), 0);
    engine.end_frame();
    assert_ne!(engine.gen_buffer(), 0);
}

#[test]
fn release_and_attach_again() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[3; 8]);
    engine.begin_frame();
    assert!(engine.finalize_pipeline(&solid([1.0; 4])));
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();

    engine.release();
    assert!(!engine.has_resources());
    assert_eq!(control.live_objects(), 0);
    assert_eq!(engine.buffer_data(b), Some(&[3; 8][..]));

    engine
        .attach(frames_in_flight::images::view::View::offscreen(), (8, 8), 1.0, 1, false)
        .expect("attach");
    assert!(engine.has_resources());
    engine.begin_frame();
    assert!(engine.finalize_pipeline(&solid([1.0; 4])));
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();
    assert_eq!(control.draws()[1].vertex_data, vec![3; 8]);
}

#[test]
fn attach_rejects_bad_surfaces() {
    let (control, mut engine) = engine();
    assert!(matches!(
        engine.attach(frames_in_flight::images::view::View::offscreen(), (8, 8), 1.0, 1, false),
        Err(frames_in_flight::AttachError::AlreadyAttached)
    ));
    engine.release();
    assert!(matches!(
        engine.attach(frames_in_flight::images::view::View::offscreen(), (0, 8), 1.0, 1, false),
        Err(frames_in_flight::AttachError::ZeroSize { width: 0, height: 8 })
    ));

    control.fail_next_creations(1);
    match engine.attach(frames_in_flight::images::view::View::offscreen(), (8, 8), 1.0, 1, false) {
        Err(frames_in_flight::AttachError::Gpu(e)) => {
            assert_eq!(e.to_string(), "Can't create resource: injected creation failure");
        }
        other => panic!("expected a GPU error, got {other:?}"),
    }
    // a failed attach leaves the engine detached
    engine
        .attach(frames_in_flight::images::view::View::offscreen(), (8, 8), 1.0, 1, false)
        .expect("attach");
}

#[test]
fn heap_grows_when_a_frame_samples_many_textures() {
    let config = frames_in_flight::EngineConfig {
        gpu_descriptor_heap_size: 1,
        ..frames_in_flight::EngineConfig::default()
    };
    let (control, mut engine) = engine_with(config, 1);
    let b = buffer(&mut engine, &[0; 12]);
    let t = engine.gen_texture();
    engine.create_texture(t, (2, 2), ImageFormat::Rgba8, TextureCreateFlags::default());

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&textured(1)));
    for _ in 0..2 {
        engine.use_texture(t);
        engine.queue_draw(&triangles(b, 3));
    }
    engine.end_frame();
    assert_eq!(engine.stats().gpu_heap_growths, 1);
    assert_eq!(engine.stats().draws_recorded, 2);
    let draws = control.draws();
    assert_eq!(draws.len(), 2);
    assert!(draws.iter().all(|d| d.textures.len() == 1));
}
