// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use common::*;
use frames_in_flight::bindings::visible_to::{TextureCreateFlags, TextureUploadFlags};
use frames_in_flight::images::view::View;
use frames_in_flight::pixel_formats::{Image, ImageFormat};
use frames_in_flight::{Device, DeviceStatus, Engine, EngineConfig, EntryPoint, HeadlessControl};

fn draw(engine: &mut Engine, buffer: u32) {
    engine.begin_frame();
    assert!(engine.finalize_pipeline(&solid([1.0; 4])));
    engine.queue_draw(&triangles(buffer, 3));
    engine.end_frame();
}

#[test]
fn everything_is_rebuilt_after_a_loss() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[5; 16]);
    let t = engine.gen_texture();
    engine.create_texture(t, (2, 2), ImageFormat::Rgba8, TextureCreateFlags::default());
    let pixel = [10, 20, 30, 255];
    engine.queue_texture_upload(
        t,
        &[Image::filled(2, 2, ImageFormat::Rgba8, pixel)],
        &[],
        TextureUploadFlags::default(),
    );
    let rt = engine.gen_render_target();
    engine.create_render_target(rt, (4, 4), [0.0, 1.0, 0.0, 1.0], 1);
    draw(&mut engine, b);
    assert_eq!(engine.device().generation(), 1);

    engine.simulate_device_loss();
    assert!(!engine.has_resources());
    assert!(control.is_lost());
    assert_eq!(engine.device().status(), DeviceStatus::Lost);
    assert_eq!(engine.inspect_buffer_slot(b, 0), None);
    // logical state survives
    assert_eq!(engine.buffer_data(b), Some(&[5; 16][..]));
    assert_eq!(engine.texture_size(t), Some((2, 2)));
    assert_eq!(engine.render_target_size(rt), Some((4, 4)));

    draw(&mut engine, b);
    assert!(engine.has_resources());
    assert_eq!(engine.device().status(), DeviceStatus::Active);
    assert_eq!(engine.device().generation(), 2);
    assert_eq!(engine.stats().device_reinitializations, 1);
    let draws = control.draws();
    assert_eq!(draws.last().map(|d| d.vertex_data.clone()), Some(vec![5; 16]));
    // frame 1 drew on slot 1
    assert_eq!(engine.inspect_buffer_slot(b, 1), Some(vec![5; 16]));

    let level0 = engine.read_texture_level(t, 0).expect("texture");
    assert_eq!(level0.pixel(1, 1), Some(&pixel[..]));
    let pixels = engine.execute_and_wait_readback_render_target(rt);
    assert_eq!(pixels.pixel(0, 0), Some(&[0, 255, 0, 255][..]));
}

#[test]
fn loss_inside_a_frame_abandons_it() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[0; 12]);
    engine.begin_frame();
    assert!(engine.finalize_pipeline(&solid([1.0; 4])));
    engine.simulate_device_loss();
    assert!(!engine.is_in_frame());
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();
    assert_eq!(engine.frame_index(), 0);
    assert_eq!(engine.stats().draws_recorded, 0);

    // presenting while lost does nothing
    engine.present();
    assert_eq!(engine.present_index(), 0);
    assert_eq!(engine.stats().dropped_presents, 0);

    draw(&mut engine, b);
    assert_eq!(engine.frame_index(), 1);
    assert_eq!(engine.stats().draws_recorded, 1);
    assert_eq!(control.stats().draws, 1);
    engine.present();
    assert_eq!(engine.stats().presents, 1);
}

#[test]
fn engines_sharing_a_device_reopen_it_once() {
    let control = HeadlessControl::new();
    let device = Device::new(EntryPoint::headless_with(control.clone())).expect("device");
    let mut engines: Vec<Engine> = (0..2)
        .map(|_| {
            let mut engine = Engine::new(device.clone(), EngineConfig::default());
            engine
                .attach(View::offscreen(), SIZE, 1.0, 1, false)
                .expect("attach");
            engine
        })
        .collect();
    let buffers: Vec<u32> = engines
        .iter_mut()
        .map(|engine| buffer(engine, &[1; 12]))
        .collect();

    engines[0].simulate_device_loss();
    assert!(!engines[1].has_resources());

    for (engine, b) in engines.iter_mut().zip(&buffers) {
        draw(engine, *b);
        assert!(engine.has_resources());
        assert_eq!(engine.stats().device_reinitializations, 1);
    }
    assert_eq!(device.generation(), 2);
    assert_eq!(device.status(), DeviceStatus::Active);
    assert_eq!(control.stats().draws, 2);
}

#[test]
fn failed_creation_rejects_only_that_draw() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[4; 12]);
    engine.begin_frame();
    assert!(engine.finalize_pipeline(&solid([1.0; 4])));
    control.fail_next_creations(1);
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();
    assert_eq!(engine.stats().draws_rejected, 1);
    assert!(engine.has_resources());
    assert_eq!(engine.device().status(), DeviceStatus::Active);

    draw(&mut engine, b);
    assert_eq!(engine.stats().draws_recorded, 1);
    assert_eq!(control.draws()[0].vertex_data, vec![4; 12]);
}
