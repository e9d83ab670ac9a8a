// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use common::*;
use frames_in_flight::Engine;
use frames_in_flight::bindings::visible_to::{TextureCreateFlags, TextureUploadFlags};
use frames_in_flight::pixel_formats::{Image, ImageFormat, TextureFormat};

const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// 4x4, white on the left half and black on the right.
fn split_image() -> Image {
    let data = (0..16)
        .flat_map(|i| if i % 4 < 2 { WHITE } else { BLACK })
        .collect();
    Image::new(4, 4, ImageFormat::Rgba8Premultiplied, data).expect("4x4")
}

fn mipmapped(engine: &mut Engine) -> u32 {
    let t = engine.gen_texture();
    let flags = TextureCreateFlags {
        mipmaps: true,
        ..TextureCreateFlags::default()
    };
    engine.create_texture(t, (4, 4), ImageFormat::Rgba8Premultiplied, flags);
    t
}

#[test]
fn mip_chain_is_generated() {
    let (control, mut engine) = engine();
    let t = mipmapped(&mut engine);
    assert_eq!(engine.texture_mip_levels(t), Some(3));
    assert_eq!(engine.texture_format(t), Some(TextureFormat::Rgba8Unorm));

    engine.queue_texture_upload(t, &[split_image()], &[], TextureUploadFlags::default());
    let level1 = engine.read_texture_level(t, 1).expect("level 1");
    assert_eq!((level1.width(), level1.height()), (2, 2));
    assert_eq!(level1.pixel(0, 1), Some(&WHITE[..]));
    assert_eq!(level1.pixel(1, 1), Some(&BLACK[..]));
    let level2 = engine.read_texture_level(t, 2).expect("level 2");
    assert_eq!(level2.pixel(0, 0), Some(&[128, 128, 128, 255][..]));
    assert!(engine.read_texture_level(t, 3).is_none());
    assert_eq!(control.stats().mip_generations, 1);
}

#[test]
fn draws_see_regenerated_mips() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[0; 12]);
    let t = mipmapped(&mut engine);
    engine.queue_texture_upload(t, &[split_image()], &[(0, 0)], TextureUploadFlags::default());

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&textured(1)));
    engine.use_texture(t);
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();

    let draws = control.draws();
    assert_eq!(draws.len(), 1);
    let levels = &draws[0].textures[0].levels;
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[2], vec![128, 128, 128, 255]);
    assert_eq!(control.stats().mip_generations, 1);
}

fn sample(engine: &mut Engine, texture: u32, buffer: u32) {
    engine.begin_frame();
    assert!(engine.finalize_pipeline(&textured(1)));
    engine.use_texture(texture);
    engine.queue_draw(&triangles(buffer, 3));
    engine.end_frame();
}

#[test]
fn first_draw_waits_for_the_upload() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[0; 12]);
    let t = engine.gen_texture();
    engine.create_texture(t, (1, 1), ImageFormat::Rgba8, TextureCreateFlags::default());
    let pixel = [10, 20, 30, 255];

    control.set_manual(true);
    engine.queue_texture_upload(
        t,
        &[Image::filled(1, 1, ImageFormat::Rgba8, pixel)],
        &[],
        TextureUploadFlags::default(),
    );
    assert_eq!(control.pending_transfer_submissions(), 1);
    let upload = control.submissions().last().cloned().expect("upload");
    assert!(upload.transfer);
    let signal = upload.signal.expect("upload signals its fence");

    sample(&mut engine, t, b);
    let frame = control.submissions().last().cloned().expect("frame");
    assert!(!frame.transfer);
    assert_eq!(frame.waits, vec![signal]);
    // the upload is still queued; the frame's wait is what orders them
    assert_eq!(control.pending_transfer_submissions(), 1);
    control.complete_all();
    assert_eq!(control.draws()[0].textures[0].levels[0], pixel.to_vec());

    // the upload is known to be visible now
    sample(&mut engine, t, b);
    let frame = control.submissions().last().cloned().expect("frame");
    assert!(!frame.transfer);
    assert!(frame.waits.is_empty());
    control.set_manual(false);
    assert_eq!(control.draws().len(), 2);
}

#[test]
fn mipmapped_textures_take_one_full_upload_at_a_time() {
    let (control, mut engine) = engine();
    let t = mipmapped(&mut engine);
    let small = Image::filled(2, 2, ImageFormat::Rgba8, WHITE);
    engine.queue_texture_upload(t, &[small], &[(0, 0)], TextureUploadFlags::default());
    engine.queue_texture_upload(t, &[split_image()], &[(1, 0)], TextureUploadFlags::default());
    assert_eq!(control.stats().transfer_submissions, 0);

    control.set_manual(true);
    engine.queue_texture_upload(t, &[split_image()], &[], TextureUploadFlags::default());
    assert_eq!(control.pending_transfer_submissions(), 1);
    // still in flight
    engine.queue_texture_upload(t, &[split_image()], &[], TextureUploadFlags::default());
    assert_eq!(control.pending_transfer_submissions(), 1);
    control.complete_all();
    engine.queue_texture_upload(t, &[split_image()], &[], TextureUploadFlags::default());
    assert_eq!(control.pending_transfer_submissions(), 1);
    control.set_manual(false);
    assert_eq!(control.stats().uploads, 2);

    // mipmapped textures can't be resized
    engine.queue_texture_resize(t, (8, 8));
    assert_eq!(engine.texture_size(t), Some((4, 4)));
}

#[test]
fn formats_follow_source_and_flags() {
    let (_control, mut engine) = engine();
    let cases = [
        (ImageFormat::Alpha8, TextureCreateFlags::default(), TextureFormat::R8Unorm),
        (ImageFormat::Grayscale8, TextureCreateFlags::default(), TextureFormat::R8Unorm),
        (
            ImageFormat::Grayscale8,
            TextureCreateFlags {
                force32bit: true,
                ..TextureCreateFlags::default()
            },
            TextureFormat::Rgba8Unorm,
        ),
        (ImageFormat::Bgra8, TextureCreateFlags::default(), TextureFormat::Bgra8Unorm),
        (ImageFormat::Rgbx8, TextureCreateFlags::default(), TextureFormat::Rgba8Unorm),
    ];
    for (source, flags, expected) in cases {
        let t = engine.gen_texture();
        engine.create_texture(t, (2, 2), source, flags);
        assert_eq!(engine.texture_format(t), Some(expected), "{source:?}");
        assert_eq!(engine.texture_mip_levels(t), Some(1));
    }

    let t = engine.gen_texture();
    engine.create_texture(t, (0, 2), ImageFormat::Rgba8, TextureCreateFlags::default());
    assert_eq!(engine.texture_size(t), None);
}

#[test]
fn uploads_are_premultiplied_and_clipped() {
    let (_control, mut engine) = engine();
    let t = engine.gen_texture();
    engine.create_texture(t, (4, 4), ImageFormat::Rgba8, TextureCreateFlags::default());

    let straight = Image::filled(1, 1, ImageFormat::Rgba8, [100, 50, 25, 128]);
    let corner = Image::filled(2, 2, ImageFormat::Rgba8, [10, 20, 30, 255]);
    engine.queue_texture_upload(
        t,
        &[straight.clone(), corner],
        &[(0, 0), (3, 3)],
        TextureUploadFlags::default(),
    );
    engine.queue_texture_upload(
        t,
        &[straight],
        &[(1, 0)],
        TextureUploadFlags {
            already_premultiplied: true,
        },
    );

    let level0 = engine.read_texture_level(t, 0).expect("level 0");
    assert_eq!(level0.format(), ImageFormat::Rgba8Premultiplied);
    assert_eq!(level0.pixel(0, 0), Some(&[50, 25, 13, 128][..]));
    assert_eq!(level0.pixel(1, 0), Some(&[100, 50, 25, 128][..]));
    assert_eq!(level0.pixel(3, 3), Some(&[10, 20, 30, 255][..]));
    assert_eq!(level0.pixel(2, 2), Some(&[0, 0, 0, 0][..]));
}

#[test]
fn opaque_textures_ignore_alpha() {
    let (_control, mut engine) = engine();
    let t = engine.gen_texture();
    let flags = TextureCreateFlags {
        alpha: false,
        ..TextureCreateFlags::default()
    };
    engine.create_texture(t, (1, 1), ImageFormat::Rgba8, flags);
    let image = Image::filled(1, 1, ImageFormat::Rgba8, [200, 100, 50, 0]);
    engine.queue_texture_upload(t, &[image], &[], TextureUploadFlags::default());
    let level0 = engine.read_texture_level(t, 0).expect("level 0");
    assert_eq!(level0.pixel(0, 0).map(|p| p[3]), Some(255));
}

#[test]
fn resize_keeps_the_top_left_corner() {
    let (_control, mut engine) = engine();
    let t = engine.gen_texture();
    engine.create_texture(t, (2, 2), ImageFormat::Grayscale8, TextureCreateFlags::default());
    let image = Image::new(2, 2, ImageFormat::Grayscale8, vec![10, 20, 30, 40]).expect("2x2");
    engine.queue_texture_upload(t, &[image], &[], TextureUploadFlags::default());

    engine.queue_texture_resize(t, (3, 1));
    assert_eq!(engine.texture_size(t), Some((3, 1)));
    let level0 = engine.read_texture_level(t, 0).expect("level 0");
    assert_eq!(level0.data(), &[10, 20, 0]);
}

#[test]
fn render_targets_can_be_sampled() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[0; 12]);
    let rt = engine.gen_render_target();
    engine.create_render_target(rt, (4, 4), [1.0, 0.0, 0.0, 1.0], 4);

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&textured(1)));
    engine.use_render_target_as_texture(rt);
    engine.queue_draw(&triangles(b, 3));

    // not while it is the target being drawn into
    engine.queue_set_render_target(rt);
    engine.use_render_target_as_texture(rt);
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();

    assert_eq!(engine.stats().draws_rejected, 1);
    let draws = control.draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(&draws[0].textures[0].levels[0][..4], &[255, 0, 0, 255]);
    assert!(control.stats().resolves >= 2);

    let pixels = engine.execute_and_wait_readback_render_target(rt);
    assert_eq!((pixels.width(), pixels.height()), (4, 4));
    assert_eq!(pixels.pixel(3, 3), Some(&[255, 0, 0, 255][..]));
}
