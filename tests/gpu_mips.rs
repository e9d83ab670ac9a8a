// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Runs mip generation on a real adapter.  Skipped when the machine has none.
use frames_in_flight::bindings::visible_to::{TextureCreateFlags, TextureUploadFlags};
use frames_in_flight::images::view::View;
use frames_in_flight::pixel_formats::{Image, ImageFormat};
use frames_in_flight::{Device, Engine, EngineConfig, EntryPoint};

fn gpu_engine() -> Option<Engine> {
    let device = match Device::new(EntryPoint::wgpu()) {
        Ok(device) => device,
        Err(e) => {
            eprintln!("skipping: {e}");
            return None;
        }
    };
    let mut engine = Engine::new(device, EngineConfig::default());
    engine
        .attach(View::offscreen(), (16, 16), 1.0, 1, false)
        .expect("attach");
    Some(engine)
}

fn close(actual: &[u8], expected: &[u8]) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| a.abs_diff(*e) <= 1)
}

fn mipmapped(engine: &mut Engine, size: (u32, u32), image: Image) -> u32 {
    let t = engine.gen_texture();
    let flags = TextureCreateFlags {
        mipmaps: true,
        ..TextureCreateFlags::default()
    };
    engine.create_texture(t, size, ImageFormat::Rgba8Premultiplied, flags);
    engine.queue_texture_upload(t, &[image], &[], TextureUploadFlags::default());
    t
}

#[test]
fn levels_are_box_filtered() {
    let Some(mut engine) = gpu_engine() else {
        return;
    };
    // white on the left half, black on the right
    let data = (0..16)
        .flat_map(|i| if i % 4 < 2 { [255; 4] } else { [0, 0, 0, 255] })
        .collect();
    let image = Image::new(4, 4, ImageFormat::Rgba8Premultiplied, data).expect("4x4");
    let t = mipmapped(&mut engine, (4, 4), image);

    let level1 = engine.read_texture_level(t, 1).expect("level 1");
    assert_eq!(level1.pixel(0, 0), Some(&[255; 4][..]));
    assert_eq!(level1.pixel(1, 0), Some(&[0, 0, 0, 255][..]));
    let level2 = engine.read_texture_level(t, 2).expect("level 2");
    let gray = level2.pixel(0, 0).expect("1x1");
    assert!(close(gray, &[128, 128, 128, 255]), "{gray:?}");
}

#[test]
fn odd_sizes_clamp_at_the_edge() {
    let Some(mut engine) = gpu_engine() else {
        return;
    };
    // 3x1: 0, 100, 200 in every channel
    let data = [0u8, 100, 200].iter().flat_map(|v| [*v; 4]).collect();
    let image = Image::new(3, 1, ImageFormat::Rgba8Premultiplied, data).expect("3x1");
    let t = mipmapped(&mut engine, (3, 1), image);
    assert_eq!(engine.texture_mip_levels(t), Some(2));

    let level1 = engine.read_texture_level(t, 1).expect("level 1");
    assert_eq!((level1.width(), level1.height()), (1, 1));
    let pixel = level1.pixel(0, 0).expect("1x1");
    assert!(close(pixel, &[50; 4]), "{pixel:?}");
}
