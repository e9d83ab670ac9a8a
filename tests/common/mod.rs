// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Shared setup for the integration tests.  Every test drives the headless backend.
#![allow(dead_code)]

use frames_in_flight::images::pipeline::{PipelineState, SamplerParams};
use frames_in_flight::images::render_pass::{DrawParams, DrawingMode};
use frames_in_flight::images::shader::{FragmentShader, VertexShader};
use frames_in_flight::images::view::View;
use frames_in_flight::{Device, Engine, EngineConfig, EntryPoint, HeadlessControl};

pub const SIZE: (u32, u32) = (32, 32);

const VERTEX: &str = "
@vertex
fn vs_main(@builtin(vertex_index) i: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(i & 1u) * 4 - 1);
    let y = f32(i32(i >> 1u) * 4 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}
";

pub fn engine_with(config: EngineConfig, samples: u32) -> (HeadlessControl, Engine) {
    let control = HeadlessControl::new();
    let device =
        Device::new(EntryPoint::headless_with(control.clone())).expect("headless device");
    let mut engine = Engine::new(device, config);
    engine
        .attach(View::offscreen(), SIZE, 1.0, samples, false)
        .expect("attach");
    (control, engine)
}

pub fn engine() -> (HeadlessControl, Engine) {
    engine_with(EngineConfig::default(), 1)
}

pub fn config(frames_in_flight: usize) -> EngineConfig {
    EngineConfig {
        frames_in_flight,
        ..EngineConfig::default()
    }
}

/// A pipeline whose fragment shader outputs `rgba`.  Different colors give different states.
pub fn solid(rgba: [f32; 4]) -> PipelineState {
    let fragment = format!(
        "@fragment\nfn fs_main() -> @location(0) vec4<f32> {{ return vec4<f32>({:?}, {:?}, {:?}, {:?}); }}\n",
        rgba[0], rgba[1], rgba[2], rgba[3]
    );
    PipelineState::new(VertexShader::new(VERTEX), FragmentShader::new(fragment))
}

/// A pipeline sampling `count` textures.
pub fn textured(count: usize) -> PipelineState {
    let mut state = solid([1.0, 1.0, 1.0, 1.0]);
    state.root_signature.textures = vec![SamplerParams::default(); count];
    state
}

pub fn triangles(vertex_buffer: u32, count: u32) -> DrawParams {
    DrawParams {
        mode: DrawingMode::Triangles,
        vertex_buffer,
        vertex_offset: 0,
        index_buffer: None,
        constant_buffer: 0,
        constant_offset: 0,
        count,
        first_index: 0,
    }
}

/// A buffer holding `data`, written between frames.
pub fn buffer(engine: &mut Engine, data: &[u8]) -> u32 {
    let id = engine.gen_buffer();
    engine.reset_buffer(id, data);
    id
}
