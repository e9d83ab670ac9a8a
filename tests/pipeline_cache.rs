// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
mod common;

use common::*;
use frames_in_flight::EngineConfig;
use frames_in_flight::images::pipeline::BlendMode;

#[test]
fn equal_states_share_a_pipeline() {
    let (control, mut engine) = engine();
    let red = solid([1.0, 0.0, 0.0, 1.0]);
    let blue = solid([0.0, 0.0, 1.0, 1.0]);

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&red));
    assert!(engine.finalize_pipeline(&red.clone()));
    assert!(engine.finalize_pipeline(&blue));
    let mut additive = blue.clone();
    additive.blend = BlendMode::Additive;
    assert!(engine.finalize_pipeline(&additive));
    engine.end_frame();

    let stats = engine.stats();
    assert_eq!(stats.pipeline_cache_misses, 3);
    assert_eq!(stats.pipeline_cache_hits, 1);
    assert_eq!(stats.root_signature_cache_misses, 1);
    assert_eq!(stats.root_signature_cache_hits, 2);
    let backend = control.stats();
    assert_eq!(backend.pipelines_created, 3);
    assert_eq!(backend.layouts_created, 1);
}

#[test]
fn evicted_pipelines_are_rebuilt_identically() {
    let config = EngineConfig {
        max_cached_pipelines: 1,
        ..EngineConfig::default()
    };
    let (control, mut engine) = engine_with(config, 1);
    let b = buffer(&mut engine, &[0; 12]);
    let red = solid([1.0, 0.0, 0.0, 1.0]);
    let green = solid([0.0, 1.0, 0.0, 1.0]);

    engine.begin_frame();
    for state in [&red, &green, &red] {
        assert!(engine.finalize_pipeline(state));
        engine.queue_draw(&triangles(b, 3));
    }
    engine.end_frame();

    let stats = engine.stats();
    assert_eq!(stats.pipeline_cache_misses, 3);
    assert_eq!(stats.pipeline_evictions, 2);
    assert_eq!(control.stats().pipelines_created, 3);

    // evicted pipelines stay alive for the draws already recorded
    let draws = control.draws();
    assert_eq!(draws.len(), 3);
    assert_eq!(draws[0].state, red);
    assert_eq!(draws[1].state, green);
    assert_eq!(draws[2].state, draws[0].state);
    assert_ne!(draws[2].pipeline, draws[0].pipeline);
    assert_eq!(draws[2].layout, draws[0].layout);
}

#[test]
fn root_signatures_are_cached_separately() {
    let config = EngineConfig {
        max_cached_root_signatures: 1,
        ..EngineConfig::default()
    };
    let (control, mut engine) = engine_with(config, 1);
    let plain = solid([1.0; 4]);
    let sampling = textured(2);

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&plain));
    assert!(engine.finalize_pipeline(&sampling));
    // the pipeline keeps its layout alive after the layout cache dropped it
    assert!(engine.finalize_pipeline(&plain));
    engine.end_frame();

    let stats = engine.stats();
    assert_eq!(stats.root_signature_cache_misses, 2);
    assert_eq!(stats.root_signature_evictions, 1);
    assert_eq!(stats.pipeline_cache_hits, 1);
    assert_eq!(control.stats().layouts_created, 2);
}

#[test]
fn sample_count_is_part_of_the_key() {
    let (control, mut engine) = engine_with(EngineConfig::default(), 4);
    let b = buffer(&mut engine, &[0; 12]);
    let rt = engine.gen_render_target();
    engine.create_render_target(rt, (8, 8), [0.0; 4], 1);
    let state = solid([1.0; 4]);

    engine.begin_frame();
    assert!(engine.finalize_pipeline(&state));
    engine.queue_set_render_target(rt);
    engine.queue_draw(&triangles(b, 3));
    engine.queue_set_render_target(0);
    engine.queue_draw(&triangles(b, 3));
    engine.end_frame();

    let stats = engine.stats();
    assert_eq!(stats.pipeline_cache_misses, 2);
    assert_eq!(stats.pipeline_cache_hits, 1);
    assert_eq!(stats.root_signature_cache_hits, 1);
    let draws = control.draws();
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].samples, 1);
    assert_eq!(draws[1].samples, 4);
    assert_ne!(draws[0].target, draws[1].target);
}

#[test]
fn a_new_frame_rebinds_the_pipeline() {
    let (control, mut engine) = engine();
    let b = buffer(&mut engine, &[0; 12]);
    let state = solid([1.0; 4]);
    for _ in 0..2 {
        engine.begin_frame();
        assert!(engine.finalize_pipeline(&state));
        engine.queue_draw(&triangles(b, 3));
        engine.queue_draw(&triangles(b, 3));
        engine.end_frame();
    }
    assert_eq!(engine.stats().pipeline_cache_hits, 1);
    assert_eq!(control.stats().pipeline_binds, 2);
    assert_eq!(control.stats().draws, 4);
}
