// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Render state, pipeline resolution and draws.

Render state set through the `queue_*` operations is remembered in the recording, so it can be
replayed at the top of a new command list when a long frame is split.  Pipeline and layout binds
are recorded only when they differ from what the previous draw bound.
*/
use std::sync::Arc;

use super::{
    ActivePipeline, CachedPipeline, Engine, FrameState, FrameStats, GpuState, PipelineKey,
    TargetState, report,
};
use crate::bindings::descriptors::ViewRecord;
use crate::images::pipeline::{PipelineState, RootSignatureKey};
use crate::images::render_pass::{DepthStencilClear, DrawParams, Rect};
use crate::imp::{self, Command, LayoutId, Owned, PipelineId};

impl Engine {
    /// `true` when recording is possible.  Recording outside a frame is a logged no-op.
    pub(super) fn recording(&mut self, what: &'static str) -> bool {
        if !self.frame.in_frame {
            logwise::warn_sync!("{what} outside a frame", what = what);
            return false;
        }
        self.poll_device()
    }

    pub fn queue_viewport(&mut self, rect: Rect) {
        if !self.recording("queue_viewport") {
            return;
        }
        if let Some(gpu) = &mut self.gpu {
            gpu.recording.viewport = rect;
            gpu.recording.commands.push(Command::Viewport(rect));
        }
    }

    /// The scissor is clamped to the render target.  Draws under an empty scissor are skipped.
    pub fn queue_scissor(&mut self, rect: Rect) {
        if !self.recording("queue_scissor") {
            return;
        }
        if let Some(gpu) = &mut self.gpu {
            let rect = match gpu.recording.target {
                Some(target) => rect.clamped(target.width, target.height),
                None => rect,
            };
            gpu.recording.scissor = Some(rect);
            gpu.recording.commands.push(Command::Scissor(rect));
        }
    }

    /// Renders into render target `id` from now on; 0 is the default target.
    pub fn queue_set_render_target(&mut self, id: u32) {
        if !self.recording("queue_set_render_target") {
            return;
        }
        self.set_target(id);
    }

    /// The render target draws currently land in; 0 is the default target.
    pub fn active_render_target(&self) -> u32 {
        self.gpu
            .as_ref()
            .and_then(|gpu| gpu.recording.target)
            .map_or(0, |target| target.id)
    }

    pub fn queue_clear_render_target(&mut self, color: [f32; 4]) {
        if !self.recording("queue_clear_render_target") {
            return;
        }
        if let Some(gpu) = &mut self.gpu {
            gpu.recording.commands.push(Command::ClearColor(color));
        }
    }

    pub fn queue_clear_depth_stencil(&mut self, depth: f32, stencil: u8, which: DepthStencilClear) {
        if !self.recording("queue_clear_depth_stencil") {
            return;
        }
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if gpu.recording.target.and_then(|t| t.depth).is_none() {
            logwise::warn_sync!("Depth clear on a target without depth");
            return;
        }
        let (depth, stencil) = match which {
            DepthStencilClear::Depth => (Some(depth), None),
            DepthStencilClear::Stencil => (None, Some(stencil)),
            DepthStencilClear::Both => (Some(depth), Some(stencil)),
        };
        gpu.recording
            .commands
            .push(Command::ClearDepthStencil { depth, stencil });
    }

    pub fn queue_set_blend_factor(&mut self, factor: [f32; 4]) {
        if !self.recording("queue_set_blend_factor") {
            return;
        }
        if let Some(gpu) = &mut self.gpu {
            gpu.recording.blend_factor = factor;
            gpu.recording.commands.push(Command::BlendFactor(factor));
        }
    }

    pub fn queue_set_stencil_ref(&mut self, reference: u32) {
        if !self.recording("queue_set_stencil_ref") {
            return;
        }
        if let Some(gpu) = &mut self.gpu {
            gpu.recording.stencil_ref = reference;
            gpu.recording.commands.push(Command::StencilRef(reference));
        }
    }

    /**
    Resolves the pipeline for `state` and makes it the one the next draws use.

    Pipelines are cached per state and render target sample count, layouts per
    [RootSignatureKey].  A miss creates the objects; an evicted entry is retired like any other
    GPU object, and an equal state finalized later simply gets a new one.  `false` when the
    pipeline could not be created.
    */
    pub fn finalize_pipeline(&mut self, state: &PipelineState) -> bool {
        if !self.recording("finalize_pipeline") {
            return false;
        }
        let frame = self.frame;
        let Some(gpu) = &mut self.gpu else {
            return false;
        };
        let samples = gpu.recording.target.map_or(1, |target| target.samples);
        let key = PipelineKey {
            state: state.clone(),
            samples,
        };
        let cached = gpu
            .pipelines
            .get(&key)
            .map(|cached| (cached.pipeline.id(), cached.layout.id()));
        let (pipeline, layout) = match cached {
            Some(ids) => {
                self.stats.pipeline_cache_hits += 1;
                ids
            }
            None => {
                self.stats.pipeline_cache_misses += 1;
                match create_pipeline(gpu, frame, &mut self.stats, key) {
                    Ok(ids) => ids,
                    Err(e) => {
                        report(&self.device, gpu.generation, "pipeline creation", &e);
                        gpu.recording.active_pipeline = None;
                        gpu.recording.pipeline_state = None;
                        return false;
                    }
                }
            }
        };
        gpu.recording.active_pipeline = Some(ActivePipeline {
            pipeline,
            layout,
            texture_count: state.root_signature.texture_count(),
            topology: state.topology,
            stride: state.vertex_stride,
            samples,
        });
        gpu.recording.pipeline_state = Some(state.clone());
        true
    }

    /**
    Records a draw with the finalized pipeline and the textures registered since the last draw.

    The draw is skipped when the scissor is empty.  It is rejected (with a warning) when no
    pipeline is finalized, when `params.mode` is not the pipeline's topology, when the number of
    registered textures is not what the pipeline's layout declares, or when a buffer is missing.
    */
    pub fn queue_draw(&mut self, params: &DrawParams) {
        if !self.recording("queue_draw") {
            return;
        }
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let textures = std::mem::take(&mut gpu.recording.pending_textures);
        if gpu.recording.scissor.is_some_and(|s| s.is_empty()) {
            self.stats.draws_skipped_empty_scissor += 1;
            return;
        }
        let Some(active) = gpu.recording.active_pipeline else {
            self.reject_draw("no pipeline is finalized");
            return;
        };
        if gpu.recording.target.is_none() {
            self.reject_draw("no render target");
            return;
        }
        if params.mode != active.topology {
            self.reject_draw("the drawing mode differs from the pipeline's topology");
            return;
        }
        if textures.len() as u32 != active.texture_count {
            logwise::warn_sync!(
                "Draw registers {count} textures, its pipeline wants {expected}",
                count = textures.len(),
                expected = active.texture_count
            );
            self.stats.draws_rejected += 1;
            return;
        }

        let Some((vertex, vertex_len)) = self.prepare_buffer(params.vertex_buffer) else {
            self.reject_draw("the vertex buffer is not usable");
            return;
        };
        let constant = match params.constant_buffer {
            0 => None,
            id => match self.prepare_buffer(id) {
                Some((memory, _)) => Some(memory),
                None => {
                    self.reject_draw("the constant buffer is not usable");
                    return;
                }
            },
        };
        let index = match params.index_buffer {
            None => None,
            Some(binding) => match self.prepare_buffer(binding.buffer) {
                Some((memory, len)) => Some((memory, len, binding.format)),
                None => {
                    self.reject_draw("the index buffer is not usable");
                    return;
                }
            },
        };

        let frame = self.frame;
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let mut commands = Vec::new();
        if !textures.is_empty() {
            match bind_textures(gpu, frame, textures) {
                Ok((grew, table)) => {
                    if grew {
                        self.stats.gpu_heap_growths += 1;
                    }
                    commands.extend(table);
                }
                Err(e) => {
                    report(&self.device, gpu.generation, "descriptor table", &e);
                    return;
                }
            }
        }
        let recording = &mut gpu.recording;
        if recording.bound_layout != Some(active.layout) {
            commands.push(Command::SetLayout(active.layout));
            recording.bound_layout = Some(active.layout);
        }
        if recording.bound_pipeline != Some(active.pipeline) {
            commands.push(Command::SetPipeline(active.pipeline));
            recording.bound_pipeline = Some(active.pipeline);
        }
        if let Some(memory) = constant {
            commands.push(Command::SetConstantBuffer {
                memory,
                offset: params.constant_offset,
            });
        }
        commands.push(Command::SetVertexBuffer {
            memory: vertex,
            offset: params.vertex_offset,
            size: vertex_len.saturating_sub(params.vertex_offset),
            stride: active.stride,
        });
        let first_index = match index {
            Some((memory, size, format)) => {
                commands.push(Command::SetIndexBuffer {
                    memory,
                    size,
                    format,
                });
                Some(params.first_index)
            }
            None => None,
        };
        commands.push(Command::Draw {
            count: params.count,
            first_index,
        });
        recording.commands.append(&mut commands);
        recording.draw_calls += 1;
        self.stats.draws_recorded += 1;
        if recording.draw_calls >= self.config.max_draw_calls_per_list {
            logwise::debuginternal_sync!(
                "Splitting the command list after {count} draws",
                count = recording.draw_calls
            );
            self.submit_recording(None);
            self.restore_recording_state();
        }
    }

    fn reject_draw(&mut self, reason: &'static str) {
        logwise::warn_sync!("Draw rejected: {reason}", reason = reason);
        self.stats.draws_rejected += 1;
    }

    /**
    Points draws at target `id` (0 for the default target) with a full viewport and scissor.

    When the sample count changes, the active pipeline is resolved again for the new count.
    */
    pub(super) fn set_target(&mut self, id: u32) {
        let present_index = self.present_index;
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let target = if id == 0 {
            let default = &gpu.default_target;
            default
                .render_view(present_index)
                .and_then(|rtv| gpu.view_image(rtv))
                .map(|color| TargetState {
                    id: 0,
                    color,
                    depth: gpu.view_image(default.dsv),
                    samples: default.samples,
                    width: default.width,
                    height: default.height,
                })
        } else {
            self.render_targets
                .get(id)
                .and_then(|entry| entry.target_state(id, &gpu.descriptors))
        };
        let Some(target) = target else {
            logwise::warn_sync!("Render target {id} is not usable", id = id);
            return;
        };
        let full = Rect::new(0, 0, target.width, target.height);
        let recording = &mut gpu.recording;
        let resample = recording
            .active_pipeline
            .is_some_and(|active| active.samples != target.samples);
        recording.target = Some(target);
        recording.viewport = full;
        recording.scissor = Some(full);
        recording.commands.push(Command::SetRenderTarget {
            color: target.color,
            depth: target.depth,
        });
        recording.commands.push(Command::Scissor(full));
        if resample {
            if let Some(state) = recording.pipeline_state.clone() {
                self.finalize_pipeline(&state);
            }
        }
    }

    /// Replays render state at the top of a fresh command list.  Pipeline and layout are rebound
    /// by the next draw.
    pub(super) fn restore_recording_state(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let heap = gpu.slots.active().gpu_heap.id();
        let recording = &mut gpu.recording;
        recording.commands.push(Command::SetHeap(heap));
        if let Some(target) = recording.target {
            recording.commands.push(Command::SetRenderTarget {
                color: target.color,
                depth: target.depth,
            });
        }
        recording.commands.push(Command::Viewport(recording.viewport));
        if let Some(scissor) = recording.scissor {
            recording.commands.push(Command::Scissor(scissor));
        }
        recording
            .commands
            .push(Command::BlendFactor(recording.blend_factor));
        recording
            .commands
            .push(Command::StencilRef(recording.stencil_ref));
        recording.bound_layout = None;
        recording.bound_pipeline = None;
    }
}

fn root_signature(
    gpu: &mut GpuState,
    frame: FrameState,
    stats: &mut FrameStats,
    key: &RootSignatureKey,
) -> Result<Arc<Owned<LayoutId>>, imp::Error> {
    if let Some(layout) = gpu.root_signatures.get(key) {
        stats.root_signature_cache_hits += 1;
        return Ok(layout.clone());
    }
    stats.root_signature_cache_misses += 1;
    let layout = Arc::new(Owned::new(&gpu.backend, gpu.backend.create_layout(key)?));
    if let Some((_, evicted)) = gpu.root_signatures.insert(key.clone(), layout.clone()) {
        stats.root_signature_evictions += 1;
        gpu.retire(frame, Box::new(evicted));
    }
    Ok(layout)
}

fn create_pipeline(
    gpu: &mut GpuState,
    frame: FrameState,
    stats: &mut FrameStats,
    key: PipelineKey,
) -> Result<(PipelineId, LayoutId), imp::Error> {
    let layout = root_signature(gpu, frame, stats, &key.state.root_signature)?;
    let id = gpu
        .backend
        .create_pipeline(layout.id(), &key.state, key.samples)?;
    let pipeline = Owned::new(&gpu.backend, id);
    logwise::debuginternal_sync!(
        "Created pipeline {id} for {samples}x samples",
        id = id.0,
        samples = key.samples
    );
    let ids = (pipeline.id(), layout.id());
    if let Some((_, evicted)) = gpu
        .pipelines
        .insert(key, CachedPipeline { pipeline, layout })
    {
        stats.pipeline_evictions += 1;
        gpu.retire(frame, Box::new(evicted.pipeline));
        gpu.retire(frame, Box::new(evicted.layout));
    }
    Ok(ids)
}

/**
Copies `views` into the next range of the active slot's GPU heap.

Returns whether the heap had to grow, and the commands that write and bind the range.  A grown
heap replaces the old one, which is retired.
*/
fn bind_textures(
    gpu: &mut GpuState,
    frame: FrameState,
    views: Vec<ViewRecord>,
) -> Result<(bool, Vec<Command>), imp::Error> {
    let count = views.len() as u32;
    let backend = gpu.backend.clone();
    let slot = gpu.slots.active_mut();
    let (start, old) = slot.gpu_heap.allocate(count, &backend)?;
    let heap = slot.gpu_heap.id();
    let mut commands = Vec::new();
    let grew = old.is_some();
    if let Some(old) = old {
        logwise::debuginternal_sync!(
            "GPU descriptor heap grew to {capacity}",
            capacity = slot.gpu_heap.capacity()
        );
        gpu.retire(frame, Box::new(old));
        commands.push(Command::SetHeap(heap));
    }
    commands.push(Command::WriteDescriptors { heap, start, views });
    commands.push(Command::SetDescriptorTable { heap, start, count });
    Ok((grew, commands))
}
