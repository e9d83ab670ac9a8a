// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The frame bracket.

Frame `k` records into slot `k % F`.  Before a slot is reused its previous frame must have retired,
which is the only place the steady state blocks.  Once it has, everything that slot was holding
for deletion goes, and dirty ranges written while the other slots were active are carried into it.
*/
use logwise::privacy::LogIt;

use super::{Engine, GpuState, Release, report};
use crate::images::device::Device;
use crate::imp::{Backend, Command, FenceId, QueueKind, Submission};
use crate::multibuffer::CarryForward;

impl Engine {
    /**
    Begins recording the next frame.

    Blocks while the slot about to be reused still has a frame in flight, and, when a swap chain
    latency limit is configured, until no more than that many frames are queued.  Rebuilds device
    objects first if the device was lost.
    */
    pub fn begin_frame(&mut self) {
        if self.frame.opened_by_layer {
            self.frame.opened_by_layer = false;
            return;
        }
        if self.frame.in_frame {
            logwise::warn_sync!("begin_frame inside a frame");
            return;
        }
        if !self.ensure_gpu() {
            logwise::warn_sync!("begin_frame without device resources");
            return;
        }
        let frame_index = self.frame.index;
        let latency = self.config.waitable_swap_chain_max_latency as u64;
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if latency > 0 && frame_index > latency {
            wait_for_frames(gpu, frame_index - latency, &self.device);
        }
        let slot_index = gpu.slots.active_index();
        debug_assert_eq!(slot_index, gpu.slots.slot_for_frame(frame_index));
        let backend = gpu.backend.clone();
        let slot = gpu.slots.active_mut();
        if backend.completed_value(slot.fence.id()) < slot.fence_value {
            let interval = logwise::perfwarn_begin!("begin_frame waits for a frame slot");
            let result = backend.wait_fence(slot.fence.id(), slot.fence_value);
            drop(interval);
            if let Err(e) = result {
                report(&self.device, gpu.generation, "frame slot wait", &e);
            }
        }
        // the slot's previous frame has retired
        slot.retired.clear();
        let releases = std::mem::take(&mut slot.releases);
        slot.retired.append(&mut slot.out_of_frame_retired);
        slot.releases = std::mem::take(&mut slot.out_of_frame_releases);
        slot.gpu_heap.reset();
        let heap = slot.gpu_heap.id();
        let written = std::mem::take(&mut slot.buffers_written);
        let released = releases.len();
        for release in &releases {
            if let Release::View(handle) = release {
                gpu.descriptors.release(*handle);
            }
        }
        for release in releases {
            self.free_id(release);
        }
        if released > 0 {
            logwise::debuginternal_sync!(
                "Slot {slot} freed {count} released resources",
                slot = slot_index,
                count = released
            );
        }
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        let completed_upload = gpu.backend.completed_value(gpu.upload_fence.id());
        for (_, texture) in self.textures.iter_mut() {
            if texture.fence_value <= completed_upload {
                texture.fence_value = 0;
            }
        }

        for id in &written {
            if let Some(buffer) = self.buffers.get_mut(*id) {
                buffer.begin_slot(slot_index);
            }
        }
        let frames = gpu.slots.capacity() as u64;
        for delta in 1..frames {
            let Some(previous_frame) = frame_index.checked_sub(delta) else {
                break;
            };
            let from = gpu.slots.slot_for_frame(previous_frame);
            let Some(from_slot) = gpu.slots.get(from) else {
                continue;
            };
            for id in &from_slot.buffers_written {
                let Some(buffer) = self.buffers.get_mut(*id) else {
                    continue;
                };
                match buffer.carry_forward(slot_index, from) {
                    CarryForward::Merged => self.stats.carry_forward_merges += 1,
                    CarryForward::Invalidated => self.stats.carry_forward_invalidations += 1,
                }
            }
        }

        gpu.recording = Default::default();
        gpu.recording.commands.push(Command::SetHeap(heap));
        self.frame.in_frame = true;
        self.stats.frames_begun += 1;
        self.set_target(0);
        logwise::trace_sync!(
            "begin_frame {frame} on slot {slot}",
            frame = frame_index,
            slot = slot_index
        );
    }

    /// Submits the frame.  The slot's fence is signaled with `frame_index + 1` once it retires.
    pub fn end_frame(&mut self) {
        if !self.frame.in_frame {
            logwise::warn_sync!("end_frame outside a frame");
            return;
        }
        if self.frame.layer_depth > 0 {
            logwise::warn_sync!(
                "end_frame with {depth} open layers",
                depth = self.frame.layer_depth
            );
        }
        if !self.poll_device() {
            return;
        }
        let frame_index = self.frame.index;
        let present_index = self.present_index;
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        if let (Some(msaa), Some(back)) = (
            &gpu.default_target.msaa,
            gpu.default_target.back_buffer(present_index),
        ) {
            gpu.recording.commands.push(Command::Resolve {
                source: msaa.id(),
                target: back,
            });
        }
        let value = frame_index + 1;
        let slot = gpu.slots.active_mut();
        slot.fence_value = value;
        let signal = (slot.fence.id(), value);
        self.submit_recording(Some(signal));
        if let Some(gpu) = &mut self.gpu {
            gpu.slots.advance();
        }
        self.frame.in_frame = false;
        self.frame.opened_by_layer = false;
        self.frame.layer_depth = 0;
        self.frame.index += 1;
        logwise::trace_sync!("end_frame {frame}", frame = frame_index);
    }

    /**
    Opens an offscreen sub-frame.

    Outside a frame this begins one early; the caller's next [Self::begin_frame] then continues it
    instead of beginning another.
    */
    pub fn begin_layer(&mut self) {
        if !self.frame.in_frame {
            self.begin_frame();
            if !self.frame.in_frame {
                return;
            }
            self.frame.opened_by_layer = true;
        }
        self.frame.layer_depth += 1;
    }

    /// Submits what the layer recorded so later work in the frame can sample it.  The frame stays
    /// open.
    pub fn end_layer(&mut self) {
        if self.frame.layer_depth == 0 {
            logwise::warn_sync!("end_layer without begin_layer");
            return;
        }
        self.frame.layer_depth -= 1;
        if !self.frame.in_frame || !self.poll_device() {
            return;
        }
        self.submit_recording(None);
        self.restore_recording_state();
    }

    /**
    Shows the current back buffer.

    A lost device starts recovery; any other failure drops the frame.
    */
    pub fn present(&mut self) {
        if self.frame.in_frame {
            logwise::warn_sync!("present inside a frame");
        }
        if !self.poll_device() {
            return;
        }
        let present_index = self.present_index;
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let Some(image) = gpu.default_target.back_buffer(present_index) else {
            return;
        };
        match gpu.surface.present(image) {
            Ok(()) => self.stats.presents += 1,
            Err(e) if e.is_device_lost() => {
                self.device.device_loss_detected(gpu.generation);
                self.poll_device();
            }
            Err(e) => {
                self.stats.dropped_presents += 1;
                logwise::warn_sync!(
                    "Present failed, dropping frame: {e}",
                    e = LogIt(&e)
                );
            }
        }
        self.present_index += 1;
    }

    /// Blocks until all submitted GPU work has finished.  Not for the steady state.
    pub fn wait_gpu(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        gpu.global_fence_value += 1;
        let value = gpu.global_fence_value;
        let fence = gpu.global_fence.id();
        let mut submission = Submission::new(QueueKind::Main, Vec::new());
        if gpu.upload_fence_value > 0 {
            submission
                .waits
                .push((gpu.upload_fence.id(), gpu.upload_fence_value));
        }
        submission.signal = Some((fence, value));
        let interval = logwise::perfwarn_begin!("wait_gpu");
        let result = gpu
            .backend
            .submit(submission)
            .and_then(|()| gpu.backend.wait_fence(fence, value));
        drop(interval);
        if let Err(e) = result {
            report(&self.device, gpu.generation, "wait_gpu", &e);
        }
    }

    /// Frames whose GPU work has finished.  Frames are numbered from 0, so this is also the index
    /// of the oldest frame still in flight.
    pub fn completed_frames(&self) -> u64 {
        self.gpu.as_ref().map_or(0, GpuState::completed_frames)
    }

    /**
    Closes the command list and submits it on the main queue.

    Buffers the list used are brought up to date in the active slot first.  Mip generation queued
    during recording runs ahead of the list's own commands, after the upload wait.
    */
    pub(super) fn submit_recording(&mut self, signal: Option<(FenceId, u64)>) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };
        let slot = gpu.slots.active_index();
        for id in std::mem::take(&mut gpu.recording.buffers_used) {
            let Some(buffer) = self.buffers.get_mut(id) else {
                continue;
            };
            match buffer.sync(slot, gpu.backend.as_ref()) {
                Ok(0) => {}
                Ok(ranges) => {
                    logwise::trace_sync!(
                        "Copied {ranges} ranges of buffer {id}",
                        ranges = ranges,
                        id = id
                    );
                }
                Err(e) => {
                    // ranges stay pending and are copied the next time the slot uses the buffer
                    report(&self.device, gpu.generation, "buffer update", &e);
                }
            }
        }
        let recording = &mut gpu.recording;
        let mut commands = std::mem::take(&mut recording.prologue);
        commands.append(&mut recording.commands);
        let mut submission = Submission::new(QueueKind::Main, commands);
        if recording.upload_wait > 0 {
            submission
                .waits
                .push((gpu.upload_fence.id(), recording.upload_wait));
            recording.upload_wait = 0;
        }
        submission.signal = signal;
        recording.draw_calls = 0;
        match gpu.backend.submit(submission) {
            Ok(()) => self.stats.command_lists_submitted += 1,
            Err(e) => report(&self.device, gpu.generation, "submit", &e),
        }
    }
}

/// Blocks until at least `frames` frames have retired.
fn wait_for_frames(gpu: &GpuState, frames: u64, device: &Device) {
    if gpu.completed_frames() >= frames {
        return;
    }
    // frames finish in order, so the slot of frame `frames - 1` decides
    let slot = gpu.slots.slot_for_frame(frames - 1);
    let Some(slot) = gpu.slots.get(slot) else {
        return;
    };
    if slot.fence_value < frames {
        return;
    }
    let backend: &dyn Backend = gpu.backend.as_ref();
    let interval = logwise::perfwarn_begin!("swap chain latency wait");
    let result = backend.wait_fence(slot.fence.id(), frames);
    drop(interval);
    if let Err(e) = result {
        report(device, gpu.generation, "latency wait", &e);
    }
}
