// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The buffer pool.

A buffer is a [Multibuffer]: the CPU copy is authoritative and each frame slot has its own backing
object, brought up to date lazily (only dirty ranges, only when the slot draws with it).
*/
use super::{Engine, Release, report};
use crate::imp::MemoryId;
use crate::multibuffer::Multibuffer;

impl Engine {
    /// A new, empty buffer.
    pub fn gen_buffer(&mut self) -> u32 {
        let slots = self.config.frames_in_flight;
        self.buffers.generate(Multibuffer::new(slots))
    }

    /// Slot whose copy in-frame writes land in, or `None` between frames.
    fn write_slot(&mut self, id: u32) -> Option<usize> {
        if !self.frame.in_frame {
            return None;
        }
        let gpu = self.gpu.as_mut()?;
        let slot = gpu.slots.active_mut();
        slot.buffers_written.insert(id);
        Some(gpu.slots.active_index())
    }

    /// Replaces the content of buffer `id` with `data`; everything becomes dirty.
    pub fn reset_buffer(&mut self, id: u32, data: &[u8]) {
        if self.buffers.get(id).is_none() {
            logwise::warn_sync!("reset_buffer on unknown buffer {id}", id = id);
            return;
        }
        let slot = self.write_slot(id);
        if let Some(buffer) = self.buffers.get_mut(id) {
            buffer.reset(data, slot);
        }
    }

    /// Marks `[offset, offset + size)` of buffer `id` as changed, after writing through
    /// [Self::buffer_data_mut].
    pub fn mark_buffer_dirty(&mut self, id: u32, offset: u64, size: u64) {
        let Some(len) = self.buffer_len(id) else {
            logwise::warn_sync!("mark_buffer_dirty on unknown buffer {id}", id = id);
            return;
        };
        if offset >= len || size == 0 {
            return;
        }
        let slot = self.write_slot(id);
        if let Some(buffer) = self.buffers.get_mut(id) {
            buffer.mark_dirty(offset, size.min(len - offset), slot);
        }
    }

    /// Copies `bytes` into buffer `id` at `offset` and marks them dirty.  Writes past the end are
    /// ignored.
    pub fn write_buffer(&mut self, id: u32, offset: u64, bytes: &[u8]) {
        if self.buffers.get(id).is_none() {
            logwise::warn_sync!("write_buffer on unknown buffer {id}", id = id);
            return;
        }
        let slot = self.write_slot(id);
        let written = self
            .buffers
            .get_mut(id)
            .is_some_and(|buffer| buffer.write(offset, bytes, slot));
        if !written {
            logwise::warn_sync!(
                "write_buffer past the end of buffer {id}",
                id = id
            );
        }
    }

    /// The authoritative CPU copy.  Follow writes with [Self::mark_buffer_dirty].
    pub fn buffer_data_mut(&mut self, id: u32) -> Option<&mut [u8]> {
        self.buffers.get_mut(id).map(Multibuffer::data_mut)
    }

    pub fn buffer_data(&self, id: u32) -> Option<&[u8]> {
        self.buffers.get(id).map(Multibuffer::data)
    }

    pub fn buffer_len(&self, id: u32) -> Option<u64> {
        self.buffers.get(id).map(Multibuffer::len)
    }

    /**
    Releases buffer `id`.

    Its backing objects are destroyed, and its ID reused, only once every frame that could have
    drawn with them has retired.
    */
    pub fn release_buffer(&mut self, id: u32) {
        let frame = self.frame;
        let Some(buffer) = self.buffers.mark_pending_release(id) else {
            logwise::warn_sync!("release_buffer on unknown buffer {id}", id = id);
            return;
        };
        let Some(gpu) = &mut self.gpu else {
            self.buffers.free(id);
            return;
        };
        // draws recorded earlier in this frame still need the final content
        if frame.in_frame && gpu.recording.buffers_used.remove(&id) {
            if let Err(e) = buffer.sync(gpu.slots.active_index(), gpu.backend.as_ref()) {
                report(&self.device, gpu.generation, "buffer update", &e);
            }
        }
        for backing in buffer.take_backings() {
            gpu.retire(frame, Box::new(backing));
        }
        gpu.release(frame, Release::Buffer(id));
    }

    /**
    Makes sure the active slot has a backing object for buffer `id` and notes that the command
    list uses it, so it is brought up to date before submission.
    */
    pub(super) fn prepare_buffer(&mut self, id: u32) -> Option<(MemoryId, u64)> {
        let frame = self.frame;
        let gpu = self.gpu.as_mut()?;
        let Some(buffer) = self.buffers.get_mut(id) else {
            logwise::warn_sync!("Draw uses unknown buffer {id}", id = id);
            return None;
        };
        let slot = gpu.slots.active_index();
        match buffer.ensure_backing(slot, &gpu.backend, self.config.buffer_alignment) {
            Ok(Some(old)) => gpu.retire(frame, Box::new(old)),
            Ok(None) => {}
            Err(e) => {
                report(&self.device, gpu.generation, "buffer creation", &e);
                return None;
            }
        }
        gpu.recording.buffers_used.insert(id);
        Some((buffer.backing(slot)?, buffer.len()))
    }
}
