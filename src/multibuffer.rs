// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Multibuffering implementation.

The main idea is,

1.  We have one CPU-side copy of a buffer, which is authoritative.
2.  We have one GPU-visible object per frame slot, because the GPU may still be reading the copy a
    previous frame used.
3.  Writes go to the CPU side and are remembered as dirty ranges.  When a slot's object is about to
    be used, only its dirty ranges are copied.

Each slot tracks two lists:

* `pending`: ranges its object does not have yet.  Only a successful copy clears this.
* `written`: ranges written while this slot was the active one.  When a slot is reactivated, the
  `written` lists of the other slots' recent frames are merged into its `pending`, since those
  writes landed only in objects that slot never sees.

Because `pending` survives until it is copied, a buffer that skips a few frames between draws
still catches up fully.
*/
use std::sync::Arc;

use crate::bindings::dirty_tracking::DirtyList;
use crate::bittricks::aligned_size;
use crate::imp::{Backend, Error, MemoryId, Owned};

#[derive(Debug, Default)]
struct InFlightData {
    backing: Option<Owned<MemoryId>>,
    capacity: u64,
    /// Length of the authoritative data when this object was last brought up to date.
    data_size: u64,
    pending: DirtyList,
    written: DirtyList,
}

/// What [Multibuffer::carry_forward] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CarryForward {
    Merged,
    /// The slot's object is missing or sized for older content; it will be rewritten in full.
    Invalidated,
}

#[derive(Debug)]
pub(crate) struct Multibuffer {
    data: Vec<u8>,
    slots: Vec<InFlightData>,
}

impl Multibuffer {
    pub(crate) fn new(slot_count: usize) -> Self {
        Multibuffer {
            data: Vec::new(),
            slots: (0..slot_count).map(|_| InFlightData::default()).collect(),
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Replaces the content.  Everything is dirty: for the active slot, or for every slot when
    /// written outside a frame.
    ///
    /// A new length leaves every slot's ranges describing the old layout, so each slot is
    /// rewritten in full.
    pub(crate) fn reset(&mut self, data: &[u8], active: Option<usize>) {
        let resized = self.data.len() != data.len();
        self.data.clear();
        self.data.extend_from_slice(data);
        let size = self.len();
        if resized {
            for slot in &mut self.slots {
                slot.pending.mark_all(size);
                slot.written.clear();
            }
        }
        self.mark_dirty(0, size, active);
    }

    pub(crate) fn mark_dirty(&mut self, offset: u64, size: u64, active: Option<usize>) {
        let buffer_size = self.len();
        match active {
            Some(active) => {
                if let Some(slot) = self.slots.get_mut(active) {
                    slot.pending.add(offset, size, buffer_size);
                    slot.written.add(offset, size, buffer_size);
                }
            }
            // no frame is recording, so no slot is about to be copied; every slot must catch up
            None => {
                for slot in &mut self.slots {
                    slot.pending.add(offset, size, buffer_size);
                }
            }
        }
    }

    /// Copies `bytes` in at `offset` and marks them dirty.  `false` when out of bounds.
    pub(crate) fn write(&mut self, offset: u64, bytes: &[u8], active: Option<usize>) -> bool {
        let Some(end) = offset.checked_add(bytes.len() as u64) else {
            return false;
        };
        if end > self.len() {
            return false;
        }
        self.data[offset as usize..end as usize].copy_from_slice(bytes);
        self.mark_dirty(offset, bytes.len() as u64, active);
        true
    }

    /// Forgets what was written the last time `active` was the active slot.
    pub(crate) fn begin_slot(&mut self, active: usize) {
        if let Some(slot) = self.slots.get_mut(active) {
            slot.written.clear();
        }
    }

    /// Merges the writes made while `from` was active into `active`'s pending list.
    pub(crate) fn carry_forward(&mut self, active: usize, from: usize) -> CarryForward {
        let size = self.len();
        if active == from || from >= self.slots.len() || active >= self.slots.len() {
            return CarryForward::Merged;
        }
        let written = self.slots[from].written.clone();
        let slot = &mut self.slots[active];
        if slot.backing.is_some() && slot.data_size == size {
            slot.pending.extend_from(&written, size);
            CarryForward::Merged
        } else {
            slot.pending.mark_all(size);
            CarryForward::Invalidated
        }
    }

    /**
    Makes sure `active` has an object large enough for the current content.

    A replaced object is returned so it can be retired once no frame references it.  Objects grow
    to `aligned_size(len, alignment)` and never shrink; a new object is dirty in full.
    */
    pub(crate) fn ensure_backing(
        &mut self,
        active: usize,
        backend: &Arc<dyn Backend>,
        alignment: u64,
    ) -> Result<Option<Owned<MemoryId>>, Error> {
        let size = self.len();
        let Some(slot) = self.slots.get_mut(active) else {
            return Ok(None);
        };
        let mut retired = None;
        if slot.backing.is_none() || size > slot.capacity {
            let capacity = aligned_size(size.max(1), alignment);
            let id = backend.create_memory(capacity, "buffer")?;
            retired = slot.backing.replace(Owned::new(backend, id));
            slot.capacity = capacity;
            slot.pending.mark_all(size);
        }
        slot.data_size = size;
        Ok(retired)
    }

    /**
    Copies `active`'s pending ranges into its object.

    On failure the ranges stay pending and are retried the next time the slot is used.
    */
    pub(crate) fn sync(&mut self, active: usize, backend: &dyn Backend) -> Result<usize, Error> {
        let Some(slot) = self.slots.get_mut(active) else {
            return Ok(0);
        };
        let Some(backing) = &slot.backing else {
            return Ok(0);
        };
        if slot.pending.is_empty() {
            return Ok(0);
        }
        let writes: Vec<(u64, &[u8])> = slot
            .pending
            .ranges()
            .iter()
            .map(|r| (r.offset, &self.data[r.offset as usize..r.end() as usize]))
            .collect();
        backend.write_memory(backing.id(), &writes)?;
        let copied = writes.len();
        slot.pending.clear();
        Ok(copied)
    }

    pub(crate) fn backing(&self, slot: usize) -> Option<MemoryId> {
        self.slots.get(slot)?.backing.as_ref().map(Owned::id)
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, slot: usize) -> Option<&DirtyList> {
        self.slots.get(slot).map(|s| &s.pending)
    }

    /// Takes every slot's object, e.g. for retirement on release.  Slots forget their state.
    pub(crate) fn take_backings(&mut self) -> Vec<Owned<MemoryId>> {
        self.slots
            .iter_mut()
            .filter_map(|slot| {
                slot.capacity = 0;
                slot.data_size = 0;
                slot.pending.clear();
                slot.written.clear();
                slot.backing.take()
            })
            .collect()
    }

    /// After device loss: objects are gone, so every slot must be rewritten in full.
    pub(crate) fn drop_backings(&mut self) {
        let size = self.len();
        for slot in &mut self.slots {
            slot.backing = None;
            slot.capacity = 0;
            slot.data_size = 0;
            slot.written.clear();
            slot.pending.mark_all(size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_forward_needs_matching_backing() {
        let mut b = Multibuffer::new(2);
        b.reset(&[0; 64], Some(0));
        assert!(b.pending(1).unwrap().is_empty());
        b.begin_slot(1);
        assert_eq!(b.carry_forward(1, 0), CarryForward::Invalidated);
        assert!(b.pending(1).unwrap().is_full(64));
        assert!(b.write(8, &[1, 2], Some(1)));
        assert!(!b.write(63, &[1, 2], Some(1)));
        assert_eq!(b.data()[8..10], [1, 2]);
    }

    #[test]
    fn shrinking_drops_ranges_past_the_end() {
        let mut b = Multibuffer::new(2);
        b.reset(&[0; 64], None);
        assert!(b.write(32, &[1; 32], Some(0)));
        b.reset(&[2; 16], Some(0));
        for slot in 0..2 {
            let pending = b.pending(slot).unwrap();
            assert!(pending.is_full(16));
            assert_eq!(pending.ranges()[0].end(), 16);
        }
    }

    #[test]
    fn out_of_frame_writes_reach_every_slot() {
        let mut b = Multibuffer::new(3);
        b.reset(&[0; 32], None);
        for slot in 0..3 {
            assert!(b.pending(slot).unwrap().is_full(32));
        }
    }
}
