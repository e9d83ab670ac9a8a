// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Descriptor (view) management.

There are two kinds of heap.

* Bookkeeping heaps hold the persistent view of every texture and render target.  They are never
  visible to draws.  Each heap is [BUCKETS_PER_HEAP] buckets of [DESCRIPTORS_PER_BUCKET] records
  with a `u32` occupancy bitmap per bucket; when every bucket of every heap of a kind is full, a
  new heap of that kind is added.  Released records just clear their bit.
* Each frame slot owns one [GpuDescriptorHeap].  Before a draw that samples textures, the needed
  bookkeeping records are copied into the next contiguous range of it and that range is bound.
  When a draw does not fit, the heap doubles; the old heap is retired like any other GPU object.
*/
use std::sync::Arc;

use crate::bittricks::first_free_bit;
use crate::imp::{Backend, Error, HeapId, ImageId, Owned};

pub const BUCKETS_PER_HEAP: usize = 8;
pub const DESCRIPTORS_PER_BUCKET: u32 = 32;
pub const DESCRIPTORS_PER_HEAP: u32 = BUCKETS_PER_HEAP as u32 * DESCRIPTORS_PER_BUCKET;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    RenderTarget,
    DepthStencil,
    /// Shader-resource and unordered-access views.
    ShaderResource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    pub kind: DescriptorKind,
    pub heap: u32,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ViewKind {
    Sampled,
    ColorTarget,
    DepthStencil,
}

/// How to interpret an image.  This is what a descriptor holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ViewRecord {
    pub image: ImageId,
    pub view: ViewKind,
}

#[derive(Debug)]
struct BookkeepingHeap {
    kind: DescriptorKind,
    used: [u32; BUCKETS_PER_HEAP],
    records: Vec<Option<ViewRecord>>,
}

impl BookkeepingHeap {
    fn new(kind: DescriptorKind) -> Self {
        BookkeepingHeap {
            kind,
            used: [0; BUCKETS_PER_HEAP],
            records: vec![None; DESCRIPTORS_PER_HEAP as usize],
        }
    }

    fn allocate(&mut self) -> Option<u32> {
        self.used.iter_mut().enumerate().find_map(|(bucket, bits)| {
            let bit = first_free_bit(*bits)?;
            *bits |= 1 << bit;
            Some(bucket as u32 * DESCRIPTORS_PER_BUCKET + bit)
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct BookkeepingHeaps {
    heaps: Vec<BookkeepingHeap>,
}

impl BookkeepingHeaps {
    pub(crate) fn allocate(&mut self, kind: DescriptorKind) -> DescriptorHandle {
        for (heap_index, heap) in self.heaps.iter_mut().enumerate() {
            if heap.kind != kind {
                continue;
            }
            if let Some(index) = heap.allocate() {
                return DescriptorHandle {
                    kind,
                    heap: heap_index as u32,
                    index,
                };
            }
        }
        logwise::debuginternal_sync!(
            "Adding descriptor heap for {kind}",
            kind = logwise::privacy::LogIt(&kind)
        );
        let mut heap = BookkeepingHeap::new(kind);
        let index = heap.allocate().unwrap_or(0);
        self.heaps.push(heap);
        DescriptorHandle {
            kind,
            heap: self.heaps.len() as u32 - 1,
            index,
        }
    }

    fn heap_mut(&mut self, handle: DescriptorHandle) -> Option<&mut BookkeepingHeap> {
        self.heaps
            .get_mut(handle.heap as usize)
            .filter(|h| h.kind == handle.kind && handle.index < DESCRIPTORS_PER_HEAP)
    }

    pub(crate) fn release(&mut self, handle: DescriptorHandle) {
        let Some(heap) = self.heap_mut(handle) else {
            logwise::warn_sync!(
                "Releasing unknown descriptor {handle}",
                handle = logwise::privacy::LogIt(&handle)
            );
            return;
        };
        let bucket = (handle.index / DESCRIPTORS_PER_BUCKET) as usize;
        heap.used[bucket] &= !(1 << (handle.index % DESCRIPTORS_PER_BUCKET));
        heap.records[handle.index as usize] = None;
    }

    pub(crate) fn write(&mut self, handle: DescriptorHandle, record: ViewRecord) {
        if let Some(heap) = self.heap_mut(handle) {
            heap.records[handle.index as usize] = Some(record);
        }
    }

    pub(crate) fn read(&self, handle: DescriptorHandle) -> Option<ViewRecord> {
        let heap = self.heaps.get(handle.heap as usize)?;
        if heap.kind != handle.kind {
            return None;
        }
        *heap.records.get(handle.index as usize)?
    }

    #[cfg(test)]
    pub(crate) fn heap_count(&self, kind: DescriptorKind) -> usize {
        self.heaps.iter().filter(|h| h.kind == kind).count()
    }
}

/// A frame slot's draw-time heap.
#[derive(Debug)]
pub(crate) struct GpuDescriptorHeap {
    heap: Owned<HeapId>,
    capacity: u32,
    next_free: u32,
}

impl GpuDescriptorHeap {
    pub(crate) fn new(backend: &Arc<dyn Backend>, capacity: u32) -> Result<Self, Error> {
        let id = backend.create_heap(capacity)?;
        Ok(GpuDescriptorHeap {
            heap: Owned::new(backend, id),
            capacity,
            next_free: 0,
        })
    }

    pub(crate) fn id(&self) -> HeapId {
        self.heap.id()
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Called when the slot begins a new frame.
    pub(crate) fn reset(&mut self) {
        self.next_free = 0;
    }

    /**
    Reserves `count` contiguous descriptors and returns the first index.

    When the heap is too small it is replaced by one at least twice as large and the old heap is
    returned in `Ok((start, Some(old)))`; the caller must retire it and rebind the new heap.
    */
    pub(crate) fn allocate(
        &mut self,
        count: u32,
        backend: &Arc<dyn Backend>,
    ) -> Result<(u32, Option<Owned<HeapId>>), Error> {
        let mut retired = None;
        if self.next_free + count > self.capacity {
            let mut capacity = self.capacity.max(1) * 2;
            while capacity < count {
                capacity *= 2;
            }
            logwise::debuginternal_sync!(
                "Growing GPU descriptor heap {old} -> {new}",
                old = self.capacity,
                new = capacity
            );
            let id = backend.create_heap(capacity)?;
            retired = Some(std::mem::replace(&mut self.heap, Owned::new(backend, id)));
            self.capacity = capacity;
            self.next_free = 0;
        }
        let start = self.next_free;
        self.next_free += count;
        Ok((start, retired))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: u64) -> ViewRecord {
        ViewRecord {
            image: ImageId(i),
            view: ViewKind::Sampled,
        }
    }

    #[test]
    fn grows_and_reuses() {
        let mut heaps = BookkeepingHeaps::default();
        let handles: Vec<_> = (0..DESCRIPTORS_PER_HEAP + 1)
            .map(|_| heaps.allocate(DescriptorKind::ShaderResource))
            .collect();
        assert_eq!(heaps.heap_count(DescriptorKind::ShaderResource), 2);
        assert_eq!(handles[DESCRIPTORS_PER_HEAP as usize].heap, 1);
        assert_eq!(handles[33].index, 33);

        heaps.write(handles[40], record(7));
        assert_eq!(heaps.read(handles[40]), Some(record(7)));
        heaps.release(handles[40]);
        assert_eq!(heaps.read(handles[40]), None);
        let again = heaps.allocate(DescriptorKind::ShaderResource);
        assert_eq!(again, handles[40]);
    }

    #[test]
    fn kinds_do_not_share() {
        let mut heaps = BookkeepingHeaps::default();
        let rtv = heaps.allocate(DescriptorKind::RenderTarget);
        let dsv = heaps.allocate(DescriptorKind::DepthStencil);
        assert_eq!((rtv.heap, dsv.heap), (0, 1));
        assert_eq!((rtv.index, dsv.index), (0, 0));
        heaps.write(rtv, record(1));
        let wrong_kind = DescriptorHandle {
            kind: DescriptorKind::DepthStencil,
            ..rtv
        };
        assert_eq!(heaps.read(wrong_kind), None);
    }
}
