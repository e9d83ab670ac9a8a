// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A fixed-capacity ring of per-frame state.

Frame `k` always lands on slot `k % capacity`.  [RingBuffer::advance] steps the active slot once
per frame; [RingBuffer::select] jumps to a frame's slot when the ring is rebuilt mid-sequence.
*/

#[derive(Debug)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    active: usize,
}

impl<T> RingBuffer<T> {
    /// Creates `capacity` slots (at least one), building slot `i` with `make(i)`.
    pub fn try_new<E>(
        capacity: usize,
        make: impl FnMut(usize) -> Result<T, E>,
    ) -> Result<Self, E> {
        Ok(RingBuffer {
            slots: (0..capacity.max(1)).map(make).collect::<Result<_, _>>()?,
            active: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_for_frame(&self, frame_index: u64) -> usize {
        (frame_index % self.slots.len() as u64) as usize
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active(&self) -> &T {
        &self.slots[self.active]
    }

    pub fn active_mut(&mut self) -> &mut T {
        &mut self.slots[self.active]
    }

    pub fn advance(&mut self) -> &mut T {
        self.active = (self.active + 1) % self.slots.len();
        &mut self.slots[self.active]
    }

    /// Makes the slot for `frame_index` active.
    pub fn select(&mut self, frame_index: u64) -> &mut T {
        self.active = self.slot_for_frame(frame_index);
        &mut self.slots[self.active]
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.slots.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.slots.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;

    fn ring(capacity: usize) -> RingBuffer<usize> {
        RingBuffer::try_new(capacity, |i| Ok::<_, ()>(i * 10)).unwrap()
    }

    #[test]
    fn frames_wrap_onto_slots() {
        let mut ring = ring(3);
        assert_eq!(*ring.active(), 0);
        assert_eq!(*ring.select(7), 10);
        assert_eq!(ring.active_index(), 1);
        *ring.active_mut() += 1;
        assert_eq!(ring.get(1), Some(&11));
        assert_eq!(ring.slot_for_frame(9), 0);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![0, 11, 20]);
        assert_eq!(*ring.advance(), 20);
        assert_eq!(*ring.advance(), 0);
    }

    #[test]
    fn never_empty() {
        let ring = ring(0);
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.slot_for_frame(5), 0);
        assert!(RingBuffer::try_new(2, |i| if i == 1 { Err("no") } else { Ok(i) }).is_err());
    }
}
