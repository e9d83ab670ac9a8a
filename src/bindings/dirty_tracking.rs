// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Dirty byte ranges.

A [DirtyList] is a sorted set of non-overlapping, non-adjacent byte ranges within a buffer.  Adding
a range merges it with any neighbors it touches, so once the whole buffer is dirty the list is a
single `[0, size)` entry and further additions are no-ops.
*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirtyRange {
    pub offset: u64,
    pub size: u64,
}

impl DirtyRange {
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyList {
    ranges: Vec<DirtyRange>,
}

impl DirtyList {
    /// Adds `[offset, offset + size)`, clipped to `buffer_size`.
    pub fn add(&mut self, offset: u64, size: u64, buffer_size: u64) {
        if size == 0 || offset >= buffer_size || self.is_full(buffer_size) {
            return;
        }
        let mut start = offset;
        let mut end = offset.saturating_add(size).min(buffer_size);
        // first range that ends at or after our start can touch us
        let first = self.ranges.partition_point(|r| r.end() < start);
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].offset <= end {
            start = start.min(self.ranges[last].offset);
            end = end.max(self.ranges[last].end());
            last += 1;
        }
        self.ranges.splice(
            first..last,
            std::iter::once(DirtyRange {
                offset: start,
                size: end - start,
            }),
        );
    }

    pub fn mark_all(&mut self, buffer_size: u64) {
        self.ranges.clear();
        if buffer_size > 0 {
            self.ranges.push(DirtyRange {
                offset: 0,
                size: buffer_size,
            });
        }
    }

    pub fn extend_from(&mut self, other: &DirtyList, buffer_size: u64) {
        for r in &other.ranges {
            self.add(r.offset, r.size, buffer_size);
        }
    }

    pub fn is_full(&self, buffer_size: u64) -> bool {
        matches!(self.ranges.as_slice(), [r] if r.offset == 0 && r.size >= buffer_size)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    pub fn ranges(&self) -> &[DirtyRange] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(list: &DirtyList) -> Vec<(u64, u64)> {
        list.ranges().iter().map(|r| (r.offset, r.end())).collect()
    }

    #[test]
    fn merges_overlapping_and_adjacent() {
        let mut l = DirtyList::default();
        l.add(10, 10, 100);
        l.add(40, 10, 100);
        assert_eq!(offsets(&l), vec![(10, 20), (40, 50)]);
        l.add(20, 5, 100);
        assert_eq!(offsets(&l), vec![(10, 25), (40, 50)]);
        l.add(0, 45, 100);
        assert_eq!(offsets(&l), vec![(0, 50)]);
        l.add(70, 5, 100);
        l.add(60, 5, 100);
        assert_eq!(offsets(&l), vec![(0, 50), (60, 65), (70, 75)]);
    }

    #[test]
    fn saturates() {
        let mut l = DirtyList::default();
        l.add(0, 60, 64);
        l.add(50, 100, 64);
        assert!(l.is_full(64));
        assert_eq!(l.ranges().len(), 1);
        l.add(3, 3, 64);
        assert_eq!(offsets(&l), vec![(0, 64)]);
        l.add(64, 3, 64);
        assert_eq!(l.ranges().len(), 1);
    }

    #[test]
    fn extend() {
        let mut a = DirtyList::default();
        a.add(0, 16, 64);
        let mut b = DirtyList::default();
        b.add(16, 16, 64);
        a.extend_from(&b, 64);
        assert_eq!(offsets(&a), vec![(0, 32)]);
        a.clear();
        assert!(a.is_empty());
        a.mark_all(0);
        assert!(a.is_empty());
    }
}
