// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Size arithmetic.

todo: should this be a crate?
*/

/// Rounds `size` up to a multiple of `alignment`.  Zero stays zero.
pub const fn aligned_size(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/**
Number of levels in a full mip chain for a `width` x `height` image: `floor(log2(max(w, h))) + 1`.

```
use frames_in_flight::mip_map_levels;
assert_eq!(mip_map_levels(256, 64), 9);
assert_eq!(mip_map_levels(1, 1), 1);
assert_eq!(mip_map_levels(300, 17), 9);
```
*/
pub const fn mip_map_levels(width: u32, height: u32) -> u32 {
    let largest = if width > height { width } else { height };
    if largest == 0 {
        return 1;
    }
    largest.ilog2() + 1
}

/**
The size an image would have to be scaled to for every level to be exactly half the previous one:
each axis rounded up to a power of two.

The engine does not rescale mipmapped uploads itself; callers that want exact halving can use this.
*/
pub const fn mip_map_adjusted_source_size(width: u32, height: u32) -> (u32, u32) {
    let w = if width == 0 { 1 } else { width.next_power_of_two() };
    let h = if height == 0 { 1 } else { height.next_power_of_two() };
    (w, h)
}

/// Size of mip `level`.
pub(crate) const fn mip_level_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    let w = width >> level;
    let h = height >> level;
    (if w == 0 { 1 } else { w }, if h == 0 { 1 } else { h })
}

/// Index of the lowest clear bit, if any.
pub(crate) const fn first_free_bit(used: u32) -> Option<u32> {
    if used == u32::MAX {
        None
    } else {
        Some((!used).trailing_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mips() {
        assert_eq!(mip_map_levels(1024, 1024), 11);
        assert_eq!(mip_map_levels(1, 1000), 10);
        assert_eq!(mip_level_size(300, 17, 5), (9, 1));
        assert_eq!(mip_map_adjusted_source_size(300, 17), (512, 32));
    }

    #[test]
    fn alignment() {
        assert_eq!(aligned_size(1, 4096), 4096);
        assert_eq!(aligned_size(4096, 4096), 4096);
        assert_eq!(aligned_size(4097, 4096), 8192);
        assert_eq!(aligned_size(0, 4096), 0);
    }

    #[test]
    fn bits() {
        assert_eq!(first_free_bit(0), Some(0));
        assert_eq!(first_free_bit(0b1011), Some(2));
        assert_eq!(first_free_bit(u32::MAX), None);
    }
}
