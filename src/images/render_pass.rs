// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Per-draw parameters.

/// A pixel rectangle, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
    /// Intersection with `[0, width) x [0, height)`.
    pub(crate) fn clamped(&self, width: u32, height: u32) -> Rect {
        let x0 = self.x.clamp(0, width as i32);
        let y0 = self.y.clamp(0, height as i32);
        let x1 = (self.x as i64 + self.width as i64).clamp(0, width as i64) as i32;
        let y1 = (self.y as i64 + self.height as i64).clamp(0, height as i64) as i32;
        Rect {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawingMode {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    pub const fn size(self) -> u64 {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Which planes [crate::images::Engine::queue_clear_depth_stencil] clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthStencilClear {
    Depth,
    Stencil,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBinding {
    pub buffer: u32,
    pub format: IndexFormat,
}

/**
One draw.

`count` is the number of vertices, or of indices when `index_buffer` is set, starting at
`first_index`.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawParams {
    pub mode: DrawingMode,
    pub vertex_buffer: u32,
    pub vertex_offset: u64,
    pub index_buffer: Option<IndexBinding>,
    pub constant_buffer: u32,
    pub constant_offset: u64,
    pub count: u32,
    pub first_index: u32,
}

#[cfg(test)]
mod tests {
    use super::Rect;

    #[test]
    fn clamp() {
        let r = Rect::new(-5, 10, 20, 100).clamped(10, 50);
        assert_eq!(r, Rect::new(0, 10, 10, 40));
        assert!(Rect::new(20, 0, 5, 5).clamped(10, 10).is_empty());
    }
}
