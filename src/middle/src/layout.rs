//! Per-function frame layout. One `FrameLayout` exists per function being
//! lowered; there is no shared mutable state between functions.

/// Frames are rounded to the call alignment so every activation base in
/// the runtime arena stays 16-aligned.
pub const STACK_ALIGN: usize = 16;

#[derive(Debug, Default)]
pub struct FrameLayout {
    next_offset: usize,
}

impl FrameLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next slot of `size` bytes at an `align`-aligned
    /// offset. Offsets never overlap and strictly increase in reservation
    /// order, so declaration order determines placement.
    pub fn reserve(&mut self, size: usize, align: usize) -> usize {
        let offset = self.next_offset.next_multiple_of(align);
        self.next_offset = offset + size;
        offset
    }

    pub fn frame_size(&self) -> usize {
        self.next_offset.next_multiple_of(STACK_ALIGN)
    }
}
