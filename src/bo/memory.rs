use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

/// CPU mapping of buffer memory.
///
/// Cloning shares the same bytes: the framebuffer, a BO mapping and the pixmap redirected to it
/// all observe each other's writes. Execution is single-threaded, so interior mutability is a
/// plain `RefCell`.
#[derive(Clone)]
pub struct MappedMemory {
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl MappedMemory {
    /// Allocate `len` zeroed bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(vec![0; len])),
        }
    }

    /// Wrap existing bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Rc::new(RefCell::new(bytes)),
        }
    }

    /// Mapping length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.borrow().len()
    }

    /// `true` for a zero-length mapping.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` when both values map the same underlying memory.
    pub fn same_memory(&self, other: &MappedMemory) -> bool {
        Rc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Read one byte, `None` past the end.
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.bytes.borrow().get(offset).copied()
    }

    /// Copy `out.len()` bytes starting at `offset`. Returns `false` (and leaves `out` untouched)
    /// when the range is out of bounds.
    pub fn read(&self, offset: usize, out: &mut [u8]) -> bool {
        let bytes = self.bytes.borrow();
        match offset
            .checked_add(out.len())
            .and_then(|end| bytes.get(offset..end))
        {
            Some(src) => {
                out.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    /// Write `data` at `offset`. Returns `false` when the range is out of bounds.
    pub fn write(&self, offset: usize, data: &[u8]) -> bool {
        let mut bytes = self.bytes.borrow_mut();
        match offset
            .checked_add(data.len())
            .and_then(|end| bytes.get_mut(offset..end))
        {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Fill `range` (clamped to the mapping) with `value`.
    pub fn fill(&self, range: Range<usize>, value: u8) {
        let mut bytes = self.bytes.borrow_mut();
        let end = range.end.min(bytes.len());
        if range.start < end {
            bytes[range.start..end].fill(value);
        }
    }

    /// Run `f` over the mapped bytes.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.bytes.borrow())
    }

    /// Run `f` over the mapped bytes mutably.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.bytes.borrow_mut())
    }
}

impl fmt::Debug for MappedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedMemory")
            .field("len", &self.len())
            .finish()
    }
}

/// A client-side window onto the pixels of one buffer: a mapping plus the sub-range the buffer
/// occupies (framebuffer carve-outs share one mapping at different offsets).
#[derive(Clone, Debug)]
pub struct BoView {
    /// Underlying mapping.
    pub memory: MappedMemory,
    /// Byte offset of the first pixel.
    pub offset: usize,
    /// Length of the buffer in bytes.
    pub len: usize,
    /// Bytes per row.
    pub pitch: u32,
}

impl BoView {
    /// Fill the whole buffer with one byte value.
    pub fn fill(&self, value: u8) {
        self.memory
            .fill(self.offset..self.offset.saturating_add(self.len), value);
    }

    /// Fill the whole buffer with one 32-bit pixel value (native little-endian byte order).
    pub fn fill_u32(&self, pixel: u32) {
        let px = pixel.to_le_bytes();
        let (start, len) = (self.offset, self.len);
        self.memory.with_bytes_mut(|bytes| {
            let end = start.saturating_add(len).min(bytes.len());
            if start >= end {
                return;
            }
            for chunk in bytes[start..end].chunks_mut(4) {
                let n = chunk.len();
                chunk.copy_from_slice(&px[..n]);
            }
        });
    }

    /// Write `data` at `offset` bytes into the buffer. Returns `false` when it does not fit.
    pub fn write(&self, offset: usize, data: &[u8]) -> bool {
        if offset.saturating_add(data.len()) > self.len {
            return false;
        }
        self.memory.write(self.offset + offset, data)
    }

    /// Read one 32-bit pixel at byte `offset` into the buffer.
    pub fn read_u32(&self, offset: usize) -> Option<u32> {
        let mut px = [0u8; 4];
        if offset.saturating_add(4) > self.len || !self.memory.read(self.offset + offset, &mut px) {
            return None;
        }
        Some(u32::from_le_bytes(px))
    }
}
