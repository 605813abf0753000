use std::collections::HashMap;

use crate::bo::checksum::sample_checksum;
use crate::bo::memory::{BoView, MappedMemory};
use crate::bo::{BoBackend, BoHandle, SecureId};
use crate::foundation::core::SurfaceId;
use crate::foundation::error::{Dri2Error, Dri2Result};
use crate::host::PixmapStorage;

/// Stable identifier of a [`BoInfo`] record in a [`BoTable`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BoId(pub u64);

/// Frame parity a carved-out overlay buffer must be installed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameParity {
    /// Handed out on an odd request; must not be swapped in while the swap counter is odd.
    Odd,
    /// Handed out on an even request; must not be swapped in while the swap counter is even.
    Even,
}

impl FrameParity {
    /// Parity of a counter value.
    pub fn of(counter: u64) -> Self {
        if counter & 1 == 1 {
            Self::Odd
        } else {
            Self::Even
        }
    }
}

/// Snapshot of sampled buffer content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoChecksum {
    /// Sampling seed (the swap counter at snapshot time).
    pub seed: u32,
    /// Hash of the sampled bytes.
    pub value: u64,
}

/// One buffer handed to rendering clients.
///
/// Either backed by a backend allocation (`handle` is set) or carved out of some other memory
/// such as the offscreen framebuffer (`handle` is `None`, `memory` + `offset` locate the pixels).
/// A record with neither is a dummy buffer.
#[derive(Debug)]
pub struct BoInfo {
    /// Backend allocation, `None` for carve-outs and dummies.
    pub handle: Option<BoHandle>,
    /// CPU mapping, `None` for dummies and failed allocations.
    pub memory: Option<MappedMemory>,
    /// Byte offset of the first pixel inside `memory`.
    pub offset: usize,
    /// Buffer size in bytes.
    pub size: usize,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Colour depth in bits.
    pub depth: u8,
    /// Storage bits per pixel.
    pub bpp: u8,
    /// Bytes per row.
    pub pitch: u32,
    /// Bytes per pixel.
    pub cpp: u32,
    /// Name handed to clients.
    pub secure_id: SecureId,
    /// Pixmap whose storage was migrated into this buffer.
    pub pixmap: Option<SurfaceId>,
    /// The pixmap's storage before migration, restored when the pixmap goes away.
    pub backup: Option<PixmapStorage>,
    /// Parity requirement for carved-out overlay buffers.
    pub parity: Option<FrameParity>,
    /// Set once the order check confirmed this buffer behaves as expected.
    pub passed_order_check: bool,
    /// Last content snapshot.
    pub checksum: Option<BoChecksum>,
    refcount: u32,
}

impl BoInfo {
    /// A record with no storage and one reference.
    pub fn empty(width: u32, height: u32, depth: u8, bpp: u8) -> Self {
        Self {
            handle: None,
            memory: None,
            offset: 0,
            size: 0,
            width,
            height,
            depth,
            bpp,
            pitch: 0,
            cpp: u32::from(bpp) / 8,
            secure_id: SecureId::INVALID,
            pixmap: None,
            backup: None,
            parity: None,
            passed_order_check: false,
            checksum: None,
            refcount: 1,
        }
    }

    /// Outstanding references.
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// `true` when the buffer has CPU-visible pixels.
    pub fn is_mapped(&self) -> bool {
        self.memory.is_some()
    }

    /// Client view of the buffer pixels.
    pub fn view(&self) -> Option<BoView> {
        Some(BoView {
            memory: self.memory.clone()?,
            offset: self.offset,
            len: self.size,
            pitch: self.pitch,
        })
    }

    fn sample(&self, seed: u32) -> Option<u64> {
        let memory = self.memory.as_ref()?;
        Some(sample_checksum(memory, self.offset, self.size, seed))
    }

    /// Snapshot the current content.
    pub fn save_checksum(&mut self, seed: u32) {
        self.checksum = self.sample(seed).map(|value| BoChecksum { seed, value });
    }

    /// `true` when a snapshot exists and the content no longer matches it.
    pub fn checksum_changed(&self) -> bool {
        match self.checksum {
            Some(snap) => self.sample(snap.seed) != Some(snap.value),
            None => false,
        }
    }
}

/// Outcome of dropping one reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Released {
    /// References remain.
    Alive(u32),
    /// That was the last reference; the record is gone.
    Freed,
}

/// Record-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct BoTableStats {
    /// Records created.
    pub created: u64,
    /// Records freed.
    pub freed: u64,
    /// Releases of records that no longer exist.
    pub double_release: u64,
}

/// Arena owning every [`BoInfo`].
#[derive(Debug, Default)]
pub struct BoTable {
    next_id: u64,
    entries: HashMap<BoId, BoInfo>,
    scanout: Option<BoHandle>,
    stats: BoTableStats,
}

impl BoTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record; it starts with a single reference.
    pub fn insert(&mut self, mut info: BoInfo) -> BoId {
        self.next_id += 1;
        let id = BoId(self.next_id);
        info.refcount = 1;
        self.entries.insert(id, info);
        self.stats.created += 1;
        id
    }

    /// Look up a live record.
    pub fn get(&self, id: BoId) -> Option<&BoInfo> {
        self.entries.get(&id)
    }

    /// Look up a live record mutably.
    pub fn get_mut(&mut self, id: BoId) -> Option<&mut BoInfo> {
        self.entries.get_mut(&id)
    }

    /// `true` while `id` is alive.
    pub fn contains(&self, id: BoId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Live records.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no record is alive.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters.
    pub fn stats(&self) -> BoTableStats {
        self.stats
    }

    /// Handle owned by the display pipeline; never released through this table.
    pub fn scanout(&self) -> Option<BoHandle> {
        self.scanout
    }

    /// Declare the display pipeline's scanout handle.
    pub fn set_scanout(&mut self, handle: Option<BoHandle>) {
        self.scanout = handle;
    }

    /// Take one more reference.
    pub fn acquire(&mut self, id: BoId) -> Dri2Result<u32> {
        let Some(info) = self.entries.get_mut(&id) else {
            tracing::error!(bo = id.0, "acquire of a freed buffer record");
            return Err(Dri2Error::protocol(format!("buffer {} is not alive", id.0)));
        };
        info.refcount += 1;
        Ok(info.refcount)
    }

    /// Drop one reference. The last one unmaps and releases the backend handle (unless it is the
    /// scanout handle) and frees the record.
    pub fn release(&mut self, id: BoId, backend: &mut dyn BoBackend) -> Dri2Result<Released> {
        let Some(info) = self.entries.get_mut(&id) else {
            self.stats.double_release += 1;
            tracing::error!(bo = id.0, "release of a freed buffer record");
            return Err(Dri2Error::protocol(format!(
                "buffer {} released more often than acquired",
                id.0
            )));
        };
        info.refcount -= 1;
        if info.refcount > 0 {
            tracing::debug!(
                bo = id.0,
                refcount = info.refcount,
                "dropped buffer reference"
            );
            return Ok(Released::Alive(info.refcount));
        }

        let Some(info) = self.entries.remove(&id) else {
            return Ok(Released::Freed);
        };
        self.stats.freed += 1;
        if let Some(handle) = info.handle
            && Some(handle) != self.scanout
            && backend.valid(handle)
        {
            backend.unmap(handle);
            backend.release(handle);
        }
        tracing::debug!(bo = id.0, handle = ?info.handle.map(BoHandle::get), "freed buffer");
        Ok(Released::Freed)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bo/info.rs"]
mod tests;
