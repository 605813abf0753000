use std::collections::HashMap;

use crate::bo::memory::MappedMemory;
use crate::bo::{BackendDevice, BackendStats, BoGeometry, BoHandle, BoUsage, HwOwner, SecureId};

pub(crate) struct Allocation {
    pub(crate) geometry: BoGeometry,
    pub(crate) usage: BoUsage,
    pub(crate) pitch: u32,
    pub(crate) size: usize,
    pub(crate) memory: MappedMemory,
    pub(crate) secure_id: SecureId,
    pub(crate) refs: u32,
    pub(crate) maps: u32,
    pub(crate) scanout_fb: Option<u32>,
    pub(crate) owner: HwOwner,
}

/// Host-memory bookkeeping shared by the reference backends.
///
/// Handles and secure ids are never reused, so a stale handle is always detected as invalid.
pub(crate) struct AllocationPool {
    device: BackendDevice,
    pitch_align: u32,
    next_handle: u32,
    next_secure_id: u32,
    next_fb: u32,
    used_bytes: usize,
    live: HashMap<BoHandle, Allocation>,
    stats: BackendStats,
}

fn align_up(v: u32, align: u32) -> u32 {
    v.div_ceil(align) * align
}

impl AllocationPool {
    pub(crate) fn new(device: BackendDevice, pitch_align: u32) -> Self {
        Self {
            device,
            pitch_align,
            next_handle: 1,
            next_secure_id: 1,
            next_fb: 1,
            used_bytes: 0,
            live: HashMap::new(),
            stats: BackendStats::default(),
        }
    }

    pub(crate) fn device(&self) -> &BackendDevice {
        &self.device
    }

    pub(crate) fn take_secure_id(&mut self) -> SecureId {
        let id = SecureId(self.next_secure_id);
        self.next_secure_id += 1;
        id
    }

    fn layout(&self, geometry: BoGeometry) -> (u32, usize) {
        let pitch = align_up(geometry.min_pitch(), self.pitch_align);
        (pitch, pitch as usize * geometry.height as usize)
    }

    pub(crate) fn allocate(&mut self, geometry: BoGeometry, usage: BoUsage) -> Option<BoHandle> {
        let (pitch, size) = self.layout(geometry);
        if size == 0 || self.used_bytes.saturating_add(size) > self.device.memory_limit {
            self.stats.failed += 1;
            tracing::debug!(
                size,
                used = self.used_bytes,
                limit = self.device.memory_limit,
                "allocation refused"
            );
            return None;
        }

        let handle = BoHandle::new(self.next_handle)?;
        self.next_handle += 1;
        let secure_id = self.take_secure_id();
        self.used_bytes += size;
        self.stats.allocated += 1;
        self.live.insert(
            handle,
            Allocation {
                geometry,
                usage,
                pitch,
                size,
                memory: MappedMemory::zeroed(size),
                secure_id,
                refs: 1,
                maps: 0,
                scanout_fb: None,
                owner: HwOwner::Cpu,
            },
        );
        Some(handle)
    }

    pub(crate) fn get(&self, handle: BoHandle) -> Option<&Allocation> {
        self.live.get(&handle)
    }

    pub(crate) fn get_mut(&mut self, handle: BoHandle) -> Option<&mut Allocation> {
        self.live.get_mut(&handle)
    }

    pub(crate) fn map(&mut self, handle: BoHandle) -> Option<MappedMemory> {
        let a = self.live.get_mut(&handle)?;
        a.maps += 1;
        Some(a.memory.clone())
    }

    pub(crate) fn unmap(&mut self, handle: BoHandle) {
        if let Some(a) = self.live.get_mut(&handle) {
            a.maps = a.maps.saturating_sub(1);
        }
    }

    pub(crate) fn hold(&mut self, handle: BoHandle) {
        if let Some(a) = self.live.get_mut(&handle) {
            a.refs += 1;
        }
    }

    pub(crate) fn release(&mut self, handle: BoHandle) {
        let Some(a) = self.live.get_mut(&handle) else {
            tracing::error!(handle = handle.get(), "release of an unknown buffer handle");
            return;
        };
        a.refs -= 1;
        if a.refs == 0
            && let Some(a) = self.live.remove(&handle)
        {
            if a.maps > 0 {
                tracing::debug!(
                    handle = handle.get(),
                    maps = a.maps,
                    width = a.geometry.width,
                    height = a.geometry.height,
                    "buffer freed while still mapped"
                );
            }
            self.used_bytes = self.used_bytes.saturating_sub(a.size);
            self.stats.freed += 1;
        }
    }

    pub(crate) fn resize(&mut self, handle: BoHandle, geometry: BoGeometry) -> Option<()> {
        let (pitch, size) = self.layout(geometry);
        let old = self.live.get(&handle)?.size;
        let budget = self.used_bytes - old;
        if size == 0 || budget.saturating_add(size) > self.device.memory_limit {
            self.stats.failed += 1;
            return None;
        }
        let a = self.live.get_mut(&handle)?;
        a.geometry = geometry;
        a.pitch = pitch;
        a.size = size;
        a.memory = MappedMemory::zeroed(size);
        a.scanout_fb = None;
        self.used_bytes = budget + size;
        Some(())
    }

    pub(crate) fn add_scanout_fb(&mut self, handle: BoHandle) -> Option<u32> {
        let next = self.next_fb;
        let a = self.live.get_mut(&handle)?;
        if let Some(fb) = a.scanout_fb {
            return Some(fb);
        }
        a.scanout_fb = Some(next);
        self.next_fb += 1;
        Some(next)
    }

    pub(crate) fn by_secure_id(&self, id: SecureId) -> Option<&Allocation> {
        self.live.values().find(|a| a.secure_id == id)
    }

    pub(crate) fn stats(&self) -> BackendStats {
        BackendStats {
            live: self.live.len(),
            used_bytes: self.used_bytes,
            ..self.stats
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bo/pool.rs"]
mod tests;
