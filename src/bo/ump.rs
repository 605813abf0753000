use std::collections::HashMap;

use crate::bo::memory::MappedMemory;
use crate::bo::pool::AllocationPool;
use crate::bo::{
    BackendDevice, BackendKind, BackendStats, BoBackend, BoGeometry, BoHandle, BoUsage, HwOwner,
    SecureId, check_device,
};
use crate::foundation::error::{Dri2Error, Dri2Result};

/// Rows are padded to 64 bytes for best GPU throughput.
const UMP_PITCH_ALIGN: u32 = 64;

/// Unified-memory-provider backend.
///
/// Cached allocations ([`BoUsage::UseCache`]) track which side owns them; switching ownership is
/// where cache maintenance happens. Secure ids live in one namespace with externally wrapped
/// memory such as the display framebuffer.
pub struct UmpBackend {
    pool: AllocationPool,
    external: HashMap<SecureId, MappedMemory>,
    cache_ops: u64,
}

impl UmpBackend {
    /// Publish memory owned by someone else (e.g. the display framebuffer) under a new secure id.
    pub fn wrap_external(&mut self, memory: MappedMemory) -> SecureId {
        let id = self.pool.take_secure_id();
        tracing::debug!(id = id.0, len = memory.len(), "wrapped external memory");
        self.external.insert(id, memory);
        id
    }

    /// Current owner of a cached buffer, `None` for unknown handles.
    pub fn hw_owner(&self, handle: BoHandle) -> Option<HwOwner> {
        self.pool.get(handle).map(|a| a.owner)
    }

    /// Number of cache maintenance operations performed so far.
    pub fn cache_ops(&self) -> u64 {
        self.cache_ops
    }
}

impl BoBackend for UmpBackend {
    fn open(device: BackendDevice) -> Dri2Result<Self> {
        check_device(&device)?;
        tracing::debug!(path = %device.path, "opened UMP backend");
        Ok(Self {
            pool: AllocationPool::new(device, UMP_PITCH_ALIGN),
            external: HashMap::new(),
            cache_ops: 0,
        })
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Ump
    }

    fn new_bo(&mut self, geometry: BoGeometry, usage: BoUsage) -> Option<BoHandle> {
        let handle = self.pool.allocate(geometry, usage)?;
        if usage == BoUsage::UseCache
            && let Some(a) = self.pool.get_mut(handle)
        {
            a.owner = HwOwner::Gpu;
        }
        Some(handle)
    }

    fn map(&mut self, handle: BoHandle) -> Option<MappedMemory> {
        self.pool.map(handle)
    }

    fn unmap(&mut self, handle: BoHandle) {
        self.pool.unmap(handle);
    }

    fn pitch(&self, handle: BoHandle) -> u32 {
        self.pool.get(handle).map_or(0, |a| a.pitch)
    }

    fn secure_id(&self, handle: BoHandle) -> SecureId {
        self.pool
            .get(handle)
            .map_or(SecureId::INVALID, |a| a.secure_id)
    }

    fn hold(&mut self, handle: BoHandle) {
        self.pool.hold(handle);
    }

    fn release(&mut self, handle: BoHandle) {
        self.pool.release(handle);
    }

    fn valid(&self, handle: BoHandle) -> bool {
        self.pool.get(handle).is_some()
    }

    fn switch_hw_usage(&mut self, handle: BoHandle, for_cpu: bool) -> Dri2Result<()> {
        let Some(a) = self.pool.get_mut(handle) else {
            return Err(Dri2Error::backend(format!(
                "switch_hw_usage on unknown UMP buffer {}",
                handle.get()
            )));
        };
        if a.usage != BoUsage::UseCache {
            return Ok(());
        }
        let target = if for_cpu { HwOwner::Cpu } else { HwOwner::Gpu };
        if a.owner != target {
            a.owner = target;
            self.cache_ops += 1;
        }
        Ok(())
    }

    fn resize(&mut self, handle: BoHandle, geometry: BoGeometry) -> Dri2Result<()> {
        self.pool.resize(handle, geometry).ok_or_else(|| {
            Dri2Error::backend(format!(
                "cannot resize UMP buffer {} to {}x{} on {}",
                handle.get(),
                geometry.width,
                geometry.height,
                self.pool.device().path
            ))
        })
    }

    fn add_scanout_fb(&mut self, handle: BoHandle) -> Dri2Result<u32> {
        Err(Dri2Error::backend(format!(
            "UMP buffer {} cannot be scanned out",
            handle.get()
        )))
    }

    fn remove_scanout_fb(&mut self, _handle: BoHandle) {}

    fn scanout_fb(&self, _handle: BoHandle) -> Option<u32> {
        None
    }

    fn size_from_secure_id(&self, id: SecureId) -> usize {
        if !id.is_valid() {
            return 0;
        }
        if let Some(mem) = self.external.get(&id) {
            return mem.len();
        }
        self.pool.by_secure_id(id).map_or(0, |a| a.size)
    }

    fn stats(&self) -> BackendStats {
        self.pool.stats()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bo/ump.rs"]
mod tests;
