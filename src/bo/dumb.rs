use crate::bo::memory::MappedMemory;
use crate::bo::pool::AllocationPool;
use crate::bo::{
    BackendDevice, BackendKind, BackendStats, BoBackend, BoGeometry, BoHandle, BoUsage, SecureId,
    check_device,
};
use crate::foundation::error::{Dri2Error, Dri2Result};

/// Row alignment required by the GPU for dumb buffers.
const DUMB_PITCH_ALIGN: u32 = 8;

/// GEM "dumb"-buffer backend.
///
/// Buffers are always CPU-coherent, so ownership switches are no-ops; secure ids are flink-style
/// global names; any buffer can be registered as a scanout framebuffer.
pub struct DumbBackend {
    pool: AllocationPool,
}

impl BoBackend for DumbBackend {
    fn open(device: BackendDevice) -> Dri2Result<Self> {
        check_device(&device)?;
        tracing::debug!(path = %device.path, "opened dumb buffer backend");
        Ok(Self {
            pool: AllocationPool::new(device, DUMB_PITCH_ALIGN),
        })
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Dumb
    }

    fn new_bo(&mut self, geometry: BoGeometry, usage: BoUsage) -> Option<BoHandle> {
        // Dumb buffers ignore placement hints.
        self.pool.allocate(geometry, usage)
    }

    fn map(&mut self, handle: BoHandle) -> Option<MappedMemory> {
        self.pool.map(handle)
    }

    fn unmap(&mut self, _handle: BoHandle) {}

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

    fn switch_hw_usage(&mut self, _handle: BoHandle, _for_cpu: bool) -> Dri2Result<()> {
        Ok(())
    }

    fn resize(&mut self, handle: BoHandle, geometry: BoGeometry) -> Dri2Result<()> {
        self.pool.resize(handle, geometry).ok_or_else(|| {
            Dri2Error::backend(format!(
                "cannot resize dumb buffer {} to {}x{}",
                handle.get(),
                geometry.width,
                geometry.height
            ))
        })
    }

    fn add_scanout_fb(&mut self, handle: BoHandle) -> Dri2Result<u32> {
        self.pool
            .add_scanout_fb(handle)
            .ok_or_else(|| Dri2Error::backend(format!("no dumb buffer {}", handle.get())))
    }

    fn remove_scanout_fb(&mut self, handle: BoHandle) {
        if let Some(a) = self.pool.get_mut(handle) {
            a.scanout_fb = None;
        }
    }

    fn scanout_fb(&self, handle: BoHandle) -> Option<u32> {
        self.pool.get(handle).and_then(|a| a.scanout_fb)
    }

    fn size_from_secure_id(&self, _id: SecureId) -> usize {
        // Dumb buffers cannot wrap the display framebuffer.
        0
    }

    fn stats(&self) -> BackendStats {
        self.pool.stats()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/bo/dumb.rs"]
mod tests;
