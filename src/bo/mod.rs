//! Buffer-object backends and the reference-counted [`BoInfo`] records built on top of them.

pub(crate) mod checksum;
pub(crate) mod dumb;
pub(crate) mod info;
pub(crate) mod memory;
pub(crate) mod pool;
pub(crate) mod ump;

use std::num::NonZeroU32;

use crate::bo::memory::MappedMemory;
use crate::foundation::error::{Dri2Error, Dri2Result};

/// Opaque allocator handle. The invalid sentinel is expressed as `Option<BoHandle>::None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BoHandle(NonZeroU32);

impl BoHandle {
    /// Wrap a raw allocator handle; `0` is the invalid handle.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw allocator handle.
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

/// External buffer name shared with rendering clients across process boundaries.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SecureId(pub u32);

impl SecureId {
    /// The "no buffer" name (`-1` on the wire).
    pub const INVALID: SecureId = SecureId(u32::MAX);

    /// `true` unless this is [`SecureId::INVALID`].
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

/// Placement hint for a new allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoUsage {
    /// No placement constraints (dummy buffers).
    None,
    /// Physically contiguous, uncached.
    Default,
    /// Physically contiguous and CPU-cached; ownership must be switched explicitly.
    UseCache,
}

/// Pixel geometry requested from a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoGeometry {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Colour depth in bits.
    pub depth: u8,
    /// Storage bits per pixel.
    pub bpp: u8,
}

impl BoGeometry {
    /// Smallest row length in bytes that holds `width` pixels.
    pub fn min_pitch(&self) -> u32 {
        (self.width * u32::from(self.bpp)).div_ceil(8)
    }
}

/// Who currently owns the caches of a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HwOwner {
    /// CPU reads/writes (blits, pixmap access).
    Cpu,
    /// GPU or display consumer.
    Gpu,
}

/// Allocator-level counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Successful allocations.
    pub allocated: u64,
    /// Allocations whose last allocator reference was dropped.
    pub freed: u64,
    /// Allocations currently alive.
    pub live: usize,
    /// Bytes held by live allocations.
    pub used_bytes: usize,
    /// Allocation requests that failed.
    pub failed: u64,
}

/// Device a backend is opened on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendDevice {
    /// Device node, informational only.
    pub path: String,
    /// Upper bound on bytes the backend may hand out.
    pub memory_limit: usize,
}

impl Default for BackendDevice {
    fn default() -> Self {
        Self {
            path: "/dev/dri/card0".to_string(),
            memory_limit: 64 * 1024 * 1024,
        }
    }
}

/// Available backend kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// GEM "dumb" buffers.
    Dumb,
    /// Unified memory provider buffers.
    Ump,
}

/// Pluggable buffer allocator.
///
/// Both implementations honour the same contract, so the buffer manager never looks at which one
/// it runs on. Handles passed in must come from the same backend.
pub trait BoBackend {
    /// Open the backend on `device`.
    fn open(device: BackendDevice) -> Dri2Result<Self>
    where
        Self: Sized;

    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Allocate a buffer, `None` on failure.
    fn new_bo(&mut self, geometry: BoGeometry, usage: BoUsage) -> Option<BoHandle>;

    /// CPU mapping of the buffer.
    fn map(&mut self, handle: BoHandle) -> Option<MappedMemory>;

    /// Drop one CPU mapping.
    fn unmap(&mut self, handle: BoHandle);

    /// Row length in bytes chosen by the allocator.
    fn pitch(&self, handle: BoHandle) -> u32;

    /// External name of the buffer.
    fn secure_id(&self, handle: BoHandle) -> SecureId;

    /// Take an allocator-level reference.
    fn hold(&mut self, handle: BoHandle);

    /// Drop an allocator-level reference; the last one frees the memory.
    fn release(&mut self, handle: BoHandle);

    /// `true` while `handle` names a live allocation.
    fn valid(&self, handle: BoHandle) -> bool;

    /// Hand the buffer to the CPU (`for_cpu`) or to the GPU/display, flushing caches as needed.
    fn switch_hw_usage(&mut self, handle: BoHandle, for_cpu: bool) -> Dri2Result<()>;

    /// Reallocate the buffer storage for a new geometry. Contents are not preserved.
    fn resize(&mut self, handle: BoHandle, geometry: BoGeometry) -> Dri2Result<()>;

    /// Register the buffer as a scanout framebuffer, returning the framebuffer id.
    fn add_scanout_fb(&mut self, handle: BoHandle) -> Dri2Result<u32>;

    /// Drop the scanout framebuffer, if any.
    fn remove_scanout_fb(&mut self, handle: BoHandle);

    /// Scanout framebuffer id, if registered.
    fn scanout_fb(&self, handle: BoHandle) -> Option<u32>;

    /// Size in bytes of whatever `id` names, 0 when unknown.
    fn size_from_secure_id(&self, id: SecureId) -> usize;

    /// Allocator counters.
    fn stats(&self) -> BackendStats;
}

/// Open a backend implementation.
pub fn create_backend(kind: BackendKind, device: BackendDevice) -> Dri2Result<Box<dyn BoBackend>> {
    match kind {
        BackendKind::Dumb => Ok(Box::new(crate::bo::dumb::DumbBackend::open(device)?)),
        BackendKind::Ump => Ok(Box::new(crate::bo::ump::UmpBackend::open(device)?)),
    }
}

pub(crate) fn check_device(device: &BackendDevice) -> Dri2Result<()> {
    if device.memory_limit == 0 {
        return Err(Dri2Error::backend(format!(
            "device '{}' has no memory to hand out",
            device.path
        )));
    }
    Ok(())
}
