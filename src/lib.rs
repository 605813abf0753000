//! Buffer exchange for embedded GPUs whose clients render into buffers they cannot allocate
//! themselves.
//!
//! The crate manages client buffers across their whole life and drives a hardware overlay plane:
//!
//! - Answer buffer requests with backend allocations or carve-outs of the offscreen framebuffer
//!   ([`Dri2::create_buffer`])
//! - Publish frames by blitting or by scanning them out through the overlay
//!   ([`Dri2::copy_region`])
//! - Follow host events (window/pixmap destruction, tree changes, cursor switches, readback)
//!   through hook chains on a [`Screen`]
//!
//! Backends ([`DumbBackend`], [`UmpBackend`]) and the host ([`SoftScreen`]) are host-memory
//! implementations of the [`BoBackend`] and [`ScreenHost`] contracts.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod bo;
pub(crate) mod config;
pub(crate) mod dri2;
pub(crate) mod hooks;
pub(crate) mod host;
pub(crate) mod overlay;
pub(crate) mod screen;

pub use crate::foundation::core::{BoxExtents, DrawableInfo, DrawableKind, Rect, Region, SurfaceId};
pub use crate::foundation::error::{Dri2Error, Dri2Result};

pub use crate::bo::dumb::DumbBackend;
pub use crate::bo::info::{BoChecksum, BoId, BoInfo, BoTable, BoTableStats, FrameParity, Released};
pub use crate::bo::memory::{BoView, MappedMemory};
pub use crate::bo::ump::UmpBackend;
pub use crate::bo::{
    BackendDevice, BackendKind, BackendStats, BoBackend, BoGeometry, BoHandle, BoUsage, HwOwner,
    SecureId, create_backend,
};
pub use crate::config::Dri2Options;
pub use crate::dri2::buffer::{
    Attachment, BUFFER_FLAG_FB, BUFFER_FLAG_REUSED, Dri2Buffer, PublishOutcome,
};
pub use crate::dri2::manager::{Dri2, Dri2Stats};
pub use crate::dri2::queue::{DeliveryQueue, QUEUE_CAPACITY};
pub use crate::dri2::window::{OrderCheck, WindowState};
pub use crate::hooks::{Hook, HookChain, HookToken, Next};
pub use crate::host::recording::{PlaneLog, PlaneOp, RecordingPlane};
pub use crate::host::soft::{ROOT_WINDOW, SCREEN_PIXMAP, SoftScreen};
pub use crate::host::{BlitSource, ImageRequest, PixmapStorage, ScreenHost};
pub use crate::overlay::plane::{Display, DisplayInfo, OverlayPlane, PlaneSource};
pub use crate::overlay::tree::{SurfaceTree, Visit, WindowAttrs, is_obscured, traverse};
pub use crate::overlay::{OverlayContext, OverlayTransition, ReservedIds};
pub use crate::screen::{Screen, ScreenContext};
