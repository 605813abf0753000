//! Hardware overlay ownership and the visibility state machine that drives the plane.

pub(crate) mod plane;
pub(crate) mod tree;

use crate::bo::info::BoId;
use crate::bo::{BoHandle, SecureId};
use crate::foundation::core::{Rect, SurfaceId};
use crate::overlay::tree::{SurfaceTree, is_obscured};

/// Identifiers set aside at initialisation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservedIds {
    /// Dummy allocations held for the lifetime of the context.
    pub null_handles: Vec<BoHandle>,
    /// Name handed out for dummy buffers.
    pub null_secure_id: SecureId,
    /// Name of the framebuffer wrapper, [`SecureId::INVALID`] when overlays are off.
    pub fb_secure_id: SecureId,
    /// Name of the alternative framebuffer wrapper.
    pub alt_fb_secure_id: SecureId,
}

impl Default for ReservedIds {
    fn default() -> Self {
        Self {
            null_handles: Vec::new(),
            null_secure_id: SecureId::INVALID,
            fb_secure_id: SecureId::INVALID,
            alt_fb_secure_id: SecureId::INVALID,
        }
    }
}

/// Plane operations requested by one visibility update, to be applied in field order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayTransition {
    /// Copy the dirty buffer into the owner window before the plane goes away.
    pub flush: bool,
    /// Hide the plane.
    pub hide: bool,
    /// Reposition the plane.
    pub move_to: Option<Rect>,
    /// Show the plane.
    pub show: bool,
}

impl OverlayTransition {
    /// `true` when nothing has to be done.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Overlay state of one display output.
#[derive(Clone, Debug, Default)]
pub struct OverlayContext {
    /// Window whose buffers are carved out of the framebuffer.
    pub owner: Option<SurfaceId>,
    /// The plane is showing the owner's content.
    pub enabled: bool,
    /// Result of the last obscuring walk.
    pub obscured: bool,
    /// Buffer shown on the plane but not yet copied into the owner window.
    pub dirty: Option<BoId>,
    /// Last position the plane was placed at.
    pub position: Option<(i32, i32)>,
    /// The host renders the cursor in hardware (a software cursor would be hidden by the plane).
    pub hw_cursor_in_use: bool,
    /// Identifiers set aside at initialisation.
    pub reserved: ReservedIds,
    /// Times the window-resize workaround has been applied.
    pub resize_workarounds: u32,
}

impl OverlayContext {
    fn disable(&mut self, reason: &str) -> OverlayTransition {
        if !self.enabled {
            return OverlayTransition::default();
        }
        tracing::debug!(owner = ?self.owner.map(|o| o.0), reason, "disabling overlay");
        self.enabled = false;
        OverlayTransition {
            flush: self.dirty.is_some(),
            hide: true,
            ..OverlayTransition::default()
        }
    }

    /// Re-evaluate overlay visibility against the current window tree.
    pub fn update<T: SurfaceTree + ?Sized>(&mut self, tree: &T) -> OverlayTransition {
        let Some(owner) = self.owner else {
            return self.disable("no owner");
        };
        if !self.hw_cursor_in_use {
            return self.disable("no hardware cursor");
        }
        let Some(attrs) = tree.window_attrs(owner).filter(|a| a.mapped) else {
            return self.disable("window is not mapped");
        };

        self.obscured = is_obscured(tree, owner);
        if self.obscured {
            return self.disable("window is obscured");
        }

        let mut out = OverlayTransition::default();
        let pos = (attrs.rect.x, attrs.rect.y);
        if self.position != Some(pos) {
            self.position = Some(pos);
            tracing::debug!(x = pos.0, y = pos.1, "moving overlay");
            out.move_to = Some(attrs.rect);
        }
        if !self.enabled {
            tracing::debug!(
                owner = owner.0,
                "enabling overlay (window is fully unobscured)"
            );
            self.enabled = true;
            out.show = true;
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/context.rs"]
mod tests;
