use crate::foundation::core::{BoxExtents, Rect, SurfaceId};

/// Window attributes the overlay logic looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowAttrs {
    /// The client asked for the window to be shown.
    pub mapped: bool,
    /// The window and all its ancestors are mapped.
    pub realized: bool,
    /// Input-only windows have no pixels.
    pub input_only: bool,
    /// Absolute screen rectangle of the window contents.
    pub rect: Rect,
    /// Border width on each side.
    pub border: u32,
}

impl WindowAttrs {
    /// Border-inclusive extents.
    pub fn extents(&self) -> BoxExtents {
        BoxExtents::with_border(self.rect, self.border)
    }

    /// `true` when the window can cover something on screen.
    pub fn is_visible_output(&self) -> bool {
        self.mapped && self.realized && !self.input_only
    }
}

/// Read access to the host's window hierarchy in X stacking order: the last child of a window is
/// the bottom-most one, and the previous sibling of a window sits directly above it.
pub trait SurfaceTree {
    /// Root window.
    fn root(&self) -> SurfaceId;

    /// Parent window, `None` for the root or unknown ids.
    fn parent(&self, id: SurfaceId) -> Option<SurfaceId>;

    /// Bottom-most child.
    fn last_child(&self, id: SurfaceId) -> Option<SurfaceId>;

    /// Sibling directly above `id`.
    fn prev_sibling(&self, id: SurfaceId) -> Option<SurfaceId>;

    /// Attributes of a window, `None` when `id` is not a window.
    fn window_attrs(&self, id: SurfaceId) -> Option<WindowAttrs>;
}

/// Visitor decision for [`traverse`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// End the walk.
    Stop,
    /// Descend into the children of this window.
    Continue,
    /// Go on with the next window without visiting the children.
    SkipSubtree,
}

/// Depth-first walk of the subtree at `start`, visiting each window before its children and
/// children bottom-most first. Windows are therefore visited in painting order.
///
/// Returns `true` when the visitor stopped the walk.
pub fn traverse<T: SurfaceTree + ?Sized>(
    tree: &T,
    start: SurfaceId,
    mut visit: impl FnMut(SurfaceId) -> Visit,
) -> bool {
    let mut cur = start;
    loop {
        let decision = visit(cur);
        if decision == Visit::Stop {
            return true;
        }
        if decision == Visit::Continue
            && let Some(child) = tree.last_child(cur)
        {
            cur = child;
            continue;
        }
        while cur != start && tree.prev_sibling(cur).is_none() {
            match tree.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
        if cur == start {
            return false;
        }
        match tree.prev_sibling(cur) {
            Some(sib) => cur = sib,
            None => return false,
        }
    }
}

/// `true` when some visible window stacked above `owner` overlaps it.
///
/// The walk starts at the root; every window visited after `owner` is above it. Unknown owners are
/// never obscured.
pub fn is_obscured<T: SurfaceTree + ?Sized>(tree: &T, owner: SurfaceId) -> bool {
    let Some(owner_box) = tree.window_attrs(owner).map(|a| a.extents()) else {
        return false;
    };
    let mut above = false;
    let mut obscured = false;
    traverse(tree, tree.root(), |id| {
        if !above {
            above = id == owner;
            return Visit::Continue;
        }
        if let Some(attrs) = tree.window_attrs(id)
            && attrs.is_visible_output()
            && attrs.extents().overlaps(&owner_box)
        {
            tracing::debug!(owner = owner.0, by = id.0, "overlay window is obscured");
            obscured = true;
            return Visit::Stop;
        }
        Visit::Continue
    });
    obscured
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/tree.rs"]
mod tests;
