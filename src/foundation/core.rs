use smallvec::SmallVec;

/// Host identifier of a drawable (window or pixmap).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct SurfaceId(pub u32);

/// What kind of drawable a [`SurfaceId`] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawableKind {
    /// An on-screen window (transient client buffers are attached to it).
    Window,
    /// A persistent off-screen pixel surface.
    Pixmap,
}

/// Geometry and pixel format of a drawable as reported by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawableInfo {
    /// Window or pixmap.
    pub kind: DrawableKind,
    /// Absolute screen x of the drawable origin (0 for pixmaps).
    pub x: i32,
    /// Absolute screen y of the drawable origin (0 for pixmaps).
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Colour depth in bits.
    pub depth: u8,
    /// Storage bits per pixel.
    pub bpp: u8,
}

impl DrawableInfo {
    /// Bytes per pixel.
    pub fn cpp(&self) -> u32 {
        u32::from(self.bpp) / 8
    }

    /// Screen rectangle covered by the drawable.
    pub fn rect(&self) -> Rect {
        Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Integer pixel rectangle (origin + size).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Rect {
    /// Build a rectangle.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Convert to half-open box extents.
    pub fn extents(self) -> BoxExtents {
        BoxExtents {
            x1: self.x,
            y1: self.y,
            x2: self.x.saturating_add(self.width as i32),
            y2: self.y.saturating_add(self.height as i32),
        }
    }

    /// Intersection with `other`, `None` when they do not overlap.
    pub fn intersect(self, other: Rect) -> Option<Rect> {
        let a = self.extents();
        let b = other.extents();
        let x1 = a.x1.max(b.x1);
        let y1 = a.y1.max(b.y1);
        let x2 = a.x2.min(b.x2);
        let y2 = a.y2.min(b.y2);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

/// Half-open box `[x1, x2) x [y1, y2)`, the shape used for window extents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoxExtents {
    /// Inclusive left.
    pub x1: i32,
    /// Inclusive top.
    pub y1: i32,
    /// Exclusive right.
    pub x2: i32,
    /// Exclusive bottom.
    pub y2: i32,
}

impl BoxExtents {
    /// Extents of a window including its border on every side.
    pub fn with_border(rect: Rect, border: u32) -> Self {
        let b = border as i32;
        let e = rect.extents();
        Self {
            x1: e.x1 - b,
            y1: e.y1 - b,
            x2: e.x2 + b,
            y2: e.y2 + b,
        }
    }

    /// `true` when the two boxes share at least one pixel. Touching edges do not overlap.
    pub fn overlaps(&self, other: &BoxExtents) -> bool {
        !(self.x2 <= other.x1 || self.x1 >= other.x2 || self.y2 <= other.y1 || self.y1 >= other.y2)
    }
}

/// Damage / clip region as a small list of rectangles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Region {
    rects: SmallVec<[Rect; 4]>,
}

impl Region {
    /// Empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Region made of a single rectangle.
    pub fn from_rect(rect: Rect) -> Self {
        let mut rects = SmallVec::new();
        rects.push(rect);
        Self { rects }
    }

    /// Add a rectangle to the region.
    pub fn push(&mut self, rect: Rect) {
        if rect.width > 0 && rect.height > 0 {
            self.rects.push(rect);
        }
    }

    /// Rectangles in insertion order.
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// `true` when the region covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.rects.iter().all(|r| r.width == 0 || r.height == 0)
    }
}
