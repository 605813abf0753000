//! The display server side: drawables, pixmap storage, blits and the base lifecycle handlers the
//! buffer manager chains to.

pub(crate) mod recording;
pub(crate) mod soft;

use crate::bo::memory::MappedMemory;
use crate::foundation::core::{DrawableInfo, Rect, Region, SurfaceId};
use crate::overlay::tree::SurfaceTree;

/// Where a pixmap keeps its pixels.
#[derive(Clone, Debug)]
pub struct PixmapStorage {
    /// Backing memory, `None` for pixmaps without storage.
    pub memory: Option<MappedMemory>,
    /// Byte offset of the first pixel.
    pub offset: usize,
    /// Bytes per row.
    pub pitch: u32,
}

/// Pixels to copy into a drawable.
#[derive(Clone, Copy, Debug)]
pub struct BlitSource<'a> {
    /// Source mapping.
    pub memory: &'a MappedMemory,
    /// Byte offset of the first source pixel.
    pub offset: usize,
    /// Source bytes per row.
    pub pitch: u32,
    /// Source width in pixels.
    pub width: u32,
    /// Source height in pixels.
    pub height: u32,
    /// Source bits per pixel.
    pub bpp: u8,
}

/// Screen readback request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    /// Drawable to read from.
    pub drawable: SurfaceId,
    /// Rectangle relative to the drawable origin.
    pub rect: Rect,
}

/// Services the buffer manager needs from the display server.
pub trait ScreenHost: SurfaceTree {
    /// Geometry and format of a window or pixmap.
    fn drawable(&self, id: SurfaceId) -> Option<DrawableInfo>;

    /// Pixmap holding the pixels of `id` (a window's backing pixmap, or the pixmap itself).
    fn drawable_pixmap(&self, id: SurfaceId) -> Option<SurfaceId>;

    /// Current storage of a pixmap.
    fn pixmap_storage(&self, pixmap: SurfaceId) -> Option<PixmapStorage>;

    /// Point a pixmap at different storage.
    fn set_pixmap_storage(&mut self, pixmap: SurfaceId, storage: PixmapStorage);

    /// Copy `src` to the origin of `dst`, limited to `clip` (drawable-relative).
    fn copy_area(&mut self, dst: SurfaceId, clip: &Region, src: &BlitSource<'_>);

    /// Base window destructor.
    fn destroy_window(&mut self, id: SurfaceId) -> bool;

    /// Base pixmap destructor.
    fn destroy_pixmap(&mut self, id: SurfaceId) -> bool;

    /// Base handler run after the window tree changed.
    fn post_validate_tree(&mut self, _changed: Option<SurfaceId>) {}

    /// Base screen readback: tightly packed rows of the requested rectangle.
    fn get_image(&mut self, request: &ImageRequest) -> Vec<u8>;

    /// `true` when buffers of `id` may be page-flipped instead of blitted.
    fn can_flip(&self, _id: SurfaceId) -> bool {
        false
    }

    /// Base handler for switching to the hardware cursor.
    fn enable_hw_cursor(&mut self) {}

    /// Base handler for switching to the software cursor.
    fn disable_hw_cursor(&mut self) {}
}
