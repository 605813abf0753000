use std::collections::HashMap;

use crate::bo::SecureId;
use crate::bo::memory::MappedMemory;
use crate::foundation::core::{DrawableInfo, DrawableKind, Rect, Region, SurfaceId};
use crate::foundation::error::{Dri2Error, Dri2Result};
use crate::host::{BlitSource, ImageRequest, PixmapStorage, ScreenHost};
use crate::overlay::plane::DisplayInfo;
use crate::overlay::tree::{SurfaceTree, WindowAttrs};

/// Root window of every [`SoftScreen`].
pub const ROOT_WINDOW: SurfaceId = SurfaceId(1);
/// Pixmap backing the root window, stored at the start of the framebuffer.
pub const SCREEN_PIXMAP: SurfaceId = SurfaceId(2);

#[derive(Debug)]
struct SoftWindow {
    parent: Option<SurfaceId>,
    /// Top-most first.
    children: Vec<SurfaceId>,
    /// Relative to the parent origin.
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    border: u32,
    mapped: bool,
    input_only: bool,
}

#[derive(Debug)]
struct SoftPixmap {
    width: u32,
    height: u32,
    depth: u8,
    bpp: u8,
    storage: PixmapStorage,
}

/// In-memory display server.
///
/// Windows form an X-style tree without compositing: every window draws straight into the screen
/// pixmap, which lives at the start of a framebuffer that may be larger than one screen. Blits
/// move real pixels, so tests can inspect what ended up on screen.
#[derive(Debug)]
pub struct SoftScreen {
    framebuffer: MappedMemory,
    xres: u32,
    yres: u32,
    depth: u8,
    bpp: u8,
    windows: HashMap<SurfaceId, SoftWindow>,
    pixmaps: HashMap<SurfaceId, SoftPixmap>,
    next_id: u32,
    flip: bool,
    hw_cursor: bool,
    blits: u64,
    validations: u64,
}

fn depth_for(bpp: u8) -> u8 {
    match bpp {
        32 => 24,
        other => other,
    }
}

impl SoftScreen {
    /// A `xres`x`yres` screen at `bpp` bits per pixel on a framebuffer of `framebuffer_size` bytes.
    pub fn new(xres: u32, yres: u32, bpp: u8, framebuffer_size: usize) -> Dri2Result<Self> {
        if bpp != 16 && bpp != 32 {
            return Err(Dri2Error::config(format!("unsupported screen depth {bpp} bpp")));
        }
        let pitch = xres * u32::from(bpp) / 8;
        let gfx = pitch as usize * yres as usize;
        if gfx == 0 || framebuffer_size < gfx {
            return Err(Dri2Error::config(format!(
                "framebuffer of {framebuffer_size} bytes cannot hold a {xres}x{yres} screen"
            )));
        }

        let framebuffer = MappedMemory::zeroed(framebuffer_size);
        let depth = depth_for(bpp);
        let mut windows = HashMap::new();
        windows.insert(
            ROOT_WINDOW,
            SoftWindow {
                parent: None,
                children: Vec::new(),
                x: 0,
                y: 0,
                width: xres,
                height: yres,
                border: 0,
                mapped: true,
                input_only: false,
            },
        );
        let mut pixmaps = HashMap::new();
        pixmaps.insert(
            SCREEN_PIXMAP,
            SoftPixmap {
                width: xres,
                height: yres,
                depth,
                bpp,
                storage: PixmapStorage {
                    memory: Some(framebuffer.clone()),
                    offset: 0,
                    pitch,
                },
            },
        );

        Ok(Self {
            framebuffer,
            xres,
            yres,
            depth,
            bpp,
            windows,
            pixmaps,
            next_id: 3,
            flip: false,
            hw_cursor: false,
            blits: 0,
            validations: 0,
        })
    }

    /// Framebuffer layout for the overlay. Secure ids are left invalid for the caller to fill in.
    pub fn display_info(&self) -> DisplayInfo {
        DisplayInfo {
            framebuffer: self.framebuffer.clone(),
            framebuffer_size: self.framebuffer.len(),
            gfx_layer_size: self.gfx_layer_size(),
            xres: self.xres,
            yres: self.yres,
            fb_secure_id: SecureId::INVALID,
            alt_fb_secure_id: SecureId::INVALID,
        }
    }

    /// The whole framebuffer.
    pub fn framebuffer(&self) -> &MappedMemory {
        &self.framebuffer
    }

    /// Bytes taken by the visible screen.
    pub fn gfx_layer_size(&self) -> usize {
        self.screen_pitch() as usize * self.yres as usize
    }

    fn screen_pitch(&self) -> u32 {
        self.xres * u32::from(self.bpp) / 8
    }

    fn alloc_id(&mut self) -> SurfaceId {
        let id = SurfaceId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create an unmapped window on top of its siblings. Position is relative to `parent`.
    pub fn create_window(
        &mut self,
        parent: SurfaceId,
        rect: Rect,
        border: u32,
    ) -> Option<SurfaceId> {
        if !self.windows.contains_key(&parent) {
            return None;
        }
        let id = self.alloc_id();
        self.windows.insert(
            id,
            SoftWindow {
                parent: Some(parent),
                children: Vec::new(),
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
                border,
                mapped: false,
                input_only: false,
            },
        );
        if let Some(p) = self.windows.get_mut(&parent) {
            p.children.insert(0, id);
        }
        Some(id)
    }

    /// Create an unmapped input-only window on top of its siblings.
    pub fn create_input_only(&mut self, parent: SurfaceId, rect: Rect) -> Option<SurfaceId> {
        let id = self.create_window(parent, rect, 0)?;
        if let Some(w) = self.windows.get_mut(&id) {
            w.input_only = true;
        }
        Some(id)
    }

    /// Show a window.
    pub fn map_window(&mut self, id: SurfaceId) {
        if let Some(w) = self.windows.get_mut(&id) {
            w.mapped = true;
        }
    }

    /// Hide a window.
    pub fn unmap_window(&mut self, id: SurfaceId) {
        if let Some(w) = self.windows.get_mut(&id) {
            w.mapped = false;
        }
    }

    /// Move a window (relative to its parent).
    pub fn move_window(&mut self, id: SurfaceId, x: i32, y: i32) {
        if let Some(w) = self.windows.get_mut(&id) {
            w.x = x;
            w.y = y;
        }
    }

    /// Resize a window.
    pub fn resize_window(&mut self, id: SurfaceId, width: u32, height: u32) {
        if let Some(w) = self.windows.get_mut(&id) {
            w.width = width;
            w.height = height;
        }
    }

    /// Put a window on top of its siblings.
    pub fn raise_window(&mut self, id: SurfaceId) {
        let Some(parent) = self.windows.get(&id).and_then(|w| w.parent) else {
            return;
        };
        if let Some(p) = self.windows.get_mut(&parent) {
            p.children.retain(|c| *c != id);
            p.children.insert(0, id);
        }
    }

    /// Create a pixmap with its own zeroed storage.
    pub fn create_pixmap(&mut self, width: u32, height: u32, bpp: u8) -> SurfaceId {
        let pitch = (width * u32::from(bpp) / 8).next_multiple_of(4);
        let id = self.alloc_id();
        self.pixmaps.insert(
            id,
            SoftPixmap {
                width,
                height,
                depth: depth_for(bpp),
                bpp,
                storage: PixmapStorage {
                    memory: Some(MappedMemory::zeroed(pitch as usize * height as usize)),
                    offset: 0,
                    pitch,
                },
            },
        );
        id
    }

    /// Let buffers of every window be flipped.
    pub fn set_flip_capable(&mut self, flip: bool) {
        self.flip = flip;
    }

    /// Cursor mode as last reported through the cursor handlers.
    pub fn hw_cursor(&self) -> bool {
        self.hw_cursor
    }

    /// Blits performed so far.
    pub fn blit_count(&self) -> u64 {
        self.blits
    }

    /// Tree validations seen so far.
    pub fn validation_count(&self) -> u64 {
        self.validations
    }

    /// `true` while `id` names a window or pixmap.
    pub fn exists(&self, id: SurfaceId) -> bool {
        self.windows.contains_key(&id) || self.pixmaps.contains_key(&id)
    }

    /// One pixel of the screen as a little-endian value (32 bpp screens).
    pub fn screen_pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.xres || y >= self.yres || self.bpp != 32 {
            return None;
        }
        let mut px = [0u8; 4];
        let at = y as usize * self.screen_pitch() as usize + x as usize * 4;
        self.framebuffer
            .read(at, &mut px)
            .then(|| u32::from_le_bytes(px))
    }

    /// Copy of the visible screen, tightly packed.
    pub fn screen_bytes(&self) -> Vec<u8> {
        let mut out = vec![0; self.gfx_layer_size()];
        self.framebuffer.read(0, &mut out);
        out
    }

    fn origin(&self, id: SurfaceId) -> Option<(i32, i32)> {
        let mut w = self.windows.get(&id)?;
        let (mut x, mut y) = (w.x, w.y);
        while let Some(p) = w.parent {
            w = self.windows.get(&p)?;
            x += w.x;
            y += w.y;
        }
        Some((x, y))
    }

    fn realized(&self, id: SurfaceId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            match self.windows.get(&c) {
                Some(w) if w.mapped => cur = w.parent,
                _ => return false,
            }
        }
        true
    }

    /// Pixmap, storage and drawable origin inside that pixmap for a drawable.
    fn target(&self, id: SurfaceId) -> Option<(&SoftPixmap, i32, i32)> {
        if let Some(p) = self.pixmaps.get(&id) {
            return Some((p, 0, 0));
        }
        let (x, y) = self.origin(id)?;
        Some((self.pixmaps.get(&SCREEN_PIXMAP)?, x, y))
    }

    fn remove_subtree(&mut self, id: SurfaceId) {
        if let Some(w) = self.windows.remove(&id) {
            for child in w.children {
                self.remove_subtree(child);
            }
        }
    }
}

impl SurfaceTree for SoftScreen {
    fn root(&self) -> SurfaceId {
        ROOT_WINDOW
    }

    fn parent(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.windows.get(&id)?.parent
    }

    fn last_child(&self, id: SurfaceId) -> Option<SurfaceId> {
        self.windows.get(&id)?.children.last().copied()
    }

    fn prev_sibling(&self, id: SurfaceId) -> Option<SurfaceId> {
        let parent = self.windows.get(&id)?.parent?;
        let siblings = &self.windows.get(&parent)?.children;
        let idx = siblings.iter().position(|c| *c == id)?;
        idx.checked_sub(1).map(|i| siblings[i])
    }

    fn window_attrs(&self, id: SurfaceId) -> Option<WindowAttrs> {
        let w = self.windows.get(&id)?;
        let (x, y) = self.origin(id)?;
        Some(WindowAttrs {
            mapped: w.mapped,
            realized: self.realized(id),
            input_only: w.input_only,
            rect: Rect::new(x, y, w.width, w.height),
            border: w.border,
        })
    }
}

impl ScreenHost for SoftScreen {
    fn drawable(&self, id: SurfaceId) -> Option<DrawableInfo> {
        if let Some(p) = self.pixmaps.get(&id) {
            return Some(DrawableInfo {
                kind: DrawableKind::Pixmap,
                x: 0,
                y: 0,
                width: p.width,
                height: p.height,
                depth: p.depth,
                bpp: p.bpp,
            });
        }
        let w = self.windows.get(&id)?;
        let (x, y) = self.origin(id)?;
        Some(DrawableInfo {
            kind: DrawableKind::Window,
            x,
            y,
            width: w.width,
            height: w.height,
            depth: self.depth,
            bpp: self.bpp,
        })
    }

    fn drawable_pixmap(&self, id: SurfaceId) -> Option<SurfaceId> {
        if self.pixmaps.contains_key(&id) {
            return Some(id);
        }
        self.windows.contains_key(&id).then_some(SCREEN_PIXMAP)
    }

    fn pixmap_storage(&self, pixmap: SurfaceId) -> Option<PixmapStorage> {
        self.pixmaps.get(&pixmap).map(|p| p.storage.clone())
    }

    fn set_pixmap_storage(&mut self, pixmap: SurfaceId, storage: PixmapStorage) {
        if let Some(p) = self.pixmaps.get_mut(&pixmap) {
            p.storage = storage;
        }
    }

    fn copy_area(&mut self, dst: SurfaceId, clip: &Region, src: &BlitSource<'_>) {
        let Some(info) = self.drawable(dst) else {
            return;
        };
        let Some((pix, ox, oy)) = self.target(dst) else {
            return;
        };
        let Some(dst_mem) = pix.storage.memory.clone() else {
            return;
        };
        let (dst_off, dst_pitch) = (pix.storage.offset, pix.storage.pitch as usize);
        let bounds = Rect::new(-ox, -oy, pix.width, pix.height);
        let cpp = usize::from(src.bpp / 8).max(1);
        let visible = Rect::new(
            0,
            0,
            info.width.min(src.width),
            info.height.min(src.height),
        );

        let mut row = Vec::new();
        for r in clip.rects() {
            let Some(r) = r.intersect(visible).and_then(|r| r.intersect(bounds)) else {
                continue;
            };
            let len = r.width as usize * cpp;
            row.resize(len, 0);
            for y in r.y..r.y + r.height as i32 {
                let s = src.offset + y as usize * src.pitch as usize + r.x as usize * cpp;
                let d = dst_off
                    + (y + oy) as usize * dst_pitch
                    + (r.x + ox) as usize * cpp;
                if src.memory.read(s, &mut row) {
                    dst_mem.write(d, &row);
                }
            }
        }
        self.blits += 1;
    }

    fn destroy_window(&mut self, id: SurfaceId) -> bool {
        if id == ROOT_WINDOW {
            return false;
        }
        let Some(parent) = self.windows.get(&id).and_then(|w| w.parent) else {
            return false;
        };
        if let Some(p) = self.windows.get_mut(&parent) {
            p.children.retain(|c| *c != id);
        }
        self.remove_subtree(id);
        true
    }

    fn destroy_pixmap(&mut self, id: SurfaceId) -> bool {
        id != SCREEN_PIXMAP && self.pixmaps.remove(&id).is_some()
    }

    fn post_validate_tree(&mut self, _changed: Option<SurfaceId>) {
        self.validations += 1;
    }

    fn get_image(&mut self, request: &ImageRequest) -> Vec<u8> {
        let Some((pix, ox, oy)) = self.target(request.drawable) else {
            return Vec::new();
        };
        let Some(mem) = pix.storage.memory.as_ref() else {
            return Vec::new();
        };
        let cpp = usize::from(pix.bpp / 8);
        let r = request.rect;
        let row_len = r.width as usize * cpp;
        let mut out = vec![0; row_len * r.height as usize];
        let bounds = Rect::new(0, 0, pix.width, pix.height);
        let Some(abs) = Rect::new(r.x + ox, r.y + oy, r.width, r.height).intersect(bounds) else {
            return out;
        };
        for y in 0..abs.height as usize {
            let sy = abs.y as usize + y;
            let s = pix.storage.offset + sy * pix.storage.pitch as usize + abs.x as usize * cpp;
            let d = (sy as i32 - (r.y + oy)) as usize * row_len
                + (abs.x - (r.x + ox)) as usize * cpp;
            let n = abs.width as usize * cpp;
            mem.read(s, &mut out[d..d + n]);
        }
        out
    }

    fn can_flip(&self, id: SurfaceId) -> bool {
        self.flip && self.windows.contains_key(&id)
    }

    fn enable_hw_cursor(&mut self) {
        self.hw_cursor = true;
    }

    fn disable_hw_cursor(&mut self) {
        self.hw_cursor = false;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/host/soft.rs"]
mod tests;
