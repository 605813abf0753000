use std::collections::HashMap;

use crate::bo::info::{BoId, BoInfo, BoTable, FrameParity, Released};
use crate::bo::memory::BoView;
use crate::bo::{BoBackend, BoGeometry, BoHandle, BoUsage, SecureId};
use crate::config::Dri2Options;
use crate::dri2::buffer::{
    Attachment, BUFFER_FLAG_FB, BUFFER_FLAG_REUSED, Dri2Buffer, PublishOutcome,
};
use crate::dri2::window::{OrderCheck, WindowState};
use crate::foundation::core::{DrawableInfo, DrawableKind, Rect, Region, SurfaceId};
use crate::foundation::error::{Dri2Error, Dri2Result};
use crate::host::{BlitSource, PixmapStorage, ScreenHost};
use crate::overlay::OverlayContext;
use crate::overlay::plane::{Display, PlaneSource};

/// Size of the dummy allocations reserved at startup.
const NULL_BO_SIZE: u32 = 32;
/// The resize workaround is only needed for the first couple of mismatches.
const MAX_RESIZE_WORKAROUNDS: u32 = 2;
const MIB: usize = 1024 * 1024;

/// Counters describing what the buffer manager did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct Dri2Stats {
    /// Buffers handed to clients.
    pub buffers_created: u64,
    /// Requests answered with a dummy buffer.
    pub dummy_buffers: u64,
    /// Requests answered with a carve-out of the offscreen framebuffer.
    pub overlay_buffers: u64,
    /// Requests that reused the window's existing allocation.
    pub reused_buffers: u64,
    /// Backend allocations that failed.
    pub allocation_failures: u64,
    /// Pixmaps whose storage moved into a buffer.
    pub migrated_pixmaps: u64,
    /// Frames copied into a window.
    pub blits: u64,
    /// Frames scanned out by the overlay plane.
    pub overlay_frames: u64,
    /// Swaps skipped to keep carve-outs on their frame parity.
    pub skipped_swaps: u64,
    /// Front/back exchanges forced by the order check.
    pub order_corrections: u64,
    /// Carve-outs rejected by a full delivery queue.
    pub queue_overflows: u64,
    /// Times the resize workaround answered a request.
    pub resize_workarounds: u64,
}

/// Buffer-exchange context of one screen.
///
/// Owns every [`BoInfo`] (in a [`BoTable`]), the per-window delivery state, the pixmap bindings
/// and the overlay state. All entry points take the host explicitly.
pub struct Dri2 {
    opts: Dri2Options,
    backend: Box<dyn BoBackend>,
    display: Option<Display>,
    bos: BoTable,
    windows: HashMap<SurfaceId, WindowState>,
    pixmaps: HashMap<SurfaceId, BoId>,
    overlay: OverlayContext,
    stats: Dri2Stats,
}

fn null_geometry() -> BoGeometry {
    BoGeometry {
        width: NULL_BO_SIZE,
        height: NULL_BO_SIZE,
        depth: 0,
        bpp: 32,
    }
}

fn both_mapped(bos: &BoTable, a: BoId, b: BoId) -> bool {
    a != b && bos.get(a).is_some_and(BoInfo::is_mapped) && bos.get(b).is_some_and(BoInfo::is_mapped)
}

/// Compare front/back content against their snapshots and clear the snapshots.
fn order_check(bos: &mut BoTable, front: BoId, back: BoId) -> OrderCheck {
    let front_modified = bos.get(front).is_some_and(BoInfo::checksum_changed);
    let back_modified = bos.get(back).is_some_and(BoInfo::checksum_changed);
    for id in [front, back] {
        if let Some(bo) = bos.get_mut(id) {
            bo.checksum = None;
        }
    }
    if back_modified && !front_modified {
        for id in [front, back] {
            if let Some(bo) = bos.get_mut(id) {
                bo.passed_order_check = true;
            }
        }
        OrderCheck::BackModified
    } else if front_modified {
        OrderCheck::FrontModified
    } else {
        OrderCheck::Inconclusive
    }
}

impl Dri2 {
    /// Set up buffer exchange on `backend`, using the overlay of `display` when allowed.
    pub fn new(
        opts: Dri2Options,
        mut backend: Box<dyn BoBackend>,
        display: Option<Display>,
    ) -> Self {
        let mut overlay = OverlayContext::default();
        let reserved = &mut overlay.reserved;

        match display.as_ref().filter(|_| opts.hw_overlay) {
            Some(d) => {
                if !opts.use_dumb {
                    reserved.alt_fb_secure_id = d.info.alt_fb_secure_id;
                }
                if let Some(h) = backend.new_bo(null_geometry(), BoUsage::None) {
                    reserved.null_secure_id = backend.secure_id(h);
                    reserved.null_handles.push(h);
                }
                if !opts.use_dumb {
                    reserved.fb_secure_id = d.info.fb_secure_id;
                    if !reserved.fb_secure_id.is_valid() {
                        tracing::info!("no framebuffer wrapper, overlays can't be used");
                    }
                }

                let alt = reserved.alt_fb_secure_id;
                if !alt.is_valid() || backend.size_from_secure_id(alt) != d.info.framebuffer_size {
                    tracing::info!(
                        "framebuffer wrapper is missing or too small, overlays can't be used"
                    );
                    reserved.fb_secure_id = SecureId::INVALID;
                    reserved.alt_fb_secure_id = SecureId::INVALID;
                }

                let double = d.info.xres as usize * d.info.yres as usize * 4 * 2;
                let gfx = d.info.gfx_layer_size;
                if gfx > 0 && d.info.offscreen_size() < double {
                    let needed_fb_num = double.div_ceil(gfx) + 1;
                    let reserve_mib = (needed_fb_num * gfx).div_ceil(MIB);
                    tracing::info!(
                        needed_fb_num,
                        reserve_mib,
                        "tear-free zero-copy double buffering needs more video memory"
                    );
                }
            }
            None => {
                for _ in 0..2 {
                    if let Some(h) = backend.new_bo(null_geometry(), BoUsage::None) {
                        if !reserved.null_secure_id.is_valid() {
                            reserved.null_secure_id = backend.secure_id(h);
                        }
                        reserved.null_handles.push(h);
                    }
                }
            }
        }

        if !reserved.null_secure_id.is_valid() {
            tracing::warn!("no dummy buffer, the window resize workaround is unavailable");
        }
        if display.is_some() && reserved.fb_secure_id.is_valid() {
            tracing::info!("enabled display controller hardware overlays");
        } else if opts.hw_overlay {
            tracing::info!("display controller hardware overlays can't be used");
        } else {
            tracing::info!("display controller hardware overlays are not used");
        }
        tracing::info!(
            backend = ?backend.kind(),
            swapbuffers_wait = opts.swapbuffers_wait,
            "buffer exchange ready"
        );

        Self {
            opts,
            backend,
            display,
            bos: BoTable::new(),
            windows: HashMap::new(),
            pixmaps: HashMap::new(),
            overlay,
            stats: Dri2Stats::default(),
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &Dri2Options {
        &self.opts
    }

    /// The buffer backend.
    pub fn backend(&self) -> &dyn BoBackend {
        self.backend.as_ref()
    }

    /// All live buffer records.
    pub fn bos(&self) -> &BoTable {
        &self.bos
    }

    /// Delivery state of a window, if it ever requested a back buffer.
    pub fn window_state(&self, surface: SurfaceId) -> Option<&WindowState> {
        self.windows.get(&surface)
    }

    /// Buffer a pixmap was migrated into.
    pub fn pixmap_bo(&self, pixmap: SurfaceId) -> Option<BoId> {
        self.pixmaps.get(&pixmap).copied()
    }

    /// Overlay state.
    pub fn overlay(&self) -> &OverlayContext {
        &self.overlay
    }

    /// Counters.
    pub fn stats(&self) -> Dri2Stats {
        self.stats
    }

    /// `true` when the display and its framebuffer wrapper allow overlays at all.
    pub fn overlay_available(&self) -> bool {
        self.display.is_some() && self.overlay.reserved.fb_secure_id.is_valid()
    }

    /// Declare the display pipeline's scanout handle; buffers using it are never released here.
    pub fn set_scanout(&mut self, handle: Option<BoHandle>) {
        self.bos.set_scanout(handle);
    }

    /// CPU view of a client buffer.
    pub fn map_buffer(&self, buffer: &Dri2Buffer) -> Option<BoView> {
        self.bos.get(buffer.bo)?.view()
    }

    fn unref(&mut self, id: BoId) {
        if let Ok(Released::Freed) = self.bos.release(id, self.backend.as_mut())
            && self.overlay.dirty == Some(id)
        {
            self.overlay.dirty = None;
        }
    }

    /// Answer a client's buffer request for `surface`.
    #[tracing::instrument(skip(self, host))]
    pub fn create_buffer<H: ScreenHost + ?Sized>(
        &mut self,
        host: &mut H,
        surface: SurfaceId,
        attachment: Attachment,
        format: u32,
    ) -> Dri2Result<Dri2Buffer> {
        let info = host
            .drawable(surface)
            .ok_or_else(|| Dri2Error::protocol(format!("unknown drawable {}", surface.0)))?;

        let pixmap = match (attachment, info.kind) {
            (Attachment::FrontLeft, _) if self.opts.use_exa => host.drawable_pixmap(surface),
            (_, DrawableKind::Pixmap) => Some(surface),
            _ => None,
        };
        if let Some(pixmap) = pixmap {
            return self.pixmap_buffer(host, surface, pixmap, attachment, format);
        }

        let cpp = info.cpp();
        let pitch = (cpp * info.width).next_multiple_of(8);
        let size = pitch as usize * info.height as usize;
        // Bumped so the server never hands a stale buffer back to the client.
        let format = format.wrapping_add(1);
        self.stats.buffers_created += 1;

        if attachment != Attachment::BackLeft || info.kind != DrawableKind::Window {
            return Ok(self.dummy_buffer(&info, attachment, format, pitch, size));
        }

        let offscreen = self.display.as_ref().map_or(0, |d| d.info.offscreen_size());
        if self.display.is_some() && offscreen < size * 2 {
            tracing::debug!(
                size,
                offscreen,
                "not enough offscreen framebuffer for the overlay"
            );
        }
        let use_overlay = self.overlay_available()
            && self.overlay.owner.is_none_or(|o| o == surface)
            && !(info.width == 1 && info.height == 1)
            && matches!(info.bpp, 16 | 32)
            && offscreen >= size * 2;

        let fresh = !self.windows.contains_key(&surface);
        let ws = self
            .windows
            .entry(surface)
            .or_insert_with(|| WindowState::new(surface));
        if fresh {
            tracing::debug!(surface = surface.0, "new window delivery state");
            if use_overlay && let Some(d) = self.display.as_ref() {
                d.info
                    .framebuffer
                    .fill(d.info.gfx_layer_size..d.info.framebuffer_size, 0);
            }
        }
        let size_changed = ws.record_request(info.width, info.height);
        let odd = ws.is_odd_request();
        let workaround = size_changed
            && self.overlay.resize_workarounds < MAX_RESIZE_WORKAROUNDS
            && self.overlay.reserved.null_secure_id.is_valid();
        if workaround {
            tracing::debug!(
                surface = surface.0,
                "buffer size mismatch detected, trying to recover"
            );
            self.overlay.resize_workarounds += 1;
            self.stats.resize_workarounds += 1;
        }

        if use_overlay {
            self.overlay_buffer(
                surface,
                &info,
                attachment,
                format,
                pitch,
                size,
                odd,
                workaround,
            )
        } else {
            self.backed_buffer(
                host,
                surface,
                &info,
                attachment,
                format,
                pitch,
                size,
                workaround,
            )
        }
    }

    fn dummy_buffer(
        &mut self,
        info: &DrawableInfo,
        attachment: Attachment,
        format: u32,
        pitch: u32,
        size: usize,
    ) -> Dri2Buffer {
        let name = self.overlay.reserved.null_secure_id;
        let mut bo = BoInfo::empty(info.width, info.height, info.depth, info.bpp);
        bo.size = size;
        bo.pitch = pitch;
        bo.secure_id = name;
        let id = self.bos.insert(bo);
        self.stats.dummy_buffers += 1;
        Dri2Buffer {
            attachment,
            format,
            name,
            pitch,
            cpp: info.cpp(),
            flags: 0,
            bo: id,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn overlay_buffer(
        &mut self,
        surface: SurfaceId,
        info: &DrawableInfo,
        attachment: Attachment,
        format: u32,
        pitch: u32,
        size: usize,
        odd: bool,
        workaround: bool,
    ) -> Dri2Result<Dri2Buffer> {
        let Some(display) = self.display.as_ref() else {
            return Err(Dri2Error::protocol("overlay buffer requested without a display"));
        };
        let offset = display.info.gfx_layer_size + if odd { 0 } else { size };
        let framebuffer = display.info.framebuffer.clone();
        let name = if workaround {
            self.overlay.reserved.alt_fb_secure_id
        } else {
            self.overlay.reserved.fb_secure_id
        };

        let old_mem = self.windows.get_mut(&surface).and_then(|ws| ws.mem.take());
        if let Some(old) = old_mem {
            self.unref(old);
        }

        let mut bo = BoInfo::empty(info.width, info.height, info.depth, info.bpp);
        bo.memory = Some(framebuffer);
        bo.offset = offset;
        bo.size = size;
        bo.pitch = pitch;
        bo.secure_id = name;
        bo.parity = Some(if odd {
            FrameParity::Odd
        } else {
            FrameParity::Even
        });
        let id = self.bos.insert(bo);

        self.bos.acquire(id)?;
        let rejected = match self.windows.get_mut(&surface) {
            Some(ws) => ws.queue.enqueue(id).err(),
            None => Some(id),
        };
        if let Some(rejected) = rejected {
            self.stats.queue_overflows += 1;
            self.unref(rejected);
        }
        self.overlay.owner = Some(surface);
        self.stats.overlay_buffers += 1;

        tracing::debug!(
            surface = surface.0,
            bo = id.0,
            offset,
            odd,
            "overlay buffer"
        );
        Ok(Dri2Buffer {
            attachment,
            format,
            name,
            pitch,
            cpp: info.cpp(),
            flags: offset as u32,
            bo: id,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn backed_buffer<H: ScreenHost + ?Sized>(
        &mut self,
        host: &mut H,
        surface: SurfaceId,
        info: &DrawableInfo,
        attachment: Attachment,
        format: u32,
        pitch: u32,
        size: usize,
        workaround: bool,
    ) -> Dri2Result<Dri2Buffer> {
        let (back, front) = match self.windows.get_mut(&surface) {
            Some(ws) => (ws.back.take(), ws.front.take()),
            None => (None, None),
        };
        for old in [back, front].into_iter().flatten() {
            self.unref(old);
        }

        if workaround {
            let old_mem = self.windows.get_mut(&surface).and_then(|ws| ws.mem.take());
            if let Some(old) = old_mem {
                self.unref(old);
            }
            return Ok(self.dummy_buffer(info, attachment, format, pitch, size));
        }

        let mem = self.windows.get(&surface).and_then(|ws| ws.mem);
        if let Some(mem) = mem
            && let Some(bo) = self.bos.get(mem)
            && bo.size == size
            && bo.depth == info.depth
            && bo.width == info.width
            && bo.height == info.height
        {
            let name = bo.secure_id;
            self.bos.acquire(mem)?;
            self.stats.reused_buffers += 1;
            tracing::debug!(surface = surface.0, bo = mem.0, "reusing window buffer");
            return Ok(Dri2Buffer {
                attachment,
                format,
                name,
                pitch,
                cpp: info.cpp(),
                flags: 0,
                bo: mem,
            });
        }

        let geometry = BoGeometry {
            width: info.width,
            height: info.height,
            depth: info.depth,
            bpp: info.bpp,
        };
        let mut bo = BoInfo::empty(info.width, info.height, info.depth, info.bpp);
        bo.size = size;
        bo.pitch = pitch;
        match self.backend.new_bo(geometry, BoUsage::UseCache) {
            Some(h) => {
                if let Err(e) = self.backend.switch_hw_usage(h, false) {
                    tracing::warn!(error = %e, "could not hand buffer to the GPU");
                }
                bo.handle = Some(h);
                bo.memory = self.backend.map(h);
                bo.secure_id = self.backend.secure_id(h);
            }
            None => {
                self.stats.allocation_failures += 1;
                tracing::error!(size, surface = surface.0, "failed to allocate buffer");
            }
        }
        let name = bo.secure_id;
        let id = self.bos.insert(bo);

        let old_mem = self
            .windows
            .get_mut(&surface)
            .and_then(|ws| ws.mem.replace(id));
        if let Some(old) = old_mem {
            self.unref(old);
        }
        self.bos.acquire(id)?;

        let mut buffer = Dri2Buffer {
            attachment,
            format,
            name,
            pitch,
            cpp: info.cpp(),
            flags: 0,
            bo: id,
        };
        self.prepare_flip(host, surface, &mut buffer);
        tracing::debug!(
            surface = surface.0,
            bo = id.0,
            name = name.0,
            "allocated window buffer"
        );
        Ok(buffer)
    }

    fn pixmap_buffer<H: ScreenHost + ?Sized>(
        &mut self,
        host: &mut H,
        surface: SurfaceId,
        pixmap: SurfaceId,
        attachment: Attachment,
        format: u32,
    ) -> Dri2Result<Dri2Buffer> {
        let id = self.migrate_pixmap(host, pixmap)?;
        self.bos.acquire(id)?;
        self.stats.buffers_created += 1;

        let (pitch, cpp, handle) = match self.bos.get(id) {
            Some(bo) => (bo.pitch, bo.cpp, bo.handle),
            None => return Err(Dri2Error::protocol(format!("buffer {} vanished", id.0))),
        };
        let name = handle.map_or(SecureId::INVALID, |h| self.backend.secure_id(h));
        let mut buffer = Dri2Buffer {
            attachment,
            format,
            name,
            pitch,
            cpp,
            flags: 0,
            bo: id,
        };
        self.prepare_flip(host, surface, &mut buffer);
        tracing::debug!(pixmap = pixmap.0, bo = id.0, name = name.0, "pixmap buffer");
        Ok(buffer)
    }

    /// Move a pixmap's pixels into a backend buffer and point the pixmap at it.
    ///
    /// The binding keeps one reference; an existing binding with a live handle is returned as is.
    pub fn migrate_pixmap<H: ScreenHost + ?Sized>(
        &mut self,
        host: &mut H,
        pixmap: SurfaceId,
    ) -> Dri2Result<BoId> {
        let existing = self.pixmaps.get(&pixmap).copied();
        if let Some(id) = existing
            && let Some(h) = self.bos.get(id).and_then(|b| b.handle)
            && self.backend.valid(h)
        {
            tracing::debug!(pixmap = pixmap.0, bo = id.0, "pixmap already migrated");
            return Ok(id);
        }

        let info = host
            .drawable(pixmap)
            .ok_or_else(|| Dri2Error::protocol(format!("unknown pixmap {}", pixmap.0)))?;
        let storage = host
            .pixmap_storage(pixmap)
            .ok_or_else(|| Dri2Error::protocol(format!("pixmap {} has no storage", pixmap.0)))?;

        let geometry = BoGeometry {
            width: info.width,
            height: info.height,
            depth: info.depth,
            bpp: info.bpp,
        };
        let Some(handle) = self.backend.new_bo(geometry, BoUsage::Default) else {
            self.stats.allocation_failures += 1;
            tracing::error!(pixmap = pixmap.0, "failed to allocate buffer for pixmap");
            return Err(Dri2Error::backend(format!(
                "no buffer for {}x{} pixmap {}",
                info.width, info.height, pixmap.0
            )));
        };
        let Some(memory) = self.backend.map(handle) else {
            self.backend.release(handle);
            return Err(Dri2Error::backend(format!("cannot map buffer for pixmap {}", pixmap.0)));
        };
        let pitch = self.backend.pitch(handle);
        let size = pitch as usize * info.height as usize;

        if let Some(src) = storage.memory.as_ref() {
            if pitch == storage.pitch {
                let mut bytes = vec![0; size];
                if src.read(storage.offset, &mut bytes) {
                    memory.write(0, &bytes);
                }
            } else {
                let mut row = vec![0; storage.pitch.min(pitch) as usize];
                for y in 0..info.height as usize {
                    if src.read(storage.offset + y * storage.pitch as usize, &mut row) {
                        memory.write(y * pitch as usize, &row);
                    }
                }
            }
        }
        host.set_pixmap_storage(
            pixmap,
            PixmapStorage {
                memory: Some(memory.clone()),
                offset: 0,
                pitch,
            },
        );

        let secure_id = self.backend.secure_id(handle);
        let fill = |bo: &mut BoInfo| {
            bo.handle = Some(handle);
            bo.memory = Some(memory.clone());
            bo.offset = 0;
            bo.size = size;
            bo.pitch = pitch;
            bo.secure_id = secure_id;
            bo.pixmap = Some(pixmap);
            // The first migration saw the pixmap's own storage.
            bo.backup.get_or_insert_with(|| storage.clone());
        };
        let id = match existing.filter(|id| self.bos.contains(*id)) {
            Some(id) => {
                if let Some(bo) = self.bos.get_mut(id) {
                    fill(bo);
                }
                id
            }
            None => {
                let mut bo = BoInfo::empty(info.width, info.height, info.depth, info.bpp);
                fill(&mut bo);
                let id = self.bos.insert(bo);
                self.pixmaps.insert(pixmap, id);
                id
            }
        };
        self.stats.migrated_pixmaps += 1;
        tracing::debug!(pixmap = pixmap.0, bo = id.0, pitch, "migrated pixmap");
        Ok(id)
    }

    /// Register a scanout framebuffer for flippable buffers and publish the result in the flags.
    fn prepare_flip<H: ScreenHost + ?Sized>(
        &mut self,
        host: &H,
        surface: SurfaceId,
        buffer: &mut Dri2Buffer,
    ) {
        buffer.flags &= !(BUFFER_FLAG_FB | BUFFER_FLAG_REUSED);
        let Some(handle) = self.bos.get(buffer.bo).and_then(|b| b.handle) else {
            return;
        };
        if self.opts.flip
            && host.can_flip(surface)
            && buffer.attachment != Attachment::FrontLeft
            && let Err(e) = self.backend.add_scanout_fb(handle)
        {
            tracing::warn!(error = %e, "falling back to blitting a flippable window");
        }
        if self.backend.scanout_fb(handle).is_some() {
            buffer.flags |= BUFFER_FLAG_FB;
        }
    }

    /// A client is done with `buffer`.
    ///
    /// A pending overlay flush survives as long as the delivery state still references the buffer.
    pub fn destroy_buffer(&mut self, buffer: Dri2Buffer) -> Dri2Result<()> {
        tracing::debug!(bo = buffer.bo.0, attachment = ?buffer.attachment, "destroy buffer");
        if self.bos.release(buffer.bo, self.backend.as_mut())? == Released::Freed
            && self.overlay.dirty == Some(buffer.bo)
        {
            self.overlay.dirty = None;
        }
        Ok(())
    }

    /// Publish the newest frame of `surface`: pick the buffer to show, keep front/back in order,
    /// then either blit it into the window or scan it out through the overlay.
    #[tracing::instrument(skip(self, host, region, dst, src))]
    pub fn copy_region<H: ScreenHost + ?Sized>(
        &mut self,
        host: &mut H,
        surface: SurfaceId,
        region: &Region,
        dst: &Dri2Buffer,
        src: &Dri2Buffer,
    ) -> PublishOutcome {
        let Some(info) = host.drawable(surface) else {
            tracing::debug!("publish for an unknown drawable");
            return PublishOutcome::Skipped;
        };
        if info.kind == DrawableKind::Pixmap {
            tracing::debug!("publish for a pixmap");
            return PublishOutcome::Skipped;
        }
        let Some(ws) = self.windows.get_mut(&surface) else {
            tracing::debug!("publish for a window without delivery state");
            return PublishOutcome::Skipped;
        };
        tracing::trace!(dst = ?dst.attachment, src = ?src.attachment, "copy region");

        let popped = ws.queue.dequeue();

        if popped.is_none()
            && let (Some(front), Some(back)) = (ws.front, ws.back)
            && both_mapped(&self.bos, front, back)
        {
            let verdict = order_check(&mut self.bos, front, back);
            if verdict == OrderCheck::FrontModified {
                std::mem::swap(&mut ws.front, &mut ws.back);
                self.stats.order_corrections += 1;
                tracing::warn!(
                    surface = surface.0,
                    "unexpected modification of the front buffer"
                );
            }
            ws.last_order_check = Some(verdict);
        }

        let parity = popped
            .and_then(|id| self.bos.get(id))
            .and_then(|b| b.parity);
        if parity.is_some() && parity == Some(FrameParity::of(ws.swap_count)) {
            self.stats.skipped_swaps += 1;
            tracing::debug!(
                swap_count = ws.swap_count,
                "skipping swap to keep frame parity"
            );
        } else {
            ws.swap();
        }

        let mut old_front = None;
        let shown = match popped {
            Some(id) => {
                old_front = ws.front.replace(id);
                Some(id)
            }
            None => ws.front,
        }
        .or(ws.mem);
        let (front, back, seed) = (ws.front, ws.back, ws.swap_count as u32);

        if let Some(old) = old_front {
            self.unref(old);
        }

        let Some(shown) = shown.filter(|id| self.bos.get(*id).is_some_and(BoInfo::is_mapped)) else {
            return PublishOutcome::Skipped;
        };

        if let (Some(front), Some(back)) = (front, back)
            && both_mapped(&self.bos, front, back)
        {
            for id in [front, back] {
                if let Some(bo) = self.bos.get_mut(id)
                    && !bo.passed_order_check
                {
                    bo.save_checksum(seed);
                }
            }
        }

        self.update_overlay(host);

        let Some((valid_handle, source)) = self.bos.get(shown).map(|bo| {
            let valid = bo.handle.is_some_and(|h| self.backend.valid(h));
            let source = PlaneSource {
                bpp: bo.cpp * 8,
                offset: bo.offset,
                width: bo.width,
                height: bo.height,
                stride: bo.pitch / 4,
            };
            (valid, source)
        }) else {
            return PublishOutcome::Skipped;
        };

        if !self.overlay.enabled || valid_handle {
            self.blit(host, surface, region, shown);
            self.overlay.dirty = None;
            return PublishOutcome::Blitted { bo: shown };
        }

        self.overlay.dirty = Some(shown);
        let Some(display) = self.display.as_mut() else {
            return PublishOutcome::Skipped;
        };
        display.plane.set_output_window(info.rect());
        display.plane.set_rgb_input_buffer(&source);
        display.plane.show();
        if self.opts.swapbuffers_wait {
            display.plane.wait_for_vsync();
        }
        self.stats.overlay_frames += 1;
        PublishOutcome::Overlay { bo: shown }
    }

    /// Copy a buffer into a drawable, handing backend buffers to the CPU for the duration.
    fn blit<H: ScreenHost + ?Sized>(
        &mut self,
        host: &mut H,
        surface: SurfaceId,
        region: &Region,
        id: BoId,
    ) {
        let Some(bo) = self.bos.get(id) else {
            return;
        };
        let Some(memory) = bo.memory.clone() else {
            return;
        };
        let handle = bo.handle.filter(|h| self.backend.valid(*h));
        let source = BlitSource {
            memory: &memory,
            offset: bo.offset,
            pitch: bo.pitch,
            width: bo.width,
            height: bo.height,
            bpp: (bo.cpp * 8) as u8,
        };

        if let Some(h) = handle
            && let Err(e) = self.backend.switch_hw_usage(h, true)
        {
            tracing::warn!(error = %e, "could not hand buffer to the CPU");
        }
        host.copy_area(surface, region, &source);
        if let Some(h) = handle
            && let Err(e) = self.backend.switch_hw_usage(h, false)
        {
            tracing::warn!(error = %e, "could not hand buffer back to the GPU");
        }
        self.stats.blits += 1;
    }

    /// Copy the content shown on the overlay into the owner window.
    pub fn flush_overlay<H: ScreenHost + ?Sized>(&mut self, host: &mut H) {
        let Some(dirty) = self.overlay.dirty.take() else {
            return;
        };
        let Some(owner) = self.overlay.owner else {
            return;
        };
        let Some(info) = host.drawable(owner) else {
            return;
        };
        tracing::debug!(
            owner = owner.0,
            bo = dirty.0,
            "flushing overlay content to the window"
        );
        let region = Region::from_rect(Rect::new(0, 0, info.width, info.height));
        self.blit(host, owner, &region, dirty);
    }

    /// Re-evaluate overlay visibility and drive the plane accordingly.
    pub fn update_overlay<H: ScreenHost + ?Sized>(&mut self, host: &mut H) {
        if self.display.is_none() {
            return;
        }
        let t = self.overlay.update(&*host);
        if t.flush {
            self.flush_overlay(host);
        }
        let Some(display) = self.display.as_mut() else {
            return;
        };
        if t.hide {
            display.plane.hide();
        }
        if let Some(rect) = t.move_to {
            display.plane.set_output_window(rect);
        }
        if t.show {
            display.plane.show();
        }
    }

    /// Drop every reference held for a window that is going away.
    pub fn destroy_window<H: ScreenHost + ?Sized>(&mut self, _host: &mut H, surface: SurfaceId) {
        if let Some(mut ws) = self.windows.remove(&surface) {
            tracing::debug!(
                surface = surface.0,
                pending = ws.queue.len(),
                "free window delivery state"
            );
            for id in ws.take_all() {
                self.unref(id);
            }
        }
        if self.overlay.owner == Some(surface) {
            if let Some(display) = self.display.as_mut() {
                display.plane.hide();
            }
            self.overlay.owner = None;
            self.overlay.enabled = false;
            self.overlay.position = None;
            self.overlay.dirty = None;
            tracing::debug!(surface = surface.0, "overlay owner destroyed");
        }
    }

    /// Undo a pixmap migration before the pixmap is destroyed.
    pub fn destroy_pixmap<H: ScreenHost + ?Sized>(&mut self, host: &mut H, pixmap: SurfaceId) {
        let Some(id) = self.pixmaps.remove(&pixmap) else {
            return;
        };
        let scanout = self.bos.scanout();
        let Some(bo) = self.bos.get_mut(id) else {
            return;
        };
        tracing::debug!(pixmap = pixmap.0, bo = id.0, "destroy migrated pixmap");
        if let Some(backup) = bo.backup.take() {
            host.set_pixmap_storage(pixmap, backup);
        }
        if bo.pixmap == Some(pixmap) {
            bo.pixmap = None;
        }
        if bo.handle.is_none() || bo.handle != scanout {
            self.unref(id);
        }
    }

    /// Flush pending overlay content before someone reads the screen back.
    pub fn prepare_readback<H: ScreenHost + ?Sized>(&mut self, host: &mut H) {
        if self.overlay.dirty.is_some() {
            self.flush_overlay(host);
        }
    }

    /// Record the cursor mode and re-evaluate the overlay.
    pub fn set_hw_cursor<H: ScreenHost + ?Sized>(&mut self, host: &mut H, in_use: bool) {
        if self.overlay.hw_cursor_in_use != in_use {
            tracing::debug!(in_use, "hardware cursor");
            self.overlay.hw_cursor_in_use = in_use;
        }
        self.update_overlay(host);
    }

    /// Release everything: window states, pixmap bindings, the plane and the dummy allocations.
    /// Returns the backend for inspection.
    pub fn close<H: ScreenHost + ?Sized>(mut self, host: &mut H) -> Box<dyn BoBackend> {
        let surfaces: Vec<SurfaceId> = self.windows.keys().copied().collect();
        for surface in surfaces {
            self.destroy_window(host, surface);
        }
        let pixmaps: Vec<SurfaceId> = self.pixmaps.keys().copied().collect();
        for pixmap in pixmaps {
            self.destroy_pixmap(host, pixmap);
        }
        if let Some(display) = self.display.as_mut() {
            display.plane.hide();
        }
        for h in std::mem::take(&mut self.overlay.reserved.null_handles) {
            if self.backend.valid(h) {
                self.backend.release(h);
            }
        }
        tracing::info!(live = self.bos.len(), "buffer exchange closed");
        self.backend
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dri2/manager.rs"]
mod tests;
