use super::*;
use crate::bo::memory::MappedMemory;
use crate::bo::ump::UmpBackend;
use crate::bo::{BackendDevice, BackendKind, create_backend};
use crate::host::recording::{PlaneLog, PlaneOp, RecordingPlane};
use crate::host::soft::{ROOT_WINDOW, SoftScreen};

const XRES: u32 = 320;
const YRES: u32 = 240;
const GFX: usize = (XRES * YRES * 4) as usize;
/// 64x32 at 32 bpp.
const WIN_SIZE: usize = 64 * 4 * 32;

struct Fixture {
    host: SoftScreen,
    dri2: Dri2,
    log: PlaneLog,
    fb_id: SecureId,
}

fn overlay_fixture(opts: Dri2Options) -> Fixture {
    let host = SoftScreen::new(XRES, YRES, 32, GFX * 3).expect("screen");
    let mut ump = UmpBackend::open(BackendDevice::default()).expect("ump");
    let mut info = host.display_info();
    info.fb_secure_id = ump.wrap_external(host.framebuffer().clone());
    info.alt_fb_secure_id = ump.wrap_external(host.framebuffer().clone());
    let fb_id = info.fb_secure_id;
    let (plane, log) = RecordingPlane::new();
    let display = Display::new(info, Box::new(plane));
    let dri2 = Dri2::new(opts, Box::new(ump), Some(display));
    Fixture {
        host,
        dri2,
        log,
        fb_id,
    }
}

fn plain_fixture(device: BackendDevice, kind: BackendKind) -> (SoftScreen, Dri2) {
    let host = SoftScreen::new(XRES, YRES, 32, GFX).expect("screen");
    let backend = create_backend(kind, device).expect("backend");
    let opts = Dri2Options {
        hw_overlay: false,
        ..Dri2Options::default()
    };
    (host, Dri2::new(opts, backend, None))
}

fn window(host: &mut SoftScreen) -> SurfaceId {
    let w = host
        .create_window(ROOT_WINDOW, Rect::new(10, 20, 64, 32), 0)
        .expect("window");
    host.map_window(w);
    w
}

fn full(w: u32, h: u32) -> Region {
    Region::from_rect(Rect::new(0, 0, w, h))
}

fn back(dri2: &mut Dri2, host: &mut SoftScreen, w: SurfaceId) -> Dri2Buffer {
    dri2.create_buffer(host, w, Attachment::BackLeft, 0)
        .expect("back buffer")
}

fn publish(
    dri2: &mut Dri2,
    host: &mut SoftScreen,
    w: SurfaceId,
    b: &Dri2Buffer,
) -> PublishOutcome {
    let (width, height) = host
        .drawable(w)
        .map(|d| (d.width, d.height))
        .expect("drawable");
    dri2.copy_region(host, w, &full(width, height), b, b)
}

#[test]
fn new_reserves_framebuffer_ids_and_one_null_buffer() {
    let f = overlay_fixture(Dri2Options::default());
    assert!(f.dri2.overlay_available());
    assert_eq!(f.dri2.overlay().reserved.fb_secure_id, f.fb_id);
    assert!(f.dri2.overlay().reserved.null_secure_id.is_valid());
    assert_eq!(f.dri2.overlay().reserved.null_handles.len(), 1);
    assert_eq!(f.dri2.backend().stats().live, 1);
}

#[test]
fn new_without_display_reserves_two_null_buffers() {
    let (_host, dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    assert!(!dri2.overlay_available());
    assert_eq!(dri2.overlay().reserved.null_handles.len(), 2);
    assert_eq!(dri2.backend().stats().live, 2);
}

#[test]
fn undersized_wrapper_disables_overlay() {
    let host = SoftScreen::new(XRES, YRES, 32, GFX * 3).expect("screen");
    let mut ump = UmpBackend::open(BackendDevice::default()).expect("ump");
    let mut info = host.display_info();
    info.fb_secure_id = ump.wrap_external(host.framebuffer().clone());
    info.alt_fb_secure_id = ump.wrap_external(MappedMemory::zeroed(GFX));
    let (plane, _log) = RecordingPlane::new();
    let dri2 = Dri2::new(
        Dri2Options::default(),
        Box::new(ump),
        Some(Display::new(info, Box::new(plane))),
    );
    assert!(!dri2.overlay_available());
    assert!(!dri2.overlay().reserved.alt_fb_secure_id.is_valid());
}

#[test]
fn front_attachment_gets_dummy_buffer() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let b = f
        .dri2
        .create_buffer(&mut f.host, w, Attachment::FrontLeft, 7)
        .expect("front");
    assert_eq!(b.format, 8);
    assert_eq!(b.name, f.dri2.overlay().reserved.null_secure_id);
    assert_eq!(b.pitch, 256);
    assert_eq!(b.cpp, 4);
    assert!(!f.dri2.bos().get(b.bo).expect("record").is_mapped());
    assert_eq!(f.dri2.stats().dummy_buffers, 1);
    assert!(f.dri2.window_state(w).is_none());
}

#[test]
fn overlay_buffers_alternate_between_halves() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    let b2 = back(&mut f.dri2, &mut f.host, w);
    let b3 = back(&mut f.dri2, &mut f.host, w);

    assert_eq!(b1.name, f.fb_id);
    assert_eq!(b1.flags as usize, GFX);
    assert_eq!(b2.flags as usize, GFX + WIN_SIZE);
    assert_eq!(b3.flags as usize, GFX);
    assert_eq!(
        f.dri2.bos().get(b1.bo).and_then(|b| b.parity),
        Some(FrameParity::Odd)
    );
    assert_eq!(
        f.dri2.bos().get(b2.bo).and_then(|b| b.parity),
        Some(FrameParity::Even)
    );
    assert_eq!(f.dri2.overlay().owner, Some(w));
    assert_eq!(f.dri2.window_state(w).map(|ws| ws.queue.len()), Some(3));
    assert_eq!(f.dri2.bos().get(b1.bo).map(BoInfo::refcount), Some(2));
}

#[test]
fn second_window_does_not_get_the_overlay() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let other = f
        .host
        .create_window(ROOT_WINDOW, Rect::new(200, 100, 64, 32), 0)
        .expect("window");
    f.host.map_window(other);
    back(&mut f.dri2, &mut f.host, w);
    let b = back(&mut f.dri2, &mut f.host, other);
    assert_eq!(b.flags, 0);
    assert_ne!(b.name, f.fb_id);
    assert!(f.dri2.bos().get(b.bo).is_some_and(|bo| bo.handle.is_some()));
}

#[test]
fn copy_region_scans_out_through_the_overlay() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);

    let out = publish(&mut f.dri2, &mut f.host, w, &b1);
    assert_eq!(out, PublishOutcome::Overlay { bo: b1.bo });
    assert!(f.log.visible());
    assert_eq!(f.log.output(), Some(Rect::new(10, 20, 64, 32)));
    assert_eq!(
        f.log.source(),
        Some(PlaneSource {
            bpp: 32,
            offset: GFX,
            width: 64,
            height: 32,
            stride: 64,
        })
    );
    assert_eq!(f.log.count(|op| *op == PlaneOp::Vsync), 1);
    assert_eq!(f.dri2.overlay().dirty, Some(b1.bo));
    assert!(f.dri2.overlay().enabled);
    assert_eq!(f.dri2.stats().overlay_frames, 1);
    assert_eq!(f.host.blit_count(), 0);
}

#[test]
fn vsync_wait_can_be_turned_off() {
    let opts = Dri2Options {
        swapbuffers_wait: false,
        ..Dri2Options::default()
    };
    let mut f = overlay_fixture(opts);
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    publish(&mut f.dri2, &mut f.host, w, &b1);
    assert_eq!(f.log.count(|op| *op == PlaneOp::Vsync), 0);
}

#[test]
fn software_cursor_keeps_frames_blitted() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    f.dri2.map_buffer(&b1).expect("view").fill_u32(0xff00_ff00);

    let out = publish(&mut f.dri2, &mut f.host, w, &b1);
    assert_eq!(out, PublishOutcome::Blitted { bo: b1.bo });
    assert!(!f.log.visible());
    assert_eq!(f.host.screen_pixel(10, 20), Some(0xff00_ff00));
    assert_eq!(f.host.screen_pixel(73, 51), Some(0xff00_ff00));
    assert_eq!(f.host.screen_pixel(74, 51), Some(0));
    assert_eq!(f.dri2.overlay().dirty, None);
}

#[test]
fn swap_is_skipped_when_parity_matches() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    publish(&mut f.dri2, &mut f.host, w, &b1);
    // No new buffer: plain swap, nothing mapped on the front.
    assert_eq!(
        publish(&mut f.dri2, &mut f.host, w, &b1),
        PublishOutcome::Skipped
    );
    assert_eq!(f.dri2.window_state(w).map(|ws| ws.swap_count), Some(2));

    let b2 = back(&mut f.dri2, &mut f.host, w);
    let out = publish(&mut f.dri2, &mut f.host, w, &b2);
    assert_eq!(out, PublishOutcome::Blitted { bo: b2.bo });
    let ws = f.dri2.window_state(w).expect("state");
    assert_eq!(ws.swap_count, 2);
    assert_eq!(ws.front, Some(b2.bo));
    assert_eq!(ws.back, Some(b1.bo));
    assert_eq!(f.dri2.stats().skipped_swaps, 1);
}

/// Two frames through the overlay path, leaving `front = b2`, `back = b1` and content snapshots.
fn two_frames(f: &mut Fixture, w: SurfaceId) -> (Dri2Buffer, Dri2Buffer) {
    let b1 = back(&mut f.dri2, &mut f.host, w);
    publish(&mut f.dri2, &mut f.host, w, &b1);
    let b2 = back(&mut f.dri2, &mut f.host, w);
    publish(&mut f.dri2, &mut f.host, w, &b2);
    let ws = f.dri2.window_state(w).expect("state");
    assert_eq!((ws.front, ws.back), (Some(b2.bo), Some(b1.bo)));
    assert!(
        f.dri2
            .bos()
            .get(b1.bo)
            .is_some_and(|b| b.checksum.is_some())
    );
    (b1, b2)
}

#[test]
fn drawing_into_back_passes_the_order_check() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let (b1, b2) = two_frames(&mut f, w);

    f.dri2.map_buffer(&b1).expect("view").fill_u32(0x1122_3344);
    let out = publish(&mut f.dri2, &mut f.host, w, &b1);
    assert_eq!(out, PublishOutcome::Blitted { bo: b1.bo });

    let ws = f.dri2.window_state(w).expect("state");
    assert_eq!(ws.last_order_check, Some(OrderCheck::BackModified));
    assert_eq!((ws.front, ws.back), (Some(b1.bo), Some(b2.bo)));
    assert!(
        f.dri2
            .bos()
            .get(b1.bo)
            .is_some_and(|b| b.passed_order_check)
    );
    assert!(
        f.dri2
            .bos()
            .get(b2.bo)
            .is_some_and(|b| b.checksum.is_none())
    );
    assert_eq!(f.dri2.stats().order_corrections, 0);
}

#[test]
fn drawing_into_front_exchanges_the_slots() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let (b1, b2) = two_frames(&mut f, w);

    f.dri2.map_buffer(&b2).expect("view").fill_u32(0x1122_3344);
    let out = publish(&mut f.dri2, &mut f.host, w, &b2);
    assert_eq!(out, PublishOutcome::Blitted { bo: b2.bo });

    let ws = f.dri2.window_state(w).expect("state");
    assert_eq!(ws.last_order_check, Some(OrderCheck::FrontModified));
    assert_eq!((ws.front, ws.back), (Some(b2.bo), Some(b1.bo)));
    assert_eq!(ws.swap_count, 3);
    assert_eq!(f.dri2.stats().order_corrections, 1);
}

#[test]
fn untouched_buffers_are_inconclusive() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let (b1, _b2) = two_frames(&mut f, w);
    publish(&mut f.dri2, &mut f.host, w, &b1);
    let ws = f.dri2.window_state(w).expect("state");
    assert_eq!(ws.last_order_check, Some(OrderCheck::Inconclusive));
}

#[test]
fn full_queue_rejects_and_releases_the_queue_reference() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    let mut last = None;
    for _ in 0..=QUEUE_LEN {
        last = Some(back(&mut f.dri2, &mut f.host, w));
    }
    let last = last.expect("buffer");
    assert_eq!(f.dri2.stats().queue_overflows, 1);
    assert_eq!(
        f.dri2.window_state(w).map(|ws| ws.queue.len()),
        Some(QUEUE_LEN)
    );
    assert_eq!(f.dri2.bos().get(last.bo).map(BoInfo::refcount), Some(1));
}

const QUEUE_LEN: usize = crate::dri2::queue::QUEUE_CAPACITY;

#[test]
fn destroy_window_drops_pending_buffers_and_the_overlay() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    publish(&mut f.dri2, &mut f.host, w, &b1);
    let pending: Vec<Dri2Buffer> = (0..3).map(|_| back(&mut f.dri2, &mut f.host, w)).collect();

    f.dri2.destroy_window(&mut f.host, w);
    assert!(f.dri2.window_state(w).is_none());
    assert_eq!(f.dri2.overlay().owner, None);
    assert!(!f.dri2.overlay().enabled);
    assert_eq!(f.dri2.overlay().dirty, None);
    assert!(!f.log.visible());
    for b in &pending {
        assert_eq!(f.dri2.bos().get(b.bo).map(BoInfo::refcount), Some(1));
    }

    f.dri2.destroy_buffer(b1).expect("b1");
    for b in pending {
        f.dri2.destroy_buffer(b).expect("pending");
    }
    assert!(f.dri2.bos().is_empty());
}

#[test]
fn obscuring_window_flushes_then_hides_the_plane() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    f.dri2.map_buffer(&b1).expect("view").fill_u32(0xffaa_5500);
    publish(&mut f.dri2, &mut f.host, w, &b1);
    assert_eq!(f.host.screen_pixel(10, 20), Some(0));

    let top = f
        .host
        .create_window(ROOT_WINDOW, Rect::new(40, 30, 50, 50), 0)
        .expect("window");
    f.host.map_window(top);
    f.log.clear();
    f.dri2.update_overlay(&mut f.host);

    assert!(f.dri2.overlay().obscured);
    assert!(!f.dri2.overlay().enabled);
    assert_eq!(f.dri2.overlay().dirty, None);
    assert_eq!(f.log.ops(), vec![PlaneOp::Hide]);
    assert_eq!(f.host.screen_pixel(10, 20), Some(0xffaa_5500));
    assert_eq!(f.host.blit_count(), 1);
}

#[test]
fn moving_the_owner_moves_the_plane() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    publish(&mut f.dri2, &mut f.host, w, &b1);

    f.host.move_window(w, 100, 50);
    f.log.clear();
    f.dri2.update_overlay(&mut f.host);
    assert_eq!(
        f.log.ops(),
        vec![PlaneOp::Output(Rect::new(100, 50, 64, 32))]
    );
}

#[test]
fn readback_flushes_dirty_overlay_content() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    f.dri2.map_buffer(&b1).expect("view").fill_u32(0x0102_0304);
    publish(&mut f.dri2, &mut f.host, w, &b1);

    f.dri2.prepare_readback(&mut f.host);
    assert_eq!(f.dri2.overlay().dirty, None);
    assert_eq!(f.host.screen_pixel(12, 22), Some(0x0102_0304));
    assert!(f.dri2.overlay().enabled);
}

#[test]
fn flush_without_owner_still_clears_dirty_content() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    f.dri2.set_hw_cursor(&mut f.host, true);
    let b1 = back(&mut f.dri2, &mut f.host, w);
    assert!(matches!(
        publish(&mut f.dri2, &mut f.host, w, &b1),
        PublishOutcome::Overlay { .. }
    ));
    assert_eq!(f.dri2.overlay().dirty, Some(b1.bo));

    f.dri2.overlay.owner = None;
    f.log.clear();
    f.dri2.update_overlay(&mut f.host);

    assert_eq!(f.dri2.overlay().dirty, None);
    assert!(!f.dri2.overlay().enabled);
    assert_eq!(f.log.ops(), vec![PlaneOp::Hide]);
    assert_eq!(f.host.blit_count(), 0);
}

#[test]
fn window_buffer_is_reused_while_geometry_holds() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let w = window(&mut host);
    let b1 = back(&mut dri2, &mut host, w);
    let b2 = back(&mut dri2, &mut host, w);
    assert_eq!(b1.bo, b2.bo);
    assert_eq!(b1.name, b2.name);
    assert_eq!(b2.flags, 0);
    assert_eq!(dri2.stats().reused_buffers, 1);
    assert_eq!(dri2.bos().get(b1.bo).map(BoInfo::refcount), Some(3));

    host.resize_window(w, 32, 32);
    let b3 = back(&mut dri2, &mut host, w);
    assert_ne!(b3.bo, b1.bo);
    assert_eq!(dri2.bos().get(b1.bo).map(BoInfo::refcount), Some(2));
}

#[test]
fn backend_buffers_are_blitted_with_ownership_switches() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let w = window(&mut host);
    let b = back(&mut dri2, &mut host, w);
    dri2.map_buffer(&b).expect("view").fill_u32(0xdead_beef);
    let out = publish(&mut dri2, &mut host, w, &b);
    assert_eq!(out, PublishOutcome::Blitted { bo: b.bo });
    assert_eq!(host.screen_pixel(10, 20), Some(0xdead_beef));
    assert_eq!(dri2.stats().blits, 1);
}

#[test]
fn allocation_failure_yields_an_unmapped_buffer() {
    let device = BackendDevice {
        memory_limit: 8192,
        ..BackendDevice::default()
    };
    let (mut host, mut dri2) = plain_fixture(device, BackendKind::Ump);
    let w = window(&mut host);
    let b = back(&mut dri2, &mut host, w);
    assert_eq!(b.name, SecureId::INVALID);
    assert_eq!(dri2.stats().allocation_failures, 1);
    assert!(dri2.map_buffer(&b).is_none());
    assert_eq!(
        publish(&mut dri2, &mut host, w, &b),
        PublishOutcome::Skipped
    );
}

#[test]
fn resize_workaround_is_applied_twice() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let w = window(&mut host);
    let null = dri2.overlay().reserved.null_secure_id;

    let mut names = Vec::new();
    for width in [80, 96, 112] {
        back(&mut dri2, &mut host, w);
        host.resize_window(w, width, 32);
        names.push(back(&mut dri2, &mut host, w).name);
    }
    assert_eq!(names[0], null);
    assert_eq!(names[1], null);
    assert_ne!(names[2], null);
    assert_eq!(dri2.stats().resize_workarounds, 2);
    assert_eq!(dri2.overlay().resize_workarounds, 2);
}

#[test]
fn resize_workaround_on_the_overlay_uses_the_alternative_name() {
    let mut f = overlay_fixture(Dri2Options::default());
    let w = window(&mut f.host);
    back(&mut f.dri2, &mut f.host, w);
    f.host.resize_window(w, 80, 32);
    let b = back(&mut f.dri2, &mut f.host, w);
    assert_eq!(b.name, f.dri2.overlay().reserved.alt_fb_secure_id);
    assert_ne!(b.name, f.fb_id);
}

#[test]
fn flippable_windows_get_the_fb_flag_on_dumb_buffers() {
    let host = SoftScreen::new(XRES, YRES, 32, GFX).expect("screen");
    let backend = create_backend(BackendKind::Dumb, BackendDevice::default()).expect("dumb");
    let opts = Dri2Options {
        hw_overlay: false,
        use_dumb: true,
        flip: true,
        ..Dri2Options::default()
    };
    let mut dri2 = Dri2::new(opts, backend, None);
    let mut host = host;
    host.set_flip_capable(true);
    let w = window(&mut host);
    let b = back(&mut dri2, &mut host, w);
    assert!(b.can_flip());
    assert_eq!(b.flags & BUFFER_FLAG_REUSED, 0);
}

#[test]
fn ump_buffers_fall_back_to_blitting() {
    let host = SoftScreen::new(XRES, YRES, 32, GFX).expect("screen");
    let backend = create_backend(BackendKind::Ump, BackendDevice::default()).expect("ump");
    let opts = Dri2Options {
        hw_overlay: false,
        flip: true,
        ..Dri2Options::default()
    };
    let mut dri2 = Dri2::new(opts, backend, None);
    let mut host = host;
    host.set_flip_capable(true);
    let w = window(&mut host);
    let b = back(&mut dri2, &mut host, w);
    assert!(!b.can_flip());
}

#[test]
fn pixmap_is_migrated_and_restored() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let pix = host.create_pixmap(10, 4, 32);
    let original = host.pixmap_storage(pix).expect("storage");
    let src = original.memory.clone().expect("memory");
    src.write(original.pitch as usize + 4, &0xcafe_f00du32.to_le_bytes());

    let b = dri2
        .create_buffer(&mut host, pix, Attachment::FrontLeft, 0)
        .expect("pixmap buffer");
    assert_eq!(b.pitch, 64);
    assert_eq!(b.cpp, 4);
    assert_eq!(b.format, 0);
    assert!(b.name.is_valid());

    let id = dri2.pixmap_bo(pix).expect("migrated");
    assert_eq!(id, b.bo);
    let moved = host.pixmap_storage(pix).expect("storage");
    assert_eq!(moved.pitch, 64);
    let view = dri2.map_buffer(&b).expect("view");
    assert!(
        moved
            .memory
            .as_ref()
            .is_some_and(|m| m.same_memory(&view.memory))
    );
    assert_eq!(view.read_u32(64 + 4), Some(0xcafe_f00d));
    assert_eq!(dri2.bos().get(id).map(BoInfo::refcount), Some(2));

    let again = dri2
        .create_buffer(&mut host, pix, Attachment::FrontLeft, 0)
        .expect("pixmap buffer");
    assert_eq!(again.bo, b.bo);
    assert_eq!(dri2.stats().migrated_pixmaps, 1);

    dri2.destroy_pixmap(&mut host, pix);
    let restored = host.pixmap_storage(pix).expect("storage");
    assert!(
        restored
            .memory
            .as_ref()
            .is_some_and(|m| m.same_memory(&src))
    );
    assert_eq!(restored.pitch, original.pitch);
    assert!(dri2.pixmap_bo(pix).is_none());

    dri2.destroy_buffer(b).expect("first");
    dri2.destroy_buffer(again).expect("second");
    assert!(dri2.bos().is_empty());
}

#[test]
fn remigration_keeps_the_original_pixmap_storage() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let pix = host.create_pixmap(10, 4, 32);
    let original = host.pixmap_storage(pix).expect("storage");
    let src = original.memory.clone().expect("memory");

    let first = dri2
        .create_buffer(&mut host, pix, Attachment::FrontLeft, 0)
        .expect("pixmap buffer");
    let dead = dri2
        .bos()
        .get(first.bo)
        .and_then(|b| b.handle)
        .expect("handle");
    dri2.backend.release(dead);
    assert!(!dri2.backend().valid(dead));

    let second = dri2
        .create_buffer(&mut host, pix, Attachment::FrontLeft, 0)
        .expect("pixmap buffer");
    assert_eq!(second.bo, first.bo);
    assert_eq!(dri2.stats().migrated_pixmaps, 2);
    let fresh = dri2.bos().get(second.bo).and_then(|b| b.handle);
    assert!(fresh.is_some_and(|h| h != dead && dri2.backend().valid(h)));

    dri2.destroy_pixmap(&mut host, pix);
    let restored = host.pixmap_storage(pix).expect("storage");
    assert!(
        restored
            .memory
            .as_ref()
            .is_some_and(|m| m.same_memory(&src))
    );
    assert_eq!(restored.pitch, original.pitch);
    assert_eq!(restored.offset, original.offset);
}

#[test]
fn exa_front_buffer_uses_the_window_pixmap() {
    let (mut host, _) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let opts = Dri2Options {
        hw_overlay: false,
        use_exa: true,
        ..Dri2Options::default()
    };
    let backend = create_backend(BackendKind::Ump, BackendDevice::default()).expect("ump");
    let mut dri2 = Dri2::new(opts, backend, None);
    let w = window(&mut host);
    let b = dri2
        .create_buffer(&mut host, w, Attachment::FrontLeft, 0)
        .expect("front");
    assert_eq!(dri2.pixmap_bo(crate::host::soft::SCREEN_PIXMAP), Some(b.bo));
    assert_eq!(b.pitch, XRES * 4);
}

#[test]
fn destroying_a_buffer_twice_is_reported() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let w = window(&mut host);
    let b = dri2
        .create_buffer(&mut host, w, Attachment::FrontLeft, 0)
        .expect("front");
    dri2.destroy_buffer(b.clone()).expect("first");
    assert!(dri2.destroy_buffer(b).is_err());
    assert_eq!(dri2.bos().stats().double_release, 1);
}

#[test]
fn unknown_drawable_is_a_protocol_error() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let err = dri2
        .create_buffer(&mut host, SurfaceId(999), Attachment::BackLeft, 0)
        .unwrap_err();
    assert!(matches!(err, Dri2Error::Protocol(_)));
}

#[test]
fn close_releases_every_backend_allocation() {
    let (mut host, mut dri2) = plain_fixture(BackendDevice::default(), BackendKind::Ump);
    let w = window(&mut host);
    let b = back(&mut dri2, &mut host, w);
    let pix = host.create_pixmap(8, 8, 32);
    let p = dri2
        .create_buffer(&mut host, pix, Attachment::FrontLeft, 0)
        .expect("pixmap");
    dri2.destroy_buffer(b).expect("b");
    dri2.destroy_buffer(p).expect("p");
    assert!(dri2.backend().stats().live > 0);

    let backend = dri2.close(&mut host);
    assert_eq!(backend.stats().live, 0);
    assert!(host.pixmap_storage(pix).is_some_and(|s| s.pitch == 32));
}
