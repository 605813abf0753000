use super::*;

fn screen() -> SoftScreen {
    SoftScreen::new(64, 48, 32, 64 * 48 * 4 * 3).unwrap()
}

#[test]
fn rejects_undersized_framebuffer_and_odd_depths() {
    assert!(SoftScreen::new(64, 48, 32, 100).is_err());
    assert!(SoftScreen::new(64, 48, 24, 64 * 48 * 4).is_err());
}

#[test]
fn display_info_describes_the_framebuffer() {
    let s = screen();
    let info = s.display_info();
    assert_eq!(info.gfx_layer_size, 64 * 48 * 4);
    assert_eq!(info.framebuffer_size, 64 * 48 * 4 * 3);
    assert_eq!(info.offscreen_size(), 64 * 48 * 4 * 2);
    assert!(info.framebuffer.same_memory(s.framebuffer()));
    assert!(!info.fb_secure_id.is_valid());
}

#[test]
fn new_windows_stack_on_top() {
    let mut s = screen();
    let a = s
        .create_window(ROOT_WINDOW, Rect::new(0, 0, 10, 10), 0)
        .unwrap();
    let b = s
        .create_window(ROOT_WINDOW, Rect::new(0, 0, 10, 10), 0)
        .unwrap();
    assert_eq!(s.last_child(ROOT_WINDOW), Some(a));
    assert_eq!(s.prev_sibling(a), Some(b));
    assert_eq!(s.prev_sibling(b), None);

    s.raise_window(a);
    assert_eq!(s.last_child(ROOT_WINDOW), Some(b));
    assert_eq!(s.prev_sibling(b), Some(a));
}

#[test]
fn realized_needs_mapped_ancestors() {
    let mut s = screen();
    let parent = s
        .create_window(ROOT_WINDOW, Rect::new(5, 5, 30, 30), 0)
        .unwrap();
    let child = s.create_window(parent, Rect::new(2, 3, 10, 10), 0).unwrap();
    s.map_window(child);
    let attrs = s.window_attrs(child).unwrap();
    assert!(attrs.mapped && !attrs.realized);
    assert_eq!(attrs.rect, Rect::new(7, 8, 10, 10));

    s.map_window(parent);
    assert!(s.window_attrs(child).unwrap().realized);
}

#[test]
fn copy_area_lands_at_window_origin() {
    let mut s = screen();
    let w = s
        .create_window(ROOT_WINDOW, Rect::new(10, 4, 8, 8), 0)
        .unwrap();
    s.map_window(w);

    let src = MappedMemory::zeroed(8 * 8 * 4);
    src.fill(0..src.len(), 0x11);
    let blit = BlitSource {
        memory: &src,
        offset: 0,
        pitch: 32,
        width: 8,
        height: 8,
        bpp: 32,
    };
    s.copy_area(w, &Region::from_rect(Rect::new(0, 0, 8, 8)), &blit);

    assert_eq!(s.screen_pixel(10, 4), Some(0x1111_1111));
    assert_eq!(s.screen_pixel(17, 11), Some(0x1111_1111));
    assert_eq!(s.screen_pixel(18, 4), Some(0));
    assert_eq!(s.screen_pixel(9, 4), Some(0));
    assert_eq!(s.blit_count(), 1);
}

#[test]
fn copy_area_clips_to_screen_and_region() {
    let mut s = screen();
    let w = s
        .create_window(ROOT_WINDOW, Rect::new(60, 44, 8, 8), 0)
        .unwrap();
    let src = MappedMemory::zeroed(8 * 8 * 4);
    src.fill(0..src.len(), 0x22);
    let blit = BlitSource {
        memory: &src,
        offset: 0,
        pitch: 32,
        width: 8,
        height: 8,
        bpp: 32,
    };
    s.copy_area(w, &Region::from_rect(Rect::new(0, 0, 2, 8)), &blit);
    assert_eq!(s.screen_pixel(61, 47), Some(0x2222_2222));
    assert_eq!(s.screen_pixel(62, 44), Some(0));
    assert_eq!(s.framebuffer().byte_at(64 * 48 * 4), Some(0));
}

#[test]
fn get_image_reads_back_window_pixels() {
    let mut s = screen();
    let w = s
        .create_window(ROOT_WINDOW, Rect::new(1, 1, 4, 4), 0)
        .unwrap();
    s.framebuffer().write((64 + 1) * 4, &[1, 2, 3, 4]);
    let img = s.get_image(&ImageRequest {
        drawable: w,
        rect: Rect::new(0, 0, 2, 1),
    });
    assert_eq!(img, vec![1, 2, 3, 4, 0, 0, 0, 0]);
}

#[test]
fn pixmaps_have_their_own_storage() {
    let mut s = screen();
    let p = s.create_pixmap(5, 3, 32);
    let st = s.pixmap_storage(p).unwrap();
    assert_eq!(st.pitch, 20);
    assert_eq!(st.memory.as_ref().map(MappedMemory::len), Some(60));
    assert_eq!(s.drawable_pixmap(p), Some(p));
    assert_eq!(s.drawable(p).unwrap().kind, DrawableKind::Pixmap);

    assert!(s.destroy_pixmap(p));
    assert!(!s.exists(p));
    assert!(!s.destroy_pixmap(SCREEN_PIXMAP));
}

#[test]
fn destroying_a_window_removes_its_subtree() {
    let mut s = screen();
    let a = s
        .create_window(ROOT_WINDOW, Rect::new(0, 0, 10, 10), 0)
        .unwrap();
    let child = s.create_window(a, Rect::new(0, 0, 5, 5), 0).unwrap();
    assert_eq!(s.drawable_pixmap(a), Some(SCREEN_PIXMAP));
    assert!(s.destroy_window(a));
    assert!(!s.exists(a) && !s.exists(child));
    assert_eq!(s.last_child(ROOT_WINDOW), None);
    assert!(!s.destroy_window(ROOT_WINDOW));
}
