use crate::bo::SecureId;
use crate::bo::memory::MappedMemory;
use crate::foundation::core::Rect;

/// Pixel source of the overlay plane: an RGB buffer inside the framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneSource {
    /// Bits per pixel.
    pub bpp: u32,
    /// Byte offset of the first pixel in the framebuffer.
    pub offset: usize,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row length in pixels.
    pub stride: u32,
}

/// Hardware overlay plane of the display controller.
pub trait OverlayPlane {
    /// Make the plane visible.
    fn show(&mut self);

    /// Hide the plane.
    fn hide(&mut self);

    /// Place the plane on screen.
    fn set_output_window(&mut self, rect: Rect);

    /// Point the plane at new pixels.
    fn set_rgb_input_buffer(&mut self, source: &PlaneSource);

    /// Block until the next vertical blank.
    fn wait_for_vsync(&mut self);
}

/// Static description of the display the overlay lives on.
#[derive(Clone, Debug)]
pub struct DisplayInfo {
    /// The whole framebuffer mapping, primary layer first.
    pub framebuffer: MappedMemory,
    /// Framebuffer size in bytes.
    pub framebuffer_size: usize,
    /// Bytes used by the primary graphics layer; everything after it is offscreen.
    pub gfx_layer_size: usize,
    /// Horizontal resolution.
    pub xres: u32,
    /// Vertical resolution.
    pub yres: u32,
    /// Name of the framebuffer wrapper, if the backend can wrap it.
    pub fb_secure_id: SecureId,
    /// Name of the alternative framebuffer wrapper.
    pub alt_fb_secure_id: SecureId,
}

impl DisplayInfo {
    /// Bytes available after the primary layer.
    pub fn offscreen_size(&self) -> usize {
        self.framebuffer_size.saturating_sub(self.gfx_layer_size)
    }
}

/// A display with one overlay plane.
pub struct Display {
    /// Layout and names of the framebuffer.
    pub info: DisplayInfo,
    /// The overlay plane.
    pub plane: Box<dyn OverlayPlane>,
}

impl Display {
    /// Pair a display description with its plane.
    pub fn new(info: DisplayInfo, plane: Box<dyn OverlayPlane>) -> Self {
        Self { info, plane }
    }
}
