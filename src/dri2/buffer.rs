use crate::bo::SecureId;
use crate::bo::info::BoId;

/// The page-flip bit of [`Dri2Buffer::flags`] on backend-allocated buffers.
pub const BUFFER_FLAG_FB: u32 = 0x02;
/// The "reused" bit of [`Dri2Buffer::flags`]; always cleared.
pub const BUFFER_FLAG_REUSED: u32 = 0x04;

/// Buffer attachment point requested by a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attachment {
    /// Visible left buffer.
    FrontLeft,
    /// Rendering target for the next frame.
    BackLeft,
    /// Visible right buffer (stereo).
    FrontRight,
    /// Back right buffer (stereo).
    BackRight,
    /// Combined depth/stencil.
    DepthStencil,
    /// Client-side copy of the front buffer.
    FakeFrontLeft,
    /// Any other protocol value.
    Other(u32),
}

impl Attachment {
    /// Decode a protocol attachment number.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::FrontLeft,
            1 => Self::BackLeft,
            2 => Self::FrontRight,
            3 => Self::BackRight,
            9 => Self::DepthStencil,
            7 => Self::FakeFrontLeft,
            other => Self::Other(other),
        }
    }
}

/// A buffer as handed to a rendering client.
///
/// Owns one reference to `bo`, dropped by [`crate::Dri2::destroy_buffer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dri2Buffer {
    /// Attachment it was created for.
    pub attachment: Attachment,
    /// Pixel format as seen by the client (window buffers get `requested + 1`).
    pub format: u32,
    /// Secure id the client maps.
    pub name: SecureId,
    /// Bytes per row.
    pub pitch: u32,
    /// Bytes per pixel.
    pub cpp: u32,
    /// Byte offset inside `name` on the overlay path; flip bits otherwise.
    pub flags: u32,
    /// Backing record.
    pub bo: BoId,
}

impl Dri2Buffer {
    /// `true` when a scanout framebuffer was registered for page flipping.
    pub fn can_flip(&self) -> bool {
        self.flags & BUFFER_FLAG_FB != 0
    }
}

/// What [`crate::Dri2::copy_region`] did with the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Nothing to show: pixmap, unknown window or no mapped buffer.
    Skipped,
    /// The buffer was copied into the window.
    Blitted {
        /// The buffer shown.
        bo: BoId,
    },
    /// The buffer is scanned out by the overlay plane.
    Overlay {
        /// The buffer shown.
        bo: BoId,
    },
}
