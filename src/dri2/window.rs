use crate::bo::info::BoId;
use crate::dri2::queue::DeliveryQueue;
use crate::foundation::core::SurfaceId;

/// Result of comparing front/back content snapshots while swapping two already-known buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderCheck {
    /// Only the back buffer was redrawn; both buffers are marked as passed.
    BackModified,
    /// The front buffer was redrawn, so the client renders into the wrong one; slots are
    /// exchanged.
    FrontModified,
    /// No snapshot changed (or none existed).
    Inconclusive,
}

/// Delivery bookkeeping for one window that requested back buffers.
///
/// `mem`, `front` and `back` each own one reference to the buffer they name; so does every queue
/// entry.
#[derive(Debug)]
pub struct WindowState {
    /// Window this state belongs to.
    pub surface: SurfaceId,
    /// Width recorded at the last odd request.
    pub width: u32,
    /// Height recorded at the last odd request.
    pub height: u32,
    /// Back-buffer requests so far.
    pub request_count: u64,
    /// Front/back swaps so far.
    pub swap_count: u64,
    /// Backend allocation reused across requests on the non-overlay path.
    pub mem: Option<BoId>,
    /// Buffer currently on screen.
    pub front: Option<BoId>,
    /// Buffer the client is expected to render next.
    pub back: Option<BoId>,
    /// Carved-out buffers handed out but not yet published.
    pub queue: DeliveryQueue,
    /// Verdict of the most recent order check.
    pub last_order_check: Option<OrderCheck>,
}

impl WindowState {
    /// Fresh state for `surface`.
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            width: 0,
            height: 0,
            request_count: 0,
            swap_count: 0,
            mem: None,
            front: None,
            back: None,
            queue: DeliveryQueue::new(),
            last_order_check: None,
        }
    }

    /// Count a back-buffer request of a `width`x`height` window.
    ///
    /// Odd requests record the size; returns `true` when this is an even request and the size
    /// changed since the odd one (the client is about to receive mismatched buffers).
    pub fn record_request(&mut self, width: u32, height: u32) -> bool {
        self.request_count += 1;
        if self.request_count & 1 == 1 {
            self.width = width;
            self.height = height;
            return false;
        }
        width != self.width || height != self.height
    }

    /// `true` on odd requests.
    pub fn is_odd_request(&self) -> bool {
        self.request_count & 1 == 1
    }

    /// Exchange front and back and count the swap.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
        self.swap_count += 1;
    }

    /// Take every reference this state owns: slots first, then pending queue entries.
    pub fn take_all(&mut self) -> Vec<BoId> {
        let mut out: Vec<BoId> = [self.mem.take(), self.back.take(), self.front.take()]
            .into_iter()
            .flatten()
            .collect();
        out.extend(self.queue.drain());
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dri2/window.rs"]
mod tests;
