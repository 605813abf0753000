use crate::bo::info::BoId;

/// Maximum number of buffers handed out but not yet published.
pub const QUEUE_CAPACITY: usize = 16;

/// Bounded FIFO of carved-out buffers waiting to be shown, in request order.
///
/// Each entry owns one reference to its buffer. A full queue rejects new entries instead of
/// overwriting old ones.
#[derive(Clone, Debug, Default)]
pub struct DeliveryQueue {
    slots: [Option<BoId>; QUEUE_CAPACITY],
    head: usize,
    len: usize,
}

impl DeliveryQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bo`. When the queue is full nothing is stored and `bo` is handed back.
    pub fn enqueue(&mut self, bo: BoId) -> Result<(), BoId> {
        if self.len == QUEUE_CAPACITY {
            tracing::error!(bo = bo.0, "buffer queue overflow");
            return Err(bo);
        }
        let tail = (self.head + self.len) % QUEUE_CAPACITY;
        self.slots[tail] = Some(bo);
        self.len += 1;
        Ok(())
    }

    /// Oldest pending buffer.
    pub fn dequeue(&mut self) -> Option<BoId> {
        if self.len == 0 {
            return None;
        }
        let bo = self.slots[self.head].take();
        self.head = (self.head + 1) % QUEUE_CAPACITY;
        self.len -= 1;
        bo
    }

    /// Pending entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove every pending entry, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = BoId> + '_ {
        std::iter::from_fn(move || self.dequeue())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/dri2/queue.rs"]
mod tests;
