//! Double-buffered message queues.
//!
//! Effects committed during tick T go to the back buffer. At the start of
//! tick T+1 the buffers rotate exactly once: the back buffer becomes the
//! front (read by T+1's Perception) and the old front is dropped. Nothing is
//! cleared between a write and the Perception that reads it.

/// A write buffer for the current tick and a read buffer for the previous one.
#[derive(Debug, Clone)]
pub struct DoubleBuffer<T> {
    front: Vec<T>,
    back: Vec<T>,
}

impl<T> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self {
            front: Vec::new(),
            back: Vec::new(),
        }
    }
}

impl<T> DoubleBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an item for the next window.
    pub fn push(&mut self, item: T) {
        self.back.push(item);
    }

    /// Items visible in the current window.
    pub fn front(&self) -> &[T] {
        &self.front
    }

    /// Items queued for the next window.
    pub fn pending(&self) -> &[T] {
        &self.back
    }

    /// Rotate at a tick boundary. Returns how many expired items were dropped.
    pub fn rotate(&mut self) -> usize {
        let expired = self.front.len();
        self.front = std::mem::take(&mut self.back);
        expired
    }
}
