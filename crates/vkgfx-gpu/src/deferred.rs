//! Deferred destruction for resources that may still be referenced by
//! frames in flight.
//!
//! An item queued during frame `n` is handed back once the caller reaches
//! frame `n + frames_in_flight`. At that point every submission that could
//! have referenced it has been waited on.

use std::collections::VecDeque;

struct Pending<T> {
    item: T,
    frame_queued: u64,
}

/// FIFO of retired items tagged with the frame they were retired on.
pub struct DeferredDeletionQueue<T> {
    pending: VecDeque<Pending<T>>,
    frames_in_flight: u64,
}

impl<T> DeferredDeletionQueue<T> {
    /// Create a queue that holds items for `frames_in_flight` frames.
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            frames_in_flight: frames_in_flight as u64,
        }
    }

    /// Queue `item`, retired during `frame_number`.
    ///
    /// Frame numbers must be non-decreasing across calls.
    pub fn queue(&mut self, item: T, frame_number: u64) {
        debug_assert!(
            self.pending
                .back()
                .map_or(true, |last| last.frame_queued <= frame_number),
            "frame numbers must not go backwards"
        );
        self.pending.push_back(Pending {
            item,
            frame_queued: frame_number,
        });
    }

    /// Remove and return every item that is safe to destroy at
    /// `current_frame`.
    pub fn drain_ready(&mut self, current_frame: u64) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(front) = self.pending.front() {
            if front.frame_queued + self.frames_in_flight > current_frame {
                break;
            }
            if let Some(pending) = self.pending.pop_front() {
                ready.push(pending.item);
            }
        }
        ready
    }

    /// Remove and return every pending item regardless of age.
    ///
    /// Only valid once the device is idle.
    pub fn drain_all(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|pending| pending.item).collect()
    }

    /// Number of items waiting.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_are_held_for_frames_in_flight() {
        let mut queue = DeferredDeletionQueue::new(3);
        queue.queue("a", 10);

        assert!(queue.drain_ready(10).is_empty());
        assert!(queue.drain_ready(12).is_empty());
        assert_eq!(queue.drain_ready(13), vec!["a"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn only_mature_items_are_released() {
        let mut queue = DeferredDeletionQueue::new(3);
        queue.queue(1, 0);
        queue.queue(2, 1);
        queue.queue(3, 1);
        queue.queue(4, 5);

        assert_eq!(queue.drain_ready(4), vec![1, 2, 3]);
        assert_eq!(queue.pending_count(), 1);
        assert!(queue.drain_ready(7).is_empty());
        assert_eq!(queue.drain_ready(8), vec![4]);
    }

    #[test]
    fn drain_all_ignores_age() {
        let mut queue = DeferredDeletionQueue::new(3);
        queue.queue('x', 100);
        queue.queue('y', 101);

        assert_eq!(queue.drain_all(), vec!['x', 'y']);
        assert_eq!(queue.pending_count(), 0);
    }
}
