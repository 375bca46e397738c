//! Single-slot frame hand-off between the camera and the broadcast loop
//!
//! The camera thread overwrites the slot on every frame; readers block until
//! a frame newer than the last one they saw arrives. Older frames that were
//! overwritten before a reader woke up are simply lost (most-recent-wins).
//!
//! ```text
//! camera thread ──publish()──▶ [ frame | generation | active ] ──wait_next()──▶ broadcast loop
//!                                        │
//!                                  notify_all()
//! ```
//!
//! The `active` flag mirrors the streaming state. Deactivating the buffer
//! wakes every waiter and makes `wait_next()` return `None`, so no reader is left
//! blocked after streaming stops or the server shuts down.

use crate::core::types::Frame;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    /// Incremented on every publish; 0 means nothing published yet
    generation: u64,
    active: bool,
}

/// Latest-value-wins frame cell with wake-all semantics
#[derive(Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
    published: Condvar,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame` as the latest one and wake all readers. Never blocks on readers.
    pub fn publish(&self, frame: Frame) {
        {
            let mut slot = self.slot.lock();
            slot.frame = Some(frame);
            slot.generation += 1;
        }
        self.published.notify_all();
    }

    /// Mark the stream active
    ///
    /// Drops any frame left over from a previous session so a restarted
    /// stream never replays a stale image.
    pub fn activate(&self) {
        let mut slot = self.slot.lock();
        slot.frame = None;
        slot.active = true;
    }

    /// Mark the stream stopped and release every blocked reader
    pub fn deactivate(&self) {
        {
            let mut slot = self.slot.lock();
            slot.active = false;
        }
        self.published.notify_all();
    }

    pub fn is_active(&self) -> bool {
        self.slot.lock().active
    }

    /// Create a reader that has not observed any frame yet
    pub fn reader(&self) -> FrameReader<'_> {
        FrameReader {
            buffer: self,
            seen: 0,
        }
    }
}

/// Per-consumer cursor into a [`FrameBuffer`]
pub struct FrameReader<'a> {
    buffer: &'a FrameBuffer,
    seen: u64,
}

impl FrameReader<'_> {
    /// Block until a frame newer than the last one returned is available
    ///
    /// Returns `None` as soon as the stream is (or becomes) inactive.
    pub fn wait_next(&mut self) -> Option<Frame> {
        let buffer = self.buffer;
        let mut slot = buffer.slot.lock();
        loop {
            if !slot.active {
                return None;
            }
            if let Some(frame) = self.take_newer(&slot) {
                return Some(frame);
            }
            buffer.published.wait(&mut slot);
        }
    }

    /// Like [`wait_next`](Self::wait_next) but gives up after `timeout`
    pub fn wait_next_timeout(&mut self, timeout: Duration) -> Option<Frame> {
        let buffer = self.buffer;
        let mut slot = buffer.slot.lock();
        loop {
            if !slot.active {
                return None;
            }
            if let Some(frame) = self.take_newer(&slot) {
                return Some(frame);
            }
            if buffer.published.wait_for(&mut slot, timeout).timed_out() {
                return if slot.active {
                    self.take_newer(&slot)
                } else {
                    None
                };
            }
        }
    }

    fn take_newer(&mut self, slot: &Slot) -> Option<Frame> {
        if slot.generation <= self.seen {
            return None;
        }
        let frame = slot.frame.clone()?;
        self.seen = slot.generation;
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    fn frame(tag: u8) -> Frame {
        Frame::from(vec![0xFF, 0xD8, tag, 0xFF, 0xD9])
    }

    #[test]
    fn test_inactive_returns_none_immediately() {
        let buffer = FrameBuffer::new();
        buffer.publish(frame(1));
        assert!(buffer.reader().wait_next().is_none());
    }

    #[test]
    fn test_returns_published_frame_once() {
        let buffer = FrameBuffer::new();
        buffer.activate();
        buffer.publish(frame(1));

        let mut reader = buffer.reader();
        assert_eq!(reader.wait_next(), Some(frame(1)));
        assert_eq!(reader.seen, 1);
        // Same frame is not delivered twice
        assert_eq!(reader.wait_next_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn test_most_recent_wins() {
        let buffer = Arc::new(FrameBuffer::new());
        buffer.activate();

        let (ready_tx, ready_rx) = mpsc::channel();
        let reader_buffer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            let mut reader = reader_buffer.reader();
            ready_tx.send(()).unwrap();
            let mut received = Vec::new();
            while let Some(f) = reader.wait_next() {
                received.push(f);
                if received.last() == Some(&frame(2)) {
                    break;
                }
            }
            received
        });

        ready_rx.recv().unwrap();
        buffer.publish(frame(1));
        buffer.publish(frame(2));

        let received = handle.join().unwrap();
        assert_eq!(received.last(), Some(&frame(2)));
        // Never goes backwards: F1 may be skipped but never follows F2
        assert!(received.len() <= 2);
        if received.len() == 2 {
            assert_eq!(received[0], frame(1));
        }
    }

    #[test]
    fn test_all_waiters_are_woken() {
        let buffer = Arc::new(FrameBuffer::new());
        buffer.activate();

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let b = Arc::clone(&buffer);
                thread::spawn(move || b.reader().wait_next())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        buffer.publish(frame(7));

        for h in handles {
            assert_eq!(h.join().unwrap(), Some(frame(7)));
        }
    }

    #[test]
    fn test_deactivate_releases_blocked_reader() {
        let buffer = Arc::new(FrameBuffer::new());
        buffer.activate();

        let b = Arc::clone(&buffer);
        let handle = thread::spawn(move || b.reader().wait_next());

        thread::sleep(Duration::from_millis(50));
        buffer.deactivate();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn test_activate_discards_stale_frame() {
        let buffer = FrameBuffer::new();
        buffer.activate();
        buffer.publish(frame(1));
        buffer.deactivate();

        buffer.activate();
        {
            let slot = buffer.slot.lock();
            assert!(slot.frame.is_none());
            assert_eq!(slot.generation, 1);
        }
        assert_eq!(buffer.reader().wait_next_timeout(Duration::from_millis(20)), None);

        buffer.publish(frame(2));
        assert_eq!(buffer.reader().wait_next(), Some(frame(2)));
    }
}
