//! Single-slot mailbox for the latest detection set.
//!
//! The tracking stage overwrites the slot after every inference and an
//! independent reader empties it. Only the newest set is kept; the lock is
//! held for the swap and nothing else.

use crate::detection::Detection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Latest-value slot shared by one writer and one reader
#[derive(Debug, Default)]
pub struct DetectionMailbox {
    slot: Mutex<Option<Vec<Detection>>>,
    posted: AtomicU64,
    overwritten: AtomicU64,
}

impl DetectionMailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a detection set, discarding any unread one
    pub fn post(&self, detections: Vec<Detection>) {
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(detections);
        // The old set is dropped after the guard is released
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.posted.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the pending set, leaving the slot empty
    pub fn take(&self) -> Option<Vec<Detection>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Sets written so far
    #[must_use]
    pub fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    /// Sets replaced before anyone read them
    #[must_use]
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::BoundingBox;

    fn set(left: i32) -> Vec<Detection> {
        vec![Detection::new(BoundingBox::new(left, 0, left + 10, 10), 0.9)]
    }

    #[test]
    fn test_take_consumes() {
        let mailbox = DetectionMailbox::new();
        assert!(mailbox.take().is_none());

        mailbox.post(set(1));
        assert_eq!(mailbox.take().unwrap()[0].bbox.left, 1);
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_latest_value_wins() {
        let mailbox = DetectionMailbox::new();
        mailbox.post(set(1));
        mailbox.post(set(2));
        mailbox.post(set(3));

        assert_eq!(mailbox.take().unwrap()[0].bbox.left, 3);
        assert_eq!(mailbox.posted(), 3);
        assert_eq!(mailbox.overwritten(), 2);
    }

    #[test]
    fn test_empty_set_is_still_a_value() {
        let mailbox = DetectionMailbox::new();
        mailbox.post(Vec::new());
        assert_eq!(mailbox.take(), Some(Vec::new()));
    }
}
