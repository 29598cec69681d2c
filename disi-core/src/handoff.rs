//! # Handoff Channel Module
//!
//! Bounded, drop-oldest channel between the real-time audio thread and the
//! presentation thread. Neither side ever blocks: when the queue is full the
//! producer evicts the oldest unread value, so the consumer always catches up
//! to the freshest one.

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Creates a handoff channel holding at most `capacity` unread values.
pub fn handoff_channel<T>(capacity: usize) -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let sender = HandoffSender {
        tx,
        evict: rx.clone(),
    };
    (sender, HandoffReceiver { rx })
}

/// Producer side. Cheap to clone; each playback stream gets its own clone.
#[derive(Debug)]
pub struct HandoffSender<T> {
    tx: Sender<T>,
    // The producer's own view of the queue, used only to pop the oldest value.
    evict: Receiver<T>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Enqueues `value` without blocking.
    ///
    /// Returns the number of older values evicted to make room.
    pub fn publish(&self, value: T) -> usize {
        let mut value = value;
        let mut evicted = 0;
        loop {
            match self.tx.try_send(value) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(rejected)) => {
                    if self.evict.try_recv().is_ok() {
                        evicted += 1;
                    }
                    value = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }

    /// Discards everything still queued, e.g. spectra from a previous file.
    pub fn clear(&self) {
        while self.evict.try_recv().is_ok() {}
    }
}

/// Consumer side, polled from the presentation thread.
#[derive(Debug, Clone)]
pub struct HandoffReceiver<T> {
    rx: Receiver<T>,
}

impl<T> HandoffReceiver<T> {
    /// Drains the queue and returns only the newest value, if any.
    pub fn try_latest(&self) -> Option<T> {
        let mut latest = None;
        while let Ok(value) = self.rx.try_recv() {
            latest = Some(value);
        }
        latest
    }

    /// Takes the oldest unread value without blocking.
    pub fn try_next(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_latest_wins() {
        let (tx, rx) = handoff_channel(2);
        assert_eq!(tx.publish(1), 0);
        assert_eq!(tx.publish(2), 0);
        assert_eq!(tx.publish(3), 1);
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_latest(), Some(3));
        assert_eq!(rx.try_latest(), None);
    }

    #[test]
    fn test_oldest_is_evicted_first() {
        let (tx, rx) = handoff_channel(3);
        for i in 0..10 {
            tx.publish(i);
        }
        assert_eq!(rx.try_next(), Some(7));
        assert_eq!(rx.try_next(), Some(8));
        assert_eq!(rx.try_next(), Some(9));
        assert!(rx.is_empty());
    }

    #[test]
    fn test_clear_discards_queued_values() {
        let (tx, rx) = handoff_channel(4);
        tx.publish("stale");
        tx.publish("stale");
        tx.clear();
        assert!(rx.try_latest().is_none());
        tx.publish("fresh");
        assert_eq!(rx.try_latest(), Some("fresh"));
    }

    #[test]
    fn test_publish_after_receiver_dropped_does_not_block() {
        let (tx, rx) = handoff_channel(1);
        drop(rx);
        for i in 0..100 {
            tx.publish(i);
        }
    }

    #[test]
    fn test_consumer_never_goes_backwards_under_flood() {
        const COUNT: u64 = 50_000;
        let (tx, rx) = handoff_channel(4);

        let producer = thread::spawn(move || {
            for i in 0..COUNT {
                tx.publish(i);
            }
        });

        let mut last_seen: Option<u64> = None;
        loop {
            if let Some(value) = rx.try_latest() {
                if let Some(prev) = last_seen {
                    assert!(value > prev, "saw {} after {}", value, prev);
                }
                last_seen = Some(value);
            }
            if producer.is_finished() && rx.is_empty() {
                break;
            }
            thread::yield_now();
        }
        producer.join().unwrap();

        if let Some(value) = rx.try_latest() {
            last_seen = Some(value);
        }
        assert_eq!(last_seen, Some(COUNT - 1));
    }
}
