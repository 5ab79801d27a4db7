//! A polled event log replacing a counter-to-data-set seal-notification
//! callback: the data set exposes an observable event stream, and counters
//! subscribe by identifier rather than holding a mutual strong reference.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Notable things that happen to a counter's data outside of a direct
/// caller request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A bucket was sealed and persisted.
    BucketSealed {
        /// The owning counter's name.
        counter: String,
        /// The sealed bucket's start time, ms since epoch UTC.
        start_time: i64,
        /// The sealed bucket's end time, ms since epoch UTC.
        end_time: i64,
    },
    /// A write arrived for a time already outside the live window and was
    /// dropped rather than returned as an error.
    WriteRejectedTooOld {
        /// The owning counter's name.
        counter: String,
        /// The rejected write's timestamp, ms since epoch UTC.
        timestamp: i64,
    },
    /// Buckets were rolled up by compaction.
    BucketsCompacted {
        /// The owning counter's name.
        counter: String,
        /// Number of input buckets folded into the new one.
        input_count: usize,
        /// The resulting bucket's interval, ms.
        new_interval: i64,
    },
}

/// A bounded, mutex-guarded event queue. `DataManager` owns one; callers
/// drain it on their own schedule instead of registering a callback.
pub struct EventBus {
    queue: Mutex<VecDeque<Event>>,
    capacity: usize,
}

impl EventBus {
    /// A new event bus holding at most `capacity` events (oldest dropped
    /// first once full, since a slow consumer should not apply backpressure
    /// to the ingest path).
    pub fn new(capacity: usize) -> Self {
        EventBus {
            queue: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Push an event, dropping the oldest if at capacity.
    pub fn push(&self, event: Event) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(event);
    }

    /// Drain and return all currently queued events.
    pub fn drain(&self) -> Vec<Event> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued, undrained events.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if there are no queued events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        EventBus::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_all_and_empties() {
        let bus = EventBus::default();
        bus.push(Event::WriteRejectedTooOld { counter: "/x".into(), timestamp: 1 });
        bus.push(Event::WriteRejectedTooOld { counter: "/x".into(), timestamp: 2 });
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(bus.is_empty());
    }

    #[test]
    fn oldest_event_dropped_past_capacity() {
        let bus = EventBus::new(2);
        bus.push(Event::WriteRejectedTooOld { counter: "/x".into(), timestamp: 1 });
        bus.push(Event::WriteRejectedTooOld { counter: "/x".into(), timestamp: 2 });
        bus.push(Event::WriteRejectedTooOld { counter: "/x".into(), timestamp: 3 });
        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::WriteRejectedTooOld { counter: "/x".into(), timestamp: 2 });
    }
}
