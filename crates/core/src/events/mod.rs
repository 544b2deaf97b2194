//! Typed domain events and the subscriber registry
//!
//! Publication is an explicit call on an injected bus; there is no
//! global dispatch table. Subscribers register per topic and are
//! invoked synchronously in registration order. Handlers that need a
//! work queue enqueue from their callback.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Events published by the pipeline for downstream consumers.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    /// A draft was materialized into a course and its events. The sole
    /// input of the calendar sync engine.
    CourseMaterialized { course_id: String, event_ids: Vec<String>, user_id: String },
    /// An existing course's events changed and need re-sync.
    CourseUpdated { course_id: String, user_id: String },
}

impl DomainEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::CourseMaterialized { .. } => EventTopic::CourseMaterialized,
            Self::CourseUpdated { .. } => EventTopic::CourseUpdated,
        }
    }
}

/// Topics a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventTopic {
    CourseMaterialized,
    CourseUpdated,
}

type Subscriber = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Registry of per-topic subscriber callbacks.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventTopic, Vec<Subscriber>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(HashMap::new()) }
    }

    /// Register a callback for a topic.
    pub fn subscribe<F>(&self, topic: EventTopic, callback: F)
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        self.subscribers.write().entry(topic).or_default().push(Arc::new(callback));
    }

    /// Publish an event to all subscribers of its topic.
    pub fn publish(&self, event: &DomainEvent) {
        let topic = event.topic();
        let callbacks: Vec<Subscriber> =
            self.subscribers.read().get(&topic).cloned().unwrap_or_default();

        debug!(?topic, subscribers = callbacks.len(), "publishing domain event");

        for callback in callbacks {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn subscribers_receive_their_topic() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        bus.subscribe(EventTopic::CourseMaterialized, move |event| {
            assert!(matches!(event, DomainEvent::CourseMaterialized { .. }));
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&DomainEvent::CourseMaterialized {
            course_id: "c1".into(),
            event_ids: vec!["e1".into()],
            user_id: "u1".into(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_topics_are_not_delivered() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        bus.subscribe(EventTopic::CourseUpdated, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&DomainEvent::CourseMaterialized {
            course_id: "c1".into(),
            event_ids: vec![],
            user_id: "u1".into(),
        });

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multiple_subscribers_all_fire() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.subscribe(EventTopic::CourseUpdated, move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        bus.publish(&DomainEvent::CourseUpdated { course_id: "c1".into(), user_id: "u1".into() });
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
