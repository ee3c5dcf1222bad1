//! Event Subscription Bus (C7): fan-out of execution events/logs to
//! subscribers, with bounded drop-oldest buffering per sink so one slow
//! subscriber can't back-pressure the Engine (spec.md §4.7).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex as StdMutex;

use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crate::model::{EventType, ExecutionEvent, ExecutionLog};

const DEFAULT_SINK_CAPACITY: usize = 256;

/// Either kind of notification a subscriber can receive.
#[derive(Debug, Clone)]
pub enum Notification {
    Event(ExecutionEvent),
    Log(ExecutionLog),
}

/// A bounded, drop-oldest, multi-producer single-consumer queue. Pushing
/// past capacity silently discards the oldest entry rather than blocking
/// the pusher.
struct BoundedSink {
    buffer: StdMutex<VecDeque<Notification>>,
    capacity: usize,
    notify: Notify,
}

impl BoundedSink {
    fn new(capacity: usize) -> Self {
        Self {
            buffer: StdMutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            notify: Notify::new(),
        }
    }

    fn push(&self, item: Notification) {
        let mut buffer = self.buffer.lock().unwrap();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(item);
        drop(buffer);
        self.notify.notify_one();
    }

    fn try_pop(&self) -> Option<Notification> {
        self.buffer.lock().unwrap().pop_front()
    }
}

/// Handle returned to a caller that subscribed; yields notifications as
/// they arrive.
pub struct Subscription {
    pub id: Uuid,
    sink: std::sync::Arc<BoundedSink>,
}

impl Subscription {
    /// Waits for the next notification. Never returns `None` on its own —
    /// the subscriber drives its own lifetime by dropping this handle or
    /// calling [`EventBus::unsubscribe`].
    pub async fn recv(&self) -> Notification {
        loop {
            if let Some(item) = self.sink.try_pop() {
                return item;
            }
            self.sink.notify.notified().await;
        }
    }
}

struct Registration {
    execution_id: uuid::Uuid,
    filter: Option<HashSet<EventType>>,
    sink: std::sync::Arc<BoundedSink>,
}

/// Maps `subscriptionId -> (executionId, filter, sink)` and fans out
/// events/logs for a given execution to all matching sinks.
#[derive(Default)]
pub struct EventBus {
    subscriptions: RwLock<HashMap<Uuid, Registration>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `execution_id`'s events/logs, optionally
    /// restricted to a set of event types (logs are never filtered by
    /// event type).
    pub async fn subscribe(&self, execution_id: Uuid, filter: Option<HashSet<EventType>>) -> Subscription {
        let id = Uuid::new_v4();
        let sink = std::sync::Arc::new(BoundedSink::new(DEFAULT_SINK_CAPACITY));
        self.subscriptions.write().await.insert(
            id,
            Registration { execution_id, filter, sink: sink.clone() },
        );
        Subscription { id, sink }
    }

    pub async fn unsubscribe(&self, subscription_id: Uuid) {
        self.subscriptions.write().await.remove(&subscription_id);
    }

    /// Fire-and-forget fan-out of an event to every subscription on its
    /// execution whose filter (if any) includes the event's type.
    pub async fn notify_event(&self, execution_id: Uuid, event: ExecutionEvent) {
        let subscriptions = self.subscriptions.read().await;
        for registration in subscriptions.values() {
            if registration.execution_id != execution_id {
                continue;
            }
            if let Some(filter) = &registration.filter {
                if !filter.contains(&event.event_type) {
                    continue;
                }
            }
            registration.sink.push(Notification::Event(event.clone()));
        }
    }

    /// Fire-and-forget fan-out of a log chunk; never filtered by type.
    pub async fn notify_log(&self, execution_id: Uuid, log: ExecutionLog) {
        let subscriptions = self.subscriptions.read().await;
        for registration in subscriptions.values() {
            if registration.execution_id == execution_id {
                registration.sink.push(Notification::Log(log.clone()));
            }
        }
    }

    /// Removes every subscription for `execution_id`, e.g. once it reaches
    /// a terminal state (spec.md §4.7).
    pub async fn cleanup_execution(&self, execution_id: Uuid) {
        self.subscriptions
            .write()
            .await
            .retain(|_, registration| registration.execution_id != execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_matching_event() {
        let bus = EventBus::new();
        let execution_id = Uuid::new_v4();
        let sub = bus.subscribe(execution_id, None).await;

        bus.notify_event(execution_id, ExecutionEvent::new(execution_id, EventType::StatusUpdate, "hi")).await;

        match sub.recv().await {
            Notification::Event(e) => assert_eq!(e.execution_id, execution_id),
            _ => panic!("expected event notification"),
        }
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_executions_events() {
        let bus = EventBus::new();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        let sub = bus.subscribe(mine, None).await;

        bus.notify_event(other, ExecutionEvent::new(other, EventType::StatusUpdate, "hi")).await;
        bus.notify_event(mine, ExecutionEvent::new(mine, EventType::StatusUpdate, "mine")).await;

        match sub.recv().await {
            Notification::Event(e) => assert_eq!(e.execution_id, mine),
            _ => panic!("expected event notification"),
        }
    }

    #[tokio::test]
    async fn filter_excludes_non_matching_event_types() {
        let bus = EventBus::new();
        let execution_id = Uuid::new_v4();
        let mut filter = HashSet::new();
        filter.insert(EventType::StageCompleted);
        let sub = bus.subscribe(execution_id, Some(filter)).await;

        bus.notify_event(execution_id, ExecutionEvent::new(execution_id, EventType::StatusUpdate, "skip")).await;
        bus.notify_event(execution_id, ExecutionEvent::new(execution_id, EventType::StageCompleted, "keep")).await;

        match sub.recv().await {
            Notification::Event(e) => assert_eq!(e.event_type, EventType::StageCompleted),
            _ => panic!("expected event notification"),
        }
    }

    #[tokio::test]
    async fn bounded_sink_drops_oldest_on_overflow() {
        let sink = BoundedSink::new(2);
        let execution_id = Uuid::new_v4();
        sink.push(Notification::Event(ExecutionEvent::new(execution_id, EventType::StatusUpdate, "1")));
        sink.push(Notification::Event(ExecutionEvent::new(execution_id, EventType::StatusUpdate, "2")));
        sink.push(Notification::Event(ExecutionEvent::new(execution_id, EventType::StatusUpdate, "3")));

        let first = sink.try_pop().unwrap();
        match first {
            Notification::Event(e) => assert_eq!(e.message, "2"),
            _ => panic!("expected event"),
        }
    }

    #[tokio::test]
    async fn cleanup_execution_removes_its_subscriptions() {
        let bus = EventBus::new();
        let execution_id = Uuid::new_v4();
        bus.subscribe(execution_id, None).await;
        bus.cleanup_execution(execution_id).await;
        assert_eq!(bus.subscriptions.read().await.len(), 0);
    }
}
