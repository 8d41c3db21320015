//! Observer-style change notifications.
//!
//! Services own an [`EventBus`] and emit [`GameEvent`]s after every state
//! change; UI glue subscribes either to everything or to a single topic
//! (for currency changes the topic is the currency name).

use crate::currency::Currency;

/// Something that changed in the game state.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// A currency balance changed.
    CurrencyChanged { currency: Currency, balance: f64 },
    /// A dialog sequence started rendering.
    DialogStarted { dialog_id: String },
    /// A dialog sequence finished.
    DialogCompleted { dialog_id: String },
    /// A character relationship score changed.
    RelationChanged { character: String, score: i32 },
}

impl GameEvent {
    /// Topic used for keyed subscriptions.
    pub fn topic(&self) -> &str {
        match self {
            GameEvent::CurrencyChanged { currency, .. } => currency.key(),
            GameEvent::DialogStarted { .. } | GameEvent::DialogCompleted { .. } => "dialog",
            GameEvent::RelationChanged { .. } => "relation",
        }
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&GameEvent)>;

struct Subscription {
    id: SubscriptionId,
    topic: Option<String>,
    listener: Listener,
}

/// A list of listeners invoked synchronously on emit.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to every event.
    pub fn subscribe(&mut self, listener: impl FnMut(&GameEvent) + 'static) -> SubscriptionId {
        self.insert(None, Box::new(listener))
    }

    /// Listen only to events whose [`GameEvent::topic`] equals `topic`.
    pub fn subscribe_topic(
        &mut self,
        topic: impl Into<String>,
        listener: impl FnMut(&GameEvent) + 'static,
    ) -> SubscriptionId {
        self.insert(Some(topic.into()), Box::new(listener))
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    /// Deliver an event to matching listeners in subscription order.
    pub fn emit(&mut self, event: &GameEvent) {
        for subscription in &mut self.subscriptions {
            let matches = subscription
                .topic
                .as_deref()
                .map_or(true, |topic| topic == event.topic());
            if matches {
                (subscription.listener)(event);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.len()
    }

    fn insert(&mut self, topic: Option<String>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            topic,
            listener,
        });
        id
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_topic_filtering() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        bus.subscribe_topic("lunar", move |e| sink.borrow_mut().push(e.clone()));

        bus.emit(&GameEvent::CurrencyChanged {
            currency: Currency::Dilithium,
            balance: 1.0,
        });
        bus.emit(&GameEvent::CurrencyChanged {
            currency: Currency::Lunar,
            balance: 2.0,
        });

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].topic(), "lunar");
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));

        let counter = count.clone();
        let id = bus.subscribe(move |_| *counter.borrow_mut() += 1);
        bus.emit(&GameEvent::DialogStarted {
            dialog_id: "intro".to_string(),
        });

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&GameEvent::DialogStarted {
            dialog_id: "intro".to_string(),
        });

        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.listener_count(), 0);
    }
}
