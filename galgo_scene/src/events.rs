//! Deferred event bus. Subscription changes made during a frame are staged
//! and applied at the frame boundary so publishing never observes a
//! subscriber list mutating under it.

use std::collections::HashMap;
use std::sync::Arc;

use galgo_behavior::CallbackFn;
use galgo_variant::TableRef;

/// One subscription: a component state table paired with a callback handle.
/// Identity (pointer equality on both) drives unsubscription.
#[derive(Clone)]
pub struct Subscriber {
    pub state: TableRef,
    pub callback: Arc<CallbackFn>,
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.state.ptr_eq(&other.state) && Arc::ptr_eq(&self.callback, &other.callback)
    }
}

#[derive(Default)]
pub struct EventBus {
    subscriptions: HashMap<String, Vec<Subscriber>>,
    added_this_frame: Vec<(String, Subscriber)>,
    removed_this_frame: Vec<(String, Subscriber)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, event: &str, subscriber: Subscriber) {
        self.added_this_frame.push((event.to_string(), subscriber));
    }

    pub fn unsubscribe(&mut self, event: &str, subscriber: Subscriber) {
        self.removed_this_frame
            .push((event.to_string(), subscriber));
    }

    /// Snapshot of the current subscribers for `event`. Cloned so the caller
    /// can invoke callbacks that themselves touch the bus.
    pub fn subscribers(&self, event: &str) -> Vec<Subscriber> {
        self.subscriptions.get(event).cloned().unwrap_or_default()
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscriptions.get(event).map_or(0, |v| v.len())
    }

    /// Apply staged subscription changes. Called once per frame, after the
    /// registry commit.
    pub fn commit(&mut self) {
        for (event, subscriber) in self.added_this_frame.drain(..) {
            self.subscriptions.entry(event).or_default().push(subscriber);
        }
        for (event, subscriber) in self.removed_this_frame.drain(..) {
            if let Some(list) = self.subscriptions.get_mut(&event) {
                if let Some(pos) = list.iter().position(|s| *s == subscriber) {
                    list.remove(pos);
                }
            }
        }
    }
}
