//! Reactive context seam
//!
//! A [`ReactiveContext`] is whatever object a view binds its states and flags
//! to. It holds named fields, re-evaluates registered predicates on its own
//! change cycle and reports changed values to listeners.
//!
//! [`Scope`](crate::scope::Scope) is the in-crate implementation.

use std::sync::Arc;

use slotmap::new_key_type;

use crate::expression::Predicate;

new_key_type! {
    /// Handle to a watcher registered on a context
    pub struct WatchHandle;

    /// Handle to an event handler registered on a context
    pub struct ListenerId;
}

/// Called with every new value of a watched predicate, including the first
pub type WatchListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Event handler, called with the emitted event name
pub type EventHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Context shared between a view and everything bound to it
pub type SharedContext = Arc<dyn ReactiveContext>;

/// A field value written into a context
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text.as_str()),
            Value::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Text(_) => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// An observation context that flags and transitions are bound to
///
/// Implementations must call listeners from their own change cycle, never
/// from inside [`assign`](ReactiveContext::assign).
pub trait ReactiveContext: Send + Sync {
    /// Whether predicates can be watched on this context
    fn can_watch(&self) -> bool {
        true
    }

    /// Whether [`subscribe`](ReactiveContext::subscribe) is implemented
    ///
    /// Contexts without events keep the defaults and are never bound.
    fn can_subscribe(&self) -> bool {
        false
    }

    /// Register `handler` for `event`. `None` when events are unsupported.
    fn subscribe(&self, _event: &str, _handler: EventHandler) -> Option<ListenerId> {
        None
    }

    /// Remove an event handler. Unknown ids are ignored.
    fn unsubscribe(&self, _id: ListenerId) {}

    /// Register a predicate; `listener` fires whenever its value changes
    fn watch(&self, predicate: Predicate, listener: WatchListener) -> WatchHandle;

    /// Remove a watcher. Unknown handles are ignored.
    fn unwatch(&self, handle: WatchHandle);

    /// Write a named field
    fn assign(&self, field: &str, value: Value);
}

/// Whether `context` offers everything a view needs to bind to it
pub(crate) fn is_capable(context: &dyn ReactiveContext) -> bool {
    context.can_watch() && context.can_subscribe()
}
