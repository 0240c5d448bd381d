//! In-memory reactive scope
//!
//! `Scope` is a dirty-checking [`ReactiveContext`]: fields are plain values,
//! watchers are re-evaluated on every [`digest`](Scope::digest), and a
//! listener runs whenever its predicate's value differs from the last one
//! seen. The first evaluation of a new watcher always counts as a change.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use blinc_viewstate::{Predicate, ReactiveContext, Scope};
//!
//! let scope = Scope::new();
//! let seen = Arc::new(AtomicBool::new(false));
//! let seen_clone = seen.clone();
//! scope.watch(
//!     Predicate::compile(Some("READY"), "viewState"),
//!     Arc::new(move |value| seen_clone.store(value, Ordering::SeqCst)),
//! );
//!
//! scope.set("viewState", "READY");
//! scope.digest().unwrap();
//! assert!(seen.load(Ordering::SeqCst));
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use slotmap::SlotMap;

use crate::context::{
    EventHandler, ListenerId, ReactiveContext, SharedContext, Value, WatchHandle, WatchListener,
};
use crate::error::ScopeError;
use crate::expression::{Predicate, DEFAULT_STATE_FIELD};

/// Digest passes allowed before giving up
pub const DEFAULT_DIGEST_TTL: usize = 10;

struct Watcher {
    predicate: Predicate,
    listener: WatchListener,
    last: Option<bool>,
}

struct ScopeState {
    fields: FxHashMap<String, Value>,
    watchers: SlotMap<WatchHandle, Watcher>,
    /// Registration order, which is also evaluation order
    order: Vec<WatchHandle>,
    handlers: SlotMap<ListenerId, (String, EventHandler)>,
    ttl: usize,
}

/// Shared reactive scope; clones refer to the same fields and watchers
#[derive(Clone)]
pub struct Scope {
    state: Arc<Mutex<ScopeState>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_DIGEST_TTL)
    }

    /// Scope whose digest gives up after `ttl` unsettled passes
    pub fn with_ttl(ttl: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScopeState {
                fields: FxHashMap::default(),
                watchers: SlotMap::with_key(),
                order: Vec::new(),
                handlers: SlotMap::with_key(),
                ttl: ttl.max(1),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// This scope as a context to bind views to
    pub fn shared(&self) -> SharedContext {
        Arc::new(self.clone())
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.lock().fields.get(field).cloned()
    }

    /// Boolean value of a field, `None` if unset or not a boolean
    pub fn flag(&self, field: &str) -> Option<bool> {
        self.lock().fields.get(field).and_then(Value::as_bool)
    }

    /// Text value of a field, `None` if unset or not text
    pub fn text(&self, field: &str) -> Option<String> {
        self.lock()
            .fields
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// The active state, read from the default state field
    pub fn view_state(&self) -> Option<String> {
        self.text(DEFAULT_STATE_FIELD)
    }

    pub fn set(&self, field: &str, value: impl Into<Value>) {
        self.lock().fields.insert(field.to_string(), value.into());
    }

    pub fn watcher_count(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Re-evaluate watchers until nothing changes
    ///
    /// Listeners run with the scope unlocked, so they may write fields or
    /// register and remove watchers. Returns the number of passes that found
    /// changes.
    pub fn digest(&self) -> Result<usize, ScopeError> {
        let ttl = self.lock().ttl;

        for pass in 0..ttl {
            let fired = self.collect_changes();
            if fired.is_empty() {
                return Ok(pass);
            }
            tracing::trace!("Digest pass {}: {} watcher(s) changed", pass, fired.len());
            for (listener, value) in fired {
                listener(value);
            }
        }

        // One more look: the last pass may have settled everything
        if self.collect_changes_pending() {
            tracing::warn!("Digest did not settle after {} passes", ttl);
            return Err(ScopeError::DigestOverflow { ttl });
        }
        Ok(ttl)
    }

    /// Run `f`, then digest
    pub fn apply<R>(&self, f: impl FnOnce() -> R) -> Result<R, ScopeError> {
        let result = f();
        self.digest()?;
        Ok(result)
    }

    fn collect_changes(&self) -> Vec<(WatchListener, bool)> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut fired = Vec::new();

        for handle in &state.order {
            let Some(watcher) = state.watchers.get_mut(*handle) else {
                continue;
            };
            let active = state
                .fields
                .get(watcher.predicate.state_field())
                .and_then(Value::as_str);
            let value = watcher.predicate.evaluate(active);
            if watcher.last != Some(value) {
                watcher.last = Some(value);
                fired.push((Arc::clone(&watcher.listener), value));
            }
        }
        fired
    }

    fn collect_changes_pending(&self) -> bool {
        let state = self.lock();
        state.watchers.values().any(|watcher| {
            let active = state
                .fields
                .get(watcher.predicate.state_field())
                .and_then(Value::as_str);
            watcher.last != Some(watcher.predicate.evaluate(active))
        })
    }

    /// Subscribe to an event
    pub fn on(&self, event: &str, handler: impl Fn(&str) + Send + Sync + 'static) -> ListenerId {
        self.lock()
            .handlers
            .insert((event.to_string(), Arc::new(handler)))
    }

    pub fn off(&self, id: ListenerId) {
        self.lock().handlers.remove(id);
    }

    /// Call every handler subscribed to `event`, returning how many ran
    pub fn emit(&self, event: &str) -> usize {
        let handlers: Vec<EventHandler> = self
            .lock()
            .handlers
            .values()
            .filter(|(name, _)| name == event)
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl ReactiveContext for Scope {
    fn can_subscribe(&self) -> bool {
        true
    }

    fn subscribe(&self, event: &str, handler: EventHandler) -> Option<ListenerId> {
        Some(self.lock().handlers.insert((event.to_string(), handler)))
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.off(id);
    }

    fn watch(&self, predicate: Predicate, listener: WatchListener) -> WatchHandle {
        let mut state = self.lock();
        let handle = state.watchers.insert(Watcher {
            predicate,
            listener,
            last: None,
        });
        state.order.push(handle);
        handle
    }

    fn unwatch(&self, handle: WatchHandle) {
        let mut state = self.lock();
        if state.watchers.remove(handle).is_some() {
            state.order.retain(|h| *h != handle);
        }
    }

    fn assign(&self, field: &str, value: Value) {
        self.lock().fields.insert(field.to_string(), value);
    }
}
