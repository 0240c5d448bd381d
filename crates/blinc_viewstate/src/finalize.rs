//! Finalized view-states
//!
//! A [`Finalized`] instance binds one parameter snapshot to one context:
//!
//! - every flag gets a watcher on its compiled predicate; each change either
//!   writes the flag field at once or schedules the write after the flag's
//!   delay, replacing whatever write was still pending for that flag
//! - every state gets a [`Transition`] in the [`GoTable`] that writes the
//!   state name into the context's state field
//!
//! ```text
//! finalise ──► revived ──dispose──► disposed ──revive──► revived ...
//! ```
//!
//! Each revive starts a new epoch. Watchers, scheduled writes and transitions
//! remember the epoch they were created in and do nothing once it has ended,
//! so nothing lands after `dispose` even if it was already in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::builder::ViewStateOptions;
use crate::context::{is_capable, SharedContext, Value, WatchHandle};
use crate::expression::Predicate;
use crate::params::{FlagSpec, ParameterStore};
use crate::scheduler::{SharedScheduler, TimerHandle};

struct PendingWrite {
    /// `None` until the scheduler has handed out a handle
    timer: Option<TimerHandle>,
    token: u64,
}

#[derive(Default)]
struct WriteState {
    epoch: u64,
    next_token: u64,
    pending: FxHashMap<String, PendingWrite>,
}

type SharedWrites = Arc<Mutex<WriteState>>;

fn lock(writes: &SharedWrites) -> MutexGuard<'_, WriteState> {
    writes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Applies one flag's observed values to the context
struct FlagWriter {
    spec: FlagSpec,
    epoch: u64,
    context: SharedContext,
    scheduler: SharedScheduler,
    writes: SharedWrites,
}

impl FlagWriter {
    fn observe(self: &Arc<Self>, value: bool) {
        let name = &self.spec.name;
        let (previous, token) = {
            let mut writes = lock(&self.writes);
            if writes.epoch != self.epoch {
                return;
            }
            let previous = writes.pending.remove(name);

            match self.spec.delay_for(value) {
                None => {
                    tracing::trace!("Flag {} = {}", name, value);
                    self.context.assign(name, Value::Bool(value));
                    (previous, None)
                }
                Some(ms) => {
                    let token = writes.next_token;
                    writes.next_token += 1;
                    // Reserved before scheduling, the timer may fire inline
                    writes
                        .pending
                        .insert(name.clone(), PendingWrite { timer: None, token });
                    (previous, Some((token, ms)))
                }
            }
        };

        if let Some(timer) = previous.and_then(|previous| previous.timer) {
            tracing::trace!("Flag {} superseded pending write", name);
            self.scheduler.cancel(timer);
        }

        let Some((token, ms)) = token else {
            return;
        };
        let writer = Arc::clone(self);
        let timer = self.scheduler.schedule(
            Duration::from_millis(ms),
            Box::new(move || writer.land(token, value)),
        );

        let mut writes = lock(&self.writes);
        if let Some(pending) = writes
            .pending
            .get_mut(name)
            .filter(|pending| pending.token == token)
        {
            pending.timer = Some(timer);
            tracing::trace!("Flag {} = {} scheduled in {}ms", name, value, ms);
            return;
        }
        // Landed, superseded or disposed while scheduling
        drop(writes);
        self.scheduler.cancel(timer);
    }

    /// Scheduled write; only the newest write of the current epoch lands
    fn land(&self, token: u64, value: bool) {
        let name = &self.spec.name;
        let mut writes = lock(&self.writes);
        if writes.epoch != self.epoch {
            return;
        }
        if writes.pending.get(name).map(|pending| pending.token) != Some(token) {
            return;
        }
        writes.pending.remove(name);
        tracing::trace!("Flag {} = {} (delayed)", name, value);
        self.context.assign(name, Value::Bool(value));
    }
}

/// Moves the bound context into one state
#[derive(Clone)]
pub struct Transition {
    state: String,
    state_field: String,
    epoch: u64,
    context: SharedContext,
    writes: SharedWrites,
}

impl Transition {
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Write this state into the context's state field
    ///
    /// Does nothing once the instance that created it has been disposed.
    pub fn invoke(&self) {
        let writes = lock(&self.writes);
        if writes.epoch != self.epoch {
            return;
        }
        self.context
            .assign(&self.state_field, Value::Text(self.state.clone()));
    }
}

impl std::fmt::Debug for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transition")
            .field("state", &self.state)
            .field("state_field", &self.state_field)
            .finish_non_exhaustive()
    }
}

/// Transitions by state name, in declaration order
#[derive(Clone, Debug, Default)]
pub struct GoTable {
    transitions: IndexMap<String, Transition>,
}

impl GoTable {
    pub fn get(&self, state: &str) -> Option<&Transition> {
        self.transitions.get(state)
    }

    pub fn contains(&self, state: &str) -> bool {
        self.transitions.contains_key(state)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transitions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

/// States and flags bound to a live context
pub struct Finalized {
    params: ParameterStore,
    options: ViewStateOptions,
    scheduler: SharedScheduler,
    context: Option<SharedContext>,
    bound: bool,
    go: GoTable,
    watchers: Vec<WatchHandle>,
    writes: SharedWrites,
}

impl Finalized {
    pub(crate) fn new(
        params: ParameterStore,
        options: ViewStateOptions,
        scheduler: SharedScheduler,
        context: Option<SharedContext>,
    ) -> Self {
        let mut finalized = Self {
            params,
            options,
            scheduler,
            context: None,
            bound: false,
            go: GoTable::default(),
            watchers: Vec::new(),
            writes: SharedWrites::default(),
        };
        finalized.revive(context);
        finalized
    }

    /// Install watchers and transitions
    ///
    /// Anything installed by an earlier revive is torn down first. `Some`
    /// rebinds to a new context; `None` reuses the current one. A missing or
    /// incapable context leaves the instance unbound.
    pub fn revive(&mut self, context: Option<SharedContext>) {
        self.dispose();
        if context.is_some() {
            self.context = context;
        }

        let Some(context) = self.context.clone() else {
            tracing::debug!("View-states finalised without a context");
            return;
        };
        if !is_capable(context.as_ref()) {
            tracing::debug!("Context cannot watch and subscribe, view-states left unbound");
            return;
        }

        let epoch = lock(&self.writes).epoch;

        for spec in self.params.flags() {
            let predicate =
                Predicate::compile(spec.statement.as_deref(), &self.options.state_field);
            let writer = Arc::new(FlagWriter {
                spec: spec.clone(),
                epoch,
                context: Arc::clone(&context),
                scheduler: Arc::clone(&self.scheduler),
                writes: Arc::clone(&self.writes),
            });
            let handle = context.watch(predicate, Arc::new(move |value| writer.observe(value)));
            self.watchers.push(handle);
        }

        for state in self.params.states() {
            self.go.transitions.insert(
                state.to_string(),
                Transition {
                    state: state.to_string(),
                    state_field: self.options.state_field.clone(),
                    epoch,
                    context: Arc::clone(&context),
                    writes: Arc::clone(&self.writes),
                },
            );
        }

        self.bound = true;
        tracing::debug!(
            "View-states revived: {} state(s), {} flag watcher(s)",
            self.go.len(),
            self.watchers.len()
        );
    }

    /// Remove every watcher, cancel every pending write and clear `go`
    pub fn dispose(&mut self) {
        if let Some(context) = &self.context {
            for handle in self.watchers.drain(..) {
                context.unwatch(handle);
            }
        }
        self.watchers.clear();

        let timers: Vec<TimerHandle> = {
            let mut writes = lock(&self.writes);
            writes.epoch += 1;
            writes
                .pending
                .drain()
                .filter_map(|(_, pending)| pending.timer)
                .collect()
        };
        let cancelled = timers.len();
        for timer in timers {
            self.scheduler.cancel(timer);
        }

        self.go.transitions.clear();
        if self.bound {
            tracing::debug!("View-states disposed, {} pending write(s) cancelled", cancelled);
        }
        self.bound = false;
    }

    /// Transitions by state name
    pub fn go(&self) -> &GoTable {
        &self.go
    }

    /// Invoke the transition for `state`, returning whether one exists
    pub fn go_to(&self, state: &str) -> bool {
        match self.go.get(state) {
            Some(transition) => {
                transition.invoke();
                true
            }
            None => false,
        }
    }

    /// Whether watchers and transitions are installed on a context
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Delayed flag writes still waiting to land
    pub fn pending_count(&self) -> usize {
        lock(&self.writes).pending.len()
    }

    /// The declarations this instance was finalised from
    pub fn params(&self) -> &ParameterStore {
        &self.params
    }
}

impl Drop for Finalized {
    fn drop(&mut self) {
        self.dispose();
    }
}
