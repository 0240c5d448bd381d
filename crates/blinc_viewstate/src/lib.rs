//! Blinc View-States
//!
//! Declarative view-states and derived flags for Blinc components:
//!
//! - **States**: plain labels such as `LOADING`, `READY`, `SAVING`. Exactly one is active at a
//!   time and it lives in a single field of the bound context.
//! - **Flags**: booleans derived from a small expression over state names
//!   (`"READY && !SAVING"`), each optionally debounced separately for its true-going and
//!   false-going edges.
//!
//! Declarations are collected with a clone-on-write [`Builder`], then bound to a
//! [`ReactiveContext`] with `finalise`. The resulting [`Finalized`] instance keeps one watcher
//! per flag and one transition per state until it is disposed.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use blinc_viewstate::prelude::*;
//!
//! let scheduler = Arc::new(ManualScheduler::new());
//! let scope = Scope::new();
//!
//! let view = Builder::new(scheduler.clone())
//!     .state("LOADING")
//!     .state("READY")
//!     .flag_with("isLoading", "LOADING")
//!     .flag_with("isIdle", "READY")
//!     .delay(Some(10))
//!     .finalise(Some(scope.shared()));
//!
//! scope.apply(|| view.go_to("LOADING")).unwrap();
//! assert_eq!(scope.flag("isLoading"), Some(true));
//!
//! scope.apply(|| view.go_to("READY")).unwrap();
//! assert_eq!(scope.flag("isLoading"), Some(false));
//! assert_eq!(scope.flag("isIdle"), None);
//!
//! scheduler.advance(Duration::from_millis(10));
//! assert_eq!(scope.flag("isIdle"), Some(true));
//! ```

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod finalize;
pub mod names;
pub mod params;
pub mod scheduler;
pub mod scope;

pub use builder::{Builder, Declare, FlagChain, StateChain, ViewStateOptions};
pub use config::{FlagConfig, ViewStateConfig};
pub use context::{
    EventHandler, ListenerId, ReactiveContext, SharedContext, Value, WatchHandle, WatchListener,
};
pub use error::{ConfigError, Result, ScopeError};
pub use expression::{translate, ExpressionError, Predicate, DEFAULT_STATE_FIELD};
pub use finalize::{Finalized, GoTable, Transition};
pub use names::state_name_is_valid;
pub use params::{FlagSpec, ParameterStore};
pub use scheduler::{ManualScheduler, Scheduler, SharedScheduler, Task, TimerHandle};
pub use scope::Scope;

#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;

/// Everything needed to declare and bind view-states
pub mod prelude {
    pub use crate::builder::{Builder, Declare, FlagChain, StateChain, ViewStateOptions};
    pub use crate::context::{ReactiveContext, SharedContext, Value};
    pub use crate::finalize::Finalized;
    pub use crate::scheduler::{ManualScheduler, Scheduler, SharedScheduler};
    pub use crate::scope::Scope;
}
