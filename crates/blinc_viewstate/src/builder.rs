//! View-state builder
//!
//! Declarations are collected by value: every call consumes the builder (or
//! chain) and hands back a chain for the item just touched. Chains expose the
//! whole builder surface through [`Declare`], so a declaration reads as one
//! expression:
//!
//! ```rust
//! use std::sync::Arc;
//! use blinc_viewstate::prelude::*;
//!
//! let scheduler = Arc::new(ManualScheduler::new());
//! let form = Builder::new(scheduler)
//!     .state("EDITING")
//!     .state("SAVING")
//!     .flag_with("isBusy", "SAVING")
//!     .delay_assert(Some(50))
//!     .flag_with("canEdit", "EDITING && !SAVING");
//!
//! assert_eq!(form.params().state_count(), 2);
//! assert_eq!(form.params().flag("isBusy").unwrap().delay_assert_ms, Some(50));
//! ```
//!
//! `create()` branches a deep copy, so a shared base can be extended without
//! the extensions leaking back into it.

use std::sync::Arc;

use crate::context::SharedContext;
use crate::expression::DEFAULT_STATE_FIELD;
use crate::finalize::Finalized;
use crate::params::{FlagSpec, ParameterStore};
use crate::scheduler::SharedScheduler;

/// Binding options shared by every view built from a builder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ViewStateOptions {
    /// Context field holding the active state
    pub state_field: String,
}

impl Default for ViewStateOptions {
    fn default() -> Self {
        Self {
            state_field: DEFAULT_STATE_FIELD.to_string(),
        }
    }
}

/// Root of a view-state declaration
#[derive(Clone)]
pub struct Builder {
    params: ParameterStore,
    options: ViewStateOptions,
    scheduler: SharedScheduler,
}

impl Builder {
    /// Empty builder; delayed flag writes go through `scheduler`
    pub fn new(scheduler: SharedScheduler) -> Self {
        Self::with_options(scheduler, ViewStateOptions::default())
    }

    pub fn with_options(scheduler: SharedScheduler, options: ViewStateOptions) -> Self {
        Self {
            params: ParameterStore::new(),
            options,
            scheduler,
        }
    }

    pub fn options(&self) -> &ViewStateOptions {
        &self.options
    }

    pub fn scheduler(&self) -> &SharedScheduler {
        &self.scheduler
    }
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("params", &self.params)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Operations available on a builder and on every chain it returns
pub trait Declare: Sized {
    fn builder(&self) -> &Builder;

    fn into_builder(self) -> Builder;

    /// Branch a new builder over a deep copy of the declarations so far
    fn create(&self) -> Builder {
        self.builder().clone()
    }

    fn params(&self) -> &ParameterStore {
        &self.builder().params
    }

    /// Declare a state
    ///
    /// Names must match `^[A-Za-z_][A-Za-z0-9_-]*$`. Anything else is
    /// ignored without an error; see [`StateChain::accepted`].
    fn state(self, name: &str) -> StateChain {
        let mut builder = self.into_builder();
        let accepted = builder.params.insert_state(name);
        if !accepted {
            tracing::debug!("Ignoring invalid state name {:?}", name);
        }
        StateChain {
            builder,
            name: name.to_string(),
            accepted,
        }
    }

    /// Declare a flag, or pick up an existing one for further configuration
    fn flag(self, name: &str) -> FlagChain {
        let mut builder = self.into_builder();
        builder.params.flag_entry(name);
        FlagChain {
            builder,
            name: name.to_string(),
        }
    }

    /// Declare a flag and set its expression
    fn flag_with(self, name: &str, statement: &str) -> FlagChain {
        self.flag(name).expression(statement)
    }

    /// Bind the declarations to `context`
    ///
    /// Without a context, or with one that cannot watch and subscribe, the
    /// result has no transitions and no watchers.
    fn finalise(&self, context: Option<SharedContext>) -> Finalized {
        let builder = self.builder();
        Finalized::new(
            builder.params.clone(),
            builder.options.clone(),
            Arc::clone(&builder.scheduler),
            context,
        )
    }
}

impl Declare for Builder {
    fn builder(&self) -> &Builder {
        self
    }

    fn into_builder(self) -> Builder {
        self
    }
}

/// Chain returned by [`Declare::state`]
#[derive(Clone, Debug)]
pub struct StateChain {
    builder: Builder,
    name: String,
    accepted: bool,
}

impl StateChain {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the name passed validation when it was declared
    pub fn accepted(&self) -> bool {
        self.accepted
    }

    /// Remove this state again
    pub fn remove(mut self) -> Self {
        self.builder.params.remove_state(&self.name);
        self
    }
}

impl Declare for StateChain {
    fn builder(&self) -> &Builder {
        &self.builder
    }

    fn into_builder(self) -> Builder {
        self.builder
    }
}

/// Chain returned by [`Declare::flag`]
///
/// Every configuring call recreates the flag if it was removed earlier in the
/// chain.
#[derive(Clone, Debug)]
pub struct FlagChain {
    builder: Builder,
    name: String,
}

impl FlagChain {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current declaration, `None` after [`remove`](Self::remove)
    pub fn spec(&self) -> Option<&FlagSpec> {
        self.builder.params.flag(&self.name)
    }

    fn spec_mut(&mut self) -> &mut FlagSpec {
        self.builder.params.flag_entry(&self.name)
    }

    /// Set or replace the flag's expression
    pub fn expression(mut self, statement: &str) -> Self {
        self.spec_mut().statement = Some(statement.to_string());
        self
    }

    /// Delay both edges by `ms`; `None` makes both synchronous
    pub fn delay(mut self, ms: Option<u64>) -> Self {
        let spec = self.spec_mut();
        spec.delay_assert_ms = ms;
        spec.delay_negate_ms = ms;
        self
    }

    /// Delay only the true-going edge
    pub fn delay_assert(mut self, ms: Option<u64>) -> Self {
        self.spec_mut().delay_assert_ms = ms;
        self
    }

    /// Delay only the false-going edge
    pub fn delay_negate(mut self, ms: Option<u64>) -> Self {
        self.spec_mut().delay_negate_ms = ms;
        self
    }

    pub fn remove(mut self) -> Self {
        self.builder.params.remove_flag(&self.name);
        self
    }
}

impl Declare for FlagChain {
    fn builder(&self) -> &Builder {
        &self.builder
    }

    fn into_builder(self) -> Builder {
        self.builder
    }
}
