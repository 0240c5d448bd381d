//! View-state declarations from config files
//!
//! ```toml
//! state_field = "viewState"
//! states = ["LOADING", "READY", "SAVING"]
//!
//! [flags.isLoading]
//! expression = "LOADING"
//!
//! [flags.isIdle]
//! expression = "READY && !SAVING"
//! delay = 50
//! negate_delay = 0
//! ```
//!
//! Loaded declarations go through the regular builder calls, so an invalid
//! state name in a file is dropped exactly like one passed to `state()`.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::builder::{Builder, Declare, ViewStateOptions};
use crate::error::Result;
use crate::expression::DEFAULT_STATE_FIELD;
use crate::scheduler::SharedScheduler;

/// Top-level view-state config
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ViewStateConfig {
    /// Context field holding the active state
    #[serde(default = "default_state_field")]
    pub state_field: String,
    #[serde(default)]
    pub states: Vec<String>,
    #[serde(default)]
    pub flags: IndexMap<String, FlagConfig>,
}

fn default_state_field() -> String {
    DEFAULT_STATE_FIELD.to_string()
}

impl Default for ViewStateConfig {
    fn default() -> Self {
        Self {
            state_field: default_state_field(),
            states: Vec::new(),
            flags: IndexMap::new(),
        }
    }
}

/// One flag's entry under `[flags.<name>]`
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlagConfig {
    #[serde(default)]
    pub expression: Option<String>,
    /// Delay for both edges, in milliseconds
    #[serde(default)]
    pub delay: Option<u64>,
    /// Overrides `delay` for the true-going edge
    #[serde(default)]
    pub assert_delay: Option<u64>,
    /// Overrides `delay` for the false-going edge
    #[serde(default)]
    pub negate_delay: Option<u64>,
}

impl ViewStateConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    pub fn options(&self) -> ViewStateOptions {
        ViewStateOptions {
            state_field: self.state_field.clone(),
        }
    }
}

impl Builder {
    /// Builder pre-loaded with the declarations of `config`
    pub fn from_config(config: &ViewStateConfig, scheduler: SharedScheduler) -> Self {
        let mut builder = Builder::with_options(scheduler, config.options());

        for state in &config.states {
            builder = builder.state(state).into_builder();
        }

        for (name, flag) in &config.flags {
            let mut chain = builder.flag(name);
            if let Some(statement) = &flag.expression {
                chain = chain.expression(statement);
            }
            if flag.delay.is_some() {
                chain = chain.delay(flag.delay);
            }
            if flag.assert_delay.is_some() {
                chain = chain.delay_assert(flag.assert_delay);
            }
            if flag.negate_delay.is_some() {
                chain = chain.delay_negate(flag.negate_delay);
            }
            builder = chain.into_builder();
        }

        tracing::debug!(
            "Loaded view-state config: {} state(s), {} flag(s)",
            builder.params().state_count(),
            builder.params().flag_count()
        );
        builder
    }
}
