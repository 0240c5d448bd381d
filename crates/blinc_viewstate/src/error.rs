//! View-state error types
//!
//! Declaring and binding view-states never fails; these errors only come from
//! the edges around the core (config files and the reference scope).

use thiserror::Error;

/// Failure to load view-state declarations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("Failed to read view-state config: {0}")]
    Io(#[from] std::io::Error),

    /// The config text is not valid TOML for a view-state config
    #[error("Invalid view-state config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure while running a digest on a [`Scope`](crate::scope::Scope)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// Watchers kept changing for more passes than allowed
    #[error("Digest did not settle after {ttl} passes")]
    DigestOverflow { ttl: usize },
}

/// Result type for config loading
pub type Result<T> = std::result::Result<T, ConfigError>;
