//! Store configuration module.
//!
//! # Environment Variables
//!
//! - `QUADSTORE_DIRECTORY`: directory holding the store files (default: `./data`)
//! - `QUADSTORE_NAME`: base file name of the store (default: `xa`)
//! - `QUADSTORE_TRANSACTION_TIMEOUT`: XA transaction timeout in seconds (default: `10`)
//! - `QUADSTORE_MAX_NODE_ENTRIES`: cap on B-tree node fan-out (default: page capacity)
//!
//! # Invariants
//!
//! - `name` is never empty and contains no path separator
//! - `max_node_entries`, when set, is at least 4

use std::path::{Path, PathBuf};

/// Store configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()` or `new()`, every field is valid for
/// [`crate::statement::StatementStore::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory where the store files live.
    pub directory: PathBuf,
    /// Base file name: `<name>.g`, `<name>.g_0123` and so on.
    pub name: String,
    /// Default XA transaction timeout in seconds.
    pub transaction_timeout: u32,
    /// Cap on B-tree node fan-out, for exercising deep trees.
    pub max_node_entries: Option<usize>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl StoreConfig {
    /// Default store directory.
    pub const DEFAULT_DIRECTORY: &'static str = "./data";
    /// Default base file name.
    pub const DEFAULT_NAME: &'static str = "xa";
    /// Default XA transaction timeout, in seconds.
    pub const DEFAULT_TRANSACTION_TIMEOUT: u32 = 10;
    /// Smallest accepted node fan-out.
    pub const MIN_NODE_ENTRIES: usize = 4;

    /// Defaults for a store in `directory`.
    #[must_use]
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            name: Self::DEFAULT_NAME.to_string(),
            transaction_timeout: Self::DEFAULT_TRANSACTION_TIMEOUT,
            max_node_entries: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `QUADSTORE_NAME` is empty or contains a path separator
    /// - `QUADSTORE_TRANSACTION_TIMEOUT` is not a number of seconds
    /// - `QUADSTORE_MAX_NODE_ENTRIES` is not a number of at least 4
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let directory = lookup("QUADSTORE_DIRECTORY")
            .map_or_else(|| PathBuf::from(Self::DEFAULT_DIRECTORY), PathBuf::from);
        let name = Self::load_name(lookup("QUADSTORE_NAME"))?;
        let transaction_timeout = match lookup("QUADSTORE_TRANSACTION_TIMEOUT") {
            Some(value) => parse("QUADSTORE_TRANSACTION_TIMEOUT", &value, "a number of seconds")?,
            None => Self::DEFAULT_TRANSACTION_TIMEOUT,
        };
        let max_node_entries = lookup("QUADSTORE_MAX_NODE_ENTRIES")
            .map(|value| Self::load_max_node_entries(&value))
            .transpose()?;

        Ok(Self {
            directory,
            name,
            transaction_timeout,
            max_node_entries,
        })
    }

    fn load_name(value: Option<String>) -> Result<String, ConfigError> {
        let Some(name) = value else {
            return Ok(Self::DEFAULT_NAME.to_string());
        };
        if name.is_empty() || name.contains(std::path::is_separator) {
            return Err(ConfigError::InvalidValue {
                name: "QUADSTORE_NAME".to_string(),
                message: format!("'{name}' is not a plain file name"),
            });
        }
        Ok(name)
    }

    fn load_max_node_entries(value: &str) -> Result<usize, ConfigError> {
        let entries: usize = parse("QUADSTORE_MAX_NODE_ENTRIES", value, "a node entry count")?;
        if entries < Self::MIN_NODE_ENTRIES {
            return Err(ConfigError::InvalidValue {
                name: "QUADSTORE_MAX_NODE_ENTRIES".to_string(),
                message: format!("must be at least {}", Self::MIN_NODE_ENTRIES),
            });
        }
        Ok(entries)
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not {expected}"),
    })
}
