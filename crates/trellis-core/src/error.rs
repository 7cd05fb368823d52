//! Error types for the adapter
//!
//! Per-change problems never surface here: they are reported as
//! [`trellis_element::ChangeError`]s inside results. These errors abort a whole
//! operation.

use std::path::PathBuf;

use trellis_deploy::ClientError;
use trellis_element::ElementError;

/// Main adapter error type
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// Configuration is unusable
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Malformed element state
    #[error("element error: {0}")]
    Element(#[from] ElementError),

    /// External system failure outside any one change
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// A filter failed
    #[error("filter {filter} failed: {message}")]
    Filter {
        /// Filter name
        filter: &'static str,
        /// What went wrong
        message: String,
    },
}

impl AdapterError {
    /// Create a filter failure
    #[inline]
    pub fn filter(filter: &'static str, message: impl Into<String>) -> Self {
        Self::Filter {
            filter,
            message: message.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("io error reading {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for the configuration schema
    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value at {path}: {message}")]
    Invalid {
        /// Dotted path of the offending field
        path: String,
        /// What is wrong with it
        message: String,
    },

    /// A pattern does not compile
    #[error("invalid regular expression at {path}: {source}")]
    InvalidRegex {
        /// Dotted path of the offending field
        path: String,
        /// Underlying error
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    /// Create an IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid value error
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Dotted path of the offending field, when known
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Invalid { path, .. } | Self::InvalidRegex { path, .. } => Some(path),
            Self::Io { .. } | Self::Parse(_) => None,
        }
    }
}
