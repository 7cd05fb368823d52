//! Adapter configuration
//!
//! # Overview
//!
//! Configuration is read from TOML:
//!
//! ```toml
//! [fetch]
//! max_instances_per_type = 2000
//!
//! [fetch.optional_features]
//! cpqRulesAndConditionsRefs = true
//!
//! [fetch.data]
//! include_objects = ["^SBQQ__.*", "^sbaa__.*", "Product2"]
//! exclude_objects = ["SBQQ__QuoteDocument__c"]
//!
//! [client]
//! max_concurrent_describe = 4
//!
//! [deploy.types]
//! Product2 = ["add", "modify"]
//! ```
//!
//! Every section is optional. [`FetchProfile`] is the validated, compiled view
//! of the `[fetch]` section that fetch code queries.

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use trellis_element::ActionName;

use crate::constants::{DEFAULT_MAX_CONCURRENT_DESCRIBE, DEFAULT_MAX_INSTANCES_PER_TYPE};
use crate::error::ConfigError;

/// Complete adapter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    /// What to fetch
    pub fetch: FetchConfig,
    /// Client behavior
    pub client: ClientConfig,
    /// What may be deployed
    pub deploy: DeployConfig,
}

/// `[fetch]` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Types with more records than this are skipped
    pub max_instances_per_type: Option<usize>,
    /// Feature switches, by feature name
    pub optional_features: HashMap<String, bool>,
    /// Warning switches, by warning name
    pub warning_settings: HashMap<String, bool>,
    /// Data record selection
    pub data: Option<DataConfig>,
}

/// `[fetch.data]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    /// Type name patterns to fetch records of
    pub include_objects: Vec<String>,
    /// Type name patterns never fetched, even when included
    pub exclude_objects: Vec<String>,
}

/// `[client]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Describe calls allowed in flight at once
    pub max_concurrent_describe: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_concurrent_describe: DEFAULT_MAX_CONCURRENT_DESCRIBE,
        }
    }
}

/// `[deploy]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeployConfig {
    /// Deployable record types and the actions enabled for each
    ///
    /// Empty means no restriction.
    pub types: IndexMap<String, Vec<ActionName>>,
}

impl AdapterConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// - `ConfigError::Parse` on syntax or schema errors
    /// - `ConfigError::Invalid` / `ConfigError::InvalidRegex` from [`Self::validate`]
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::io_error(path, e))?;
        debug!(path = %path.display(), "loaded adapter configuration");
        Self::from_toml_str(&content)
    }

    /// With the data record patterns (builder)
    #[must_use]
    pub fn with_data(mut self, include: &[&str], exclude: &[&str]) -> Self {
        self.fetch.data = Some(DataConfig {
            include_objects: include.iter().map(|s| (*s).to_string()).collect(),
            exclude_objects: exclude.iter().map(|s| (*s).to_string()).collect(),
        });
        self
    }

    /// With a feature switch (builder)
    #[must_use]
    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.fetch.optional_features.insert(name.into(), enabled);
        self
    }

    /// Check every value, reporting the path of the first offending field
    ///
    /// # Errors
    /// `ConfigError::Invalid` or `ConfigError::InvalidRegex`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.max_concurrent_describe == 0 {
            return Err(ConfigError::invalid(
                "client.max_concurrent_describe",
                "must be at least 1",
            ));
        }
        if self.fetch.max_instances_per_type == Some(0) {
            return Err(ConfigError::invalid("fetch.max_instances_per_type", "must be at least 1"));
        }
        if let Some(data) = &self.fetch.data {
            compile_patterns(&data.include_objects, "fetch.data.include_objects")?;
            compile_patterns(&data.exclude_objects, "fetch.data.exclude_objects")?;
        }
        for (type_name, actions) in &self.deploy.types {
            if actions.is_empty() {
                return Err(ConfigError::invalid(
                    format!("deploy.types.{type_name}"),
                    "at least one action must be enabled",
                ));
            }
        }
        Ok(())
    }
}

fn compile_patterns(patterns: &[String], path: &str) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .enumerate()
        .map(|(i, pattern)| {
            Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                path: format!("{path}[{i}]"),
                source,
            })
        })
        .collect()
}

/// Defaults for features not set in the configuration
///
/// Features in neither place are enabled.
const OPTIONAL_FEATURE_DEFAULTS: [(&str, bool); 5] = [
    ("fetchProfilesUsingReadApi", false),
    ("generateRefsInProfiles", false),
    ("skipAliases", false),
    ("toolingDepsOfCurrentNamespace", false),
    ("fixRetrieveFilePaths", true),
];

/// Compiled data record selection
#[derive(Debug, Clone)]
pub struct DataManagement {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl DataManagement {
    /// Whether records of `type_name` are fetched
    #[must_use]
    pub fn is_object_included(&self, type_name: &str) -> bool {
        self.include.iter().any(|re| re.is_match(type_name))
            && !self.exclude.iter().any(|re| re.is_match(type_name))
    }
}

/// What a fetch should do, derived from `[fetch]`
#[derive(Debug, Clone)]
pub struct FetchProfile {
    optional_features: HashMap<String, bool>,
    warning_settings: HashMap<String, bool>,
    max_instances_per_type: usize,
    data_management: Option<DataManagement>,
}

impl FetchProfile {
    /// Build from configuration
    ///
    /// # Errors
    /// `ConfigError::InvalidRegex` when a data pattern does not compile
    pub fn from_config(config: &FetchConfig) -> Result<Self, ConfigError> {
        let data_management = config
            .data
            .as_ref()
            .map(|data| -> Result<_, ConfigError> {
                Ok(DataManagement {
                    include: compile_patterns(&data.include_objects, "fetch.data.include_objects")?,
                    exclude: compile_patterns(&data.exclude_objects, "fetch.data.exclude_objects")?,
                })
            })
            .transpose()?;
        Ok(Self {
            optional_features: config.optional_features.clone(),
            warning_settings: config.warning_settings.clone(),
            max_instances_per_type: config
                .max_instances_per_type
                .unwrap_or(DEFAULT_MAX_INSTANCES_PER_TYPE),
            data_management,
        })
    }

    /// Whether an optional feature is on
    ///
    /// Configured value, then the built-in default, then enabled.
    #[must_use]
    pub fn is_feature_enabled(&self, name: &str) -> bool {
        self.optional_features
            .get(name)
            .copied()
            .or_else(|| {
                OPTIONAL_FEATURE_DEFAULTS
                    .iter()
                    .find(|(feature, _)| *feature == name)
                    .map(|(_, enabled)| *enabled)
            })
            .unwrap_or(true)
    }

    /// Whether a warning should be reported, enabled unless configured off
    #[must_use]
    pub fn is_warning_enabled(&self, name: &str) -> bool {
        self.warning_settings.get(name).copied().unwrap_or(true)
    }

    /// Record cap per type
    #[inline]
    #[must_use]
    pub fn max_instances_per_type(&self) -> usize {
        self.max_instances_per_type
    }

    /// Data record selection, `None` when no records are fetched
    #[inline]
    #[must_use]
    pub fn data_management(&self) -> Option<&DataManagement> {
        self.data_management.as_ref()
    }
}

impl Default for FetchProfile {
    fn default() -> Self {
        Self {
            optional_features: HashMap::new(),
            warning_settings: HashMap::new(),
            max_instances_per_type: DEFAULT_MAX_INSTANCES_PER_TYPE,
            data_management: None,
        }
    }
}
