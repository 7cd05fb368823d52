//! External system client port
//!
//! The engine never talks to an external API directly. Everything goes through
//! [`ExternalClient`], implemented by the per-platform wire clients.

use std::any::Any;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use trellis_element::{Change, InstanceElement};

use crate::result::DeployResult;
use crate::user_facing::{ERROR_HTTP_502, REQUEST_LIMIT_EXCEEDED};

/// A raw record as returned by a query
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Field description returned by [`ExternalClient::describe_type`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    /// Field API name
    pub name: String,
    /// External field type, e.g. `string`, `double`, `reference`
    #[serde(rename = "type")]
    pub field_type: String,
    /// Settable on create
    #[serde(default)]
    pub createable: bool,
    /// Settable on update
    #[serde(default)]
    pub updateable: bool,
    /// Set when this field is a component of a compound field
    #[serde(default)]
    pub compound_field_name: Option<String>,
    /// Types a reference field points at
    #[serde(default)]
    pub reference_to: Vec<String>,
}

impl FieldSchema {
    /// Field with a name and type, neither creatable nor updateable
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            createable: false,
            updateable: false,
            compound_field_name: None,
            reference_to: Vec::new(),
        }
    }

    /// Mark creatable and updateable (builder)
    #[inline]
    #[must_use]
    pub fn editable(mut self) -> Self {
        self.createable = true;
        self.updateable = true;
        self
    }

    /// Point a reference field at types (builder)
    #[inline]
    #[must_use]
    pub fn with_reference_to(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reference_to = types.into_iter().map(Into::into).collect();
        self
    }
}

/// Type description returned by [`ExternalClient::describe_type`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    /// Type API name
    pub name: String,
    /// Fields
    pub fields: Vec<FieldSchema>,
}

/// Errors raised by an [`ExternalClient`]
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The external API rejected the request
    #[error("request failed with {code}: {message}")]
    Api {
        /// External error code
        code: String,
        /// External error message
        message: String,
    },

    /// The request did not complete in time
    #[error("request timed out after {duration_secs}s")]
    Timeout {
        /// Elapsed time
        duration_secs: u64,
    },

    /// The type does not exist in the external system
    #[error("unknown type {0}")]
    UnknownType(String),

    /// The client failed in an unexpected way
    #[error("unexpected client failure: {0}")]
    Unexpected(String),

    /// Transport or other failures
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClientError {
    /// Create an API error
    #[inline]
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    /// External error code, if any
    #[inline]
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether retrying later may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Api { code, .. } => code == ERROR_HTTP_502 || code == REQUEST_LIMIT_EXCEEDED,
            _ => false,
        }
    }

    /// Normalize a panic payload from a client call
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "client panicked with a non-string payload".to_string());
        Self::Unexpected(message)
    }
}

/// Port to the external system
#[async_trait]
pub trait ExternalClient: Send + Sync {
    /// Names of the record types the external system exposes
    async fn list_types(&self) -> Result<Vec<String>, ClientError> {
        Ok(Vec::new())
    }

    /// Describe a record type
    async fn describe_type(&self, name: &str) -> Result<TypeSchema, ClientError>;

    /// Deploy a batch of record changes in one call
    ///
    /// Per-record failures are reported in the result; `Err` means the whole
    /// batch failed.
    async fn deploy_batch(
        &self,
        records: Vec<Change<InstanceElement>>,
    ) -> Result<DeployResult, ClientError>;

    /// Run a query, yielding records lazily
    ///
    /// The stream is finite and cannot be restarted.
    fn query_all<'a>(&'a self, query: &'a str) -> BoxStream<'a, Result<Record, ClientError>>;
}
