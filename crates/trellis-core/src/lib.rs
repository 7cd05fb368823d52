//! Trellis Core - adapter orchestration
//!
//! The adapter layer on top of the element, reference, deploy and validation
//! crates:
//! - Loads and validates the adapter configuration
//! - Fetches data record types and their records
//! - Runs the filter pipeline on fetch and around deploy
//! - Dispatches change groups to the matching deploy routine
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trellis_core::prelude::*;
//!
//! # async fn example(client: Arc<dyn ExternalClient>) -> Result<(), AdapterError> {
//! let config = AdapterConfig::from_toml_str(r#"
//!     [fetch.data]
//!     include_objects = ["^SBQQ__.*"]
//! "#)?;
//! let mut adapter = Adapter::new(client, config)?;
//!
//! let fetched = adapter.fetch().await?;
//! println!("fetched {} elements", fetched.elements.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod adapter;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod filters;
pub mod telemetry;

pub use adapter::{Adapter, DeployOutcome, FetchResult};
pub use config::{
    AdapterConfig, ClientConfig, DataConfig, DataManagement, DeployConfig, FetchConfig,
    FetchProfile,
};
pub use error::{AdapterError, ConfigError};
pub use filter::{
    ensure_safe_filter_fetch, FetchFilterOutput, FetchWarning, Filter, FilterContext, FilterRunner,
};
pub use filters::default_filters;
pub use telemetry::{init_tracing, LogFormat};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the adapter
    pub use crate::{
        Adapter, AdapterConfig, AdapterError, DeployOutcome, FetchResult, Filter, FilterRunner,
    };
    pub use trellis_deploy::{ChangeGroup, ExternalClient};
    pub use trellis_element::{Change, ChangeError, Element, ElemId, InstanceElement, Value};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
