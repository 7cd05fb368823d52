//! Trellis Deploy
//!
//! Change grouping, the external client port and the deploy routines for data
//! record groups.
//!
//! # Core Concepts
//!
//! - [`ChangeGroup`] / [`group_changes`]: Changes deployed as one transaction
//! - [`ExternalClient`]: Describe, batch deploy and query against the external system
//! - [`deploy_custom_object_instances_group`]: One batch call for one group
//! - [`deploy_add_approval_rule_and_condition`]: Three ordered batches breaking
//!   the rule/condition creation cycle
//! - [`DeployResult`]: Applied changes and per-change errors
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_deploy::{deploy_custom_object_instances_group, group_changes};
//! use trellis_reference::{LookupContext, ReferenceResolver};
//!
//! for group in group_changes(changes) {
//!     let (records, _) = group.clone().partition_instance_changes();
//!     let resolver = ReferenceResolver::new(LookupContext::for_group(&group.group_id, &records));
//!     let result = deploy_custom_object_instances_group(records, &client, &resolver).await;
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod approval;
mod batch;
mod client;
pub mod constants;
mod group;
mod result;
mod user_facing;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-exports
pub use approval::deploy_add_approval_rule_and_condition;
pub use batch::deploy_custom_object_instances_group;
pub use client::{ClientError, ExternalClient, FieldSchema, Record, TypeSchema};
pub use group::{
    change_group_id, group_changes, is_custom_object_instance, ChangeGroup,
    ADD_APPROVAL_RULE_AND_CONDITION_GROUP, METADATA_GROUP,
};
pub use result::DeployResult;
pub use user_facing::{
    message_for_code, user_facing_message, ERROR_HTTP_502, REQUEST_LIMIT_EXCEEDED,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for deploying change groups
    pub use crate::{
        deploy_add_approval_rule_and_condition, deploy_custom_object_instances_group, group_changes,
        ChangeGroup, ClientError, DeployResult, ExternalClient,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
