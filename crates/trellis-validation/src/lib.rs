//! Trellis Change Validation
//!
//! Validators inspect the changes of a deploy before anything is sent. Their
//! findings are concatenated; `Error` findings block only the change they name.
//!
//! # Example
//!
//! ```rust
//! use trellis_validation::{default_validators, partition_deployable};
//!
//! let pipeline = default_validators();
//! let findings = pipeline.validate(&[]);
//! let (deployable, blocked) = partition_deployable(Vec::new(), &findings);
//! assert!(deployable.is_empty() && blocked.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod validator;
pub mod validators;

pub use validator::{partition_deployable, ChangeValidator, ValidatorPipeline};
pub use validators::{
    CustomObjectInstancesValidator, DataCategoryGroupValidator, DeploySupportValidator,
    PackageValidator,
};

/// Pipeline with every validator that needs no configuration
#[must_use]
pub fn default_validators() -> ValidatorPipeline {
    ValidatorPipeline::new()
        .with_validator(PackageValidator)
        .with_validator(CustomObjectInstancesValidator)
        .with_validator(DataCategoryGroupValidator)
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
