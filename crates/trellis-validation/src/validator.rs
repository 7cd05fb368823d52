//! Validator trait and pipeline

use std::sync::Arc;

use tracing::debug;
use trellis_element::{Change, ChangeError, ChangeId, Severity};

/// Inspects a set of changes before deployment
///
/// Validators are pure: the same changes always yield the same findings, and
/// no validator observes another's output.
pub trait ChangeValidator: Send + Sync {
    /// Validator name, for logs
    fn name(&self) -> &'static str;

    /// Findings for `changes`
    fn validate(&self, changes: &[Change]) -> Vec<ChangeError>;
}

/// Ordered list of validators
#[derive(Clone, Default)]
pub struct ValidatorPipeline {
    validators: Vec<Arc<dyn ChangeValidator>>,
}

impl ValidatorPipeline {
    /// Empty pipeline
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator (builder)
    #[must_use]
    pub fn with_validator(mut self, validator: impl ChangeValidator + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Append a validator
    pub fn push(&mut self, validator: Arc<dyn ChangeValidator>) {
        self.validators.push(validator);
    }

    /// Number of validators
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the pipeline has no validators
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Names of the validators, in run order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator, concatenating findings in validator order
    #[must_use]
    pub fn validate(&self, changes: &[Change]) -> Vec<ChangeError> {
        self.validators
            .iter()
            .flat_map(|validator| {
                let findings = validator.validate(changes);
                debug!(
                    validator = validator.name(),
                    findings = findings.len(),
                    "validator finished"
                );
                findings
            })
            .collect()
    }
}

impl std::fmt::Debug for ValidatorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorPipeline")
            .field("validators", &self.names())
            .finish()
    }
}

/// Split changes into deployable and blocked
///
/// A change is blocked by an `Error` finding about its own element or about
/// anything nested in it. Warnings never block.
#[must_use]
pub fn partition_deployable(
    changes: Vec<Change>,
    findings: &[ChangeError],
) -> (Vec<Change>, Vec<Change>) {
    let blocking: Vec<_> = findings
        .iter()
        .filter(|finding| finding.severity == Severity::Error)
        .map(|finding| &finding.elem_id)
        .collect();
    changes.into_iter().partition(|change| {
        let id = change.change_id();
        !blocking
            .iter()
            .any(|blocked| *blocked == id || id.is_parent_of(blocked))
    })
}
