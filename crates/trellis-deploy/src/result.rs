//! Deploy results

use std::collections::HashSet;

use trellis_element::{Change, ChangeError, ChangeId, ElemId, InstanceElement};

use crate::client::ClientError;
use crate::user_facing::user_facing_message;

/// Outcome of deploying some changes
///
/// Changes that are neither applied nor mentioned by an error were not
/// attempted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeployResult {
    /// Changes the external system accepted
    pub applied_changes: Vec<Change<InstanceElement>>,
    /// Per-change failures
    pub errors: Vec<ChangeError>,
}

impl DeployResult {
    /// Empty result
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Result failing every change with the same client error
    #[must_use]
    pub fn failed<'a>(
        changes: impl IntoIterator<Item = &'a Change<InstanceElement>>,
        error: &ClientError,
    ) -> Self {
        let message = user_facing_message(error);
        Self {
            applied_changes: Vec::new(),
            errors: changes
                .into_iter()
                .map(|change| {
                    ChangeError::error(
                        change.change_id().clone(),
                        message.clone(),
                        error.to_string(),
                    )
                })
                .collect(),
        }
    }

    /// Append another result
    pub fn extend(&mut self, other: Self) {
        self.applied_changes.extend(other.applied_changes);
        self.errors.extend(other.errors);
    }

    /// Ids of applied changes
    #[must_use]
    pub fn applied_ids(&self) -> HashSet<ElemId> {
        self.applied_changes.iter().map(|c| c.change_id().clone()).collect()
    }

    /// Whether any change failed
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}
