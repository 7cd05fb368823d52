//! Rejects data record changes the deploy configuration does not allow

use indexmap::IndexMap;
use trellis_deploy::is_custom_object_instance;
use trellis_element::{ActionName, Change, ChangeError, ChangeId, Element};

use crate::validator::ChangeValidator;

/// Allows data record changes only for configured types and actions
#[derive(Debug, Clone, Default)]
pub struct DeploySupportValidator {
    supported: IndexMap<String, Vec<ActionName>>,
}

impl DeploySupportValidator {
    /// Validator with no deployable types
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `actions` on instances of `type_name` (builder)
    #[must_use]
    pub fn with_type(
        mut self,
        type_name: impl Into<String>,
        actions: impl IntoIterator<Item = ActionName>,
    ) -> Self {
        self.supported
            .entry(type_name.into())
            .or_default()
            .extend(actions);
        self
    }

    /// Whether `action` is allowed on `type_name`
    #[must_use]
    pub fn is_supported(&self, type_name: &str, action: ActionName) -> bool {
        self.supported
            .get(type_name)
            .is_some_and(|actions| actions.contains(&action))
    }
}

impl ChangeValidator for DeploySupportValidator {
    fn name(&self) -> &'static str {
        "deploy_support"
    }

    fn validate(&self, changes: &[Change]) -> Vec<ChangeError> {
        changes
            .iter()
            .filter_map(|change| {
                let Element::Instance(instance) = change.data() else {
                    return None;
                };
                if !is_custom_object_instance(instance) {
                    return None;
                }
                let type_name = instance.type_name();
                let action = change.action();
                if !self.supported.contains_key(type_name) {
                    return Some(ChangeError::error(
                        change.change_id().clone(),
                        format!("Deployment of {type_name} instances is not supported"),
                        format!(
                            "{type_name} is not listed as a deployable type in the deploy \
                             configuration"
                        ),
                    ));
                }
                (!self.is_supported(type_name, action)).then(|| {
                    ChangeError::error(
                        change.change_id().clone(),
                        format!("Cannot {action} {type_name} instances"),
                        format!(
                            "The deploy configuration does not enable {action} for {type_name}"
                        ),
                    )
                })
            })
            .collect()
    }
}
