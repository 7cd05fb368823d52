//! Built-in filters
//!
//! Each filter documents the fields it reads and writes. [`default_filters`]
//! registers them in the order fetch needs: tooling types first, reference
//! building next, the change-time singleton last so it sees every element.

mod changed_at_singleton;
mod fetch_tooling_types;
mod installed_package_elements;
mod instance_references;
mod issue_type_scheme_references;
mod rules_and_conditions;
mod split_custom_labels;

use std::sync::Arc;

use trellis_deploy::ExternalClient;

pub use changed_at_singleton::ChangedAtSingletonFilter;
pub use fetch_tooling_types::{FetchToolingTypesFilter, TOOLING_DESCRIBE_WARNING};
pub use installed_package_elements::InstalledPackageElementsFilter;
pub use instance_references::{InstanceReferencesFilter, MISSING_REFERENCES_WARNING};
pub use issue_type_scheme_references::IssueTypeSchemeReferencesFilter;
pub use rules_and_conditions::{
    RuleAndConditionDef, RulesAndConditionsFilter, RULES_AND_CONDITIONS_FEATURE,
};
pub use split_custom_labels::SplitCustomLabelsFilter;

use crate::config::AdapterConfig;
use crate::filter::FilterRunner;

/// The built-in pipeline
#[must_use]
pub fn default_filters(client: Arc<dyn ExternalClient>, config: &AdapterConfig) -> FilterRunner {
    FilterRunner::new()
        .with_filter(FetchToolingTypesFilter::new(client, config.client.max_concurrent_describe))
        .with_filter(InstanceReferencesFilter)
        .with_filter(RulesAndConditionsFilter::new())
        .with_filter(SplitCustomLabelsFilter::new())
        .with_filter(InstalledPackageElementsFilter)
        .with_filter(IssueTypeSchemeReferencesFilter)
        .with_filter(ChangedAtSingletonFilter)
}

#[cfg(test)]
pub(crate) struct TestContext {
    pub(crate) config: AdapterConfig,
    pub(crate) profile: crate::config::FetchProfile,
    pub(crate) source: trellis_element::ElementGraph,
}

#[cfg(test)]
impl TestContext {
    pub(crate) fn new() -> Self {
        Self::with_config(AdapterConfig::default())
    }

    pub(crate) fn with_config(config: AdapterConfig) -> Self {
        let profile = crate::config::FetchProfile::from_config(&config.fetch).unwrap();
        Self {
            config,
            profile,
            source: trellis_element::ElementGraph::new(),
        }
    }

    pub(crate) fn with_source(mut self, elements: Vec<trellis_element::Element>) -> Self {
        self.source = trellis_element::ElementGraph::from_elements(elements).unwrap();
        self
    }

    pub(crate) fn context(&self) -> crate::filter::FilterContext<'_> {
        crate::filter::FilterContext {
            config: &self.config,
            fetch_profile: &self.profile,
            element_source: &self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_test_utils::MockClient;

    #[test]
    fn default_order() {
        let runner = default_filters(Arc::new(MockClient::new()), &AdapterConfig::default());
        assert_eq!(
            runner.names(),
            vec![
                "fetchToolingTypes",
                "instanceReferences",
                "cpqRulesAndConditions",
                "splitCustomLabels",
                "installedPackageElements",
                "issueTypeSchemeReferences",
                "changedAtSingleton",
            ]
        );
    }
}
