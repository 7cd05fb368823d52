//! Adapter orchestration
//!
//! # Overview
//!
//! [`Adapter`] ties the pieces together:
//!
//! - **fetch**: describe and query data record types, then run the fetch filters
//! - **deploy**: validate a change group, run the pre-deploy filters, dispatch
//!   the group to the matching deploy routine, then run the on-deploy filters
//!
//! Approval rule and condition additions go through the dependency-ordered
//! deploy; other data record groups go out as one batch. Metadata changes are
//! reported as unsupported.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};
use trellis_deploy::{
    deploy_add_approval_rule_and_condition, deploy_custom_object_instances_group, group_changes,
    is_custom_object_instance, ChangeGroup, DeployResult, ExternalClient,
    ADD_APPROVAL_RULE_AND_CONDITION_GROUP,
};
use trellis_element::{
    Change, ChangeError, ChangeId, Element, ElementGraph, ElementSource, InstanceElement,
};
use trellis_reference::{
    FixElementsResult, ListFieldWeakReferences, LookupContext, ReferenceResolver,
    WeakReferenceHandler,
};
use trellis_validation::{
    default_validators, partition_deployable, DeploySupportValidator, ValidatorPipeline,
};
use ulid::Ulid;

use crate::config::{AdapterConfig, FetchProfile};
use crate::constants::ISSUE_TYPE_SCHEME;
use crate::error::AdapterError;
use crate::fetch::fetch_data;
use crate::filter::{FetchWarning, FilterContext, FilterRunner};
use crate::filters::default_filters;

/// Result of [`Adapter::fetch`]
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Fetched elements, after every fetch filter
    pub elements: Vec<Element>,
    /// Non-fatal problems
    pub warnings: Vec<FetchWarning>,
}

/// Result of [`Adapter::deploy`]
#[derive(Debug, Clone, Default)]
pub struct DeployOutcome {
    /// Changes the external system accepted, in workspace shape
    pub applied_changes: Vec<Change>,
    /// Validation findings and deploy failures
    pub errors: Vec<ChangeError>,
}

impl DeployOutcome {
    /// Whether any finding is blocking
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(ChangeError::is_blocking)
    }

    fn extend(&mut self, other: Self) {
        self.applied_changes.extend(other.applied_changes);
        self.errors.extend(other.errors);
    }
}

/// Validators for a configuration
fn validators_for(config: &AdapterConfig) -> ValidatorPipeline {
    let pipeline = default_validators();
    if config.deploy.types.is_empty() {
        return pipeline;
    }
    let deploy_support = config
        .deploy
        .types
        .iter()
        .fold(DeploySupportValidator::new(), |validator, (type_name, actions)| {
            validator.with_type(type_name.clone(), actions.iter().copied())
        });
    pipeline.with_validator(deploy_support)
}

/// Handlers for references a deploy can drop when their target is missing
fn default_weak_reference_handlers() -> Vec<Arc<dyn WeakReferenceHandler>> {
    vec![Arc::new(ListFieldWeakReferences::new(ISSUE_TYPE_SCHEME, "issueTypes"))]
}

fn unsupported(change: &Change) -> ChangeError {
    let id = change.change_id().clone();
    let detailed = format!("Cannot {} {}: only data records can be deployed", change.action(), id);
    ChangeError::error(id, "Deployment of this element is not supported", detailed)
}

/// Fetch and deploy against one external system
pub struct Adapter {
    client: Arc<dyn ExternalClient>,
    config: AdapterConfig,
    fetch_profile: FetchProfile,
    element_source: Arc<dyn ElementSource>,
    filters: FilterRunner,
    validators: ValidatorPipeline,
    weak_references: Vec<Arc<dyn WeakReferenceHandler>>,
}

impl Adapter {
    /// Adapter with the built-in filters and validators
    ///
    /// # Errors
    /// `AdapterError::Config` when the configuration is invalid.
    pub fn new(
        client: Arc<dyn ExternalClient>,
        config: AdapterConfig,
    ) -> Result<Self, AdapterError> {
        config.validate()?;
        let fetch_profile = FetchProfile::from_config(&config.fetch)?;
        let filters = default_filters(Arc::clone(&client), &config);
        let validators = validators_for(&config);
        debug!(filters = ?filters.names(), validators = ?validators.names(), "adapter created");
        Ok(Self {
            client,
            config,
            fetch_profile,
            element_source: Arc::new(ElementGraph::new()),
            filters,
            validators,
            weak_references: default_weak_reference_handlers(),
        })
    }

    /// Use the elements of a previous fetch (builder)
    #[must_use]
    pub fn with_element_source(mut self, element_source: Arc<dyn ElementSource>) -> Self {
        self.element_source = element_source;
        self
    }

    /// Replace the filter pipeline (builder)
    #[must_use]
    pub fn with_filters(mut self, filters: FilterRunner) -> Self {
        self.filters = filters;
        self
    }

    /// Replace the validators (builder)
    #[must_use]
    pub fn with_validators(mut self, validators: ValidatorPipeline) -> Self {
        self.validators = validators;
        self
    }

    /// Add a weak reference handler (builder)
    #[must_use]
    pub fn with_weak_reference_handler(mut self, handler: Arc<dyn WeakReferenceHandler>) -> Self {
        self.weak_references.push(handler);
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Compiled fetch settings
    #[inline]
    #[must_use]
    pub fn fetch_profile(&self) -> &FetchProfile {
        &self.fetch_profile
    }

    /// Fetch data record types, their records, and whatever the filters add
    ///
    /// # Errors
    /// Client failures outside one type, filter failures, and duplicate
    /// element ids.
    pub async fn fetch(&mut self) -> Result<FetchResult, AdapterError> {
        let span = info_span!("fetch", session = %Ulid::new());
        self.fetch_inner().instrument(span).await
    }

    async fn fetch_inner(&mut self) -> Result<FetchResult, AdapterError> {
        let data = fetch_data(
            self.client.as_ref(),
            &self.fetch_profile,
            self.config.client.max_concurrent_describe,
        )
        .await?;
        let mut elements = data.elements;
        let mut warnings = data.warnings;

        let context = FilterContext {
            config: &self.config,
            fetch_profile: &self.fetch_profile,
            element_source: self.element_source.as_ref(),
        };
        warnings.extend(self.filters.on_fetch(&mut elements, &context).await?);

        let graph = ElementGraph::from_elements(elements)?;
        let elements = graph.into_elements();
        info!(elements = elements.len(), warnings = warnings.len(), "fetch finished");
        Ok(FetchResult { elements, warnings })
    }

    /// Strip weak references whose target is missing from the element source
    ///
    /// Returns the rewritten elements and one warning per element. Elements
    /// touched by several handlers are rewritten by each in turn.
    #[must_use]
    pub fn fix_elements(&self, elements: &[Element]) -> FixElementsResult {
        let mut current: Vec<Element> = elements.to_vec();
        let mut result = FixElementsResult::default();
        for handler in &self.weak_references {
            let fixed = handler.remove_weak_references(&current, self.element_source.as_ref());
            for element in &fixed.fixed_elements {
                if let Some(slot) = current.iter_mut().find(|e| e.elem_id() == element.elem_id()) {
                    *slot = element.clone();
                }
            }
            result.errors.extend(fixed.errors);
            for element in fixed.fixed_elements {
                match result
                    .fixed_elements
                    .iter_mut()
                    .find(|e| e.elem_id() == element.elem_id())
                {
                    Some(slot) => *slot = element,
                    None => result.fixed_elements.push(element),
                }
            }
        }
        if !result.fixed_elements.is_empty() {
            info!(fixed = result.fixed_elements.len(), "removed references to missing elements");
        }
        result
    }

    /// Deploy one change group
    ///
    /// Per-change problems are reported in the outcome, never as `Err`.
    ///
    /// # Errors
    /// Filter failures.
    pub async fn deploy(&mut self, group: ChangeGroup) -> Result<DeployOutcome, AdapterError> {
        let span = info_span!("deploy", session = %Ulid::new(), group = %group.group_id);
        self.deploy_inner(group).instrument(span).await
    }

    /// Group changes and deploy every group in turn
    ///
    /// # Errors
    /// The first filter failure; later groups are not deployed.
    pub async fn deploy_changes(
        &mut self,
        changes: Vec<Change>,
    ) -> Result<DeployOutcome, AdapterError> {
        let mut outcome = DeployOutcome::default();
        for group in group_changes(changes) {
            outcome.extend(self.deploy(group).await?);
        }
        Ok(outcome)
    }

    async fn deploy_inner(&mut self, group: ChangeGroup) -> Result<DeployOutcome, AdapterError> {
        let ChangeGroup { group_id, changes } = group;
        let mut errors = self.validators.validate(&changes);
        let (mut deployable, blocked) = partition_deployable(changes, &errors);
        if !blocked.is_empty() {
            warn!(blocked = blocked.len(), "validation blocked changes");
        }
        if deployable.is_empty() {
            debug!("nothing left to deploy");
            return Ok(DeployOutcome {
                applied_changes: Vec::new(),
                errors,
            });
        }

        let context = FilterContext {
            config: &self.config,
            fetch_profile: &self.fetch_profile,
            element_source: self.element_source.as_ref(),
        };
        self.filters.pre_deploy(&mut deployable, &context).await?;

        let (instances, others) =
            ChangeGroup::new(group_id.clone(), deployable).partition_instance_changes();
        let (records, metadata): (Vec<Change<InstanceElement>>, Vec<Change<InstanceElement>>) =
            instances.into_iter().partition(|change| is_custom_object_instance(change.data()));
        errors.extend(others.iter().map(unsupported));
        errors.extend(
            metadata
                .into_iter()
                .map(|change| unsupported(&change.map_data(Element::Instance))),
        );

        let result = if records.is_empty() {
            DeployResult::new()
        } else {
            let lookup = LookupContext::for_group(group_id.as_str(), &records)
                .with_element_source(self.element_source.as_ref());
            let resolver = ReferenceResolver::new(lookup);
            if group_id == ADD_APPROVAL_RULE_AND_CONDITION_GROUP {
                deploy_add_approval_rule_and_condition(records, self.client.as_ref(), &resolver)
                    .await
            } else {
                deploy_custom_object_instances_group(records, self.client.as_ref(), &resolver)
                    .await
            }
        };
        errors.extend(result.errors);

        let mut applied_changes: Vec<Change> = result
            .applied_changes
            .into_iter()
            .map(|change| change.map_data(Element::Instance))
            .collect();
        self.filters.on_deploy(&mut applied_changes, &context).await?;

        info!(
            applied = applied_changes.len(),
            errors = errors.len(),
            "deploy finished"
        );
        Ok(DeployOutcome {
            applied_changes,
            errors,
        })
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("config", &self.config)
            .field("filters", &self.filters)
            .field("validators", &self.validators)
            .field("weak_references", &self.weak_references.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_element::{ActionName, ElemId, ReferenceExpression, Value};
    use trellis_test_utils::{instance, metadata_type, MockClient};

    #[test]
    fn deploy_support_only_when_configured() {
        let plain = validators_for(&AdapterConfig::default());
        assert!(!plain.names().contains(&"deploy_support"));

        let mut config = AdapterConfig::default();
        config.deploy.types.insert("Product2".to_string(), vec![ActionName::Add]);
        assert!(validators_for(&config).names().contains(&"deploy_support"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AdapterConfig::default();
        config.client.max_concurrent_describe = 0;
        let err = Adapter::new(Arc::new(MockClient::new()), config).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
    }

    #[test]
    fn fix_elements_drops_missing_issue_types() {
        let issue_type = metadata_type("IssueType");
        let bug = instance(&issue_type, "Bug", json!({ "name": "Bug" }));
        let source = ElementGraph::from_elements([Element::Instance(bug.clone())]).unwrap();
        let adapter = Adapter::new(Arc::new(MockClient::new()), AdapterConfig::default())
            .unwrap()
            .with_element_source(Arc::new(source));

        let mut scheme = instance(&metadata_type(ISSUE_TYPE_SCHEME), "Default", json!({}));
        scheme.set_value(
            "issueTypes",
            vec![
                Value::Reference(ReferenceExpression::new(bug.elem_id().clone())),
                Value::Reference(ReferenceExpression::new(ElemId::instance(
                    "salesforce",
                    "IssueType",
                    "Gone",
                ))),
            ],
        );
        let result = adapter.fix_elements(&[Element::Instance(scheme.clone())]);

        assert_eq!(result.fixed_elements.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert!(!result.errors[0].is_blocking());
        let kept = result.fixed_elements[0]
            .as_instance()
            .and_then(|i| i.get("issueTypes"))
            .and_then(Value::as_sequence)
            .map(<[Value]>::len);
        assert_eq!(kept, Some(1));
    }

    #[test]
    fn fix_elements_leaves_complete_elements() {
        let adapter = Adapter::new(Arc::new(MockClient::new()), AdapterConfig::default()).unwrap();
        let scheme = instance(
            &metadata_type(ISSUE_TYPE_SCHEME),
            "Empty",
            json!({ "issueTypes": [] }),
        );
        let result = adapter.fix_elements(&[Element::Instance(scheme)]);
        assert!(result.fixed_elements.is_empty());
        assert!(result.errors.is_empty());
    }
}
