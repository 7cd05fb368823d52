//! Warns about record values the external system will ignore

use trellis_deploy::is_custom_object_instance;
use trellis_element::{annotations, Change, ChangeError, Element, InstanceElement};
use trellis_reference::{LookupContext, ReferenceResolver, UnresolvedPolicy};

use crate::validator::ChangeValidator;

/// Flags non-creatable fields set on additions and non-updateable fields
/// changed by modifications of data records
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomObjectInstancesValidator;

impl CustomObjectInstancesValidator {
    fn resolved(instance: &InstanceElement) -> InstanceElement {
        ReferenceResolver::new(LookupContext::standalone())
            .with_policy(UnresolvedPolicy::KeepReference)
            .resolve_instance(instance)
    }

    fn update_errors(before: &InstanceElement, after: &InstanceElement) -> Vec<ChangeError> {
        let before = Self::resolved(before);
        let after = Self::resolved(after);
        after
            .ref_type()
            .fields()
            .values()
            .filter(|field| !field.flag(annotations::UPDATEABLE))
            .filter(|field| after.get(field.name()) != before.get(field.name()))
            .map(|field| {
                ChangeError::warning(
                    before.elem_id().clone(),
                    "Cannot modify the value of a non-updatable field",
                    format!(
                        "Cannot modify {}'s value of {} because its field is defined as \
                         non-updateable.",
                        field.name(),
                        before.elem_id()
                    ),
                )
            })
            .collect()
    }

    fn create_errors(after: &InstanceElement) -> Vec<ChangeError> {
        let after = Self::resolved(after);
        after
            .ref_type()
            .fields()
            .values()
            .filter(|field| !field.flag(annotations::CREATABLE))
            .filter(|field| after.get(field.name()).is_some())
            .map(|field| {
                ChangeError::warning(
                    after.elem_id().clone(),
                    "Cannot set a value to a non-creatable field",
                    format!(
                        "Cannot set a value for {} of {} because its field is defined as \
                         non-creatable.",
                        field.name(),
                        after.elem_id()
                    ),
                )
            })
            .collect()
    }
}

impl ChangeValidator for CustomObjectInstancesValidator {
    fn name(&self) -> &'static str {
        "custom_object_instances"
    }

    fn validate(&self, changes: &[Change]) -> Vec<ChangeError> {
        let updates = changes.iter().filter_map(|change| match change {
            Change::Modification {
                before: Element::Instance(before),
                after: Element::Instance(after),
            } if is_custom_object_instance(after) => Some(Self::update_errors(before, after)),
            _ => None,
        });
        let creates = changes.iter().filter_map(|change| match change {
            Change::Addition {
                after: Element::Instance(after),
            } if is_custom_object_instance(after) => Some(Self::create_errors(after)),
            _ => None,
        });
        updates.chain(creates).flatten().collect()
    }
}
