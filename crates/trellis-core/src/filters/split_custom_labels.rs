//! Custom labels as separate instances
//!
//! The external system keeps every custom label in one `CustomLabels`
//! instance. On fetch it is split into one `CustomLabel` instance per label;
//! before deploy the label changes are merged back into a single `CustomLabels`
//! modification, and after deploy the label changes are put back.
//!
//! Reads: the `labels` field of the `CustomLabels` instance, the `CustomLabel`
//! type and the `CustomLabels` type from the element source. Writes: the
//! element list and the change list.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trellis_element::{Change, Element, ElemId, InstanceElement, ObjectType, Value, Values};
use trellis_reference::FULL_NAME_FIELD;

use crate::constants::{
    CUSTOM_LABELS_METADATA_TYPE, CUSTOM_LABEL_METADATA_TYPE, LABELS_FIELD, RECORDS_PATH, SALESFORCE,
};
use crate::error::AdapterError;
use crate::filter::{FetchFilterOutput, Filter, FilterContext};

const FILTER_NAME: &str = "splitCustomLabels";

fn is_instance_of(element: &Element, type_name: &str) -> bool {
    element.as_instance().is_some_and(|instance| instance.type_name() == type_name)
}

fn split_labels(container: &InstanceElement, label_type: &Arc<ObjectType>) -> Vec<InstanceElement> {
    container
        .get(LABELS_FIELD)
        .and_then(Value::as_sequence)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_mapping)
        .filter_map(|label| {
            let full_name = label.get(FULL_NAME_FIELD)?.as_str()?.to_string();
            let path = vec![
                SALESFORCE.to_string(),
                RECORDS_PATH.to_string(),
                CUSTOM_LABEL_METADATA_TYPE.to_string(),
                full_name.clone(),
            ];
            Some(
                InstanceElement::new(full_name, Arc::clone(label_type), label.clone())
                    .with_path(path),
            )
        })
        .collect()
}

fn labels_container(labels_type: &Arc<ObjectType>, labels: Vec<Value>) -> InstanceElement {
    let mut values = Values::new();
    values.insert(FULL_NAME_FIELD.to_string(), Value::string(CUSTOM_LABELS_METADATA_TYPE));
    values.insert(LABELS_FIELD.to_string(), Value::Sequence(labels));
    InstanceElement::new(CUSTOM_LABELS_METADATA_TYPE, Arc::clone(labels_type), values)
}

fn label_values<'a>(states: impl Iterator<Item = &'a Element>) -> Vec<Value> {
    states
        .filter_map(Element::as_instance)
        .map(|label| Value::Mapping(label.value().clone()))
        .collect()
}

/// Splits the labels container on fetch and merges label changes on deploy
#[derive(Debug, Default)]
pub struct SplitCustomLabelsFilter {
    label_changes: Vec<Change>,
}

impl SplitCustomLabelsFilter {
    /// Filter with no saved label changes
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Filter for SplitCustomLabelsFilter {
    fn name(&self) -> &'static str {
        FILTER_NAME
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        _context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        let Some(container) = elements
            .iter()
            .find(|element| is_instance_of(element, CUSTOM_LABELS_METADATA_TYPE))
            .and_then(Element::as_instance)
        else {
            debug!("no CustomLabels instance, skipping");
            return Ok(FetchFilterOutput::empty());
        };
        let Some(label_type) = elements
            .iter()
            .filter_map(Element::as_object_type)
            .find(|ty| ty.elem_id().type_name() == CUSTOM_LABEL_METADATA_TYPE)
        else {
            debug!("no CustomLabel type, skipping");
            return Ok(FetchFilterOutput::empty());
        };

        let labels = split_labels(container, &Arc::new(label_type.clone()));
        debug!(labels = labels.len(), "split custom labels");
        elements.retain(|element| !is_instance_of(element, CUSTOM_LABELS_METADATA_TYPE));
        elements.extend(labels.into_iter().map(Element::Instance));
        Ok(FetchFilterOutput::empty())
    }

    async fn pre_deploy(
        &mut self,
        changes: &mut Vec<Change>,
        context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        let (label_changes, others): (Vec<Change>, Vec<Change>) = std::mem::take(changes)
            .into_iter()
            .partition(|change| is_instance_of(change.data(), CUSTOM_LABEL_METADATA_TYPE));
        *changes = others;
        if label_changes.is_empty() {
            return Ok(());
        }

        let labels_type = context
            .element_source
            .get(&ElemId::new_type(SALESFORCE, CUSTOM_LABELS_METADATA_TYPE))
            .and_then(|element| element.as_object_type().cloned())
            .ok_or_else(|| {
                AdapterError::filter(
                    FILTER_NAME,
                    "CustomLabels type is missing from the element source",
                )
            })?;
        let labels_type = Arc::new(labels_type);

        let before = labels_container(
            &labels_type,
            label_values(label_changes.iter().filter_map(Change::before)),
        );
        let after = labels_container(
            &labels_type,
            label_values(label_changes.iter().filter_map(Change::after)),
        );
        debug!(labels = label_changes.len(), "merged custom label changes");
        changes.push(Change::Modification {
            before: Element::Instance(before),
            after: Element::Instance(after),
        });
        self.label_changes = label_changes;
        Ok(())
    }

    async fn on_deploy(
        &mut self,
        changes: &mut Vec<Change>,
        _context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        let label_changes = std::mem::take(&mut self.label_changes);
        let before = changes.len();
        changes.retain(|change| !is_instance_of(change.data(), CUSTOM_LABELS_METADATA_TYPE));
        if changes.len() < before {
            changes.extend(label_changes);
        }
        Ok(())
    }
}
