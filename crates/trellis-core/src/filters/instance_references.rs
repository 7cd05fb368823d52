//! Lookup fields to references
//!
//! Reads: the `referenceTo` annotation of data record fields and the `Id` of
//! every fetched record. Writes: lookup values whose id matches a fetched
//! record of one of the referenced types become references to that record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trellis_deploy::is_custom_object_instance;
use trellis_element::{annotations, Element, Field, ReferenceExpression, Value};
use trellis_reference::ID_FIELD;

use crate::error::AdapterError;
use crate::filter::{FetchFilterOutput, Filter, FilterContext};

/// Warning setting controlling the missing reference warning
pub const MISSING_REFERENCES_WARNING: &str = "missingReferences";

fn reference_targets(field: &Field) -> Vec<&str> {
    field
        .annotations()
        .get(annotations::REFERENCE_TO)
        .and_then(Value::as_sequence)
        .map(|types| types.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Replaces lookup ids with references to the fetched records
#[derive(Debug, Clone, Copy, Default)]
pub struct InstanceReferencesFilter;

#[async_trait]
impl Filter for InstanceReferencesFilter {
    fn name(&self) -> &'static str {
        "instanceReferences"
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        let records: HashMap<(String, String), Arc<Element>> = elements
            .iter()
            .filter_map(Element::as_instance)
            .filter(|instance| is_custom_object_instance(instance))
            .filter_map(|instance| {
                let id = instance.get(ID_FIELD)?.as_str()?;
                let key = (instance.type_name().to_string(), id.to_string());
                Some((key, Arc::new(Element::Instance(instance.clone()))))
            })
            .collect();
        if records.is_empty() {
            return Ok(FetchFilterOutput::empty());
        }
        let fetched_types: HashSet<&str> =
            records.keys().map(|(type_name, _)| type_name.as_str()).collect();

        let mut created = 0_usize;
        let mut missing = 0_usize;
        for instance in elements
            .iter_mut()
            .filter_map(Element::as_instance_mut)
            .filter(|instance| is_custom_object_instance(instance))
        {
            let ty = Arc::clone(instance.ref_type());
            for field in ty.fields().values() {
                let targets = reference_targets(field);
                if targets.is_empty() {
                    continue;
                }
                let Some(id) = instance
                    .get(field.name())
                    .and_then(Value::as_str)
                    .map(str::to_string)
                else {
                    continue;
                };
                let target = targets
                    .iter()
                    .find_map(|type_name| records.get(&((*type_name).to_string(), id.clone())));
                match target {
                    Some(target) => {
                        instance.set_value(
                            field.name(),
                            ReferenceExpression::to_element(Arc::clone(target)),
                        );
                        created += 1;
                    }
                    None if targets.iter().any(|type_name| fetched_types.contains(type_name)) => {
                        debug!(
                            instance = %instance.elem_id(),
                            field = field.name(),
                            id = %id,
                            "lookup target was not fetched"
                        );
                        missing += 1;
                    }
                    None => {}
                }
            }
        }
        debug!(created, missing, "created lookup references");

        if missing > 0 && context.fetch_profile.is_warning_enabled(MISSING_REFERENCES_WARNING) {
            return Ok(FetchFilterOutput::warning(format!(
                "{missing} lookup values point at records that were not fetched and are kept as ids"
            )));
        }
        Ok(FetchFilterOutput::empty())
    }
}
