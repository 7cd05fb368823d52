//! Last change time of every element
//!
//! Reads: the `_changed_at` annotation of fetched elements and the singleton of
//! the previous fetch. Writes: the `ChangedAtSingleton` instance, a mapping of
//! type name to element name to change time, and its type.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use tracing::debug;
use trellis_element::{annotations, Element, ElemId, InstanceElement, ObjectType, Value, Values};
use trellis_reference::api_name;

use crate::constants::{CHANGED_AT_SINGLETON, CONFIG_NAME, SALESFORCE, TYPES_PATH};
use crate::error::AdapterError;
use crate::filter::{FetchFilterOutput, Filter, FilterContext};

/// Id of the singleton instance
#[must_use]
pub fn changed_at_singleton_id() -> ElemId {
    ElemId::instance(SALESFORCE, CHANGED_AT_SINGLETON, CONFIG_NAME)
}

fn singleton_type() -> Arc<ObjectType> {
    Arc::new(
        ObjectType::new(ElemId::new_type(SALESFORCE, CHANGED_AT_SINGLETON))
            .with_annotation(annotations::METADATA_TYPE, CHANGED_AT_SINGLETON)
            .with_path(vec![
                SALESFORCE.to_string(),
                TYPES_PATH.to_string(),
                CHANGED_AT_SINGLETON.to_string(),
            ]),
    )
}

fn parse_time(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(raw).ok()
}

/// Whether `candidate` should replace `current`
///
/// Unparsable times are replaced by whatever was fetched.
fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_time(candidate), parse_time(current)) {
        (Some(candidate), Some(current)) => candidate >= current,
        _ => true,
    }
}

fn type_api_name(element: &Element) -> String {
    match element {
        Element::Instance(instance) => instance
            .ref_type()
            .annotation_str(annotations::API_NAME)
            .unwrap_or_else(|| instance.type_name())
            .to_string(),
        Element::ObjectType(_) | Element::Field(_) => element.elem_id().type_name().to_string(),
    }
}

fn element_name(element: &Element) -> String {
    match element {
        Element::Instance(instance) => {
            api_name(element).unwrap_or_else(|| instance.elem_id().name().to_string())
        }
        Element::ObjectType(_) | Element::Field(_) => {
            api_name(element).unwrap_or_else(|| element.elem_id().type_name().to_string())
        }
    }
}

/// Maintains the change time singleton
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangedAtSingletonFilter;

#[async_trait]
impl Filter for ChangedAtSingletonFilter {
    fn name(&self) -> &'static str {
        "changedAtSingleton"
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        let previous = context
            .element_source
            .get(&changed_at_singleton_id())
            .and_then(|element| element.as_instance().map(|instance| instance.value().clone()));

        let changed: Vec<(String, String, String)> = elements
            .iter()
            .filter_map(|element| {
                let changed_at = element.annotations().get(annotations::CHANGED_AT)?.as_str()?;
                Some((type_api_name(element), element_name(element), changed_at.to_string()))
            })
            .collect();

        if changed.is_empty() && previous.is_none() {
            debug!("no change times and no previous singleton");
            return Ok(FetchFilterOutput::empty());
        }

        let mut values: Values = previous.unwrap_or_default();
        let mut updated = 0_usize;
        for (type_name, name, changed_at) in changed {
            let by_name = values
                .entry(type_name)
                .or_insert_with(|| Value::Mapping(Values::new()));
            if !matches!(by_name, Value::Mapping(_)) {
                *by_name = Value::Mapping(Values::new());
            }
            let Some(by_name) = by_name.as_mapping_mut() else {
                continue;
            };
            let keep = by_name
                .get(&name)
                .and_then(Value::as_str)
                .is_some_and(|current| !is_newer(&changed_at, current));
            if !keep {
                by_name.insert(name, Value::string(changed_at));
                updated += 1;
            }
        }
        debug!(updated, "updated change times");

        let ty = singleton_type();
        let singleton = InstanceElement::new(CONFIG_NAME, Arc::clone(&ty), values).with_path(vec![
            SALESFORCE.to_string(),
            TYPES_PATH.to_string(),
            CHANGED_AT_SINGLETON.to_string(),
        ]);
        elements.retain(|element| element.elem_id().type_name() != CHANGED_AT_SINGLETON);
        elements.push(Element::ObjectType((*ty).clone()));
        elements.push(Element::Instance(singleton));
        Ok(FetchFilterOutput::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::TestContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use trellis_test_utils::{instance, metadata_type};

    fn profile(name: &str, changed_at: Option<&str>) -> Element {
        let mut profile = instance(&metadata_type("Profile"), name, json!({ "fullName": name }));
        if let Some(changed_at) = changed_at {
            profile.set_annotation(annotations::CHANGED_AT, changed_at);
        }
        Element::Instance(profile)
    }

    fn singleton_of(elements: &[Element]) -> &InstanceElement {
        elements
            .iter()
            .filter_map(Element::as_instance)
            .find(|i| i.type_name() == CHANGED_AT_SINGLETON)
            .unwrap()
    }

    fn previous_singleton(values: serde_json::Value) -> Element {
        let serde_json::Value::Object(map) = values else {
            unreachable!()
        };
        Element::Instance(InstanceElement::new(
            CONFIG_NAME,
            singleton_type(),
            trellis_element::values_from_json(map),
        ))
    }

    #[tokio::test]
    async fn creates_singleton_and_type() {
        let mut elements = vec![profile("Admin", Some("2023-03-28T00:00:00.000Z"))];
        let ctx = TestContext::new();

        ChangedAtSingletonFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert!(elements.iter().any(|e| {
            e.as_object_type().is_some() && e.elem_id().type_name() == CHANGED_AT_SINGLETON
        }));
        let singleton = singleton_of(&elements);
        assert_eq!(singleton.elem_id(), &changed_at_singleton_id());
        assert_eq!(
            singleton.get("Profile").and_then(Value::as_mapping).and_then(|m| m.get("Admin")),
            Some(&Value::string("2023-03-28T00:00:00.000Z"))
        );
    }

    #[tokio::test]
    async fn merges_with_previous_singleton() {
        let previous = previous_singleton(json!({
            "Profile": {
                "Admin": "2023-03-01T00:00:00.000Z",
                "Untouched": "2023-03-01T00:00:00.000Z"
            },
            "Flow": { "TestFlow": "2023-03-01T00:00:00.000Z" }
        }));
        let mut elements = vec![profile("Admin", Some("2023-03-28T00:00:00.000Z"))];
        let ctx = TestContext::new().with_source(vec![previous]);

        ChangedAtSingletonFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        let singleton = singleton_of(&elements);
        let profiles = singleton.get("Profile").and_then(Value::as_mapping).unwrap();
        assert_eq!(profiles.get("Admin"), Some(&Value::string("2023-03-28T00:00:00.000Z")));
        assert_eq!(profiles.get("Untouched"), Some(&Value::string("2023-03-01T00:00:00.000Z")));
        assert!(singleton.get("Flow").is_some());
    }

    #[tokio::test]
    async fn older_times_do_not_win() {
        let previous =
            previous_singleton(json!({ "Profile": { "Admin": "2023-04-01T00:00:00Z" } }));
        let mut elements = vec![profile("Admin", Some("2023-03-28T00:00:00Z"))];
        let ctx = TestContext::new().with_source(vec![previous]);

        ChangedAtSingletonFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        let profiles = singleton_of(&elements)
            .get("Profile")
            .and_then(Value::as_mapping)
            .unwrap()
            .clone();
        assert_eq!(profiles.get("Admin"), Some(&Value::string("2023-04-01T00:00:00Z")));
    }

    #[tokio::test]
    async fn nothing_to_record() {
        let mut elements = vec![profile("Admin", None)];
        let ctx = TestContext::new();

        ChangedAtSingletonFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert_eq!(elements.len(), 1);
    }
}
