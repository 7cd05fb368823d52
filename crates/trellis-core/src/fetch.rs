//! Fetching data record types and their records
//!
//! Types are described concurrently, bounded by the configured describe limit.
//! Records are streamed per type; a type with more records than the per-type
//! cap is skipped with a warning rather than fetched partially.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info, warn};
use trellis_deploy::constants::CUSTOM_OBJECT;
use trellis_deploy::{ClientError, ExternalClient, FieldSchema, Record, TypeSchema};
use trellis_element::{
    annotations, values_from_json, Element, ElemId, Field, FieldType, InstanceElement, ObjectType,
    Value,
};
use trellis_reference::ID_FIELD;

use crate::config::FetchProfile;
use crate::constants::{RECORDS_PATH, SALESFORCE, TYPES_PATH};
use crate::error::AdapterError;
use crate::filter::FetchWarning;

/// Field type of an external field type name
#[must_use]
pub fn field_type_of(external: &str) -> FieldType {
    match external {
        "string" | "textarea" | "picklist" | "multipicklist" | "id" | "reference" | "email"
        | "phone" | "url" | "date" | "datetime" | "time" => FieldType::String,
        "double" | "int" | "long" | "currency" | "percent" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        _ => FieldType::Unknown,
    }
}

fn field_from_schema(parent: &ElemId, schema: &FieldSchema) -> Field {
    let mut field = Field::new(parent, schema.name.clone(), field_type_of(&schema.field_type))
        .with_annotation(annotations::API_NAME, format!("{}.{}", parent.type_name(), schema.name))
        .with_annotation(annotations::CREATABLE, schema.createable)
        .with_annotation(annotations::UPDATEABLE, schema.updateable);
    if !schema.reference_to.is_empty() {
        field = field.with_annotation(
            annotations::REFERENCE_TO,
            schema
                .reference_to
                .iter()
                .map(|t| Value::string(t.clone()))
                .collect::<Vec<_>>(),
        );
    }
    field
}

/// Type built from a description
///
/// Components of compound fields are left out; the compound field carries
/// their values.
#[must_use]
pub fn object_type_from_schema(schema: &TypeSchema, metadata_type: &str) -> ObjectType {
    let id = ElemId::new_type(SALESFORCE, schema.name.clone());
    let mut ty = ObjectType::new(id.clone())
        .with_annotation(annotations::API_NAME, schema.name.clone())
        .with_annotation(annotations::METADATA_TYPE, metadata_type)
        .with_path(vec![SALESFORCE.to_string(), TYPES_PATH.to_string(), schema.name.clone()]);
    for field in schema.fields.iter().filter(|f| f.compound_field_name.is_none()) {
        ty.add_field(field_from_schema(&id, field));
    }
    ty
}

/// Describe types concurrently, at most `max_concurrent` calls in flight
///
/// Results come back in completion order.
pub async fn describe_types(
    client: &dyn ExternalClient,
    type_names: &[String],
    max_concurrent: usize,
) -> Vec<(String, Result<TypeSchema, ClientError>)> {
    stream::iter(type_names.iter().cloned())
        .map(|name| async move {
            let result = client.describe_type(&name).await;
            (name, result)
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}

/// Sanitized element name for a record
fn record_name(record: &Record, taken: &mut HashSet<String>) -> String {
    let id = record.get(ID_FIELD).and_then(serde_json::Value::as_str).unwrap_or_default();
    let base = record
        .get("Name")
        .and_then(serde_json::Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(id);
    let mut name: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !taken.insert(name.clone()) {
        name = format!("{name}_{id}");
        taken.insert(name.clone());
    }
    name
}

fn query_for(ty: &ObjectType) -> String {
    let fields: Vec<&str> = ty.fields().keys().map(String::as_str).collect();
    format!("SELECT {} FROM {}", fields.join(","), ty.elem_id().type_name())
}

/// Fetched records of one type, or `None` when over the cap
async fn fetch_records(
    client: &dyn ExternalClient,
    ty: &Arc<ObjectType>,
    max_instances: usize,
) -> Result<Option<Vec<InstanceElement>>, ClientError> {
    let query = query_for(ty);
    let mut records = client.query_all(&query);
    let mut taken = HashSet::new();
    let mut instances = Vec::new();
    while let Some(mut record) = records.try_next().await? {
        if instances.len() == max_instances {
            return Ok(None);
        }
        record.remove("attributes");
        let name = record_name(&record, &mut taken);
        let type_name = ty.elem_id().type_name().to_string();
        let instance = InstanceElement::new(name.clone(), Arc::clone(ty), values_from_json(record))
            .with_path(vec![SALESFORCE.to_string(), RECORDS_PATH.to_string(), type_name, name]);
        instances.push(instance);
    }
    Ok(Some(instances))
}

/// Output of [`fetch_data`]
#[derive(Debug, Default)]
pub struct FetchOutput {
    /// Types and records
    pub elements: Vec<Element>,
    /// Skipped types and other non-fatal problems
    pub warnings: Vec<FetchWarning>,
}

/// Fetch the data record types selected by the profile, with their records
///
/// # Errors
/// `AdapterError::Client` when the type list cannot be read or a query fails.
/// Types that fail to describe are skipped with a warning.
pub async fn fetch_data(
    client: &dyn ExternalClient,
    profile: &FetchProfile,
    max_concurrent_describe: usize,
) -> Result<FetchOutput, AdapterError> {
    let Some(data) = profile.data_management() else {
        debug!("no data management configured, skipping records");
        return Ok(FetchOutput::default());
    };
    let mut type_names: Vec<String> = client
        .list_types()
        .await?
        .into_iter()
        .filter(|name| data.is_object_included(name))
        .collect();
    type_names.sort();

    let mut output = FetchOutput::default();
    let mut types = Vec::new();
    for (name, described) in describe_types(client, &type_names, max_concurrent_describe).await {
        match described {
            Ok(schema) => types.push(Arc::new(object_type_from_schema(&schema, CUSTOM_OBJECT))),
            Err(err) => {
                warn!(type_name = %name, error = %err, "failed to describe type");
                output
                    .warnings
                    .push(FetchWarning::new(format!("Failed to describe {name}: {err}")));
            }
        }
    }
    types.sort_by(|a, b| a.elem_id().type_name().cmp(b.elem_id().type_name()));

    let max_instances = profile.max_instances_per_type();
    for ty in types {
        let type_name = ty.elem_id().type_name().to_string();
        output.elements.push(Element::ObjectType((*ty).clone()));
        match fetch_records(client, &ty, max_instances).await? {
            Some(instances) => {
                debug!(type_name = %type_name, count = instances.len(), "fetched records");
                output.elements.extend(instances.into_iter().map(Element::Instance));
            }
            None => {
                warn!(type_name = %type_name, max_instances, "too many records, skipping type");
                output.warnings.push(FetchWarning::new(format!(
                    "Did not retrieve instances of type {type_name} \
                     because it has more than {max_instances} instances"
                )));
            }
        }
    }
    info!(
        elements = output.elements.len(),
        warnings = output.warnings.len(),
        "data fetch finished"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use trellis_test_utils::MockClient;

    fn product_schema() -> TypeSchema {
        serde_json::from_value(json!({
            "name": "Product2",
            "fields": [
                { "name": "Id", "type": "id" },
                { "name": "Name", "type": "string", "createable": true, "updateable": true },
                { "name": "Price__c", "type": "currency", "createable": true, "updateable": true },
                { "name": "Address", "type": "address" },
                { "name": "Street", "type": "string", "compoundFieldName": "Address" }
            ]
        }))
        .unwrap()
    }

    fn record(id: &str, name: &str) -> Record {
        match json!({ "attributes": { "type": "Product2" }, "Id": id, "Name": name }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn profile(max: usize) -> FetchProfile {
        let mut config = AdapterConfig::default().with_data(&["Product2", "Quote"], &[]);
        config.fetch.max_instances_per_type = Some(max);
        FetchProfile::from_config(&config.fetch).unwrap()
    }

    #[test]
    fn type_from_schema() {
        let ty = object_type_from_schema(&product_schema(), CUSTOM_OBJECT);
        assert_eq!(
            ty.fields().keys().collect::<Vec<_>>(),
            vec!["Id", "Name", "Price__c", "Address"]
        );
        assert_eq!(ty.field("Price__c").unwrap().field_type(), &FieldType::Number);
        assert!(ty.field("Name").unwrap().flag(annotations::CREATABLE));
        assert!(!ty.field("Id").unwrap().flag(annotations::UPDATEABLE));
    }

    #[test]
    fn duplicate_names_get_the_id() {
        let mut taken = HashSet::new();
        assert_eq!(record_name(&record("01t1", "Big Widget"), &mut taken), "Big_Widget");
        assert_eq!(record_name(&record("01t2", "Big Widget"), &mut taken), "Big_Widget_01t2");
    }

    #[tokio::test]
    async fn fetches_records_of_included_types() {
        let client = MockClient::new()
            .with_schema(product_schema())
            .with_records("Product2", vec![record("01t1", "Widget"), record("01t2", "Gadget")])
            .with_schema(TypeSchema {
                name: "Account".into(),
                fields: Vec::new(),
            });
        let output = fetch_data(&client, &profile(10), 2).await.unwrap();
        assert_eq!(client.describes(), vec!["Product2".to_string()]);
        assert_eq!(output.elements.len(), 3);
        assert!(output.warnings.is_empty());
        let widget = output.elements[1].as_instance().unwrap();
        assert_eq!(widget.get("Id"), Some(&Value::string("01t1")));
        assert!(widget.get("attributes").is_none());
        assert_eq!(
            client.queries(),
            vec!["SELECT Id,Name,Price__c,Address FROM Product2".to_string()]
        );
    }

    #[tokio::test]
    async fn types_over_the_cap_are_skipped() {
        let client = MockClient::new()
            .with_schema(product_schema())
            .with_records(
                "Product2",
                vec![record("01t1", "a"), record("01t2", "b"), record("01t3", "c")],
            );
        let output = fetch_data(&client, &profile(2), 2).await.unwrap();
        assert_eq!(output.elements.len(), 1);
        assert_eq!(
            output.warnings[0].message,
            "Did not retrieve instances of type Product2 because it has more than 2 instances"
        );
    }

    #[tokio::test]
    async fn describe_failures_become_warnings() {
        let client = MockClient::new().with_schema(product_schema()).fail_describe("Quote");
        let output = fetch_data(&client, &profile(10), 4).await.unwrap();
        assert_eq!(output.warnings.len(), 1);
        assert!(output.warnings[0].message.starts_with("Failed to describe Quote"));
    }

    #[tokio::test]
    async fn describe_concurrency_is_bounded() {
        let names: Vec<String> = (0..8).map(|i| format!("T{i}")).collect();
        let mut client = MockClient::new();
        for name in &names {
            client = client.with_schema(TypeSchema {
                name: name.clone(),
                fields: Vec::new(),
            });
        }
        let results = describe_types(&client, &names, 3).await;
        assert_eq!(results.len(), 8);
        assert!(client.max_concurrent_describes() <= 3);
        assert!(client.max_concurrent_describes() >= 2);
    }
}
