//! Testing utilities for the Trellis workspace
//!
//! Shared fixture types, instance builders and the in-memory client.

#![allow(missing_docs)]

use std::sync::Arc;

use trellis_deploy::constants::{CUSTOM_OBJECT, SBAA_APPROVAL_CONDITION, SBAA_APPROVAL_RULE};
use trellis_element::{
    annotations, Change, ElemId, Element, Field, FieldType, InstanceElement, ObjectType,
    ReferenceExpression, Values,
};

pub use trellis_deploy::mock::MockClient;

pub const ADAPTER: &str = "salesforce";

/// Data record type with the given fields, all creatable and updateable
pub fn record_type(name: &str, fields: &[&str]) -> Arc<ObjectType> {
    let id = ElemId::new_type(ADAPTER, name);
    let mut ty = ObjectType::new(id.clone())
        .with_annotation(annotations::METADATA_TYPE, CUSTOM_OBJECT)
        .with_annotation(annotations::API_NAME, name);
    for field in fields {
        ty.add_field(
            Field::new(&id, *field, FieldType::String)
                .with_annotation(annotations::CREATABLE, true)
                .with_annotation(annotations::UPDATEABLE, true),
        );
    }
    Arc::new(ty)
}

/// Metadata type (not a data record type)
pub fn metadata_type(name: &str) -> Arc<ObjectType> {
    Arc::new(
        ObjectType::new(ElemId::new_type(ADAPTER, name))
            .with_annotation(annotations::METADATA_TYPE, name)
            .with_annotation(annotations::API_NAME, name),
    )
}

pub fn instance(ty: &Arc<ObjectType>, name: &str, values: serde_json::Value) -> InstanceElement {
    let values = match values {
        serde_json::Value::Object(map) => trellis_element::values_from_json(map),
        _ => Values::new(),
    };
    InstanceElement::new(name, Arc::clone(ty), values)
}

pub fn reference_to(target: &InstanceElement) -> ReferenceExpression {
    ReferenceExpression::to_element(Arc::new(Element::Instance(target.clone())))
}

pub fn approval_rule(name: &str, conditions_met: &str) -> InstanceElement {
    let rule_type = record_type(SBAA_APPROVAL_RULE, &[]);
    let mut rule = instance(&rule_type, name, serde_json::json!({ "Name": name }));
    rule.set_value("sbaa__ConditionsMet__c", conditions_met);
    rule
}

pub fn approval_condition(name: &str, rule: &InstanceElement, index: i64) -> InstanceElement {
    let condition_type = record_type(SBAA_APPROVAL_CONDITION, &[]);
    let mut condition = instance(&condition_type, name, serde_json::json!({}));
    condition.set_value("sbaa__Index__c", index);
    condition.set_value(SBAA_APPROVAL_RULE, reference_to(rule));
    condition
}

pub fn addition(instance: InstanceElement) -> Change {
    Change::Addition {
        after: Element::Instance(instance),
    }
}

pub fn modification(before: InstanceElement, after: InstanceElement) -> Change {
    Change::Modification {
        before: Element::Instance(before),
        after: Element::Instance(after),
    }
}

pub fn removal(instance: InstanceElement) -> Change {
    Change::Removal {
        before: Element::Instance(instance),
    }
}
