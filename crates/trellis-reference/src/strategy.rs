//! Reference serialization strategies
//!
//! A strategy turns the target of a reference into the value the external
//! system expects in its place: a record id, an API name, or some other field.
//! [`SerializationRules`] pick a strategy per referring field.

use std::fmt;
use std::sync::Arc;

use trellis_element::{annotations, Element, Value};

/// Default external identifier field of a record
pub const ID_FIELD: &str = "Id";

/// Value field holding a metadata instance's API name
pub const FULL_NAME_FIELD: &str = "fullName";

/// Turns a reference target into an external value
pub trait ReferenceStrategy: Send + Sync + fmt::Debug {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Whether the strategy reads a server-assigned identifier
    fn is_identifier_based(&self) -> bool {
        false
    }

    /// External value for `target`, if it carries one
    fn serialize(&self, target: &Element) -> Option<Value>;
}

/// Serialize to the record's external primary key
#[derive(Debug, Clone)]
pub struct IdStrategy {
    field: String,
}

impl IdStrategy {
    /// Strategy reading a custom id field
    #[inline]
    #[must_use]
    pub fn with_field(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Default for IdStrategy {
    fn default() -> Self {
        Self::with_field(ID_FIELD)
    }
}

impl ReferenceStrategy for IdStrategy {
    fn name(&self) -> &'static str {
        "id"
    }

    fn is_identifier_based(&self) -> bool {
        true
    }

    fn serialize(&self, target: &Element) -> Option<Value> {
        target
            .as_instance()?
            .get(&self.field)
            .filter(|value| value.as_scalar().is_some())
            .cloned()
    }
}

/// Serialize to the element's API name
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiNameStrategy;

impl ReferenceStrategy for ApiNameStrategy {
    fn name(&self) -> &'static str {
        "api_name"
    }

    fn serialize(&self, target: &Element) -> Option<Value> {
        api_name(target).map(Value::string)
    }
}

/// Serialize to an arbitrary value field of the target instance
#[derive(Debug, Clone)]
pub struct FieldValueStrategy {
    field: String,
}

impl FieldValueStrategy {
    /// Strategy reading `field`
    #[inline]
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl ReferenceStrategy for FieldValueStrategy {
    fn name(&self) -> &'static str {
        "field_value"
    }

    fn serialize(&self, target: &Element) -> Option<Value> {
        target.as_instance()?.get(&self.field).cloned()
    }
}

/// External API name of an element
///
/// Types use their `apiName` annotation (falling back to the type name),
/// fields use `Type.Field`, instances use their `fullName` value.
#[must_use]
pub fn api_name(element: &Element) -> Option<String> {
    match element {
        Element::ObjectType(ty) => Some(
            ty.annotation_str(annotations::API_NAME)
                .map_or_else(|| ty.elem_id().type_name().to_string(), str::to_string),
        ),
        Element::Field(field) => field
            .annotations()
            .get(annotations::API_NAME)
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(format!("{}.{}", field.parent_id().type_name(), field.name()))),
        Element::Instance(inst) => inst
            .get(FULL_NAME_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Picks a strategy by the field a reference sits in
#[derive(Debug, Clone)]
pub struct SerializationRule {
    field: String,
    parent_types: Vec<String>,
    strategy: Arc<dyn ReferenceStrategy>,
}

impl SerializationRule {
    /// Rule for `field` in any parent type
    #[must_use]
    pub fn new(field: impl Into<String>, strategy: Arc<dyn ReferenceStrategy>) -> Self {
        Self {
            field: field.into(),
            parent_types: Vec::new(),
            strategy,
        }
    }

    /// Restrict the rule to parent types (builder)
    #[must_use]
    pub fn with_parent_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.parent_types = types.into_iter().map(Into::into).collect();
        self
    }

    fn matches(&self, field: &str, parent_type: &str) -> bool {
        self.field == field
            && (self.parent_types.is_empty() || self.parent_types.iter().any(|t| t == parent_type))
    }
}

/// Ordered rule list; the first matching rule wins
#[derive(Debug, Clone, Default)]
pub struct SerializationRules {
    rules: Vec<SerializationRule>,
}

impl SerializationRules {
    /// Empty rule list
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule (builder)
    #[must_use]
    pub fn with_rule(mut self, rule: SerializationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Strategy for a reference in `field` of an element of `parent_type`
    #[must_use]
    pub fn strategy_for(
        &self,
        field: &str,
        parent_type: &str,
    ) -> Option<Arc<dyn ReferenceStrategy>> {
        self.rules
            .iter()
            .find(|rule| rule.matches(field, parent_type))
            .map(|rule| Arc::clone(&rule.strategy))
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
