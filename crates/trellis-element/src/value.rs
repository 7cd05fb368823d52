//! Element values
//!
//! Every element carries a tree of [`Value`]s. The tree is a tagged union so a
//! consumer always knows whether it holds a plain scalar, a pointer to another
//! element or a packed template that still has to be flattened before deploy.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::element::{Element, ElementError};
use crate::elem_id::ElemId;

/// Ordered field-name to value mapping
pub type Values = IndexMap<String, Value>;

/// Leaf values
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean
    Bool(bool),
    /// Integer number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(String),
}

impl Scalar {
    /// Render as the string an external system would store
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
                write!(f, "{}", *x as i64)
            }
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

/// A value inside an element
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Plain leaf value
    Scalar(Scalar),
    /// Pointer to another element
    Reference(ReferenceExpression),
    /// Literal and reference parts packed into one external string
    Template(TemplateExpression),
    /// Nested mapping
    Mapping(Values),
    /// Nested sequence
    Sequence(Vec<Value>),
}

impl Value {
    /// String scalar
    #[inline]
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::Scalar(Scalar::Str(s.into()))
    }

    /// Integer scalar
    #[inline]
    #[must_use]
    pub fn int(i: i64) -> Self {
        Self::Scalar(Scalar::Int(i))
    }

    /// Boolean scalar
    #[inline]
    #[must_use]
    pub fn bool(b: bool) -> Self {
        Self::Scalar(Scalar::Bool(b))
    }

    /// Borrow as scalar
    #[inline]
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, if any
    #[inline]
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[allow(clippy::cast_precision_loss)]
            Self::Scalar(Scalar::Int(i)) => Some(*i as f64),
            Self::Scalar(Scalar::Float(x)) => Some(*x),
            _ => None,
        }
    }

    /// Integral numeric value, accepting floats without a fractional part
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Int(i)) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Scalar(Scalar::Float(x)) if x.is_finite() && x.fract() == 0.0 => Some(*x as i64),
            _ => None,
        }
    }

    /// Whether the value is a number
    #[inline]
    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Int(_) | Scalar::Float(_)))
    }

    /// Boolean value, if any
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as reference
    #[inline]
    #[must_use]
    pub fn as_reference(&self) -> Option<&ReferenceExpression> {
        match self {
            Self::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// Borrow as template
    #[inline]
    #[must_use]
    pub fn as_template(&self) -> Option<&TemplateExpression> {
        match self {
            Self::Template(t) => Some(t),
            _ => None,
        }
    }

    /// Borrow as mapping
    #[inline]
    #[must_use]
    pub fn as_mapping(&self) -> Option<&Values> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Mutably borrow as mapping
    #[inline]
    pub fn as_mapping_mut(&mut self) -> Option<&mut Values> {
        match self {
            Self::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// Borrow as sequence
    #[inline]
    #[must_use]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Convert a JSON value; `null` has no counterpart and yields `None`
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(Self::bool(b)),
            serde_json::Value::Number(n) => Some(match n.as_i64() {
                Some(i) => Self::int(i),
                None => Self::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            }),
            serde_json::Value::String(s) => Some(Self::string(s)),
            serde_json::Value::Array(items) => Some(Self::Sequence(
                items.into_iter().filter_map(Self::from_json).collect(),
            )),
            serde_json::Value::Object(map) => Some(Self::Mapping(values_from_json(map))),
        }
    }

    /// Convert into JSON
    ///
    /// # Errors
    /// Returns [`ElementError::UnresolvedValue`] when the tree still holds a
    /// reference or template.
    pub fn to_json(&self) -> Result<serde_json::Value, ElementError> {
        Ok(match self {
            Self::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(*b),
            Self::Scalar(Scalar::Int(i)) => serde_json::Value::from(*i),
            Self::Scalar(Scalar::Float(x)) => serde_json::Value::from(*x),
            Self::Scalar(Scalar::Str(s)) => serde_json::Value::String(s.clone()),
            Self::Reference(r) => {
                return Err(ElementError::UnresolvedValue(format!("reference to {}", r.elem_id())))
            }
            Self::Template(t) => {
                return Err(ElementError::UnresolvedValue(format!("template '{t}'")))
            }
            Self::Mapping(m) => serde_json::Value::Object(values_to_json(m)?),
            Self::Sequence(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// Convert a JSON object into values, dropping `null` entries
#[must_use]
pub fn values_from_json(map: serde_json::Map<String, serde_json::Value>) -> Values {
    map.into_iter()
        .filter_map(|(key, value)| Value::from_json(value).map(|v| (key, v)))
        .collect()
}

/// Convert values into a JSON object
///
/// # Errors
/// Fails when any value is still a reference or template.
pub fn values_to_json(
    values: &Values,
) -> Result<serde_json::Map<String, serde_json::Value>, ElementError> {
    values
        .iter()
        .map(|(key, value)| Ok((key.clone(), value.to_json()?)))
        .collect()
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Scalar(Scalar::Float(x))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::bool(b)
    }
}

impl From<ReferenceExpression> for Value {
    fn from(r: ReferenceExpression) -> Self {
        Self::Reference(r)
    }
}

impl From<TemplateExpression> for Value {
    fn from(t: TemplateExpression) -> Self {
        Self::Template(t)
    }
}

impl From<Values> for Value {
    fn from(m: Values) -> Self {
        Self::Mapping(m)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Sequence(items)
    }
}

/// Pointer from one element's value to another element
///
/// The optional handle is a lookup convenience, not an ownership edge; the
/// target id alone decides equality.
#[derive(Debug, Clone)]
pub struct ReferenceExpression {
    elem_id: ElemId,
    value: Option<Arc<Element>>,
}

impl ReferenceExpression {
    /// Unresolved reference to a target id
    #[inline]
    #[must_use]
    pub fn new(elem_id: ElemId) -> Self {
        Self { elem_id, value: None }
    }

    /// Reference carrying a handle to its target
    ///
    /// # Errors
    /// Returns [`ElementError::ReferenceMismatch`] if the handle is a different element.
    pub fn resolved(elem_id: ElemId, target: Arc<Element>) -> Result<Self, ElementError> {
        if target.elem_id() != &elem_id {
            return Err(ElementError::ReferenceMismatch {
                target: elem_id,
                handle: target.elem_id().clone(),
            });
        }
        Ok(Self {
            elem_id,
            value: Some(target),
        })
    }

    /// Reference to an element, keeping a handle to it
    #[inline]
    #[must_use]
    pub fn to_element(target: Arc<Element>) -> Self {
        Self {
            elem_id: target.elem_id().clone(),
            value: Some(target),
        }
    }

    /// Target id
    #[inline]
    #[must_use]
    pub fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }

    /// Handle to the target, if resolved in memory
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&Arc<Element>> {
        self.value.as_ref()
    }

    /// Replace the handle, keeping the target id
    ///
    /// # Errors
    /// Returns [`ElementError::ReferenceMismatch`] if the handle is a different element.
    pub fn with_value(self, target: Arc<Element>) -> Result<Self, ElementError> {
        Self::resolved(self.elem_id, target)
    }
}

impl PartialEq for ReferenceExpression {
    fn eq(&self, other: &Self) -> bool {
        self.elem_id == other.elem_id
    }
}

/// One part of a [`TemplateExpression`]
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text
    Literal(String),
    /// Reference rendered at pack time
    Reference(ReferenceExpression),
}

impl From<&str> for TemplatePart {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<ReferenceExpression> for TemplatePart {
    fn from(r: ReferenceExpression) -> Self {
        Self::Reference(r)
    }
}

/// Ordered literal and reference parts that reconstruct one external string
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TemplateExpression {
    parts: Vec<TemplatePart>,
}

impl TemplateExpression {
    /// Build a template, merging adjacent literals and dropping empty ones
    #[must_use]
    pub fn new(parts: impl IntoIterator<Item = TemplatePart>) -> Self {
        let mut merged: Vec<TemplatePart> = Vec::new();
        for part in parts {
            match (merged.last_mut(), part) {
                (_, TemplatePart::Literal(text)) if text.is_empty() => {}
                (Some(TemplatePart::Literal(prev)), TemplatePart::Literal(text)) => {
                    prev.push_str(&text);
                }
                (_, part) => merged.push(part),
            }
        }
        Self { parts: merged }
    }

    /// Template parts
    #[inline]
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Consume into parts
    #[inline]
    #[must_use]
    pub fn into_parts(self) -> Vec<TemplatePart> {
        self.parts
    }

    /// References in order of appearance
    pub fn references(&self) -> impl Iterator<Item = &ReferenceExpression> {
        self.parts.iter().filter_map(|part| match part {
            TemplatePart::Reference(r) => Some(r),
            TemplatePart::Literal(_) => None,
        })
    }

    /// Whether at least one part is a reference
    #[inline]
    #[must_use]
    pub fn has_references(&self) -> bool {
        self.references().next().is_some()
    }
}

impl Display for TemplateExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                TemplatePart::Literal(text) => f.write_str(text)?,
                TemplatePart::Reference(r) => write!(f, "${{{}}}", r.elem_id())?,
            }
        }
        Ok(())
    }
}
