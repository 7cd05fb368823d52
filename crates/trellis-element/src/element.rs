//! Elements: object types, fields and instances
//!
//! # Overview
//!
//! An [`ObjectType`] owns its [`Field`]s. An [`InstanceElement`] owns its value
//! tree and shares its type through an [`Arc`], because a type outlives any one
//! of its instances. [`Element`] is the polymorphic view over all three.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::elem_id::{ElemId, ElemIdError};
use crate::value::{Value, Values};

/// Well-known annotation names
pub mod annotations {
    /// External API name of a type or field
    pub const API_NAME: &str = "apiName";
    /// External metadata category of a type
    pub const METADATA_TYPE: &str = "metadataType";
    /// Human readable label
    pub const LABEL: &str = "label";
    /// Field can be set on creation
    pub const CREATABLE: &str = "createable";
    /// Field can be changed on update
    pub const UPDATEABLE: &str = "updateable";
    /// Types a lookup field points at
    pub const REFERENCE_TO: &str = "referenceTo";
    /// Last change timestamp of an element
    pub const CHANGED_AT: &str = "_changed_at";
    /// References the platform generated, not present in the source system
    pub const GENERATED_DEPENDENCIES: &str = "_generated_dependencies";
    /// Parent elements
    pub const PARENT: &str = "_parent";
}

/// Type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    /// String primitive
    String,
    /// Number primitive
    Number,
    /// Boolean primitive
    Boolean,
    /// Unknown primitive
    Unknown,
    /// Another object type
    Named(ElemId),
    /// List of an inner type
    List(Box<FieldType>),
}

/// A field of an object type
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    elem_id: ElemId,
    parent_id: ElemId,
    name: String,
    field_type: FieldType,
    annotations: Values,
}

impl Field {
    /// Create a field of the type with `parent_id`
    #[must_use]
    pub fn new(parent_id: &ElemId, name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        Self {
            elem_id: ElemId::field(parent_id.adapter(), parent_id.type_name(), name.clone()),
            parent_id: parent_id.clone(),
            name,
            field_type,
            annotations: Values::new(),
        }
    }

    /// Add an annotation (builder)
    #[inline]
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Field id
    #[inline]
    #[must_use]
    pub fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }

    /// Id of the owning type
    #[inline]
    #[must_use]
    pub fn parent_id(&self) -> &ElemId {
        &self.parent_id
    }

    /// Field name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field type
    #[inline]
    #[must_use]
    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Annotations
    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &Values {
        &self.annotations
    }

    /// Mutable annotations
    #[inline]
    pub fn annotations_mut(&mut self) -> &mut Values {
        &mut self.annotations
    }

    /// Boolean annotation, `false` when absent
    #[inline]
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.annotations.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A type: named fields plus annotations
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectType {
    elem_id: ElemId,
    fields: IndexMap<String, Field>,
    annotations: Values,
    path: Option<Vec<String>>,
}

impl ObjectType {
    /// Create an empty type
    #[must_use]
    pub fn new(elem_id: ElemId) -> Self {
        Self {
            elem_id,
            fields: IndexMap::new(),
            annotations: Values::new(),
            path: None,
        }
    }

    /// Add a field (builder)
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.add_field(field);
        self
    }

    /// Add an annotation (builder)
    #[inline]
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the source path (builder)
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = Some(path);
        self
    }

    /// Insert or replace a field
    pub fn add_field(&mut self, field: Field) {
        self.fields.insert(field.name().to_string(), field);
    }

    /// Type id
    #[inline]
    #[must_use]
    pub fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }

    /// Fields in declaration order
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, Field> {
        &self.fields
    }

    /// Mutable fields
    #[inline]
    pub fn fields_mut(&mut self) -> &mut IndexMap<String, Field> {
        &mut self.fields
    }

    /// Field by name
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Annotations
    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &Values {
        &self.annotations
    }

    /// Mutable annotations
    #[inline]
    pub fn annotations_mut(&mut self) -> &mut Values {
        &mut self.annotations
    }

    /// String annotation
    #[inline]
    #[must_use]
    pub fn annotation_str(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).and_then(Value::as_str)
    }

    /// Source path
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&[String]> {
        self.path.as_deref()
    }
}

/// A record of some object type
#[derive(Debug, Clone)]
pub struct InstanceElement {
    elem_id: ElemId,
    ref_type: Arc<ObjectType>,
    value: Values,
    annotations: Values,
    path: Option<Vec<String>>,
}

impl InstanceElement {
    /// Create an instance named `name` of `ref_type`
    #[must_use]
    pub fn new(name: impl Into<String>, ref_type: Arc<ObjectType>, value: Values) -> Self {
        let type_id = ref_type.elem_id();
        Self {
            elem_id: ElemId::instance(type_id.adapter(), type_id.type_name(), name),
            ref_type,
            value,
            annotations: Values::new(),
            path: None,
        }
    }

    /// Add an annotation (builder)
    #[inline]
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Set the source path (builder)
    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = Some(path);
        self
    }

    /// Instance id
    #[inline]
    #[must_use]
    pub fn elem_id(&self) -> &ElemId {
        &self.elem_id
    }

    /// Type of this instance
    #[inline]
    #[must_use]
    pub fn ref_type(&self) -> &Arc<ObjectType> {
        &self.ref_type
    }

    /// Name of the instance type
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        self.elem_id.type_name()
    }

    /// Value tree
    #[inline]
    #[must_use]
    pub fn value(&self) -> &Values {
        &self.value
    }

    /// Mutable value tree
    #[inline]
    pub fn value_mut(&mut self) -> &mut Values {
        &mut self.value
    }

    /// Top level value by key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    /// Set a top level value
    #[inline]
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.value.insert(key.into(), value.into());
    }

    /// Remove a top level value, keeping the order of the rest
    #[inline]
    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.value.shift_remove(key)
    }

    /// Annotations
    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &Values {
        &self.annotations
    }

    /// Mutable annotations
    #[inline]
    pub fn annotations_mut(&mut self) -> &mut Values {
        &mut self.annotations
    }

    /// Set an annotation
    #[inline]
    pub fn set_annotation(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.annotations.insert(key.into(), value.into());
    }

    /// Source path
    #[inline]
    #[must_use]
    pub fn path(&self) -> Option<&[String]> {
        self.path.as_deref()
    }
}

impl PartialEq for InstanceElement {
    fn eq(&self, other: &Self) -> bool {
        self.elem_id == other.elem_id
            && self.ref_type.elem_id() == other.ref_type.elem_id()
            && self.value == other.value
            && self.annotations == other.annotations
    }
}

/// Any element of the graph
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Object type
    ObjectType(ObjectType),
    /// Field of a type
    Field(Field),
    /// Instance of a type
    Instance(InstanceElement),
}

impl Element {
    /// Element id
    #[inline]
    #[must_use]
    pub fn elem_id(&self) -> &ElemId {
        match self {
            Self::ObjectType(t) => t.elem_id(),
            Self::Field(f) => f.elem_id(),
            Self::Instance(i) => i.elem_id(),
        }
    }

    /// Annotations
    #[inline]
    #[must_use]
    pub fn annotations(&self) -> &Values {
        match self {
            Self::ObjectType(t) => t.annotations(),
            Self::Field(f) => f.annotations(),
            Self::Instance(i) => i.annotations(),
        }
    }

    /// Mutable annotations
    #[inline]
    pub fn annotations_mut(&mut self) -> &mut Values {
        match self {
            Self::ObjectType(t) => t.annotations_mut(),
            Self::Field(f) => f.annotations_mut(),
            Self::Instance(i) => i.annotations_mut(),
        }
    }

    /// Borrow as instance
    #[inline]
    #[must_use]
    pub fn as_instance(&self) -> Option<&InstanceElement> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Mutably borrow as instance
    #[inline]
    pub fn as_instance_mut(&mut self) -> Option<&mut InstanceElement> {
        match self {
            Self::Instance(i) => Some(i),
            _ => None,
        }
    }

    /// Consume into an instance
    ///
    /// # Errors
    /// Returns [`ElementError::NotAnInstance`] for types and fields.
    pub fn into_instance(self) -> Result<InstanceElement, ElementError> {
        match self {
            Self::Instance(i) => Ok(i),
            other => Err(ElementError::NotAnInstance(other.elem_id().clone())),
        }
    }

    /// Borrow as object type
    #[inline]
    #[must_use]
    pub fn as_object_type(&self) -> Option<&ObjectType> {
        match self {
            Self::ObjectType(t) => Some(t),
            _ => None,
        }
    }

    /// Borrow as field
    #[inline]
    #[must_use]
    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Self::Field(f) => Some(f),
            _ => None,
        }
    }

    /// Whether this is an instance
    #[inline]
    #[must_use]
    pub fn is_instance(&self) -> bool {
        matches!(self, Self::Instance(_))
    }

    /// Contained elements: the fields of a type, nothing otherwise
    #[must_use]
    pub fn children(&self) -> Vec<Element> {
        match self {
            Self::ObjectType(t) => t.fields().values().cloned().map(Self::Field).collect(),
            Self::Field(_) | Self::Instance(_) => Vec::new(),
        }
    }
}

impl From<ObjectType> for Element {
    fn from(t: ObjectType) -> Self {
        Self::ObjectType(t)
    }
}

impl From<Field> for Element {
    fn from(f: Field) -> Self {
        Self::Field(f)
    }
}

impl From<InstanceElement> for Element {
    fn from(i: InstanceElement) -> Self {
        Self::Instance(i)
    }
}

/// Element model errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElementError {
    /// Reference handle points at a different element than its target id
    #[error("reference to {target} carries a handle to {handle}")]
    ReferenceMismatch {
        /// Target id of the reference
        target: ElemId,
        /// Id of the handle element
        handle: ElemId,
    },

    /// A reference or template where a plain value was required
    #[error("unresolved value: {0}")]
    UnresolvedValue(String),

    /// Two elements share an id
    #[error("duplicate element id {0}")]
    DuplicateElement(ElemId),

    /// Change construction with invalid states
    #[error("invalid change: {0}")]
    InvalidChange(String),

    /// Element is not an instance
    #[error("{0} is not an instance")]
    NotAnInstance(ElemId),

    /// Element id parse failure
    #[error(transparent)]
    ElemId(#[from] ElemIdError),
}
