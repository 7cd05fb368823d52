//! Element identifiers
//!
//! Provides [`ElemId`] for hierarchical, globally unique addressing of elements
//! and of values nested inside them.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Separator between full name segments
pub const NAME_SEPARATOR: char = '.';

/// Kind of element an id points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    /// An object type
    Type,
    /// A field of an object type
    Field,
    /// An instance of an object type
    Instance,
    /// A type-level annotation
    Attr,
}

impl IdType {
    /// Name used in the full name format
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Type => "type",
            Self::Field => "field",
            Self::Instance => "instance",
            Self::Attr => "attr",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "type" => Some(Self::Type),
            "field" => Some(Self::Field),
            "instance" => Some(Self::Instance),
            "attr" => Some(Self::Attr),
            _ => None,
        }
    }
}

/// Globally unique hierarchical element identifier
///
/// Immutable once constructed and used both as a map key and as the equality
/// test between elements.
///
/// # Examples
/// - `salesforce.Product2` addresses a type
/// - `salesforce.Product2.field.Name` addresses a field
/// - `salesforce.Product2.instance.Widget` addresses an instance
/// - `salesforce.Product2.instance.Widget.Family` addresses a value inside it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElemId {
    adapter: String,
    type_name: String,
    id_type: IdType,
    name_parts: Vec<String>,
}

impl ElemId {
    /// Id of a type
    #[inline]
    #[must_use]
    pub fn new_type(adapter: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Type,
            name_parts: Vec::new(),
        }
    }

    /// Id of a field of a type
    #[inline]
    #[must_use]
    pub fn field(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Field,
            name_parts: vec![field_name.into()],
        }
    }

    /// Id of an instance of a type
    #[inline]
    #[must_use]
    pub fn instance(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        instance_name: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Instance,
            name_parts: vec![instance_name.into()],
        }
    }

    /// Id of a type-level annotation
    #[inline]
    #[must_use]
    pub fn attr(
        adapter: impl Into<String>,
        type_name: impl Into<String>,
        attr_name: impl Into<String>,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            type_name: type_name.into(),
            id_type: IdType::Attr,
            name_parts: vec![attr_name.into()],
        }
    }

    /// Adapter segment
    #[inline]
    #[must_use]
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    /// Type name segment
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Kind of element addressed
    #[inline]
    #[must_use]
    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    /// Name parts after the id type segment
    #[inline]
    #[must_use]
    pub fn name_parts(&self) -> &[String] {
        &self.name_parts
    }

    /// Last meaningful name: the type name for types, otherwise the last part
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.name_parts.last().map_or(self.type_name.as_str(), String::as_str)
    }

    /// Whether this id addresses a whole element rather than a nested value
    #[inline]
    #[must_use]
    pub fn is_top_level(&self) -> bool {
        match self.id_type {
            IdType::Type => self.name_parts.is_empty(),
            IdType::Instance | IdType::Field | IdType::Attr => self.name_parts.len() == 1,
        }
    }

    /// Id of the type this element belongs to
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> Self {
        Self::new_type(self.adapter.clone(), self.type_name.clone())
    }

    /// Id of a value nested below this one
    #[must_use]
    pub fn create_nested_id(&self, parts: &[impl AsRef<str>]) -> Self {
        let mut nested = self.clone();
        nested
            .name_parts
            .extend(parts.iter().map(|part| part.as_ref().to_string()));
        nested
    }

    /// Top level element id together with the remaining nested path
    #[must_use]
    pub fn create_top_level_parent_id(&self) -> (Self, Vec<String>) {
        let depth = match self.id_type {
            IdType::Type => 0,
            IdType::Instance | IdType::Field | IdType::Attr => 1,
        };
        let split = depth.min(self.name_parts.len());
        let parent = Self {
            adapter: self.adapter.clone(),
            type_name: self.type_name.clone(),
            id_type: self.id_type,
            name_parts: self.name_parts[..split].to_vec(),
        };
        (parent, self.name_parts[split..].to_vec())
    }

    /// Check if this id is a strict ancestor of another
    #[must_use]
    pub fn is_parent_of(&self, other: &Self) -> bool {
        if self.adapter != other.adapter || self.type_name != other.type_name {
            return false;
        }
        if self.id_type == IdType::Type && self.name_parts.is_empty() {
            return other.id_type != IdType::Type || !other.name_parts.is_empty();
        }
        self.id_type == other.id_type
            && self.name_parts.len() < other.name_parts.len()
            && other.name_parts[..self.name_parts.len()] == self.name_parts[..]
    }

    /// Canonical dotted name
    #[must_use]
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl Display for ElemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{NAME_SEPARATOR}{}", self.adapter, self.type_name)?;
        if self.id_type == IdType::Type && self.name_parts.is_empty() {
            return Ok(());
        }
        write!(f, "{NAME_SEPARATOR}{}", self.id_type.as_str())?;
        for part in &self.name_parts {
            write!(f, "{NAME_SEPARATOR}{part}")?;
        }
        Ok(())
    }
}

impl FromStr for ElemId {
    type Err = ElemIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<&str> = s.split(NAME_SEPARATOR).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(ElemIdError::EmptySegment(s.to_string()));
        }
        match segments.as_slice() {
            [] | [_] => Err(ElemIdError::TooShort(s.to_string())),
            [adapter, type_name] => Ok(Self::new_type(*adapter, *type_name)),
            [_, _, kind] => Err(ElemIdError::MissingName {
                full_name: s.to_string(),
                id_type: (*kind).to_string(),
            }),
            [adapter, type_name, kind, rest @ ..] => {
                let id_type = IdType::parse(kind)
                    .ok_or_else(|| ElemIdError::UnknownIdType((*kind).to_string()))?;
                Ok(Self {
                    adapter: (*adapter).to_string(),
                    type_name: (*type_name).to_string(),
                    id_type,
                    name_parts: rest.iter().map(|part| (*part).to_string()).collect(),
                })
            }
        }
    }
}

impl Serialize for ElemId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.full_name())
    }
}

impl<'de> Deserialize<'de> for ElemId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Element id parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ElemIdError {
    /// Fewer than two segments
    #[error("element id '{0}' needs at least an adapter and a type name")]
    TooShort(String),

    /// Empty segment between separators
    #[error("element id '{0}' contains an empty segment")]
    EmptySegment(String),

    /// Unknown id type segment
    #[error("unknown id type '{0}'")]
    UnknownIdType(String),

    /// Id type without a name
    #[error("element id '{full_name}' has id type '{id_type}' but no name")]
    MissingName {
        /// The raw full name
        full_name: String,
        /// The id type segment
        id_type: String,
    },
}
