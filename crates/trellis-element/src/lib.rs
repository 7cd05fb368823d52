//! Trellis Element Graph
//!
//! Typed elements fetched from an external system, with explicit
//! cross-references between them.
//!
//! # Core Concepts
//!
//! - [`ElemId`]: Hierarchical, globally unique element identifier
//! - [`Element`]: Object type, field or instance
//! - [`Value`]: Tagged value union (scalar, reference, template, mapping, sequence)
//! - [`ReferenceExpression`]: Pointer from a value to another element
//! - [`TemplateExpression`]: Literal and reference parts packed into one string
//! - [`Change`]: Addition, removal or modification of an element
//! - [`ElementGraph`]: Unique-id element set implementing [`ElementSource`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_element::{ElemId, InstanceElement, ObjectType, Value, Values};
//!
//! let rule_type = Arc::new(ObjectType::new(ElemId::new_type("salesforce", "Rule")));
//! let mut rule = InstanceElement::new("first", rule_type, Values::new());
//! rule.set_value("Name", "First rule");
//!
//! assert_eq!(rule.elem_id().full_name(), "salesforce.Rule.instance.first");
//! assert_eq!(rule.get("Name").and_then(Value::as_str), Some("First rule"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod change;
mod elem_id;
mod element;
mod graph;
mod value;
pub mod walk;

pub use change::{ActionName, Change, ChangeError, ChangeId, Severity};
pub use elem_id::{ElemId, ElemIdError, IdType, NAME_SEPARATOR};
pub use element::{
    annotations, Element, ElementError, Field, FieldType, InstanceElement, ObjectType,
};
pub use graph::{ElementGraph, ElementSource};
pub use value::{
    values_from_json, values_to_json, ReferenceExpression, Scalar, TemplateExpression, TemplatePart,
    Value, Values,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with elements
    pub use crate::{
        ActionName, Change, ChangeError, ElemId, Element, ElementSource, InstanceElement,
        ObjectType, ReferenceExpression, Severity, TemplateExpression, TemplatePart, Value, Values,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
