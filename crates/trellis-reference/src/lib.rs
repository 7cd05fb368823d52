//! Trellis Reference System
//!
//! Resolution of cross-element references for deployment, and the positional
//! index template codec.
//!
//! # Overview
//!
//! - **LookupContext / resolve_reference**: Same-group precedence rule for references
//! - **ReferenceStrategy**: How a target is serialized (id, API name, field value)
//! - **ReferenceResolver**: Resolve whole instances and changes
//! - **Template codec**: `"1 AND 2"` to and from references to indexed records
//! - **ReferenceIndex / WeakReferenceHandler**: Reverse lookup and optional references
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trellis_element::{
//!     Change, ElemId, Element, InstanceElement, ObjectType, ReferenceExpression, Values,
//! };
//! use trellis_reference::{resolve_reference, LookupContext};
//!
//! let ty = Arc::new(ObjectType::new(ElemId::new_type("salesforce", "Product2")));
//! let product = InstanceElement::new("widget", ty, Values::new());
//! let reference = ReferenceExpression::to_element(Arc::new(Element::Instance(product.clone())));
//!
//! // The product is created by the same group, so it has no id to refer to yet.
//! let changes = vec![Change::Addition { after: product }];
//! let context = LookupContext::for_group("add_Product2_instances", &changes);
//! assert!(resolve_reference(&reference, None, &context).is_unresolved());
//! ```

#![warn(missing_docs)]

pub mod index;
pub mod resolver;
pub mod strategy;
pub mod template;

// Re-exports
pub use index::{
    FixElementsResult, ListFieldWeakReferences, ReferenceIndex, ReferenceInfo, ReferenceKind,
    WeakReferenceHandler,
};
pub use resolver::{
    resolve_reference, LookupContext, ReferenceResolver, Resolution, UnresolvedPolicy,
    DEFAULT_METADATA_GROUP,
};
pub use strategy::{
    api_name, ApiNameStrategy, FieldValueStrategy, IdStrategy, ReferenceStrategy, SerializationRule,
    SerializationRules, FULL_NAME_FIELD, ID_FIELD,
};
pub use template::{
    pack_from_template, replace_templates_with_values, restore_templates, split_digit_runs,
    unpack_to_template, TemplateError, TemplateMapping, UnpackOutcome,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for reference resolution
    pub use crate::{
        resolve_reference, IdStrategy, LookupContext, ReferenceResolver, ReferenceStrategy,
        Resolution, TemplateMapping, UnresolvedPolicy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
