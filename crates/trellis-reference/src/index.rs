//! Reverse reference index and weak reference handling
//!
//! [`ReferenceIndex`] maps each referenced element to the places that point at
//! it. [`WeakReferenceHandler`]s decide which references are optional and strip
//! those whose target no longer exists, so an element can still be deployed to
//! an environment that lacks some of its optional dependencies.

use std::collections::HashMap;

use tracing::debug;
use trellis_element::walk::walk_references;
use trellis_element::{ChangeError, ElemId, Element, ElementSource, Value};

/// One place that references a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    /// Nested id of the referring value
    pub source: ElemId,
    /// Referenced element
    pub target: ElemId,
    /// Whether the reference may be removed when the target is missing
    pub kind: ReferenceKind,
}

/// Strength of a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceKind {
    /// Required for the referring element to be valid
    #[default]
    Strong,
    /// Optional; may be dropped
    Weak,
}

/// Reverse index: target id to referring value ids
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    by_target: HashMap<ElemId, Vec<ElemId>>,
}

impl ReferenceIndex {
    /// Index every reference held by `elements`
    #[must_use]
    pub fn build<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Self {
        let mut by_target: HashMap<ElemId, Vec<ElemId>> = HashMap::new();
        for element in elements {
            let Some(instance) = element.as_instance() else {
                continue;
            };
            walk_references(instance.value(), |path, reference| {
                by_target
                    .entry(reference.elem_id().clone())
                    .or_default()
                    .push(instance.elem_id().create_nested_id(path));
            });
        }
        Self { by_target }
    }

    /// Values that reference `target`
    #[inline]
    #[must_use]
    pub fn referrers_of(&self, target: &ElemId) -> &[ElemId] {
        self.by_target.get(target).map_or(&[], Vec::as_slice)
    }

    /// Number of distinct targets
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    /// Whether no references were found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

/// Elements rewritten by [`WeakReferenceHandler::remove_weak_references`]
#[derive(Debug, Clone, Default)]
pub struct FixElementsResult {
    /// Rewritten copies of the elements that changed
    pub fixed_elements: Vec<Element>,
    /// One warning per rewritten element
    pub errors: Vec<ChangeError>,
}

/// Finds and strips optional references
pub trait WeakReferenceHandler: Send + Sync {
    /// References this handler considers, weak or strong
    fn find_weak_references(&self, elements: &[Element]) -> Vec<ReferenceInfo>;

    /// Remove weak references whose target is missing from `source`
    fn remove_weak_references(
        &self,
        elements: &[Element],
        source: &dyn ElementSource,
    ) -> FixElementsResult;
}

/// Entries of a sequence field that are references to optional elements
///
/// For example the list of fields attached to a helpdesk form: the form can be
/// deployed without the ones that do not exist in the target environment.
#[derive(Debug, Clone)]
pub struct ListFieldWeakReferences {
    type_name: String,
    field: String,
}

impl ListFieldWeakReferences {
    /// Handler for sequence `field` of instances of `type_name`
    #[must_use]
    pub fn new(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    fn entries<'a>(&self, element: &'a Element) -> Option<&'a [Value]> {
        let instance = element.as_instance()?;
        if instance.type_name() != self.type_name {
            return None;
        }
        instance.get(&self.field)?.as_sequence()
    }
}

impl WeakReferenceHandler for ListFieldWeakReferences {
    fn find_weak_references(&self, elements: &[Element]) -> Vec<ReferenceInfo> {
        elements
            .iter()
            .filter_map(|element| Some((element, self.entries(element)?)))
            .flat_map(|(element, entries)| {
                entries.iter().enumerate().filter_map(move |(idx, entry)| {
                    let reference = entry.as_reference()?;
                    Some(ReferenceInfo {
                        source: element
                            .elem_id()
                            .create_nested_id(&[self.field.clone(), idx.to_string()]),
                        target: reference.elem_id().clone(),
                        kind: ReferenceKind::Weak,
                    })
                })
            })
            .collect()
    }

    fn remove_weak_references(
        &self,
        elements: &[Element],
        source: &dyn ElementSource,
    ) -> FixElementsResult {
        let mut result = FixElementsResult::default();
        for element in elements {
            let Some(entries) = self.entries(element) else {
                continue;
            };
            let kept: Vec<Value> = entries
                .iter()
                .filter(|entry| {
                    entry
                        .as_reference()
                        .map_or(true, |reference| source.has(reference.elem_id()))
                })
                .cloned()
                .collect();
            if kept.len() == entries.len() {
                continue;
            }

            debug!(
                element = %element.elem_id(),
                removed = entries.len() - kept.len(),
                "removing references to missing elements"
            );
            let mut fixed = element.clone();
            if let Some(instance) = fixed.as_instance_mut() {
                instance.set_value(self.field.clone(), Value::Sequence(kept));
            }
            result.errors.push(ChangeError::warning(
                element.elem_id().clone(),
                format!(
                    "Deploying {} without all attached {}",
                    element.elem_id().name(),
                    self.field
                ),
                format!(
                    "This {} is attached to some {} that do not exist in the target environment. \
                     It will be deployed without referencing these.",
                    self.type_name, self.field
                ),
            ));
            result.fixed_elements.push(fixed);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_element::{
        ElementGraph, InstanceElement, ObjectType, ReferenceExpression, Severity, Values,
    };

    fn ticket_field(name: &str) -> InstanceElement {
        let ty = Arc::new(ObjectType::new(ElemId::new_type("zendesk", "ticket_field")));
        InstanceElement::new(name, ty, Values::new())
    }

    fn form(fields: &[&InstanceElement]) -> Element {
        let ty = Arc::new(ObjectType::new(ElemId::new_type("zendesk", "ticket_form")));
        let mut inst = InstanceElement::new("support", ty, Values::new());
        inst.set_value(
            "ticket_field_ids",
            Value::Sequence(
                fields
                    .iter()
                    .map(|f| Value::Reference(ReferenceExpression::new(f.elem_id().clone())))
                    .chain(std::iter::once(Value::int(123)))
                    .collect(),
            ),
        );
        Element::Instance(inst)
    }

    #[test]
    fn index_referrers() {
        let a = ticket_field("a");
        let b = ticket_field("b");
        let elements = vec![form(&[&a, &b])];
        let index = ReferenceIndex::build(&elements);
        assert_eq!(index.len(), 2);
        assert_eq!(
            index.referrers_of(a.elem_id())[0].full_name(),
            "zendesk.ticket_form.instance.support.ticket_field_ids.0"
        );
        assert!(index.referrers_of(&ElemId::new_type("zendesk", "x")).is_empty());
    }

    #[test]
    fn find_weak_references() {
        let a = ticket_field("a");
        let handler = ListFieldWeakReferences::new("ticket_form", "ticket_field_ids");
        let refs = handler.find_weak_references(&[form(&[&a])]);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, ReferenceKind::Weak);
        assert_eq!(&refs[0].target, a.elem_id());
    }

    #[test]
    fn remove_missing_targets() {
        let a = ticket_field("a");
        let b = ticket_field("b");
        let source = ElementGraph::from_elements(vec![Element::Instance(a.clone())]).unwrap();
        let handler = ListFieldWeakReferences::new("ticket_form", "ticket_field_ids");

        let result = handler.remove_weak_references(&[form(&[&a, &b])], &source);
        assert_eq!(result.fixed_elements.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity, Severity::Warning);
        let fixed = result.fixed_elements[0].as_instance().unwrap();
        assert_eq!(fixed.get("ticket_field_ids").unwrap().as_sequence().unwrap().len(), 2);
    }

    #[test]
    fn nothing_to_fix() {
        let a = ticket_field("a");
        let source = ElementGraph::from_elements(vec![Element::Instance(a.clone())]).unwrap();
        let handler = ListFieldWeakReferences::new("ticket_form", "ticket_field_ids");
        let result = handler.remove_weak_references(&[form(&[&a])], &source);
        assert!(result.fixed_elements.is_empty());
        assert!(result.errors.is_empty());
    }
}
