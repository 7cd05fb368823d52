//! Element graph and element sources
//!
//! [`ElementGraph`] is the in-memory set of elements of one fetch or deploy
//! session. It guarantees id uniqueness and resolves field ids through their
//! owning type. [`ElementSource`] is the read-only view other components use to
//! look up elements they do not own, for example the result of a previous fetch.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::elem_id::{ElemId, IdType};
use crate::element::{Element, ElementError, InstanceElement};

/// Read-only element lookup
pub trait ElementSource: Send + Sync {
    /// Element by id
    fn get(&self, id: &ElemId) -> Option<Arc<Element>>;

    /// Ids of every element in the source
    fn ids(&self) -> Vec<ElemId>;

    /// Whether an element exists
    fn has(&self, id: &ElemId) -> bool {
        self.get(id).is_some()
    }
}

/// Unique-id element set
#[derive(Debug, Clone, Default)]
pub struct ElementGraph {
    elements: IndexMap<ElemId, Arc<Element>>,
}

impl ElementGraph {
    /// Empty graph
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from elements
    ///
    /// # Errors
    /// Returns [`ElementError::DuplicateElement`] if two elements share an id.
    pub fn from_elements(
        elements: impl IntoIterator<Item = Element>,
    ) -> Result<Self, ElementError> {
        let mut graph = Self::new();
        for element in elements {
            graph.insert(element)?;
        }
        Ok(graph)
    }

    /// Insert a new element
    ///
    /// # Errors
    /// Returns [`ElementError::DuplicateElement`] if the id is taken.
    pub fn insert(&mut self, element: Element) -> Result<(), ElementError> {
        let id = element.elem_id().clone();
        if self.elements.contains_key(&id) {
            return Err(ElementError::DuplicateElement(id));
        }
        self.elements.insert(id, Arc::new(element));
        Ok(())
    }

    /// Insert or replace an element
    pub fn upsert(&mut self, element: Element) {
        self.elements.insert(element.elem_id().clone(), Arc::new(element));
    }

    /// Remove an element
    pub fn remove(&mut self, id: &ElemId) -> Option<Arc<Element>> {
        self.elements.shift_remove(id)
    }

    /// Resolve an id to an element
    ///
    /// Top level ids resolve directly; field ids resolve through their type.
    /// Unknown ids resolve to `None`.
    #[must_use]
    pub fn resolve(&self, id: &ElemId) -> Option<Arc<Element>> {
        if let Some(element) = self.elements.get(id) {
            return Some(Arc::clone(element));
        }
        if id.id_type() == IdType::Field && id.is_top_level() {
            let owner = self.elements.get(&id.type_id())?.as_object_type()?;
            return owner
                .field(id.name())
                .map(|field| Arc::new(Element::Field(field.clone())));
        }
        None
    }

    /// Children of the element with `id`
    #[must_use]
    pub fn children(&self, id: &ElemId) -> Vec<Element> {
        self.resolve(id).map(|e| e.children()).unwrap_or_default()
    }

    /// Number of top level elements
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the graph is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate elements in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Element>> {
        self.elements.values()
    }

    /// Instances of a type name
    pub fn instances_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a InstanceElement> + 'a {
        self.elements
            .values()
            .filter_map(|e| e.as_instance())
            .filter(move |inst| inst.type_name() == type_name)
    }

    /// Consume into owned elements
    #[must_use]
    pub fn into_elements(self) -> Vec<Element> {
        self.elements
            .into_values()
            .map(|e| Arc::try_unwrap(e).unwrap_or_else(|shared| (*shared).clone()))
            .collect()
    }
}

impl ElementSource for ElementGraph {
    fn get(&self, id: &ElemId) -> Option<Arc<Element>> {
        self.resolve(id)
    }

    fn ids(&self) -> Vec<ElemId> {
        self.elements.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Field, FieldType, ObjectType};
    use crate::value::Values;

    fn rule_type() -> ObjectType {
        let id = ElemId::new_type("sf", "Rule");
        ObjectType::new(id.clone()).with_field(Field::new(&id, "Name", FieldType::String))
    }

    #[test]
    fn rejects_duplicates() {
        let result = ElementGraph::from_elements(vec![
            Element::ObjectType(rule_type()),
            Element::ObjectType(rule_type()),
        ]);
        assert!(matches!(result, Err(ElementError::DuplicateElement(_))));
    }

    #[test]
    fn resolve_top_level_and_fields() {
        let ty = Arc::new(rule_type());
        let inst = InstanceElement::new("r1", Arc::clone(&ty), Values::new());
        let graph = ElementGraph::from_elements(vec![
            Element::ObjectType((*ty).clone()),
            Element::Instance(inst.clone()),
        ])
        .unwrap();

        assert_eq!(
            graph.resolve(inst.elem_id()).unwrap().as_instance(),
            Some(&inst)
        );
        let field = graph.resolve(&ElemId::field("sf", "Rule", "Name")).unwrap();
        assert_eq!(field.as_field().unwrap().name(), "Name");
        assert!(graph.resolve(&ElemId::field("sf", "Rule", "Missing")).is_none());
        assert!(graph.resolve(&ElemId::instance("sf", "Rule", "nope")).is_none());
    }

    #[test]
    fn children_and_instances() {
        let ty = Arc::new(rule_type());
        let graph = ElementGraph::from_elements(vec![
            Element::ObjectType((*ty).clone()),
            Element::Instance(InstanceElement::new("r1", Arc::clone(&ty), Values::new())),
            Element::Instance(InstanceElement::new("r2", ty, Values::new())),
        ])
        .unwrap();
        assert_eq!(graph.children(&ElemId::new_type("sf", "Rule")).len(), 1);
        assert!(graph.children(&ElemId::instance("sf", "Rule", "r1")).is_empty());
        assert_eq!(graph.instances_of_type("Rule").count(), 2);
        assert!(graph.has(&ElemId::instance("sf", "Rule", "r2")));
        assert_eq!(graph.into_elements().len(), 3);
    }
}
