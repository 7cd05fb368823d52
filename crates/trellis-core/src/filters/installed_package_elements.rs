//! Dependencies on installed packages
//!
//! Reads: the API names of types, fields and instances, and the fetched
//! `InstalledPackage` instances. Writes: the `_generated_dependencies`
//! annotation of every namespaced element, pointing at the package that owns
//! the namespace. Fields get their own dependency only when their type is not
//! itself namespaced.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trellis_element::{annotations, Element, ReferenceExpression, Value, Values};
use trellis_reference::api_name;
use trellis_validation::validators::{has_namespace, namespace, INSTALLED_PACKAGE_METADATA};

use crate::error::AdapterError;
use crate::filter::{FetchFilterOutput, Filter, FilterContext};

const REFERENCE_KEY: &str = "reference";

/// Add `reference` to the generated dependencies unless already there
fn extend_generated_dependencies(target: &mut Values, reference: &ReferenceExpression) -> bool {
    let entry = target
        .entry(annotations::GENERATED_DEPENDENCIES.to_string())
        .or_insert_with(|| Value::Sequence(Vec::new()));
    let Value::Sequence(dependencies) = entry else {
        return false;
    };
    let exists = dependencies.iter().any(|dependency| {
        dependency
            .as_mapping()
            .and_then(|m| m.get(REFERENCE_KEY))
            .and_then(Value::as_reference)
            .is_some_and(|existing| existing == reference)
    });
    if exists {
        return false;
    }
    let mut dependency = Values::new();
    dependency.insert(REFERENCE_KEY.to_string(), Value::Reference(reference.clone()));
    dependencies.push(Value::Mapping(dependency));
    true
}

fn package_of<'a>(
    packages: &'a HashMap<String, ReferenceExpression>,
    element: &Element,
) -> Option<&'a ReferenceExpression> {
    if !has_namespace(element) {
        return None;
    }
    packages.get(&namespace(element))
}

/// Links namespaced elements to their installed package
#[derive(Debug, Clone, Copy, Default)]
pub struct InstalledPackageElementsFilter;

#[async_trait]
impl Filter for InstalledPackageElementsFilter {
    fn name(&self) -> &'static str {
        "installedPackageElements"
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        _context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        let packages: HashMap<String, ReferenceExpression> = elements
            .iter()
            .filter(|element| {
                element
                    .as_instance()
                    .is_some_and(|instance| instance.type_name() == INSTALLED_PACKAGE_METADATA)
            })
            .filter_map(|element| {
                let name = api_name(element)?;
                Some((name, ReferenceExpression::to_element(Arc::new(element.clone()))))
            })
            .collect();
        if packages.is_empty() {
            return Ok(FetchFilterOutput::empty());
        }
        let mut linked = 0_usize;
        for element in elements.iter_mut() {
            if let Some(reference) = package_of(&packages, element) {
                linked += usize::from(extend_generated_dependencies(
                    element.annotations_mut(),
                    reference,
                ));
                continue;
            }
            let Element::ObjectType(ty) = element else {
                continue;
            };
            for field in ty.fields_mut().values_mut() {
                if let Some(reference) = package_of(&packages, &Element::Field(field.clone())) {
                    linked += usize::from(extend_generated_dependencies(
                        field.annotations_mut(),
                        reference,
                    ));
                }
            }
        }
        debug!(packages = packages.len(), linked, "linked elements to installed packages");
        Ok(FetchFilterOutput::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::TestContext;
    use serde_json::json;
    use trellis_element::{ElemId, Field, FieldType, ObjectType};
    use trellis_test_utils::{instance, metadata_type};

    fn package(namespace: &str) -> Element {
        Element::Instance(instance(
            &metadata_type(INSTALLED_PACKAGE_METADATA),
            namespace,
            json!({ "fullName": namespace, "version_number": "1.0" }),
        ))
    }

    fn dependencies(element: &Element) -> Vec<ElemId> {
        element
            .annotations()
            .get(annotations::GENERATED_DEPENDENCIES)
            .and_then(Value::as_sequence)
            .unwrap_or_default()
            .iter()
            .filter_map(|d| d.as_mapping()?.get(REFERENCE_KEY)?.as_reference())
            .map(|r| r.elem_id().clone())
            .collect()
    }

    fn package_id(namespace: &str) -> ElemId {
        ElemId::instance("salesforce", INSTALLED_PACKAGE_METADATA, namespace)
    }

    #[tokio::test]
    async fn namespaced_elements_depend_on_their_package() {
        let custom_object = ObjectType::new(ElemId::new_type("salesforce", "SBQQ__Quote__c"))
            .with_annotation(annotations::API_NAME, "SBQQ__Quote__c");
        let standard_id = ElemId::new_type("salesforce", "Account");
        let standard_object = ObjectType::new(standard_id.clone())
            .with_annotation(annotations::API_NAME, "Account")
            .with_field(Field::new(&standard_id, "SBQQ__Tier__c", FieldType::String))
            .with_field(Field::new(&standard_id, "Name", FieldType::String));
        let flow = instance(
            &metadata_type("Flow"),
            "SBQQ__Renewal",
            json!({ "fullName": "SBQQ__Renewal" }),
        );
        let plain = instance(&metadata_type("Flow"), "Local", json!({ "fullName": "Local" }));
        let mut elements = vec![
            package("SBQQ"),
            Element::ObjectType(custom_object),
            Element::ObjectType(standard_object),
            Element::Instance(flow),
            Element::Instance(plain),
        ];
        let ctx = TestContext::new();

        InstalledPackageElementsFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert_eq!(dependencies(&elements[1]), vec![package_id("SBQQ")]);
        assert!(dependencies(&elements[2]).is_empty());
        let account = elements[2].as_object_type().unwrap();
        assert_eq!(
            dependencies(&Element::Field(account.field("SBQQ__Tier__c").unwrap().clone())),
            vec![package_id("SBQQ")]
        );
        assert!(dependencies(&Element::Field(account.field("Name").unwrap().clone())).is_empty());
        assert_eq!(dependencies(&elements[3]), vec![package_id("SBQQ")]);
        assert!(dependencies(&elements[4]).is_empty());
    }

    #[tokio::test]
    async fn unknown_namespaces_are_left_alone() {
        let flow = instance(
            &metadata_type("Flow"),
            "sbaa__Renewal",
            json!({ "fullName": "sbaa__Renewal" }),
        );
        let mut elements = vec![package("SBQQ"), Element::Instance(flow)];
        let ctx = TestContext::new();

        InstalledPackageElementsFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();
        assert!(dependencies(&elements[1]).is_empty());
    }

    #[test]
    fn dependencies_are_not_duplicated() {
        let reference = ReferenceExpression::new(package_id("SBQQ"));
        let mut values = Values::new();
        assert!(extend_generated_dependencies(&mut values, &reference));
        assert!(!extend_generated_dependencies(&mut values, &reference));
        assert_eq!(
            values
                .get(annotations::GENERATED_DEPENDENCIES)
                .and_then(Value::as_sequence)
                .map(<[Value]>::len),
            Some(1)
        );
    }
}
