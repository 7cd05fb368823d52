//! Managed package validator
//!
//! Elements installed from a managed package belong to the package publisher.
//! They may not be added or removed, only their help text and description may
//! be modified, and the package version may not be changed from here.

use std::collections::BTreeSet;

use trellis_deploy::constants::CUSTOM_OBJECT;
use trellis_element::{annotations, ActionName, Change, ChangeError, ChangeId, Element, Values};
use trellis_reference::api_name;

use crate::validator::ChangeValidator;

/// Separator between a package namespace and the rest of an API name
pub const NAMESPACE_SEPARATOR: &str = "__";
/// Metadata type of installed package instances
pub const INSTALLED_PACKAGE_METADATA: &str = "InstalledPackage";
/// Version field of installed package instances
pub const PACKAGE_VERSION_FIELD_NAME: &str = "version_number";
/// Properties of packaged elements that may be modified
pub const MODIFIABLE_PROPERTIES: [&str; 2] = ["inlineHelpText", "description"];

const INSTANCE_SUFFIXES: [&str; 11] = [
    "c", "r", "mdt", "e", "b", "x", "xo", "share", "kav", "feed", "history",
];

fn relative_api_name(element: &Element) -> Option<String> {
    let full = api_name(element)?;
    Some(match full.rsplit_once('.') {
        Some((_, last)) => last.to_string(),
        None => full,
    })
}

/// Whether an element's API name carries a package namespace
#[must_use]
pub fn has_namespace(element: &Element) -> bool {
    let Some(name) = relative_api_name(element) else {
        return false;
    };
    let partial = name.split('-').next().unwrap_or_default();
    let clean = INSTANCE_SUFFIXES
        .iter()
        .find_map(|suffix| partial.strip_suffix(&format!("{NAMESPACE_SEPARATOR}{suffix}")))
        .unwrap_or(partial);
    clean.contains(NAMESPACE_SEPARATOR)
}

/// Package namespace of an element
#[must_use]
pub fn namespace(element: &Element) -> String {
    relative_api_name(element)
        .and_then(|name| name.split(NAMESPACE_SEPARATOR).next().map(str::to_string))
        .unwrap_or_default()
}

fn is_custom_object(element: &Element) -> bool {
    element
        .as_object_type()
        .is_some_and(|ty| ty.annotation_str(annotations::METADATA_TYPE) == Some(CUSTOM_OBJECT))
}

fn changed_keys(before: &Values, after: &Values, into: &mut BTreeSet<String>) {
    for (key, value) in after {
        if before.get(key) != Some(value) {
            into.insert(key.clone());
        }
    }
    for key in before.keys() {
        if !after.contains_key(key) {
            into.insert(key.clone());
        }
    }
}

/// Names of the properties a modification touches
fn modified_properties(before: &Element, after: &Element) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    changed_keys(before.annotations(), after.annotations(), &mut keys);
    match (before, after) {
        (Element::ObjectType(b), Element::ObjectType(a)) => {
            for (name, field) in a.fields() {
                match b.field(name) {
                    Some(old) if old.field_type() != field.field_type() => {
                        keys.insert(name.clone());
                    }
                    Some(old) => changed_keys(old.annotations(), field.annotations(), &mut keys),
                    None => {
                        keys.insert(name.clone());
                    }
                }
            }
            keys.extend(b.fields().keys().filter(|name| a.field(name).is_none()).cloned());
        }
        (Element::Field(b), Element::Field(a)) if b.field_type() != a.field_type() => {
            keys.insert("type".to_string());
        }
        (Element::Instance(b), Element::Instance(a)) => {
            changed_keys(b.value(), a.value(), &mut keys);
        }
        _ => {}
    }
    keys
}

fn package_change_error(
    action: ActionName,
    element: &Element,
    detailed: Option<String>,
) -> ChangeError {
    let package = namespace(element);
    let detailed = detailed.unwrap_or_else(|| {
        format!(
            "Cannot {action} {} because it is part of a package namespace: {package}",
            element.elem_id()
        )
    });
    ChangeError::error(
        element.elem_id().clone(),
        format!("Cannot change a managed package. Package namespace: {package}"),
        detailed,
    )
}

fn is_installed_package_version_change(change: &Change) -> bool {
    let Change::Modification {
        before: Element::Instance(before),
        after: Element::Instance(after),
    } = change
    else {
        return false;
    };
    after.ref_type().annotation_str(annotations::METADATA_TYPE) == Some(INSTALLED_PACKAGE_METADATA)
        && before.get(PACKAGE_VERSION_FIELD_NAME) != after.get(PACKAGE_VERSION_FIELD_NAME)
}

/// Blocks changes to managed package elements
#[derive(Debug, Clone, Copy, Default)]
pub struct PackageValidator;

impl ChangeValidator for PackageValidator {
    fn name(&self) -> &'static str {
        "package"
    }

    fn validate(&self, changes: &[Change]) -> Vec<ChangeError> {
        let packaged = changes.iter().filter(|change| {
            let data = change.data();
            (is_custom_object(data) || matches!(data, Element::Field(_))) && has_namespace(data)
        });

        let mut add_remove = Vec::new();
        let mut modify = Vec::new();
        for change in packaged {
            match change {
                Change::Addition { .. } | Change::Removal { .. } => {
                    add_remove.push(package_change_error(change.action(), change.data(), None));
                }
                Change::Modification { before, after } => {
                    let invalid = modified_properties(before, after)
                        .iter()
                        .any(|key| !MODIFIABLE_PROPERTIES.contains(&key.as_str()));
                    if invalid {
                        modify.push(package_change_error(
                            ActionName::Modify,
                            after,
                            Some(format!(
                                "Modification is forbidden of any property that is not one of \
                                 the following: {}",
                                MODIFIABLE_PROPERTIES.join(", ")
                            )),
                        ));
                    }
                }
            }
        }

        let remove_with_package_fields = changes.iter().filter_map(|change| {
            let Change::Removal {
                before: element @ Element::ObjectType(ty),
            } = change
            else {
                return None;
            };
            let has_packaged_field = ty
                .fields()
                .values()
                .any(|field| has_namespace(&Element::Field(field.clone())));
            (!has_namespace(element) && has_packaged_field).then(|| {
                package_change_error(
                    ActionName::Remove,
                    element,
                    Some(format!(
                        "Cannot remove type with id {} because some of its fields belong to a \
                         managed package",
                        element.elem_id()
                    )),
                )
            })
        });

        let version_changes = changes
            .iter()
            .filter(|change| is_installed_package_version_change(change))
            .map(|change| {
                package_change_error(
                    change.action(),
                    change.data(),
                    Some(format!(
                        "Cannot change installed package version with id: {}",
                        change.change_id()
                    )),
                )
            });

        add_remove
            .into_iter()
            .chain(modify)
            .chain(remove_with_package_fields)
            .chain(version_changes)
            .collect()
    }
}
