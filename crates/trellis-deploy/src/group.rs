//! Change groups
//!
//! Changes in one group are deployed together as one external transaction, and
//! group membership decides which changes may reference each other before they
//! have server-assigned identifiers.

use indexmap::IndexMap;
use trellis_element::{annotations, ActionName, Change, ChangeId, Element, InstanceElement};
pub use trellis_reference::DEFAULT_METADATA_GROUP as METADATA_GROUP;

use crate::constants::{CUSTOM_OBJECT, SBAA_APPROVAL_CONDITION, SBAA_APPROVAL_RULE};

/// Group of approval rule and approval condition additions
pub const ADD_APPROVAL_RULE_AND_CONDITION_GROUP: &str = "add_approval_rule_and_condition_instances";

/// A named set of changes deployed together
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeGroup {
    /// Group id
    pub group_id: String,
    /// Changes of the group
    pub changes: Vec<Change>,
}

impl ChangeGroup {
    /// Create a group
    #[inline]
    #[must_use]
    pub fn new(group_id: impl Into<String>, changes: Vec<Change>) -> Self {
        Self {
            group_id: group_id.into(),
            changes,
        }
    }

    /// Number of changes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the group is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether this is the designated metadata group
    #[inline]
    #[must_use]
    pub fn is_metadata_group(&self) -> bool {
        self.group_id == METADATA_GROUP
    }

    /// Split into instance changes and the rest
    #[must_use]
    pub fn partition_instance_changes(self) -> (Vec<Change<InstanceElement>>, Vec<Change>) {
        let mut instances = Vec::new();
        let mut others = Vec::new();
        for change in self.changes {
            if change.data().is_instance() {
                if let Ok(instance_change) = change.into_instance_change() {
                    instances.push(instance_change);
                }
            } else {
                others.push(change);
            }
        }
        (instances, others)
    }
}

/// Whether an instance is a data record rather than metadata
#[must_use]
pub fn is_custom_object_instance(instance: &InstanceElement) -> bool {
    instance.ref_type().annotation_str(annotations::METADATA_TYPE) == Some(CUSTOM_OBJECT)
}

/// Group id a change is deployed in
///
/// Types, fields and metadata instances go to the metadata group. Additions of
/// approval rules and conditions share one group so conditions can be linked
/// to rules created alongside them. Other data records are grouped by action
/// and type.
#[must_use]
pub fn change_group_id(change: &Change) -> String {
    let Element::Instance(instance) = change.data() else {
        return METADATA_GROUP.to_string();
    };
    if !is_custom_object_instance(instance) {
        return METADATA_GROUP.to_string();
    }
    let type_name = instance.type_name();
    if change.action() == ActionName::Add
        && (type_name == SBAA_APPROVAL_RULE || type_name == SBAA_APPROVAL_CONDITION)
    {
        return ADD_APPROVAL_RULE_AND_CONDITION_GROUP.to_string();
    }
    format!("{}_{type_name}_instances", change.action())
}

/// Group changes, keeping groups and changes in first-seen order
#[must_use]
pub fn group_changes(changes: Vec<Change>) -> Vec<ChangeGroup> {
    let mut groups: IndexMap<String, Vec<Change>> = IndexMap::new();
    for change in changes {
        tracing::trace!(change = %change.change_id(), "assigning change group");
        groups.entry(change_group_id(&change)).or_default().push(change);
    }
    groups
        .into_iter()
        .map(|(group_id, changes)| ChangeGroup::new(group_id, changes))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_element::{ElemId, ObjectType, Values};

    fn data_type(name: &str) -> Arc<ObjectType> {
        Arc::new(
            ObjectType::new(ElemId::new_type("salesforce", name))
                .with_annotation(annotations::METADATA_TYPE, CUSTOM_OBJECT),
        )
    }

    fn add(type_name: &str, name: &str) -> Change {
        Change::Addition {
            after: Element::Instance(InstanceElement::new(
                name,
                data_type(type_name),
                Values::new(),
            )),
        }
    }

    #[test]
    fn metadata_changes() {
        let ty = ObjectType::new(ElemId::new_type("salesforce", "Account"));
        let change = Change::Addition {
            after: Element::ObjectType(ty),
        };
        assert_eq!(change_group_id(&change), METADATA_GROUP);

        let layout_type = Arc::new(ObjectType::new(ElemId::new_type("salesforce", "Layout")));
        let change = Change::Addition {
            after: Element::Instance(InstanceElement::new("l", layout_type, Values::new())),
        };
        assert_eq!(change_group_id(&change), METADATA_GROUP);
    }

    #[test]
    fn approval_additions_share_a_group() {
        assert_eq!(
            change_group_id(&add(SBAA_APPROVAL_RULE, "r")),
            ADD_APPROVAL_RULE_AND_CONDITION_GROUP
        );
        assert_eq!(
            change_group_id(&add(SBAA_APPROVAL_CONDITION, "c")),
            ADD_APPROVAL_RULE_AND_CONDITION_GROUP
        );
        let removal = Change::Removal {
            before: add(SBAA_APPROVAL_RULE, "r").into_data(),
        };
        assert_eq!(change_group_id(&removal), "remove_sbaa__ApprovalRule__c_instances");
    }

    #[test]
    fn data_records_by_action_and_type() {
        assert_eq!(change_group_id(&add("Product2", "p")), "add_Product2_instances");
    }

    #[test]
    fn grouping_keeps_order() {
        let groups = group_changes(vec![
            add("Product2", "p1"),
            add(SBAA_APPROVAL_RULE, "r"),
            add("Product2", "p2"),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].group_id, "add_Product2_instances");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].group_id, ADD_APPROVAL_RULE_AND_CONDITION_GROUP);
    }

    #[test]
    fn partition() {
        let ty = ObjectType::new(ElemId::new_type("salesforce", "Account"));
        let group = ChangeGroup::new(
            "g",
            vec![add("Product2", "p1"), Change::Addition { after: Element::ObjectType(ty) }],
        );
        let (instances, others) = group.partition_instance_changes();
        assert_eq!(instances.len(), 1);
        assert_eq!(others.len(), 1);
    }
}
