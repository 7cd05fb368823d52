//! Data category group deploys can remove categories in the target

use trellis_element::{annotations, Change, ChangeError, Element};

use crate::validator::ChangeValidator;

/// Metadata type of data category groups
pub const DATA_CATEGORY_GROUP_METADATA_TYPE: &str = "DataCategoryGroup";

const DESTRUCTIVE_DETAIL: &str = "Deploying category changes from one environment to another \
    may permanently remove some categories and record categorizations. It is recommended to \
    manually create data categories and record associations from Setup, under Data Categories.";

/// Warns on every addition or modification of a data category group
#[derive(Debug, Clone, Copy, Default)]
pub struct DataCategoryGroupValidator;

impl ChangeValidator for DataCategoryGroupValidator {
    fn name(&self) -> &'static str {
        "data_category_group"
    }

    fn validate(&self, changes: &[Change]) -> Vec<ChangeError> {
        changes
            .iter()
            .filter(|change| change.is_addition_or_modification())
            .filter_map(|change| match change.data() {
                Element::Instance(instance)
                    if instance.ref_type().annotation_str(annotations::METADATA_TYPE)
                        == Some(DATA_CATEGORY_GROUP_METADATA_TYPE) =>
                {
                    Some(ChangeError::warning(
                        instance.elem_id().clone(),
                        "DataCategoryGroup deployments may be destructive",
                        DESTRUCTIVE_DETAIL,
                    ))
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_element::{ElemId, InstanceElement, ObjectType, Values};

    #[test]
    fn warns_on_add_and_modify_only() {
        let ty = Arc::new(
            ObjectType::new(ElemId::new_type("salesforce", DATA_CATEGORY_GROUP_METADATA_TYPE))
                .with_annotation(annotations::METADATA_TYPE, DATA_CATEGORY_GROUP_METADATA_TYPE),
        );
        let group = Element::Instance(InstanceElement::new("Regions", ty, Values::new()));
        let changes = vec![
            Change::Addition { after: group.clone() },
            Change::Modification {
                before: group.clone(),
                after: group.clone(),
            },
            Change::Removal { before: group },
        ];
        let warnings = DataCategoryGroupValidator.validate(&changes);
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| !w.is_blocking()));
    }
}
