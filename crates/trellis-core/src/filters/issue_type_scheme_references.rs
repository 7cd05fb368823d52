//! Issue type scheme mappings
//!
//! Reads and writes the `issueTypes` field of `IssueTypeScheme` instances:
//! each `{ issueTypeId: <ref> }` mapping is replaced by the reference itself.

use async_trait::async_trait;
use tracing::debug;
use trellis_element::{Element, Value};

use crate::constants::ISSUE_TYPE_SCHEME;
use crate::error::AdapterError;
use crate::filter::{FetchFilterOutput, Filter, FilterContext};

const ISSUE_TYPES_FIELD: &str = "issueTypes";
const ISSUE_TYPE_ID_FIELD: &str = "issueTypeId";

/// Flattens issue type mappings of issue type schemes
#[derive(Debug, Clone, Copy, Default)]
pub struct IssueTypeSchemeReferencesFilter;

#[async_trait]
impl Filter for IssueTypeSchemeReferencesFilter {
    fn name(&self) -> &'static str {
        "issueTypeSchemeReferences"
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        _context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        let schemes = elements
            .iter_mut()
            .filter_map(Element::as_instance_mut)
            .filter(|instance| instance.type_name() == ISSUE_TYPE_SCHEME);
        let mut flattened = 0_usize;
        for scheme in schemes {
            let Some(mappings) = scheme.get(ISSUE_TYPES_FIELD).and_then(Value::as_sequence) else {
                continue;
            };
            let issue_types: Vec<Value> = mappings
                .iter()
                .filter_map(|mapping| mapping.as_mapping()?.get(ISSUE_TYPE_ID_FIELD).cloned())
                .collect();
            scheme.set_value(ISSUE_TYPES_FIELD, issue_types);
            flattened += 1;
        }
        debug!(flattened, "flattened issue type schemes");
        Ok(FetchFilterOutput::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::TestContext;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use trellis_element::{ElemId, ReferenceExpression, Values};
    use trellis_test_utils::{instance, metadata_type};

    fn mapping(issue_type: &str) -> Value {
        let mut values = Values::new();
        values.insert(
            ISSUE_TYPE_ID_FIELD.to_string(),
            Value::Reference(ReferenceExpression::new(ElemId::instance(
                "jira",
                "IssueType",
                issue_type,
            ))),
        );
        Value::Mapping(values)
    }

    #[tokio::test]
    async fn mappings_become_references() {
        let mut scheme = instance(
            &metadata_type(ISSUE_TYPE_SCHEME),
            "Default",
            json!({ "name": "Default" }),
        );
        scheme.set_value(ISSUE_TYPES_FIELD, vec![mapping("Bug"), mapping("Task")]);
        let other = instance(
            &metadata_type("Project"),
            "P",
            json!({ "issueTypes": [{ "issueTypeId": "1" }] }),
        );
        let mut elements = vec![Element::Instance(scheme), Element::Instance(other.clone())];
        let ctx = TestContext::new();

        IssueTypeSchemeReferencesFilter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        let issue_types = elements[0]
            .as_instance()
            .unwrap()
            .get(ISSUE_TYPES_FIELD)
            .unwrap()
            .as_sequence()
            .unwrap();
        let names: Vec<&str> = issue_types
            .iter()
            .map(|v| v.as_reference().unwrap().elem_id().name())
            .collect();
        assert_eq!(names, vec!["Bug", "Task"]);
        assert_eq!(elements[1], Element::Instance(other));
    }
}
