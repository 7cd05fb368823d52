//! Single-call deployment of a batch of record changes

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};
use trellis_element::{Change, ChangeId, ElemId, InstanceElement, Value};
use trellis_reference::{ReferenceResolver, ID_FIELD};

use crate::client::{ClientError, ExternalClient};
use crate::result::DeployResult;

/// Deploy record changes in exactly one client call
///
/// References are resolved with `resolver` before sending. The applied changes
/// returned are the caller's original changes, with the server-assigned id
/// copied into their data, so references stay intact for later pipeline stages.
/// A whole-batch failure, including a panicking client, fails every change.
pub async fn deploy_custom_object_instances_group(
    changes: Vec<Change<InstanceElement>>,
    client: &dyn ExternalClient,
    resolver: &ReferenceResolver<'_>,
) -> DeployResult {
    debug!(
        group = resolver.context().group_id(),
        count = changes.len(),
        "deploying record batch"
    );
    let records: Vec<Change<InstanceElement>> =
        changes.iter().map(|c| resolver.resolve_change(c)).collect();

    let response = match AssertUnwindSafe(client.deploy_batch(records)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => Err(ClientError::from_panic(payload.as_ref())),
    };
    let result = match response {
        Ok(result) => result,
        Err(err) => {
            warn!(group = resolver.context().group_id(), error = %err, "record batch failed");
            return DeployResult::failed(&changes, &err);
        }
    };

    let mut originals: HashMap<ElemId, Change<InstanceElement>> =
        changes.into_iter().map(|c| (c.change_id().clone(), c)).collect();
    let applied_changes = result
        .applied_changes
        .into_iter()
        .filter_map(|applied| {
            let mut original = originals.remove(applied.change_id())?;
            let assigned = applied
                .data()
                .get(ID_FIELD)
                .filter(|id| !matches!(id, Value::Reference(_)));
            if let Some(id) = assigned {
                original.data_mut().set_value(ID_FIELD, id.clone());
            }
            Some(original)
        })
        .collect();

    DeployResult {
        applied_changes,
        errors: result.errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClient;
    use std::sync::Arc;
    use trellis_element::{
        ActionName, ElemId, Element, ObjectType, ReferenceExpression, Severity, Values,
    };
    use trellis_reference::LookupContext;

    fn product(name: &str) -> InstanceElement {
        let ty = Arc::new(ObjectType::new(ElemId::new_type("salesforce", "Product2")));
        let mut inst = InstanceElement::new(name, ty, Values::new());
        inst.set_value("Name", name);
        inst
    }

    #[tokio::test]
    async fn one_call_and_ids_copied_back() {
        let client = MockClient::new();
        let changes = vec![
            Change::Addition { after: product("a") },
            Change::Addition { after: product("b") },
        ];
        let context = LookupContext::for_group("add_Product2_instances", &changes);
        let resolver = ReferenceResolver::new(context);
        let result = deploy_custom_object_instances_group(changes, &client, &resolver).await;

        assert_eq!(client.deploy_calls(), 1);
        assert_eq!(result.applied_changes.len(), 2);
        assert!(result.applied_changes.iter().all(|c| c.data().get(ID_FIELD).is_some()));
        assert!(result.errors.is_empty());
    }

    #[tokio::test]
    async fn empty_batch_still_calls_client() {
        let client = MockClient::new();
        let resolver = ReferenceResolver::new(LookupContext::standalone());
        let result = deploy_custom_object_instances_group(Vec::new(), &client, &resolver).await;
        assert_eq!(client.deploy_calls(), 1);
        assert_eq!(result, DeployResult::new());
    }

    #[tokio::test]
    async fn applied_changes_keep_references() {
        let client = MockClient::new();
        let mut existing = product("existing");
        existing.set_value(ID_FIELD, "01tEXISTING");
        let mut quote = product("q");
        quote.set_value(
            "Product__c",
            ReferenceExpression::to_element(Arc::new(Element::Instance(existing))),
        );
        let changes = vec![Change::Addition { after: quote }];
        let context = LookupContext::for_group("add_Quote_instances", &changes);
        let resolver = ReferenceResolver::new(context);
        let result = deploy_custom_object_instances_group(changes, &client, &resolver).await;

        let sent = &client.batches()[0][0];
        assert_eq!(sent.data().get("Product__c"), Some(&Value::string("01tEXISTING")));
        let kept = result.applied_changes[0].data().get("Product__c");
        assert!(kept.unwrap().as_reference().is_some());
    }

    #[tokio::test]
    async fn per_record_failures_are_reported() {
        let a = product("a");
        let client = MockClient::new().fail_change(
            a.elem_id().clone(),
            Some(ActionName::Add),
            "REQUIRED_FIELD_MISSING",
        );
        let changes = vec![
            Change::Addition { after: a },
            Change::Addition { after: product("b") },
        ];
        let resolver = ReferenceResolver::new(LookupContext::standalone());
        let result = deploy_custom_object_instances_group(changes, &client, &resolver).await;
        assert_eq!(result.applied_changes.len(), 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].severity, Severity::Error);
    }

    #[tokio::test]
    async fn batch_failure_fails_every_change() {
        let client =
            MockClient::new().fail_batches_with(crate::user_facing::REQUEST_LIMIT_EXCEEDED);
        let changes = vec![
            Change::Addition { after: product("a") },
            Change::Addition { after: product("b") },
        ];
        let resolver = ReferenceResolver::new(LookupContext::standalone());
        let result = deploy_custom_object_instances_group(changes, &client, &resolver).await;
        assert!(result.applied_changes.is_empty());
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].message.contains("limited API calls"));
    }

    #[tokio::test]
    async fn panicking_client_is_normalized() {
        let client = MockClient::new().panic_on_deploy("socket closed");
        let changes = vec![Change::Addition { after: product("a") }];
        let resolver = ReferenceResolver::new(LookupContext::standalone());
        let result = deploy_custom_object_instances_group(changes, &client, &resolver).await;
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].message.contains("socket closed"));
    }
}
