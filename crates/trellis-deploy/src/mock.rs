//! In-memory [`ExternalClient`] for tests
//!
//! Records every batch it receives, assigns ids to added records and fails the
//! changes, batches or describes it was told to fail.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use trellis_element::{ActionName, Change, ChangeError, ChangeId, ElemId, InstanceElement, Value};
use trellis_reference::ID_FIELD;

use crate::client::{ClientError, ExternalClient, Record, TypeSchema};
use crate::result::DeployResult;

#[derive(Debug, Clone)]
struct FailureRule {
    elem_id: ElemId,
    action: Option<ActionName>,
    message: String,
}

/// Scriptable in-memory client
#[derive(Debug, Default)]
pub struct MockClient {
    schemas: HashMap<String, TypeSchema>,
    records: HashMap<String, Vec<Record>>,
    failures: Vec<FailureRule>,
    failing_describes: HashSet<String>,
    batch_failure: Option<String>,
    panic_message: Option<String>,
    batches: Mutex<Vec<Vec<Change<InstanceElement>>>>,
    describes: Mutex<Vec<String>>,
    queries: Mutex<Vec<String>>,
    next_id: AtomicU64,
    in_flight_describes: AtomicUsize,
    max_in_flight_describes: AtomicUsize,
}

impl MockClient {
    /// Client with no schemas, records or failures
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a type description (builder)
    #[must_use]
    pub fn with_schema(mut self, schema: TypeSchema) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    /// Serve records for queries on `type_name` (builder)
    #[must_use]
    pub fn with_records(mut self, type_name: impl Into<String>, records: Vec<Record>) -> Self {
        self.records.insert(type_name.into(), records);
        self
    }

    /// Fail one change, optionally only for one action (builder)
    #[must_use]
    pub fn fail_change(
        mut self,
        elem_id: ElemId,
        action: Option<ActionName>,
        message: impl Into<String>,
    ) -> Self {
        self.failures.push(FailureRule {
            elem_id,
            action,
            message: message.into(),
        });
        self
    }

    /// Fail every batch with an API error code (builder)
    #[must_use]
    pub fn fail_batches_with(mut self, code: impl Into<String>) -> Self {
        self.batch_failure = Some(code.into());
        self
    }

    /// Panic inside every deploy call (builder)
    #[must_use]
    pub fn panic_on_deploy(mut self, message: impl Into<String>) -> Self {
        self.panic_message = Some(message.into());
        self
    }

    /// Fail describing a type (builder)
    #[must_use]
    pub fn fail_describe(mut self, type_name: impl Into<String>) -> Self {
        self.failing_describes.insert(type_name.into());
        self
    }

    /// Batches received so far
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<Change<InstanceElement>>> {
        self.batches.lock().clone()
    }

    /// Number of deploy calls
    #[must_use]
    pub fn deploy_calls(&self) -> usize {
        self.batches.lock().len()
    }

    /// Types described so far
    #[must_use]
    pub fn describes(&self) -> Vec<String> {
        self.describes.lock().clone()
    }

    /// Queries run so far
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    /// Highest number of describe calls observed in flight at once
    #[must_use]
    pub fn max_concurrent_describes(&self) -> usize {
        self.max_in_flight_describes.load(Ordering::SeqCst)
    }

    fn failure_for(&self, change: &Change<InstanceElement>) -> Option<&FailureRule> {
        self.failures.iter().find(|rule| {
            &rule.elem_id == change.change_id()
                && rule.action.map_or(true, |action| action == change.action())
        })
    }

    fn next_record_id(&self) -> String {
        format!("a0M{:012}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ExternalClient for MockClient {
    async fn list_types(&self) -> Result<Vec<String>, ClientError> {
        let mut names: Vec<String> =
            self.schemas.keys().chain(&self.failing_describes).cloned().collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn describe_type(&self, name: &str) -> Result<TypeSchema, ClientError> {
        let in_flight = self.in_flight_describes.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_describes.fetch_max(in_flight, Ordering::SeqCst);
        self.describes.lock().push(name.to_string());
        yield_now().await;
        self.in_flight_describes.fetch_sub(1, Ordering::SeqCst);

        if self.failing_describes.contains(name) {
            return Err(ClientError::api(
                "INVALID_TYPE",
                format!("sObject type '{name}' is not supported"),
            ));
        }
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::UnknownType(name.to_string()))
    }

    async fn deploy_batch(
        &self,
        records: Vec<Change<InstanceElement>>,
    ) -> Result<DeployResult, ClientError> {
        self.batches.lock().push(records.clone());
        if let Some(message) = &self.panic_message {
            panic!("{message}");
        }
        if let Some(code) = &self.batch_failure {
            return Err(ClientError::api(code.clone(), "batch rejected"));
        }

        let mut result = DeployResult::new();
        for mut change in records {
            if let Some(rule) = self.failure_for(&change) {
                result.errors.push(ChangeError::error(
                    change.change_id().clone(),
                    rule.message.clone(),
                    format!(
                        "{} of {} failed: {}",
                        change.action(),
                        change.change_id(),
                        rule.message
                    ),
                ));
                continue;
            }
            if change.action() == ActionName::Add && change.data().get(ID_FIELD).is_none() {
                let id = self.next_record_id();
                change.data_mut().set_value(ID_FIELD, Value::string(id));
            }
            result.applied_changes.push(change);
        }
        Ok(result)
    }

    fn query_all<'a>(&'a self, query: &'a str) -> BoxStream<'a, Result<Record, ClientError>> {
        self.queries.lock().push(query.to_string());
        let type_name = query
            .rsplit_once(" FROM ")
            .map(|(_, rest)| rest.split_whitespace().next().unwrap_or_default())
            .unwrap_or_default();
        let records = self.records.get(type_name).cloned().unwrap_or_default();
        stream::iter(records.into_iter().map(Ok)).boxed()
    }
}

/// Yield once so concurrent describes overlap
async fn yield_now() {
    let mut yielded = false;
    futures::future::poll_fn(|cx| {
        if yielded {
            std::task::Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            std::task::Poll::Pending
        }
    })
    .await;
}
