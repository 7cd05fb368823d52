//! Tooling object types
//!
//! Describes the supported tooling objects and adds their types to the fetch.
//! Writes: new object types. A failed describe turns the whole step into one
//! fetch warning; the rest of the fetch goes on.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use trellis_deploy::ExternalClient;
use trellis_element::Element;

use crate::constants::SUPPORTED_TOOLING_OBJECTS;
use crate::error::AdapterError;
use crate::fetch::{describe_types, object_type_from_schema};
use crate::filter::{ensure_safe_filter_fetch, FetchFilterOutput, Filter, FilterContext};

/// Warning shown when tooling objects cannot be described
pub const TOOLING_DESCRIBE_WARNING: &str =
    "Encountered an error while trying to fetch info about the installed packages";

/// Feature gating the describe step
const DESCRIBE_FEATURE: &str = "describeSObjects";

/// Metadata type annotation of tooling object types
const TOOLING_OBJECT_METADATA_TYPE: &str = "ToolingObject";

/// Adds tooling object types to the fetch
pub struct FetchToolingTypesFilter {
    client: Arc<dyn ExternalClient>,
    max_concurrent_describe: usize,
}

impl FetchToolingTypesFilter {
    /// Filter describing through `client`, at most `max_concurrent_describe` at once
    #[must_use]
    pub fn new(client: Arc<dyn ExternalClient>, max_concurrent_describe: usize) -> Self {
        Self {
            client,
            max_concurrent_describe,
        }
    }

    async fn describe_tooling_types(&self) -> Result<Vec<Element>, AdapterError> {
        let names: Vec<String> =
            SUPPORTED_TOOLING_OBJECTS.iter().map(ToString::to_string).collect();
        let mut types = Vec::with_capacity(names.len());
        let described_types =
            describe_types(self.client.as_ref(), &names, self.max_concurrent_describe).await;
        for (name, described) in described_types {
            let schema = described.map_err(|err| {
                AdapterError::filter(
                    "fetchToolingTypes",
                    format!("failed to describe tooling object {name}: {err}"),
                )
            })?;
            types.push(object_type_from_schema(&schema, TOOLING_OBJECT_METADATA_TYPE));
        }
        types.sort_by(|a, b| a.elem_id().type_name().cmp(b.elem_id().type_name()));
        Ok(types.into_iter().map(Element::ObjectType).collect())
    }
}

impl std::fmt::Debug for FetchToolingTypesFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchToolingTypesFilter")
            .field("max_concurrent_describe", &self.max_concurrent_describe)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Filter for FetchToolingTypesFilter {
    fn name(&self) -> &'static str {
        "fetchToolingTypes"
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        let step = async {
            let types = self.describe_tooling_types().await?;
            debug!(types = types.len(), "described tooling objects");
            elements.extend(types);
            Ok::<_, AdapterError>(FetchFilterOutput::empty())
        };
        Ok(ensure_safe_filter_fetch(
            DESCRIBE_FEATURE,
            TOOLING_DESCRIBE_WARNING,
            context.fetch_profile,
            step,
        )
        .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::filters::TestContext;
    use pretty_assertions::assert_eq;
    use trellis_deploy::{FieldSchema, TypeSchema};
    use trellis_test_utils::MockClient;

    fn schema(name: &str) -> TypeSchema {
        TypeSchema {
            name: name.to_string(),
            fields: vec![
                FieldSchema::new("Id", "id"),
                FieldSchema::new("NamespacePrefix", "string"),
            ],
        }
    }

    fn client() -> MockClient {
        MockClient::new()
            .with_schema(schema("SubscriberPackage"))
            .with_schema(schema("InstalledSubscriberPackage"))
    }

    #[tokio::test]
    async fn adds_tooling_types() {
        let mut filter = FetchToolingTypesFilter::new(Arc::new(client()), 2);
        let mut elements = Vec::new();
        let ctx = TestContext::new();

        let output = filter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert!(output.warnings.is_empty());
        let names: Vec<&str> = elements.iter().map(|e| e.elem_id().type_name()).collect();
        assert_eq!(names, vec!["InstalledSubscriberPackage", "SubscriberPackage"]);
        assert_eq!(elements[0].as_object_type().unwrap().fields().len(), 2);
    }

    #[tokio::test]
    async fn describe_failure_is_a_warning() {
        let mut filter =
            FetchToolingTypesFilter::new(Arc::new(client().fail_describe("SubscriberPackage")), 2);
        let mut elements = Vec::new();
        let ctx = TestContext::new();

        let output = filter.on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert_eq!(output, FetchFilterOutput::warning(TOOLING_DESCRIBE_WARNING));
        assert!(elements.is_empty());
    }

    #[tokio::test]
    async fn disabled_feature_describes_nothing() {
        let client = Arc::new(client());
        let mut filter =
            FetchToolingTypesFilter::new(Arc::clone(&client) as Arc<dyn ExternalClient>, 2);
        let config = AdapterConfig::default().with_feature(DESCRIBE_FEATURE, false);
        let ctx = TestContext::with_config(config);

        filter.on_fetch(&mut Vec::new(), &ctx.context()).await.unwrap();

        assert!(client.describes().is_empty());
    }
}
