//! Filter pipeline
//!
//! # Overview
//!
//! Filters adapt elements between their wire shape and their workspace shape.
//! Each filter may hook three points:
//!
//! - **on_fetch**: rewrite fetched elements (add references, split or merge elements)
//! - **pre_deploy**: turn workspace-shaped changes back into wire-shaped ones
//! - **on_deploy**: undo `pre_deploy` on the applied changes
//!
//! [`FilterRunner`] runs `on_fetch` and `pre_deploy` in registration order and
//! `on_deploy` in reverse order, so each filter sees on deploy exactly the shape
//! it produced before it.

use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use trellis_element::{Change, Element, ElementSource};

use crate::config::{AdapterConfig, FetchProfile};
use crate::error::AdapterError;

/// Non-fatal problem found while fetching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchWarning {
    /// Message shown to the user
    pub message: String,
}

impl FetchWarning {
    /// Create a warning
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// What an `on_fetch` hook reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchFilterOutput {
    /// Warnings to show the user
    pub warnings: Vec<FetchWarning>,
}

impl FetchFilterOutput {
    /// No warnings
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// One warning
    #[inline]
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            warnings: vec![FetchWarning::new(message)],
        }
    }
}

/// Read-only state shared by every filter hook
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    /// Adapter configuration
    pub config: &'a AdapterConfig,
    /// Compiled fetch settings
    pub fetch_profile: &'a FetchProfile,
    /// Elements of the previous fetch
    pub element_source: &'a dyn ElementSource,
}

impl std::fmt::Debug for FilterContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("config", self.config)
            .field("fetch_profile", self.fetch_profile)
            .finish_non_exhaustive()
    }
}

/// One stage of the filter pipeline
///
/// Every hook defaults to doing nothing. Hooks take `&mut self` so a filter can
/// carry state from `pre_deploy` to `on_deploy`.
#[async_trait]
pub trait Filter: Send {
    /// Filter name, used in logs
    fn name(&self) -> &'static str;

    /// Rewrite fetched elements
    async fn on_fetch(
        &mut self,
        _elements: &mut Vec<Element>,
        _context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        Ok(FetchFilterOutput::empty())
    }

    /// Prepare changes for deployment
    async fn pre_deploy(
        &mut self,
        _changes: &mut Vec<Change>,
        _context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Restore applied changes to their workspace shape
    async fn on_deploy(
        &mut self,
        _changes: &mut Vec<Change>,
        _context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        Ok(())
    }
}

/// Run a fetch step so its failure becomes a warning instead of failing the fetch
///
/// The step is skipped when the feature `filter_name` is disabled.
pub async fn ensure_safe_filter_fetch<F>(
    filter_name: &str,
    warning_message: &str,
    fetch_profile: &FetchProfile,
    fetch: F,
) -> FetchFilterOutput
where
    F: Future<Output = Result<FetchFilterOutput, AdapterError>>,
{
    if !fetch_profile.is_feature_enabled(filter_name) {
        debug!(filter = filter_name, "feature is disabled, skipping filter");
        return FetchFilterOutput::empty();
    }
    match fetch.await {
        Ok(output) => output,
        Err(err) => {
            warn!(filter = filter_name, error = %err, "filter fetch failed");
            FetchFilterOutput::warning(warning_message)
        }
    }
}

/// Ordered filter pipeline
#[derive(Default)]
pub struct FilterRunner {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterRunner {
    /// Empty pipeline
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter (builder)
    #[must_use]
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Number of filters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the pipeline is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every `on_fetch` in order, collecting warnings
    ///
    /// # Errors
    /// The first filter error; later filters do not run.
    pub async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        context: &FilterContext<'_>,
    ) -> Result<Vec<FetchWarning>, AdapterError> {
        let mut warnings = Vec::new();
        for filter in &mut self.filters {
            debug!(filter = filter.name(), elements = elements.len(), "running fetch filter");
            let output = filter.on_fetch(elements, context).await?;
            warnings.extend(output.warnings);
        }
        Ok(warnings)
    }

    /// Run every `pre_deploy` in order
    ///
    /// # Errors
    /// The first filter error; later filters do not run.
    pub async fn pre_deploy(
        &mut self,
        changes: &mut Vec<Change>,
        context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        for filter in &mut self.filters {
            debug!(filter = filter.name(), changes = changes.len(), "running pre-deploy filter");
            filter.pre_deploy(changes, context).await?;
        }
        Ok(())
    }

    /// Run every `on_deploy` in reverse order
    ///
    /// # Errors
    /// The first filter error; earlier filters do not run.
    pub async fn on_deploy(
        &mut self,
        changes: &mut Vec<Change>,
        context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        for filter in self.filters.iter_mut().rev() {
            debug!(filter = filter.name(), changes = changes.len(), "running on-deploy filter");
            filter.on_deploy(changes, context).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FilterRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterRunner").field("filters", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use trellis_element::ElementGraph;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Filter for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn on_fetch(
            &mut self,
            _elements: &mut Vec<Element>,
            _context: &FilterContext<'_>,
        ) -> Result<FetchFilterOutput, AdapterError> {
            self.log.lock().unwrap().push(format!("fetch:{}", self.name));
            Ok(FetchFilterOutput::warning(self.name))
        }

        async fn pre_deploy(
            &mut self,
            _changes: &mut Vec<Change>,
            _context: &FilterContext<'_>,
        ) -> Result<(), AdapterError> {
            self.log.lock().unwrap().push(format!("pre:{}", self.name));
            Ok(())
        }

        async fn on_deploy(
            &mut self,
            _changes: &mut Vec<Change>,
            _context: &FilterContext<'_>,
        ) -> Result<(), AdapterError> {
            self.log.lock().unwrap().push(format!("on:{}", self.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn deploy_hooks_run_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut runner = FilterRunner::new()
            .with_filter(Recording { name: "a", log: Arc::clone(&log) })
            .with_filter(Recording { name: "b", log: Arc::clone(&log) });
        let config = AdapterConfig::default();
        let profile = FetchProfile::default();
        let source = ElementGraph::new();
        let context = FilterContext {
            config: &config,
            fetch_profile: &profile,
            element_source: &source,
        };

        let warnings = runner.on_fetch(&mut Vec::new(), &context).await.unwrap();
        runner.pre_deploy(&mut Vec::new(), &context).await.unwrap();
        runner.on_deploy(&mut Vec::new(), &context).await.unwrap();

        assert_eq!(warnings, vec![FetchWarning::new("a"), FetchWarning::new("b")]);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["fetch:a", "fetch:b", "pre:a", "pre:b", "on:b", "on:a"]
        );
    }

    #[tokio::test]
    async fn safe_fetch_turns_errors_into_warnings() {
        let profile = FetchProfile::default();
        let output = ensure_safe_filter_fetch(
            "describeSObjects",
            "could not describe",
            &profile,
            async { Err(AdapterError::filter("describeSObjects", "boom")) },
        )
        .await;
        assert_eq!(output, FetchFilterOutput::warning("could not describe"));

        let config = AdapterConfig::default().with_feature("describeSObjects", false);
        let disabled = FetchProfile::from_config(&config.fetch).unwrap();
        let output = ensure_safe_filter_fetch("describeSObjects", "unused", &disabled, async {
            Ok(FetchFilterOutput::warning("should not run"))
        })
        .await;
        assert_eq!(output, FetchFilterOutput::empty());
    }
}
