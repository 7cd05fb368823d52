//! Group-aware reference resolution
//!
//! # Overview
//!
//! Before a change is sent to the external system every reference in it is
//! replaced by the external value of its target. Which value depends on the
//! change group being deployed:
//!
//! 1. Inside the designated metadata group nothing resolves.
//! 2. A target that is itself created or updated by the same group has no
//!    server-assigned identifier yet. With an identifier-based strategy the
//!    reference is left unresolved; otherwise it resolves to the live element
//!    of the group so the caller can substitute or defer.
//! 3. Any other target is serialized by the strategy.
//!
//! Resolution never fails: a missing target is simply [`Resolution::Unresolved`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};
use trellis_element::walk::transform_values;
use trellis_element::{
    Change, ElemId, Element, ElementSource, InstanceElement, ReferenceExpression,
    TemplateExpression, TemplatePart, Value,
};

use crate::strategy::{IdStrategy, ReferenceStrategy, SerializationRules};

/// Group id whose references never resolve
pub const DEFAULT_METADATA_GROUP: &str = "salesforce_metadata";

/// Outcome of resolving one reference
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// External value of the target
    Resolved(Value),
    /// Live element of the same group; no external value exists yet
    Deferred(Arc<Element>),
    /// Nothing to substitute
    Unresolved,
}

impl Resolution {
    /// External value, if resolved
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Resolved(v) => Some(v),
            Self::Deferred(_) | Self::Unresolved => None,
        }
    }

    /// Whether nothing was resolved
    #[inline]
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

/// Everything resolution needs to know about the deploy in progress
#[derive(Clone)]
pub struct LookupContext<'a> {
    group_id: String,
    metadata_group: String,
    in_group: HashMap<ElemId, Arc<Element>>,
    default_strategy: Arc<dyn ReferenceStrategy>,
    element_source: Option<&'a dyn ElementSource>,
}

impl<'a> LookupContext<'a> {
    /// Context for resolving references inside one change group
    ///
    /// Only after states (additions and modifications) count as group members.
    #[must_use]
    pub fn for_group<T>(group_id: impl Into<String>, changes: &[Change<T>]) -> Self
    where
        T: Clone + Into<Element>,
    {
        let in_group = changes
            .iter()
            .filter_map(Change::after)
            .map(|after| {
                let element: Element = after.clone().into();
                (element.elem_id().clone(), Arc::new(element))
            })
            .collect();
        Self {
            group_id: group_id.into(),
            metadata_group: DEFAULT_METADATA_GROUP.to_string(),
            in_group,
            default_strategy: Arc::new(IdStrategy::default()),
            element_source: None,
        }
    }

    /// Context outside of any deploy group
    #[must_use]
    pub fn standalone() -> Self {
        Self::for_group::<Element>("", &[])
    }

    /// Replace the default strategy (builder)
    #[inline]
    #[must_use]
    pub fn with_default_strategy(mut self, strategy: Arc<dyn ReferenceStrategy>) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// Fall back to `source` for targets without a handle (builder)
    #[inline]
    #[must_use]
    pub fn with_element_source(mut self, source: &'a dyn ElementSource) -> Self {
        self.element_source = Some(source);
        self
    }

    /// Designate a different metadata group (builder)
    #[inline]
    #[must_use]
    pub fn with_metadata_group(mut self, group_id: impl Into<String>) -> Self {
        self.metadata_group = group_id.into();
        self
    }

    /// Group being deployed
    #[inline]
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Whether `id` is created or updated by this group
    #[inline]
    #[must_use]
    pub fn is_in_group(&self, id: &ElemId) -> bool {
        self.in_group.contains_key(id)
    }

    /// Current after state of a group member
    #[inline]
    #[must_use]
    pub fn group_member(&self, id: &ElemId) -> Option<&Arc<Element>> {
        self.in_group.get(id)
    }

    /// Current state of a target: group member, element source, then handle
    ///
    /// The handle is a snapshot taken when the reference was created, so it
    /// only answers when nothing fresher knows the target.
    #[must_use]
    pub fn target_of(&self, reference: &ReferenceExpression) -> Option<Arc<Element>> {
        self.group_member(reference.elem_id())
            .cloned()
            .or_else(|| self.element_source.and_then(|source| source.get(reference.elem_id())))
            .or_else(|| reference.value().cloned())
    }
}

impl std::fmt::Debug for LookupContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupContext")
            .field("group_id", &self.group_id)
            .field("metadata_group", &self.metadata_group)
            .field("in_group", &self.in_group.len())
            .field("default_strategy", &self.default_strategy.name())
            .finish_non_exhaustive()
    }
}

/// Resolve one reference
///
/// `strategy` is the field-specific strategy; `None` uses the context default.
#[must_use]
pub fn resolve_reference(
    reference: &ReferenceExpression,
    strategy: Option<&dyn ReferenceStrategy>,
    context: &LookupContext<'_>,
) -> Resolution {
    if context.group_id == context.metadata_group {
        return Resolution::Unresolved;
    }
    let strategy: &dyn ReferenceStrategy = match strategy {
        Some(strategy) => strategy,
        None => context.default_strategy.as_ref(),
    };

    if let Some(live) = context.in_group.get(reference.elem_id()) {
        if strategy.is_identifier_based() {
            debug!(
                target = %reference.elem_id(),
                group = %context.group_id,
                "target is deployed in the same group, leaving reference unresolved"
            );
            return Resolution::Unresolved;
        }
        return Resolution::Deferred(Arc::clone(live));
    }

    let Some(target) = reference
        .value()
        .cloned()
        .or_else(|| context.element_source.and_then(|source| source.get(reference.elem_id())))
    else {
        return Resolution::Unresolved;
    };
    strategy
        .serialize(&target)
        .map_or(Resolution::Unresolved, Resolution::Resolved)
}

/// What to do with a reference that resolved to nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnresolvedPolicy {
    /// Remove the value from its container
    #[default]
    Drop,
    /// Leave the reference in place
    KeepReference,
}

/// Resolves every reference of instances about to be deployed
#[derive(Debug, Clone)]
pub struct ReferenceResolver<'a> {
    context: LookupContext<'a>,
    rules: SerializationRules,
    policy: UnresolvedPolicy,
}

impl<'a> ReferenceResolver<'a> {
    /// Resolver using `context`
    #[inline]
    #[must_use]
    pub fn new(context: LookupContext<'a>) -> Self {
        Self {
            context,
            rules: SerializationRules::default(),
            policy: UnresolvedPolicy::default(),
        }
    }

    /// Field-specific strategies (builder)
    #[inline]
    #[must_use]
    pub fn with_rules(mut self, rules: SerializationRules) -> Self {
        self.rules = rules;
        self
    }

    /// Unresolved reference handling (builder)
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lookup context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &LookupContext<'a> {
        &self.context
    }

    /// Resolve a reference sitting in `field` of an element of `parent_type`
    #[must_use]
    pub fn resolve(
        &self,
        reference: &ReferenceExpression,
        field: &str,
        parent_type: &str,
    ) -> Resolution {
        let strategy = self.rules.strategy_for(field, parent_type);
        resolve_reference(reference, strategy.as_deref(), &self.context)
    }

    /// Copy of `instance` with every reference replaced
    ///
    /// Deferred references stay references, now carrying the live group
    /// element. Unresolved references follow the policy. Templates become
    /// strings only when all their references resolve to scalars; a template
    /// with an unresolved reference follows the policy like a bare reference.
    #[must_use]
    pub fn resolve_instance(&self, instance: &InstanceElement) -> InstanceElement {
        let parent_type = instance.type_name().to_string();
        let values = transform_values(instance.value().clone(), &mut |path, value| {
            let field = path
                .iter()
                .rev()
                .find(|segment| segment.parse::<usize>().is_err())
                .map_or("", String::as_str);
            match value {
                Value::Reference(reference) => {
                    self.resolve_leaf(reference, field, &parent_type, path)
                }
                Value::Template(template) => {
                    self.render_template(template, field, &parent_type, path)
                }
                other => Some(other),
            }
        });
        let mut resolved = instance.clone();
        *resolved.value_mut() = values;
        resolved
    }

    /// Resolve every state of a change
    #[must_use]
    pub fn resolve_change(&self, change: &Change<InstanceElement>) -> Change<InstanceElement> {
        change.clone().map_data(|data| self.resolve_instance(&data))
    }

    fn resolve_leaf(
        &self,
        reference: ReferenceExpression,
        field: &str,
        parent_type: &str,
        path: &[String],
    ) -> Option<Value> {
        match self.resolve(&reference, field, parent_type) {
            Resolution::Resolved(value) => Some(value),
            Resolution::Deferred(live) => {
                Some(Value::Reference(ReferenceExpression::to_element(live)))
            }
            Resolution::Unresolved => match self.policy {
                UnresolvedPolicy::Drop => {
                    debug!(
                        target = %reference.elem_id(),
                        path = %path.join("."),
                        "dropping unresolved reference"
                    );
                    None
                }
                UnresolvedPolicy::KeepReference => Some(Value::Reference(reference)),
            },
        }
    }

    fn render_template(
        &self,
        template: TemplateExpression,
        field: &str,
        parent_type: &str,
        path: &[String],
    ) -> Option<Value> {
        let mut rendered = String::new();
        for part in template.parts() {
            let reference = match part {
                TemplatePart::Literal(text) => {
                    rendered.push_str(text);
                    continue;
                }
                TemplatePart::Reference(reference) => reference,
            };
            match self.resolve(reference, field, parent_type) {
                Resolution::Resolved(Value::Scalar(scalar)) => rendered.push_str(&scalar.render()),
                Resolution::Unresolved => {
                    return match self.policy {
                        UnresolvedPolicy::Drop => {
                            warn!(
                                target = %reference.elem_id(),
                                path = %path.join("."),
                                "dropping template with an unresolved reference"
                            );
                            None
                        }
                        UnresolvedPolicy::KeepReference => Some(Value::Template(template)),
                    };
                }
                Resolution::Resolved(_) | Resolution::Deferred(_) => {
                    warn!(
                        target = %reference.elem_id(),
                        path = %path.join("."),
                        "template reference has no scalar value yet, keeping the template"
                    );
                    return Some(Value::Template(template));
                }
            }
        }
        Some(Value::string(rendered))
    }
}
