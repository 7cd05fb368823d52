//! Positional-index template codec
//!
//! Some external fields pack references to sibling records by their positional
//! index, e.g. an advanced-condition field `"(1 AND 2) OR 3"` where each number
//! is the index of a condition record. [`unpack_to_template`] turns such a string
//! into a [`TemplateExpression`] whose digit runs are references to the indexed
//! records; [`pack_from_template`] renders it back from the records' current
//! indices.
//!
//! # Example
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use trellis_element::{ElemId, Element, InstanceElement, ObjectType, Values};
//! use trellis_reference::{pack_from_template, unpack_to_template};
//!
//! let ty = Arc::new(ObjectType::new(ElemId::new_type("sf", "Condition")));
//! let mut lookup = BTreeMap::new();
//! for (idx, name) in [(1, "c1"), (2, "c2")] {
//!     let cond = InstanceElement::new(name, Arc::clone(&ty), Values::new());
//!     lookup.insert(idx, Arc::new(Element::Instance(cond)));
//! }
//!
//! let unpacked = unpack_to_template("1 AND 2", &lookup);
//! let template = unpacked.template.expect("both indices matched");
//! assert_eq!(template.references().count(), 2);
//!
//! let packed = pack_from_template(&template, |r| {
//!     lookup.iter().find(|(_, e)| e.elem_id() == r.elem_id()).map(|(idx, _)| *idx)
//! })
//! .unwrap();
//! assert_eq!(packed, "1 AND 2");
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;
use trellis_element::{
    ElemId, Element, InstanceElement, ReferenceExpression, TemplateExpression, TemplatePart, Value,
};

static DIGIT_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9]+|[^0-9]+").expect("digit run pattern is valid"));

/// Split into maximal runs of ASCII digits and non-digits
#[must_use]
pub fn split_digit_runs(raw: &str) -> Vec<&str> {
    DIGIT_RUNS.find_iter(raw).map(|m| m.as_str()).collect()
}

/// Index value of a digit run, if it can be rendered back identically
fn parse_index(run: &str) -> Option<i64> {
    if !run.bytes().all(|b| b.is_ascii_digit()) || (run.len() > 1 && run.starts_with('0')) {
        return None;
    }
    run.parse().ok()
}

/// Result of [`unpack_to_template`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnpackOutcome {
    /// The template, or `None` when no digit run matched and the field stays as is
    pub template: Option<TemplateExpression>,
    /// Digit runs that looked like indices but had no record
    pub missing_indices: Vec<i64>,
}

/// Parse `raw` into a template referencing the records of `index_lookup`
///
/// Digit runs found in the lookup become references; the rest stays literal.
/// Misses are logged and reported but never fail the operation.
#[must_use]
pub fn unpack_to_template(raw: &str, index_lookup: &BTreeMap<i64, Arc<Element>>) -> UnpackOutcome {
    let mut matched = false;
    let mut missing_indices = Vec::new();
    let parts: Vec<TemplatePart> = split_digit_runs(raw)
        .into_iter()
        .map(|run| {
            let Some(index) = parse_index(run) else {
                return TemplatePart::Literal(run.to_string());
            };
            match index_lookup.get(&index) {
                Some(target) => {
                    matched = true;
                    TemplatePart::Reference(ReferenceExpression::to_element(Arc::clone(target)))
                }
                None => {
                    warn!(
                        index,
                        raw,
                        "could not find a record with this index, keeping it as text"
                    );
                    missing_indices.push(index);
                    TemplatePart::Literal(run.to_string())
                }
            }
        })
        .collect();

    UnpackOutcome {
        template: matched.then(|| TemplateExpression::new(parts)),
        missing_indices,
    }
}

/// Template codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A referenced record has no index to render
    #[error("cannot render template: no index for {reference}")]
    UnresolvedIndex {
        /// Reference without an index
        reference: ElemId,
    },
}

/// Render a template, replacing each reference with its current index
///
/// # Errors
/// Returns [`TemplateError::UnresolvedIndex`] if `resolve_index` has no index
/// for one of the references.
pub fn pack_from_template(
    template: &TemplateExpression,
    mut resolve_index: impl FnMut(&ReferenceExpression) -> Option<i64>,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    for part in template.parts() {
        match part {
            TemplatePart::Literal(text) => out.push_str(text),
            TemplatePart::Reference(reference) => {
                let index = resolve_index(reference).ok_or_else(|| TemplateError::UnresolvedIndex {
                    reference: reference.elem_id().clone(),
                })?;
                out.push_str(&index.to_string());
            }
        }
    }
    Ok(out)
}

/// Templates taken out of instances before deploy, keyed by owning instance
#[derive(Debug, Clone, Default)]
pub struct TemplateMapping {
    templates: HashMap<ElemId, TemplateExpression>,
}

impl TemplateMapping {
    /// Empty mapping
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Template saved for an instance
    #[inline]
    #[must_use]
    pub fn get(&self, owner: &ElemId) -> Option<&TemplateExpression> {
        self.templates.get(owner)
    }

    /// Number of saved templates
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether nothing is saved
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Pack the template in `field` of each instance into a plain string
///
/// The original templates are saved in `mapping` for [`restore_templates`].
/// Instances whose template cannot be packed keep it and are reported.
pub fn replace_templates_with_values<'a>(
    instances: impl IntoIterator<Item = &'a mut InstanceElement>,
    field: &str,
    mapping: &mut TemplateMapping,
    mut resolve_index: impl FnMut(&ReferenceExpression) -> Option<i64>,
) -> Vec<TemplateError> {
    let mut errors = Vec::new();
    for instance in instances {
        let Some(Value::Template(template)) = instance.get(field).cloned() else {
            continue;
        };
        match pack_from_template(&template, &mut resolve_index) {
            Ok(packed) => {
                mapping.templates.insert(instance.elem_id().clone(), template);
                instance.set_value(field, packed);
            }
            Err(err) => {
                warn!(
                    instance = %instance.elem_id(),
                    field,
                    error = %err,
                    "leaving template unpacked"
                );
                errors.push(err);
            }
        }
    }
    errors
}

/// Put back templates saved by [`replace_templates_with_values`]
pub fn restore_templates<'a>(
    instances: impl IntoIterator<Item = &'a mut InstanceElement>,
    field: &str,
    mapping: &TemplateMapping,
) {
    for instance in instances {
        if let Some(template) = mapping.get(instance.elem_id()) {
            instance.set_value(field, template.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trellis_element::{ObjectType, Values};

    fn condition(name: &str, index: i64) -> InstanceElement {
        let ty = Arc::new(ObjectType::new(ElemId::new_type("sf", "Condition")));
        let mut inst = InstanceElement::new(name, ty, Values::new());
        inst.set_value("Index", index);
        inst
    }

    fn lookup(conditions: &[InstanceElement]) -> BTreeMap<i64, Arc<Element>> {
        conditions
            .iter()
            .map(|c| {
                let idx = c.get("Index").and_then(Value::as_i64).unwrap();
                (idx, Arc::new(Element::Instance(c.clone())))
            })
            .collect()
    }

    fn index_of(
        conditions: &[InstanceElement],
    ) -> impl Fn(&ReferenceExpression) -> Option<i64> + '_ {
        move |r| {
            conditions
                .iter()
                .find(|c| c.elem_id() == r.elem_id())
                .and_then(|c| c.get("Index").and_then(Value::as_i64))
        }
    }

    #[test]
    fn split_runs() {
        assert_eq!(split_digit_runs("(1 AND 22)"), vec!["(", "1", " AND ", "22", ")"]);
        assert!(split_digit_runs("").is_empty());
    }

    #[test]
    fn unpack_and_pack_scenario() {
        let conditions = vec![condition("c1", 1), condition("c2", 2)];
        let outcome = unpack_to_template("1 AND 2", &lookup(&conditions));
        let template = outcome.template.unwrap();
        let parts = template.parts();
        assert_eq!(parts.len(), 3);
        let reference_to = |c: &InstanceElement| {
            TemplatePart::Reference(ReferenceExpression::new(c.elem_id().clone()))
        };
        assert_eq!(parts[0], reference_to(&conditions[0]));
        assert_eq!(parts[1], TemplatePart::Literal(" AND ".to_string()));
        assert_eq!(parts[2], reference_to(&conditions[1]));
        assert!(outcome.missing_indices.is_empty());

        assert_eq!(pack_from_template(&template, index_of(&conditions)).unwrap(), "1 AND 2");
    }

    #[test]
    fn no_match_is_noop() {
        let conditions = vec![condition("c1", 1)];
        let outcome = unpack_to_template("AND OR", &lookup(&conditions));
        assert_eq!(outcome.template, None);

        let outcome = unpack_to_template("7 AND 8", &lookup(&conditions));
        assert_eq!(outcome.template, None);
        assert_eq!(outcome.missing_indices, vec![7, 8]);
    }

    #[test]
    fn partial_match_keeps_missing_literal() {
        let conditions = vec![condition("c1", 1)];
        let outcome = unpack_to_template("1 OR 9", &lookup(&conditions));
        let template = outcome.template.unwrap();
        assert_eq!(template.references().count(), 1);
        assert_eq!(outcome.missing_indices, vec![9]);
        assert_eq!(pack_from_template(&template, index_of(&conditions)).unwrap(), "1 OR 9");
    }

    #[test]
    fn leading_zero_runs_stay_literal() {
        let conditions = vec![condition("c1", 1)];
        let outcome = unpack_to_template("01 OR 1", &lookup(&conditions));
        let template = outcome.template.unwrap();
        assert_eq!(template.references().count(), 1);
        assert_eq!(pack_from_template(&template, index_of(&conditions)).unwrap(), "01 OR 1");
    }

    #[test]
    fn pack_uses_current_index() {
        let mut conditions = vec![condition("c1", 1), condition("c2", 2)];
        let template = unpack_to_template("1 AND 2", &lookup(&conditions)).template.unwrap();
        conditions[0].set_value("Index", 5_i64);
        assert_eq!(pack_from_template(&template, index_of(&conditions)).unwrap(), "5 AND 2");
    }

    #[test]
    fn pack_missing_index_fails() {
        let conditions = vec![condition("c1", 1)];
        let template = unpack_to_template("1", &lookup(&conditions)).template.unwrap();
        let err = pack_from_template(&template, |_| None).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnresolvedIndex {
                reference: conditions[0].elem_id().clone()
            }
        );
    }

    #[test]
    fn replace_and_restore() {
        let conditions = vec![condition("c1", 1), condition("c2", 2)];
        let template = unpack_to_template("1 OR 2", &lookup(&conditions)).template.unwrap();
        let ty = Arc::new(ObjectType::new(ElemId::new_type("sf", "Rule")));
        let mut rule = InstanceElement::new("r1", ty.clone(), Values::new());
        rule.set_value("Logic", template.clone());
        let mut plain = InstanceElement::new("r2", ty, Values::new());
        plain.set_value("Logic", "1 OR 2");

        let mut mapping = TemplateMapping::new();
        let errors = replace_templates_with_values(
            [&mut rule, &mut plain],
            "Logic",
            &mut mapping,
            index_of(&conditions),
        );
        assert!(errors.is_empty());
        assert_eq!(mapping.len(), 1);
        assert_eq!(rule.get("Logic"), Some(&Value::string("1 OR 2")));

        restore_templates([&mut rule, &mut plain], "Logic", &mapping);
        assert_eq!(rule.get("Logic"), Some(&Value::Template(template)));
        assert_eq!(plain.get("Logic"), Some(&Value::string("1 OR 2")));
    }
}
