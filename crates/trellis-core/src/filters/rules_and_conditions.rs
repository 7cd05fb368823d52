//! Rule condition logic as references
//!
//! Rules store their custom condition logic as text over the positional index
//! of their conditions, e.g. `"(1 OR 2) AND 3"`. On fetch the index numbers
//! become references to the condition records, so the logic survives
//! reindexing. Before deploy the references are packed back into index text;
//! after deploy the references are restored.
//!
//! Reads: the rule's custom condition field, each condition's index field and
//! rule field. Writes: the rule's custom condition field.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use trellis_deploy::constants::{
    SBAA_ADVANCED_CONDITION, SBAA_APPROVAL_CONDITION, SBAA_APPROVAL_RULE, SBAA_INDEX,
};
use trellis_deploy::is_custom_object_instance;
use trellis_element::{
    Change, Element, InstanceElement, ReferenceExpression, TemplateExpression, Value,
};
use trellis_reference::{
    replace_templates_with_values, restore_templates, unpack_to_template, LookupContext,
    TemplateMapping,
};

use crate::constants::{
    CPQ_ADVANCED_CONDITION_FIELD, CPQ_ERROR_CONDITION, CPQ_INDEX_FIELD, CPQ_PRICE_CONDITION,
    CPQ_PRICE_RULE, CPQ_PRODUCT_RULE, CPQ_QUOTE_TERM, CPQ_QUOTE_TERM_FIELD, CPQ_RULE_FIELD,
    CPQ_TERM_CONDITION,
};
use crate::error::AdapterError;
use crate::filter::{FetchFilterOutput, Filter, FilterContext};

/// Feature switching condition references on
pub const RULES_AND_CONDITIONS_FEATURE: &str = "cpqRulesAndConditionsRefs";

/// A rule type and the condition type its logic indexes into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleAndConditionDef {
    /// Rule type API name
    pub rule_type: &'static str,
    /// Rule field holding the condition logic
    pub custom_condition_field: &'static str,
    /// Condition type API name
    pub condition_type: &'static str,
    /// Condition field holding its position
    pub index_field: &'static str,
    /// Condition field referencing its rule
    pub rule_field: &'static str,
}

/// Product rules, quote terms, price rules and approval rules
pub const RULE_AND_CONDITION_DEFS: [RuleAndConditionDef; 4] = [
    RuleAndConditionDef {
        rule_type: CPQ_PRODUCT_RULE,
        custom_condition_field: CPQ_ADVANCED_CONDITION_FIELD,
        condition_type: CPQ_ERROR_CONDITION,
        index_field: CPQ_INDEX_FIELD,
        rule_field: CPQ_RULE_FIELD,
    },
    RuleAndConditionDef {
        rule_type: CPQ_QUOTE_TERM,
        custom_condition_field: CPQ_ADVANCED_CONDITION_FIELD,
        condition_type: CPQ_TERM_CONDITION,
        index_field: CPQ_INDEX_FIELD,
        rule_field: CPQ_QUOTE_TERM_FIELD,
    },
    RuleAndConditionDef {
        rule_type: CPQ_PRICE_RULE,
        custom_condition_field: CPQ_ADVANCED_CONDITION_FIELD,
        condition_type: CPQ_PRICE_CONDITION,
        index_field: CPQ_INDEX_FIELD,
        rule_field: CPQ_RULE_FIELD,
    },
    RuleAndConditionDef {
        rule_type: SBAA_APPROVAL_RULE,
        custom_condition_field: SBAA_ADVANCED_CONDITION,
        condition_type: SBAA_APPROVAL_CONDITION,
        index_field: SBAA_INDEX,
        rule_field: SBAA_APPROVAL_RULE,
    },
];

fn is_condition_of(condition: &InstanceElement, rule: &InstanceElement, rule_field: &str) -> bool {
    condition
        .get(rule_field)
        .and_then(Value::as_reference)
        .is_some_and(|reference| reference.elem_id() == rule.elem_id())
}

/// Condition logic of one rule as a template, if any index matched
fn rule_template(
    rule: &InstanceElement,
    conditions: &[&InstanceElement],
    def: &RuleAndConditionDef,
) -> Option<TemplateExpression> {
    let raw = rule.get(def.custom_condition_field)?.as_str()?;
    let by_index: BTreeMap<i64, Arc<Element>> = conditions
        .iter()
        .filter(|condition| is_condition_of(condition, rule, def.rule_field))
        .filter_map(|condition| {
            let index = condition.get(def.index_field)?.as_i64()?;
            Some((index, Arc::new(Element::Instance((*condition).clone()))))
        })
        .collect();
    let outcome = unpack_to_template(raw, &by_index);
    if !outcome.missing_indices.is_empty() {
        warn!(
            rule = %rule.elem_id(),
            missing = ?outcome.missing_indices,
            "condition logic mentions indices without a condition"
        );
    }
    outcome.template
}

/// Links rule condition logic to the condition records
#[derive(Debug, Default)]
pub struct RulesAndConditionsFilter {
    template_mapping_by_rule_type: HashMap<&'static str, TemplateMapping>,
}

impl RulesAndConditionsFilter {
    /// Filter with no saved templates
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn rule_instances<'a>(
    changes: &'a mut [Change],
    rule_type: &'a str,
) -> impl Iterator<Item = &'a mut InstanceElement> + 'a {
    changes
        .iter_mut()
        .filter(|change| change.is_addition_or_modification())
        .filter_map(|change| change.data_mut().as_instance_mut())
        .filter(move |instance| {
            is_custom_object_instance(instance) && instance.type_name() == rule_type
        })
}

#[async_trait]
impl Filter for RulesAndConditionsFilter {
    fn name(&self) -> &'static str {
        "cpqRulesAndConditions"
    }

    async fn on_fetch(
        &mut self,
        elements: &mut Vec<Element>,
        context: &FilterContext<'_>,
    ) -> Result<FetchFilterOutput, AdapterError> {
        if !context.fetch_profile.is_feature_enabled(RULES_AND_CONDITIONS_FEATURE) {
            debug!("feature is disabled, skipping filter");
            return Ok(FetchFilterOutput::empty());
        }

        let mut updates: Vec<(usize, TemplateExpression)> = Vec::new();
        for def in &RULE_AND_CONDITION_DEFS {
            let conditions: Vec<&InstanceElement> = elements
                .iter()
                .filter_map(Element::as_instance)
                .filter(|instance| {
                    is_custom_object_instance(instance)
                        && instance.type_name() == def.condition_type
                })
                .collect();
            for (position, element) in elements.iter().enumerate() {
                let Some(rule) = element.as_instance() else {
                    continue;
                };
                if !is_custom_object_instance(rule) || rule.type_name() != def.rule_type {
                    continue;
                }
                if let Some(template) = rule_template(rule, &conditions, def) {
                    updates.push((position, template));
                }
            }
        }

        let mut created = 0_usize;
        for (position, template) in updates {
            created += template.references().count();
            if let Some(rule) = elements.get_mut(position).and_then(Element::as_instance_mut) {
                let field = RULE_AND_CONDITION_DEFS
                    .iter()
                    .find(|def| def.rule_type == rule.type_name())
                    .map(|def| def.custom_condition_field);
                if let Some(field) = field {
                    rule.set_value(field, template);
                }
            }
        }
        debug!(created, "created condition references");
        Ok(FetchFilterOutput::empty())
    }

    async fn pre_deploy(
        &mut self,
        changes: &mut Vec<Change>,
        context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        // Indices can shift between fetch and deploy, so the condition's
        // current state wins over the snapshot held by the reference.
        let current = LookupContext::for_group("", changes.as_slice())
            .with_element_source(context.element_source);
        for def in &RULE_AND_CONDITION_DEFS {
            let mut mapping = TemplateMapping::new();
            let index_of = |reference: &ReferenceExpression| -> Option<i64> {
                current
                    .target_of(reference)?
                    .as_instance()?
                    .get(def.index_field)?
                    .as_i64()
            };
            let errors = replace_templates_with_values(
                rule_instances(changes, def.rule_type),
                def.custom_condition_field,
                &mut mapping,
                index_of,
            );
            if !errors.is_empty() {
                warn!(
                    rule_type = def.rule_type,
                    errors = errors.len(),
                    "some condition logic stays unpacked"
                );
            }
            if !mapping.is_empty() {
                debug!(rule_type = def.rule_type, rules = mapping.len(), "packed condition logic");
                self.template_mapping_by_rule_type.insert(def.rule_type, mapping);
            }
        }
        Ok(())
    }

    async fn on_deploy(
        &mut self,
        changes: &mut Vec<Change>,
        _context: &FilterContext<'_>,
    ) -> Result<(), AdapterError> {
        for def in &RULE_AND_CONDITION_DEFS {
            let Some(mapping) = self.template_mapping_by_rule_type.remove(def.rule_type) else {
                continue;
            };
            restore_templates(
                rule_instances(changes, def.rule_type),
                def.custom_condition_field,
                &mapping,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::filters::TestContext;
    use pretty_assertions::assert_eq;
    use trellis_element::TemplatePart;
    use trellis_test_utils::{addition, approval_condition, approval_rule};

    fn rule_with_logic(logic: &str) -> InstanceElement {
        let mut rule = approval_rule("Discount", "Custom");
        rule.set_value(SBAA_ADVANCED_CONDITION, logic);
        rule
    }

    fn fetched(rule: &InstanceElement, conditions: &[InstanceElement]) -> Vec<Element> {
        std::iter::once(rule.clone())
            .chain(conditions.iter().cloned())
            .map(Element::Instance)
            .collect()
    }

    #[tokio::test]
    async fn indices_become_references() {
        let rule = rule_with_logic("1 AND 2");
        let conditions = [approval_condition("C1", &rule, 1), approval_condition("C2", &rule, 2)];
        let mut elements = fetched(&rule, &conditions);
        let ctx = TestContext::new();

        RulesAndConditionsFilter::new().on_fetch(&mut elements, &ctx.context()).await.unwrap();

        let logic = elements[0].as_instance().unwrap().get(SBAA_ADVANCED_CONDITION).unwrap();
        let template = logic.as_template().unwrap();
        let parts: Vec<String> = template
            .parts()
            .iter()
            .map(|part| match part {
                TemplatePart::Literal(text) => text.clone(),
                TemplatePart::Reference(r) => r.elem_id().name().to_string(),
            })
            .collect();
        assert_eq!(parts, vec!["C1", " AND ", "C2"]);
    }

    #[tokio::test]
    async fn conditions_of_other_rules_are_ignored() {
        let rule = rule_with_logic("1 OR 2");
        let other = approval_rule("Other", "All");
        let conditions = [approval_condition("C1", &rule, 1), approval_condition("X2", &other, 2)];
        let mut elements = fetched(&rule, &conditions);
        let ctx = TestContext::new();

        RulesAndConditionsFilter::new().on_fetch(&mut elements, &ctx.context()).await.unwrap();

        let template = elements[0]
            .as_instance()
            .unwrap()
            .get(SBAA_ADVANCED_CONDITION)
            .unwrap()
            .as_template()
            .unwrap()
            .clone();
        assert_eq!(template.references().count(), 1);
        assert_eq!(
            template.to_string(),
            "${salesforce.sbaa__ApprovalCondition__c.instance.C1} OR 2"
        );
    }

    #[tokio::test]
    async fn logic_without_matches_stays_text() {
        let rule = rule_with_logic("3 AND 4");
        let mut elements = fetched(&rule, &[approval_condition("C1", &rule, 1)]);
        let ctx = TestContext::new();

        RulesAndConditionsFilter::new().on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert_eq!(
            elements[0].as_instance().unwrap().get(SBAA_ADVANCED_CONDITION),
            Some(&Value::string("3 AND 4"))
        );
    }

    #[tokio::test]
    async fn disabled_feature_skips_fetch() {
        let rule = rule_with_logic("1");
        let mut elements = fetched(&rule, &[approval_condition("C1", &rule, 1)]);
        let config = AdapterConfig::default().with_feature(RULES_AND_CONDITIONS_FEATURE, false);
        let ctx = TestContext::with_config(config);

        RulesAndConditionsFilter::new().on_fetch(&mut elements, &ctx.context()).await.unwrap();

        assert!(elements[0]
            .as_instance()
            .unwrap()
            .get(SBAA_ADVANCED_CONDITION)
            .unwrap()
            .as_str()
            .is_some());
    }

    #[tokio::test]
    async fn deploy_packs_and_restores() {
        let rule = rule_with_logic("1 AND 2");
        let conditions = [approval_condition("C1", &rule, 1), approval_condition("C2", &rule, 2)];
        let mut elements = fetched(&rule, &conditions);
        let ctx = TestContext::new();
        let mut filter = RulesAndConditionsFilter::new();
        filter.on_fetch(&mut elements, &ctx.context()).await.unwrap();
        let linked = elements[0].as_instance().unwrap().clone();

        let mut changes = vec![addition(linked.clone())];
        filter.pre_deploy(&mut changes, &ctx.context()).await.unwrap();
        assert_eq!(
            changes[0].data().as_instance().unwrap().get(SBAA_ADVANCED_CONDITION),
            Some(&Value::string("1 AND 2"))
        );

        filter.on_deploy(&mut changes, &ctx.context()).await.unwrap();
        assert_eq!(changes[0].data().as_instance().unwrap(), &linked);
    }

    #[tokio::test]
    async fn packing_falls_back_to_the_element_source() {
        let rule = rule_with_logic("1");
        let condition = approval_condition("C1", &rule, 7);
        let reference = ReferenceExpression::new(condition.elem_id().clone());
        let mut linked = rule.clone();
        linked.set_value(
            SBAA_ADVANCED_CONDITION,
            TemplateExpression::new(vec![TemplatePart::Reference(reference)]),
        );
        let ctx = TestContext::new().with_source(vec![Element::Instance(condition)]);

        let mut changes = vec![addition(linked)];
        RulesAndConditionsFilter::new().pre_deploy(&mut changes, &ctx.context()).await.unwrap();

        assert_eq!(
            changes[0].data().as_instance().unwrap().get(SBAA_ADVANCED_CONDITION),
            Some(&Value::string("7"))
        );
    }

    #[tokio::test]
    async fn packing_uses_current_indices() {
        let rule = rule_with_logic("1 AND 2");
        let conditions = [approval_condition("C1", &rule, 1), approval_condition("C2", &rule, 2)];
        let mut elements = fetched(&rule, &conditions);
        let mut filter = RulesAndConditionsFilter::new();
        filter.on_fetch(&mut elements, &TestContext::new().context()).await.unwrap();
        let linked = elements[0].as_instance().unwrap().clone();

        let mut moved = conditions[0].clone();
        moved.set_value(SBAA_INDEX, 5_i64);
        let mut changes = vec![addition(linked.clone()), addition(moved)];
        filter.pre_deploy(&mut changes, &TestContext::new().context()).await.unwrap();
        assert_eq!(
            changes[0].data().as_instance().unwrap().get(SBAA_ADVANCED_CONDITION),
            Some(&Value::string("5 AND 2"))
        );

        let mut stored = conditions[1].clone();
        stored.set_value(SBAA_INDEX, 3_i64);
        let ctx = TestContext::new().with_source(vec![Element::Instance(stored)]);
        let mut changes = vec![addition(linked)];
        filter.pre_deploy(&mut changes, &ctx.context()).await.unwrap();
        assert_eq!(
            changes[0].data().as_instance().unwrap().get(SBAA_ADVANCED_CONDITION),
            Some(&Value::string("1 AND 3"))
        );
    }
}
