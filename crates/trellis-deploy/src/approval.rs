//! Dependency-ordered deploy of approval rules and their conditions
//!
//! # Overview
//!
//! An approval rule whose conditions combine through a custom expression cannot
//! be created before its conditions exist, and a condition cannot be created
//! before its rule exists. The cycle is broken in three batches:
//!
//! 1. Every rule is created, custom-logic rules with their logic temporarily
//!    forced to "all conditions". Server-assigned ids are recorded.
//! 2. Every condition is created, its rule field set to the recorded id.
//! 3. Custom-logic rules are updated back to their original state.
//!
//! Each phase is a distinct type consuming the previous one, so phases run
//! exactly once and in order, even when a phase has nothing to deploy.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};
use trellis_element::{Change, ChangeError, ChangeId, ElemId, InstanceElement, Value};
use trellis_reference::{ReferenceResolver, ID_FIELD};

use crate::batch::deploy_custom_object_instances_group;
use crate::client::ExternalClient;
use crate::constants::{
    CONDITIONS_MET_ALL, CONDITIONS_MET_CUSTOM, SBAA_APPROVAL_RULE, SBAA_CONDITIONS_MET,
};
use crate::result::DeployResult;

/// Deploy a group of approval rule and approval condition additions
///
/// Makes exactly three client calls. A custom-logic rule is reported applied
/// only if its final update succeeded; a condition whose rule failed to deploy
/// is not sent and fails with an error.
pub async fn deploy_add_approval_rule_and_condition(
    changes: Vec<Change<InstanceElement>>,
    client: &dyn ExternalClient,
    resolver: &ReferenceResolver<'_>,
) -> DeployResult {
    let pending = Pending::partition(changes);
    info!(
        plain_rules = pending.plain_rules.len(),
        custom_rules = pending.custom_rules.len(),
        conditions = pending.conditions.len(),
        "deploying approval rules and conditions"
    );
    pending
        .deploy_rules(client, resolver)
        .await
        .deploy_conditions(client, resolver)
        .await
        .redeploy_custom_rules(client, resolver)
        .await
}

fn has_custom_logic(instance: &InstanceElement) -> bool {
    instance.get(SBAA_CONDITIONS_MET).and_then(Value::as_str) == Some(CONDITIONS_MET_CUSTOM)
}

/// Changes not yet deployed
struct Pending {
    plain_rules: Vec<Change<InstanceElement>>,
    custom_rules: Vec<Change<InstanceElement>>,
    conditions: Vec<Change<InstanceElement>>,
}

/// After phase 1: rules exist, custom-logic rules still say "All"
struct RulesDeployed {
    custom_rules: Vec<Change<InstanceElement>>,
    conditions: Vec<Change<InstanceElement>>,
    rule_ids: HashSet<ElemId>,
    deployed_rule_ids: HashMap<ElemId, Value>,
    rules_result: DeployResult,
}

/// After phase 2: conditions exist
struct ConditionsDeployed {
    custom_rules: Vec<Change<InstanceElement>>,
    deployed_rule_ids: HashMap<ElemId, Value>,
    rules_result: DeployResult,
    conditions_result: DeployResult,
}

impl Pending {
    fn partition(changes: Vec<Change<InstanceElement>>) -> Self {
        let mut pending = Self {
            plain_rules: Vec::new(),
            custom_rules: Vec::new(),
            conditions: Vec::new(),
        };
        for change in changes {
            let data = change.data();
            if data.type_name() != SBAA_APPROVAL_RULE {
                pending.conditions.push(change);
            } else if has_custom_logic(data) {
                pending.custom_rules.push(change);
            } else {
                pending.plain_rules.push(change);
            }
        }
        pending
    }

    async fn deploy_rules(
        self,
        client: &dyn ExternalClient,
        resolver: &ReferenceResolver<'_>,
    ) -> RulesDeployed {
        debug!("deploying approval rules with custom conditions forced to all");
        let rule_ids = self
            .plain_rules
            .iter()
            .chain(&self.custom_rules)
            .map(|c| c.change_id().clone())
            .collect();
        let forced = self.custom_rules.iter().cloned().map(|change| {
            change.map_data(|mut instance| {
                instance.set_value(SBAA_CONDITIONS_MET, CONDITIONS_MET_ALL);
                instance
            })
        });
        let batch = self.plain_rules.into_iter().chain(forced).collect();
        let rules_result = deploy_custom_object_instances_group(batch, client, resolver).await;

        let deployed_rule_ids = rules_result
            .applied_changes
            .iter()
            .filter_map(|change| {
                let id = change.data().get(ID_FIELD)?.clone();
                Some((change.change_id().clone(), id))
            })
            .collect();
        RulesDeployed {
            custom_rules: self.custom_rules,
            conditions: self.conditions,
            rule_ids,
            deployed_rule_ids,
            rules_result,
        }
    }
}

impl RulesDeployed {
    async fn deploy_conditions(
        self,
        client: &dyn ExternalClient,
        resolver: &ReferenceResolver<'_>,
    ) -> ConditionsDeployed {
        debug!("deploying approval conditions");
        let mut missing_rules = Vec::new();
        let mut batch = Vec::with_capacity(self.conditions.len());
        for mut change in self.conditions {
            let rule_ref = change
                .data()
                .get(SBAA_APPROVAL_RULE)
                .and_then(Value::as_reference)
                .map(|r| r.elem_id().clone())
                .filter(|rule_id| self.rule_ids.contains(rule_id));
            let Some(rule_id) = rule_ref else {
                batch.push(change);
                continue;
            };
            match self.deployed_rule_ids.get(&rule_id) {
                Some(id) => {
                    change.data_mut().set_value(SBAA_APPROVAL_RULE, id.clone());
                    batch.push(change);
                }
                None => missing_rules.push(ChangeError::error(
                    change.change_id().clone(),
                    format!(
                        "ApprovalCondition instance with name {} is referencing an ApprovalRule \
                         instance with name {} that was not deployed",
                        change.change_id().name(),
                        rule_id.name()
                    ),
                    format!(
                        "The approval rule {rule_id} failed to deploy, so this condition cannot \
                         reference it"
                    ),
                )),
            }
        }

        let mut conditions_result =
            deploy_custom_object_instances_group(batch, client, resolver).await;
        conditions_result.errors.splice(0..0, missing_rules);
        ConditionsDeployed {
            custom_rules: self.custom_rules,
            deployed_rule_ids: self.deployed_rule_ids,
            rules_result: self.rules_result,
            conditions_result,
        }
    }
}

impl ConditionsDeployed {
    async fn redeploy_custom_rules(
        self,
        client: &dyn ExternalClient,
        resolver: &ReferenceResolver<'_>,
    ) -> DeployResult {
        debug!("deploying approval rules with custom conditions");
        let mut originals: HashMap<ElemId, InstanceElement> = HashMap::new();
        let mut batch = Vec::new();
        for change in self.custom_rules {
            let Some(id) = self.deployed_rule_ids.get(change.change_id()) else {
                continue;
            };
            let mut instance = change.into_data();
            instance.set_value(ID_FIELD, id.clone());
            batch.push(Change::Modification {
                before: instance.clone(),
                after: instance.clone(),
            });
            originals.insert(instance.elem_id().clone(), instance);
        }
        let custom_result = deploy_custom_object_instances_group(batch, client, resolver).await;
        let confirmed = custom_result.applied_ids();

        let mut applied_changes = Vec::new();
        for change in self.rules_result.applied_changes {
            match originals.remove(change.change_id()) {
                Some(original) if confirmed.contains(original.elem_id()) => {
                    applied_changes.push(Change::Addition { after: original });
                }
                Some(_) => {}
                None => applied_changes.push(change),
            }
        }
        applied_changes.extend(self.conditions_result.applied_changes);

        let mut errors = self.rules_result.errors;
        errors.extend(self.conditions_result.errors);
        errors.extend(custom_result.errors);
        DeployResult {
            applied_changes,
            errors,
        }
    }
}
