//! Names of external types and fields the deploy engine special-cases

/// Metadata category of data record types
pub const CUSTOM_OBJECT: &str = "CustomObject";

/// Approval rule record type
pub const SBAA_APPROVAL_RULE: &str = "sbaa__ApprovalRule__c";
/// Approval condition record type
pub const SBAA_APPROVAL_CONDITION: &str = "sbaa__ApprovalCondition__c";
/// Approval rule field deciding how conditions combine
pub const SBAA_CONDITIONS_MET: &str = "sbaa__ConditionsMet__c";
/// Approval rule field holding the packed condition logic
pub const SBAA_ADVANCED_CONDITION: &str = "sbaa__AdvancedCondition__c";
/// Approval condition positional index field
pub const SBAA_INDEX: &str = "sbaa__Index__c";

/// Conditions combine through the advanced-condition expression
pub const CONDITIONS_MET_CUSTOM: &str = "Custom";
/// Every condition must hold
pub const CONDITIONS_MET_ALL: &str = "All";
