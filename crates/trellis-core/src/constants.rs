//! Names the adapter special-cases

/// Adapter name, first segment of every element id
pub const SALESFORCE: &str = "salesforce";
/// Path segment grouping record instances
pub const RECORDS_PATH: &str = "Records";
/// Path segment grouping types
pub const TYPES_PATH: &str = "Types";
/// Instance name of singletons
pub const CONFIG_NAME: &str = "_config";

/// Default cap on fetched records per type
pub const DEFAULT_MAX_INSTANCES_PER_TYPE: usize = 5000;
/// Default bound on concurrent describe calls
pub const DEFAULT_MAX_CONCURRENT_DESCRIBE: usize = 10;

/// Singleton recording the last change time of every element
pub const CHANGED_AT_SINGLETON: &str = "ChangedAtSingleton";

/// Metadata type holding every custom label
pub const CUSTOM_LABELS_METADATA_TYPE: &str = "CustomLabels";
/// Metadata type of one custom label
pub const CUSTOM_LABEL_METADATA_TYPE: &str = "CustomLabel";
/// Field of the labels container listing its labels
pub const LABELS_FIELD: &str = "labels";

/// Issue type scheme instances
pub const ISSUE_TYPE_SCHEME: &str = "IssueTypeScheme";

/// CPQ product rule records
pub const CPQ_PRODUCT_RULE: &str = "SBQQ__ProductRule__c";
/// CPQ product rule conditions
pub const CPQ_ERROR_CONDITION: &str = "SBQQ__ErrorCondition__c";
/// CPQ quote term records
pub const CPQ_QUOTE_TERM: &str = "SBQQ__QuoteTerm__c";
/// CPQ quote term conditions
pub const CPQ_TERM_CONDITION: &str = "SBQQ__TermCondition__c";
/// CPQ price rule records
pub const CPQ_PRICE_RULE: &str = "SBQQ__PriceRule__c";
/// CPQ price rule conditions
pub const CPQ_PRICE_CONDITION: &str = "SBQQ__PriceCondition__c";
/// CPQ rule field holding the packed condition logic
pub const CPQ_ADVANCED_CONDITION_FIELD: &str = "SBQQ__AdvancedCondition__c";
/// CPQ condition positional index field
pub const CPQ_INDEX_FIELD: &str = "SBQQ__Index__c";
/// CPQ condition field pointing at its rule
pub const CPQ_RULE_FIELD: &str = "SBQQ__Rule__c";
/// CPQ term condition field pointing at its quote term
pub const CPQ_QUOTE_TERM_FIELD: &str = "SBQQ__QuoteTerm__c";

/// Tooling objects described on every fetch
pub const SUPPORTED_TOOLING_OBJECTS: [&str; 2] =
    ["SubscriberPackage", "InstalledSubscriberPackage"];
