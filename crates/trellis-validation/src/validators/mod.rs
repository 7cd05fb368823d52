//! Built-in change validators

mod custom_object_instances;
mod data_category_group;
mod deploy_support;
mod package;

pub use custom_object_instances::CustomObjectInstancesValidator;
pub use data_category_group::{DataCategoryGroupValidator, DATA_CATEGORY_GROUP_METADATA_TYPE};
pub use deploy_support::DeploySupportValidator;
pub use package::{
    has_namespace, namespace, PackageValidator, INSTALLED_PACKAGE_METADATA, MODIFIABLE_PROPERTIES,
    NAMESPACE_SEPARATOR, PACKAGE_VERSION_FIELD_NAME,
};
