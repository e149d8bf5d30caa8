//! # Labels
//!
//! App labels carried by every owned object and the immutable match-label
//! subset used in selectors.

use std::collections::BTreeMap;

use crate::constants::{
    APP_COMPONENT_LABEL, APP_CREATED_BY_LABEL, APP_MANAGED_BY_LABEL, APP_NAME_LABEL,
    APP_VERSION_LABEL, OPERATOR_NAME,
};

pub const ACTIVEGATE_COMPONENT: &str = "activegate";
pub const EXTENSIONS_COMPONENT: &str = "dynatrace-extensions-controller";
pub const LOGMODULE_COMPONENT: &str = "dynatrace-logmodule";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLabels {
    /// `app.kubernetes.io/name`
    pub name: String,
    /// `app.kubernetes.io/created-by`, the owning DynaKube
    pub created_by: String,
    /// `app.kubernetes.io/component`
    pub component: String,
    /// `app.kubernetes.io/version`
    pub version: String,
}

impl AppLabels {
    pub fn new(
        app_name: impl Into<String>,
        created_by: impl Into<String>,
        component: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: app_name.into(),
            created_by: created_by.into(),
            component: component.into(),
            version: version.into(),
        }
    }

    /// Full label set for object metadata and pod templates
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.match_labels();
        labels.insert(APP_COMPONENT_LABEL.to_string(), self.component.clone());
        labels.insert(APP_VERSION_LABEL.to_string(), self.version.clone());
        labels
    }

    /// Selector labels. Must stay stable across operator versions.
    pub fn match_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_NAME_LABEL.to_string(), self.name.clone()),
            (APP_CREATED_BY_LABEL.to_string(), self.created_by.clone()),
            (APP_MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
        ])
    }
}

/// Merge user labels underneath the app labels; app labels win on conflict
pub fn merge_labels(
    app_labels: &BTreeMap<String, String>,
    custom: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = custom.clone();
    merged.extend(app_labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
