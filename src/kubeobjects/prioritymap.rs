//! # Priority Map
//!
//! Key/value map where each entry carries a priority. Several sources
//! (baseline env, modifiers, user-supplied env) write into one map and the
//! outcome does not depend on the order in which they run: an existing entry
//! is only replaced by one with strictly higher priority.
//!
//! Some keys may legitimately repeat (command line flags such as
//! `--set-host-property`); the [`DuplicatePolicy`] decides per key.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource};

/// Entry priority, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    #[default]
    Default,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    /// Only rendered by [`PriorityMap::as_env_vars`]
    Source(Box<EnvVarSource>),
}

impl Value {
    /// Ordering key for repeated entries of one key
    fn sort_key(&self) -> String {
        match self {
            Value::Text(text) => text.clone(),
            Value::Source(source) => format!("{source:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<EnvVarSource> for Value {
    fn from(source: EnvVarSource) -> Self {
        Value::Source(Box::new(source))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    value: Value,
    separator: String,
    priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    #[default]
    ForbidAll,
    AllowAll,
    /// Duplicates allowed except for the listed keys
    ForbidFor(BTreeSet<String>),
    /// Duplicates forbidden except for the listed keys
    AllowFor(BTreeSet<String>),
}

impl DuplicatePolicy {
    pub fn allows(&self, key: &str) -> bool {
        match self {
            DuplicatePolicy::ForbidAll => false,
            DuplicatePolicy::AllowAll => true,
            DuplicatePolicy::ForbidFor(keys) => !keys.contains(key),
            DuplicatePolicy::AllowFor(keys) => keys.contains(key),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriorityMap {
    entries: BTreeMap<String, Vec<Entry>>,
    policy: DuplicatePolicy,
    default_separator: String,
}

impl PriorityMap {
    /// Map for environment variables: no duplicates
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Separator used by [`PriorityMap::insert`] when rendering key/values
    #[must_use]
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.default_separator = separator.into();
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>, priority: Priority) {
        let separator = self.default_separator.clone();
        self.insert_with_separator(key, value, separator, priority);
    }

    pub fn insert_with_separator(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
        separator: impl Into<String>,
        priority: Priority,
    ) {
        let key = key.into();
        let entry = Entry {
            value: value.into(),
            separator: separator.into(),
            priority,
        };

        if self.policy.allows(&key) {
            let slot = self.entries.entry(key).or_default();
            if !slot.contains(&entry) {
                slot.push(entry);
                slot.sort_by_key(|e| e.value.sort_key());
            }
            return;
        }

        match self.entries.get_mut(&key) {
            Some(existing) if existing.iter().all(|e| e.priority < entry.priority) => {
                *existing = vec![entry];
            }
            Some(_) => {}
            None => {
                self.entries.insert(key, vec![entry]);
            }
        }
    }

    /// Insert every env var of `vars` (user input) at the given priority
    pub fn extend_env(&mut self, vars: &[EnvVar], priority: Priority) {
        for var in vars {
            let value = match &var.value_from {
                Some(source) => Value::Source(Box::new(source.clone())),
                None => Value::Text(var.value.clone().unwrap_or_default()),
            };
            self.insert(var.name.clone(), value, priority);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Text value of a single-valued key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|entries| entries.first())
            .and_then(|entry| match &entry.value {
                Value::Text(text) => Some(text.as_str()),
                Value::Source(_) => None,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Environment variables sorted by name
    pub fn as_env_vars(&self) -> Vec<EnvVar> {
        self.entries
            .iter()
            .flat_map(|(key, entries)| {
                entries.iter().map(move |entry| match &entry.value {
                    Value::Text(text) => EnvVar {
                        name: key.clone(),
                        value: Some(text.clone()),
                        value_from: None,
                    },
                    Value::Source(source) => EnvVar {
                        name: key.clone(),
                        value: None,
                        value_from: Some(source.as_ref().clone()),
                    },
                })
            })
            .collect()
    }

    /// `key<separator>value` strings sorted by key; source-backed entries are skipped
    pub fn as_key_values(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|(key, entries)| {
                entries.iter().filter_map(move |entry| match &entry.value {
                    Value::Text(text) => Some(format!("{key}{}{text}", entry.separator)),
                    Value::Source(_) => None,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMapKeySelector;

    mod insert_tests {
        use super::*;

        #[test]
        fn test_higher_priority_overwrites() {
            let mut map = PriorityMap::new();
            map.insert("DT_GROUP", "low", Priority::Default);
            map.insert("DT_GROUP", "high", Priority::High);
            assert_eq!(map.get("DT_GROUP"), Some("high"));
        }

        #[test]
        fn test_equal_or_lower_priority_is_noop() {
            let mut map = PriorityMap::new();
            map.insert("DT_GROUP", "first", Priority::Medium);
            map.insert("DT_GROUP", "second", Priority::Medium);
            map.insert("DT_GROUP", "third", Priority::Default);
            assert_eq!(map.get("DT_GROUP"), Some("first"));
            assert_eq!(map.len(), 1);
        }

        #[test]
        fn test_user_env_with_value_from() {
            let mut map = PriorityMap::new();
            map.insert("DT_TENANT", "x", Priority::Default);
            map.extend_env(
                &[EnvVar {
                    name: "DT_TENANT".to_string(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        config_map_key_ref: Some(ConfigMapKeySelector {
                            name: "cm".to_string(),
                            key: "tenant".to_string(),
                            optional: None,
                        }),
                        ..EnvVarSource::default()
                    }),
                }],
                Priority::High,
            );
            let vars = map.as_env_vars();
            assert_eq!(vars.len(), 1);
            assert!(vars[0].value.is_none());
            assert!(vars[0].value_from.is_some());
            assert_eq!(map.get("DT_TENANT"), None);
        }
    }

    mod duplicate_tests {
        use super::*;

        #[test]
        fn test_allow_for_named_keys() {
            let mut map = PriorityMap::with_policy(DuplicatePolicy::AllowFor(BTreeSet::from([
                "--set-host-property".to_string(),
            ])))
            .with_separator("=");
            map.insert("--set-host-property", "b", Priority::Default);
            map.insert("--set-host-property", "a", Priority::Default);
            map.insert("--set-server", "one", Priority::Default);
            map.insert("--set-server", "two", Priority::Default);
            assert_eq!(
                map.as_key_values(),
                vec![
                    "--set-host-property=a".to_string(),
                    "--set-host-property=b".to_string(),
                    "--set-server=one".to_string(),
                ]
            );
        }

        #[test]
        fn test_forbid_for_named_keys() {
            let policy = DuplicatePolicy::ForbidFor(BTreeSet::from(["--set-server".to_string()]));
            assert!(!policy.allows("--set-server"));
            assert!(policy.allows("--set-host-property"));
            assert!(DuplicatePolicy::AllowAll.allows("anything"));
            assert!(!DuplicatePolicy::ForbidAll.allows("anything"));
        }

        #[test]
        fn test_identical_duplicate_is_stored_once() {
            let mut map = PriorityMap::with_policy(DuplicatePolicy::AllowAll);
            map.insert("k", "v", Priority::Default);
            map.insert("k", "v", Priority::Default);
            assert_eq!(map.len(), 1);
        }
    }

    mod output_tests {
        use super::*;

        #[test]
        fn test_env_vars_sorted_by_key() {
            let mut map = PriorityMap::new();
            map.insert("ZETA", "z", Priority::Default);
            map.insert("ALPHA", "a", Priority::Default);
            map.insert("MID", "m", Priority::High);
            let names: Vec<_> = map.as_env_vars().into_iter().map(|v| v.name).collect();
            assert_eq!(names, vec!["ALPHA", "MID", "ZETA"]);
        }

        #[test]
        fn test_insertion_order_does_not_matter() {
            let inserts = [
                ("B", "1", Priority::Default),
                ("A", "2", Priority::High),
                ("B", "3", Priority::Medium),
                ("C", "4", Priority::Default),
                ("A", "5", Priority::Default),
            ];
            let mut forward = PriorityMap::new();
            for (k, v, p) in inserts {
                forward.insert(k, v, p);
            }
            let mut backward = PriorityMap::new();
            for (k, v, p) in inserts.iter().rev() {
                backward.insert(*k, *v, *p);
            }
            assert_eq!(forward.as_env_vars(), backward.as_env_vars());
            assert_eq!(forward.get("A"), Some("2"));
            assert_eq!(forward.get("B"), Some("3"));
        }
    }
}
