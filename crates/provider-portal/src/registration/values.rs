use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rules::RuleSet;

/// JavaScript truthiness, which the registration form's field semantics are defined by.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().map_or(false, |n| n != 0.0 && !n.is_nan()),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Field paths containing a dot address `parent.child`; only the first dot splits.
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    path.split_once('.')
}

/// Current values of the registration form, keyed by top level field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormValues(pub Map<String, Value>);

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under the literal path, dots included.
    pub fn flat(&self, path: &str) -> Option<&Value> {
        self.0.get(path)
    }

    /// `values[parent][child]`, when `parent` holds an object.
    pub fn nested(&self, parent: &str, child: &str) -> Option<&Value> {
        self.0.get(parent).and_then(|value| value.get(child))
    }

    /// Resolve a path the way the rule validator reads it: nested for dotted paths,
    /// falling back to the literal key.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        match split_path(path) {
            Some((parent, child)) => self.nested(parent, child).or_else(|| self.flat(path)),
            None => self.flat(path),
        }
    }

    /// Write a value at `path`, creating the parent object for dotted paths.
    pub fn set(&mut self, path: &str, value: Value) {
        match split_path(path) {
            Some((parent, child)) => {
                let slot = self
                    .0
                    .entry(parent.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(children) = slot {
                    children.insert(child.to_string(), value);
                }
            }
            None => {
                self.0.insert(path.to_string(), value);
            }
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for FormValues {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Validation messages keyed by the exact field path that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormErrors(pub BTreeMap<String, String>);

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    pub fn message(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.0.insert(path.into(), message.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// In-memory state of one form session. Errors are recomputed after every edit when a
/// rule set is attached.
#[derive(Debug, Clone, Default)]
pub struct FormState {
    values: FormValues,
    errors: FormErrors,
    rules: Option<RuleSet>,
}

impl FormState {
    pub fn new(values: FormValues) -> Self {
        Self {
            values,
            errors: FormErrors::default(),
            rules: None,
        }
    }

    pub fn with_rules(values: FormValues, rules: RuleSet) -> Self {
        let errors = rules.validate(&values);
        Self {
            values,
            errors,
            rules: Some(rules),
        }
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    pub fn set_value(&mut self, path: &str, value: Value) {
        self.values.set(path, value);
        if let Some(rules) = &self.rules {
            self.errors = rules.validate(&self.values);
        }
    }

    /// Replace the error map wholesale, for errors produced outside the rule set.
    pub fn set_errors(&mut self, errors: FormErrors) {
        self.errors = errors;
    }
}
