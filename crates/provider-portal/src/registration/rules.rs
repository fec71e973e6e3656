use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::values::{is_truthy, FormErrors, FormValues};

/// Single constraint attached to a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "arg", rename_all = "snake_case")]
pub enum FieldRule {
    Required,
    MinLength(usize),
    Digits,
    Email,
}

impl FieldRule {
    /// Returns the failure message, or `None` when the value satisfies the rule.
    /// Only `Required` rejects an empty value; the others skip it.
    fn check(&self, value: Option<&Value>) -> Option<String> {
        if let FieldRule::Required = self {
            return (!is_truthy(value)).then(|| "This field is required".to_string());
        }

        let text = match value {
            Some(Value::String(text)) if !text.is_empty() => text.as_str(),
            Some(Value::Number(number)) => return self.check_number(number),
            _ => return None,
        };

        match self {
            FieldRule::Required => None,
            FieldRule::MinLength(min) => (text.chars().count() < *min)
                .then(|| format!("Must be at least {min} characters")),
            FieldRule::Digits => (!text.chars().all(|c| c.is_ascii_digit()))
                .then(|| "Only digits are allowed".to_string()),
            FieldRule::Email => (!looks_like_email(text))
                .then(|| "Enter a valid email address".to_string()),
        }
    }

    fn check_number(&self, number: &serde_json::Number) -> Option<String> {
        match self {
            FieldRule::Digits => (!number.is_u64()).then(|| "Only digits are allowed".to_string()),
            FieldRule::MinLength(min) => (number.to_string().len() < *min)
                .then(|| format!("Must be at least {min} characters")),
            FieldRule::Email => Some("Enter a valid email address".to_string()),
            FieldRule::Required => None,
        }
    }
}

fn looks_like_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
}

/// Ordered rules for one field. The first failing rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRules {
    pub path: String,
    pub rules: Vec<FieldRule>,
}

/// Validation schema for a whole form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    fields: Vec<FieldRules>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, path: &str, rules: impl IntoIterator<Item = FieldRule>) -> Self {
        self.fields.push(FieldRules {
            path: path.to_string(),
            rules: rules.into_iter().collect(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldRules] {
        &self.fields
    }

    /// Full validation pass. Errors are keyed by the declared path.
    pub fn validate(&self, values: &FormValues) -> FormErrors {
        let mut errors = FormErrors::new();
        for field in &self.fields {
            let value = values.resolve(&field.path);
            if let Some(message) = field.rules.iter().find_map(|rule| rule.check(value)) {
                errors.insert(field.path.clone(), message);
            }
        }
        errors
    }
}
