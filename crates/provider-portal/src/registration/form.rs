use std::io::Read;

use serde::{Deserialize, Serialize};

use super::rules::{FieldRule, RuleSet};

/// Group of fields rendered together inside a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubsection {
    pub label: String,
    pub fields: Vec<String>,
}

impl FormSubsection {
    pub fn new(label: &str, fields: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }
}

/// One page of the registration flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormStep {
    pub title: String,
    pub subsections: Vec<FormSubsection>,
}

impl FormStep {
    pub fn new(title: &str, subsections: Vec<FormSubsection>) -> Self {
        Self {
            title: title.to_string(),
            subsections,
        }
    }

    pub fn field_count(&self) -> usize {
        self.subsections
            .iter()
            .map(|subsection| subsection.fields.len())
            .sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FormLoadError {
    #[error("unable to read form definition: {0}")]
    Io(#[from] std::io::Error),
    #[error("form definition is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("step '{step}' has no subsections")]
    EmptyStep { step: String },
    #[error("subsection '{subsection}' in step '{step}' has a blank field path")]
    BlankField { step: String, subsection: String },
}

/// Read an ordered list of steps from JSON. Steps without subsections and blank field
/// paths are rejected; empty subsections are allowed.
pub fn load_steps<R: Read>(reader: R) -> Result<Vec<FormStep>, FormLoadError> {
    let steps: Vec<FormStep> = serde_json::from_reader(reader)?;
    for step in &steps {
        if step.subsections.is_empty() {
            return Err(FormLoadError::EmptyStep {
                step: step.title.clone(),
            });
        }
        for subsection in &step.subsections {
            if subsection.fields.iter().any(|field| field.trim().is_empty()) {
                return Err(FormLoadError::BlankField {
                    step: step.title.clone(),
                    subsection: subsection.label.clone(),
                });
            }
        }
    }
    Ok(steps)
}

/// Standard provider registration flow.
pub fn provider_registration_steps() -> Vec<FormStep> {
    vec![
        FormStep::new(
            "Provider Details",
            vec![
                FormSubsection::new(
                    "Provider Information",
                    &["provider_Name", "provider_Type", "npi_Number", "tax_Id"],
                ),
                FormSubsection::new(
                    "Primary Contact",
                    &["first_Name", "last_Name", "email", "phone_Number"],
                ),
            ],
        ),
        FormStep::new(
            "Contact & Address",
            vec![
                FormSubsection::new(
                    "Practice Address",
                    &[
                        "address.street",
                        "address.city",
                        "address.state",
                        "address.zip_Code",
                    ],
                ),
                FormSubsection::new("Service Area", &["service_Counties", "service_Types"]),
            ],
        ),
        FormStep::new(
            "Banking",
            vec![FormSubsection::new(
                "Bank Details",
                &[
                    "bank.bank_Name",
                    "bank.account_Type",
                    "bank.account_Number",
                    "bank.routing_Number",
                ],
            )],
        ),
        FormStep::new(
            "Documents",
            vec![FormSubsection::new(
                "Required Uploads",
                &["w9_Document", "license_Document", "insurance_Document"],
            )],
        ),
    ]
}

/// Rules paired with [`provider_registration_steps`].
pub fn provider_registration_rules() -> RuleSet {
    use FieldRule::*;

    RuleSet::new()
        .field("provider_Name", [Required, MinLength(2)])
        .field("provider_Type", [Required])
        .field("npi_Number", [Required, Digits, MinLength(10)])
        .field("tax_Id", [Required, Digits, MinLength(9)])
        .field("first_Name", [Required])
        .field("last_Name", [Required])
        .field("email", [Required, Email])
        .field("phone_Number", [Required, Digits, MinLength(10)])
        .field("address.street", [Required])
        .field("address.city", [Required])
        .field("address.state", [Required, MinLength(2)])
        .field("address.zip_Code", [Required, Digits, MinLength(5)])
        .field("service_Counties", [Required])
        .field("service_Types", [Required])
        .field("bank.bank_Name", [Required])
        .field("bank.account_Type", [Required])
        .field("bank.account_Number", [Required, Digits, MinLength(4)])
        .field("bank.routing_Number", [Required, Digits, MinLength(9)])
        .field("w9_Document", [Required])
        .field("license_Document", [Required])
        .field("insurance_Document", [Required])
}
