use serde::{Deserialize, Serialize};

/// Severity attached to validation findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// Supported validation rule categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Full-match regular expression over the value's string form.
    Pattern,
    /// Numeric bounds check, `min <= value <= max`.
    Range,
    /// Field must be present, non-null, and non-blank.
    Required,
    /// Named built-in semantic check (email, phone, currency, iso_date).
    Custom,
}

/// Parameters for a rule; which fields apply depends on the kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

/// A single validation rule targeting one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Assigned at creation when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub field: String,
    pub kind: RuleKind,
    #[serde(default)]
    pub params: RuleParams,
    /// Severity of violations produced by this rule.
    #[serde(default = "default_severity")]
    pub severity: Severity,
}

fn default_severity() -> Severity {
    Severity::Error
}

impl Rule {
    pub fn pattern(name: impl Into<String>, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            field: field.into(),
            kind: RuleKind::Pattern,
            params: RuleParams {
                pattern: Some(pattern.into()),
                ..RuleParams::default()
            },
            severity: Severity::Error,
        }
    }

    pub fn range(name: impl Into<String>, field: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            id: None,
            name: name.into(),
            field: field.into(),
            kind: RuleKind::Range,
            params: RuleParams {
                min: Some(min),
                max: Some(max),
                ..RuleParams::default()
            },
            severity: Severity::Error,
        }
    }

    pub fn required(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            field: field.into(),
            kind: RuleKind::Required,
            params: RuleParams::default(),
            severity: Severity::Error,
        }
    }

    pub fn custom(name: impl Into<String>, field: impl Into<String>, check: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            field: field.into(),
            kind: RuleKind::Custom,
            params: RuleParams {
                check: Some(check.into()),
                ..RuleParams::default()
            },
            severity: Severity::Error,
        }
    }
}
