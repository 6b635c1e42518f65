use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::value::Value;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email pattern")
});
// E.164
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("phone pattern"));
static CURRENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d{1,2})?$").expect("currency pattern"));
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("iso date pattern"));

/// Built-in semantic format checks shared by custom validation rules and
/// quality heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatCheck {
    Email,
    Phone,
    Currency,
    IsoDate,
}

impl FormatCheck {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "email" => Some(FormatCheck::Email),
            "phone" => Some(FormatCheck::Phone),
            "currency" => Some(FormatCheck::Currency),
            "iso_date" => Some(FormatCheck::IsoDate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatCheck::Email => "email",
            FormatCheck::Phone => "phone",
            FormatCheck::Currency => "currency",
            FormatCheck::IsoDate => "iso_date",
        }
    }

    /// Pick a check for a field by its name, mirroring how the upstream
    /// sources label columns. Returns None for fields with no known
    /// semantic format.
    pub fn for_field(field: &str) -> Option<Self> {
        let lower = field.to_lowercase();
        if lower.contains("email") {
            Some(FormatCheck::Email)
        } else if lower.contains("phone") {
            Some(FormatCheck::Phone)
        } else if lower.contains("amount") || lower.contains("price") {
            Some(FormatCheck::Currency)
        } else if lower.contains("date") {
            Some(FormatCheck::IsoDate)
        } else {
            None
        }
    }

    /// True when the value's string form satisfies the format. Non-string
    /// values pass the currency check iff numeric; other checks require
    /// strings.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FormatCheck::Currency => match value {
                Value::Number(n) => n.is_finite() && *n >= 0.0,
                Value::String(s) => CURRENCY.is_match(s.trim()),
                _ => false,
            },
            FormatCheck::Email => value.as_str().is_some_and(|s| EMAIL.is_match(s.trim())),
            FormatCheck::Phone => value.as_str().is_some_and(|s| PHONE.is_match(s.trim())),
            FormatCheck::IsoDate => value.as_str().is_some_and(|s| ISO_DATE.is_match(s.trim())),
        }
    }
}

/// Parse a timestamp value from the formats upstream feeds actually emit.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_check_requires_domain() {
        assert!(FormatCheck::Email.matches(&Value::from("john@x.com")));
        assert!(!FormatCheck::Email.matches(&Value::from("invalid-email")));
        assert!(!FormatCheck::Email.matches(&Value::Number(5.0)));
    }

    #[test]
    fn currency_accepts_numbers_and_two_decimals() {
        assert!(FormatCheck::Currency.matches(&Value::Number(10.5)));
        assert!(FormatCheck::Currency.matches(&Value::from("10.50")));
        assert!(!FormatCheck::Currency.matches(&Value::from("10.505")));
        assert!(!FormatCheck::Currency.matches(&Value::Number(-3.0)));
    }

    #[test]
    fn field_name_drives_check_selection() {
        assert_eq!(FormatCheck::for_field("customer_email"), Some(FormatCheck::Email));
        assert_eq!(FormatCheck::for_field("txn_amount"), Some(FormatCheck::Currency));
        assert_eq!(FormatCheck::for_field("comment"), None);
    }

    #[test]
    fn parse_timestamp_handles_common_forms() {
        assert!(parse_timestamp(&Value::from("2026-01-02T03:04:05Z")).is_some());
        assert!(parse_timestamp(&Value::from("2026-01-02 03:04:05")).is_some());
        assert!(parse_timestamp(&Value::from("2026-01-02")).is_some());
        assert!(parse_timestamp(&Value::from("yesterday")).is_none());
    }
}
