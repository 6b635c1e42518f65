use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::Value;

/// A single data record: an ordered mapping of field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

/// A bounded group of records moved as a unit through the pipeline.
pub type Batch = Vec<Record>;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object; non-object values are rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        match Value::from(value) {
            Value::Map(fields) => Ok(Self { fields }),
            other => Err(Error::InvalidRecord(format!(
                "expected object, got {}",
                other.type_name()
            ))),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical identity string over every field, used for whole-record
    /// dedup keys. Field order is stable because the map is ordered.
    pub fn identity(&self) -> String {
        let mut parts = Vec::with_capacity(self.fields.len());
        for (field, value) in &self.fields {
            parts.push(format!("{field}={value}"));
        }
        parts.join("|")
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_rejects_scalars() {
        let err = Record::from_json(serde_json::json!(42)).unwrap_err();
        assert!(err.to_string().contains("expected object"));
    }

    #[test]
    fn identity_is_order_stable() {
        let mut a = Record::new();
        a.insert("b", 2i64).insert("a", 1i64);
        let mut b = Record::new();
        b.insert("a", 1i64).insert("b", 2i64);
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity(), "a=1|b=2");
    }
}
