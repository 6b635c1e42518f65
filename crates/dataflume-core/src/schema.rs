use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Structural change categories tracked by schema evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    FieldAdded,
    FieldRemoved,
    TypeChanged,
}

/// One structural difference between two schema snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDelta {
    pub change: ChangeType,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_type: Option<String>,
}

/// Ordered field-to-type-label snapshot of a record set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaSnapshot {
    pub fields: BTreeMap<String, String>,
}

impl SchemaSnapshot {
    /// Infer a snapshot from records: each field gets its majority non-null
    /// runtime type, ties broken by type-name order.
    pub fn infer(records: &[Record]) -> Self {
        let mut counts: BTreeMap<&String, BTreeMap<&'static str, usize>> = BTreeMap::new();
        for record in records {
            for (field, value) in record.fields() {
                if value.is_null() {
                    continue;
                }
                *counts
                    .entry(field)
                    .or_default()
                    .entry(value.type_name())
                    .or_insert(0) += 1;
            }
        }

        let fields = counts
            .into_iter()
            .map(|(field, by_type)| {
                let majority = by_type
                    .into_iter()
                    .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(a.0)))
                    .map(|(name, _)| name)
                    .unwrap_or("null");
                (field.clone(), majority.to_string())
            })
            .collect();

        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Structural differences from `self` (old) to `new`, in deterministic
    /// field order: removed and type-changed fields first, then additions.
    pub fn diff(&self, new: &SchemaSnapshot) -> Vec<SchemaDelta> {
        let mut deltas = Vec::new();

        for (field, old_type) in &self.fields {
            match new.fields.get(field) {
                None => deltas.push(SchemaDelta {
                    change: ChangeType::FieldRemoved,
                    field: field.clone(),
                    old_type: Some(old_type.clone()),
                    new_type: None,
                }),
                Some(new_type) if new_type != old_type => deltas.push(SchemaDelta {
                    change: ChangeType::TypeChanged,
                    field: field.clone(),
                    old_type: Some(old_type.clone()),
                    new_type: Some(new_type.clone()),
                }),
                Some(_) => {}
            }
        }

        for (field, new_type) in &new.fields {
            if !self.fields.contains_key(field) {
                deltas.push(SchemaDelta {
                    change: ChangeType::FieldAdded,
                    field: field.clone(),
                    old_type: None,
                    new_type: Some(new_type.clone()),
                });
            }
        }

        deltas
    }
}
