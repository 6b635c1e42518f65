//! Core contracts shared across the Dataflume crates.
//!
//! This crate defines the canonical record/value representation, the rule
//! model consumed by the validation engine, schema snapshots with diffing,
//! and the built-in semantic format checks.

pub mod error;
pub mod formats;
pub mod record;
pub mod rule;
pub mod schema;
pub mod value;

pub use error::{Error, Result};
pub use formats::{FormatCheck, parse_timestamp};
pub use record::{Batch, Record};
pub use rule::{Rule, RuleKind, RuleParams, Severity};
pub use schema::{ChangeType, SchemaDelta, SchemaSnapshot};
pub use value::Value;
