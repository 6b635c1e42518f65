use chrono::{DateTime, Utc};
use dataflume_core::{ChangeType, SchemaSnapshot};
use serde::{Deserialize, Serialize};

/// One field-level transformation applied while producing a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One provenance record: a fan-in of edges from each source dataset to the
/// target dataset. Entries are append-only, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub target_dataset: String,
    pub operation: String,
    pub source_datasets: Vec<String>,
    #[serde(default, skip_serializing_if = "SchemaSnapshot::is_empty")]
    pub schema_snapshot: SchemaSnapshot,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<Transformation>,
    pub timestamp: DateTime<Utc>,
}

/// One entry in a dataset's ordered, immutable schema-change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaChange {
    pub dataset: String,
    pub change_type: ChangeType,
    pub field: String,
    pub old_schema: SchemaSnapshot,
    pub new_schema: SchemaSnapshot,
    pub timestamp: DateTime<Utc>,
}

/// Traversal direction over the lineage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upstream,
    Downstream,
    Both,
}

/// A directed edge in a traversal result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub operation: String,
}

/// Subgraph reachable from a dataset within a bounded number of hops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<GraphEdge>,
}

/// Traversal result for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageInfo {
    pub dataset: String,
    pub graph: LineageGraph,
}
