use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use chrono::Utc;
use dataflume_core::SchemaSnapshot;

use crate::errors::LineageError;
use crate::model::{
    Direction, GraphEdge, LineageEntry, LineageGraph, LineageInfo, SchemaChange,
};

#[derive(Default)]
struct Store {
    entries: Vec<LineageEntry>,
    /// dataset -> indices of entries listing it as a source.
    forward: BTreeMap<String, Vec<usize>>,
    /// dataset -> indices of entries targeting it.
    reverse: BTreeMap<String, Vec<usize>>,
    schema_log: BTreeMap<String, Vec<SchemaChange>>,
}

/// Append-only provenance store shared across pipeline workers.
///
/// Interior locking keeps appends and traversals safe under concurrent use;
/// no lock is ever held across an await point.
#[derive(Default)]
pub struct Tracker {
    inner: RwLock<Store>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lineage entry: one edge from each source dataset to the
    /// target dataset.
    pub fn track(&self, entry: LineageEntry) -> Result<(), LineageError> {
        if entry.target_dataset.trim().is_empty() {
            return Err(LineageError::InvalidEntry(
                "target_dataset must not be empty".to_string(),
            ));
        }
        if entry.source_datasets.is_empty() {
            return Err(LineageError::InvalidEntry(
                "source_datasets must not be empty".to_string(),
            ));
        }

        let mut store = self.write();
        let index = store.entries.len();
        for source in &entry.source_datasets {
            store.forward.entry(source.clone()).or_default().push(index);
        }
        store
            .reverse
            .entry(entry.target_dataset.clone())
            .or_default()
            .push(index);
        store.entries.push(entry);
        Ok(())
    }

    /// Append to a dataset's schema-change log.
    pub fn track_schema_change(&self, change: SchemaChange) -> Result<(), LineageError> {
        if change.dataset.trim().is_empty() {
            return Err(LineageError::InvalidEntry(
                "dataset must not be empty".to_string(),
            ));
        }
        if change.field.trim().is_empty() {
            return Err(LineageError::InvalidEntry(
                "field must not be empty".to_string(),
            ));
        }

        self.write()
            .schema_log
            .entry(change.dataset.clone())
            .or_default()
            .push(change);
        Ok(())
    }

    /// Bounded breadth-first traversal from a dataset.
    ///
    /// Each `(node, direction)` pair is expanded at most once, so traversal
    /// terminates within `max_depth` levels even on cyclic graphs.
    pub fn dataset_lineage(
        &self,
        dataset: &str,
        direction: Direction,
        max_depth: usize,
    ) -> LineageInfo {
        let store = self.read();

        let mut nodes: BTreeSet<String> = BTreeSet::new();
        nodes.insert(dataset.to_string());
        let mut edges: BTreeSet<GraphEdge> = BTreeSet::new();
        let mut expanded: BTreeSet<(String, Direction)> = BTreeSet::new();

        let directions = match direction {
            Direction::Both => vec![Direction::Upstream, Direction::Downstream],
            other => vec![other],
        };

        let mut frontier: Vec<(String, Direction)> = directions
            .into_iter()
            .map(|dir| (dataset.to_string(), dir))
            .collect();

        let mut depth = 0;
        while depth < max_depth && !frontier.is_empty() {
            let mut next = Vec::new();
            for (node, dir) in frontier {
                if !expanded.insert((node.clone(), dir)) {
                    continue;
                }
                match dir {
                    Direction::Upstream => {
                        for &index in store.reverse.get(&node).into_iter().flatten() {
                            let entry = &store.entries[index];
                            for source in &entry.source_datasets {
                                nodes.insert(source.clone());
                                edges.insert(GraphEdge {
                                    source: source.clone(),
                                    target: entry.target_dataset.clone(),
                                    operation: entry.operation.clone(),
                                });
                                next.push((source.clone(), dir));
                            }
                        }
                    }
                    Direction::Downstream => {
                        for &index in store.forward.get(&node).into_iter().flatten() {
                            let entry = &store.entries[index];
                            nodes.insert(entry.target_dataset.clone());
                            edges.insert(GraphEdge {
                                source: node.clone(),
                                target: entry.target_dataset.clone(),
                                operation: entry.operation.clone(),
                            });
                            next.push((entry.target_dataset.clone(), dir));
                        }
                    }
                    Direction::Both => unreachable!("expanded into concrete directions"),
                }
            }
            frontier = next;
            depth += 1;
        }

        LineageInfo {
            dataset: dataset.to_string(),
            graph: LineageGraph {
                nodes: nodes.into_iter().collect(),
                edges: edges.into_iter().collect(),
            },
        }
    }

    /// Dataset ids reachable by following edges backward, origin excluded.
    pub fn upstream(&self, dataset: &str, max_depth: usize) -> Vec<String> {
        self.reachable(dataset, Direction::Upstream, max_depth)
    }

    /// Dataset ids reachable by following edges forward, origin excluded.
    pub fn downstream(&self, dataset: &str, max_depth: usize) -> Vec<String> {
        self.reachable(dataset, Direction::Downstream, max_depth)
    }

    fn reachable(&self, dataset: &str, direction: Direction, max_depth: usize) -> Vec<String> {
        self.dataset_lineage(dataset, direction, max_depth)
            .graph
            .nodes
            .into_iter()
            .filter(|node| node != dataset)
            .collect()
    }

    /// The dataset's ordered schema-change history.
    pub fn schema_history(&self, dataset: &str) -> Vec<SchemaChange> {
        self.read()
            .schema_log
            .get(dataset)
            .cloned()
            .unwrap_or_default()
    }

    /// Current schema: the `new_schema` of the most recent schema change,
    /// else the snapshot of the most recent lineage entry targeting the
    /// dataset.
    pub fn current_schema(&self, dataset: &str) -> Option<SchemaSnapshot> {
        let store = self.read();
        if let Some(changes) = store.schema_log.get(dataset)
            && let Some(change) = changes.last()
        {
            return Some(change.new_schema.clone());
        }
        store
            .reverse
            .get(dataset)
            .and_then(|indices| indices.last())
            .map(|&index| store.entries[index].schema_snapshot.clone())
    }

    pub fn entry_count(&self) -> usize {
        self.read().entries.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Store> {
        self.inner.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Store> {
        self.inner.write().unwrap_or_else(|err| err.into_inner())
    }
}

/// Expand the structural differences between two snapshots into
/// schema-change log entries for a dataset.
pub fn diff_schemas(
    dataset: &str,
    old: &SchemaSnapshot,
    new: &SchemaSnapshot,
) -> Vec<SchemaChange> {
    let timestamp = Utc::now();
    old.diff(new)
        .into_iter()
        .map(|delta| SchemaChange {
            dataset: dataset.to_string(),
            change_type: delta.change,
            field: delta.field,
            old_schema: old.clone(),
            new_schema: new.clone(),
            timestamp,
        })
        .collect()
}
