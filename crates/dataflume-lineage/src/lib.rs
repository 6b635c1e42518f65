//! Lineage tracker for Dataflume.
//!
//! An append-only dataset transformation graph and per-dataset
//! schema-evolution log, with depth-bounded traversals that terminate even
//! on cyclic graphs.

pub mod errors;
pub mod model;
pub mod tracker;

pub use errors::LineageError;
pub use model::{
    Direction, GraphEdge, LineageEntry, LineageGraph, LineageInfo, SchemaChange, Transformation,
};
pub use tracker::{Tracker, diff_schemas};
