//! Fieldgraph Core
//!
//! This crate tracks how the computed fields of a base depend on each other
//! and tells callers what to recompute, and in which order, when fields
//! change. It implements:
//!
//! - Dependency extraction for lookup, dropdown, reference, formula and
//!   last-modified fields
//! - A per-base dependents graph with cycle detection and topological order
//! - A key-value cache for the graph and its order
//! - The resolver that ties these together behind async operations
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `field`: Field records and their typed parameters
//! - `extract`: Upstream dependencies of a single field
//! - `graph`: The dependents graph, sorting and traversal
//! - `store`: Traits for the field source and key-value cache, with
//!   in-memory implementations
//! - `cache`: Key layout and atomic persistence of one base's graph
//! - `resolver`: The public operations
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fieldgraph_core::{AddOrUpdateOptions, FieldDependencyResolver};
//! use fieldgraph_core::store::memory::{MemoryFieldSource, MemoryKvStore};
//!
//! let resolver = FieldDependencyResolver::new(
//!     "workspace",
//!     Arc::new(MemoryFieldSource::new()),
//!     Arc::new(MemoryKvStore::new()),
//! );
//!
//! resolver
//!     .add_or_update_fields(board_id, &fields, AddOrUpdateOptions::new())
//!     .await?;
//! let order = resolver.get_top_sort_order(&base_id, &changed).await?;
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod field;
pub mod graph;
pub mod ids;
pub mod logging;
pub mod resolver;
pub mod store;

pub use config::{ConfigError, ResolverConfig};
pub use error::{CycleReport, EntityKind, ResolverError, ResolverResult, StoreError, StoreResult};
pub use field::{Board, Field, FieldKind, FieldType};
pub use graph::{CyclePath, DependentsGraph, SortOutcome};
pub use ids::{BaseId, BoardId, FieldId};
pub use resolver::{AddOrUpdateOptions, Descendants, FieldDependencyResolver, Scope, Validation};
