//! Field Dependency Resolver
//!
//! The resolver is the public entry point. Every call runs the same steps:
//!
//! 1. **Resolve the graph.** Load the base's graph from the cache, or
//!    rebuild it by scanning every field of the base.
//! 2. **Apply the mutation** (for writes): recompute the upstream edges of
//!    the changed fields, or drop deleted fields.
//! 3. **Validate.** Sort the graph topologically; a cycle rejects the
//!    mutation.
//! 4. **Persist.** Write edges and order to the cache in one batch.
//!
//! Nothing is kept between calls except the single-flight table below; the
//! cache is the only shared state.
//!
//! # Rebuilds
//!
//! A rebuild is a full scan of the base and can be expensive. Concurrent
//! callers that miss the cache for the same base wait on a per-base async
//! mutex, and all but the first find the freshly written graph when they
//! get the lock.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::cache::GraphCache;
use crate::config::ResolverConfig;
use crate::error::{CycleReport, ResolverError, ResolverResult};
use crate::extract::{self, KnownPrimaries};
use crate::field::Field;
use crate::graph::{CyclePath, DependentsGraph, SortOutcome};
use crate::ids::{BaseId, BoardId, FieldId};
use crate::store::{FieldSource, KvStore};

/// Where the fields of a mutation live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A board; its base is looked up.
    Board(BoardId),
    /// A base, used directly.
    Base(BaseId),
}

impl From<BoardId> for Scope {
    fn from(id: BoardId) -> Self {
        Scope::Board(id)
    }
}

impl From<BaseId> for Scope {
    fn from(id: BaseId) -> Self {
        Scope::Base(id)
    }
}

/// Options for [`FieldDependencyResolver::add_or_update_fields`].
#[derive(Debug, Clone, Default)]
pub struct AddOrUpdateOptions {
    /// Report a cycle as [`Validation::Cycle`] instead of failing.
    pub no_throw: bool,
    /// Primary field to use for references to its board, skipping the lookup.
    /// Needed when the board is created in the same transaction.
    pub primary_field: Option<Field>,
}

impl AddOrUpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_throw(mut self) -> Self {
        self.no_throw = true;
        self
    }

    pub fn with_primary_field(mut self, field: Field) -> Self {
        self.primary_field = Some(field);
        self
    }
}

/// Outcome of validating a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// The graph is acyclic and was persisted.
    Valid,
    /// The mutation would create this cycle. Nothing was persisted.
    Cycle(CycleReport),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }

    pub fn cycle(&self) -> Option<&CycleReport> {
        match self {
            Validation::Valid => None,
            Validation::Cycle(report) => Some(report),
        }
    }
}

/// Immediate and transitive dependents of a batch of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descendants {
    pub direct: Vec<FieldId>,
    pub all: Vec<FieldId>,
}

/// Maintains the dependents graphs of one workspace.
pub struct FieldDependencyResolver {
    workspace_id: String,
    source: Arc<dyn FieldSource>,
    store: Arc<dyn KvStore>,
    config: ResolverConfig,
    rebuilds: DashMap<BaseId, Arc<Mutex<()>>>,
}

impl FieldDependencyResolver {
    /// Create a resolver with the default config.
    pub fn new(workspace_id: impl Into<String>, source: Arc<dyn FieldSource>, store: Arc<dyn KvStore>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            source,
            store,
            config: ResolverConfig::default(),
            rebuilds: DashMap::new(),
        }
    }

    /// Replace the config.
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn cache(&self, base_id: &BaseId) -> GraphCache<'_> {
        GraphCache::new(self.store.as_ref(), &self.config, &self.workspace_id, base_id)
    }

    async fn base_of_board(&self, board_id: &BoardId) -> ResolverResult<BaseId> {
        match self.source.board(board_id).await? {
            Some(board) => Ok(board.base_id),
            None => Err(ResolverError::board_not_found(board_id)),
        }
    }

    async fn resolve_base(&self, scope: &Scope) -> ResolverResult<BaseId> {
        match scope {
            Scope::Board(board_id) => self.base_of_board(board_id).await,
            Scope::Base(base_id) => Ok(base_id.clone()),
        }
    }

    /// The base's graph, from cache or rebuilt.
    async fn graph_for(&self, base_id: &BaseId) -> ResolverResult<DependentsGraph> {
        let cache = self.cache(base_id);
        if let Some(graph) = self.cached(&cache).await? {
            return Ok(graph);
        }

        let gate = self.rebuilds.entry(base_id.clone()).or_default().clone();
        let guard = gate.lock().await;
        let graph = self.rebuild_once(&cache, base_id).await;
        drop(guard);
        // A later miss may have installed a fresh gate; only drop our own.
        self.rebuilds.remove_if(base_id, |_, current| Arc::ptr_eq(current, &gate));
        graph
    }

    async fn cached(&self, cache: &GraphCache<'_>) -> ResolverResult<Option<DependentsGraph>> {
        let graph = cache.load_graph().await?;
        if graph.is_some() {
            cache.touch().await?;
        }
        Ok(graph)
    }

    /// Rebuild and persist, unless another caller did so while we waited.
    async fn rebuild_once(&self, cache: &GraphCache<'_>, base_id: &BaseId) -> ResolverResult<DependentsGraph> {
        if let Some(graph) = self.cached(cache).await? {
            return Ok(graph);
        }

        debug!(base = %base_id, "graph cache miss, rebuilding");
        let graph = self.build(base_id).await?;
        let order = match graph.topological_sort() {
            SortOutcome::Sorted(order) => Some(order),
            SortOutcome::Cycle(path) => {
                warn!(base = %base_id, cycle = %path, "stored field definitions contain a cycle");
                None
            }
        };
        cache.commit(&graph, order.as_deref(), &[]).await?;
        Ok(graph)
    }

    /// Full scan of every field in the base.
    async fn build(&self, base_id: &BaseId) -> ResolverResult<DependentsGraph> {
        let Some(boards) = self.source.fields_by_base(base_id).await? else {
            return Err(ResolverError::base_not_found(base_id));
        };

        let fields: Vec<&Field> = boards.iter().flat_map(|board| board.fields.iter()).collect();
        let mut graph = DependentsGraph::new();
        for field in &fields {
            graph.insert_node(field.id.clone());
        }

        let known = KnownPrimaries::from_fields(fields.iter().copied());
        let resolved = extract::resolve_all(fields.iter().copied(), self.source.as_ref(), &known).await?;
        for (field_id, upstream) in &resolved {
            extract::attach(&mut graph, field_id, upstream);
        }

        info!(
            base = %base_id,
            boards = boards.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "dependency graph built"
        );
        Ok(graph)
    }

    /// Sort the graph, hydrating the cycle's fields if there is one.
    async fn check(&self, graph: &DependentsGraph) -> ResolverResult<Result<Vec<FieldId>, CycleReport>> {
        match graph.topological_sort() {
            SortOutcome::Sorted(order) => Ok(Ok(order)),
            SortOutcome::Cycle(path) => Ok(Err(self.report(path).await?)),
        }
    }

    async fn report(&self, path: CyclePath) -> ResolverResult<CycleReport> {
        let fields = self.source.fields_by_ids(path.fields()).await?;
        Ok(CycleReport { path, fields })
    }

    /// Add new fields or re-derive the dependencies of edited ones.
    ///
    /// The changed fields are removed as dependents everywhere, then their
    /// upstream edges are extracted from scratch. Fields that depend *on*
    /// them keep their edges.
    #[tracing::instrument(
        skip(self, fields, options),
        fields(workspace = %self.workspace_id, fields = fields.len(), no_throw = options.no_throw)
    )]
    pub async fn add_or_update_fields(
        &self,
        scope: impl Into<Scope> + std::fmt::Debug,
        fields: &[Field],
        options: AddOrUpdateOptions,
    ) -> ResolverResult<Validation> {
        let base_id = self.resolve_base(&scope.into()).await?;
        let mut graph = self.graph_for(&base_id).await?;

        for field in fields {
            graph.remove_dependent(&field.id);
        }
        for field in fields {
            graph.insert_node(field.id.clone());
        }

        let mut known = KnownPrimaries::from_fields(fields);
        if let Some(primary) = &options.primary_field {
            known.insert(primary);
        }
        let resolved = extract::resolve_all(fields, self.source.as_ref(), &known).await?;
        for (field_id, upstream) in &resolved {
            extract::attach(&mut graph, field_id, upstream);
        }

        match self.check(&graph).await? {
            Ok(order) => {
                self.cache(&base_id).commit(&graph, Some(order.as_slice()), &[]).await?;
                Ok(Validation::Valid)
            }
            Err(report) => {
                warn!(base = %base_id, cycle = %report.path, "field change rejected");
                if options.no_throw {
                    Ok(Validation::Cycle(report))
                } else {
                    Err(ResolverError::CycleDetected(Box::new(report)))
                }
            }
        }
    }

    /// Remove fields from their base's graph.
    #[tracing::instrument(skip(self, field_ids), fields(workspace = %self.workspace_id, fields = field_ids.len()))]
    pub async fn delete_fields(&self, board_id: &BoardId, field_ids: &[FieldId]) -> ResolverResult<()> {
        let base_id = self.base_of_board(board_id).await?;
        let mut graph = self.graph_for(&base_id).await?;

        for field_id in field_ids {
            graph.remove_node(field_id);
        }

        let order = match graph.topological_sort() {
            SortOutcome::Sorted(order) => Some(order),
            SortOutcome::Cycle(path) => {
                warn!(base = %base_id, cycle = %path, "graph still cyclic after delete, order dropped");
                None
            }
        };
        self.cache(&base_id).commit(&graph, order.as_deref(), field_ids).await?;
        Ok(())
    }

    /// Fields to recompute after `changed` changed, in recompute order.
    ///
    /// The result is the changed fields plus everything downstream of them,
    /// in the relative order of the base's full topological order.
    #[tracing::instrument(skip(self, changed), fields(workspace = %self.workspace_id, changed = changed.len()))]
    pub async fn get_top_sort_order(&self, base_id: &BaseId, changed: &[FieldId]) -> ResolverResult<Vec<FieldId>> {
        let graph = self.graph_for(base_id).await?;
        let affected = graph.affected_by(changed);

        let cache = self.cache(base_id);
        let order = match cache.load_order().await? {
            Some(order) => order,
            None => match self.check(&graph).await? {
                Ok(order) => {
                    cache.save_order(&order).await?;
                    order
                }
                Err(report) => return Err(ResolverError::CycleDetected(Box::new(report))),
            },
        };

        Ok(order.into_iter().filter(|field_id| affected.contains(field_id)).collect())
    }

    /// Immediate and transitive dependents of `field_ids`, deduplicated
    /// across the batch.
    #[tracing::instrument(skip(self, field_ids), fields(workspace = %self.workspace_id))]
    pub async fn get_direct_and_all_descendants_from_fields(
        &self,
        board_id: &BoardId,
        field_ids: &[FieldId],
    ) -> ResolverResult<Descendants> {
        let base_id = self.base_of_board(board_id).await?;
        let graph = self.graph_for(&base_id).await?;

        let mut direct = IndexSet::new();
        let mut all = IndexSet::new();
        for field_id in field_ids {
            direct.extend(graph.direct_descendants(field_id));
            all.extend(graph.all_descendants(field_id));
        }

        Ok(Descendants {
            direct: direct.into_iter().collect(),
            all: all.into_iter().collect(),
        })
    }

    /// Drop the cached graph and order of a base.
    ///
    /// Reference edges point at the target board's primary field as it was
    /// when the graph was built; call this after a primary field changes.
    #[tracing::instrument(skip(self), fields(workspace = %self.workspace_id))]
    pub async fn invalidate(&self, base_id: &BaseId) -> ResolverResult<()> {
        self.cache(base_id).invalidate().await?;
        Ok(())
    }

    /// Whether the cached graph of `base_id` has a node for `field_id`.
    ///
    /// Only looks at the cache; returns `false` when no graph is cached.
    pub async fn is_tracked(&self, base_id: &BaseId, field_id: &FieldId) -> ResolverResult<bool> {
        Ok(self.cache(base_id).has_field(field_id).await?)
    }

    /// The current graph of a base, building it if needed.
    pub async fn graph(&self, base_id: &BaseId) -> ResolverResult<DependentsGraph> {
        self.graph_for(base_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Board, FieldKind, FormulaParams};
    use crate::store::memory::{MemoryFieldSource, MemoryKvStore};

    fn resolver() -> Arc<FieldDependencyResolver> {
        let source = Arc::new(MemoryFieldSource::new());
        source.add_board(Board::new("tasks", "base"));
        source.upsert_field(Field::new("B", "tasks", FieldKind::Text));
        source.upsert_field(Field::new(
            "A",
            "tasks",
            FieldKind::Formula(FormulaParams {
                expression: "{field:B}".to_string(),
            }),
        ));
        Arc::new(FieldDependencyResolver::new("ws", source, Arc::new(MemoryKvStore::new())))
    }

    #[tokio::test]
    async fn rebuild_gate_is_released_afterwards() {
        let resolver = resolver();
        resolver.graph(&BaseId::from("base")).await.unwrap();
        assert!(resolver.rebuilds.is_empty());
    }

    #[tokio::test]
    async fn waiter_leaves_a_newer_gate_in_place() {
        let resolver = resolver();
        let base = BaseId::from("base");
        let older = Arc::new(Mutex::new(()));
        let newer = Arc::new(Mutex::new(()));

        resolver.rebuilds.insert(base.clone(), older.clone());
        let held = older.lock().await;

        let waiter = tokio::spawn({
            let resolver = resolver.clone();
            let base = base.clone();
            async move { resolver.graph(&base).await }
        });
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        // The waiter is parked on `older`; a later miss installs `newer`.
        resolver.rebuilds.insert(base.clone(), newer.clone());
        drop(held);

        let graph = waiter.await.unwrap().unwrap();
        assert!(graph.has_edge(&FieldId::from("B"), &FieldId::from("A")));

        let current = resolver.rebuilds.get(&base).map(|gate| Arc::ptr_eq(gate.value(), &newer));
        assert_eq!(current, Some(true));
    }
}
