//! Graph Cache
//!
//! Persists one base's dependents graph and its topological order in the
//! key-value store:
//!
//! - `graph:{workspace}:{base}`: a hash, field id → JSON array of the ids
//!   that depend on it. Every node has an entry, even with `[]`.
//! - `topSort:{workspace}:{base}`: a JSON array holding the full order.
//!
//! Both keys share a sliding expiry that is refreshed whenever they are
//! read or written. The cache is disposable: losing it only costs a rebuild
//! from the field records.
//!
//! All writes of one mutation go through a single [`Batch`], so readers
//! never observe an edge map and order from different versions.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::ResolverConfig;
use crate::error::{StoreError, StoreResult};
use crate::graph::DependentsGraph;
use crate::ids::{BaseId, FieldId};
use crate::store::{Batch, KvStore};

/// Cache handle for one base.
pub struct GraphCache<'a> {
    store: &'a dyn KvStore,
    graph_key: String,
    order_key: String,
    ttl: Duration,
    timeout: Duration,
}

impl<'a> GraphCache<'a> {
    /// Handle for `base_id` in `workspace_id`.
    pub fn new(store: &'a dyn KvStore, config: &ResolverConfig, workspace_id: &str, base_id: &BaseId) -> Self {
        Self {
            store,
            graph_key: format!("{}:{}:{}", config.graph_key_prefix, workspace_id, base_id),
            order_key: format!("{}:{}:{}", config.order_key_prefix, workspace_id, base_id),
            ttl: config.graph_ttl(),
            timeout: config.store_timeout(),
        }
    }

    /// Key of the graph hash.
    pub fn graph_key(&self) -> &str {
        &self.graph_key
    }

    /// Key of the cached order.
    pub fn order_key(&self) -> &str {
        &self.order_key
    }

    async fn timed<T, F>(&self, operation: &'static str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    /// Whether `field_id` is a node of the cached graph.
    pub async fn has_field(&self, field_id: &FieldId) -> StoreResult<bool> {
        self.timed(
            "hash_field_exists",
            self.store.hash_field_exists(&self.graph_key, field_id.as_str()),
        )
        .await
    }

    /// Slide the graph's expiry forward.
    pub async fn touch(&self) -> StoreResult<()> {
        self.timed("expire", self.store.expire(&self.graph_key, self.ttl)).await?;
        Ok(())
    }

    /// Rehydrate the cached graph, keeping the stored node order.
    ///
    /// A missing or empty hash is a miss. The read is a single call, so a
    /// key that expires or is evicted mid-request never yields a partial
    /// graph.
    pub async fn load_graph(&self) -> StoreResult<Option<DependentsGraph>> {
        let pairs = self
            .timed("hash_get_all", self.store.hash_get_all(&self.graph_key))
            .await?;
        if pairs.is_empty() {
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(pairs.len());
        for (field_id, dependents) in pairs {
            let dependents: Vec<FieldId> =
                serde_json::from_str(&dependents).map_err(|source| StoreError::Corrupt {
                    key: format!("{}#{}", self.graph_key, field_id),
                    source,
                })?;
            entries.push((FieldId::new(field_id), dependents));
        }

        trace!(key = %self.graph_key, nodes = entries.len(), "graph loaded from cache");
        Ok(Some(DependentsGraph::from_entries(entries)))
    }

    /// The cached topological order, refreshing its expiry on a hit.
    pub async fn load_order(&self) -> StoreResult<Option<Vec<FieldId>>> {
        let Some(raw) = self.timed("get", self.store.get(&self.order_key)).await? else {
            return Ok(None);
        };
        let order = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key: self.order_key.clone(),
            source,
        })?;
        self.timed("expire", self.store.expire(&self.order_key, self.ttl)).await?;
        Ok(Some(order))
    }

    /// Store a freshly computed order on its own.
    pub async fn save_order(&self, order: &[FieldId]) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.set_ex(&self.order_key, serde_json::to_string(order)?, self.ttl);
        self.timed("exec", self.store.exec(batch)).await
    }

    /// Write the whole graph in one atomic batch.
    ///
    /// `removed` ids lose their hash entries entirely. The order is replaced
    /// when given and dropped otherwise, so a stale order never outlives the
    /// edge map it was computed from.
    pub async fn commit(
        &self,
        graph: &DependentsGraph,
        order: Option<&[FieldId]>,
        removed: &[FieldId],
    ) -> StoreResult<()> {
        let mut batch = Batch::new();

        for (field_id, dependents) in graph.iter() {
            let dependents: Vec<&FieldId> = dependents.iter().collect();
            batch.hash_set(&self.graph_key, field_id.as_str(), serde_json::to_string(&dependents)?);
        }
        for field_id in removed {
            batch.hash_delete(&self.graph_key, field_id.as_str());
        }
        batch.expire(&self.graph_key, self.ttl);

        match order {
            Some(order) => {
                batch.set_ex(&self.order_key, serde_json::to_string(order)?, self.ttl);
            }
            None => {
                batch.delete(&self.order_key);
            }
        }

        debug!(
            key = %self.graph_key,
            nodes = graph.node_count(),
            removed = removed.len(),
            with_order = order.is_some(),
            "committing graph"
        );
        self.timed("exec", self.store.exec(batch)).await
    }

    /// Drop both keys; the next access rebuilds from field records.
    pub async fn invalidate(&self) -> StoreResult<()> {
        let mut batch = Batch::new();
        batch.delete(&self.graph_key).delete(&self.order_key);
        self.timed("exec", self.store.exec(batch)).await
    }
}
