//! Catalog of per-node tensor metadata.
//!
//! Graph rewriting passes record, for each compiled subgraph node, which
//! input positions are fed by variables, which outputs write back into a
//! variable (and whether they also need a copy to the host), and which inputs
//! may be prefetched. The [`TensorManager`](crate::TensorManager) consumes
//! that information through the [`Catalog`] trait.
//!
//! # Keys
//!
//! Per-index entries are keyed by `"{graph_id}_{node_name}_{index}"`, per-node
//! entries by `"{graph_id}_{node_name}"`.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// Read-only queries the tensor manager makes against the catalog.
#[cfg_attr(test, mockall::automock)]
pub trait Catalog: Send + Sync {
    /// Whether input `index` of the node is fed by a variable
    fn exists_variable_input(&self, graph_id: i32, node_name: &str, index: usize) -> bool;

    /// Whether output `index` of the node assigns to a variable
    fn exists_output_variable_info(&self, graph_id: i32, node_name: &str, index: usize) -> bool;

    /// Whether output `index` of the node must be copied back to the host
    fn output_needs_copy(&self, graph_id: i32, node_name: &str, index: usize) -> bool;

    /// Whether a prefetch index set was registered for the node
    fn exists_prefetch_index_set(&self, graph_id: i32, node_name: &str) -> bool;

    /// The prefetch-eligible input indexes for the node, in no particular order
    fn prefetch_index_set(&self, graph_id: i32, node_name: &str) -> Vec<usize>;
}

/// Builds the key for a per-node entry.
pub fn create_node_key(graph_id: i32, node_name: &str) -> String {
    format!("{}_{}", graph_id, node_name)
}

/// Builds the key for a per-index entry.
pub fn create_index_key(graph_id: i32, node_name: &str, index: usize) -> String {
    format!("{}_{}_{}", graph_id, node_name, index)
}

/// Where a variable-assigning output writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputVariableInfo {
    /// Shared name of the variable the output assigns
    pub shared_name: String,
    /// Whether the output is also returned to the host
    pub copy_to_host: bool,
}

#[derive(Debug, Default)]
struct CatalogMaps {
    input_variable_shared_names: HashMap<String, String>,
    output_variable_info: HashMap<String, OutputVariableInfo>,
    output_copy_indexes: HashMap<String, HashSet<usize>>,
    prefetched_input_indexes: HashMap<String, HashSet<usize>>,
}

/// Thread-safe in-memory catalog.
///
/// Writers are the graph passes that run before any node executes; readers
/// are tensor managers constructed afterwards.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    maps: RwLock<CatalogMaps>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that input `index` of the node is fed by `shared_name`.
    pub fn add_input_variable(
        &self,
        graph_id: i32,
        node_name: &str,
        index: usize,
        shared_name: impl Into<String>,
    ) {
        let key = create_index_key(graph_id, node_name, index);
        self.write()
            .input_variable_shared_names
            .insert(key, shared_name.into());
    }

    /// Record that output `index` of the node assigns to a variable.
    pub fn add_output_variable_info(
        &self,
        graph_id: i32,
        node_name: &str,
        index: usize,
        info: OutputVariableInfo,
    ) {
        let key = create_index_key(graph_id, node_name, index);
        self.write().output_variable_info.insert(key, info);
    }

    /// Record the outputs of the node that need a copy after execution.
    pub fn add_output_copy_indexes(
        &self,
        graph_id: i32,
        node_name: &str,
        indexes: impl IntoIterator<Item = usize>,
    ) {
        let key = create_node_key(graph_id, node_name);
        self.write()
            .output_copy_indexes
            .insert(key, indexes.into_iter().collect());
    }

    /// Record the inputs of the node eligible for prefetching.
    pub fn add_prefetched_input_indexes(
        &self,
        graph_id: i32,
        node_name: &str,
        indexes: impl IntoIterator<Item = usize>,
    ) {
        let key = create_node_key(graph_id, node_name);
        self.write()
            .prefetched_input_indexes
            .insert(key, indexes.into_iter().collect());
    }

    /// Shared name of the variable feeding input `index`, if any.
    pub fn input_variable_shared_name(
        &self,
        graph_id: i32,
        node_name: &str,
        index: usize,
    ) -> Option<String> {
        let key = create_index_key(graph_id, node_name, index);
        self.read().input_variable_shared_names.get(&key).cloned()
    }

    /// Variable info for output `index`, if it assigns one.
    pub fn output_variable_info(
        &self,
        graph_id: i32,
        node_name: &str,
        index: usize,
    ) -> Option<OutputVariableInfo> {
        let key = create_index_key(graph_id, node_name, index);
        self.read().output_variable_info.get(&key).cloned()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        *self.write() = CatalogMaps::default();
        tracing::debug!("Catalog cleared");
    }

    // The maps hold no cross-entry invariants, so poisoning is recovered.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, CatalogMaps> {
        self.maps.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CatalogMaps> {
        self.maps.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Catalog for InMemoryCatalog {
    fn exists_variable_input(&self, graph_id: i32, node_name: &str, index: usize) -> bool {
        let key = create_index_key(graph_id, node_name, index);
        self.read().input_variable_shared_names.contains_key(&key)
    }

    fn exists_output_variable_info(&self, graph_id: i32, node_name: &str, index: usize) -> bool {
        let key = create_index_key(graph_id, node_name, index);
        self.read().output_variable_info.contains_key(&key)
    }

    fn output_needs_copy(&self, graph_id: i32, node_name: &str, index: usize) -> bool {
        let key = create_node_key(graph_id, node_name);
        self.read()
            .output_copy_indexes
            .get(&key)
            .is_some_and(|set| set.contains(&index))
    }

    fn exists_prefetch_index_set(&self, graph_id: i32, node_name: &str) -> bool {
        let key = create_node_key(graph_id, node_name);
        self.read().prefetched_input_indexes.contains_key(&key)
    }

    fn prefetch_index_set(&self, graph_id: i32, node_name: &str) -> Vec<usize> {
        let key = create_node_key(graph_id, node_name);
        self.read()
            .prefetched_input_indexes
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}
