//! Tensor role classification for a compiled subgraph node.
//!
//! A node's inputs are either fed by variables or pipelined through the
//! staging path; its outputs either assign variables or are pipelined. A
//! subset of the pipelined inputs is prefetched ahead of execution. The
//! [`TensorManager`] computes these partitions once from the [`Catalog`] and
//! is read-only afterwards.
//!
//! # Index spaces
//!
//! Callers only allocate tensors for pipelined inputs, so a prefetched input
//! must also be addressed by its rank inside the pipelined set:
//!
//! ```text
//! inputs:     0  1  2  3  4  5  6
//! variables:  0     2        5
//! pipelined:     1     3  4     6      (ranks 0 1 2 3)
//! prefetched:          3        6      (ranks 1 3)
//! ```

use crate::catalog::Catalog;
use crate::error::{PrefetchError, Result};
use crate::index::find_complement;
use std::fmt;

/// Identifies the compiled subgraph node a tensor manager belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity {
    pub node_name: String,
    pub cluster_id: i32,
    pub graph_id: i32,
}

impl NodeIdentity {
    pub fn new(node_name: impl Into<String>, cluster_id: i32, graph_id: i32) -> Self {
        Self {
            node_name: node_name.into(),
            cluster_id,
            graph_id,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (cluster {}, graph {})",
            self.node_name, self.cluster_id, self.graph_id
        )
    }
}

/// Immutable partition of a node's input and output positions.
#[derive(Debug, Clone)]
pub struct TensorManager {
    identity: NodeIdentity,
    number_of_inputs: usize,
    number_of_outputs: usize,

    input_indexes_from_variables: Vec<usize>,
    output_indexes_assigning_variable: Vec<usize>,
    output_indexes_that_need_copy: Vec<usize>,

    pipelined_input_indexes: Vec<usize>,
    pipelined_output_indexes: Vec<usize>,

    prefetched_input_indexes: Vec<usize>,
    pipelined_input_indexes_prefetched: Vec<usize>,
}

impl TensorManager {
    /// Classify the node's tensors using the catalog.
    ///
    /// Fails with [`PrefetchError::PrefetchedIndexNotPipelined`] when the
    /// catalog lists a prefetched input that is not pipelined, either because
    /// it is fed by a variable or because it is out of range.
    pub fn new(
        catalog: &dyn Catalog,
        identity: NodeIdentity,
        number_of_inputs: usize,
        number_of_outputs: usize,
    ) -> Result<Self> {
        let graph_id = identity.graph_id;
        let node_name = identity.node_name.as_str();

        let input_indexes_from_variables: Vec<usize> = (0..number_of_inputs)
            .filter(|&i| catalog.exists_variable_input(graph_id, node_name, i))
            .collect();

        let mut output_indexes_assigning_variable = Vec::new();
        let mut output_indexes_that_need_copy = Vec::new();
        for index in 0..number_of_outputs {
            if catalog.exists_output_variable_info(graph_id, node_name, index) {
                output_indexes_assigning_variable.push(index);
            }
            if catalog.output_needs_copy(graph_id, node_name, index) {
                output_indexes_that_need_copy.push(index);
            }
        }

        let pipelined_input_indexes =
            find_complement(number_of_inputs, input_indexes_from_variables.iter().copied());
        let pipelined_output_indexes = find_complement(
            number_of_outputs,
            output_indexes_assigning_variable.iter().copied(),
        );

        let mut prefetched_input_indexes = Vec::new();
        if catalog.exists_prefetch_index_set(graph_id, node_name) {
            prefetched_input_indexes = catalog.prefetch_index_set(graph_id, node_name);
            prefetched_input_indexes.sort_unstable();
            prefetched_input_indexes.dedup();
        }

        // pipelined_input_indexes is ascending, so binary search yields the rank
        let pipelined_input_indexes_prefetched = prefetched_input_indexes
            .iter()
            .map(|&index| {
                pipelined_input_indexes
                    .binary_search(&index)
                    .map_err(|_| PrefetchError::PrefetchedIndexNotPipelined { index })
            })
            .collect::<Result<Vec<_>>>()
            .inspect_err(|e| {
                tracing::error!("Invalid prefetch configuration for {}: {}", identity, e)
            })?;

        tracing::debug!(
            node = %identity,
            variable_inputs = ?input_indexes_from_variables,
            pipelined_inputs = ?pipelined_input_indexes,
            pipelined_outputs = ?pipelined_output_indexes,
            prefetched_inputs = ?prefetched_input_indexes,
            "Tensor roles classified"
        );

        Ok(Self {
            identity,
            number_of_inputs,
            number_of_outputs,
            input_indexes_from_variables,
            output_indexes_assigning_variable,
            output_indexes_that_need_copy,
            pipelined_input_indexes,
            pipelined_output_indexes,
            prefetched_input_indexes,
            pipelined_input_indexes_prefetched,
        })
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn number_of_inputs(&self) -> usize {
        self.number_of_inputs
    }

    pub fn number_of_outputs(&self) -> usize {
        self.number_of_outputs
    }

    /// Inputs whose value comes from a variable binding
    pub fn input_indexes_fed_by_variables(&self) -> &[usize] {
        &self.input_indexes_from_variables
    }

    /// Outputs that write back into a variable
    pub fn output_indexes_assigning_variables(&self) -> &[usize] {
        &self.output_indexes_assigning_variable
    }

    /// Outputs that need a device-to-host copy after execution
    pub fn output_indexes_that_need_copy(&self) -> &[usize] {
        &self.output_indexes_that_need_copy
    }

    /// Inputs staged through the pipeline (complement of the variable inputs)
    pub fn pipelined_input_indexes(&self) -> &[usize] {
        &self.pipelined_input_indexes
    }

    /// Outputs handled as ordinary device buffers
    pub fn pipelined_output_indexes(&self) -> &[usize] {
        &self.pipelined_output_indexes
    }

    /// Input positions the prefetcher stages ahead of time
    pub fn prefetched_input_indexes(&self) -> &[usize] {
        &self.prefetched_input_indexes
    }

    /// Rank of each prefetched input within [`Self::pipelined_input_indexes`]
    pub fn pipelined_input_indexes_that_are_prefetched(&self) -> &[usize] {
        &self.pipelined_input_indexes_prefetched
    }

    /// Whether any input is prefetched
    pub fn has_prefetched_inputs(&self) -> bool {
        !self.prefetched_input_indexes.is_empty()
    }
}
