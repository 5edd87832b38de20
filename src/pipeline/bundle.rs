//! Tensor bundles moving between the execution node and the prefetcher.

/// An ordered group of device tensors, one per pipelined input position.
///
/// Whoever holds the bundle owns every tensor in it. Moving the bundle into a
/// [`HandoffQueue`](crate::pipeline::HandoffQueue) hands all of them over.
#[derive(Debug, PartialEq)]
pub struct TensorBundle<T> {
    /// Producer-assigned sequence number, for ordering and debugging only
    pub id: u64,
    pub inputs: Vec<T>,
}

impl<T> TensorBundle<T> {
    pub fn new(id: u64, inputs: Vec<T>) -> Self {
        Self { id, inputs }
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Consume the bundle, returning its tensors.
    pub fn into_inputs(self) -> Vec<T> {
        self.inputs
    }
}
