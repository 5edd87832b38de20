//! Execution-node side of the prefetch pipeline.
//!
//! The driver primes the pipeline with `buffer_depth` bundles, then each
//! iteration recycles the bundle it computed on last time and takes the next
//! staged one:
//!
//! ```text
//! iteration   push awaiting_staging     pop ready_for_execution
//! prime       0, 1                      -
//! 1           -                         0
//! 2           0 (as id 2)               1
//! 3           1 (as id 3)               2
//! ```

use crate::error::{PrefetchError, Result, ResultExt};
use crate::pipeline::bundle::TensorBundle;
use crate::pipeline::shared::PrefetchSharedResource;
use std::sync::Arc;

/// Drives the execution node's half of the handoff protocol.
pub struct ExecutionDriver<T> {
    resource: Arc<PrefetchSharedResource<T>>,
    next_id: u64,
    iterations: u64,
    primed: bool,
    /// Bundle computed on in the previous iteration, returned to staging next
    held: Option<TensorBundle<T>>,
}

impl<T> ExecutionDriver<T> {
    pub fn new(resource: Arc<PrefetchSharedResource<T>>) -> Self {
        Self {
            resource,
            next_id: 0,
            iterations: 0,
            primed: false,
            held: None,
        }
    }

    pub fn resource(&self) -> &Arc<PrefetchSharedResource<T>> {
        &self.resource
    }

    /// Fix the buffer depth to `buffers.len()` and queue every buffer set for
    /// staging.
    ///
    /// Each entry holds one device tensor per pipelined input, so all entries
    /// must have the same length. A pipeline is primed once: a second call,
    /// from this driver or another one on the same resource, is rejected
    /// without queueing anything.
    pub fn prime(&mut self, buffers: Vec<Vec<T>>) -> Result<()> {
        if self.primed {
            return Err(PrefetchError::AlreadyPrimed {
                depth: self.resource.try_buffer_depth().unwrap_or(0),
            });
        }
        if let Some(first) = buffers.first() {
            let width = first.len();
            if let Some(pos) = buffers.iter().position(|b| b.len() != width) {
                return Err(PrefetchError::Config(format!(
                    "buffer set {} holds {} tensors, expected {}",
                    pos,
                    buffers[pos].len(),
                    width
                )));
            }
        }

        self.resource
            .claim_buffer_depth(buffers.len())
            .context("Failed to prime prefetch pipeline")?;
        self.primed = true;

        for inputs in buffers {
            let bundle = TensorBundle::new(self.take_id(), inputs);
            self.resource.push_awaiting_staging(bundle);
        }
        tracing::debug!(
            resource = %self.resource.key(),
            depth = self.next_id,
            "Prefetch pipeline primed"
        );
        Ok(())
    }

    /// Run one iteration: return the previous bundle to staging, wait for the
    /// next staged bundle, and compute on it.
    pub fn run_iteration<R, F>(&mut self, compute: F) -> Result<R>
    where
        F: FnOnce(&mut TensorBundle<T>) -> Result<R>,
    {
        if self.resource.try_buffer_depth().is_none() {
            return Err(PrefetchError::Config(
                "prefetch pipeline used before it was primed".to_string(),
            ));
        }

        if let Some(previous) = self.held.take() {
            let recycled = TensorBundle::new(self.take_id(), previous.into_inputs());
            self.resource.push_awaiting_staging(recycled);
        }

        let mut bundle = self
            .resource
            .pop_ready_for_execution()
            .with_context(|| format!("Iteration {} has no staged bundle", self.iterations + 1))?;

        self.iterations += 1;
        tracing::trace!(iteration = self.iterations, id = bundle.id, "Executing on staged bundle");

        let result = compute(&mut bundle);
        self.held = Some(bundle);
        result
    }

    /// Record an iteration that copied its inputs synchronously instead of
    /// using the pipeline.
    pub fn record_skip(&self) {
        self.resource.increment_skip_count();
        tracing::debug!(
            skip_count = self.resource.skip_count(),
            "Prefetch bypassed for this iteration"
        );
    }

    /// Iterations that ran on a staged bundle
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Stop driving the pipeline, returning the bundle still held.
    pub fn finish(mut self) -> Option<TensorBundle<T>> {
        self.held.take()
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
