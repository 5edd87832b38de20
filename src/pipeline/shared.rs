//! Shared state between an execution node and its prefetcher.
//!
//! Two queues carry bundles in opposite directions:
//!
//! ```text
//! Queue              | Writer          | Reader          | Contents
//! -------------------+-----------------+-----------------+--------------------------------
//! awaiting_staging   | execution node  | prefetcher      | device tensors to fill
//! ready_for_execution| prefetcher      | execution node  | device tensors holding host data
//! ```
//!
//! Per iteration the execution node pushes the bundle it wants filled next,
//! then pops a bundle the prefetcher staged earlier and computes on it. The
//! prefetcher pops, copies host data in, and pushes the bundle back. The
//! computed-on bundle therefore always lags the most recently queued host
//! data by one iteration.
//!
//! The buffer depth is unknown until the execution node first runs, while the
//! prefetcher may already be waiting on it, so it is a write-once cell that
//! readers block on.

use crate::error::{PrefetchError, Result};
use crate::pipeline::bundle::TensorBundle;
use crate::pipeline::handoff::HandoffQueue;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Identity of a compiled subgraph instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub node_name: String,
    pub backend_name: String,
    pub cluster_id: i32,
    pub graph_id: i32,
}

impl ResourceKey {
    pub fn new(
        node_name: impl Into<String>,
        backend_name: impl Into<String>,
        cluster_id: i32,
        graph_id: i32,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            backend_name: backend_name.into(),
            cluster_id,
            graph_id,
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.node_name, self.backend_name, self.cluster_id, self.graph_id
        )
    }
}

#[derive(Debug, Default)]
struct PipelineState {
    buffer_depth: Option<usize>,
    skip_count: u64,
    shut_down: bool,
}

/// Pipeline coordinator shared by an execution node and its prefetcher.
pub struct PrefetchSharedResource<T> {
    key: ResourceKey,
    awaiting_staging: HandoffQueue<TensorBundle<T>>,
    ready_for_execution: HandoffQueue<TensorBundle<T>>,
    state: Mutex<PipelineState>,
    depth_set: Condvar,
}

impl<T> PrefetchSharedResource<T> {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            awaiting_staging: HandoffQueue::new(),
            ready_for_execution: HandoffQueue::new(),
            state: Mutex::new(PipelineState::default()),
            depth_set: Condvar::new(),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.node_name
    }

    pub fn backend_name(&self) -> &str {
        &self.key.backend_name
    }

    pub fn cluster_id(&self) -> i32 {
        self.key.cluster_id
    }

    pub fn graph_id(&self) -> i32 {
        self.key.graph_id
    }

    // ── Queues ──

    /// Queue device tensors for the prefetcher to fill. Called by the execution node.
    pub fn push_awaiting_staging(&self, bundle: TensorBundle<T>) {
        tracing::trace!(id = bundle.id, "Bundle awaiting staging");
        self.awaiting_staging.push(bundle);
    }

    /// Next bundle to copy host data into. Called by the prefetcher.
    pub fn pop_awaiting_staging(&self) -> Result<TensorBundle<T>> {
        self.awaiting_staging.get_next_available()
    }

    /// Hand a filled bundle back. Called by the prefetcher.
    pub fn push_ready_for_execution(&self, bundle: TensorBundle<T>) {
        tracing::trace!(id = bundle.id, "Bundle ready for execution");
        self.ready_for_execution.push(bundle);
    }

    /// Next filled bundle to compute on. Called by the execution node.
    pub fn pop_ready_for_execution(&self) -> Result<TensorBundle<T>> {
        self.ready_for_execution.get_next_available()
    }

    pub fn pop_ready_for_execution_timeout(&self, timeout: Duration) -> Result<TensorBundle<T>> {
        self.ready_for_execution.get_next_available_timeout(timeout)
    }

    /// Number of bundles waiting in each queue: `(awaiting_staging, ready_for_execution)`
    pub fn queue_lengths(&self) -> (usize, usize) {
        (self.awaiting_staging.len(), self.ready_for_execution.len())
    }

    // ── Buffer depth ──

    /// Fix the number of bundles cycling through the pipeline and wake readers.
    ///
    /// Setting the same depth again is accepted; a different one is rejected.
    pub fn set_buffer_depth(&self, depth: usize) -> Result<()> {
        self.store_buffer_depth(depth, false)
    }

    /// Fix the buffer depth, failing if any depth was already set.
    ///
    /// The caller that succeeds owns the right to fill the pipeline with
    /// `depth` bundles. A repeat of the same depth fails with
    /// [`PrefetchError::AlreadyPrimed`].
    pub fn claim_buffer_depth(&self, depth: usize) -> Result<()> {
        self.store_buffer_depth(depth, true)
    }

    fn store_buffer_depth(&self, depth: usize, exclusive: bool) -> Result<()> {
        if depth == 0 {
            return Err(PrefetchError::InvalidBufferDepth(depth));
        }
        let mut state = self.lock_state();
        match state.buffer_depth {
            Some(current) if current != depth => {
                return Err(PrefetchError::BufferDepthConflict {
                    current,
                    requested: depth,
                });
            }
            Some(current) if exclusive => {
                return Err(PrefetchError::AlreadyPrimed { depth: current });
            }
            Some(_) => return Ok(()),
            None => state.buffer_depth = Some(depth),
        }
        drop(state);

        tracing::debug!(resource = %self.key, depth, "Prefetch buffer depth set");
        self.depth_set.notify_all();
        Ok(())
    }

    /// Block until the buffer depth is set, then return it.
    pub fn get_buffer_depth(&self) -> Result<usize> {
        let state = self
            .depth_set
            .wait_while(self.lock_state(), |s| s.buffer_depth.is_none() && !s.shut_down)
            .unwrap_or_else(|e| e.into_inner());
        state.buffer_depth.ok_or(PrefetchError::QueueClosed)
    }

    /// Like [`get_buffer_depth`](Self::get_buffer_depth) but gives up after `timeout`.
    pub fn get_buffer_depth_timeout(&self, timeout: Duration) -> Result<usize> {
        let start = Instant::now();
        let (state, _) = self
            .depth_set
            .wait_timeout_while(self.lock_state(), timeout, |s| {
                s.buffer_depth.is_none() && !s.shut_down
            })
            .unwrap_or_else(|e| e.into_inner());
        match state.buffer_depth {
            Some(depth) => Ok(depth),
            None if state.shut_down => Err(PrefetchError::QueueClosed),
            None => Err(PrefetchError::Timeout(format!(
                "buffer depth not set after {:?}",
                start.elapsed()
            ))),
        }
    }

    /// The buffer depth if already set. Never blocks.
    pub fn try_buffer_depth(&self) -> Option<usize> {
        self.lock_state().buffer_depth
    }

    // ── Skip count ──

    /// Record an iteration that bypassed the pipeline.
    pub fn increment_skip_count(&self) {
        self.lock_state().skip_count += 1;
    }

    pub fn skip_count(&self) -> u64 {
        self.lock_state().skip_count
    }

    // ── Teardown ──

    /// Close both queues and wake every blocked reader.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock_state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
        }
        self.awaiting_staging.close();
        self.ready_for_execution.close();
        self.depth_set.notify_all();
        tracing::info!(resource = %self.key, "Prefetch resource shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_state().shut_down
    }

    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T> fmt::Debug for PrefetchSharedResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("PrefetchSharedResource")
            .field("key", &self.key)
            .field("buffer_depth", &state.buffer_depth)
            .field("skip_count", &state.skip_count)
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn resource() -> PrefetchSharedResource<u32> {
        PrefetchSharedResource::new(ResourceKey::new("cluster_0", "CPU", 0, 1))
    }

    #[test]
    fn test_identity_accessors() {
        let r = resource();
        assert_eq!(r.name(), "cluster_0");
        assert_eq!(r.backend_name(), "CPU");
        assert_eq!(r.cluster_id(), 0);
        assert_eq!(r.graph_id(), 1);
        assert_eq!(r.key().to_string(), "cluster_0_CPU_0_1");
    }

    #[test]
    fn test_queues_are_independent() {
        let r = resource();
        r.push_awaiting_staging(TensorBundle::new(1, vec![10]));
        r.push_ready_for_execution(TensorBundle::new(2, vec![20]));
        assert_eq!(r.queue_lengths(), (1, 1));

        assert_eq!(r.pop_awaiting_staging().unwrap().id, 1);
        assert_eq!(r.pop_ready_for_execution().unwrap().id, 2);
        assert_eq!(r.queue_lengths(), (0, 0));
    }

    #[test]
    fn test_buffer_depth_write_once() {
        let r = resource();
        assert_eq!(r.try_buffer_depth(), None);

        r.set_buffer_depth(2).unwrap();
        r.set_buffer_depth(2).unwrap();
        assert_eq!(r.get_buffer_depth().unwrap(), 2);

        let err = r.set_buffer_depth(3).unwrap_err();
        assert!(matches!(
            err,
            PrefetchError::BufferDepthConflict {
                current: 2,
                requested: 3
            }
        ));
        assert_eq!(r.try_buffer_depth(), Some(2));
    }

    #[test]
    fn test_claim_buffer_depth_is_exclusive() {
        let r = resource();
        r.claim_buffer_depth(2).unwrap();

        assert!(matches!(
            r.claim_buffer_depth(2),
            Err(PrefetchError::AlreadyPrimed { depth: 2 })
        ));
        assert!(matches!(
            r.claim_buffer_depth(1),
            Err(PrefetchError::BufferDepthConflict {
                current: 2,
                requested: 1
            })
        ));
        // Non-exclusive setters still accept the agreed value
        r.set_buffer_depth(2).unwrap();
        assert_eq!(r.try_buffer_depth(), Some(2));
    }

    #[test]
    fn test_push_after_shutdown_is_drained() {
        let r = resource();
        r.shutdown();

        r.push_awaiting_staging(TensorBundle::new(7, vec![70]));
        r.push_ready_for_execution(TensorBundle::new(8, vec![80]));
        assert_eq!(r.queue_lengths(), (1, 1));

        assert_eq!(r.pop_awaiting_staging().unwrap().id, 7);
        assert_eq!(r.pop_ready_for_execution().unwrap().id, 8);
        assert!(r.pop_awaiting_staging().unwrap_err().is_closed());
        assert!(r.pop_ready_for_execution().unwrap_err().is_closed());
    }

    #[test]
    fn test_zero_depth_rejected() {
        let r = resource();
        assert!(matches!(
            r.set_buffer_depth(0),
            Err(PrefetchError::InvalidBufferDepth(0))
        ));
        assert_eq!(r.try_buffer_depth(), None);
    }

    #[test]
    fn test_depth_rendezvous() {
        let r = Arc::new(resource());
        let readers: Vec<_> = (0..3)
            .map(|_| {
                let r = Arc::clone(&r);
                thread::spawn(move || r.get_buffer_depth())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        r.set_buffer_depth(4).unwrap();

        for reader in readers {
            assert_eq!(reader.join().unwrap().unwrap(), 4);
        }
    }

    #[test]
    fn test_depth_timeout() {
        let r = resource();
        assert!(matches!(
            r.get_buffer_depth_timeout(Duration::from_millis(10)),
            Err(PrefetchError::Timeout(_))
        ));
    }

    #[test]
    fn test_shutdown_wakes_depth_reader() {
        let r = Arc::new(resource());
        let reader = {
            let r = Arc::clone(&r);
            thread::spawn(move || r.get_buffer_depth())
        };

        thread::sleep(Duration::from_millis(20));
        r.shutdown();
        assert!(reader.join().unwrap().unwrap_err().is_closed());
        assert!(r.is_shut_down());
        assert!(r.pop_awaiting_staging().unwrap_err().is_closed());
    }

    #[test]
    fn test_depth_survives_shutdown() {
        let r = resource();
        r.set_buffer_depth(2).unwrap();
        r.shutdown();
        assert_eq!(r.get_buffer_depth().unwrap(), 2);
    }

    #[test]
    fn test_skip_count() {
        let r = Arc::new(resource());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let r = Arc::clone(&r);
                thread::spawn(move || {
                    for _ in 0..25 {
                        r.increment_skip_count();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(r.skip_count(), 100);
    }
}
