//! Prefetcher worker thread.
//!
//! The worker waits for the execution node to fix the buffer depth, then
//! loops: take a bundle awaiting staging, copy host data into its device
//! tensors, hand it back as ready for execution. It exits when the resource
//! is shut down, or with the staging error if a copy fails.

use crate::error::{PrefetchError, Result, ResultExt};
use crate::pipeline::bundle::TensorBundle;
use crate::pipeline::shared::PrefetchSharedResource;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Options for a prefetcher thread
#[derive(Debug, Clone, Default)]
pub struct PrefetcherOptions {
    /// Log every staged bundle at debug level
    pub log_tensor_copies: bool,
}

/// Spawns prefetcher threads.
pub struct Prefetcher;

impl Prefetcher {
    /// Start a prefetcher for `resource`.
    ///
    /// `stage` copies host data into the device tensors of a bundle. It runs
    /// on the prefetcher thread and owns the bundle for the duration of the
    /// call.
    pub fn spawn<T, F>(
        resource: Arc<PrefetchSharedResource<T>>,
        options: PrefetcherOptions,
        stage: F,
    ) -> Result<PrefetcherHandle<T>>
    where
        T: Send + 'static,
        F: FnMut(&mut TensorBundle<T>) -> Result<()> + Send + 'static,
    {
        let worker_resource = Arc::clone(&resource);
        let handle = thread::Builder::new()
            .name(format!("prefetch-{}", resource.name()))
            .spawn(move || run_loop(&worker_resource, &options, stage))?;

        Ok(PrefetcherHandle { handle, resource })
    }
}

fn run_loop<T, F>(
    resource: &PrefetchSharedResource<T>,
    options: &PrefetcherOptions,
    mut stage: F,
) -> Result<u64>
where
    F: FnMut(&mut TensorBundle<T>) -> Result<()>,
{
    tracing::info!(resource = %resource.key(), "Prefetcher thread started");

    let depth = match resource.get_buffer_depth() {
        Ok(depth) => depth,
        Err(e) if e.is_closed() => {
            tracing::info!("Prefetcher stopped before buffer depth was set");
            return Ok(0);
        }
        Err(e) => return Err(e),
    };
    tracing::debug!(depth, "Prefetcher buffer depth resolved");

    let mut staged = 0u64;
    loop {
        let mut bundle = match resource.pop_awaiting_staging() {
            Ok(bundle) => bundle,
            Err(e) if e.is_closed() => break,
            Err(e) => return Err(e),
        };

        let id = bundle.id;
        if let Err(e) = stage(&mut bundle).with_context(|| format!("Failed to stage bundle {}", id)) {
            tracing::error!("{}", e);
            resource.shutdown();
            return Err(e);
        }

        if options.log_tensor_copies {
            tracing::debug!(id, tensors = bundle.len(), "Staged host data to device");
        }
        resource.push_ready_for_execution(bundle);
        staged += 1;
    }

    tracing::info!(staged, "Prefetcher thread exiting");
    Ok(staged)
}

/// Handle to a running prefetcher thread.
pub struct PrefetcherHandle<T> {
    handle: JoinHandle<Result<u64>>,
    resource: Arc<PrefetchSharedResource<T>>,
}

impl<T> PrefetcherHandle<T> {
    pub fn resource(&self) -> &Arc<PrefetchSharedResource<T>> {
        &self.resource
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread and return the number of bundles it staged.
    pub fn join(self) -> Result<u64> {
        self.handle.join().map_err(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            PrefetchError::WorkerPanicked(message)
        })?
    }

    /// Shut the resource down and wait for the thread.
    pub fn shutdown(self) -> Result<u64> {
        self.resource.shutdown();
        self.join()
    }
}
