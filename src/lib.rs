//! # tensor-prefetch: Host-to-Device Prefetch Pipeline
//!
//! Overlaps host-to-device input staging with device computation for a
//! compiled subgraph that runs once per input batch. A prefetcher thread
//! copies the next batch's host data into device tensors while the execution
//! node computes on the batch staged one iteration earlier.
//!
//! ## Architecture
//!
//! - **Catalog**: per-node metadata recorded by graph passes (variable inputs,
//!   variable-assigning outputs, prefetch-eligible inputs)
//! - **Tensor manager**: classifies each input/output position once, from the catalog
//! - **Pipeline**: two handoff queues plus a write-once buffer depth, shared by
//!   the execution node and its prefetcher through a resource registry
//! - **Communication**: Crossbeam channels for thread-safe bundle transfer
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tensor_prefetch::{
//!     catalog::InMemoryCatalog,
//!     pipeline::{ExecutionDriver, Prefetcher, PrefetcherOptions, ResourceKey, ResourceRegistry},
//!     NodeIdentity, TensorManager,
//! };
//!
//! let catalog = InMemoryCatalog::new();
//! catalog.add_prefetched_input_indexes(0, "cluster_0", [0]);
//! let manager = TensorManager::new(&catalog, NodeIdentity::new("cluster_0", 0, 0), 2, 1)?;
//!
//! let registry = ResourceRegistry::<Vec<f32>>::new();
//! let resource = registry.create_or_fetch(ResourceKey::new("cluster_0", "CPU", 0, 0));
//!
//! let prefetcher = Prefetcher::spawn(Arc::clone(&resource), PrefetcherOptions::default(), |bundle| {
//!     // copy host data into bundle.inputs
//!     Ok(())
//! })?;
//!
//! let mut driver = ExecutionDriver::new(resource);
//! driver.prime(vec![vec![vec![0.0; 16]]; 2])?;
//! driver.run_iteration(|bundle| Ok(bundle.inputs[0][0]))?;
//!
//! registry.clear();
//! prefetcher.join()?;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod pipeline;
pub mod tensor_manager;

// Re-export commonly used types
pub use catalog::{Catalog, InMemoryCatalog};
pub use config::PrefetchConfig;
pub use error::{PrefetchError, Result};
pub use index::find_complement;
pub use pipeline::{
    ExecutionDriver, HandoffQueue, PrefetchSharedResource, Prefetcher, ResourceKey,
    ResourceRegistry, TensorBundle,
};
pub use tensor_manager::{NodeIdentity, TensorManager};
