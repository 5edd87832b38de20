//! Double-buffered host-to-device prefetch pipeline.
//!
//! An execution node and a prefetcher thread exchange [`TensorBundle`]s
//! through a [`PrefetchSharedResource`] that owns two [`HandoffQueue`]s:
//!
//! ```text
//!                 awaiting_staging
//! [ExecutionDriver] ─────────────► [Prefetcher]
//!         ▲                              │ host → device copy
//!         └──────────────────────────────┘
//!                ready_for_execution
//! ```
//!
//! # Design
//!
//! - **Ownership transfer**: bundles move by value; whoever holds one owns
//!   its tensors, so tensor contents need no locking.
//! - **Write-once depth**: the buffer depth is a condvar-guarded cell the
//!   prefetcher blocks on until the execution node primes the pipeline.
//! - **Explicit teardown**: [`ResourceRegistry::remove`] shuts the resource
//!   down, releasing both threads from any blocking pop.

pub mod bundle;
pub mod driver;
pub mod handoff;
pub mod prefetcher;
pub mod registry;
pub mod shared;

pub use bundle::TensorBundle;
pub use driver::ExecutionDriver;
pub use handoff::HandoffQueue;
pub use prefetcher::{Prefetcher, PrefetcherHandle, PrefetcherOptions};
pub use registry::{ResourceRegistry, CONTAINER_NAME, RESOURCE_NAME};
pub use shared::{PrefetchSharedResource, ResourceKey};
