//! Prefetch pipeline demo
//!
//! Runs a simulated compiled subgraph for a fixed number of iterations, with
//! its prefetched inputs staged by a background thread when
//! `TENSOR_PREFETCH_ENABLE` is set, or copied synchronously otherwise.

use anyhow::Context;
use std::sync::Arc;
use tensor_prefetch::{
    catalog::{InMemoryCatalog, OutputVariableInfo},
    pipeline::{ExecutionDriver, Prefetcher, ResourceKey, ResourceRegistry, TensorBundle},
    NodeIdentity, PrefetchConfig, TensorManager,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const NODE_NAME: &str = "cluster_0";
const CLUSTER_ID: i32 = 0;
const GRAPH_ID: i32 = 0;
const NUM_INPUTS: usize = 4;
const NUM_OUTPUTS: usize = 2;
const TENSOR_LEN: usize = 1024;
const ITERATIONS: u64 = 8;

/// Simulated host batch: every element of batch `n` equals `n`
fn host_batch(n: u64) -> Vec<f32> {
    vec![n as f32; TENSOR_LEN]
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tensor_prefetch=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PrefetchConfig::from_env().context("Failed to read prefetch config")?;
    config.validate()?;
    tracing::info!("Starting prefetch demo with {:?}", config);

    // Input 0 is a variable, output 0 assigns one; inputs 1 and 3 are prefetched
    let catalog = InMemoryCatalog::new();
    catalog.add_input_variable(GRAPH_ID, NODE_NAME, 0, "weights");
    catalog.add_output_variable_info(
        GRAPH_ID,
        NODE_NAME,
        0,
        OutputVariableInfo {
            shared_name: "weights".to_string(),
            copy_to_host: false,
        },
    );
    catalog.add_prefetched_input_indexes(GRAPH_ID, NODE_NAME, [1, 3]);

    let identity = NodeIdentity::new(NODE_NAME, CLUSTER_ID, GRAPH_ID);
    let manager = Arc::new(
        TensorManager::new(&catalog, identity, NUM_INPUTS, NUM_OUTPUTS)
            .context("Invalid tensor configuration")?,
    );

    let registry = ResourceRegistry::<Vec<f32>>::new();
    let key = ResourceKey::new(NODE_NAME, config.backend_name.clone(), CLUSTER_ID, GRAPH_ID);
    let resource = registry.create_or_fetch(key.clone());

    let pipelined = manager.pipelined_input_indexes().len();
    let mut checksum = 0.0f64;

    if config.enabled && manager.has_prefetched_inputs() {
        let staging_manager = Arc::clone(&manager);
        let mut next_batch = 0u64;
        let prefetcher = Prefetcher::spawn(
            Arc::clone(&resource),
            config.prefetcher_options(),
            move |bundle: &mut TensorBundle<Vec<f32>>| {
                let batch = host_batch(next_batch);
                for &rank in staging_manager.pipelined_input_indexes_that_are_prefetched() {
                    bundle.inputs[rank].copy_from_slice(&batch);
                }
                next_batch += 1;
                Ok(())
            },
        )?;

        let mut driver = ExecutionDriver::new(Arc::clone(&resource));
        driver.prime(vec![vec![vec![0.0; TENSOR_LEN]; pipelined]; config.buffer_depth])?;

        let prefetched_ranks = manager.pipelined_input_indexes_that_are_prefetched();
        for iteration in 0..ITERATIONS {
            checksum += driver.run_iteration(|bundle| {
                // Inputs that are pipelined but not prefetched are copied here
                let batch = host_batch(iteration);
                for (rank, tensor) in bundle.inputs.iter_mut().enumerate() {
                    if !prefetched_ranks.contains(&rank) {
                        tensor.copy_from_slice(&batch);
                    }
                }
                Ok(bundle.inputs.iter().map(|t| t[0] as f64).sum::<f64>())
            })?;
        }

        registry.remove(&key);
        let staged = prefetcher.join()?;
        tracing::info!(
            iterations = driver.iterations(),
            staged,
            "Prefetched run complete"
        );
    } else {
        for iteration in 0..ITERATIONS {
            let inputs = vec![host_batch(iteration); pipelined];
            resource.increment_skip_count();
            checksum += inputs.iter().map(|t| t[0] as f64).sum::<f64>();
        }
        tracing::info!(
            skip_count = resource.skip_count(),
            "Synchronous run complete"
        );
        registry.remove(&key);
    }

    println!("checksum: {}", checksum);
    Ok(())
}
