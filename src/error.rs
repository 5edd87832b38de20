//! Error handling for the tensor prefetch pipeline
//!
//! This module defines custom error types and a Result alias for use
//! throughout the crate.

use thiserror::Error;

/// Main error type for prefetch pipeline operations
#[derive(Error, Debug)]
pub enum PrefetchError {
    /// A prefetch-eligible input is not part of the pipelined inputs
    /// (typically because it is also fed by a variable)
    #[error("Prefetched input index {index} not found in pipelined inputs")]
    PrefetchedIndexNotPipelined { index: usize },

    /// The buffer depth was already fixed to a different value
    #[error("Buffer depth already set to {current}, cannot change it to {requested}")]
    BufferDepthConflict { current: usize, requested: usize },

    /// The pipeline already has its bundles in flight
    #[error("Prefetch pipeline already primed with {depth} buffers")]
    AlreadyPrimed { depth: usize },

    /// The requested buffer depth cannot hold any bundle
    #[error("Invalid buffer depth: {0}")]
    InvalidBufferDepth(usize),

    /// The queue or resource was shut down while waiting on it
    #[error("Handoff queue closed")]
    QueueClosed,

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Errors raised while copying host data into device tensors
    #[error("Staging error: {0}")]
    Staging(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// The prefetcher thread panicked
    #[error("Prefetcher thread panicked: {0}")]
    WorkerPanicked(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PrefetchError>,
    },
}

impl PrefetchError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PrefetchError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) signals a closed queue
    pub fn is_closed(&self) -> bool {
        match self {
            PrefetchError::QueueClosed => true,
            PrefetchError::WithContext { source, .. } => source.is_closed(),
            _ => false,
        }
    }
}

/// Result type alias for prefetch pipeline operations
pub type Result<T> = std::result::Result<T, PrefetchError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
