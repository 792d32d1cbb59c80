//! Indexing pipeline configuration

use std::num::NonZeroUsize;

use crate::batch::DEFAULT_CHUNK_SIZE;

/// Runtime configuration for one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Documents per published batch
    pub chunk_size: NonZeroUsize,
    /// Publisher threads; 1 publishes strictly in input order
    pub workers: NonZeroUsize,
}

impl Config {
    /// Build from raw values, rejecting zero.
    pub fn new(chunk_size: usize, workers: usize) -> Option<Self> {
        Some(Self {
            chunk_size: NonZeroUsize::new(chunk_size)?,
            workers: NonZeroUsize::new(workers)?,
        })
    }

    pub fn is_sequential(&self) -> bool {
        self.workers.get() == 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: NonZeroUsize::MIN,
        }
    }
}
