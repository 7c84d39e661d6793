//! Query engine configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{QueryError, Result};

/// Default memory budget for wide join bitvectors and column gathers (256 MB)
const DEFAULT_MEMORY_BUDGET: u64 = 256 * 1024 * 1024;

/// Default OR-branch masking factor
const DEFAULT_OR_MASK_FACTOR: f64 = 1.0;

/// Query engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Bytes a single operation may allocate for wide bitvectors or
    /// materialized column values
    pub memory_budget: u64,
    /// The scanner shrinks the mask of an OR's second operand only when the
    /// hits found so far exceed this factor times the combined size in bytes
    /// of the mask and hit vectors
    pub or_mask_factor: f64,
    /// Root directory for recoverable query state (`None` = memory only)
    pub persist_dir: Option<PathBuf>,
    /// Reorder predicate terms cheapest-first before evaluation
    pub reorder_predicates: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            memory_budget: DEFAULT_MEMORY_BUDGET,
            or_mask_factor: DEFAULT_OR_MASK_FACTOR,
            persist_dir: None,
            reorder_predicates: true,
        }
    }
}

impl QueryConfig {
    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| QueryError::Serialization(e.to_string()))
    }

    /// Set the memory budget
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Enable persistence under `dir`
    pub fn with_persist_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persist_dir = Some(dir.into());
        self
    }

    /// Set the OR-branch masking factor
    pub fn with_or_mask_factor(mut self, factor: f64) -> Self {
        self.or_mask_factor = factor;
        self
    }

    /// Budget left once `in_use` bytes are already held
    pub fn available_memory(&self, in_use: u64) -> u64 {
        self.memory_budget.saturating_sub(in_use)
    }

    /// Fail with `OutOfMemory` when `requested` bytes on top of `in_use`
    /// exceed the budget
    pub fn check_memory(&self, requested: u64, in_use: u64) -> Result<()> {
        let budget = self.available_memory(in_use);
        if requested > budget {
            return Err(QueryError::OutOfMemory { requested, budget });
        }
        Ok(())
    }
}
