//! bitquery - bitmap-indexed analytical query engine
//!
//! A [`Query`] compiles a WHERE-clause expression tree into the set of
//! matching rows of a [`Dataset`] using compressed bitvector indexes. It
//! first brackets the answer between a sure-hit and a possible-hit bitvector
//! using indexes only, then resolves the undecided rows by scanning column
//! values. Join terms between two columns are evaluated separately by the
//! [`JoinEvaluator`] with nested-loop, sort-merge or index-assisted
//! algorithms.

pub mod bitvector;
pub mod config;
pub mod dataset;
pub mod expr;
pub mod join;
pub mod query;

// Re-export main types
pub use bitvector::{Bitvector, Bitvector64};
pub use config::QueryConfig;
pub use dataset::{Catalog, ColumnData, Dataset, DatasetData, IndexSpec};
pub use expr::{JoinTerm, MathTerm, QExpr, SelectClause};
pub use join::{JoinAlgorithm, JoinEvaluator};
pub use query::{Bounds, NoopObserver, Query, QueryObserver, QueryState};

/// Query engine error type
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("No dataset attached to the query")]
    NoDataset,

    #[error("No WHERE clause or RID list has been specified")]
    NoPredicate,

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid select clause: {0}")]
    InvalidSelect(String),

    #[error("Column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: u64,
        actual: u64,
    },

    #[error("Unsupported join: {0}")]
    UnsupportedJoin(String),

    #[error("Invalid query state: {0}")]
    InvalidState(String),

    #[error("Out of memory: need {requested} bytes, budget is {budget} bytes")]
    OutOfMemory { requested: u64, budget: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid file format")]
    InvalidFileFormat,

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u16, actual: u16 },
}

impl QueryError {
    /// Negative status code for callers that speak integers
    pub fn code(&self) -> i32 {
        match self {
            QueryError::NoDataset => -1,
            QueryError::NoPredicate => -2,
            QueryError::DatasetNotFound(_) => -3,
            QueryError::ColumnNotFound(_) => -4,
            QueryError::Parse(_) => -5,
            QueryError::InvalidSelect(_) => -6,
            QueryError::LengthMismatch { .. } => -7,
            QueryError::UnsupportedJoin(_) => -8,
            QueryError::InvalidState(_) => -9,
            QueryError::OutOfMemory { .. } => -11,
            QueryError::Io(_) => -12,
            QueryError::Serialization(_) => -13,
            QueryError::ChecksumMismatch => -14,
            QueryError::InvalidFileFormat => -15,
            QueryError::VersionMismatch { .. } => -16,
        }
    }

    /// Errors a caller can fix by changing the query
    pub fn is_configuration(&self) -> bool {
        self.code() > -10
    }
}

impl From<bincode::Error> for QueryError {
    fn from(e: bincode::Error) -> Self {
        QueryError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
