use crate::types::Function;
use thiserror::Error;

/// Reasons the least-squares weight fit can be rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("no regressors supplied")]
    NoRegressors,

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Gram matrix or target projection contains a non-finite entry")]
    NonFinite,

    #[error("Gram matrix is singular")]
    Singular,
}

/// Outcome of a failed node evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("node {position}: weight solve failed: {source}")]
    WeightSolve {
        position: usize,
        #[source]
        source: SolveError,
    },

    #[error("node {position}: child {child} has no evaluated output")]
    ChildFailed { position: usize, child: usize },

    #[error("node {position}: evaluation already failed")]
    PreviouslyFailed { position: usize },

    #[error("node {position}: input {reference} does not exist")]
    MissingInput { position: usize, reference: usize },

    #[error("node {position}: {function} cannot take {nargs} children")]
    Arity {
        position: usize,
        function: Function,
        nargs: usize,
    },

    #[error("node {position}: weight shape mismatch: expected {expected}, got {actual}")]
    WeightShape {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("node {position}: output contains non-finite values")]
    NonFiniteOutput { position: usize },
}

impl EvalError {
    pub fn position(&self) -> usize {
        match self {
            EvalError::WeightSolve { position, .. }
            | EvalError::ChildFailed { position, .. }
            | EvalError::PreviouslyFailed { position }
            | EvalError::MissingInput { position, .. }
            | EvalError::Arity { position, .. }
            | EvalError::WeightShape { position, .. }
            | EvalError::NonFiniteOutput { position } => *position,
        }
    }
}

#[derive(Error, Debug)]
pub enum EvoDagError {
    #[error("Invalid arena: {0}")]
    InvalidArena(String),

    #[error("Invalid weight: {0}")]
    InvalidWeight(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EvoDagError>;
