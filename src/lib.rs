//! Evaluation core of a DAG-based genetic-programming engine.
//!
//! A candidate program is an [`Individual`]: an arena of [`Node`]s where each
//! function node reads from earlier slots. Evaluating it walks the arena once,
//! fitting every unweighted node by least squares against the training target.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod types;

pub use crate::config::{AppConfig, ConfigManager};
pub use data::{Dataset, Input, Signal};
pub use engines::evaluation::{
    Evaluator, Individual, IndividualSnapshot, Node, NodeKind, NodeState, Prediction, WeightSolver,
};
pub use error::{EvalError, EvoDagError, Result, SolveError};
pub use types::{Function, Weight, WeightShape};
