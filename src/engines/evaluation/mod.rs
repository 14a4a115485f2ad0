pub mod individual;
pub mod node;
pub mod solver;

pub use individual::{Evaluator, Individual, IndividualSnapshot, Prediction};
pub use node::{EvalContext, Node, NodeKind, NodeState};
pub use solver::WeightSolver;
