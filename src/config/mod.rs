pub mod traits;
pub mod solver;
pub mod evaluation;
pub mod manager;

pub use manager::{ConfigManager, AppConfig};
pub use solver::SolverConfig;
pub use evaluation::EvaluationConfig;
pub use traits::ConfigSection;
