pub mod features;
pub mod signal;

pub use features::{convert_dataframe, convert_features, Dataset, Input};
pub use signal::Signal;
