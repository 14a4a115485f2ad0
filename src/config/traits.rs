use crate::error::EvoDagError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn validate(&self) -> Result<(), EvoDagError>;
}
