mod types;

pub use types::{ControllerConfig, FeaturesConfig, ReconcileConfig};
