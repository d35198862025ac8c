pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{CONFIG_FILENAME, LoadedConfig, load_config, save_config};
pub use models::*;
pub use validation::{GatewayConfigValidator, ValidationError, ValidationResult};
