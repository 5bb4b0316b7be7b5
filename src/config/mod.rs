pub mod loader;
pub mod models;
pub mod resolver;
pub mod validation;

pub use loader::{load_config, load_config_sync};
pub use models::*;
pub use resolver::{BaseToggles, ConfigPaths, ConfigRoot, ConfigSection, ConfigValue};
pub use validation::{AppConfigValidator, ValidationError, ValidationResult};
