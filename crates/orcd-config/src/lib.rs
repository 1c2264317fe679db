mod raw;
mod loader;
pub mod error;

pub use loader::{load_specs, load_specs_str};
pub use error::ConfigError;
