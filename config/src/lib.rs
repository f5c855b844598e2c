//! Configuration model and loading for the change consolidator.

mod environment;
mod load;
pub mod shared;

pub use environment::{Environment, UnknownEnvironment};
pub use load::{LoadConfigError, load_config, load_config_from};
