//! KDL configuration parsing for GuessWho infrastructure synthesis.
//!
//! This crate handles:
//! - Application configuration (guesswho.kdl)
//! - Defaults from environment variables
//! - `${env.NAME}` interpolation

pub mod app;
pub mod error;
pub mod variables;

pub use app::{
    AppConfig, BuildConfig, DEFAULT_BUILD_IMAGE, DEFAULT_STACK_ID, load_app_config,
    parse_app_config,
};
pub use error::{ConfigError, ConfigResult};
pub use variables::{VariableContext, VariableContextBuilder};
