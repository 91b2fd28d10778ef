//! CLI command implementations.

pub mod plan;
pub mod run;
pub mod synth;

use anyhow::{Context, Result};
use guesswho_config::{AppConfig, VariableContext, load_app_config};
use guesswho_synth::{Assembly, synthesize};
use std::path::Path;

/// Load the configuration from `path`, or from the environment when absent.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_app_config(path, &VariableContext::from_process_env())
            .with_context(|| format!("Failed to load config file: {}", path.display())),
        None => AppConfig::from_env().context("Failed to read configuration from environment"),
    }
}

/// Load the configuration and run one synthesis pass.
pub fn load_assembly(path: Option<&Path>) -> Result<Assembly> {
    let config = load_config(path)?;
    synthesize(&config).context("Synthesis failed")
}

pub fn validate(path: Option<&Path>) -> Result<()> {
    let assembly = load_assembly(path)?;
    println!("Configuration is valid");
    println!("Stack: {}", assembly.stack.stack_id);
    println!("Stages: {}", assembly.pipeline.stage_names().join(" -> "));
    Ok(())
}
