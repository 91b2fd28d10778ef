//! Synthesized assembly: every environment unit plus the delivery pipeline.

use guesswho_config::AppConfig;
use guesswho_core::pipeline::Pipeline;
use guesswho_core::provisioner::ResourceDescriptor;
use guesswho_core::{EnvironmentMap, Error, Result, StackContext};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::environment_unit::{EnvironmentUnit, build_environment_units};
use crate::pipeline::build_pipeline;

/// Output of one synthesis pass. Identical inputs yield identical assemblies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub stack: StackContext,
    pub environments: EnvironmentMap<EnvironmentUnit>,
    pub pipeline: Pipeline,
}

impl Assembly {
    /// Descriptors in provisioning order: per environment compute unit,
    /// tables, API; then the pipeline.
    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        let mut resources = Vec::new();
        for (_, unit) in self.environments.iter() {
            resources.push(ResourceDescriptor::ComputeUnit(unit.compute_unit.clone()));
            resources.extend(unit.tables.iter().cloned().map(ResourceDescriptor::Table));
            resources.push(ResourceDescriptor::Api(unit.api.clone()));
        }
        resources.push(ResourceDescriptor::Pipeline(self.pipeline.clone()));
        resources
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Internal(format!("failed to serialize assembly: {e}")))
    }

    /// Hex SHA-256 of the serialized assembly. Secrets serialize redacted,
    /// so rotating the source token does not change the fingerprint.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|e| Error::Internal(format!("failed to serialize assembly: {e}")))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}

/// Run one synthesis pass over `config`.
pub fn synthesize(config: &AppConfig) -> Result<Assembly> {
    config.github.validate()?;
    config.build.recipe.validate()?;

    let environments = build_environment_units(&config.stack)?;
    let targets = environments.map(|_, unit| unit.handle());
    let pipeline = build_pipeline(config, &targets)?;

    let assembly = Assembly {
        stack: config.stack.clone(),
        environments,
        pipeline,
    };

    info!(
        stack = %assembly.stack.stack_id,
        resources = assembly.resources().len(),
        "Synthesized assembly"
    );
    Ok(assembly)
}
