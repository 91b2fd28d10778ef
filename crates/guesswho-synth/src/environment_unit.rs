//! Environment unit composition.
//!
//! Each environment gets one compute unit, the game tables, and an API front
//! door, with every table granted read-write to the compute unit.

use guesswho_core::api::{ApiDescriptor, HttpMethod, create_api};
use guesswho_core::resource::{
    Attribute, ComputeUnitDescriptor, ComputeUnitHandle, ComputeUnitSpec, GrantEdge,
    TableDescriptor, TableSpec, create_compute_unit, create_table, grant,
};
use guesswho_core::{Environment, EnvironmentMap, Result, StackContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Logical name of the environment's compute unit.
pub const COMPUTE_UNIT_NAME: &str = "Game";

/// Logical name of the environment's API front door.
pub const API_NAME: &str = "ApiGateway";

/// Path of the health endpoint.
pub const HEALTH_PATH: &str = "health";

/// Tables every environment owns.
pub fn table_specs() -> Vec<TableSpec> {
    vec![
        TableSpec::new("Users", Attribute::string("id")),
        TableSpec::new("Games", Attribute::string("id")),
        TableSpec::new("Players", Attribute::string("gameId"))
            .with_sort_key(Attribute::string("id")),
    ]
}

/// Everything deployed into one environment. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentUnit {
    pub environment: Environment,
    pub compute_unit: ComputeUnitDescriptor,
    pub tables: Vec<TableDescriptor>,
    pub api: ApiDescriptor,
    pub grants: BTreeSet<GrantEdge>,
}

impl EnvironmentUnit {
    /// Read-only handle to the compute unit, for deploy actions.
    pub fn handle(&self) -> ComputeUnitHandle {
        self.compute_unit.handle()
    }

    pub fn table(&self, logical_name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.logical_name == logical_name)
    }
}

/// Compose the environment unit for `env`.
pub fn build_environment_unit(ctx: &StackContext, env: Environment) -> Result<EnvironmentUnit> {
    let mut compute_unit = create_compute_unit(ctx, env, ComputeUnitSpec::new(COMPUTE_UNIT_NAME))?;

    let tables = table_specs()
        .into_iter()
        .map(|spec| create_table(ctx, env, spec))
        .collect::<Result<Vec<_>>>()?;

    let mut grants = BTreeSet::new();
    for table in &tables {
        let edge = grant(table, &mut compute_unit)?;
        debug!(environment = %env, table = %edge.table_name, key = %edge.env_key, "Granted table");
        grants.insert(edge);
    }

    let handle = compute_unit.handle();
    let mut api = create_api(ctx, env, API_NAME)?;
    for method in [HttpMethod::Get, HttpMethod::Post] {
        api.add_method(HEALTH_PATH, method, &handle)?;
    }

    info!(
        environment = %env,
        compute_unit = %compute_unit.name,
        tables = tables.len(),
        api = %api.name,
        "Composed environment unit"
    );

    Ok(EnvironmentUnit {
        environment: env,
        compute_unit,
        tables,
        api,
        grants,
    })
}

/// Compose one unit per environment, stopping at the first error.
pub fn build_environment_units(ctx: &StackContext) -> Result<EnvironmentMap<EnvironmentUnit>> {
    EnvironmentMap::try_from_fn(|env| build_environment_unit(ctx, env))
}
