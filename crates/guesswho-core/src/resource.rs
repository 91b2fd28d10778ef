//! Resource constructs: storage tables, compute units and grants.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::naming::{DeploymentTarget, ResourceName, StackContext};
use crate::{Environment, Error, ResourceId, Result};

/// Runtime variable that always carries the environment name.
pub const ENVIRONMENT_VARIABLE: &str = "ENVIRONMENT";

/// Key type of a table attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Number,
    Binary,
}

/// A named, typed key attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

impl Attribute {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: AttributeType::String,
        }
    }
}

/// Secondary index on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecondaryIndex {
    /// Shares the table's partition key, alternate sort key.
    Local { name: String, sort_key: Attribute },
    /// Own partition key and optional sort key.
    Global {
        name: String,
        partition_key: Attribute,
        sort_key: Option<Attribute>,
    },
}

impl SecondaryIndex {
    pub fn name(&self) -> &str {
        match self {
            SecondaryIndex::Local { name, .. } | SecondaryIndex::Global { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    OnDemand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Data and capacity go away with the environment.
    Destroy,
}

/// What a caller asks for when creating a table.
#[derive(Debug, Clone, Default)]
pub struct TableSpec {
    pub logical_name: String,
    pub partition_key: Option<Attribute>,
    pub sort_key: Option<Attribute>,
    pub indexes: Vec<SecondaryIndex>,
}

impl TableSpec {
    pub fn new(logical_name: impl Into<String>, partition_key: Attribute) -> Self {
        Self {
            logical_name: logical_name.into(),
            partition_key: Some(partition_key),
            ..Default::default()
        }
    }

    pub fn with_sort_key(mut self, sort_key: Attribute) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    pub fn with_index(mut self, index: SecondaryIndex) -> Self {
        self.indexes.push(index);
        self
    }
}

/// A storage table owned by one environment unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub id: ResourceId,
    pub logical_name: String,
    pub name: ResourceName,
    pub environment: Environment,
    pub partition_key: Attribute,
    pub sort_key: Option<Attribute>,
    pub indexes: Vec<SecondaryIndex>,
    pub billing: BillingMode,
    pub removal_policy: RemovalPolicy,
}

impl TableDescriptor {
    /// Runtime variable a granted compute unit receives for this table.
    pub fn env_key(&self) -> String {
        format!("{}_TABLE", self.logical_name.to_uppercase())
    }
}

/// Create a table descriptor in `env`.
pub fn create_table(
    ctx: &StackContext,
    env: Environment,
    spec: TableSpec,
) -> Result<TableDescriptor> {
    if spec.logical_name.trim().is_empty() {
        return Err(Error::MissingField("table name".to_string()));
    }

    let partition_key = spec
        .partition_key
        .filter(|key| !key.name.is_empty())
        .ok_or_else(|| {
            Error::MissingField(format!("partition key for table '{}'", spec.logical_name))
        })?;

    let mut index_names = BTreeSet::new();
    for index in &spec.indexes {
        if index.name().is_empty() {
            return Err(Error::MissingField(format!(
                "index name on table '{}'",
                spec.logical_name
            )));
        }
        if !index_names.insert(index.name()) {
            return Err(Error::Conflict(format!(
                "duplicate index '{}' on table '{}'",
                index.name(),
                spec.logical_name
            )));
        }
    }

    let name = ctx.derive_name(&spec.logical_name, env)?;

    Ok(TableDescriptor {
        id: ResourceId::derive(name.as_str()),
        logical_name: spec.logical_name,
        name,
        environment: env,
        partition_key,
        sort_key: spec.sort_key,
        indexes: spec.indexes,
        billing: BillingMode::OnDemand,
        removal_policy: RemovalPolicy::Destroy,
    })
}

/// What a caller asks for when creating a compute unit.
#[derive(Debug, Clone, Default)]
pub struct ComputeUnitSpec {
    pub logical_name: String,
    /// Extra runtime variables, merged under the environment-derived ones.
    pub env: BTreeMap<String, String>,
}

impl ComputeUnitSpec {
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A deployable compute unit (function).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeUnitDescriptor {
    pub id: ResourceId,
    pub logical_name: String,
    pub name: ResourceName,
    pub environment: Environment,
    pub runtime: String,
    pub handler: String,
    /// Code used for the first deployment, before the pipeline ships a build.
    pub code_asset: String,
    pub env: BTreeMap<String, String>,
}

impl ComputeUnitDescriptor {
    /// Read-only handle for grants and deploy actions.
    pub fn handle(&self) -> ComputeUnitHandle {
        ComputeUnitHandle {
            id: self.id,
            name: self.name.clone(),
            environment: self.environment,
        }
    }

    /// Set a runtime variable; an existing key is overwritten.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }
}

/// Create a compute unit descriptor in `env`.
pub fn create_compute_unit(
    ctx: &StackContext,
    env: Environment,
    spec: ComputeUnitSpec,
) -> Result<ComputeUnitDescriptor> {
    if spec.logical_name.trim().is_empty() {
        return Err(Error::MissingField("compute unit name".to_string()));
    }

    let name = ctx.derive_name(&spec.logical_name, env)?;

    let mut vars = spec.env;
    vars.insert(ENVIRONMENT_VARIABLE.to_string(), env.name().to_string());

    Ok(ComputeUnitDescriptor {
        id: ResourceId::derive(name.as_str()),
        logical_name: spec.logical_name,
        name,
        environment: env,
        runtime: "provided.al2023".to_string(),
        handler: "bootstrap".to_string(),
        code_asset: "base-lambda/build".to_string(),
        env: vars,
    })
}

/// Opaque reference to a compute unit, safe to hand to other components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComputeUnitHandle {
    pub id: ResourceId,
    pub name: ResourceName,
    pub environment: Environment,
}

impl ComputeUnitHandle {
    /// Provider identity reference used in permission statements.
    pub fn arn(&self, target: &DeploymentTarget) -> String {
        format!(
            "arn:aws:lambda:{}:{}:function:{}",
            target.region, target.account, self.name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ReadWrite,
}

/// Capability edge from a compute unit to a table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrantEdge {
    pub table: ResourceId,
    pub table_name: ResourceName,
    pub unit: ResourceId,
    pub unit_name: ResourceName,
    pub capability: Capability,
    /// Runtime variable injected into the unit, valued with `table_name`.
    pub env_key: String,
}

/// Grant `unit` read-write access to `table` and expose the table's name in
/// the unit's runtime variables. Granting the same pair again yields the same
/// edge and leaves a single variable; a different table behind the same
/// variable is a conflict.
pub fn grant(table: &TableDescriptor, unit: &mut ComputeUnitDescriptor) -> Result<GrantEdge> {
    if table.environment != unit.environment {
        return Err(Error::InvalidInput(format!(
            "cannot grant {} table '{}' to {} unit '{}'",
            table.environment, table.name, unit.environment, unit.name
        )));
    }

    let env_key = table.env_key();
    if let Some(existing) = unit
        .env
        .get(&env_key)
        .filter(|value| value.as_str() != table.name.as_str())
    {
        return Err(Error::Conflict(format!(
            "unit '{}' already maps {} to '{}', cannot remap it to '{}'",
            unit.name, env_key, existing, table.name
        )));
    }
    unit.set_env(env_key.clone(), table.name.as_str());

    Ok(GrantEdge {
        table: table.id,
        table_name: table.name.clone(),
        unit: unit.id,
        unit_name: unit.name.clone(),
        capability: Capability::ReadWrite,
        env_key,
    })
}
