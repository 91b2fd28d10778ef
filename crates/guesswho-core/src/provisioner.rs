//! Provisioner trait and resource descriptors.
//!
//! Provisioners turn synthesized descriptors into real infrastructure. This
//! crate never calls a provider; backends implement [`Provisioner`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::api::ApiDescriptor;
use crate::naming::ResourceName;
use crate::pipeline::Pipeline;
use crate::resource::{ComputeUnitDescriptor, ComputeUnitHandle, GrantEdge, TableDescriptor};

/// Anything a provisioner can create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDescriptor {
    Table(TableDescriptor),
    ComputeUnit(ComputeUnitDescriptor),
    Api(ApiDescriptor),
    Pipeline(Pipeline),
}

/// Kind of a [`ResourceDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    ComputeUnit,
    Api,
    Pipeline,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Table => write!(f, "table"),
            ResourceKind::ComputeUnit => write!(f, "compute_unit"),
            ResourceKind::Api => write!(f, "api"),
            ResourceKind::Pipeline => write!(f, "pipeline"),
        }
    }
}

impl ResourceDescriptor {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceDescriptor::Table(_) => ResourceKind::Table,
            ResourceDescriptor::ComputeUnit(_) => ResourceKind::ComputeUnit,
            ResourceDescriptor::Api(_) => ResourceKind::Api,
            ResourceDescriptor::Pipeline(_) => ResourceKind::Pipeline,
        }
    }

    pub fn name(&self) -> &ResourceName {
        match self {
            ResourceDescriptor::Table(t) => &t.name,
            ResourceDescriptor::ComputeUnit(u) => &u.name,
            ResourceDescriptor::Api(a) => &a.name,
            ResourceDescriptor::Pipeline(p) => &p.name,
        }
    }
}

/// Trait for provisioning backends.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Name of this provisioner.
    fn name(&self) -> &'static str;

    /// Create or update a resource. Identical descriptors must be a no-op.
    async fn provision(&self, resource: &ResourceDescriptor) -> Result<()>;

    /// Wire a capability grant (permissions only).
    async fn grant(&self, edge: &GrantEdge) -> Result<()>;

    /// Set a runtime variable on a deployed compute unit.
    async fn set_environment_variable(
        &self,
        unit: &ComputeUnitHandle,
        key: &str,
        value: &str,
    ) -> Result<()>;
}
