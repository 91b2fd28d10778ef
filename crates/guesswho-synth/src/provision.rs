//! Walk an assembly through a provisioner.

use async_trait::async_trait;
use guesswho_core::provisioner::{Provisioner, ResourceDescriptor, ResourceKind};
use guesswho_core::resource::{ComputeUnitHandle, GrantEdge};
use guesswho_core::{Error, ResourceName, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::Assembly;

/// Counts of what a provisioning walk applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub resources: usize,
    pub grants: usize,
    pub variables: usize,
}

/// Provision every resource of `assembly`, stopping at the first error.
///
/// Per environment: compute unit, tables, grants (each followed by the
/// matching runtime variable), then the API. The pipeline goes last, after a
/// final structural validation.
pub async fn provision_assembly(
    assembly: &Assembly,
    provisioner: &dyn Provisioner,
) -> Result<ProvisionReport> {
    let mut report = ProvisionReport::default();

    for (env, unit) in assembly.environments.iter() {
        debug!(environment = %env, provisioner = provisioner.name(), "Provisioning environment");

        provisioner
            .provision(&ResourceDescriptor::ComputeUnit(unit.compute_unit.clone()))
            .await?;
        report.resources += 1;

        for table in &unit.tables {
            provisioner
                .provision(&ResourceDescriptor::Table(table.clone()))
                .await?;
            report.resources += 1;
        }

        let handle = unit.handle();
        for edge in &unit.grants {
            provisioner.grant(edge).await?;
            report.grants += 1;

            provisioner
                .set_environment_variable(&handle, &edge.env_key, edge.table_name.as_str())
                .await?;
            report.variables += 1;
        }

        provisioner
            .provision(&ResourceDescriptor::Api(unit.api.clone()))
            .await?;
        report.resources += 1;
    }

    assembly.pipeline.validate()?;
    provisioner
        .provision(&ResourceDescriptor::Pipeline(assembly.pipeline.clone()))
        .await?;
    report.resources += 1;

    info!(
        provisioner = provisioner.name(),
        resources = report.resources,
        grants = report.grants,
        variables = report.variables,
        "Provisioned assembly"
    );
    Ok(report)
}

/// One call received by [`DryRunProvisioner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    Provision {
        kind: ResourceKind,
        name: ResourceName,
    },
    Grant {
        table: ResourceName,
        unit: ResourceName,
    },
    SetVariable {
        unit: ResourceName,
        key: String,
        value: String,
    },
}

impl fmt::Display for ProvisionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionCall::Provision { kind, name } => write!(f, "provision {kind} {name}"),
            ProvisionCall::Grant { table, unit } => write!(f, "grant read_write {table} -> {unit}"),
            ProvisionCall::SetVariable { unit, key, value } => {
                write!(f, "set {unit} {key}={value}")
            }
        }
    }
}

/// Provisioner that records calls instead of touching a provider.
#[derive(Debug, Default)]
pub struct DryRunProvisioner {
    calls: Mutex<Vec<ProvisionCall>>,
    fail_on: Option<ResourceKind>,
}

impl DryRunProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `provision` call for resources of `kind`.
    pub fn failing_on(kind: ResourceKind) -> Self {
        Self {
            calls: Mutex::default(),
            fail_on: Some(kind),
        }
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Result<Vec<ProvisionCall>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .map_err(|e| Error::Internal(format!("provision log poisoned: {e}")))
    }

    fn record(&self, call: ProvisionCall) -> Result<()> {
        info!(call = %call, "Dry run");
        self.calls
            .lock()
            .map_err(|e| Error::Internal(format!("provision log poisoned: {e}")))?
            .push(call);
        Ok(())
    }
}

#[async_trait]
impl Provisioner for DryRunProvisioner {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn provision(&self, resource: &ResourceDescriptor) -> Result<()> {
        if self.fail_on == Some(resource.kind()) {
            return Err(Error::ExecutionFailed(format!(
                "refusing to provision {} '{}'",
                resource.kind(),
                resource.name()
            )));
        }
        self.record(ProvisionCall::Provision {
            kind: resource.kind(),
            name: resource.name().clone(),
        })
    }

    async fn grant(&self, edge: &GrantEdge) -> Result<()> {
        self.record(ProvisionCall::Grant {
            table: edge.table_name.clone(),
            unit: edge.unit_name.clone(),
        })
    }

    async fn set_environment_variable(
        &self,
        unit: &ComputeUnitHandle,
        key: &str,
        value: &str,
    ) -> Result<()> {
        self.record(ProvisionCall::SetVariable {
            unit: unit.name.clone(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}
