//! API front door bound to a compute unit.

use serde::{Deserialize, Serialize};

use crate::naming::{ResourceName, StackContext};
use crate::resource::ComputeUnitHandle;
use crate::{Environment, Error, ResourceId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Any,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Any => write!(f, "ANY"),
        }
    }
}

/// A method on a resource path, integrated with a compute unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMethod {
    pub method: HttpMethod,
    pub integration: ComputeUnitHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResource {
    pub path: String,
    pub methods: Vec<ApiMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub id: ResourceId,
    pub name: ResourceName,
    pub environment: Environment,
    /// Deployment stage name; matches the environment name.
    pub deploy_stage: String,
    pub resources: Vec<ApiResource>,
}

impl ApiDescriptor {
    /// Bind `method` on `path` to `unit`. Rebinding the same method on the
    /// same path replaces the previous integration.
    pub fn add_method(
        &mut self,
        path: &str,
        method: HttpMethod,
        unit: &ComputeUnitHandle,
    ) -> Result<()> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Err(Error::MissingField("api resource path".to_string()));
        }
        if unit.environment != self.environment {
            return Err(Error::InvalidInput(format!(
                "api '{}' cannot integrate {} unit '{}'",
                self.name, unit.environment, unit.name
            )));
        }

        let index = match self.resources.iter().position(|r| r.path == path) {
            Some(index) => index,
            None => {
                self.resources.push(ApiResource {
                    path: path.to_string(),
                    methods: Vec::new(),
                });
                self.resources.len() - 1
            }
        };
        let resource = &mut self.resources[index];

        let binding = ApiMethod {
            method,
            integration: unit.clone(),
        };
        match resource.methods.iter_mut().find(|m| m.method == method) {
            Some(existing) => *existing = binding,
            None => resource.methods.push(binding),
        }

        Ok(())
    }

    pub fn resource(&self, path: &str) -> Option<&ApiResource> {
        let path = path.trim_matches('/');
        self.resources.iter().find(|r| r.path == path)
    }
}

/// Create an empty API front door in `env`.
pub fn create_api(
    ctx: &StackContext,
    env: Environment,
    logical_name: &str,
) -> Result<ApiDescriptor> {
    if logical_name.trim().is_empty() {
        return Err(Error::MissingField("api name".to_string()));
    }

    let name = ctx.derive_name(logical_name, env)?;

    Ok(ApiDescriptor {
        id: ResourceId::derive(name.as_str()),
        name,
        environment: env,
        deploy_stage: env.name().to_string(),
        resources: Vec::new(),
    })
}
