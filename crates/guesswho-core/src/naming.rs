//! Resource naming policy.
//!
//! Physical names are `stack_id + "__" + logical_name + suffix`. The order is
//! fixed so that re-synthesis with the same inputs produces the same names
//! and the provisioning backend sees no change.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Environment, Error, Result};

/// Separator between the stack identifier and the logical name.
pub const NAME_SEPARATOR: &str = "__";

/// A derived physical resource name.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(transparent)]
#[display("{_0}")]
pub struct ResourceName(String);

impl ResourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Account and region the stack is provisioned into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    pub account: String,
    pub region: String,
}

/// Naming context passed to every constructor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackContext {
    /// Scopes every physical name to one logical deployment.
    pub stack_id: String,
    pub target: DeploymentTarget,
}

impl StackContext {
    pub fn new(stack_id: impl Into<String>, target: DeploymentTarget) -> Result<Self> {
        let stack_id = stack_id.into();
        if stack_id.trim().is_empty() {
            return Err(Error::MissingField("stack identifier".to_string()));
        }
        Ok(Self { stack_id, target })
    }

    /// Environment-scoped name for a logical resource.
    pub fn derive_name(&self, logical_name: &str, env: Environment) -> Result<ResourceName> {
        derive_name(&self.stack_id, logical_name, env)
    }

    /// Stack-scoped name for a resource that exists once per stack.
    pub fn stack_resource_name(&self, name: &str) -> Result<ResourceName> {
        stack_resource_name(&self.stack_id, name)
    }
}

/// Derive the physical name of `logical_name` in `env`.
pub fn derive_name(stack_id: &str, logical_name: &str, env: Environment) -> Result<ResourceName> {
    if logical_name.trim().is_empty() {
        return Err(Error::MissingField("logical resource name".to_string()));
    }

    Ok(ResourceName(format!(
        "{stack_id}{NAME_SEPARATOR}{logical_name}{}",
        env.name_suffix()
    )))
}

/// Name for a pipeline-level resource (`stack_id + name`, no environment).
pub fn stack_resource_name(stack_id: &str, name: &str) -> Result<ResourceName> {
    if name.trim().is_empty() {
        return Err(Error::MissingField("stack resource name".to_string()));
    }

    Ok(ResourceName(format!("{stack_id}{name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_derive_name_layout() {
        let name = derive_name("GuessWho", "Users", Environment::Development).unwrap();
        assert_eq!(name.as_str(), "GuessWho__UsersDevelopment");

        let name = derive_name("GuessWho", "Users", Environment::Production).unwrap();
        assert_eq!(name.as_str(), "GuessWho__UsersProduction");
    }

    #[test]
    fn test_empty_logical_name_is_rejected() {
        let err = derive_name("GuessWho", "", Environment::Development).unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));

        let err = derive_name("GuessWho", "   ", Environment::Production).unwrap_err();
        assert!(matches!(err, Error::MissingField(_)));
    }

    #[test]
    fn test_stack_resource_name() {
        assert_eq!(
            stack_resource_name("GuessWho", "Pipeline").unwrap().as_str(),
            "GuessWhoPipeline"
        );
        assert!(stack_resource_name("GuessWho", "").is_err());
    }

    #[test]
    fn test_context_requires_stack_id() {
        let target = DeploymentTarget {
            account: "123456789012".to_string(),
            region: "us-east-1".to_string(),
        };
        assert!(StackContext::new("", target.clone()).is_err());

        let ctx = StackContext::new("GuessWho", target).unwrap();
        assert_eq!(
            ctx.derive_name("Games", Environment::Production)
                .unwrap()
                .as_str(),
            "GuessWho__GamesProduction"
        );
    }

    fn environment() -> impl Strategy<Value = Environment> {
        prop_oneof![Just(Environment::Development), Just(Environment::Production)]
    }

    proptest! {
        #[test]
        fn prop_name_contains_parts_and_is_pure(
            stack in "[A-Za-z][A-Za-z0-9]{0,12}",
            logical in "[A-Za-z][A-Za-z0-9_]{0,16}",
            env in environment(),
        ) {
            let first = derive_name(&stack, &logical, env).unwrap();
            let second = derive_name(&stack, &logical, env).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert!(first.as_str().contains(&logical));
            prop_assert!(first.as_str().ends_with(env.name_suffix()));
        }

        #[test]
        fn prop_environments_never_collide(
            stack in "[A-Za-z][A-Za-z0-9]{0,12}",
            logical in "[A-Za-z][A-Za-z0-9_]{0,16}",
        ) {
            let dev = derive_name(&stack, &logical, Environment::Development).unwrap();
            let prod = derive_name(&stack, &logical, Environment::Production).unwrap();
            prop_assert_ne!(dev, prod);
        }
    }
}
