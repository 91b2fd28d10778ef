//! Variable interpolation for configuration values.
//!
//! Supports `${env.VAR_NAME}`, resolved against the process environment or
//! values handed to [`VariableContextBuilder`].

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::{ConfigError, ConfigResult};

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Environment variables
    pub env: HashMap<String, String>,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    /// Create a new empty variable context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context holding the current process environment.
    pub fn from_process_env() -> Self {
        let mut ctx = Self::new();
        ctx.populate_env();
        ctx
    }

    /// Populate environment variables from the current process environment.
    pub fn populate_env(&mut self) {
        for (key, value) in std::env::vars() {
            self.env.insert(key, value);
        }
    }

    /// Look up an environment variable, treating empty values as unset.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env
            .get(name)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["env", name] => self.env.get(*name).cloned(),
            _ => None,
        }
    }

    /// Interpolate all variables in a string. Unknown variables are kept verbatim.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate a required value; any variable that cannot be resolved is an error.
    pub fn interpolate_required(&self, field: &str, input: &str) -> ConfigResult<String> {
        if let Some(caps) = VAR_REGEX
            .captures_iter(input)
            .find(|caps| self.resolve(&caps[1]).is_none())
        {
            return Err(ConfigError::UnresolvedVariable {
                field: field.to_string(),
                variable: caps[1].to_string(),
            });
        }
        Ok(self.interpolate(input))
    }
}

/// Builder for creating VariableContext.
pub struct VariableContextBuilder {
    ctx: VariableContext,
}

impl VariableContextBuilder {
    pub fn new() -> Self {
        Self {
            ctx: VariableContext::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.env.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> VariableContext {
        self.ctx
    }
}

impl Default for VariableContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_variables() {
        let ctx = VariableContextBuilder::new()
            .with_env("GITHUB_OWNER", "octo")
            .with_env("GITHUB_REPO", "guess-who")
            .build();

        let result = ctx.interpolate("${env.GITHUB_OWNER}/${env.GITHUB_REPO}");
        assert_eq!(result, "octo/guess-who");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let ctx = VariableContext::new();
        let result = ctx.interpolate("Unknown: ${env.MISSING}");
        assert_eq!(result, "Unknown: ${env.MISSING}");
    }

    #[test]
    fn test_required_unresolved_is_error() {
        let ctx = VariableContext::new();
        let err = ctx
            .interpolate_required("github token", "${env.GITHUB_TOKEN}")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnresolvedVariable { ref variable, .. } if variable == "env.GITHUB_TOKEN"
        ));
    }

    #[test]
    fn test_bare_variable_is_unresolved() {
        let ctx = VariableContextBuilder::new()
            .with_env("branch", "main")
            .build();

        assert_eq!(ctx.interpolate("${branch}"), "${branch}");
        assert!(ctx.interpolate_required("branch", "${branch}").is_err());
    }

    #[test]
    fn test_empty_env_treated_as_unset() {
        let ctx = VariableContextBuilder::new()
            .with_env("GITHUB_BRANCH", "")
            .build();
        assert_eq!(ctx.env_var("GITHUB_BRANCH"), None);
    }
}
