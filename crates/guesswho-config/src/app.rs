//! Application configuration parsing.

use guesswho_core::SecretValue;
use guesswho_core::naming::{DeploymentTarget, StackContext};
use guesswho_core::pipeline::{BuildPhase, BuildRecipe, BuildStep, GithubConfig};
use kdl::{KdlDocument, KdlNode};
use std::path::Path;
use tracing::debug;

use crate::{ConfigError, ConfigResult, VariableContext};

/// Stack identifier used when none is configured.
pub const DEFAULT_STACK_ID: &str = "GuessWho";

/// Build image used when none is configured.
pub const DEFAULT_BUILD_IMAGE: &str = "aws/codebuild/standard:5.0";

const DEFAULT_BRANCH: &str = "main";

/// Build stage configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub image: String,
    pub recipe: BuildRecipe,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_BUILD_IMAGE.to_string(),
            recipe: BuildRecipe::go_lambda(),
        }
    }
}

/// Everything synthesis needs, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub stack: StackContext,
    pub github: GithubConfig,
    pub build: BuildConfig,
}

impl AppConfig {
    /// Build the configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_vars(&VariableContext::from_process_env())
    }

    /// Build the configuration from environment variables held in `vars`.
    ///
    /// Reads `GUESSWHO_STACK`, `AWS_CDK_DEFAULT_ACCOUNT`,
    /// `AWS_CDK_DEFAULT_REGION`, `GITHUB_OWNER`, `GITHUB_REPO`,
    /// `GITHUB_BRANCH` and `GITHUB_TOKEN`.
    pub fn from_vars(vars: &VariableContext) -> ConfigResult<Self> {
        let required = |key: &str| {
            vars.env_var(key)
                .map(str::to_string)
                .ok_or_else(|| ConfigError::MissingField(key.to_string()))
        };

        let stack_id = vars.env_var("GUESSWHO_STACK").unwrap_or(DEFAULT_STACK_ID);
        let target = DeploymentTarget {
            account: required("AWS_CDK_DEFAULT_ACCOUNT")?,
            region: required("AWS_CDK_DEFAULT_REGION")?,
        };
        let github = GithubConfig {
            owner: required("GITHUB_OWNER")?,
            repo: required("GITHUB_REPO")?,
            branch: vars
                .env_var("GITHUB_BRANCH")
                .unwrap_or(DEFAULT_BRANCH)
                .to_string(),
            token: SecretValue::new(required("GITHUB_TOKEN")?),
        };

        let config = Self {
            stack: StackContext::new(stack_id, target)?,
            github,
            build: BuildConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-check every field synthesis relies on.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.stack.target.account.trim().is_empty() {
            return Err(ConfigError::MissingField("target account".to_string()));
        }
        if self.stack.target.region.trim().is_empty() {
            return Err(ConfigError::MissingField("target region".to_string()));
        }
        self.github.validate()?;
        if self.build.image.trim().is_empty() {
            return Err(ConfigError::MissingField("build image".to_string()));
        }
        self.build.recipe.validate()?;
        Ok(())
    }
}

/// Read and parse a configuration file.
pub fn load_app_config(path: impl AsRef<Path>, vars: &VariableContext) -> ConfigResult<AppConfig> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration");
    let content = std::fs::read_to_string(path)?;
    parse_app_config(&content, vars)
}

/// Parse an application configuration from KDL text.
pub fn parse_app_config(kdl: &str, vars: &VariableContext) -> ConfigResult<AppConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut stack_id: Option<String> = None;
    let mut target: Option<DeploymentTarget> = None;
    let mut github: Option<GithubConfig> = None;
    let mut build: Option<BuildConfig> = None;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => {
                ensure_unset(&stack_id, "stack")?;
                let raw = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("stack identifier".to_string()))?;
                stack_id = Some(vars.interpolate_required("stack", &raw)?);
            }
            "target" => {
                ensure_unset(&target, "target")?;
                target = Some(DeploymentTarget {
                    account: required_prop(node, "account", vars)?,
                    region: required_prop(node, "region", vars)?,
                });
            }
            "github" => {
                ensure_unset(&github, "github")?;
                let branch = match get_string_prop(node, "branch") {
                    Some(raw) => vars.interpolate_required("github branch", &raw)?,
                    None => DEFAULT_BRANCH.to_string(),
                };
                github = Some(GithubConfig {
                    owner: required_prop(node, "owner", vars)?,
                    repo: required_prop(node, "repo", vars)?,
                    branch,
                    token: SecretValue::new(required_prop(node, "token", vars)?),
                });
            }
            "build" => {
                ensure_unset(&build, "build")?;
                build = Some(parse_build(node, vars)?);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    let target = target.ok_or_else(|| ConfigError::MissingField("target".to_string()))?;
    let github = github.ok_or_else(|| ConfigError::MissingField("github".to_string()))?;
    let stack_id = stack_id.unwrap_or_else(|| DEFAULT_STACK_ID.to_string());

    let config = AppConfig {
        stack: StackContext::new(stack_id, target)?,
        github,
        build: build.unwrap_or_default(),
    };
    config.validate()?;
    Ok(config)
}

fn parse_build(node: &KdlNode, vars: &VariableContext) -> ConfigResult<BuildConfig> {
    let mut image = DEFAULT_BUILD_IMAGE.to_string();
    let mut steps = Vec::new();
    let mut artifact_files = Vec::new();

    if let Some(children) = node.children() {
        for child in children.nodes() {
            let name = child.name().value();
            let phase = match name {
                "image" => {
                    image = child_value(child, "build image", vars)?;
                    continue;
                }
                "artifact" => {
                    artifact_files.push(child_value(child, "build artifact", vars)?);
                    continue;
                }
                "resolve" => BuildPhase::Resolve,
                "test" => BuildPhase::Test,
                "compile" => BuildPhase::Compile,
                "permissions" => BuildPhase::Permissions,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "build".to_string(),
                        message: format!("unknown build step: {}", other),
                    });
                }
            };
            steps.push(BuildStep {
                phase,
                command: child_value(child, &format!("build {} command", phase), vars)?,
            });
        }
    }

    if steps.is_empty() && artifact_files.is_empty() {
        return Ok(BuildConfig {
            image,
            recipe: BuildRecipe::go_lambda(),
        });
    }

    Ok(BuildConfig {
        image,
        recipe: BuildRecipe {
            steps,
            artifact_files,
        },
    })
}

fn ensure_unset<T>(slot: &Option<T>, name: &str) -> ConfigResult<()> {
    if slot.is_some() {
        return Err(ConfigError::Duplicate(name.to_string()));
    }
    Ok(())
}

fn required_prop(node: &KdlNode, prop: &str, vars: &VariableContext) -> ConfigResult<String> {
    let field = format!("{} {}", node.name().value(), prop);
    let raw = get_string_prop(node, prop).ok_or_else(|| ConfigError::MissingField(field.clone()))?;
    let value = vars.interpolate_required(&field, &raw)?;
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field));
    }
    Ok(value)
}

fn child_value(node: &KdlNode, field: &str, vars: &VariableContext) -> ConfigResult<String> {
    let raw =
        get_first_string_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    vars.interpolate_required(field, &raw)
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VariableContextBuilder;

    fn vars() -> VariableContext {
        VariableContextBuilder::new()
            .with_env("AWS_CDK_DEFAULT_ACCOUNT", "123456789012")
            .with_env("AWS_CDK_DEFAULT_REGION", "us-east-1")
            .with_env("GITHUB_OWNER", "o")
            .with_env("GITHUB_REPO", "r")
            .with_env("GITHUB_TOKEN", "t")
            .build()
    }

    const FULL: &str = r#"
        stack "GuessWho"
        target account="${env.AWS_CDK_DEFAULT_ACCOUNT}" region="${env.AWS_CDK_DEFAULT_REGION}"
        github owner="${env.GITHUB_OWNER}" repo="${env.GITHUB_REPO}" branch="main" token="${env.GITHUB_TOKEN}"
        build {
            image "aws/codebuild/standard:7.0"
            resolve "go mod tidy"
            test "go test ./..."
            compile "GOOS=linux GOARCH=amd64 go build -o build/bootstrap"
            permissions "chmod +x build/bootstrap"
            artifact "build/bootstrap"
        }
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_app_config(FULL, &vars()).unwrap();

        assert_eq!(config.stack.stack_id, "GuessWho");
        assert_eq!(config.stack.target.region, "us-east-1");
        assert_eq!(config.github.owner, "o");
        assert_eq!(config.github.repo, "r");
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.github.token.expose(), "t");
        assert_eq!(config.build.image, "aws/codebuild/standard:7.0");
        assert_eq!(config.build.recipe, BuildRecipe::go_lambda());
    }

    #[test]
    fn test_defaults_when_optional_nodes_missing() {
        let kdl = r#"
            target account="1" region="eu-west-1"
            github owner="o" repo="r" token="t"
        "#;

        let config = parse_app_config(kdl, &VariableContext::new()).unwrap();
        assert_eq!(config.stack.stack_id, DEFAULT_STACK_ID);
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.build, BuildConfig::default());
    }

    #[test]
    fn test_missing_github_is_error() {
        let kdl = r#"target account="1" region="eu-west-1""#;
        let err = parse_app_config(kdl, &VariableContext::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "github"));
    }

    #[test]
    fn test_unresolved_token_is_error() {
        let kdl = r#"
            target account="1" region="eu-west-1"
            github owner="o" repo="r" token="${env.GITHUB_TOKEN}"
        "#;
        let err = parse_app_config(kdl, &VariableContext::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnresolvedVariable { .. }));
    }

    #[test]
    fn test_duplicate_stack_is_error() {
        let kdl = r#"
            stack "A"
            stack "B"
            target account="1" region="eu-west-1"
            github owner="o" repo="r" token="t"
        "#;
        let err = parse_app_config(kdl, &VariableContext::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Duplicate(_)));
    }

    #[test]
    fn test_build_compile_before_test_is_rejected() {
        let kdl = r#"
            target account="1" region="eu-west-1"
            github owner="o" repo="r" token="t"
            build {
                compile "go build -o build/bootstrap"
                test "go test ./..."
                artifact "build/bootstrap"
            }
        "#;
        let err = parse_app_config(kdl, &VariableContext::new()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Core(guesswho_core::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unknown_build_step_is_rejected() {
        let kdl = r#"
            target account="1" region="eu-west-1"
            github owner="o" repo="r" token="t"
            build {
                lint "golangci-lint run"
            }
        "#;
        let err = parse_app_config(kdl, &VariableContext::new()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_from_vars() {
        let config = AppConfig::from_vars(&vars()).unwrap();
        assert_eq!(config.stack.stack_id, "GuessWho");
        assert_eq!(config.github.branch, "main");
        assert_eq!(config.stack.target.account, "123456789012");
    }

    #[test]
    fn test_from_vars_requires_token() {
        let mut vars = vars();
        vars.env.remove("GITHUB_TOKEN");
        let err = AppConfig::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(ref f) if f == "GITHUB_TOKEN"));
    }

    #[test]
    fn test_token_not_in_debug_output() {
        let config = AppConfig::from_vars(&vars()).unwrap();
        let mut vars = vars();
        vars.env.insert("GITHUB_TOKEN".to_string(), "ghp_secret".to_string());
        let secret = AppConfig::from_vars(&vars).unwrap();

        assert!(!format!("{secret:?}").contains("ghp_secret"));
        assert_ne!(config, secret);
    }
}
