//! Pipeline stage builder.
//!
//! Stages are added in a fixed order, `Source -> Build -> one stage per
//! environment`. Each step consumes the previous builder, so a stage can only
//! be constructed once the artifacts it reads exist:
//!
//! ```text
//! PipelineBuilder --source--> SourcedPipeline --build--> BuiltPipeline --promote--> Pipeline
//! ```
//!
//! Environments that require approval get a manual approval action at
//! RunOrder 1 and their deploy action at RunOrder 2 in the same stage.

use guesswho_config::{AppConfig, BuildConfig};
use guesswho_core::pipeline::{
    Action, ActionKind, Artifact, BuildProject, DeployProject, Effect, GithubConfig, Pipeline,
    PolicyStatement, Stage,
};
use guesswho_core::resource::ComputeUnitHandle;
use guesswho_core::{Environment, EnvironmentMap, Error, ResourceName, Result, StackContext};
use tracing::{debug, info};

pub const SOURCE_STAGE: &str = "Source";
pub const BUILD_STAGE: &str = "Build";

const SOURCE_ACTION: &str = "Source";
const BUILD_ACTION: &str = "Build4All";
const DEPLOY_ACTION: &str = "DeployToLambda";

/// RunOrder of the approval action in a gated stage.
pub const APPROVAL_RUN_ORDER: u32 = 1;
/// RunOrder of the deploy action in a gated stage.
pub const GATED_DEPLOY_RUN_ORDER: u32 = 2;

/// Permission a deploy project needs on its target compute unit.
pub const UPDATE_CODE_PERMISSION: &str = "lambda:UpdateFunctionCode";

/// Entry point: a named, empty pipeline.
pub struct PipelineBuilder<'a> {
    ctx: &'a StackContext,
    name: ResourceName,
}

/// Pipeline with its Source stage.
pub struct SourcedPipeline<'a> {
    ctx: &'a StackContext,
    name: ResourceName,
    stages: Vec<Stage>,
    source_artifact: Artifact,
}

/// Pipeline with Source and Build stages.
pub struct BuiltPipeline<'a> {
    ctx: &'a StackContext,
    name: ResourceName,
    stages: Vec<Stage>,
    build_artifact: Artifact,
    image: String,
    object_key: String,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(ctx: &'a StackContext) -> Result<Self> {
        Ok(Self {
            ctx,
            name: ctx.stack_resource_name("Pipeline")?,
        })
    }

    /// Add the Source stage, producing the source artifact.
    pub fn source(self, github: &GithubConfig) -> Result<SourcedPipeline<'a>> {
        github.validate()?;

        let source_artifact = Artifact {
            name: self.ctx.stack_resource_name("SourceArtifact")?,
        };

        debug!(
            owner = %github.owner,
            repo = %github.repo,
            branch = %github.branch,
            "Adding source stage"
        );

        let action = Action {
            name: SOURCE_ACTION.to_string(),
            run_order: None,
            inputs: vec![],
            outputs: vec![source_artifact.clone()],
            kind: ActionKind::GithubSource(github.clone()),
        };

        Ok(SourcedPipeline {
            ctx: self.ctx,
            name: self.name,
            stages: vec![Stage {
                name: SOURCE_STAGE.to_string(),
                actions: vec![action],
            }],
            source_artifact,
        })
    }
}

impl<'a> SourcedPipeline<'a> {
    /// Add the Build stage: source artifact in, build artifact out.
    pub fn build(mut self, build: &BuildConfig) -> Result<BuiltPipeline<'a>> {
        build.recipe.validate()?;
        if build.image.trim().is_empty() {
            return Err(Error::MissingField("build image".to_string()));
        }
        let object_key = build
            .recipe
            .artifact_files
            .first()
            .cloned()
            .ok_or_else(|| Error::MissingField("build artifact file".to_string()))?;

        let build_artifact = Artifact {
            name: self.ctx.stack_resource_name("BuildArtifact")?,
        };

        let action = Action {
            name: BUILD_ACTION.to_string(),
            run_order: None,
            inputs: vec![self.source_artifact],
            outputs: vec![build_artifact.clone()],
            kind: ActionKind::Build(BuildProject {
                name: self.ctx.stack_resource_name("BuildProject")?,
                image: build.image.clone(),
                recipe: build.recipe.clone(),
            }),
        };

        self.stages.push(Stage {
            name: BUILD_STAGE.to_string(),
            actions: vec![action],
        });

        Ok(BuiltPipeline {
            ctx: self.ctx,
            name: self.name,
            stages: self.stages,
            build_artifact,
            image: build.image.clone(),
            object_key,
        })
    }
}

impl BuiltPipeline<'_> {
    /// Add one deploy stage per environment, in promotion order, and finish.
    pub fn promote(mut self, targets: &EnvironmentMap<ComputeUnitHandle>) -> Result<Pipeline> {
        for env in Environment::ALL {
            let target = targets.get(env);
            if target.environment != env {
                return Err(Error::InvalidInput(format!(
                    "deploy target '{}' belongs to {}, not {}",
                    target.name, target.environment, env
                )));
            }

            let stage = if env.requires_approval() {
                Stage {
                    name: env.name().to_string(),
                    actions: vec![
                        approval_action(env),
                        self.deploy_action(env, target, Some(GATED_DEPLOY_RUN_ORDER))?,
                    ],
                }
            } else {
                Stage {
                    name: env.name().to_string(),
                    actions: vec![self.deploy_action(env, target, None)?],
                }
            };
            debug!(stage = %stage.name, actions = stage.actions.len(), "Adding deploy stage");
            self.stages.push(stage);
        }

        let pipeline = Pipeline {
            name: self.name,
            stages: self.stages,
        };
        pipeline.validate()?;

        info!(
            pipeline = %pipeline.name,
            stages = ?pipeline.stage_names(),
            "Built pipeline"
        );
        Ok(pipeline)
    }

    fn deploy_action(
        &self,
        env: Environment,
        target: &ComputeUnitHandle,
        run_order: Option<u32>,
    ) -> Result<Action> {
        let command = format!(
            "aws lambda update-function-code --function-name {} --s3-bucket ${{artifacts.{}.bucket}} --s3-key {}",
            target.name, self.build_artifact.name, self.object_key
        );

        let project = DeployProject {
            name: self
                .ctx
                .stack_resource_name(&format!("{}DeployProject", env.name()))?,
            image: self.image.clone(),
            target: target.clone(),
            object_key: self.object_key.clone(),
            commands: vec![command],
            policy: vec![PolicyStatement {
                effect: Effect::Allow,
                actions: vec![UPDATE_CODE_PERMISSION.to_string()],
                resources: vec![target.arn(&self.ctx.target)],
            }],
        };

        Ok(Action {
            name: DEPLOY_ACTION.to_string(),
            run_order,
            inputs: vec![self.build_artifact.clone()],
            outputs: vec![],
            kind: ActionKind::Deploy(Box::new(project)),
        })
    }
}

fn approval_action(env: Environment) -> Action {
    Action {
        name: format!("{}Approval", env.name()),
        run_order: Some(APPROVAL_RUN_ORDER),
        inputs: vec![],
        outputs: vec![],
        kind: ActionKind::ManualApproval { environment: env },
    }
}

/// Build the full pipeline for `config`, deploying to `targets`.
pub fn build_pipeline(
    config: &AppConfig,
    targets: &EnvironmentMap<ComputeUnitHandle>,
) -> Result<Pipeline> {
    PipelineBuilder::new(&config.stack)?
        .source(&config.github)?
        .build(&config.build)?
        .promote(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment_unit::build_environment_units;
    use guesswho_core::pipeline::BuildRecipe;
    use guesswho_core::{DeploymentTarget, SecretValue};

    fn config() -> AppConfig {
        AppConfig {
            stack: StackContext::new(
                "GuessWho",
                DeploymentTarget {
                    account: "123456789012".to_string(),
                    region: "us-east-1".to_string(),
                },
            )
            .unwrap(),
            github: GithubConfig {
                owner: "o".to_string(),
                repo: "r".to_string(),
                branch: "main".to_string(),
                token: SecretValue::new("t"),
            },
            build: BuildConfig::default(),
        }
    }

    fn targets(config: &AppConfig) -> EnvironmentMap<ComputeUnitHandle> {
        build_environment_units(&config.stack)
            .unwrap()
            .map(|_, unit| unit.handle())
    }

    #[test]
    fn test_stage_order() {
        let config = config();
        let pipeline = build_pipeline(&config, &targets(&config)).unwrap();

        assert_eq!(pipeline.name.as_str(), "GuessWhoPipeline");
        assert_eq!(
            pipeline.stage_names(),
            vec!["Source", "Build", "Development", "Production"]
        );
    }

    #[test]
    fn test_production_stage_is_gated() {
        let config = config();
        let pipeline = build_pipeline(&config, &targets(&config)).unwrap();
        let production = pipeline.stage("Production").unwrap();

        let first = &production.actions[0];
        assert!(first.is_approval());
        assert_eq!(first.name, "ProductionApproval");
        assert_eq!(first.run_order, Some(1));

        let deploy = &production.actions[1];
        assert_eq!(deploy.run_order, Some(2));
        assert!(first.effective_run_order(0) < deploy.effective_run_order(1));
    }

    #[test]
    fn test_development_stage_has_default_order() {
        let config = config();
        let pipeline = build_pipeline(&config, &targets(&config)).unwrap();
        let development = pipeline.stage("Development").unwrap();

        assert_eq!(development.actions.len(), 1);
        assert_eq!(development.actions[0].run_order, None);
        assert!(!development.actions.iter().any(|a| a.is_approval()));
    }

    #[test]
    fn test_artifacts_are_threaded() {
        let config = config();
        let pipeline = build_pipeline(&config, &targets(&config)).unwrap();

        let source = &pipeline.stages[0].actions[0];
        let build = &pipeline.stages[1].actions[0];
        assert_eq!(source.outputs[0].name.as_str(), "GuessWhoSourceArtifact");
        assert_eq!(build.inputs, source.outputs);
        assert_eq!(build.outputs[0].name.as_str(), "GuessWhoBuildArtifact");

        for stage in &pipeline.stages[2..] {
            let deploy = stage.actions.iter().find(|a| !a.is_approval()).unwrap();
            assert_eq!(deploy.inputs, build.outputs);
        }
    }

    #[test]
    fn test_deploy_targets_environment_unit() {
        let config = config();
        let targets = targets(&config);
        let pipeline = build_pipeline(&config, &targets).unwrap();

        for env in Environment::ALL {
            let stage = pipeline.stage(env.name()).unwrap();
            let deploy = stage.actions.iter().find(|a| !a.is_approval()).unwrap();
            let ActionKind::Deploy(project) = &deploy.kind else {
                panic!("expected deploy action");
            };

            assert_eq!(&project.target, targets.get(env));
            assert_eq!(
                project.name.as_str(),
                format!("GuessWho{}DeployProject", env.name())
            );
            assert_eq!(
                project.commands[0],
                format!(
                    "aws lambda update-function-code --function-name GuessWho__Game{} \
                     --s3-bucket ${{artifacts.GuessWhoBuildArtifact.bucket}} --s3-key build/bootstrap",
                    env.name()
                )
            );
            assert_eq!(project.policy[0].actions, vec![UPDATE_CODE_PERMISSION]);
            assert_eq!(
                project.policy[0].resources,
                vec![targets.get(env).arn(&config.stack.target)]
            );
        }
    }

    #[test]
    fn test_swapped_targets_are_rejected() {
        let config = config();
        let targets = targets(&config);
        let swapped = EnvironmentMap {
            development: targets.production.clone(),
            production: targets.development.clone(),
        };

        assert!(matches!(
            build_pipeline(&config, &swapped),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_token_aborts() {
        let mut config = config();
        config.github.token = SecretValue::new("");
        let result = build_pipeline(&config, &targets(&config));
        assert!(matches!(result, Err(Error::MissingField(_))));
    }

    #[test]
    fn test_invalid_recipe_aborts() {
        let mut config = config();
        config.build.recipe = BuildRecipe {
            steps: vec![],
            artifact_files: vec![],
        };
        assert!(build_pipeline(&config, &targets(&config)).is_err());
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let config = config();
        let a = build_pipeline(&config, &targets(&config)).unwrap();
        let b = build_pipeline(&config, &targets(&config)).unwrap();
        assert_eq!(a, b);
    }
}
