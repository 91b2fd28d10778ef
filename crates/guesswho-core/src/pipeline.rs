//! Pipeline, stage and action definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::naming::ResourceName;
use crate::resource::ComputeUnitHandle;
use crate::{Environment, Error, ResourceId, Result, SecretValue};

/// A delivery pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: ResourceName,
    /// Stages, executed strictly in this order.
    pub stages: Vec<Stage>,
}

/// A named group of actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

/// Named handoff produced by one stage and consumed by a later one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Artifact {
    pub name: ResourceName,
}

/// One unit of work in a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    /// Intra-stage ordering: lower values run first, equal values may run
    /// together. Unset means the action's 1-based position in its stage.
    pub run_order: Option<u32>,
    pub inputs: Vec<Artifact>,
    pub outputs: Vec<Artifact>,
    pub kind: ActionKind,
}

impl Action {
    /// RunOrder of this action when it sits at `position` (0-based) in its stage.
    pub fn effective_run_order(&self, position: usize) -> u32 {
        self.run_order
            .unwrap_or_else(|| u32::try_from(position + 1).unwrap_or(u32::MAX))
    }

    pub fn is_approval(&self) -> bool {
        matches!(self.kind, ActionKind::ManualApproval { .. })
    }
}

/// What an action does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Pull the configured branch from source control.
    GithubSource(GithubConfig),
    /// Run the build recipe.
    Build(BuildProject),
    /// Push the built artifact into an environment's compute unit.
    Deploy(Box<DeployProject>),
    /// Suspend until an external actor approves or rejects.
    ManualApproval { environment: Environment },
}

/// Source-control coordinates for the source action. The token is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub token: SecretValue,
}

impl GithubConfig {
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("github owner", self.owner.as_str()),
            ("github repo", self.repo.as_str()),
            ("github branch", self.branch.as_str()),
        ] {
            if value.trim().is_empty() {
                return Err(Error::MissingField(field.to_string()));
            }
        }
        if self.token.is_empty() {
            return Err(Error::MissingField("github token".to_string()));
        }
        if self.token.is_redacted() {
            return Err(Error::InvalidInput(
                "github token is the redaction placeholder, not a real token".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build recipe phases, in contract order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    /// Dependency resolution.
    Resolve,
    Test,
    /// Cross-compilation of the deployable binary.
    Compile,
    /// Permission bits on the produced binary.
    Permissions,
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildPhase::Resolve => write!(f, "resolve"),
            BuildPhase::Test => write!(f, "test"),
            BuildPhase::Compile => write!(f, "compile"),
            BuildPhase::Permissions => write!(f, "permissions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    pub phase: BuildPhase,
    pub command: String,
}

/// External build executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecipe {
    pub steps: Vec<BuildStep>,
    /// Files packaged into the build artifact.
    pub artifact_files: Vec<String>,
}

impl BuildRecipe {
    /// Recipe for a Go function compiled to a linux/amd64 `bootstrap` binary.
    pub fn go_lambda() -> Self {
        let step = |phase, command: &str| BuildStep {
            phase,
            command: command.to_string(),
        };
        Self {
            steps: vec![
                step(BuildPhase::Resolve, "go mod tidy"),
                step(BuildPhase::Test, "go test ./..."),
                step(
                    BuildPhase::Compile,
                    "GOOS=linux GOARCH=amd64 go build -o build/bootstrap",
                ),
                step(BuildPhase::Permissions, "chmod +x build/bootstrap"),
            ],
            artifact_files: vec!["build/bootstrap".to_string()],
        }
    }

    /// Check the resolve → test → compile → package ordering.
    pub fn validate(&self) -> Result<()> {
        if let Some(step) = self.steps.iter().find(|s| s.command.trim().is_empty()) {
            return Err(Error::MissingField(format!("{} command", step.phase)));
        }

        for pair in self.steps.windows(2) {
            if pair[1].phase < pair[0].phase {
                return Err(Error::InvalidInput(format!(
                    "build step '{}' ({}) runs after a {} step",
                    pair[1].command, pair[1].phase, pair[0].phase
                )));
            }
        }

        if !self.steps.iter().any(|s| s.phase == BuildPhase::Test) {
            return Err(Error::MissingField("build test step".to_string()));
        }
        if !self.steps.iter().any(|s| s.phase == BuildPhase::Compile) {
            return Err(Error::MissingField("build compile step".to_string()));
        }
        if self.artifact_files.is_empty() {
            return Err(Error::MissingField("build artifact file".to_string()));
        }

        Ok(())
    }

    /// Commands of one phase, in order.
    pub fn commands(&self, phase: BuildPhase) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.phase == phase)
            .map(|s| s.command.as_str())
            .collect()
    }

    /// Phase name to commands, for build executors that take a phase map.
    pub fn phases(&self) -> BTreeMap<BuildPhase, Vec<&str>> {
        let mut phases: BTreeMap<BuildPhase, Vec<&str>> = BTreeMap::new();
        for step in &self.steps {
            phases.entry(step.phase).or_default().push(&step.command);
        }
        phases
    }
}

impl Default for BuildRecipe {
    fn default() -> Self {
        Self::go_lambda()
    }
}

/// Build project run by the build action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildProject {
    pub name: ResourceName,
    pub image: String,
    pub recipe: BuildRecipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// "Grant capability X on resource Y" attached to a project's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

/// Project that updates one compute unit's code from the build artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployProject {
    pub name: ResourceName,
    pub image: String,
    pub target: ComputeUnitHandle,
    /// Object inside the build artifact to ship.
    pub object_key: String,
    pub commands: Vec<String>,
    pub policy: Vec<PolicyStatement>,
}

impl Pipeline {
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Check the structural invariants of a pipeline definition.
    ///
    /// - stages and actions are non-empty, stage names unique
    /// - every consumed artifact is produced earlier (previous stage or a
    ///   lower RunOrder in the same stage), and produced only once
    /// - in a stage with a manual approval, every other action runs at a
    ///   strictly higher RunOrder than the approval
    /// - a deploy into an environment that requires approval sits in a stage
    ///   with an approval for that environment
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidPipeline(format!(
                "pipeline '{}' has no stages",
                self.name
            )));
        }

        let mut stage_names = BTreeSet::new();
        let mut produced: BTreeSet<&Artifact> = BTreeSet::new();

        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(Error::InvalidPipeline(format!(
                    "duplicate stage '{}'",
                    stage.name
                )));
            }
            if stage.actions.is_empty() {
                return Err(Error::InvalidPipeline(format!(
                    "stage '{}' has no actions",
                    stage.name
                )));
            }

            for (_, group) in stage.run_order_groups() {
                for action in &group {
                    for input in &action.inputs {
                        if !produced.contains(input) {
                            return Err(Error::InvalidPipeline(format!(
                                "action '{}' in stage '{}' consumes artifact '{}' before it is produced",
                                action.name, stage.name, input.name
                            )));
                        }
                    }
                }
                for action in &group {
                    for output in &action.outputs {
                        if !produced.insert(output) {
                            return Err(Error::InvalidPipeline(format!(
                                "artifact '{}' is produced more than once",
                                output.name
                            )));
                        }
                    }
                }
            }

            stage.validate_gate()?;
        }

        Ok(())
    }
}

impl Stage {
    /// Actions grouped by effective RunOrder, ascending.
    pub fn run_order_groups(&self) -> Vec<(u32, Vec<&Action>)> {
        let mut groups: BTreeMap<u32, Vec<&Action>> = BTreeMap::new();
        for (position, action) in self.actions.iter().enumerate() {
            groups
                .entry(action.effective_run_order(position))
                .or_default()
                .push(action);
        }
        groups.into_iter().collect()
    }

    fn validate_gate(&self) -> Result<()> {
        let approval_order = self
            .actions
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_approval())
            .map(|(position, a)| a.effective_run_order(position))
            .max();

        if let Some(approval_order) = approval_order {
            if let Some((_, action)) = self
                .actions
                .iter()
                .enumerate()
                .filter(|(_, a)| !a.is_approval())
                .find(|(position, a)| a.effective_run_order(*position) <= approval_order)
            {
                return Err(Error::InvalidPipeline(format!(
                    "action '{}' in stage '{}' is not ordered after the approval",
                    action.name, self.name
                )));
            }
        }

        for action in &self.actions {
            let ActionKind::Deploy(project) = &action.kind else {
                continue;
            };
            let env = project.target.environment;
            if !env.requires_approval() {
                continue;
            }
            let gated = self.actions.iter().any(|a| {
                matches!(a.kind, ActionKind::ManualApproval { environment } if environment == env)
            });
            if !gated {
                return Err(Error::InvalidPipeline(format!(
                    "deploy '{}' into {} has no approval gate in stage '{}'",
                    action.name, env, self.name
                )));
            }
        }

        Ok(())
    }
}

/// Outcome of a manual approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: Option<String> },
}

/// Overall status of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Waiting to start.
    Queued,
    /// Currently running.
    Running,
    /// Waiting for manual approval.
    WaitingApproval { stage: String },
    /// Completed successfully.
    Succeeded,
    /// An action failed; later stages did not run.
    Failed { stage: String },
    /// Approval was rejected; terminal for the run.
    Rejected { stage: String },
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Succeeded
                | PipelineStatus::Failed { .. }
                | PipelineStatus::Rejected { .. }
        )
    }
}

/// Status of a stage within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Not reached yet.
    Pending,
    /// Currently executing.
    Running,
    /// Waiting for manual approval.
    WaitingApproval,
    /// Completed successfully.
    Succeeded,
    /// Failed.
    Failed { message: String },
    /// Not run because an earlier stage did not succeed.
    Skipped { reason: String },
    /// Approval was rejected.
    Rejected { reason: Option<String> },
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Succeeded)
    }
}

/// Result of a stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageResult {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }
}

/// A pipeline run instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: ResourceId,
    pub pipeline: ResourceName,
    pub status: PipelineStatus,
    pub stages: Vec<StageResult>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(pipeline: &Pipeline) -> Self {
        Self {
            id: ResourceId::new(),
            pipeline: pipeline.name.clone(),
            status: PipelineStatus::Queued,
            stages: pipeline
                .stages
                .iter()
                .map(|s| StageResult::pending(&s.name))
                .collect(),
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::stack_resource_name;

    fn artifact(name: &str) -> Artifact {
        Artifact {
            name: stack_resource_name("Test", name).unwrap(),
        }
    }

    fn handle(env: Environment) -> ComputeUnitHandle {
        let name = crate::naming::derive_name("Test", "Fn", env).unwrap();
        ComputeUnitHandle {
            id: ResourceId::derive(name.as_str()),
            name,
            environment: env,
        }
    }

    fn action(name: &str, run_order: Option<u32>, kind: ActionKind) -> Action {
        Action {
            name: name.to_string(),
            run_order,
            inputs: vec![],
            outputs: vec![],
            kind,
        }
    }

    fn deploy(env: Environment, run_order: Option<u32>) -> Action {
        let mut action = action(
            "Deploy",
            run_order,
            ActionKind::Deploy(Box::new(DeployProject {
                name: stack_resource_name("Test", "DeployProject").unwrap(),
                image: "img".to_string(),
                target: handle(env),
                object_key: "build/bootstrap".to_string(),
                commands: vec![],
                policy: vec![],
            })),
        );
        action.inputs.push(artifact("Build"));
        action
    }

    fn approval(run_order: Option<u32>) -> Action {
        action(
            "Approval",
            run_order,
            ActionKind::ManualApproval {
                environment: Environment::Production,
            },
        )
    }

    fn build_stage() -> Stage {
        let mut build = action(
            "Build",
            None,
            ActionKind::Build(BuildProject {
                name: stack_resource_name("Test", "BuildProject").unwrap(),
                image: "img".to_string(),
                recipe: BuildRecipe::go_lambda(),
            }),
        );
        build.outputs.push(artifact("Build"));
        Stage {
            name: "Build".to_string(),
            actions: vec![build],
        }
    }

    fn pipeline(stages: Vec<Stage>) -> Pipeline {
        Pipeline {
            name: stack_resource_name("Test", "Pipeline").unwrap(),
            stages,
        }
    }

    #[test]
    fn test_valid_gated_stage() {
        let p = pipeline(vec![
            build_stage(),
            Stage {
                name: "Production".to_string(),
                actions: vec![approval(Some(1)), deploy(Environment::Production, Some(2))],
            },
        ]);
        p.validate().unwrap();
    }

    #[test]
    fn test_consuming_unproduced_artifact_is_invalid() {
        let p = pipeline(vec![Stage {
            name: "Development".to_string(),
            actions: vec![deploy(Environment::Development, None)],
        }]);
        assert!(matches!(p.validate(), Err(Error::InvalidPipeline(_))));
    }

    #[test]
    fn test_deploy_not_after_approval_is_invalid() {
        let p = pipeline(vec![
            build_stage(),
            Stage {
                name: "Production".to_string(),
                actions: vec![approval(Some(1)), deploy(Environment::Production, Some(1))],
            },
        ]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_gated_deploy_without_approval_is_invalid() {
        let p = pipeline(vec![
            build_stage(),
            Stage {
                name: "Production".to_string(),
                actions: vec![deploy(Environment::Production, Some(2))],
            },
        ]);
        let err = p.validate().unwrap_err();
        assert!(err.to_string().contains("no approval gate"));
    }

    #[test]
    fn test_duplicate_stage_is_invalid() {
        let p = pipeline(vec![build_stage(), build_stage()]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_run_order_groups_sorted() {
        let stage = Stage {
            name: "Production".to_string(),
            actions: vec![deploy(Environment::Production, Some(3)), approval(None)],
        };
        let orders: Vec<u32> = stage.run_order_groups().iter().map(|(o, _)| *o).collect();
        assert_eq!(orders, vec![2, 3]);
    }

    #[test]
    fn test_unordered_actions_run_in_sequence() {
        let mut compile = action(
            "Compile",
            None,
            ActionKind::Build(BuildProject {
                name: stack_resource_name("Test", "CompileProject").unwrap(),
                image: "img".to_string(),
                recipe: BuildRecipe::go_lambda(),
            }),
        );
        compile.outputs.push(artifact("Bin"));
        let mut package = action(
            "Package",
            None,
            ActionKind::Build(BuildProject {
                name: stack_resource_name("Test", "PackageProject").unwrap(),
                image: "img".to_string(),
                recipe: BuildRecipe::go_lambda(),
            }),
        );
        package.inputs.push(artifact("Bin"));

        let stage = Stage {
            name: "Build".to_string(),
            actions: vec![compile, package],
        };
        let orders: Vec<u32> = stage
            .actions
            .iter()
            .enumerate()
            .map(|(position, a)| a.effective_run_order(position))
            .collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(stage.run_order_groups().len(), 2);

        pipeline(vec![stage]).validate().unwrap();
    }

    #[test]
    fn test_github_config_rejects_redacted_token() {
        let github = GithubConfig {
            owner: "octo".to_string(),
            repo: "guess-who".to_string(),
            branch: "main".to_string(),
            token: SecretValue::new("ghp_supersecret"),
        };
        github.validate().unwrap();

        let manifest = serde_json::to_string(&github).unwrap();
        let reloaded: GithubConfig = serde_json::from_str(&manifest).unwrap();
        assert!(matches!(reloaded.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_recipe_ordering_contract() {
        BuildRecipe::go_lambda().validate().unwrap();

        let mut recipe = BuildRecipe::go_lambda();
        recipe.steps.swap(1, 2);
        assert!(matches!(recipe.validate(), Err(Error::InvalidInput(_))));

        let mut recipe = BuildRecipe::go_lambda();
        recipe.steps.retain(|s| s.phase != BuildPhase::Test);
        assert!(matches!(recipe.validate(), Err(Error::MissingField(_))));

        let mut recipe = BuildRecipe::go_lambda();
        recipe.artifact_files.clear();
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_recipe_phases() {
        let recipe = BuildRecipe::go_lambda();
        assert_eq!(recipe.commands(BuildPhase::Test), vec!["go test ./..."]);
        assert_eq!(recipe.phases().len(), 4);
    }

    #[test]
    fn test_status_terminal() {
        assert!(PipelineStatus::Succeeded.is_terminal());
        assert!(
            PipelineStatus::Rejected {
                stage: "Production".to_string()
            }
            .is_terminal()
        );
        assert!(
            !PipelineStatus::WaitingApproval {
                stage: "Production".to_string()
            }
            .is_terminal()
        );
    }
}
