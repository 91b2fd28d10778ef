//! Dry-run action runner.

use async_trait::async_trait;
use guesswho_core::Result;
use guesswho_core::pipeline::{Action, ActionKind};
use guesswho_core::runner::ActionRunner;
use tracing::info;

/// Runner that logs what each action would do and succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunRunner;

impl DryRunRunner {
    /// Commands the action would run, in order.
    pub fn describe(action: &Action) -> Vec<String> {
        match &action.kind {
            ActionKind::GithubSource(github) => vec![format!(
                "fetch {}/{}@{}",
                github.owner, github.repo, github.branch
            )],
            ActionKind::Build(project) => project
                .recipe
                .phases()
                .into_values()
                .flatten()
                .map(str::to_string)
                .collect(),
            ActionKind::Deploy(project) => project.commands.clone(),
            ActionKind::ManualApproval { environment } => {
                vec![format!("await approval for {environment}")]
            }
        }
    }
}

#[async_trait]
impl ActionRunner for DryRunRunner {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn run(&self, stage: &str, action: &Action) -> Result<()> {
        for command in Self::describe(action) {
            info!(%stage, action = %action.name, %command, "Dry run");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guesswho_core::naming::stack_resource_name;
    use guesswho_core::pipeline::{BuildProject, BuildRecipe};

    #[tokio::test]
    async fn test_build_commands_in_phase_order() {
        let action = Action {
            name: "Build4All".to_string(),
            run_order: None,
            inputs: vec![],
            outputs: vec![],
            kind: ActionKind::Build(BuildProject {
                name: stack_resource_name("GuessWho", "BuildProject").unwrap(),
                image: "image".to_string(),
                recipe: BuildRecipe::go_lambda(),
            }),
        };

        assert_eq!(
            DryRunRunner::describe(&action),
            vec![
                "go mod tidy",
                "go test ./...",
                "GOOS=linux GOARCH=amd64 go build -o build/bootstrap",
                "chmod +x build/bootstrap",
            ]
        );
        assert!(DryRunRunner.run("Build", &action).await.is_ok());
    }
}
