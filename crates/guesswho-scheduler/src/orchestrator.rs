//! Pipeline orchestrator - executes stages in sequence, actions by RunOrder.

use chrono::Utc;
use futures::future::join_all;
use guesswho_core::ResourceId;
use guesswho_core::pipeline::{
    Action, ApprovalDecision, Artifact, Pipeline, PipelineRun, PipelineStatus, Stage, StageStatus,
};
use guesswho_core::runner::{ActionRunner, ApprovalGate};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Event emitted during pipeline execution.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    RunStarted {
        run_id: ResourceId,
        pipeline: String,
    },
    StageStarted {
        stage: String,
    },
    ActionStarted {
        stage: String,
        action: String,
    },
    ActionCompleted {
        stage: String,
        action: String,
        success: bool,
    },
    ApprovalRequested {
        stage: String,
        action: String,
    },
    ApprovalDecided {
        stage: String,
        action: String,
        decision: ApprovalDecision,
    },
    StageCompleted { stage: String, status: StageStatus },
    PipelineCompleted { status: PipelineStatus },
}

/// Result of a pipeline execution.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub success: bool,
    pub run: PipelineRun,
}

impl PipelineResult {
    pub fn status(&self) -> &PipelineStatus {
        &self.run.status
    }

    pub fn stage_status(&self, name: &str) -> Option<&StageStatus> {
        self.run.stage(name).map(|s| &s.status)
    }
}

/// How one action ended.
enum ActionOutcome {
    Succeeded,
    Failed(String),
    Rejected(Option<String>),
}

/// Orchestrates the execution of a pipeline.
pub struct PipelineOrchestrator {
    runner: Arc<dyn ActionRunner>,
    gate: Arc<dyn ApprovalGate>,
}

impl PipelineOrchestrator {
    pub fn new(runner: Arc<dyn ActionRunner>, gate: Arc<dyn ApprovalGate>) -> Self {
        Self { runner, gate }
    }

    /// Execute a pipeline, returning a channel of events and a handle to get the final result.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
    ) -> (
        mpsc::Receiver<PipelineEvent>,
        tokio::task::JoinHandle<PipelineResult>,
    ) {
        let (tx, rx) = mpsc::channel(100);
        let runner = self.runner.clone();
        let gate = self.gate.clone();
        let pipeline = pipeline.clone();

        let handle =
            tokio::spawn(async move { Self::execute_inner(runner, gate, pipeline, tx).await });

        (rx, handle)
    }

    async fn execute_inner(
        runner: Arc<dyn ActionRunner>,
        gate: Arc<dyn ApprovalGate>,
        pipeline: Pipeline,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> PipelineResult {
        let mut run = PipelineRun::new(&pipeline);
        run.status = PipelineStatus::Running;
        info!(
            run_id = %run.id,
            pipeline = %pipeline.name,
            runner = runner.name(),
            "Starting pipeline run"
        );
        let _ = tx
            .send(PipelineEvent::RunStarted {
                run_id: run.id,
                pipeline: pipeline.name.to_string(),
            })
            .await;

        let mut produced: BTreeSet<Artifact> = BTreeSet::new();

        for (idx, stage) in pipeline.stages.iter().enumerate() {
            if run.status.is_terminal() {
                let reason = match &run.status {
                    PipelineStatus::Failed { stage } => format!("stage '{stage}' failed"),
                    PipelineStatus::Rejected { stage } => format!("stage '{stage}' was rejected"),
                    _ => "pipeline ended".to_string(),
                };
                info!(stage = %stage.name, %reason, "Skipping stage");
                run.stages[idx].status = StageStatus::Skipped { reason };
                continue;
            }

            run.stages[idx].status = StageStatus::Running;
            run.stages[idx].started_at = Some(Utc::now());
            let _ = tx
                .send(PipelineEvent::StageStarted {
                    stage: stage.name.clone(),
                })
                .await;

            let status = Self::execute_stage(
                &runner,
                &gate,
                stage,
                &mut produced,
                &mut run,
                idx,
                &tx,
            )
            .await;

            match &status {
                StageStatus::Succeeded => {
                    info!(stage = %stage.name, "Stage completed successfully");
                    run.status = PipelineStatus::Running;
                }
                StageStatus::Rejected { reason } => {
                    warn!(stage = %stage.name, ?reason, "Stage rejected");
                    run.status = PipelineStatus::Rejected {
                        stage: stage.name.clone(),
                    };
                }
                StageStatus::Failed { message } => {
                    error!(stage = %stage.name, error = %message, "Stage failed");
                    run.status = PipelineStatus::Failed {
                        stage: stage.name.clone(),
                    };
                }
                _ => {}
            }

            run.stages[idx].status = status.clone();
            run.stages[idx].finished_at = Some(Utc::now());
            let _ = tx
                .send(PipelineEvent::StageCompleted {
                    stage: stage.name.clone(),
                    status,
                })
                .await;
        }

        if !run.status.is_terminal() {
            run.status = PipelineStatus::Succeeded;
        }
        run.finished_at = Some(Utc::now());

        let success = run.status == PipelineStatus::Succeeded;
        info!(run_id = %run.id, status = ?run.status, "Pipeline run finished");
        let _ = tx
            .send(PipelineEvent::PipelineCompleted {
                status: run.status.clone(),
            })
            .await;

        PipelineResult { success, run }
    }

    /// Execute a single stage, one RunOrder group at a time.
    async fn execute_stage(
        runner: &Arc<dyn ActionRunner>,
        gate: &Arc<dyn ApprovalGate>,
        stage: &Stage,
        produced: &mut BTreeSet<Artifact>,
        run: &mut PipelineRun,
        idx: usize,
        tx: &mpsc::Sender<PipelineEvent>,
    ) -> StageStatus {
        for (run_order, group) in stage.run_order_groups() {
            if group.iter().any(|a| a.is_approval()) {
                run.status = PipelineStatus::WaitingApproval {
                    stage: stage.name.clone(),
                };
                run.stages[idx].status = StageStatus::WaitingApproval;
            }

            info!(stage = %stage.name, run_order, actions = group.len(), "Running action group");
            let available: &BTreeSet<Artifact> = produced;
            let runs = group
                .iter()
                .map(|action| Self::execute_action(runner, gate, stage, action, available, tx));
            let outcomes = join_all(runs).await;

            if let Some(reason) = outcomes.iter().find_map(|o| match o {
                ActionOutcome::Rejected(reason) => Some(reason.clone()),
                _ => None,
            }) {
                return StageStatus::Rejected { reason };
            }

            let failures: Vec<&str> = outcomes
                .iter()
                .filter_map(|o| match o {
                    ActionOutcome::Failed(message) => Some(message.as_str()),
                    _ => None,
                })
                .collect();
            if !failures.is_empty() {
                return StageStatus::Failed {
                    message: failures.join("; "),
                };
            }

            if run.stages[idx].status == StageStatus::WaitingApproval {
                run.status = PipelineStatus::Running;
                run.stages[idx].status = StageStatus::Running;
            }
            produced.extend(group.iter().flat_map(|a| a.outputs.iter().cloned()));
        }

        StageStatus::Succeeded
    }

    /// Execute one action. Inputs must already have been produced.
    async fn execute_action(
        runner: &Arc<dyn ActionRunner>,
        gate: &Arc<dyn ApprovalGate>,
        stage: &Stage,
        action: &Action,
        produced: &BTreeSet<Artifact>,
        tx: &mpsc::Sender<PipelineEvent>,
    ) -> ActionOutcome {
        if let Some(missing) = action.inputs.iter().find(|a| !produced.contains(*a)) {
            let message = format!(
                "action '{}' input artifact '{}' was not produced",
                action.name, missing.name
            );
            let _ = tx
                .send(PipelineEvent::ActionCompleted {
                    stage: stage.name.clone(),
                    action: action.name.clone(),
                    success: false,
                })
                .await;
            return ActionOutcome::Failed(message);
        }

        if action.is_approval() {
            info!(stage = %stage.name, action = %action.name, "Waiting for approval");
            let _ = tx
                .send(PipelineEvent::ApprovalRequested {
                    stage: stage.name.clone(),
                    action: action.name.clone(),
                })
                .await;

            let decision = gate.decide(&stage.name, action).await;
            info!(stage = %stage.name, action = %action.name, ?decision, "Approval decided");
            let _ = tx
                .send(PipelineEvent::ApprovalDecided {
                    stage: stage.name.clone(),
                    action: action.name.clone(),
                    decision: decision.clone(),
                })
                .await;

            return match decision {
                ApprovalDecision::Approved => ActionOutcome::Succeeded,
                ApprovalDecision::Rejected { reason } => ActionOutcome::Rejected(reason),
            };
        }

        let _ = tx
            .send(PipelineEvent::ActionStarted {
                stage: stage.name.clone(),
                action: action.name.clone(),
            })
            .await;

        let outcome = match runner.run(&stage.name, action).await {
            Ok(()) => ActionOutcome::Succeeded,
            Err(e) => ActionOutcome::Failed(format!("action '{}' failed: {}", action.name, e)),
        };

        let _ = tx
            .send(PipelineEvent::ActionCompleted {
                stage: stage.name.clone(),
                action: action.name.clone(),
                success: matches!(outcome, ActionOutcome::Succeeded),
            })
            .await;
        outcome
    }
}
