//! Simulated pipeline execution command.

use anyhow::{Context, Result};
use guesswho_core::pipeline::{ApprovalDecision, PipelineStatus, StageStatus};
use guesswho_scheduler::{DryRunRunner, PipelineEvent, PipelineOrchestrator, StaticApprovalGate};
use std::path::Path;
use std::sync::Arc;

use super::load_assembly;

/// Decision handed to every manual approval in the simulated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateChoice {
    Approve,
    Reject(Option<String>),
}

impl GateChoice {
    /// Without `--approve`, gated stages are rejected.
    pub fn from_flags(approve: bool, reject: bool, reason: Option<String>) -> Self {
        if approve && !reject {
            GateChoice::Approve
        } else if reject {
            GateChoice::Reject(reason)
        } else {
            GateChoice::Reject(Some("no --approve given".to_string()))
        }
    }

    fn decision(self) -> ApprovalDecision {
        match self {
            GateChoice::Approve => ApprovalDecision::Approved,
            GateChoice::Reject(reason) => ApprovalDecision::Rejected { reason },
        }
    }
}

pub async fn run(config: Option<&Path>, gate: GateChoice) -> Result<()> {
    let assembly = load_assembly(config)?;
    let pipeline = assembly.pipeline;
    pipeline.validate().context("Pipeline is invalid")?;

    println!("Running pipeline: {}", pipeline.name);
    println!("Stages: {}", pipeline.stages.len());

    let orchestrator = PipelineOrchestrator::new(
        Arc::new(DryRunRunner),
        Arc::new(StaticApprovalGate::new(gate.decision())),
    );

    println!("\n--- Starting pipeline execution ---\n");
    let (mut rx, result_handle) = orchestrator.execute(&pipeline);

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::RunStarted { run_id, .. } => {
                println!("Run {}", run_id);
            }
            PipelineEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            PipelineEvent::ActionStarted { stage, action } => {
                println!("  [{}] {}", stage, action);
            }
            PipelineEvent::ActionCompleted {
                stage,
                action,
                success: false,
            } => {
                println!("  [{}]! {} failed", stage, action);
            }
            PipelineEvent::ActionCompleted { .. } => {}
            PipelineEvent::ApprovalRequested { stage, action } => {
                println!("  [{}]* {} waiting for approval", stage, action);
            }
            PipelineEvent::ApprovalDecided {
                stage, decision, ..
            } => match decision {
                ApprovalDecision::Approved => println!("  [{}]* approved", stage),
                ApprovalDecision::Rejected { reason } => println!(
                    "  [{}]* rejected: {}",
                    stage,
                    reason.as_deref().unwrap_or("no reason given")
                ),
            },
            PipelineEvent::StageCompleted { stage, status } => {
                if status.is_success() {
                    println!("✓ Stage '{}' completed successfully\n", stage);
                } else {
                    println!("✗ Stage '{}' did not complete\n", stage);
                }
            }
            PipelineEvent::PipelineCompleted { status } => {
                if status == PipelineStatus::Succeeded {
                    println!("--- Pipeline completed successfully ---");
                } else {
                    println!("--- Pipeline did not complete ---");
                }
            }
        }
    }

    let result = result_handle
        .await
        .context("Pipeline execution task failed")?;

    println!("\n--- Stage Summary ---");
    for stage in &result.run.stages {
        let status = match &stage.status {
            StageStatus::Succeeded => "✓ succeeded".to_string(),
            StageStatus::Failed { message } => format!("✗ failed: {}", message),
            StageStatus::Skipped { reason } => format!("⊘ skipped: {}", reason),
            StageStatus::Rejected { reason } => format!(
                "✗ rejected: {}",
                reason.as_deref().unwrap_or("no reason given")
            ),
            StageStatus::Pending => "○ pending".to_string(),
            StageStatus::Running | StageStatus::WaitingApproval => "▶ running".to_string(),
        };
        println!("  {} - {}", stage.name, status);
    }

    match result.status() {
        PipelineStatus::Succeeded => {
            println!("\n✓ Pipeline succeeded!");
            Ok(())
        }
        PipelineStatus::Rejected { stage } => {
            anyhow::bail!("Pipeline rejected at stage '{}'", stage)
        }
        PipelineStatus::Failed { stage } => anyhow::bail!("Pipeline failed at stage '{}'", stage),
        other => anyhow::bail!("Pipeline ended in unexpected state: {:?}", other),
    }
}
