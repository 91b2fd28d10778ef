//! Pipeline execution for GuessWho.
//!
//! Runs a synthesized pipeline stage by stage, delegating actions to an
//! [`ActionRunner`](guesswho_core::runner::ActionRunner) and manual approvals
//! to an [`ApprovalGate`](guesswho_core::runner::ApprovalGate).

pub mod approval;
pub mod orchestrator;
pub mod runner;

pub use approval::{ApprovalSender, ChannelApprovalGate, StaticApprovalGate};
pub use orchestrator::{PipelineEvent, PipelineOrchestrator, PipelineResult};
pub use runner::DryRunRunner;
