//! Action runner and approval gate traits.
//!
//! Pipeline execution is delegated: a runner performs source, build and
//! deploy actions, a gate decides manual approvals.

use async_trait::async_trait;

use crate::Result;
use crate::pipeline::{Action, ApprovalDecision};

/// Trait for executing non-approval pipeline actions.
#[async_trait]
pub trait ActionRunner: Send + Sync {
    /// Name of this runner.
    fn name(&self) -> &'static str;

    /// Run one action to completion. An error fails the action; it is not retried.
    async fn run(&self, stage: &str, action: &Action) -> Result<()>;
}

/// Trait for resolving manual approval actions.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Wait for an external decision. May wait indefinitely.
    async fn decide(&self, stage: &str, action: &Action) -> ApprovalDecision;
}
