//! Approval gates.

use async_trait::async_trait;
use guesswho_core::pipeline::{Action, ApprovalDecision};
use guesswho_core::runner::ApprovalGate;
use guesswho_core::{Error, Result};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Gate that always returns the same decision.
#[derive(Debug, Clone)]
pub struct StaticApprovalGate {
    decision: ApprovalDecision,
}

impl StaticApprovalGate {
    pub fn new(decision: ApprovalDecision) -> Self {
        Self { decision }
    }

    pub fn approve() -> Self {
        Self::new(ApprovalDecision::Approved)
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self::new(ApprovalDecision::Rejected {
            reason: Some(reason.into()),
        })
    }
}

#[async_trait]
impl ApprovalGate for StaticApprovalGate {
    async fn decide(&self, stage: &str, action: &Action) -> ApprovalDecision {
        info!(%stage, action = %action.name, decision = ?self.decision, "Static approval");
        self.decision.clone()
    }
}

/// Gate that waits for decisions delivered through an [`ApprovalSender`].
///
/// Decisions are consumed in arrival order, one per approval action. If every
/// sender is dropped, pending approvals are rejected.
pub struct ChannelApprovalGate {
    rx: Mutex<mpsc::Receiver<ApprovalDecision>>,
}

/// Sending half of a [`ChannelApprovalGate`].
#[derive(Debug, Clone)]
pub struct ApprovalSender {
    tx: mpsc::Sender<ApprovalDecision>,
}

impl ChannelApprovalGate {
    pub fn new() -> (Self, ApprovalSender) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self { rx: Mutex::new(rx) },
            ApprovalSender { tx },
        )
    }
}

impl ApprovalSender {
    pub async fn send(&self, decision: ApprovalDecision) -> Result<()> {
        self.tx
            .send(decision)
            .await
            .map_err(|_| Error::Internal("approval gate is closed".to_string()))
    }

    pub async fn approve(&self) -> Result<()> {
        self.send(ApprovalDecision::Approved).await
    }

    pub async fn reject(&self, reason: Option<String>) -> Result<()> {
        self.send(ApprovalDecision::Rejected { reason }).await
    }
}

#[async_trait]
impl ApprovalGate for ChannelApprovalGate {
    async fn decide(&self, stage: &str, action: &Action) -> ApprovalDecision {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(decision) => decision,
            None => {
                warn!(%stage, action = %action.name, "Approval channel closed");
                ApprovalDecision::Rejected {
                    reason: Some("approval channel closed".to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guesswho_core::Environment;
    use guesswho_core::pipeline::ActionKind;

    fn approval() -> Action {
        Action {
            name: "ProductionApproval".to_string(),
            run_order: Some(1),
            inputs: vec![],
            outputs: vec![],
            kind: ActionKind::ManualApproval {
                environment: Environment::Production,
            },
        }
    }

    #[tokio::test]
    async fn test_static_gate() {
        assert_eq!(
            StaticApprovalGate::approve()
                .decide("Production", &approval())
                .await,
            ApprovalDecision::Approved
        );
        assert_eq!(
            StaticApprovalGate::reject("no")
                .decide("Production", &approval())
                .await,
            ApprovalDecision::Rejected {
                reason: Some("no".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_channel_gate_delivers_in_order() {
        let (gate, sender) = ChannelApprovalGate::new();
        sender.approve().await.unwrap();
        sender.reject(None).await.unwrap();

        assert_eq!(
            gate.decide("Production", &approval()).await,
            ApprovalDecision::Approved
        );
        assert_eq!(
            gate.decide("Production", &approval()).await,
            ApprovalDecision::Rejected { reason: None }
        );
    }

    #[tokio::test]
    async fn test_dropped_sender_rejects() {
        let (gate, sender) = ChannelApprovalGate::new();
        drop(sender);

        assert!(matches!(
            gate.decide("Production", &approval()).await,
            ApprovalDecision::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_send_after_gate_dropped_fails() {
        let (gate, sender) = ChannelApprovalGate::new();
        drop(gate);
        assert!(sender.approve().await.is_err());
    }
}
