//! Simulate-then-confirm flow for transfers and carry-overs.
//!
//! A quota action is never executed blind.  [`ActionFlow::simulate`]
//! previews it first; only a successful preview can be passed to
//! [`ActionFlow::confirm`], which executes exactly the action that was
//! previewed.
//!
//! ```text
//! Idle -> Simulating -> Simulated | SimulationError
//! Simulated -> Executing -> Idle | ExecutionError
//! ```

use crate::engine::QuotaEngine;
use crate::errors::{LeaveError, LeaveResult};
use crate::models::{CarryOverParams, CarryOverResult, QuotaTransferResult, TransferQuotaParams};
use tracing::{info, warn};

/// A quota action awaiting simulation or confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingAction {
    Transfer(TransferQuotaParams),
    CarryOver(CarryOverParams),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionPreview {
    Transfer(QuotaTransferResult),
    CarryOver(CarryOverResult),
}

impl ActionPreview {
    pub fn is_success(&self) -> bool {
        match self {
            ActionPreview::Transfer(result) => result.success,
            ActionPreview::CarryOver(result) => result.success,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ActionPreview::Transfer(result) => &result.message,
            ActionPreview::CarryOver(result) => &result.message,
        }
    }
}

/// What a confirmed action produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Transfer(QuotaTransferResult),
    /// Whether the carry-over was recorded.
    CarryOver(bool),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum FlowState {
    #[default]
    Idle,
    Simulating,
    Simulated {
        action: PendingAction,
        preview: ActionPreview,
    },
    SimulationError(String),
    Executing,
    ExecutionError(String),
}

#[derive(Debug, Default)]
pub struct ActionFlow {
    state: FlowState,
}

impl ActionFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Drop any preview or error and return to `Idle`.
    pub fn reset(&mut self) {
        self.state = FlowState::Idle;
    }

    /// Previews `action`.  A rejected preview moves the flow to
    /// `SimulationError` and is still returned so callers can show it.
    pub async fn simulate(
        &mut self,
        engine: &QuotaEngine,
        action: PendingAction,
    ) -> LeaveResult<ActionPreview> {
        self.state = FlowState::Simulating;
        let preview = match &action {
            PendingAction::Transfer(params) => engine.preview_transfer(params).await.map(ActionPreview::Transfer),
            PendingAction::CarryOver(params) => engine
                .calculate_carry_over(params)
                .await
                .map(ActionPreview::CarryOver),
        };

        match preview {
            Ok(preview) if preview.is_success() => {
                self.state = FlowState::Simulated {
                    action,
                    preview: preview.clone(),
                };
                Ok(preview)
            }
            Ok(preview) => {
                self.state = FlowState::SimulationError(preview.message().to_string());
                Ok(preview)
            }
            Err(err) => {
                self.state = FlowState::SimulationError(err.to_string());
                Err(err)
            }
        }
    }

    /// Executes the previewed action.
    ///
    /// Fails with [`LeaveError::NotSimulated`] unless the last
    /// simulation succeeded; the flow state is left untouched in that
    /// case.
    pub async fn confirm(&mut self, engine: &mut QuotaEngine) -> LeaveResult<ActionOutcome> {
        let action = match &self.state {
            FlowState::Simulated { action, .. } => action.clone(),
            _ => {
                warn!("execution requested without a successful simulation");
                return Err(LeaveError::NotSimulated);
            }
        };

        self.state = FlowState::Executing;
        let outcome = match &action {
            PendingAction::Transfer(params) => engine.transfer_quota(params).await.map(ActionOutcome::Transfer),
            PendingAction::CarryOver(params) => engine
                .execute_carry_over(params)
                .await
                .map(ActionOutcome::CarryOver),
        };

        self.state = match &outcome {
            Ok(ActionOutcome::Transfer(result)) if !result.success => {
                FlowState::ExecutionError(result.message.clone())
            }
            Ok(ActionOutcome::CarryOver(false)) => {
                FlowState::ExecutionError("The carry-over was not recorded.".to_string())
            }
            Ok(_) => {
                info!("quota action executed");
                FlowState::Idle
            }
            Err(err) => FlowState::ExecutionError(err.to_string()),
        };
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeaveType;
    use crate::policy::QuotaPolicy;
    use crate::ports::{Collaborators, QuotaService};
    use crate::snapshot::{LeaveSnapshot, SnapshotService};
    use chrono::NaiveDate;
    use serde_json::json;
    use std::sync::Arc;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, 1).unwrap()
    }

    async fn engine() -> (QuotaEngine, Arc<SnapshotService>) {
        let snapshot: LeaveSnapshot = serde_json::from_value(json!({
            "balance": {
                "userId": "u1",
                "year": 2024,
                "initialAllowance": 25.0,
                "additionalAllowance": 0.0,
                "used": 5.0,
                "pending": 0.0,
                "remaining": 20.0,
                "detailsByType": { "ANNUAL": { "used": 5.0 } }
            },
            "transferRules": [{
                "id": "annual-to-recovery",
                "sourceType": "ANNUAL",
                "targetType": "RECOVERY",
                "conversionRate": 1.0,
                "maxTransferDays": 5.0
            }]
        }))
        .unwrap();
        let policy = Arc::new(QuotaPolicy::default());
        let service = Arc::new(SnapshotService::new(snapshot, policy.clone()).with_today(today()));
        let mut engine = QuotaEngine::new(Collaborators::from_single(service.clone()), policy)
            .with_reference_date(today());
        engine.refresh_quotas("u1").await;
        (engine, service)
    }

    fn transfer(amount: f64) -> PendingAction {
        PendingAction::Transfer(TransferQuotaParams {
            user_id: "u1".into(),
            source_type: LeaveType::Annual,
            target_type: LeaveType::Recovery,
            source_amount: amount,
            comment: None,
        })
    }

    #[tokio::test]
    async fn test_confirm_requires_simulation() {
        let (mut engine, service) = engine().await;
        let mut flow = ActionFlow::new();
        assert_eq!(flow.confirm(&mut engine).await, Err(LeaveError::NotSimulated));
        assert_eq!(flow.state(), &FlowState::Idle);
        assert!(service.transfer_history("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_simulation_cannot_be_confirmed() {
        let (mut engine, _service) = engine().await;
        let mut flow = ActionFlow::new();
        let preview = flow.simulate(&engine, transfer(6.0)).await.unwrap();
        assert!(!preview.is_success());
        assert!(matches!(flow.state(), FlowState::SimulationError(_)));
        assert_eq!(flow.confirm(&mut engine).await, Err(LeaveError::NotSimulated));
    }

    #[tokio::test]
    async fn test_simulate_then_confirm_transfer() {
        let (mut engine, service) = engine().await;
        let mut flow = ActionFlow::new();
        let preview = flow.simulate(&engine, transfer(4.0)).await.unwrap();
        assert!(preview.is_success(), "{}", preview.message());
        assert!(matches!(flow.state(), FlowState::Simulated { .. }));

        let outcome = flow.confirm(&mut engine).await.unwrap();
        assert!(matches!(outcome, ActionOutcome::Transfer(ref r) if r.target_amount == 4.0));
        assert_eq!(flow.state(), &FlowState::Idle);
        assert_eq!(engine.get_quota_for_type(LeaveType::Recovery).unwrap().remaining, 4.0);
        assert_eq!(engine.get_quota_for_type(LeaveType::Annual).unwrap().remaining, 16.0);
        assert_eq!(service.transfer_history("u1").await.unwrap().len(), 1);

        // The preview is consumed by execution.
        assert_eq!(flow.confirm(&mut engine).await, Err(LeaveError::NotSimulated));
    }

    #[tokio::test]
    async fn test_carry_over_execution_error() {
        let (mut engine, service) = engine().await;
        let mut flow = ActionFlow::new();
        let action = PendingAction::CarryOver(CarryOverParams {
            user_id: "u1".into(),
            leave_type: LeaveType::Annual,
            from_year: 2024,
            to_year: 2025,
        });
        let preview = flow.simulate(&engine, action).await.unwrap();
        assert!(preview.is_success());

        // The annual balance is drained between preview and execution.
        for _ in 0..4 {
            let PendingAction::Transfer(params) = transfer(5.0) else { unreachable!() };
            assert!(service.transfer(&params).await.unwrap().success);
        }
        let outcome = flow.confirm(&mut engine).await;
        assert!(matches!(outcome, Err(LeaveError::Service { .. })));
        assert!(matches!(flow.state(), FlowState::ExecutionError(_)));

        flow.reset();
        assert_eq!(flow.state(), &FlowState::Idle);
    }
}
