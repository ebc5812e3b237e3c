//! Collaborator traits.
//!
//! The quota engine never talks to storage or the network itself.
//! Balances, day counts, allowance verdicts and transfer/carry-over
//! execution come from implementations of the traits below, one per
//! outside service.  Implementations must be thread-safe
//! (`Send + Sync`) because the engine holds them behind `Arc`s.

use crate::errors::LeaveResult;
use crate::history::TransferHistory;
use crate::models::{
    CarryOverParams, CarryOverRecord, CarryOverResult, LeaveBalance, LeaveType,
    QuotaCarryOverRule, QuotaTransferResult, QuotaTransferRule, TransferQuotaParams,
    WorkSchedule,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Days a date range costs against a quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDayCount {
    pub counted_days: f64,
    /// Calendar days in the range, counted or not.
    pub natural_days: u32,
}

/// Verdict of the allowance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowanceCheck {
    pub is_allowed: bool,
    pub remaining_days: f64,
    pub requested_days: f64,
}

#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balance(&self, user_id: &str) -> LeaveResult<LeaveBalance>;
}

#[async_trait]
pub trait DayCounter: Send + Sync {
    /// Returns `Ok(None)` when the range cannot be counted against
    /// the schedule.
    async fn count_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        schedule: &WorkSchedule,
    ) -> LeaveResult<Option<LeaveDayCount>>;
}

#[async_trait]
pub trait AllowanceChecker: Send + Sync {
    async fn check_allowance(
        &self,
        user_id: &str,
        leave_type: LeaveType,
        counted_days: f64,
    ) -> LeaveResult<AllowanceCheck>;
}

/// Remote quota service: rules, transfers and carry-overs.
#[async_trait]
pub trait QuotaService: Send + Sync {
    async fn active_transfer_rules(&self, user_id: &str) -> LeaveResult<Vec<QuotaTransferRule>>;
    async fn active_carry_over_rules(&self, user_id: &str)
        -> LeaveResult<Vec<QuotaCarryOverRule>>;
    async fn preview_transfer(&self, request: &TransferQuotaParams)
        -> LeaveResult<QuotaTransferResult>;
    async fn transfer(&self, request: &TransferQuotaParams) -> LeaveResult<QuotaTransferResult>;
    async fn transfer_history(&self, user_id: &str) -> LeaveResult<Vec<TransferHistory>>;
    async fn calculate_carry_over(&self, request: &CarryOverParams)
        -> LeaveResult<CarryOverResult>;
    async fn execute_carry_over(&self, request: &CarryOverParams) -> LeaveResult<CarryOverRecord>;
}

/// The set of collaborators a [`QuotaEngine`](crate::engine::QuotaEngine)
/// is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub balances: Arc<dyn BalanceSource>,
    pub day_counter: Arc<dyn DayCounter>,
    pub allowance: Arc<dyn AllowanceChecker>,
    pub quota_service: Arc<dyn QuotaService>,
}

impl Collaborators {
    /// Wire every collaborator to one implementation.
    pub fn from_single<T>(service: Arc<T>) -> Self
    where
        T: BalanceSource + DayCounter + AllowanceChecker + QuotaService + 'static,
    {
        Self {
            balances: service.clone(),
            day_counter: service.clone(),
            allowance: service.clone(),
            quota_service: service,
        }
    }
}
