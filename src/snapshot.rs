//! In-memory collaborators backed by a JSON snapshot.
//!
//! A [`LeaveSnapshot`] bundles one user's balance with the transfer
//! and carry-over rules and the public holidays that apply to it.
//! [`SnapshotService`] serves that snapshot through every trait in
//! [`crate::ports`], so the quota engine can run without a remote
//! balance or quota service.  Transfers and carry-overs executed
//! against it update the snapshot in place.

use crate::engine::derive_quota;
use crate::errors::{LeaveError, LeaveResult};
use crate::history::TransferHistory;
use crate::models::{
    CarryOverParams, CarryOverRecord, CarryOverResult, LeaveBalance, LeaveType,
    QuotaCarryOverRule, QuotaTransferResult, QuotaTransferRule, TransferQuotaParams,
    WorkSchedule,
};
use crate::policy::QuotaPolicy;
use crate::ports::{
    AllowanceCheck, AllowanceChecker, BalanceSource, DayCounter, LeaveDayCount, QuotaService,
};
use crate::recurrence::is_holiday;
use crate::simulator::{round_half, simulate_carry_over, simulate_transfer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveSnapshot {
    pub balance: LeaveBalance,
    #[serde(default)]
    pub transfer_rules: Vec<QuotaTransferRule>,
    #[serde(default)]
    pub carry_over_rules: Vec<QuotaCarryOverRule>,
    #[serde(default)]
    pub holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub history: Vec<TransferHistory>,
    #[serde(default)]
    pub carry_overs: Vec<CarryOverRecord>,
}

/// Load a snapshot from a JSON file.
pub fn load_snapshot(path: &Path) -> Result<LeaveSnapshot> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading leave snapshot {:?}", path))?;
    let snapshot: LeaveSnapshot = serde_json::from_str(&data)
        .with_context(|| format!("parsing leave snapshot {:?}", path))?;
    info!(
        path = %path.display(),
        user_id = %snapshot.balance.user_id,
        transfer_rules = snapshot.transfer_rules.len(),
        holidays = snapshot.holidays.len(),
        "leave snapshot loaded"
    );
    Ok(snapshot)
}

/// Counts the days `start..=end` costs under `schedule`.
///
/// Only the schedule's working weekdays that are not holidays count,
/// scaled by the working-time percentage and rounded to the nearest
/// half day.  Returns `None` for an inverted range or a schedule with
/// no working days.
pub fn count_schedule_days(
    start: NaiveDate,
    end: NaiveDate,
    schedule: &WorkSchedule,
    holidays: &[NaiveDate],
) -> Option<LeaveDayCount> {
    if end < start || schedule.working_weekdays.is_empty() {
        return None;
    }
    let worked = start
        .iter_days()
        .take_while(|day| *day <= end)
        .filter(|day| {
            let ordinal = day.weekday().num_days_from_sunday() as u8;
            schedule.working_weekdays.contains(&ordinal) && !is_holiday(day, holidays)
        })
        .count();
    let natural_days = (end - start).num_days() + 1;
    Some(LeaveDayCount {
        counted_days: round_half(worked as f64 * schedule.working_time_percentage / 100.0),
        natural_days: natural_days as u32,
    })
}

/// Serves a [`LeaveSnapshot`] through the collaborator traits.
pub struct SnapshotService {
    policy: Arc<QuotaPolicy>,
    today: NaiveDate,
    snapshot: RwLock<LeaveSnapshot>,
}

impl SnapshotService {
    pub fn new(snapshot: LeaveSnapshot, policy: Arc<QuotaPolicy>) -> Self {
        Self {
            policy,
            today: Local::now().date_naive(),
            snapshot: RwLock::new(snapshot),
        }
    }

    /// Pin the date rule windows and expiry dates are measured from.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Copy of the current snapshot, including executed changes.
    pub async fn snapshot(&self) -> LeaveSnapshot {
        self.snapshot.read().await.clone()
    }

    pub async fn holidays(&self) -> Vec<NaiveDate> {
        self.snapshot.read().await.holidays.clone()
    }
}

fn balance_for<'a>(snapshot: &'a LeaveSnapshot, user_id: &str) -> LeaveResult<&'a LeaveBalance> {
    if snapshot.balance.user_id == user_id {
        Ok(&snapshot.balance)
    } else {
        Err(LeaveError::BalanceUnavailable {
            user_id: user_id.to_string(),
            reason: "not present in snapshot".into(),
        })
    }
}

#[async_trait]
impl BalanceSource for SnapshotService {
    async fn fetch_balance(&self, user_id: &str) -> LeaveResult<LeaveBalance> {
        let snapshot = self.snapshot.read().await;
        balance_for(&snapshot, user_id).cloned()
    }
}

#[async_trait]
impl DayCounter for SnapshotService {
    async fn count_days(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        schedule: &WorkSchedule,
    ) -> LeaveResult<Option<LeaveDayCount>> {
        let snapshot = self.snapshot.read().await;
        Ok(count_schedule_days(start, end, schedule, &snapshot.holidays))
    }
}

#[async_trait]
impl AllowanceChecker for SnapshotService {
    async fn check_allowance(
        &self,
        user_id: &str,
        leave_type: LeaveType,
        counted_days: f64,
    ) -> LeaveResult<AllowanceCheck> {
        let snapshot = self.snapshot.read().await;
        let balance = balance_for(&snapshot, user_id)?;
        let remaining_days = derive_quota(balance, &self.policy, leave_type).remaining;
        Ok(AllowanceCheck {
            is_allowed: counted_days <= remaining_days,
            remaining_days,
            requested_days: counted_days,
        })
    }
}

#[async_trait]
impl QuotaService for SnapshotService {
    async fn active_transfer_rules(&self, _user_id: &str) -> LeaveResult<Vec<QuotaTransferRule>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot
            .transfer_rules
            .iter()
            .filter(|rule| rule.is_applicable(self.today))
            .cloned()
            .collect())
    }

    async fn active_carry_over_rules(&self, _user_id: &str) -> LeaveResult<Vec<QuotaCarryOverRule>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot
            .carry_over_rules
            .iter()
            .filter(|rule| rule.is_active)
            .cloned()
            .collect())
    }

    async fn preview_transfer(&self, request: &TransferQuotaParams) -> LeaveResult<QuotaTransferResult> {
        let snapshot = self.snapshot.read().await;
        let balance = balance_for(&snapshot, &request.user_id)?;
        Ok(simulate_transfer(
            balance,
            &snapshot.transfer_rules,
            &self.policy,
            request,
            self.today,
        ))
    }

    /// Applies the transfer to the per-type `transferred` counters and
    /// records it.  Transfers awaiting approval are recorded but not
    /// applied.
    async fn transfer(&self, request: &TransferQuotaParams) -> LeaveResult<QuotaTransferResult> {
        let mut snapshot = self.snapshot.write().await;
        let result = simulate_transfer(
            balance_for(&snapshot, &request.user_id)?,
            &snapshot.transfer_rules,
            &self.policy,
            request,
            self.today,
        );
        if !result.success {
            return Ok(result);
        }

        if !result.requires_approval {
            let details = &mut snapshot.balance.details_by_type;
            details.entry(request.source_type).or_default().transferred -= result.source_amount;
            details.entry(request.target_type).or_default().transferred += result.target_amount;
        }
        let record = TransferHistory::from_result(
            Uuid::new_v4().to_string(),
            request,
            &result,
            Local::now().naive_local(),
        );
        debug!(id = %record.id, status = ?record.status, "transfer recorded");
        snapshot.history.push(record);
        Ok(result)
    }

    async fn transfer_history(&self, user_id: &str) -> LeaveResult<Vec<TransferHistory>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot
            .history
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn calculate_carry_over(&self, request: &CarryOverParams) -> LeaveResult<CarryOverResult> {
        let snapshot = self.snapshot.read().await;
        Ok(simulate_carry_over(
            carry_over_source(&snapshot, request)?,
            &snapshot.carry_over_rules,
            &self.policy,
            request,
            self.today,
        ))
    }

    /// Records the carry-over.  The snapshot only holds the source
    /// year, so the balance itself is left untouched; the record is what
    /// the destination year picks up.
    async fn execute_carry_over(&self, request: &CarryOverParams) -> LeaveResult<CarryOverRecord> {
        let mut snapshot = self.snapshot.write().await;
        let result = simulate_carry_over(
            carry_over_source(&snapshot, request)?,
            &snapshot.carry_over_rules,
            &self.policy,
            request,
            self.today,
        );
        if !result.success {
            return Err(LeaveError::service("carry-over", result.message));
        }

        let record = CarryOverRecord {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            leave_type: request.leave_type,
            from_year: request.from_year,
            to_year: request.to_year,
            days: result.carry_over_amount,
            expiry_date: result.expiry_date,
            recorded_at: Local::now().naive_local(),
        };
        info!(
            user_id = %record.user_id,
            leave_type = %record.leave_type,
            days = record.days,
            "carry-over recorded"
        );
        snapshot.carry_overs.push(record.clone());
        Ok(record)
    }
}

/// The balance a carry-over draws from.  It must be the snapshot's
/// year, and each type can be carried out of a year once.
fn carry_over_source<'a>(
    snapshot: &'a LeaveSnapshot,
    request: &CarryOverParams,
) -> LeaveResult<&'a LeaveBalance> {
    let balance = balance_for(snapshot, &request.user_id)?;
    if balance.year != request.from_year {
        return Err(LeaveError::service(
            "carry-over",
            format!("source year {} not available in snapshot", request.from_year),
        ));
    }
    let done = snapshot.carry_overs.iter().any(|record| {
        record.user_id == request.user_id
            && record.leave_type == request.leave_type
            && record.from_year == request.from_year
    });
    if done {
        return Err(LeaveError::service(
            "carry-over",
            format!("{} days were already carried out of {}", request.leave_type, request.from_year),
        ));
    }
    Ok(balance)
}
