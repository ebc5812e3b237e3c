//! Quota and balance computation engine.
//!
//! The `engine` module turns a user's [`LeaveBalance`] into per-type
//! quotas and answers the questions a leave form asks: does this
//! request fit, what would a transfer between two leave types yield,
//! how many days roll into next year.  Balances, day counts and
//! allowance verdicts come from the collaborators in
//! [`crate::ports`]; transfers and carry-overs go to the quota
//! service unless the balance asks for local simulation, in which
//! case [`crate::simulator`] answers.
//!
//! Collaborator failures never escape the quota checks: they are
//! logged and turned into invalid results.  `refresh_quotas` records
//! a failure in the engine state instead of returning it.

use crate::errors::{LeaveError, LeaveResult};
use crate::history::TransferHistory;
use crate::models::{
    BalanceTotals, CarryOverParams, CarryOverResult, CheckQuotaParams, GenerateRecurringResult,
    LeaveBalance, LeaveType, LeaveTypeQuota, QuotaCalculationResult, QuotaCarryOverRule,
    QuotaTransferResult, QuotaTransferRule, RecurringLeaveRequest, TransferQuotaParams,
    WorkSchedule,
};
use crate::policy::QuotaPolicy;
use crate::ports::Collaborators;
use crate::recurrence::{generate_recurring_dates, GenerateOptions};
use crate::simulator::{simulate_carry_over, simulate_transfer};
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const CHECK_FAILED: &str = "An error occurred while checking the quota.";

/// Derives the quota of one leave type from a balance.
///
/// `total` is the policy's base allotment plus any carried-over and
/// net transferred days; `remaining` never drops below zero.
pub fn derive_quota(balance: &LeaveBalance, policy: &QuotaPolicy, leave_type: LeaveType) -> LeaveTypeQuota {
    let details = balance.details(leave_type);
    let total = policy.base_allotment(leave_type, balance) + details.carried_over + details.transferred;
    let remaining = (total - details.used - details.pending).max(0.0);
    LeaveTypeQuota {
        leave_type,
        label: policy.label(leave_type),
        total,
        used: details.used,
        pending: details.pending,
        remaining,
        carried_over: details.carried_over,
        transferred: details.transferred,
        expiry_date: details.carry_over_expiry,
    }
}

/// Per-type quotas for every leave type, plus the balance's own
/// aggregate figures.
///
/// The aggregate is read from the balance record as is and is not
/// reconciled with the per-type breakdown.
pub fn process_balance_data(balance: &LeaveBalance, policy: &QuotaPolicy) -> (Vec<LeaveTypeQuota>, BalanceTotals) {
    let quotas = LeaveType::ALL
        .iter()
        .map(|leave_type| derive_quota(balance, policy, *leave_type))
        .collect();

    let total = balance.initial_allowance + balance.additional_allowance;
    let drift = balance.remaining - (total - balance.used - balance.pending);
    if drift.abs() > 0.01 {
        warn!(
            user_id = %balance.user_id,
            remaining = balance.remaining,
            drift,
            "balance counters disagree"
        );
    }
    let totals = BalanceTotals {
        total,
        used: balance.used,
        pending: balance.pending,
        remaining: balance.remaining,
        drift,
    };
    (quotas, totals)
}

/// Everything the engine learned on its last refresh.
#[derive(Debug, Clone, Default)]
pub struct QuotaState {
    pub loading: bool,
    pub error: Option<LeaveError>,
    pub balance: Option<LeaveBalance>,
    pub quotas_by_type: Vec<LeaveTypeQuota>,
    pub total_balance: BalanceTotals,
    pub transfer_rules: Vec<QuotaTransferRule>,
    pub carry_over_rules: Vec<QuotaCarryOverRule>,
}

/// Outcome of checking a recurring request against the quota.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurringQuotaCheck {
    pub result: QuotaCalculationResult,
    /// Generated occurrences with `counted_days` filled in.
    pub occurrences: GenerateRecurringResult,
}

pub struct QuotaEngine {
    services: Collaborators,
    policy: Arc<QuotaPolicy>,
    schedule: Option<WorkSchedule>,
    reference_date: Option<NaiveDate>,
    state: QuotaState,
}

impl QuotaEngine {
    pub fn new(services: Collaborators, policy: Arc<QuotaPolicy>) -> Self {
        Self {
            services,
            policy,
            schedule: None,
            reference_date: None,
            state: QuotaState::default(),
        }
    }

    /// Use `schedule` for day counting instead of the balance's own.
    pub fn with_schedule(mut self, schedule: WorkSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Pin "today" for rule windows and expiry dates.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn state(&self) -> &QuotaState {
        &self.state
    }

    pub fn quotas_by_type(&self) -> &[LeaveTypeQuota] {
        &self.state.quotas_by_type
    }

    pub fn total_balance(&self) -> BalanceTotals {
        self.state.total_balance
    }

    pub fn error(&self) -> Option<&LeaveError> {
        self.state.error.as_ref()
    }

    pub fn transfer_rules(&self) -> &[QuotaTransferRule] {
        &self.state.transfer_rules
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| Local::now().date_naive())
    }

    fn work_schedule(&self) -> Option<&WorkSchedule> {
        self.schedule
            .as_ref()
            .or_else(|| self.state.balance.as_ref()?.work_schedule.as_ref())
    }

    /// The loaded balance, if it asks for local simulation.
    fn simulation_balance(&self) -> Option<&LeaveBalance> {
        self.state.balance.as_ref().filter(|b| b.use_simulation)
    }

    /// Reloads the balance and active rules for `user_id`.
    ///
    /// Quotas are derived as soon as the balance arrives, so a failed
    /// rule fetch still leaves fresh quotas behind.  Any failure is
    /// exposed through [`QuotaEngine::error`].
    pub async fn refresh_quotas(&mut self, user_id: &str) {
        self.state.loading = true;
        self.state.error = None;

        match self.services.balances.fetch_balance(user_id).await {
            Ok(balance) => {
                let (quotas, totals) = process_balance_data(&balance, &self.policy);
                info!(user_id, types = quotas.len(), "quotas refreshed");
                self.state.quotas_by_type = quotas;
                self.state.total_balance = totals;
                self.state.balance = Some(balance);
                if let Err(err) = self.load_rules(user_id).await {
                    error!(user_id, error = %err, "failed to load quota rules");
                    self.state.error = Some(err);
                }
            }
            Err(err) => {
                error!(user_id, error = %err, "failed to refresh leave quotas");
                self.state.error = Some(err);
            }
        }
        self.state.loading = false;
    }

    async fn load_rules(&mut self, user_id: &str) -> LeaveResult<()> {
        let quota_service = &self.services.quota_service;
        self.state.transfer_rules = quota_service.active_transfer_rules(user_id).await?;
        self.state.carry_over_rules = quota_service.active_carry_over_rules(user_id).await?;
        debug!(
            user_id,
            transfer_rules = self.state.transfer_rules.len(),
            carry_over_rules = self.state.carry_over_rules.len(),
            "quota rules loaded"
        );
        Ok(())
    }

    pub fn get_quota_for_type(&self, leave_type: LeaveType) -> Option<&LeaveTypeQuota> {
        self.state
            .quotas_by_type
            .iter()
            .find(|quota| quota.leave_type == leave_type)
    }

    fn available_days(&self, leave_type: LeaveType) -> f64 {
        self.get_quota_for_type(leave_type)
            .map_or(0.0, |quota| quota.remaining)
    }

    /// Asks the allowance service about `counted_days` and phrases
    /// the verdict.
    async fn allowance_verdict(
        &self,
        user_id: &str,
        leave_type: LeaveType,
        counted_days: f64,
    ) -> QuotaCalculationResult {
        match self
            .services
            .allowance
            .check_allowance(user_id, leave_type, counted_days)
            .await
        {
            Ok(check) => {
                let available_days = self.available_days(leave_type);
                let message = if check.is_allowed {
                    format!("Valid request. {} day(s) will be deducted.", counted_days)
                } else {
                    format!(
                        "Insufficient quota. {} day(s) remain for this leave type.",
                        available_days
                    )
                };
                debug!(user_id, %leave_type, counted_days, allowed = check.is_allowed, "allowance checked");
                QuotaCalculationResult {
                    is_valid: check.is_allowed,
                    message,
                    requested_days: counted_days,
                    available_days,
                    leave_type,
                }
            }
            Err(err) => {
                error!(user_id, %leave_type, error = %err, "allowance check failed");
                QuotaCalculationResult::rejected(leave_type, CHECK_FAILED)
            }
        }
    }

    /// Checks whether a single date range fits in the user's quota.
    pub async fn check_quota(&self, params: &CheckQuotaParams) -> QuotaCalculationResult {
        let leave_type = params.leave_type;
        let (Some(start), Some(end)) = (params.start_date, params.end_date) else {
            return QuotaCalculationResult::rejected(leave_type, "Start and end dates are required.");
        };
        let Some(schedule) = self.work_schedule() else {
            return QuotaCalculationResult::rejected(
                leave_type,
                "Cannot check the quota: no work schedule is available.",
            );
        };

        let counted = match self.services.day_counter.count_days(start, end, schedule).await {
            Ok(Some(count)) => count.counted_days,
            Ok(None) => {
                return QuotaCalculationResult::rejected(
                    leave_type,
                    "Unable to count the leave days for this period.",
                )
            }
            Err(err) => {
                error!(user_id = %params.user_id, error = %err, "day counting failed");
                return QuotaCalculationResult::rejected(leave_type, CHECK_FAILED);
            }
        };
        self.allowance_verdict(&params.user_id, leave_type, counted).await
    }

    /// Checks a recurring request: generates its occurrences, counts
    /// each against the work schedule, and asks the allowance service
    /// about the sum.
    pub async fn check_recurring_quota(
        &self,
        request: &RecurringLeaveRequest,
        options: &GenerateOptions,
    ) -> RecurringQuotaCheck {
        let leave_type = request.leave_type;
        let mut occurrences = generate_recurring_dates(request, options);
        let reject = |occurrences: GenerateRecurringResult, message: &str| RecurringQuotaCheck {
            result: QuotaCalculationResult::rejected(leave_type, message),
            occurrences,
        };

        if occurrences.occurrences.is_empty() {
            return reject(occurrences, "The recurrence pattern produces no occurrences.");
        }
        let Some(schedule) = self.work_schedule() else {
            return reject(occurrences, "Cannot check the quota: no work schedule is available.");
        };

        let mut total = 0.0;
        for index in 0..occurrences.occurrences.len() {
            let (start, end) = {
                let occurrence = &occurrences.occurrences[index];
                (occurrence.start_date, occurrence.end_date)
            };
            match self.services.day_counter.count_days(start, end, schedule).await {
                Ok(Some(count)) => {
                    occurrences.occurrences[index].counted_days = count.counted_days;
                    total += count.counted_days;
                }
                Ok(None) => {
                    return reject(occurrences, "Unable to count the leave days for this period.");
                }
                Err(err) => {
                    error!(user_id = %request.user_id, error = %err, "day counting failed");
                    return reject(occurrences, CHECK_FAILED);
                }
            }
        }

        let result = self.allowance_verdict(&request.user_id, leave_type, total).await;
        RecurringQuotaCheck { result, occurrences }
    }

    /// Executes a transfer, then refreshes the quotas if it succeeded.
    pub async fn transfer_quota(&mut self, params: &TransferQuotaParams) -> LeaveResult<QuotaTransferResult> {
        let result = match self.simulation_balance() {
            Some(balance) => simulate_transfer(
                balance,
                &self.state.transfer_rules,
                &self.policy,
                params,
                self.today(),
            ),
            None => self
                .services
                .quota_service
                .transfer(params)
                .await
                .map_err(|err| {
                    error!(user_id = %params.user_id, error = %err, "quota transfer failed");
                    err
                })?,
        };

        if result.success {
            info!(
                user_id = %params.user_id,
                source = %params.source_type,
                target = %params.target_type,
                days = result.source_amount,
                credited = result.target_amount,
                "quota transferred"
            );
            self.refresh_quotas(&params.user_id).await;
        }
        Ok(result)
    }

    /// Computes what a transfer would yield without executing it.
    pub async fn preview_transfer(&self, params: &TransferQuotaParams) -> LeaveResult<QuotaTransferResult> {
        match self.simulation_balance() {
            Some(balance) => Ok(simulate_transfer(
                balance,
                &self.state.transfer_rules,
                &self.policy,
                params,
                self.today(),
            )),
            None => self
                .services
                .quota_service
                .preview_transfer(params)
                .await
                .map_err(|err| {
                    error!(user_id = %params.user_id, error = %err, "transfer preview failed");
                    err
                }),
        }
    }

    pub async fn calculate_carry_over(&self, params: &CarryOverParams) -> LeaveResult<CarryOverResult> {
        match self.simulation_balance() {
            Some(balance) => Ok(simulate_carry_over(
                balance,
                &self.state.carry_over_rules,
                &self.policy,
                params,
                self.today(),
            )),
            None => self
                .services
                .quota_service
                .calculate_carry_over(params)
                .await
                .map_err(|err| {
                    error!(user_id = %params.user_id, error = %err, "carry-over calculation failed");
                    err
                }),
        }
    }

    /// Commits a carry-over.  Returns whether the service recorded it.
    pub async fn execute_carry_over(&mut self, params: &CarryOverParams) -> LeaveResult<bool> {
        if let Some(balance) = self.simulation_balance() {
            let simulated = simulate_carry_over(
                balance,
                &self.state.carry_over_rules,
                &self.policy,
                params,
                self.today(),
            );
            return Ok(simulated.success);
        }

        let record = self
            .services
            .quota_service
            .execute_carry_over(params)
            .await
            .map_err(|err| {
                error!(user_id = %params.user_id, error = %err, "carry-over execution failed");
                err
            })?;
        if record.id.is_empty() {
            warn!(user_id = %params.user_id, leave_type = %params.leave_type, "carry-over was not recorded");
            return Ok(false);
        }
        info!(
            user_id = %params.user_id,
            leave_type = %params.leave_type,
            days = record.days,
            "carry-over executed"
        );
        self.refresh_quotas(&params.user_id).await;
        Ok(true)
    }

    pub async fn transfer_history(&self, user_id: &str) -> LeaveResult<Vec<TransferHistory>> {
        self.services.quota_service.transfer_history(user_id).await
    }
}
