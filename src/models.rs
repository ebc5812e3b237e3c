//! Data models for the Leave Engine.
//!
//! The `models` module defines the serialisable value objects that
//! flow through the recurrence and quota engines: leave types,
//! recurrence patterns, generated leaves, balances, derived quotas,
//! transfer and carry-over rules and their results.  Every type
//! derives `Serialize` and `Deserialize` so that callers can persist
//! or transmit them.  Field names use camelCase on the wire to match
//! the front end that drives the engine.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The categories of leave an employee can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Annual,
    Recovery,
    Training,
    Sick,
    Maternity,
    Special,
    Unpaid,
    Other,
}

impl LeaveType {
    /// Every known leave type, in display order.
    pub const ALL: [LeaveType; 8] = [
        LeaveType::Annual,
        LeaveType::Recovery,
        LeaveType::Training,
        LeaveType::Sick,
        LeaveType::Maternity,
        LeaveType::Special,
        LeaveType::Unpaid,
        LeaveType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "ANNUAL",
            LeaveType::Recovery => "RECOVERY",
            LeaveType::Training => "TRAINING",
            LeaveType::Sick => "SICK",
            LeaveType::Maternity => "MATERNITY",
            LeaveType::Special => "SPECIAL",
            LeaveType::Unpaid => "UNPAID",
            LeaveType::Other => "OTHER",
        }
    }
}

impl fmt::Display for LeaveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaveType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeaveType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown leave type: {}", s))
    }
}

/// How often a recurring leave repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// When a recurring leave stops producing occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceEndType {
    /// Runs until the generation horizon is reached.
    Never,
    /// Stops after `end_count` occurrences.
    Count,
    /// Stops at `end_date` (exclusive).
    UntilDate,
}

/// Describes how a base leave repeats.
///
/// Only the fields relevant to the chosen `frequency` and `end_type`
/// are meaningful; the engine ignores the others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrencePattern {
    pub frequency: RecurrenceFrequency,
    /// Step count between occurrences, e.g. `2` with `Weekly` means
    /// every other week.
    pub interval: u32,
    /// Weekday ordinals, `0` = Sunday through `6` = Saturday.  Only
    /// read for weekly patterns.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    /// Day of month (1..=31) for monthly patterns.
    pub day_of_month: Option<u32>,
    /// Week of month (1..=5) for monthly patterns.
    pub week_of_month: Option<u32>,
    pub end_type: RecurrenceEndType,
    pub end_count: Option<u32>,
    /// Older clients sent the occurrence cap under this name.
    #[serde(rename = "occurrences")]
    pub legacy_occurrences: Option<u32>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub skip_weekends: bool,
    #[serde(default)]
    pub skip_holidays: bool,
}

impl RecurrencePattern {
    /// A pattern repeating every `interval` units with no end and no
    /// exclusions.
    pub fn new(frequency: RecurrenceFrequency, interval: u32) -> Self {
        Self {
            frequency,
            interval,
            weekdays: Vec::new(),
            day_of_month: None,
            week_of_month: None,
            end_type: RecurrenceEndType::Never,
            end_count: None,
            legacy_occurrences: None,
            end_date: None,
            skip_weekends: false,
            skip_holidays: false,
        }
    }

    pub fn on_weekdays(mut self, weekdays: Vec<u8>) -> Self {
        self.weekdays = weekdays;
        self
    }

    pub fn on_day_of_month(mut self, day: u32) -> Self {
        self.day_of_month = Some(day);
        self
    }

    pub fn in_week_of_month(mut self, week: u32) -> Self {
        self.week_of_month = Some(week);
        self
    }

    pub fn ending_after(mut self, count: u32) -> Self {
        self.end_type = RecurrenceEndType::Count;
        self.end_count = Some(count);
        self
    }

    pub fn ending_on(mut self, date: NaiveDate) -> Self {
        self.end_type = RecurrenceEndType::UntilDate;
        self.end_date = Some(date);
        self
    }

    pub fn skipping_weekends(mut self) -> Self {
        self.skip_weekends = true;
        self
    }

    pub fn skipping_holidays(mut self) -> Self {
        self.skip_holidays = true;
        self
    }

    /// The occurrence cap for `Count` patterns, falling back to the
    /// legacy field.
    pub fn occurrence_cap(&self) -> Option<u32> {
        self.end_count.or(self.legacy_occurrences)
    }
}

/// A leave request that repeats according to a [`RecurrencePattern`].
///
/// The span between `pattern_start_date` and `pattern_end_date`
/// (inclusive) is the length of every generated occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringLeaveRequest {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
    pub pattern_start_date: NaiveDate,
    pub pattern_end_date: NaiveDate,
    pub recurrence_pattern: RecurrencePattern,
    pub reason: Option<String>,
    pub comment: Option<String>,
}

impl RecurringLeaveRequest {
    /// Inclusive length of each occurrence in days, never less than one.
    pub fn span_days(&self) -> i64 {
        ((self.pattern_end_date - self.pattern_start_date).num_days() + 1).max(1)
    }
}

/// One concrete leave produced from a recurring request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLeave {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub user_id: String,
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
    pub reason: Option<String>,
    pub comment: Option<String>,
    /// Identifier of the recurring request this leave came from.
    pub parent_request_id: String,
    /// Zero at generation time; filled by a day-counting collaborator.
    pub counted_days: f64,
}

/// Output of the recurrence engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRecurringResult {
    pub occurrences: Vec<GeneratedLeave>,
    /// Calendar days across all occurrences.
    pub total_days: u32,
    /// Days across all occurrences that are neither weekends nor holidays.
    pub business_days: u32,
}

fn full_time() -> f64 {
    100.0
}

/// The working pattern used to turn a date range into counted days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSchedule {
    pub id: String,
    /// Weekday ordinals the employee normally works (`0` = Sunday).
    pub working_weekdays: Vec<u8>,
    /// Share of a full-time position, in percent.
    #[serde(default = "full_time")]
    pub working_time_percentage: f64,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        Self {
            id: "standard".to_string(),
            working_weekdays: vec![1, 2, 3, 4, 5],
            working_time_percentage: full_time(),
        }
    }
}

/// Per-type consumption recorded on a [`LeaveBalance`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypeDetails {
    pub used: f64,
    pub pending: f64,
    /// Days carried over from the previous year.
    pub carried_over: f64,
    /// Net days transferred in (positive) or out (negative).
    pub transferred: f64,
    pub carry_over_expiry: Option<NaiveDate>,
}

/// A user's yearly leave allotment, as returned by the balance service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBalance {
    pub user_id: String,
    pub year: i32,
    pub initial_allowance: f64,
    pub additional_allowance: f64,
    pub used: f64,
    pub pending: f64,
    pub remaining: f64,
    #[serde(default)]
    pub details_by_type: BTreeMap<LeaveType, TypeDetails>,
    pub work_schedule: Option<WorkSchedule>,
    /// When set, transfers and carry-overs are simulated locally
    /// instead of being sent to the quota service.
    #[serde(default)]
    pub use_simulation: bool,
}

impl LeaveBalance {
    pub fn details(&self, leave_type: LeaveType) -> TypeDetails {
        self.details_by_type
            .get(&leave_type)
            .cloned()
            .unwrap_or_default()
    }
}

/// Per-type quota derived from a balance and the quota policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveTypeQuota {
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
    pub label: String,
    pub total: f64,
    pub used: f64,
    pub pending: f64,
    pub remaining: f64,
    pub carried_over: f64,
    pub transferred: f64,
    pub expiry_date: Option<NaiveDate>,
}

/// Aggregate figures taken directly from the balance record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceTotals {
    pub total: f64,
    pub used: f64,
    pub pending: f64,
    pub remaining: f64,
    /// `remaining` minus `total - used - pending`.  Non-zero when the
    /// balance service's counters disagree with each other.
    pub drift: f64,
}

/// Input to a single-range quota check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckQuotaParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub leave_type: LeaveType,
    pub user_id: String,
}

/// Verdict of a quota check.  Never an error: problems are reported
/// through `is_valid` and `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCalculationResult {
    pub is_valid: bool,
    pub message: String,
    pub requested_days: f64,
    pub available_days: f64,
    pub leave_type: LeaveType,
}

impl QuotaCalculationResult {
    pub fn rejected(leave_type: LeaveType, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            requested_days: 0.0,
            available_days: 0.0,
            leave_type,
        }
    }
}

fn active() -> bool {
    true
}

/// Governs conversion of days from one leave type into another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaTransferRule {
    pub id: String,
    pub source_type: LeaveType,
    pub target_type: LeaveType,
    /// Target days credited per source day.
    pub conversion_rate: f64,
    pub max_transfer_days: Option<f64>,
    /// Percentage of the source's current remaining days.
    pub max_transfer_percentage: Option<f64>,
    /// Days the source must keep after the transfer.
    pub minimum_remaining_days: Option<f64>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default = "active")]
    pub is_active: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl QuotaTransferRule {
    /// Whether the rule is active and `today` falls inside its window.
    pub fn is_applicable(&self, today: NaiveDate) -> bool {
        self.is_active
            && self.start_date.map_or(true, |start| start <= today)
            && self.end_date.map_or(true, |end| end >= today)
    }
}

/// A request to move days between two leave types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferQuotaParams {
    pub user_id: String,
    pub source_type: LeaveType,
    pub target_type: LeaveType,
    pub source_amount: f64,
    pub comment: Option<String>,
}

/// Outcome of a simulated or executed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaTransferResult {
    pub success: bool,
    pub source_amount: f64,
    pub target_amount: f64,
    pub source_remaining: f64,
    pub target_total: f64,
    #[serde(default)]
    pub requires_approval: bool,
    pub applied_rule_id: Option<String>,
    pub message: String,
}

/// How a carry-over rule computes the days rolled into the next year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarryOverRuleType {
    /// `value` percent of the remaining days.
    Percentage,
    /// At most `value` days.
    Fixed,
    /// Everything that remains.
    Unlimited,
    /// Everything that remains, expiring after `expiration_days`.
    Expirable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCarryOverRule {
    pub id: String,
    pub leave_type: LeaveType,
    pub rule_type: CarryOverRuleType,
    #[serde(default)]
    pub value: f64,
    pub max_carry_over_days: Option<f64>,
    pub expiration_days: Option<u32>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default = "active")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarryOverParams {
    pub user_id: String,
    pub leave_type: LeaveType,
    pub from_year: i32,
    pub to_year: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarryOverResult {
    pub success: bool,
    /// Days left on the source year before the carry-over.
    pub original_remaining: f64,
    pub eligible_for_carry_over: f64,
    pub carry_over_amount: f64,
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub requires_approval: bool,
    pub message: String,
}

/// Acknowledgement returned by the quota service for an executed
/// carry-over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarryOverRecord {
    pub id: String,
    pub user_id: String,
    pub leave_type: LeaveType,
    pub from_year: i32,
    pub to_year: i32,
    pub days: f64,
    pub expiry_date: Option<NaiveDate>,
    pub recorded_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_leave_type_parses_case_insensitively() {
        assert_eq!("annual".parse::<LeaveType>(), Ok(LeaveType::Annual));
        assert_eq!(" TRAINING ".parse::<LeaveType>(), Ok(LeaveType::Training));
        assert!("holiday".parse::<LeaveType>().is_err());
    }

    #[test]
    fn test_pattern_reads_legacy_occurrence_field() {
        let pattern: RecurrencePattern = serde_json::from_value(json!({
            "frequency": "WEEKLY",
            "interval": 1,
            "weekdays": [1],
            "endType": "COUNT",
            "occurrences": 4
        }))
        .unwrap();
        assert_eq!(pattern.end_count, None);
        assert_eq!(pattern.occurrence_cap(), Some(4));
        assert!(!pattern.skip_weekends);
    }

    #[test]
    fn test_span_days_is_inclusive_and_at_least_one() {
        let mut request = RecurringLeaveRequest {
            id: "r1".into(),
            user_id: "u1".into(),
            leave_type: LeaveType::Annual,
            pattern_start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            pattern_end_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            recurrence_pattern: RecurrencePattern::new(RecurrenceFrequency::Daily, 1),
            reason: None,
            comment: None,
        };
        assert_eq!(request.span_days(), 2);
        request.pattern_end_date = NaiveDate::from_ymd_opt(2023, 12, 25).unwrap();
        assert_eq!(request.span_days(), 1);
    }

    #[test]
    fn test_balance_details_keyed_by_type_name() {
        let balance: LeaveBalance = serde_json::from_value(json!({
            "userId": "u1",
            "year": 2024,
            "initialAllowance": 25.0,
            "additionalAllowance": 2.0,
            "used": 5.0,
            "pending": 1.0,
            "remaining": 21.0,
            "detailsByType": { "ANNUAL": { "used": 5.0, "pending": 1.0 } }
        }))
        .unwrap();
        assert_eq!(balance.details(LeaveType::Annual).used, 5.0);
        assert_eq!(balance.details(LeaveType::Training), TypeDetails::default());
        assert!(!balance.use_simulation);
    }

    #[test]
    fn test_transfer_rule_window() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 6, d).unwrap();
        let rule = QuotaTransferRule {
            id: "t1".into(),
            source_type: LeaveType::Recovery,
            target_type: LeaveType::Annual,
            conversion_rate: 0.5,
            max_transfer_days: None,
            max_transfer_percentage: None,
            minimum_remaining_days: None,
            requires_approval: false,
            is_active: true,
            start_date: Some(day(10)),
            end_date: Some(day(20)),
        };
        assert!(!rule.is_applicable(day(9)));
        assert!(rule.is_applicable(day(10)));
        assert!(rule.is_applicable(day(20)));
        assert!(!rule.is_applicable(day(21)));
        let inactive = QuotaTransferRule { is_active: false, ..rule };
        assert!(!inactive.is_applicable(day(15)));
    }
}
