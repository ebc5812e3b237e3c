//! Transfer history records and list helpers.
//!
//! Sorting and filtering go through closed enums with one explicit
//! accessor per field, so an unknown column is a compile error rather
//! than a silently ignored key.

use crate::models::{LeaveType, QuotaTransferResult, TransferQuotaParams};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Completed,
}

/// Immutable record of an executed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferHistory {
    pub id: String,
    pub user_id: String,
    pub source_type: LeaveType,
    pub target_type: LeaveType,
    pub days_debited: f64,
    pub days_credited: f64,
    pub reason: Option<String>,
    pub recorded_at: NaiveDateTime,
    pub status: TransactionStatus,
}

impl TransferHistory {
    /// Record for a successful transfer.  Transfers whose rule needs
    /// approval start out pending.
    pub fn from_result(
        id: String,
        request: &TransferQuotaParams,
        result: &QuotaTransferResult,
        recorded_at: NaiveDateTime,
    ) -> Self {
        let status = if result.requires_approval {
            TransactionStatus::Pending
        } else {
            TransactionStatus::Completed
        };
        Self {
            id,
            user_id: request.user_id.clone(),
            source_type: request.source_type,
            target_type: request.target_type,
            days_debited: result.source_amount,
            days_credited: result.target_amount,
            reason: request.comment.clone(),
            recorded_at,
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HistorySortField {
    RecordedAt,
    SourceType,
    TargetType,
    DaysDebited,
    DaysCredited,
    Status,
}

impl HistorySortField {
    pub fn compare(&self, a: &TransferHistory, b: &TransferHistory) -> Ordering {
        match self {
            HistorySortField::RecordedAt => a.recorded_at.cmp(&b.recorded_at),
            HistorySortField::SourceType => a.source_type.cmp(&b.source_type),
            HistorySortField::TargetType => a.target_type.cmp(&b.target_type),
            HistorySortField::DaysDebited => a.days_debited.total_cmp(&b.days_debited),
            HistorySortField::DaysCredited => a.days_credited.total_cmp(&b.days_credited),
            HistorySortField::Status => a.status.cmp(&b.status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Stable sort of `records` by one field.
pub fn sort_history(records: &mut [TransferHistory], field: HistorySortField, direction: SortDirection) {
    records.sort_by(|a, b| {
        let ordering = field.compare(a, b);
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}

/// Conjunction of optional criteria; an empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    /// Matches either side of the transfer.
    pub leave_type: Option<LeaveType>,
    pub status: Option<TransactionStatus>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl HistoryFilter {
    pub fn matches(&self, record: &TransferHistory) -> bool {
        let day = record.recorded_at.date();
        self.leave_type
            .map_or(true, |t| record.source_type == t || record.target_type == t)
            && self.status.map_or(true, |s| record.status == s)
            && self.from.map_or(true, |from| day >= from)
            && self.to.map_or(true, |to| day <= to)
    }
}

pub fn filter_history<'a>(
    records: &'a [TransferHistory],
    filter: &HistoryFilter,
) -> Vec<&'a TransferHistory> {
    records.iter().filter(|r| filter.matches(r)).collect()
}
