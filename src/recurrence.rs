//! Recurring leave generation.
//!
//! The `recurrence` module turns a [`RecurringLeaveRequest`] into the
//! concrete leaves it implies.  Generation scans the calendar one day
//! at a time from the pattern start, accepting a day when it satisfies
//! the pattern's weekday/month constraints and exclusion flags, then
//! steps forward by the pattern's frequency.  Two safety caps bound
//! every run: a maximum number of occurrences and a horizon measured
//! from the reference date.  Hitting a cap truncates the result
//! silently; it is not an error.
//!
//! Batches of requests can be previewed in parallel with
//! [`preview_batch`], which uses [`rayon`] to spread independent
//! generations across CPU cores.

use crate::models::{
    GenerateRecurringResult, GeneratedLeave, RecurrenceEndType, RecurrenceFrequency,
    RecurrencePattern, RecurringLeaveRequest,
};
use chrono::{Datelike, Days, Local, Months, NaiveDate, Weekday};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_MAX_OCCURRENCES: usize = 50;
pub const DEFAULT_MAX_GENERATION_YEARS: u32 = 2;

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Options controlling a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    /// Dates excluded when the pattern skips holidays.  Always
    /// excluded from business-day accounting.
    pub holidays: Vec<NaiveDate>,
    /// Hard cap on the number of generated occurrences.
    pub max_occurrences: usize,
    /// Hard cap on how far past `reference_date` generation may run.
    pub max_generation_years: u32,
    /// The "now" the horizon is measured from.
    pub reference_date: NaiveDate,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            holidays: Vec::new(),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            max_generation_years: DEFAULT_MAX_GENERATION_YEARS,
            reference_date: Local::now().date_naive(),
        }
    }
}

impl GenerateOptions {
    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = reference_date;
        self
    }

    /// Last date an occurrence may start on.
    pub fn horizon(&self) -> NaiveDate {
        self.reference_date
            .checked_add_months(Months::new(self.max_generation_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MAX)
    }
}

/// Whether `date` falls on the same calendar day as any entry of
/// `holidays`.  Time of day, when present, is ignored.
pub fn is_holiday<D: Datelike, H: Datelike>(date: &D, holidays: &[H]) -> bool {
    holidays
        .iter()
        .any(|h| h.year() == date.year() && h.ordinal() == date.ordinal())
}

pub fn is_weekend<D: Datelike>(date: &D) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Week of the month a date falls in, counting days 1-7 as week 1.
pub fn week_of_month<D: Datelike>(date: &D) -> u32 {
    (date.day() - 1) / 7 + 1
}

fn weekday_ordinal<D: Datelike>(date: &D) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// Days in `[start, end]` that are neither weekends nor holidays.
///
/// Whole weeks are counted arithmetically, so the cost does not grow
/// with the length of the range.  Duplicate holidays count once.
pub fn count_business_days(start: NaiveDate, end: NaiveDate, holidays: &[NaiveDate]) -> u32 {
    if end < start {
        return 0;
    }
    let days = (end - start).num_days() + 1;
    let full_weeks = days / 7;
    let remainder = (days % 7) as usize;
    let tail = start
        .checked_add_days(Days::new(full_weeks as u64 * 7))
        .map_or(0, |tail| {
            tail.iter_days()
                .take(remainder)
                .filter(|day| !is_weekend(day))
                .count() as i64
        });

    let mut closed: Vec<NaiveDate> = holidays
        .iter()
        .copied()
        .filter(|day| *day >= start && *day <= end && !is_weekend(day))
        .collect();
    closed.sort_unstable();
    closed.dedup();

    let count = full_weeks * 5 + tail - closed.len() as i64;
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

/// Whether `date` may start an occurrence of `pattern`.
fn is_candidate(date: NaiveDate, pattern: &RecurrencePattern, holidays: &[NaiveDate]) -> bool {
    match pattern.frequency {
        RecurrenceFrequency::Weekly if !pattern.weekdays.is_empty() => {
            if !pattern.weekdays.contains(&weekday_ordinal(&date)) {
                return false;
            }
        }
        RecurrenceFrequency::Monthly => {
            if pattern.day_of_month.map_or(false, |day| date.day() != day) {
                return false;
            }
            if pattern
                .week_of_month
                .map_or(false, |week| week_of_month(&date) != week)
            {
                return false;
            }
        }
        _ => {}
    }
    if pattern.skip_weekends && is_weekend(&date) {
        return false;
    }
    if pattern.skip_holidays && is_holiday(&date, holidays) {
        return false;
    }
    true
}

fn next_start(current: NaiveDate, pattern: &RecurrencePattern) -> Option<NaiveDate> {
    let interval = pattern.interval.max(1);
    match pattern.frequency {
        RecurrenceFrequency::Daily => current.checked_add_days(Days::new(u64::from(interval))),
        RecurrenceFrequency::Weekly => current.checked_add_days(Days::new(7 * u64::from(interval))),
        RecurrenceFrequency::Monthly => current.checked_add_months(Months::new(interval)),
        RecurrenceFrequency::Yearly => {
            current.checked_add_months(Months::new(interval.saturating_mul(12)))
        }
    }
}

fn termination_reached(pattern: &RecurrencePattern, generated: usize, current: NaiveDate) -> bool {
    match pattern.end_type {
        RecurrenceEndType::Never => false,
        RecurrenceEndType::Count => pattern
            .occurrence_cap()
            .map_or(true, |cap| generated >= cap as usize),
        RecurrenceEndType::UntilDate => pattern.end_date.map_or(true, |end| current >= end),
    }
}

/// Enumerates the occurrences of a recurring request.
///
/// Every occurrence spans as many days as the base request.  The
/// result also carries the total calendar days and the business days
/// (weekends and `options.holidays` excluded, whatever the pattern's
/// own skip flags say).
pub fn generate_recurring_dates(
    request: &RecurringLeaveRequest,
    options: &GenerateOptions,
) -> GenerateRecurringResult {
    let pattern = &request.recurrence_pattern;
    let span = request.span_days();
    let horizon = options.horizon();
    let mut result = GenerateRecurringResult::default();
    let mut current = request.pattern_start_date;

    while result.occurrences.len() < options.max_occurrences {
        if termination_reached(pattern, result.occurrences.len(), current) {
            break;
        }
        if current > horizon {
            debug!(
                request_id = %request.id,
                %horizon,
                generated = result.occurrences.len(),
                "generation horizon reached"
            );
            break;
        }
        if !is_candidate(current, pattern, &options.holidays) {
            match current.succ_opt() {
                Some(next) => current = next,
                None => break,
            }
            continue;
        }

        let Some(end_date) = current.checked_add_days(Days::new((span - 1) as u64)) else {
            break;
        };
        result.total_days = result
            .total_days
            .saturating_add(u32::try_from(span).unwrap_or(u32::MAX));
        result.business_days = result
            .business_days
            .saturating_add(count_business_days(current, end_date, &options.holidays));
        result.occurrences.push(GeneratedLeave {
            start_date: current,
            end_date,
            user_id: request.user_id.clone(),
            leave_type: request.leave_type,
            reason: request.reason.clone(),
            comment: request.comment.clone(),
            parent_request_id: request.id.clone(),
            counted_days: 0.0,
        });

        match next_start(current, pattern) {
            Some(next) => current = next,
            None => break,
        }
    }

    if result.occurrences.len() == options.max_occurrences {
        debug!(
            request_id = %request.id,
            max = options.max_occurrences,
            "occurrence cap reached"
        );
    }
    result
}

/// Generates several recurring requests in parallel.  Results are
/// returned in the order of `requests`.
pub fn preview_batch(
    requests: &[RecurringLeaveRequest],
    options: &GenerateOptions,
) -> Vec<GenerateRecurringResult> {
    requests
        .par_iter()
        .map(|request| generate_recurring_dates(request, options))
        .collect()
}

fn plural(count: u32, singular: &str, plural: &str) -> String {
    if count == 1 {
        singular.to_string()
    } else {
        format!("{} {}", count, plural)
    }
}

/// Human-readable description of a pattern, e.g.
/// `"Every 2 weeks on Monday, Thursday, 6 times, excluding holidays"`.
pub fn format_recurrence_pattern(pattern: &RecurrencePattern) -> String {
    let interval = pattern.interval.max(1);
    let mut text = match pattern.frequency {
        RecurrenceFrequency::Daily => format!("Every {}", plural(interval, "day", "days")),
        RecurrenceFrequency::Weekly => format!("Every {}", plural(interval, "week", "weeks")),
        RecurrenceFrequency::Monthly => format!("Every {}", plural(interval, "month", "months")),
        RecurrenceFrequency::Yearly => format!("Every {}", plural(interval, "year", "years")),
    };

    match pattern.frequency {
        RecurrenceFrequency::Weekly => {
            let mut days: Vec<u8> = pattern.weekdays.clone();
            days.sort_unstable();
            days.dedup();
            let names: Vec<&str> = days
                .iter()
                .filter_map(|d| WEEKDAY_NAMES.get(usize::from(*d)).copied())
                .collect();
            if !names.is_empty() {
                text.push_str(" on ");
                text.push_str(&names.join(", "));
            }
        }
        RecurrenceFrequency::Monthly => {
            if let Some(day) = pattern.day_of_month {
                text.push_str(&format!(" on day {}", day));
            } else if let Some(week) = pattern.week_of_month {
                text.push_str(&format!(" in week {}", week));
            }
        }
        _ => {}
    }

    match pattern.end_type {
        RecurrenceEndType::Never => text.push_str(", with no end date"),
        RecurrenceEndType::Count => {
            if let Some(count) = pattern.occurrence_cap() {
                let times = if count == 1 { "time" } else { "times" };
                text.push_str(&format!(", {} {}", count, times));
            }
        }
        RecurrenceEndType::UntilDate => {
            if let Some(end) = pattern.end_date {
                text.push_str(&format!(", until {}", end.format("%d/%m/%Y")));
            }
        }
    }

    match (pattern.skip_weekends, pattern.skip_holidays) {
        (true, true) => text.push_str(", excluding weekends and holidays"),
        (true, false) => text.push_str(", excluding weekends"),
        (false, true) => text.push_str(", excluding holidays"),
        (false, false) => {}
    }
    text
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternIssueKind {
    InvalidPattern,
    InvalidEndDate,
    TooManyOccurrences,
    InvalidRange,
}

/// A problem with a recurring request, tied to the offending field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternIssue {
    pub field: &'static str,
    pub kind: PatternIssueKind,
    pub message: String,
}

impl PatternIssue {
    fn new(field: &'static str, kind: PatternIssueKind, message: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            message: message.into(),
        }
    }
}

/// Checks a recurring request for inputs the generator would
/// silently mishandle.  An empty list means the request is usable.
pub fn validate_recurrence_pattern(
    request: &RecurringLeaveRequest,
    options: &GenerateOptions,
) -> Vec<PatternIssue> {
    use PatternIssueKind::*;

    let pattern = &request.recurrence_pattern;
    let mut issues = Vec::new();

    if request.pattern_end_date < request.pattern_start_date {
        issues.push(PatternIssue::new(
            "patternEndDate",
            InvalidRange,
            "The leave must end on or after its start date",
        ));
    }
    if pattern.interval < 1 {
        issues.push(PatternIssue::new(
            "interval",
            InvalidPattern,
            "The interval must be a positive integer",
        ));
    }

    match pattern.end_type {
        RecurrenceEndType::Count => match pattern.occurrence_cap() {
            None | Some(0) => issues.push(PatternIssue::new(
                "endCount",
                InvalidPattern,
                "The number of occurrences must be a positive integer",
            )),
            Some(count) if count as usize > options.max_occurrences => {
                issues.push(PatternIssue::new(
                    "endCount",
                    TooManyOccurrences,
                    format!(
                        "The number of occurrences cannot exceed {}",
                        options.max_occurrences
                    ),
                ))
            }
            Some(_) => {}
        },
        RecurrenceEndType::UntilDate => match pattern.end_date {
            None => issues.push(PatternIssue::new(
                "endDate",
                InvalidEndDate,
                "An end date is required",
            )),
            Some(end) if end > options.horizon() => issues.push(PatternIssue::new(
                "endDate",
                InvalidEndDate,
                format!(
                    "The end date cannot be more than {} years ahead",
                    options.max_generation_years
                ),
            )),
            Some(_) => {}
        },
        RecurrenceEndType::Never => {}
    }

    match pattern.frequency {
        RecurrenceFrequency::Weekly => {
            if pattern.weekdays.is_empty() {
                issues.push(PatternIssue::new(
                    "weekdays",
                    InvalidPattern,
                    "At least one weekday must be selected",
                ));
            } else if pattern.weekdays.iter().any(|d| *d > 6) {
                issues.push(PatternIssue::new(
                    "weekdays",
                    InvalidPattern,
                    "Weekdays must be between 0 (Sunday) and 6 (Saturday)",
                ));
            }
        }
        RecurrenceFrequency::Monthly => {
            if pattern
                .day_of_month
                .map_or(false, |day| !(1..=31).contains(&day))
            {
                issues.push(PatternIssue::new(
                    "dayOfMonth",
                    InvalidPattern,
                    "The day of month must be between 1 and 31",
                ));
            }
            if pattern
                .week_of_month
                .map_or(false, |week| !(1..=5).contains(&week))
            {
                issues.push(PatternIssue::new(
                    "weekOfMonth",
                    InvalidPattern,
                    "The week of month must be between 1 and 5",
                ));
            }
        }
        _ => {}
    }
    issues
}
