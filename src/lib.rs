//! Leave Engine library crate.
//!
//! This crate exposes the two engines behind a leave-management
//! front end as reusable modules: the recurrence engine, which expands
//! a recurring leave request into concrete dated occurrences
//! (`recurrence::generate_recurring_dates`), and the quota engine,
//! which derives per-type quotas from a balance and checks, transfers
//! and carries over leave days (`engine::QuotaEngine`).  Outside
//! services plug in through the traits in `ports`; `snapshot` provides
//! an in-memory implementation fed from a JSON file.

pub mod models;
pub mod errors;
pub mod recurrence;
pub mod policy;
pub mod ports;
pub mod simulator;
pub mod engine;
pub mod flow;
pub mod history;
pub mod snapshot;
pub mod config;
