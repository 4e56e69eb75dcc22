//! MLM network and commission engine.
//!
//! A platform config describes a compensation plan (binary, trinity, or
//! unilevel), a rank ladder, bonus programs, and withdrawal policy. The
//! engine places members into a forest, aggregates order volume per
//! period, calculates commissions and rank changes off one snapshot, and
//! posts the results to an exactly-once wallet ledger in SQLite.
//!
//! Period runs are idempotent end to end: recomputation diffs against
//! stored commission rows instead of duplicating them, and ledger credits
//! carry natural keys so a rerun never pays twice.

pub mod cli;
pub mod engine;
pub mod example;
pub mod graph;
pub mod model;
pub mod report;
pub mod run_period;
pub mod schema;
pub mod sim;
pub mod source;
pub mod store;
pub mod validate;
pub mod withdraw;
