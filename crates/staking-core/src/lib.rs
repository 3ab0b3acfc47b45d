//! # Staking Core
//!
//! Staking analytics for the price/staking dashboard.
//!
//! Raw staking events from the API are normalized, then folded into per-type
//! aggregates, a wallet fund-flow summary, a daily timeline, and portfolio
//! performance metrics (P&L, ROI, APR, DCA comparison). Everything here is
//! pure: malformed input degrades to zeros and empty values, never errors.

pub mod aggregate;
pub mod coerce;
pub mod error;
pub mod models;
pub mod normalize;
pub mod performance;
pub mod pipeline;
pub mod timeline;

pub use aggregate::{build_aggregates, build_flow_summary, WALLET_DELTA_THRESHOLD};
pub use coerce::{finite_or_zero, RawNumber, RawTimestamp};
pub use error::*;
pub use models::*;
pub use normalize::normalize_events;
pub use performance::{build_performance_metrics, PerformanceInputs};
pub use pipeline::{analyze, parse_payload, to_json};
pub use timeline::build_timeline_data;
