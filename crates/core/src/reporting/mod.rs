//! Reporting over the funnel events spreadsheet.
//!
//! The sheet is the source of truth for what happened after a meeting was booked.
//! Every row is one event; [`row::parse_rows`] turns the raw grid into [`SheetEvent`]s.

pub mod filter;
pub mod metrics;
pub mod row;

pub use filter::{parse_bound, parse_br_date, DateWindow, EventFilter};
pub use metrics::{compute_metrics, FunnelMetrics, LeadDigest, MetricsFilter};
pub use row::{parse_money, parse_rows, SheetEvent};
