//! # BI Dashboard Pipeline
//!
//! The data-transformation core behind a business-intelligence dashboard: raw customer, sales,
//! marketing and financial-statement tables go in, chart-ready aggregate tables and KPIs come out.
//!
//! ## Core Concepts
//!
//! - **Tables**: Row-oriented, immutable [`Table`]s of typed [`Value`]s. Every stage returns a new table
//! - **Normalization**: One configured date column per table becomes `Date`, `Year` and a `Month` abbreviation
//! - **Joins**: Explicit key lists and join policy; colliding columns are suffixed with their source
//! - **Ratios**: A zero denominator yields [`Ratio::Undefined`], never a panic and never a silent 0
//! - **Row-level issues**: Unparseable dates are skipped and counted in a [`NormalizeReport`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use bi_dashboard_pipeline::*;
//!
//! let dashboard = Dashboard::new(PipelineConfig::default())?;
//! let data = dashboard.prepare(&inputs)?;
//! println!("skipped {} rows", data.report.total_skipped_rows());
//!
//! let overview = dashboard.overview(&data, &Value::Int(2023))?;
//! println!("customer change: {:?}", overview.kpis.customers.change);
//! ```

pub mod aggregate;
pub mod chart_of_accounts;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod ingestion;
pub mod join;
pub mod metrics;
pub mod normalizer;
pub mod period;
pub mod schema;
pub mod table;
pub mod utils;

pub use aggregate::{group_by, group_by_with, melt, Aggregation, GroupOptions, Reducer};
pub use chart_of_accounts::{CashFlowCategory, CashFlowMapping, ChartOfAccounts};
pub use config::PipelineConfig;
pub use dashboard::{
    AccountsPage, CustomerReportPage, Dashboard, DashboardInputs, DemandPage, DemandSelection,
    MarketingPage, OverviewPage, PreparationReport, PreparedData, SalesInsightsPage,
};
pub use error::{PipelineError, Result};
pub use ingestion::*;
pub use join::{join, join_all, JoinKind, JoinReport, JoinSpec, Joined};
pub use metrics::{
    ChurnStrategy, ChurnStrategyConfig, CustomerKpis, Ratio, RatioDefinition, SalesKpis,
    SalesMetrics, SampledChurn, ThresholdChurn,
};
pub use normalizer::{normalize_dates, DateSource, NormalizeReport, Normalized, SchemaNormalizer};
pub use period::{compare_periods, current_and_previous, KpiDelta};
pub use schema::*;
pub use table::{KeyAtom, Table, Value};
