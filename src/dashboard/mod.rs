//! Page-level entry points.
//!
//! [`Dashboard::prepare`] validates and joins the raw tables once; each page method then takes
//! the [`PreparedData`] plus a selection and returns plain tables and scalars ready for a
//! charting layer.

mod accounts;
mod customers;
mod demand;
mod marketing;
mod overview;
mod sales;

#[cfg(test)]
pub(crate) mod fixtures;

pub use accounts::{
    expense_breakdown, expense_totals, AccountsPage, CashSummary, NamedRatio, CASH_GOING_IN,
    CASH_GOING_OUT,
};
pub use customers::{conversion_rate_by_month, repeat_purchase_rate_by_month, CustomerReportPage};
pub use demand::{sales_volume_by_year, DemandPage, DemandSelection, PRICE_SENSITIVITY};
pub use marketing::MarketingPage;
pub use overview::{debt_and_equity_by_year, income_statement_by_year, OverviewKpis, OverviewPage};
pub use sales::SalesInsightsPage;

use crate::aggregate::GroupOptions;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingestion::{validate_table, TableKind};
use crate::join::{join, join_all, JoinKind, JoinReport, JoinSpec};
use crate::metrics::{classify_churn, price_elasticity, shipping_and_tax_ratio};
use crate::normalizer::NormalizeReport;
use crate::schema::columns;
use crate::table::{Table, Value};
use log::{info, warn};
use std::collections::BTreeMap;

pub const SALES_SOURCE: &str = "sales";
pub const CUSTOMER_SOURCE: &str = "customers";

/// Statements are matched period by period on these columns.
pub const STATEMENT_KEYS: [&str; 3] = [columns::VALUATION_DATE, columns::YEAR, columns::MONTH];

/// Raw tables as handed over by the loading layer.
#[derive(Debug, Clone)]
pub struct DashboardInputs {
    pub customers: Table,
    pub sales: Table,
    pub marketing_events: Table,
    pub media_spend: Table,
    pub income: Table,
    pub balance: Table,
    pub cash_flow: Table,
    /// Per-product demand data; the demand page is unavailable without it.
    pub products: Option<Table>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreparationReport {
    /// Normalization outcome per prepared table.
    pub normalization: BTreeMap<String, NormalizeReport>,
    pub customer_join: JoinReport,
    /// Sales rows lost because their customer is unknown (non-zero only for inner joins).
    pub dropped_sales_rows: usize,
    pub statement_join: JoinReport,
}

impl PreparationReport {
    pub fn skipped_rows(&self, table: &str) -> usize {
        self.normalization
            .get(table)
            .map(|r| r.skipped_rows)
            .unwrap_or(0)
    }

    pub fn total_skipped_rows(&self) -> usize {
        self.normalization.values().map(|r| r.skipped_rows).sum()
    }

    fn record(&mut self, table: &str, report: NormalizeReport) {
        self.normalization.insert(table.to_string(), report);
    }
}

#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Sales joined with customers, date-normalized, with the configured churn flag.
    pub customer_sales: Table,
    /// Column of `customer_sales` holding the per-transaction revenue.
    pub revenue_column: String,
    pub marketing_events: Table,
    pub media_spend: Table,
    /// Income, balance and cash-flow statements outer-joined per period.
    pub statements: Table,
    /// Demand data with elasticity and shipping/tax ratio columns.
    pub products: Option<Table>,
    pub report: PreparationReport,
}

impl PreparedData {
    /// Distinct years present in the customer/sales data, ascending.
    pub fn years(&self) -> Result<Vec<Value>> {
        Ok(self
            .customer_sales
            .distinct(columns::YEAR)?
            .iter()
            .map(|k| k.to_value())
            .collect())
    }
}

pub struct Dashboard {
    config: PipelineConfig,
}

impl Dashboard {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn group_options(&self) -> GroupOptions {
        GroupOptions::with_months(&self.config.months)
    }

    pub fn prepare(&self, inputs: &DashboardInputs) -> Result<PreparedData> {
        validate_table(&inputs.customers, TableKind::Customers)?;
        validate_table(&inputs.sales, TableKind::Sales)?;
        validate_table(&inputs.marketing_events, TableKind::MarketingEvents)?;
        validate_table(&inputs.media_spend, TableKind::MediaSpend)?;
        validate_table(&inputs.income, TableKind::IncomeStatement)?;
        validate_table(&inputs.balance, TableKind::BalanceSheet)?;
        validate_table(&inputs.cash_flow, TableKind::CashFlow)?;

        let normalizer = self.config.normalizer();
        let mut report = PreparationReport::default();

        // Sales on the left so the join can only shrink the transaction set.
        let spec = JoinSpec::new(vec![columns::CUSTOMER_ID], self.config.customer_join)
            .with_sources(SALES_SOURCE, CUSTOMER_SOURCE);
        let joined = join(&inputs.sales, &inputs.customers, &spec)?;
        if self.config.customer_join == JoinKind::Inner {
            report.dropped_sales_rows = joined.report.unmatched_left;
        }
        report.customer_join = joined.report;

        let normalized = normalizer.normalize(&joined.table)?;
        report.record("customer_sales", normalized.report);
        let churn = self.config.churn.build();
        let customer_sales =
            classify_churn(&normalized.table, churn.as_ref())?.with_name("customer_sales");
        let revenue_column = resolve_column(&customer_sales, columns::TOTAL_REVENUE, SALES_SOURCE);

        let events = normalizer.normalize(&inputs.marketing_events)?;
        report.record("marketing_events", events.report);
        let media = normalizer.normalize(&inputs.media_spend)?;
        report.record("media_spend", media.report);

        let mut frames = Vec::with_capacity(3);
        for (source, table) in [
            ("income", &inputs.income),
            ("balance", &inputs.balance),
            ("cash_flow", &inputs.cash_flow),
        ] {
            let normalized = normalizer.normalize(table)?;
            report.record(source, normalized.report);
            // `Date` duplicates `Valuation Date` after normalization; keep it out of the join.
            frames.push((normalized.table.drop_columns(&[columns::DATE]), source));
        }
        let sources: Vec<(&Table, &str)> = frames.iter().map(|(t, s)| (t, *s)).collect();
        let keys: Vec<String> = STATEMENT_KEYS.iter().map(|k| k.to_string()).collect();
        let statements = join_all(&sources, &keys, JoinKind::FullOuter)?;
        report.statement_join = statements.report;
        let statements = statements
            .table
            .sort_by_columns(&[columns::VALUATION_DATE])?
            .with_name("statements");

        let products = match &inputs.products {
            Some(table) => {
                validate_table(table, TableKind::Demand)?;
                let normalized = normalizer.normalize(table)?;
                report.record("products", normalized.report);
                let with_elasticity = price_elasticity(&normalized.table, &self.config.elasticity)?;
                Some(shipping_and_tax_ratio(&with_elasticity)?.with_name("products"))
            }
            None => None,
        };

        let skipped = report.total_skipped_rows();
        if skipped > 0 {
            warn!("Preparation skipped {} rows with unreadable dates", skipped);
        }
        info!(
            "Prepared dashboard data: {} transactions ({} dropped by the customer join), {} statement periods",
            customer_sales.len(),
            report.dropped_sales_rows,
            statements.len()
        );

        Ok(PreparedData {
            customer_sales,
            revenue_column,
            marketing_events: events.table,
            media_spend: media.table,
            statements,
            products,
            report,
        })
    }
}

/// `column` itself if the join left it alone, otherwise its suffixed copy from `source`.
fn resolve_column(table: &Table, column: &str, source: &str) -> String {
    if table.has_column(column) {
        column.to_string()
    } else {
        format!("{}_{}", column, source)
    }
}

/// Rows of `table` in the selected year; `UnknownPeriod` if the year has no rows.
pub(crate) fn select_period(table: &Table, year: &Value) -> Result<Table> {
    let key = year.key();
    if !table.distinct(columns::YEAR)?.contains(&key) {
        return Err(PipelineError::UnknownPeriod(year.to_string()));
    }
    table.filter_in(columns::YEAR, std::slice::from_ref(year))
}

/// Rows of `table` whose year is one of `years`; every row when `years` is empty.
pub(crate) fn select_years(table: &Table, years: &[i64]) -> Result<Table> {
    if years.is_empty() {
        return Ok(table.clone());
    }
    let allowed: Vec<Value> = years.iter().map(|y| Value::Int(*y)).collect();
    table.filter_in(columns::YEAR, &allowed)
}

#[cfg(test)]
mod tests {
    use super::fixtures::{dashboard, inputs};
    use super::*;

    #[test]
    fn test_prepare_reports_dropped_and_skipped_rows() {
        let data = dashboard().prepare(&inputs()).unwrap();

        assert_eq!(data.report.dropped_sales_rows, 1);
        assert_eq!(data.customer_sales.len(), 5);
        assert_eq!(data.revenue_column, "Total Revenue_sales");
        assert!(data.customer_sales.has_column("Total Revenue_customers"));
        assert_eq!(data.report.skipped_rows("marketing_events"), 1);
        assert_eq!(data.marketing_events.len(), 4);
        assert_eq!(data.statements.len(), 4);
        assert_eq!(data.years().unwrap(), vec![Value::Int(2022), Value::Int(2023)]);
    }

    #[test]
    fn test_left_outer_customer_join_keeps_unknown_customers() {
        let config = PipelineConfig {
            customer_join: JoinKind::LeftOuter,
            ..PipelineConfig::default()
        };
        let data = Dashboard::new(config).unwrap().prepare(&inputs()).unwrap();
        assert_eq!(data.customer_sales.len(), 6);
        assert_eq!(data.report.dropped_sales_rows, 0);
    }

    #[test]
    fn test_statements_are_joined_without_collisions() {
        let data = dashboard().prepare(&inputs()).unwrap();
        let statements = &data.statements;
        assert!(statements.has_column("Rev"));
        assert!(statements.has_column("Cash"));
        assert!(statements.has_column("New Stock Sold"));
        assert!(!statements.has_column("Date"));
        assert!(data.report.statement_join.renamed_columns.is_empty());
    }

    #[test]
    fn test_missing_header_aborts_prepare() {
        let mut broken = inputs();
        broken.sales = broken.sales.rename_column("Units Sold", "units sold").unwrap();
        let err = dashboard().prepare(&broken).unwrap_err();
        assert_eq!(err, PipelineError::schema_mismatch("sales", "Units Sold"));
    }
}
