use super::{select_period, Dashboard, PreparedData};
use crate::aggregate::{group_by, group_by_with, Aggregation};
use crate::chart_of_accounts::ChartOfAccounts;
use crate::error::Result;
use crate::metrics::{
    derive_combination, derive_ratio, CustomerKpis, LinearCombination, Ratio, RatioDefinition,
};
use crate::period::{current_and_previous, KpiDelta};
use crate::schema::columns;
use crate::table::{Table, Value};
use log::info;
use serde::Serialize;

pub const TOTAL_EXPENSE: &str = "Total Expense";
pub const REVENUE: &str = "Revenue";
pub const COST_OF_SALES: &str = "Cost of Sales";
pub const TOTAL_DEBT: &str = "Total Debt";
pub const SHAREHOLDERS_EQUITY: &str = "Shareholders Equity";
pub const DEBT_TO_EQUITY: &str = "Debt to Equity Ratio";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewKpis {
    pub customers: KpiDelta,
    pub customer_lifetime_value: KpiDelta,
    pub average_lifespan_days: KpiDelta,
    pub average_revenue_per_user: KpiDelta,
    pub churn_rate: KpiDelta,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewPage {
    pub year: Value,
    pub kpis: OverviewKpis,
    /// Per year: `Total Expense`, `Profit or Loss`, `Revenue`, `Cost of Sales`.
    pub income_statement: Table,
    /// Per year: `Total Debt`, `Shareholders Equity`, `Debt to Equity Ratio`.
    pub debt_and_equity: Table,
    /// Mean CLTV:CAC per month of the selected year. Rows without a discount are left out.
    pub cltv_to_cac_by_month: Table,
}

/// Yearly income statement totals over every period in `statements`.
pub fn income_statement_by_year(statements: &Table, chart: &ChartOfAccounts) -> Result<Table> {
    let with_totals = derive_combination(
        statements,
        TOTAL_EXPENSE,
        &LinearCombination::sum_of(&chart.operating_expenses),
    )?;
    let with_totals =
        derive_combination(&with_totals, REVENUE, &LinearCombination::sum_of(&chart.revenue))?;
    let with_totals = derive_combination(
        &with_totals,
        COST_OF_SALES,
        &LinearCombination::sum_of(&chart.cost_of_sales),
    )?;

    group_by(
        &with_totals,
        &[columns::YEAR],
        &[
            Aggregation::sum(TOTAL_EXPENSE),
            Aggregation::sum(columns::PROFIT_OR_LOSS),
            Aggregation::sum(REVENUE),
            Aggregation::sum(COST_OF_SALES),
        ],
    )
}

/// Yearly debt and equity totals. The ratio is taken between the yearly totals, so it stays
/// comparable across years with a different number of periods.
pub fn debt_and_equity_by_year(statements: &Table, chart: &ChartOfAccounts) -> Result<Table> {
    let with_totals =
        derive_combination(statements, TOTAL_DEBT, &LinearCombination::sum_of(&chart.debt))?;
    let with_totals = derive_combination(
        &with_totals,
        SHAREHOLDERS_EQUITY,
        &LinearCombination::sum_of(&chart.equity),
    )?;

    let yearly = group_by(
        &with_totals,
        &[columns::YEAR],
        &[
            Aggregation::sum(TOTAL_DEBT),
            Aggregation::sum(SHAREHOLDERS_EQUITY),
        ],
    )?;
    let debt = yearly.f64_column(TOTAL_DEBT)?;
    let equity = yearly.f64_column(SHAREHOLDERS_EQUITY)?;
    let ratios = debt
        .into_iter()
        .zip(equity)
        .map(|(d, e)| Ratio::of(d.unwrap_or(0.0), e.unwrap_or(0.0)).to_value())
        .collect();
    yearly.with_column(DEBT_TO_EQUITY, ratios)
}

impl Dashboard {
    pub fn overview(&self, data: &PreparedData, year: &Value) -> Result<OverviewPage> {
        info!("Building overview page for {}", year);
        let revenue_column = data.revenue_column.as_str();
        let (current, previous) = current_and_previous(&data.customer_sales, columns::YEAR, year)?;
        let now = CustomerKpis::compute(&current, revenue_column)?;
        let before = CustomerKpis::compute(&previous, revenue_column)?;

        let kpis = OverviewKpis {
            customers: KpiDelta::new(now.customers as f64, before.customers as f64),
            customer_lifetime_value: KpiDelta::new(
                now.customer_lifetime_value,
                before.customer_lifetime_value,
            ),
            average_lifespan_days: KpiDelta::new(
                now.average_lifespan_days,
                before.average_lifespan_days,
            ),
            average_revenue_per_user: KpiDelta::new(
                now.average_revenue_per_user,
                before.average_revenue_per_user,
            ),
            churn_rate: KpiDelta::new(now.churn_rate, before.churn_rate),
        };

        let chart = &self.config().chart_of_accounts;
        let ratio = RatioDefinition::cltv_to_cac();
        let selected = select_period(&data.customer_sales, year)?;
        let cltv_to_cac_by_month = group_by_with(
            &derive_ratio(&selected, &ratio)?,
            &[columns::MONTH],
            &[Aggregation::mean(ratio.name.as_str())],
            &self.group_options(),
        )?;

        Ok(OverviewPage {
            year: year.clone(),
            kpis,
            income_statement: income_statement_by_year(&data.statements, chart)?,
            debt_and_equity: debt_and_equity_by_year(&data.statements, chart)?,
            cltv_to_cac_by_month,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{assert_close, dashboard, inputs};
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn test_overview_kpis_compare_with_previous_year() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.overview(&data, &Value::Int(2023)).unwrap();

        assert_eq!(page.kpis.customers.current, 2.0);
        assert_eq!(page.kpis.customers.change, Ratio::Value(0.0));
        assert_close(page.kpis.customer_lifetime_value.current, 700.0);
        assert_close(page.kpis.average_revenue_per_user.current, 39.75);
        assert_close(page.kpis.average_revenue_per_user.previous, 40.25);
        assert_eq!(page.kpis.churn_rate.current, 100.0);
        assert_eq!(page.kpis.churn_rate.previous, 50.0);
        assert_eq!(page.kpis.churn_rate.change, Ratio::Value(100.0));
    }

    #[test]
    fn test_earliest_year_compares_with_itself() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.overview(&data, &Value::Int(2022)).unwrap();
        assert_eq!(page.kpis.churn_rate.change, Ratio::Value(0.0));

        let err = dashboard.overview(&data, &Value::Int(2019)).unwrap_err();
        assert_eq!(err, PipelineError::UnknownPeriod("2019".to_string()));
    }

    #[test]
    fn test_yearly_statements() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.overview(&data, &Value::Int(2023)).unwrap();

        let income = &page.income_statement;
        assert_eq!(income.len(), 2);
        assert_eq!(income.value(0, "Year").unwrap(), &Value::Int(2022));
        assert_eq!(income.value(0, TOTAL_EXPENSE).unwrap(), &Value::Float(27.0));
        assert_eq!(income.value(0, REVENUE).unwrap(), &Value::Float(6.0));
        assert_eq!(income.value(1, "Profit or Loss").unwrap(), &Value::Float(7.0));
        assert_eq!(income.value(1, COST_OF_SALES).unwrap(), &Value::Float(7.0));

        let debt = &page.debt_and_equity;
        assert_eq!(debt.value(0, TOTAL_DEBT).unwrap(), &Value::Float(21.0));
        assert_eq!(debt.value(0, SHAREHOLDERS_EQUITY).unwrap(), &Value::Float(9.0));
        assert_close(
            debt.value(1, DEBT_TO_EQUITY).unwrap().as_f64().unwrap(),
            49.0 / 21.0,
        );
    }

    #[test]
    fn test_cltv_to_cac_skips_rows_without_discount() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.overview(&data, &Value::Int(2023)).unwrap();

        let by_month = &page.cltv_to_cac_by_month;
        assert_eq!(by_month.len(), 2);
        assert_eq!(by_month.value(0, "Month").unwrap(), &Value::from("Jan"));
        assert_eq!(by_month.value(0, "CLTV:CAC").unwrap(), &Value::Float(500.0));
        assert!(by_month.value(1, "CLTV:CAC").unwrap().is_null());
    }

    #[test]
    fn test_zero_equity_gives_undefined_ratio() {
        let statements = Table::from_rows(
            "statements",
            vec!["Year", "AP", "Stock"],
            vec![vec![Value::Int(2023), Value::Float(5.0), Value::Float(0.0)]],
        )
        .unwrap();
        let chart = ChartOfAccounts {
            debt: vec!["AP".to_string()],
            equity: vec!["Stock".to_string()],
            ..ChartOfAccounts::standard()
        };
        let table = debt_and_equity_by_year(&statements, &chart).unwrap();
        assert!(table.value(0, DEBT_TO_EQUITY).unwrap().is_null());
    }
}
