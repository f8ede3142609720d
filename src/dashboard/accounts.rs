use super::{select_years, Dashboard, PreparedData};
use crate::aggregate::{group_by, group_by_with, melt, Aggregation};
use crate::chart_of_accounts::{ChartOfAccounts, CASH};
use crate::error::Result;
use crate::metrics::{
    cash_flow_breakdown, derive_combination, derive_ratios, ratio_mean, LinearCombination, Ratio,
    RatioDefinition,
};
use crate::schema::columns;
use crate::table::{Table, Value};
use log::{debug, info};
use serde::Serialize;

pub const CASH_GOING_IN: &str = "Cash Going In";
pub const CASH_GOING_OUT: &str = "Cash Going Out";
pub const EXPENSE: &str = "Expense";
pub const AMOUNT: &str = "Amount";
pub const ACCOUNTS_RECEIVABLE: &str = "AR";
pub const ACCOUNTS_PAYABLE: &str = "AP";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRatio {
    pub name: String,
    pub value: Ratio,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CashSummary {
    /// Cash balance of the earliest selected period; 0 without any reported balance.
    pub beginning_cash: f64,
    pub cash_going_in: f64,
    pub cash_going_out: f64,
    pub profit_or_loss: f64,
    pub ending_cash: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountsPage {
    pub years: Vec<i64>,
    /// Mean of each per-period ratio over the selection.
    pub ratios: Vec<NamedRatio>,
    pub expense_totals: Table,
    pub expense_breakdown: Table,
    pub cash: CashSummary,
    /// Per month: last cash balance, cash in and cash out.
    pub monthly_cash_flow: Table,
    pub cash_flow_breakdown: Table,
    pub receivables_by_month: Table,
    pub total_receivables: f64,
    pub payables_by_month: Table,
    pub total_payables: f64,
    pub profit_and_loss_by_month: Table,
}

/// Total per expense category, smallest first.
pub fn expense_totals(statements: &Table, chart: &ChartOfAccounts) -> Result<Table> {
    let categories: Vec<&str> = chart.expense_categories.iter().map(String::as_str).collect();
    let long = melt(
        statements,
        &[columns::VALUATION_DATE],
        &categories,
        EXPENSE,
        AMOUNT,
    )?;
    group_by(&long, &[EXPENSE], &[Aggregation::sum(AMOUNT)])?.sort_by_f64(AMOUNT, false)
}

/// Operating expenses, cost of sales, revenue lines and tax, each summed over every period.
pub fn expense_breakdown(statements: &Table, chart: &ChartOfAccounts) -> Result<Table> {
    let groups: [(&str, &[String]); 4] = [
        ("Operating Expense", &chart.operating_expenses),
        ("CoGS", &chart.cost_of_sales),
        ("Revenue & Allowance", &chart.revenue),
        ("Tax Expense", &chart.tax_expenses),
    ];
    let mut out = Table::new("expense_breakdown", vec![EXPENSE, AMOUNT]);
    for (label, fields) in groups {
        let total = derive_combination(statements, AMOUNT, &LinearCombination::sum_of(fields))?
            .sum(AMOUNT)?;
        out.push_row(vec![label.into(), Value::Float(total)])?;
    }
    Ok(out)
}

fn first_cash_balance(statements: &Table) -> Result<f64> {
    let sorted = statements.sort_by_columns(&[columns::VALUATION_DATE])?;
    Ok(sorted
        .f64_column(CASH)?
        .into_iter()
        .flatten()
        .next()
        .unwrap_or(0.0))
}

impl Dashboard {
    /// `years` empty means every year.
    pub fn accounts(&self, data: &PreparedData, years: &[i64]) -> Result<AccountsPage> {
        info!("Building accounts page for years {:?}", years);
        let chart = &self.config().chart_of_accounts;
        let statements = select_years(&data.statements, years)?
            .sort_by_columns(&[columns::VALUATION_DATE])?;
        debug!("{} statement periods selected", statements.len());

        let definitions = RatioDefinition::accounts_set(chart);
        let with_ratios = derive_ratios(&statements, &definitions)?;
        let ratios = definitions
            .iter()
            .map(|d| -> Result<NamedRatio> {
                Ok(NamedRatio {
                    name: d.name.clone(),
                    value: ratio_mean(&with_ratios, &d.name)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let flows = derive_combination(
            &statements,
            CASH_GOING_IN,
            &LinearCombination::sum_of(&chart.cash_in),
        )?;
        let flows = derive_combination(
            &flows,
            CASH_GOING_OUT,
            &LinearCombination::sum_of(&chart.cash_out),
        )?;

        let beginning_cash = first_cash_balance(&statements)?;
        let cash_going_in = flows.sum(CASH_GOING_IN)?;
        let cash_going_out = flows.sum(CASH_GOING_OUT)?;
        let cash = CashSummary {
            beginning_cash,
            cash_going_in,
            cash_going_out,
            profit_or_loss: statements.sum(columns::PROFIT_OR_LOSS)?,
            ending_cash: beginning_cash + cash_going_in - cash_going_out,
        };

        let calendar = self.group_options().fill_calendar();
        let monthly = |column: &str| {
            group_by_with(
                &statements,
                &[columns::MONTH],
                &[Aggregation::sum(column)],
                &calendar,
            )
        };
        let monthly_cash_flow = group_by_with(
            &flows,
            &[columns::MONTH],
            &[
                Aggregation::last(CASH),
                Aggregation::sum(CASH_GOING_IN),
                Aggregation::sum(CASH_GOING_OUT),
            ],
            &calendar,
        )?;

        Ok(AccountsPage {
            years: years.to_vec(),
            ratios,
            expense_totals: expense_totals(&statements, chart)?,
            expense_breakdown: expense_breakdown(&statements, chart)?,
            cash,
            monthly_cash_flow,
            cash_flow_breakdown: cash_flow_breakdown(&statements, &self.config().cash_flow)?,
            receivables_by_month: monthly(ACCOUNTS_RECEIVABLE)?,
            total_receivables: statements.sum(ACCOUNTS_RECEIVABLE)?,
            payables_by_month: monthly(ACCOUNTS_PAYABLE)?,
            total_payables: statements.sum(ACCOUNTS_PAYABLE)?,
            profit_and_loss_by_month: monthly(columns::PROFIT_OR_LOSS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{dashboard, inputs};
    use super::*;

    fn page(years: &[i64]) -> AccountsPage {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        dashboard.accounts(&data, years).unwrap()
    }

    #[test]
    fn test_ratio_kpis() {
        let page = page(&[2023]);
        let by_name = |name: &str| {
            page.ratios
                .iter()
                .find(|r| r.name == name)
                .map(|r| r.value)
                .unwrap()
        };
        assert_eq!(page.ratios.len(), 6);
        assert_eq!(by_name("Gross Profit Margin"), Ratio::Value(0.0));
        assert_eq!(by_name("Operating Profit Margin"), Ratio::Value(-600.0));
        assert_eq!(by_name("Net Profit Margin"), Ratio::Value(0.0));
        assert_eq!(by_name("ROI"), Ratio::Value(50.0));
        assert_eq!(by_name("Expense-to-Revenue Ratio"), Ratio::Value(700.0));
        assert_eq!(by_name("ROA"), Ratio::Value(100.0));
    }

    #[test]
    fn test_cash_summary() {
        let cash = page(&[2023]).cash;
        assert_eq!(cash.beginning_cash, 3.0);
        assert_eq!(cash.cash_going_in, 28.0);
        assert_eq!(cash.cash_going_out, 91.0);
        assert_eq!(cash.profit_or_loss, 7.0);
        assert_eq!(cash.ending_cash, -60.0);

        let all = page(&[]).cash;
        assert_eq!(all.beginning_cash, 1.0);
        assert_eq!(all.cash_going_in, 40.0);
    }

    #[test]
    fn test_monthly_tables_cover_the_calendar() {
        let page = page(&[2023]);
        let monthly = &page.monthly_cash_flow;
        assert_eq!(monthly.len(), 12);
        assert_eq!(monthly.value(0, "Cash").unwrap(), &Value::Float(3.0));
        assert_eq!(monthly.value(0, CASH_GOING_IN).unwrap(), &Value::Float(12.0));
        assert_eq!(monthly.value(1, CASH_GOING_OUT).unwrap(), &Value::Float(52.0));
        assert!(monthly.value(2, "Cash").unwrap().is_null());
        assert_eq!(monthly.value(2, CASH_GOING_IN).unwrap(), &Value::Float(0.0));

        assert_eq!(page.receivables_by_month.len(), 12);
        assert_eq!(page.receivables_by_month.value(1, "AR").unwrap(), &Value::Float(4.0));
        assert_eq!(page.total_receivables, 7.0);
        assert_eq!(page.total_payables, 7.0);
        assert_eq!(
            page.profit_and_loss_by_month.value(11, "Profit or Loss").unwrap(),
            &Value::Float(0.0)
        );
    }

    #[test]
    fn test_expense_tables() {
        let page = page(&[2023]);
        assert_eq!(page.expense_totals.len(), 12);
        assert_eq!(page.expense_totals.value(0, AMOUNT).unwrap(), &Value::Float(7.0));

        let breakdown = &page.expense_breakdown;
        assert_eq!(breakdown.value(0, AMOUNT).unwrap(), &Value::Float(63.0));
        assert_eq!(breakdown.value(1, AMOUNT).unwrap(), &Value::Float(7.0));
        assert_eq!(breakdown.value(2, EXPENSE).unwrap(), &Value::from("Revenue & Allowance"));
        assert_eq!(breakdown.value(2, AMOUNT).unwrap(), &Value::Float(14.0));
        assert_eq!(breakdown.value(3, AMOUNT).unwrap(), &Value::Float(7.0));
    }

    #[test]
    fn test_cash_flow_breakdown_buckets() {
        let breakdown = page(&[2023]).cash_flow_breakdown;
        assert_eq!(breakdown.value(0, "Category").unwrap(), &Value::from("Total Cash Flow"));
        assert_eq!(breakdown.value(0, "Amount").unwrap(), &Value::Float(238.0));
        assert_eq!(breakdown.value(1, "Amount").unwrap(), &Value::Float(147.0));
        assert_eq!(breakdown.value(2, "Amount").unwrap(), &Value::Float(35.0));
        assert_eq!(breakdown.value(3, "Amount").unwrap(), &Value::Float(28.0));
    }

    #[test]
    fn test_expense_totals_sorted_ascending() {
        let statements = Table::from_rows(
            "income",
            vec!["Valuation Date", "Rent", "Utils"],
            vec![
                vec!["2023-01-31".into(), Value::Float(10.0), Value::Float(2.0)],
                vec!["2023-02-28".into(), Value::Float(10.0), Value::Float(3.0)],
            ],
        )
        .unwrap();
        let chart = ChartOfAccounts {
            expense_categories: vec!["Rent".to_string(), "Utils".to_string()],
            ..ChartOfAccounts::standard()
        };
        let totals = expense_totals(&statements, &chart).unwrap();
        assert_eq!(totals.value(0, EXPENSE).unwrap(), &Value::from("Utils"));
        assert_eq!(totals.value(0, AMOUNT).unwrap(), &Value::Float(5.0));
        assert_eq!(totals.value(1, AMOUNT).unwrap(), &Value::Float(20.0));
    }
}
