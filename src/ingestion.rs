//! Getting data into [`Table`]s: from typed records, or from raw text cells handed over by an
//! external loader, plus header validation against the required schemas.

use crate::error::Result;
use crate::schema::{
    columns, CustomerRecord, FinancialPeriod, MarketingEvent, MediaSpendRecord, SalesTransaction,
    CUSTOMER_COLUMNS, DEMAND_COLUMNS, FINANCIAL_KEY_COLUMNS, MARKETING_COLUMNS, MEDIA_SPEND_COLUMNS,
    SALES_COLUMNS,
};
use crate::table::{Table, Value};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    Customers,
    Sales,
    MarketingEvents,
    MediaSpend,
    Demand,
    IncomeStatement,
    BalanceSheet,
    CashFlow,
}

impl TableKind {
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            TableKind::Customers => CUSTOMER_COLUMNS,
            TableKind::Sales => SALES_COLUMNS,
            TableKind::MarketingEvents => MARKETING_COLUMNS,
            TableKind::MediaSpend => MEDIA_SPEND_COLUMNS,
            TableKind::Demand => DEMAND_COLUMNS,
            TableKind::IncomeStatement | TableKind::BalanceSheet | TableKind::CashFlow => {
                FINANCIAL_KEY_COLUMNS
            }
        }
    }

    pub fn default_name(&self) -> &'static str {
        match self {
            TableKind::Customers => "customers",
            TableKind::Sales => "sales",
            TableKind::MarketingEvents => "marketing_events",
            TableKind::MediaSpend => "media_spend",
            TableKind::Demand => "products",
            TableKind::IncomeStatement => "income",
            TableKind::BalanceSheet => "balance",
            TableKind::CashFlow => "cash_flow",
        }
    }
}

/// Fails with `SchemaMismatch` on the first required header that is absent.
pub fn validate_table(table: &Table, kind: TableKind) -> Result<()> {
    table.require_all(kind.required_columns())
}

/// Builds a table from raw text cells, typing each cell with [`Value::infer`].
pub fn table_from_text_rows<I, R, S>(name: &str, header: &[&str], rows: I) -> Result<Table>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut table = Table::new(name, header.to_vec());
    for row in rows {
        table.push_row(row.into_iter().map(|c| Value::infer(c.as_ref())).collect())?;
    }
    debug!("Loaded {} rows into '{}'", table.len(), name);
    Ok(table)
}

pub fn customers_to_table(records: &[CustomerRecord]) -> Result<Table> {
    let mut table = Table::new(TableKind::Customers.default_name(), CUSTOMER_COLUMNS.to_vec());
    for r in records {
        table.push_row(vec![
            r.customer_id.as_str().into(),
            r.join_date.into(),
            r.loyalty_group.as_str().into(),
            r.dash_segment.as_str().into(),
            r.lifetime_value.into(),
            r.total_revenue.into(),
            Value::Int(r.churn_flag as i64),
            r.churn_probability.into(),
        ])?;
    }
    Ok(table)
}

pub fn sales_to_table(records: &[SalesTransaction]) -> Result<Table> {
    let mut table = Table::new(TableKind::Sales.default_name(), SALES_COLUMNS.to_vec());
    for r in records {
        table.push_row(vec![
            r.date.into(),
            r.customer_id.as_str().into(),
            r.product.as_str().into(),
            r.country.as_str().into(),
            Value::Int(r.units_sold as i64),
            r.unit_price.into(),
            r.shipping_amount.into(),
            r.tax.into(),
            r.discount.into(),
            r.total_revenue.into(),
            r.gross_profit.into(),
        ])?;
    }
    Ok(table)
}

pub fn marketing_events_to_table(records: &[MarketingEvent]) -> Result<Table> {
    let mut table = Table::new(
        TableKind::MarketingEvents.default_name(),
        MARKETING_COLUMNS.to_vec(),
    );
    for r in records {
        table.push_row(vec![
            r.event_date.into(),
            r.channel.as_str().into(),
            Value::Int(r.event_sequence as i64),
            r.aov.into(),
            Value::Int(r.is_target as i64),
        ])?;
    }
    Ok(table)
}

pub fn media_spend_to_table(records: &[MediaSpendRecord]) -> Result<Table> {
    let mut table = Table::new(TableKind::MediaSpend.default_name(), MEDIA_SPEND_COLUMNS.to_vec());
    for r in records {
        table.push_row(vec![
            r.date.into(),
            r.channel.as_str().into(),
            r.spend.into(),
        ])?;
    }
    Ok(table)
}

/// Wide statement table: `Valuation Date`, `Rev`, then every expense and balance field seen in
/// any period. Fields a period does not report are null.
pub fn financial_periods_to_table(periods: &[FinancialPeriod], kind: TableKind) -> Result<Table> {
    let expense_fields: BTreeSet<&String> =
        periods.iter().flat_map(|p| p.expenses.keys()).collect();
    let balance_fields: BTreeSet<&String> = periods
        .iter()
        .flat_map(|p| p.balances.keys())
        .filter(|k| !expense_fields.contains(k))
        .collect();

    let mut header: Vec<String> = vec![
        columns::VALUATION_DATE.to_string(),
        columns::REVENUE.to_string(),
    ];
    header.extend(expense_fields.iter().map(|f| f.to_string()));
    header.extend(balance_fields.iter().map(|f| f.to_string()));

    let mut table = Table::new(kind.default_name(), header);
    for p in periods {
        let mut row = vec![Value::Date(p.date), Value::Float(p.revenue)];
        row.extend(
            expense_fields
                .iter()
                .map(|f| Value::from(p.expenses.get(*f).copied())),
        );
        row.extend(
            balance_fields
                .iter()
                .map(|f| Value::from(p.balances.get(*f).copied())),
        );
        table.push_row(row)?;
    }
    Ok(table)
}
