use super::{select_period, Dashboard, PreparedData};
use crate::aggregate::{group_by_with, Aggregation, GroupOptions};
use crate::error::Result;
use crate::metrics::{churn_rate, Ratio};
use crate::schema::columns;
use crate::table::{Table, Value};
use log::info;
use serde::Serialize;

pub const CUSTOMERS: &str = "Customers";
pub const TRANSACTIONS: &str = "Transactions";
pub const CONVERSION_RATE: &str = "Conversion Rate";
pub const PURCHASES: &str = "Purchases";
pub const REPEAT_CUSTOMERS: &str = "Repeat Customers";
pub const REPEAT_PURCHASE_RATE: &str = "Repeat Purchase Rate";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerReportPage {
    pub year: Value,
    pub churn_rate: f64,
    /// Revenue and churned-row count per dash segment.
    pub by_dash_segment: Table,
    pub by_loyalty_group: Table,
    pub average_cltv_by_month: Table,
    /// Summed CLTV per (dash segment, month).
    pub cltv_by_segment_and_month: Table,
    pub conversion_by_month: Table,
    pub repeat_purchase_by_month: Table,
}

/// Distinct customers per transaction in each month, as a percentage.
pub fn conversion_rate_by_month(sales: &Table, options: &GroupOptions) -> Result<Table> {
    let grouped = group_by_with(
        sales,
        &[columns::MONTH],
        &[
            Aggregation::nunique(columns::CUSTOMER_ID).alias(CUSTOMERS),
            Aggregation::count(columns::MONTH).alias(TRANSACTIONS),
        ],
        options,
    )?;
    with_rate(&grouped, CUSTOMERS, TRANSACTIONS, CONVERSION_RATE)
}

/// For each month, customers who bought more than once that month divided by the purchases
/// those customers made, as a percentage. Months without a repeat buyer are absent.
pub fn repeat_purchase_rate_by_month(sales: &Table, options: &GroupOptions) -> Result<Table> {
    let per_customer = group_by_with(
        sales,
        &[columns::CUSTOMER_ID, columns::MONTH],
        &[Aggregation::count(columns::MONTH).alias(PURCHASES)],
        options,
    )?;
    let repeat = per_customer.filter(|row| {
        row.get(PURCHASES)
            .and_then(Value::as_i64)
            .map(|n| n > 1)
            .unwrap_or(false)
    });

    let grouped = group_by_with(
        &repeat,
        &[columns::MONTH],
        &[
            Aggregation::nunique(columns::CUSTOMER_ID).alias(REPEAT_CUSTOMERS),
            Aggregation::sum(PURCHASES),
        ],
        options,
    )?;
    with_rate(&grouped, REPEAT_CUSTOMERS, PURCHASES, REPEAT_PURCHASE_RATE)
}

fn with_rate(table: &Table, numerator: &str, denominator: &str, column: &str) -> Result<Table> {
    let num = table.f64_column(numerator)?;
    let den = table.f64_column(denominator)?;
    let rates = num
        .into_iter()
        .zip(den)
        .map(|(n, d)| {
            Ratio::of(n.unwrap_or(0.0), d.unwrap_or(0.0))
                .scaled(100.0)
                .to_value()
        })
        .collect();
    table.with_column(column, rates)
}

impl Dashboard {
    pub fn customer_report(&self, data: &PreparedData, year: &Value) -> Result<CustomerReportPage> {
        info!("Building customer report for {}", year);
        let sales = select_period(&data.customer_sales, year)?;
        let options = self.group_options();

        let by_group = |group: &str| {
            group_by_with(
                &sales,
                &[group],
                &[
                    Aggregation::sum(data.revenue_column.as_str()).alias(columns::TOTAL_REVENUE),
                    Aggregation::sum(columns::CHURN),
                ],
                &options,
            )
        };

        Ok(CustomerReportPage {
            year: year.clone(),
            churn_rate: churn_rate(&sales)?,
            by_dash_segment: by_group(columns::DASH_SEGMENT)?,
            by_loyalty_group: by_group(columns::LOYALTY_GROUP)?,
            average_cltv_by_month: group_by_with(
                &sales,
                &[columns::MONTH],
                &[Aggregation::mean(columns::CLTV)],
                &options,
            )?,
            cltv_by_segment_and_month: group_by_with(
                &sales,
                &[columns::DASH_SEGMENT, columns::MONTH],
                &[Aggregation::sum(columns::CLTV)],
                &options,
            )?,
            conversion_by_month: conversion_rate_by_month(&sales, &options)?,
            repeat_purchase_by_month: repeat_purchase_rate_by_month(&sales, &options)?,
        })
    }
}
