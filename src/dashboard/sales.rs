use super::{select_period, Dashboard, PreparedData};
use crate::aggregate::{group_by, group_by_with, Aggregation};
use crate::error::Result;
use crate::metrics::{SalesKpis, SalesMetrics};
use crate::schema::columns;
use crate::table::{Table, Value};
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesInsightsPage {
    pub year: Value,
    pub kpis: SalesKpis,
    /// Revenue and gross profit per month, calendar ordered.
    pub revenue_by_month: Table,
    /// Shipping, tax and discount totals per month.
    pub costs_by_month: Table,
    /// Revenue and gross profit per country, highest revenue first.
    pub sales_by_location: Table,
    /// Revenue per product, highest first.
    pub product_performance: Table,
}

impl Dashboard {
    pub fn sales_insights(&self, data: &PreparedData, year: &Value) -> Result<SalesInsightsPage> {
        info!("Building sales insights page for {}", year);
        let sales = select_period(&data.customer_sales, year)?;
        let revenue = data.revenue_column.as_str();
        let kpis = SalesMetrics::new(&sales)
            .with_revenue_column(revenue)
            .kpis()?;

        let options = self.group_options();
        let revenue_by_month = group_by_with(
            &sales,
            &[columns::MONTH],
            &[
                Aggregation::sum(revenue).alias(columns::TOTAL_REVENUE),
                Aggregation::sum(columns::GROSS_PROFIT),
            ],
            &options,
        )?;
        let costs_by_month = group_by_with(
            &sales,
            &[columns::MONTH],
            &[
                Aggregation::sum(columns::SHIPPING_AMOUNT),
                Aggregation::sum(columns::TAX),
                Aggregation::sum(columns::DISCOUNT),
            ],
            &options,
        )?;

        let sales_by_location = group_by(
            &sales,
            &[columns::COUNTRY],
            &[
                Aggregation::sum(revenue).alias(columns::TOTAL_REVENUE),
                Aggregation::sum(columns::GROSS_PROFIT),
            ],
        )?
        .sort_by_f64(columns::TOTAL_REVENUE, true)?;

        let product_performance = group_by(
            &sales,
            &[columns::PRODUCT],
            &[Aggregation::sum(revenue).alias(columns::TOTAL_REVENUE)],
        )?
        .sort_by_f64(columns::TOTAL_REVENUE, true)?;

        Ok(SalesInsightsPage {
            year: year.clone(),
            kpis,
            revenue_by_month,
            costs_by_month,
            sales_by_location,
            product_performance,
        })
    }
}
