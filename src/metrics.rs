//! Scalar KPIs and per-row derived columns.
//!
//! Rates over an empty selection are `0.0`. Ratios whose denominator is zero are
//! [`Ratio::Undefined`] (a null cell once written into a table), never a silent zero.

use crate::chart_of_accounts::{
    CashFlowCategory, CashFlowMapping, ChartOfAccounts, INCOME_BEFORE_TAX, INCOME_TAX,
};
use crate::error::{PipelineError, Result};
use crate::schema::columns;
use crate::table::{RowRef, Table, Value};
use crate::utils::pct_change;
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub enum Ratio {
    Value(f64),
    Undefined,
}

impl Ratio {
    /// `numerator / denominator`, undefined when the denominator is zero or the result is
    /// not finite.
    pub fn of(numerator: f64, denominator: f64) -> Ratio {
        if denominator == 0.0 {
            return Ratio::Undefined;
        }
        let value = numerator / denominator;
        if value.is_finite() {
            Ratio::Value(value)
        } else {
            Ratio::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Value(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Ratio::Undefined)
    }

    pub fn scaled(self, factor: f64) -> Ratio {
        match self {
            Ratio::Value(v) => Ratio::Value(v * factor),
            Ratio::Undefined => Ratio::Undefined,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Ratio::Value(v) => Value::Float(*v),
            Ratio::Undefined => Value::Null,
        }
    }

    pub fn from_value(value: &Value) -> Ratio {
        match value.as_f64() {
            Some(v) if v.is_finite() => Ratio::Value(v),
            _ => Ratio::Undefined,
        }
    }
}

fn share_pct(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

/// Sales KPIs over a (possibly joined) sales table.
///
/// After a customer join the revenue column is usually suffixed, so it can be overridden.
#[derive(Debug, Clone)]
pub struct SalesMetrics<'a> {
    table: &'a Table,
    revenue_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesKpis {
    pub conversion_rate: f64,
    pub average_order_value: f64,
    pub revenue_per_customer: f64,
    pub shipping_percentage: f64,
    pub tax_percentage: f64,
    pub gross_profit_margin: f64,
    pub discount_rate: f64,
    pub total_revenue: f64,
    pub sales_volume: f64,
}

impl<'a> SalesMetrics<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self {
            table,
            revenue_column: columns::TOTAL_REVENUE.to_string(),
        }
    }

    pub fn with_revenue_column(mut self, column: impl Into<String>) -> Self {
        self.revenue_column = column.into();
        self
    }

    pub fn revenue_column(&self) -> &str {
        &self.revenue_column
    }

    /// Distinct customers per transaction row, as a percentage.
    pub fn conversion_rate(&self) -> Result<f64> {
        let customers = self.table.nunique(columns::CUSTOMER_ID)?;
        Ok(share_pct(customers as f64, self.table.len() as f64))
    }

    pub fn average_order_value(&self) -> Result<f64> {
        let revenue = self.table.sum(&self.revenue_column)?;
        if self.table.is_empty() {
            return Ok(0.0);
        }
        Ok(revenue / self.table.len() as f64)
    }

    /// Mean over customers of each customer's summed revenue.
    pub fn revenue_per_customer(&self) -> Result<f64> {
        let ids = self.table.column(columns::CUSTOMER_ID)?;
        let revenue = self.table.f64_column(&self.revenue_column)?;

        let mut per_customer: BTreeMap<_, f64> = BTreeMap::new();
        for (id, rev) in ids.into_iter().zip(revenue) {
            if id.is_null() {
                continue;
            }
            *per_customer.entry(id.key()).or_default() += rev.unwrap_or(0.0);
        }
        if per_customer.is_empty() {
            return Ok(0.0);
        }
        Ok(per_customer.values().sum::<f64>() / per_customer.len() as f64)
    }

    fn revenue_share(&self, column: &str) -> Result<f64> {
        let part = self.table.sum(column)?;
        let whole = self.table.sum(&self.revenue_column)?;
        Ok(share_pct(part, whole))
    }

    pub fn shipping_percentage(&self) -> Result<f64> {
        self.revenue_share(columns::SHIPPING_AMOUNT)
    }

    pub fn tax_percentage(&self) -> Result<f64> {
        self.revenue_share(columns::TAX)
    }

    pub fn gross_profit_margin(&self) -> Result<f64> {
        self.revenue_share(columns::GROSS_PROFIT)
    }

    pub fn discount_rate(&self) -> Result<f64> {
        self.revenue_share(columns::DISCOUNT)
    }

    pub fn sales_volume(&self) -> Result<f64> {
        self.table.sum(columns::UNITS_SOLD)
    }

    pub fn kpis(&self) -> Result<SalesKpis> {
        Ok(SalesKpis {
            conversion_rate: self.conversion_rate()?,
            average_order_value: self.average_order_value()?,
            revenue_per_customer: self.revenue_per_customer()?,
            shipping_percentage: self.shipping_percentage()?,
            tax_percentage: self.tax_percentage()?,
            gross_profit_margin: self.gross_profit_margin()?,
            discount_rate: self.discount_rate()?,
            total_revenue: self.table.sum(&self.revenue_column)?,
            sales_volume: self.sales_volume()?,
        })
    }
}

/// Recomputes `revenue_column` as UnitPrice x UnitsSold + ShippingAmount + Tax.
pub fn derive_total_revenue(table: &Table, revenue_column: &str) -> Result<Table> {
    let price = table.f64_column(columns::UNIT_PRICE)?;
    let units = table.f64_column(columns::UNITS_SOLD)?;
    let shipping = table.f64_column(columns::SHIPPING_AMOUNT)?;
    let tax = table.f64_column(columns::TAX)?;

    let values = (0..table.len())
        .map(|i| match (price[i], units[i]) {
            (Some(p), Some(u)) => {
                Value::Float(p * u + shipping[i].unwrap_or(0.0) + tax[i].unwrap_or(0.0))
            }
            _ => Value::Null,
        })
        .collect();
    table.with_column(revenue_column, values)
}

/// Decides, per customer row, whether the customer has churned.
///
/// Two rules exist for the same flag: a fixed threshold on the churn probability, and an
/// independent Bernoulli draw from that probability. They disagree by construction, so the
/// caller picks one explicitly.
pub trait ChurnStrategy {
    fn name(&self) -> &'static str;

    /// One output per probability; `None` probabilities stay unclassified.
    fn classify(&self, probabilities: &[Option<f64>]) -> Vec<Option<bool>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdChurn {
    pub threshold: f64,
}

impl Default for ThresholdChurn {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl ChurnStrategy for ThresholdChurn {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn classify(&self, probabilities: &[Option<f64>]) -> Vec<Option<bool>> {
        probabilities
            .iter()
            .map(|p| p.map(|p| p > self.threshold))
            .collect()
    }
}

/// Seeded, so the same input always classifies the same way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampledChurn {
    pub seed: u64,
}

impl ChurnStrategy for SampledChurn {
    fn name(&self) -> &'static str {
        "sampled"
    }

    fn classify(&self, probabilities: &[Option<f64>]) -> Vec<Option<bool>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        probabilities
            .iter()
            .map(|p| {
                let draw: f64 = rng.gen();
                p.map(|p| draw < p)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ChurnStrategyConfig {
    #[schemars(description = "Churned when the churn probability exceeds the threshold")]
    Threshold { threshold: f64 },
    #[schemars(description = "Churned when a seeded uniform draw falls below the churn probability")]
    Sampled { seed: u64 },
}

impl Default for ChurnStrategyConfig {
    fn default() -> Self {
        ChurnStrategyConfig::Threshold { threshold: 0.5 }
    }
}

impl ChurnStrategyConfig {
    pub fn build(&self) -> Box<dyn ChurnStrategy> {
        match *self {
            ChurnStrategyConfig::Threshold { threshold } => Box::new(ThresholdChurn { threshold }),
            ChurnStrategyConfig::Sampled { seed } => Box::new(SampledChurn { seed }),
        }
    }
}

/// Writes the `Churn` column (1/0, null when the probability is missing).
pub fn classify_churn(table: &Table, strategy: &dyn ChurnStrategy) -> Result<Table> {
    let probabilities = table.f64_column(columns::CHURN_PROBABILITY)?;
    let flags = strategy
        .classify(&probabilities)
        .into_iter()
        .map(|flag| match flag {
            Some(true) => Value::Int(1),
            Some(false) => Value::Int(0),
            None => Value::Null,
        })
        .collect();
    table.with_column(columns::CHURN, flags)
}

/// Share of distinct customers with a churn flag of 1, as a percentage.
pub fn churn_rate(table: &Table) -> Result<f64> {
    let ids = table.column(columns::CUSTOMER_ID)?;
    let churn = table.f64_column(columns::CHURN)?;

    let mut customers = BTreeSet::new();
    let mut churned = BTreeSet::new();
    for (id, flag) in ids.into_iter().zip(churn) {
        if id.is_null() {
            continue;
        }
        customers.insert(id.key());
        if flag == Some(1.0) {
            churned.insert(id.key());
        }
    }
    Ok(share_pct(churned.len() as f64, customers.len() as f64))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerKpis {
    pub customers: usize,
    /// Mean lifetime value over rows.
    pub customer_lifetime_value: f64,
    pub average_revenue_per_user: f64,
    pub churn_rate: f64,
    /// Mean days between joining and each purchase; 0 when no row has both dates.
    pub average_lifespan_days: f64,
}

impl CustomerKpis {
    /// Requires a customer table already joined with sales and classified for churn.
    pub fn compute(table: &Table, revenue_column: &str) -> Result<Self> {
        let cltv: Vec<f64> = table.f64_column(columns::CLTV)?.into_iter().flatten().collect();
        let customer_lifetime_value = crate::utils::mean(&cltv).unwrap_or(0.0);

        let joins = table.column(columns::JOIN_DATE)?;
        let dates = table.column(columns::VALUATION_DATE)?;
        let lifespans: Vec<f64> = joins
            .into_iter()
            .zip(dates)
            .filter_map(|(j, d)| days_between(j.as_date(), d.as_date()))
            .map(|days| days as f64)
            .collect();

        Ok(Self {
            customers: table.nunique(columns::CUSTOMER_ID)?,
            customer_lifetime_value,
            average_revenue_per_user: SalesMetrics::new(table)
                .with_revenue_column(revenue_column)
                .revenue_per_customer()?,
            churn_rate: churn_rate(table)?,
            average_lifespan_days: crate::utils::mean(&lifespans).unwrap_or(0.0),
        })
    }
}

/// Percentage change in quantity divided by percentage change in price.
pub fn elasticity(previous_price: f64, price: f64, previous_qty: f64, qty: f64) -> Ratio {
    match (pct_change(previous_price, price), pct_change(previous_qty, qty)) {
        (Some(dp), Some(dq)) => Ratio::of(dq, dp),
        _ => Ratio::Undefined,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ElasticityColumns {
    pub product: String,
    pub date: String,
    pub price: String,
    pub quantity: String,
}

impl Default for ElasticityColumns {
    fn default() -> Self {
        Self {
            product: columns::PRODUCT_NAME.to_string(),
            date: columns::DATE.to_string(),
            price: columns::PRICE_RATIO.to_string(),
            quantity: columns::UNITS_SOLD.to_string(),
        }
    }
}

pub const PRICE_CHANGE: &str = "Price Change";
pub const QUANTITY_CHANGE: &str = "Quantity Change";
pub const PRICE_ELASTICITY: &str = "Price Elasticity";

/// Adds `Price Change`, `Quantity Change` and `Price Elasticity` per product, comparing each row
/// with the previous row of the same product in date order. The output is sorted by
/// (product, date). The first row of each product, and any row whose price did not move, gets
/// a null elasticity.
pub fn price_elasticity(table: &Table, cols: &ElasticityColumns) -> Result<Table> {
    table.require_all(&[&cols.product, &cols.date, &cols.price, &cols.quantity])?;
    let sorted = table.sort_by_columns(&[&cols.product, &cols.date])?;

    let products = sorted.column(&cols.product)?;
    let prices = sorted.f64_column(&cols.price)?;
    let quantities = sorted.f64_column(&cols.quantity)?;

    let mut price_change = Vec::with_capacity(sorted.len());
    let mut qty_change = Vec::with_capacity(sorted.len());
    let mut elasticities = Vec::with_capacity(sorted.len());

    for i in 0..sorted.len() {
        let same_product = i > 0 && products[i - 1].key() == products[i].key();
        if !same_product {
            price_change.push(Value::Null);
            qty_change.push(Value::Null);
            elasticities.push(Value::Null);
            continue;
        }

        let dp = prices[i - 1].zip(prices[i]).and_then(|(a, b)| pct_change(a, b));
        let dq = quantities[i - 1]
            .zip(quantities[i])
            .and_then(|(a, b)| pct_change(a, b));
        price_change.push(Value::from(dp));
        qty_change.push(Value::from(dq));
        let e = match (dp, dq) {
            (Some(dp), Some(dq)) => Ratio::of(dq, dp),
            _ => Ratio::Undefined,
        };
        elasticities.push(e.to_value());
    }

    sorted
        .with_column(PRICE_CHANGE, price_change)?
        .with_column(QUANTITY_CHANGE, qty_change)?
        .with_column(PRICE_ELASTICITY, elasticities)
}

pub const SHIPPING_AND_TAX_RATIO: &str = "Shipping and Tax Ratio";

/// (Shipping + Tax) / Base Price per row; null where the base price is zero.
pub fn shipping_and_tax_ratio(table: &Table) -> Result<Table> {
    if table.has_column(SHIPPING_AND_TAX_RATIO) {
        return Ok(table.clone());
    }
    let shipping = table.f64_column(columns::SHIPPING)?;
    let tax = table.f64_column(columns::TAX)?;
    let base = table.f64_column(columns::BASE_PRICE)?;
    let values = (0..table.len())
        .map(|i| match base[i] {
            Some(b) => {
                Ratio::of(shipping[i].unwrap_or(0.0) + tax[i].unwrap_or(0.0), b).to_value()
            }
            None => Value::Null,
        })
        .collect();
    table.with_column(SHIPPING_AND_TAX_RATIO, values)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Term {
    pub field: String,
    pub weight: f64,
}

/// Weighted sum of named fields. Null cells count as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
pub struct LinearCombination {
    pub terms: Vec<Term>,
}

impl LinearCombination {
    pub fn sum_of<S: AsRef<str>>(fields: &[S]) -> Self {
        Self::default().plus(fields)
    }

    pub fn plus<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.terms.extend(fields.iter().map(|f| Term {
            field: f.as_ref().to_string(),
            weight: 1.0,
        }));
        self
    }

    pub fn minus<S: AsRef<str>>(mut self, fields: &[S]) -> Self {
        self.terms.extend(fields.iter().map(|f| Term {
            field: f.as_ref().to_string(),
            weight: -1.0,
        }));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(|t| t.field.as_str())
    }

    pub fn evaluate(&self, row: RowRef<'_>) -> Result<f64> {
        let mut total = 0.0;
        for term in &self.terms {
            let value = row.get(&term.field).ok_or_else(|| {
                PipelineError::schema_mismatch("row", term.field.as_str())
            })?;
            let number = value
                .try_f64()
                .map_err(|_| PipelineError::TypeMismatch {
                    column: term.field.clone(),
                    row: row.index(),
                    expected: "number".to_string(),
                })?
                .unwrap_or(0.0);
            total += term.weight * number;
        }
        Ok(total)
    }
}

/// `scale x numerator / denominator`, evaluated per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RatioDefinition {
    pub name: String,
    pub numerator: LinearCombination,
    pub denominator: LinearCombination,
    pub scale: f64,
}

impl RatioDefinition {
    pub fn new(
        name: impl Into<String>,
        numerator: LinearCombination,
        denominator: LinearCombination,
        scale: f64,
    ) -> Self {
        Self {
            name: name.into(),
            numerator,
            denominator,
            scale,
        }
    }

    pub fn gross_profit_margin(chart: &ChartOfAccounts) -> Self {
        Self::new(
            "Gross Profit Margin",
            LinearCombination::sum_of(&[columns::REVENUE]).minus(&chart.cost_of_sales),
            LinearCombination::sum_of(&[columns::REVENUE]),
            100.0,
        )
    }

    pub fn operating_profit_margin(chart: &ChartOfAccounts) -> Self {
        Self::new(
            "Operating Profit Margin",
            LinearCombination::sum_of(&[INCOME_BEFORE_TAX]).minus(&chart.overhead_expenses),
            LinearCombination::sum_of(&[INCOME_BEFORE_TAX]),
            100.0,
        )
    }

    pub fn net_profit_margin() -> Self {
        Self::new(
            "Net Profit Margin",
            LinearCombination::sum_of(&[INCOME_BEFORE_TAX]).minus(&[INCOME_TAX]),
            LinearCombination::sum_of(&[INCOME_BEFORE_TAX]),
            100.0,
        )
    }

    pub fn return_on_investment() -> Self {
        Self::new(
            "ROI",
            LinearCombination::sum_of(&[columns::PROFIT_OR_LOSS]),
            LinearCombination::sum_of(&["WageExp", "AdSpend"]),
            100.0,
        )
    }

    pub fn expense_to_revenue(chart: &ChartOfAccounts) -> Self {
        Self::new(
            "Expense-to-Revenue Ratio",
            LinearCombination::sum_of(&chart.overhead_expenses),
            LinearCombination::sum_of(&[columns::REVENUE]),
            100.0,
        )
    }

    pub fn return_on_assets() -> Self {
        Self::new(
            "ROA",
            LinearCombination::sum_of(&[columns::PROFIT_OR_LOSS]),
            LinearCombination::sum_of(&[INCOME_BEFORE_TAX]),
            100.0,
        )
    }

    pub fn debt_to_equity(chart: &ChartOfAccounts) -> Self {
        Self::new(
            "Debt to Equity Ratio",
            LinearCombination::sum_of(&chart.debt),
            LinearCombination::sum_of(&chart.equity),
            1.0,
        )
    }

    /// Lifetime value over the discount-based acquisition-cost proxy.
    pub fn cltv_to_cac() -> Self {
        Self::new(
            "CLTV:CAC",
            LinearCombination::sum_of(&[columns::CLTV]),
            LinearCombination::sum_of(&[columns::DISCOUNT]),
            1.0,
        )
    }

    /// The KPI set shown on the accounts page.
    pub fn accounts_set(chart: &ChartOfAccounts) -> Vec<Self> {
        vec![
            Self::gross_profit_margin(chart),
            Self::operating_profit_margin(chart),
            Self::net_profit_margin(),
            Self::return_on_investment(),
            Self::expense_to_revenue(chart),
            Self::return_on_assets(),
        ]
    }

    pub fn require_fields(&self, table: &Table) -> Result<()> {
        for field in self.numerator.fields().chain(self.denominator.fields()) {
            table.require(field)?;
        }
        Ok(())
    }

    pub fn evaluate(&self, row: RowRef<'_>) -> Result<Ratio> {
        let numerator = self.numerator.evaluate(row)?;
        let denominator = self.denominator.evaluate(row)?;
        Ok(Ratio::of(numerator, denominator).scaled(self.scale))
    }
}

/// Adds `column` holding the combination evaluated on every row.
pub fn derive_combination(
    table: &Table,
    column: &str,
    combination: &LinearCombination,
) -> Result<Table> {
    for field in combination.fields() {
        table.require(field)?;
    }
    let values = table
        .iter()
        .map(|row| combination.evaluate(row).map(Value::Float))
        .collect::<Result<Vec<_>>>()?;
    table.with_column(column, values)
}

/// Adds a column named after the ratio; undefined rows become null.
pub fn derive_ratio(table: &Table, ratio: &RatioDefinition) -> Result<Table> {
    ratio.require_fields(table)?;
    let values = table
        .iter()
        .map(|row| ratio.evaluate(row).map(|r| r.to_value()))
        .collect::<Result<Vec<_>>>()?;
    table.with_column(&ratio.name, values)
}

pub fn derive_ratios(table: &Table, ratios: &[RatioDefinition]) -> Result<Table> {
    let mut out = table.clone();
    for ratio in ratios {
        out = derive_ratio(&out, ratio)?;
    }
    Ok(out)
}

/// Mean of a ratio column, skipping undefined entries. Undefined if nothing is defined.
pub fn ratio_mean(table: &Table, column: &str) -> Result<Ratio> {
    let values: Vec<f64> = table
        .f64_column(column)?
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();
    Ok(crate::utils::mean(&values)
        .map(Ratio::Value)
        .unwrap_or(Ratio::Undefined))
}

/// Period columns carried through to derived per-period tables when present.
const PERIOD_COLUMNS: [&str; 4] = [
    columns::VALUATION_DATE,
    columns::DATE,
    columns::YEAR,
    columns::MONTH,
];

/// Sums the mapped fields of each period into the four cash-flow buckets.
///
/// Output columns: whichever period columns the input carries, then one column per bucket
/// (`Total Cash Flow`, `Operating Cash Flow`, `Investing Cash Flow`, `Financing Cash Flow`).
pub fn categorize_cash_flows(table: &Table, mapping: &CashFlowMapping) -> Result<Table> {
    for category in CashFlowCategory::ALL {
        ChartOfAccounts::require_fields(table, mapping.fields(category))?;
    }

    let period_columns: Vec<&str> = PERIOD_COLUMNS
        .iter()
        .copied()
        .filter(|c| table.has_column(c))
        .collect();
    let mut out = table.select(&period_columns)?.with_name("cash_flow_categories");

    for category in CashFlowCategory::ALL {
        let combo = LinearCombination::sum_of(mapping.fields(category));
        let values = table
            .iter()
            .map(|row| combo.evaluate(row).map(Value::Float))
            .collect::<Result<Vec<_>>>()?;
        out = out.with_column(category.label(), values)?;
    }
    Ok(out)
}

/// Totals of each bucket across all periods, one row per bucket.
pub fn cash_flow_breakdown(table: &Table, mapping: &CashFlowMapping) -> Result<Table> {
    let per_period = categorize_cash_flows(table, mapping)?;
    let mut out = Table::new("cash_flow_breakdown", vec!["Category", "Amount"]);
    for category in CashFlowCategory::ALL {
        out.push_row(vec![
            category.label().into(),
            Value::Float(per_period.sum(category.label())?),
        ])?;
    }
    Ok(out)
}

/// Share of events that converted, as a percentage.
pub fn event_conversion_rate(events: &Table) -> Result<f64> {
    let targets = events.f64_column(columns::IS_TARGET)?;
    let converted = targets.iter().filter(|t| **t == Some(1.0)).count();
    Ok(share_pct(converted as f64, events.len() as f64))
}

/// Mean funnel depth reached per event.
pub fn visitor_engagement(events: &Table) -> Result<f64> {
    let steps: Vec<f64> = events
        .f64_column(columns::EVENT_SEQUENCE)?
        .into_iter()
        .flatten()
        .collect();
    Ok(crate::utils::mean(&steps).unwrap_or(0.0))
}

pub const FUNNEL_STEPS: std::ops::RangeInclusive<i64> = 1..=7;

/// Step-to-step conversion through the event-sequence funnel. Step 1 is measured against all
/// events; each later step against the previous one. Undefined when the previous step is empty.
pub fn event_sequence_funnel(events: &Table) -> Result<Table> {
    let steps: Vec<Option<i64>> = events
        .column(columns::EVENT_SEQUENCE)?
        .into_iter()
        .map(Value::as_i64)
        .collect();

    let mut out = Table::new(
        "event_sequence_funnel",
        vec![columns::EVENT_SEQUENCE, "Events", "Conversion Rate"],
    );
    let mut previous = events.len() as f64;
    for step in FUNNEL_STEPS {
        let count = steps.iter().filter(|s| **s == Some(step)).count() as f64;
        out.push_row(vec![
            Value::Int(step),
            Value::Int(count as i64),
            Ratio::of(count, previous).scaled(100.0).to_value(),
        ])?;
        previous = count;
    }
    Ok(out)
}

/// Channel with the most converted events, ties broken by channel name.
pub fn top_channel(events: &Table) -> Result<Option<String>> {
    let channels = events.column(columns::CHANNEL)?;
    let targets = events.f64_column(columns::IS_TARGET)?;
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (channel, target) in channels.into_iter().zip(targets) {
        if target == Some(1.0) {
            if let Some(name) = channel.as_str() {
                *counts.entry(name.to_string()).or_default() += 1;
            }
        }
    }
    Ok(counts
        .into_iter()
        .fold(None, |best: Option<(String, usize)>, (name, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((name, count)),
        })
        .map(|(name, _)| name))
}

/// Days between two dates, null when either is missing.
pub fn days_between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<i64> {
    Some((end? - start?).num_days())
}

/// Share of spend vs share of conversions per channel, sorted by spend share descending.
///
/// Channels missing from one side get a zero share on that side.
pub fn channel_funnel(media: &Table, events: &Table) -> Result<Table> {
    let spend_channels = media.column(columns::CHANNEL)?;
    let spend = media.f64_column(columns::MEDIA_SPEND)?;
    let event_channels = events.column(columns::CHANNEL)?;
    let targets = events.f64_column(columns::IS_TARGET)?;

    let mut spend_by: BTreeMap<String, f64> = BTreeMap::new();
    for (channel, amount) in spend_channels.into_iter().zip(spend) {
        if let Some(name) = channel.as_str() {
            *spend_by.entry(name.to_string()).or_default() += amount.unwrap_or(0.0);
        }
    }
    let mut conversions_by: BTreeMap<String, f64> = BTreeMap::new();
    for (channel, target) in event_channels.into_iter().zip(targets) {
        if let Some(name) = channel.as_str() {
            let entry = conversions_by.entry(name.to_string()).or_default();
            if target == Some(1.0) {
                *entry += 1.0;
            }
        }
    }

    let total_spend: f64 = spend_by.values().sum();
    let total_conversions: f64 = conversions_by.values().sum();
    let channels: BTreeSet<&String> = spend_by.keys().chain(conversions_by.keys()).collect();

    let mut out = Table::new(
        "channel_funnel",
        vec![columns::CHANNEL, "Percent Spend", "Percent Conversion"],
    );
    for channel in channels {
        out.push_row(vec![
            channel.as_str().into(),
            Value::Float(share_pct(
                spend_by.get(channel).copied().unwrap_or(0.0),
                total_spend,
            )),
            Value::Float(share_pct(
                conversions_by.get(channel).copied().unwrap_or(0.0),
                total_conversions,
            )),
        ])?;
    }
    out.sort_by_f64("Percent Spend", true)
}
