use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Exact column headers of the input tables. Matching is case- and space-sensitive.
pub mod columns {
    pub const CUSTOMER_ID: &str = "Customer ID";
    pub const JOIN_DATE: &str = "Join Date";
    pub const LOYALTY_GROUP: &str = "Loyalty Group";
    pub const DASH_SEGMENT: &str = "Dash Segment";
    pub const CLTV: &str = "CLTV Monetary Value";
    pub const TOTAL_REVENUE: &str = "Total Revenue";
    pub const CHURN: &str = "Churn";
    pub const CHURN_PROBABILITY: &str = "P notAlive";

    pub const VALUATION_DATE: &str = "Valuation Date";
    pub const PRODUCT: &str = "Product Item Name";
    pub const COUNTRY: &str = "Conversion Country";
    pub const UNITS_SOLD: &str = "Units Sold";
    pub const UNIT_PRICE: &str = "Unit Price";
    pub const SHIPPING_AMOUNT: &str = "Shipping Amount";
    pub const TAX: &str = "Tax";
    pub const DISCOUNT: &str = "Discount";
    pub const GROSS_PROFIT: &str = "Gross Profit";

    pub const EVENT_DATETIME: &str = "Event DateTime";
    pub const CHANNEL: &str = "Channel";
    pub const EVENT_SEQUENCE: &str = "Event Sequence";
    pub const AOV: &str = "AOV";
    pub const IS_TARGET: &str = "Is Target";

    pub const DATE: &str = "Date";
    pub const MEDIA_SPEND: &str = "Media Spend";

    pub const YEAR: &str = "Year";
    pub const MONTH: &str = "Month";
    pub const KEY: &str = "Key";

    pub const REVENUE: &str = "Rev";
    pub const PROFIT_OR_LOSS: &str = "Profit or Loss";

    /// Product-level demand table columns.
    pub const PRODUCT_NAME: &str = "Product";
    pub const BASE_PRICE: &str = "Base Price";
    pub const PRICE_RATIO: &str = "Price Ratio";
    pub const SHIPPING: &str = "Shipping";
}

pub const CUSTOMER_COLUMNS: &[&str] = &[
    columns::CUSTOMER_ID,
    columns::JOIN_DATE,
    columns::LOYALTY_GROUP,
    columns::DASH_SEGMENT,
    columns::CLTV,
    columns::TOTAL_REVENUE,
    columns::CHURN,
    columns::CHURN_PROBABILITY,
];

pub const SALES_COLUMNS: &[&str] = &[
    columns::VALUATION_DATE,
    columns::CUSTOMER_ID,
    columns::PRODUCT,
    columns::COUNTRY,
    columns::UNITS_SOLD,
    columns::UNIT_PRICE,
    columns::SHIPPING_AMOUNT,
    columns::TAX,
    columns::DISCOUNT,
    columns::TOTAL_REVENUE,
    columns::GROSS_PROFIT,
];

pub const MARKETING_COLUMNS: &[&str] = &[
    columns::EVENT_DATETIME,
    columns::CHANNEL,
    columns::EVENT_SEQUENCE,
    columns::AOV,
    columns::IS_TARGET,
];

pub const MEDIA_SPEND_COLUMNS: &[&str] = &[columns::DATE, columns::CHANNEL, columns::MEDIA_SPEND];

/// Per-product demand table (one row per product and day).
pub const DEMAND_COLUMNS: &[&str] = &[
    columns::PRODUCT_NAME,
    columns::BASE_PRICE,
    columns::PRICE_RATIO,
    columns::UNITS_SOLD,
    columns::SHIPPING,
    columns::TAX,
];

/// Columns every financial statement table must carry; the category columns are checked
/// separately against the chart of accounts.
pub const FINANCIAL_KEY_COLUMNS: &[&str] = &[columns::VALUATION_DATE];

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum LoyaltyGroup {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl LoyaltyGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoyaltyGroup::Bronze => "Bronze",
            LoyaltyGroup::Silver => "Silver",
            LoyaltyGroup::Gold => "Gold",
            LoyaltyGroup::Platinum => "Platinum",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Bronze" => Some(LoyaltyGroup::Bronze),
            "Silver" => Some(LoyaltyGroup::Silver),
            "Gold" => Some(LoyaltyGroup::Gold),
            "Platinum" => Some(LoyaltyGroup::Platinum),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum DashSegment {
    New,
    Regular,
    Loyal,
    #[serde(rename = "VIP")]
    Vip,
    #[serde(rename = "At Risk")]
    AtRisk,
}

impl DashSegment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DashSegment::New => "New",
            DashSegment::Regular => "Regular",
            DashSegment::Loyal => "Loyal",
            DashSegment::Vip => "VIP",
            DashSegment::AtRisk => "At Risk",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "New" => Some(DashSegment::New),
            "Regular" => Some(DashSegment::Regular),
            "Loyal" => Some(DashSegment::Loyal),
            "VIP" => Some(DashSegment::Vip),
            "At Risk" | "AtRisk" => Some(DashSegment::AtRisk),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CustomerRecord {
    #[schemars(description = "Unique customer identifier, e.g. CUST_0001")]
    pub customer_id: String,
    pub join_date: NaiveDate,
    pub loyalty_group: LoyaltyGroup,
    pub dash_segment: DashSegment,
    #[schemars(description = "Projected customer lifetime value (>= 0)")]
    pub lifetime_value: f64,
    pub total_revenue: f64,
    #[schemars(description = "Probability the customer is no longer active, in [0, 1]")]
    pub churn_probability: f64,
    #[schemars(description = "Churn flag as supplied by the source (0 or 1)")]
    pub churn_flag: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SalesTransaction {
    pub date: NaiveDate,
    #[schemars(description = "Foreign key into the customer table; may be unknown")]
    pub customer_id: String,
    pub product: String,
    pub country: String,
    pub units_sold: u32,
    #[schemars(description = "Unit price after discount")]
    pub unit_price: f64,
    pub shipping_amount: f64,
    pub tax: f64,
    pub discount: f64,
    pub total_revenue: f64,
    pub gross_profit: f64,
}

impl SalesTransaction {
    /// UnitPrice x UnitsSold + Shipping + Tax; the discount is already baked into the unit price.
    pub fn computed_total_revenue(&self) -> f64 {
        self.unit_price * self.units_sold as f64 + self.shipping_amount + self.tax
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct FinancialPeriod {
    #[schemars(description = "Valuation date of the period (one row per calendar month)")]
    pub date: NaiveDate,
    pub revenue: f64,
    #[schemars(description = "Expense amounts keyed by expense category column name")]
    pub expenses: BTreeMap<String, f64>,
    #[schemars(description = "Balance sheet amounts keyed by category column name")]
    pub balances: BTreeMap<String, f64>,
}

impl FinancialPeriod {
    pub fn total_expenses(&self) -> f64 {
        self.expenses.values().sum()
    }

    pub fn profit_or_loss(&self) -> f64 {
        self.revenue - self.total_expenses()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MarketingEvent {
    pub event_date: NaiveDate,
    pub channel: String,
    #[schemars(description = "Funnel depth, 1..=7")]
    pub event_sequence: u8,
    pub aov: f64,
    #[schemars(description = "1 when the event converted")]
    pub is_target: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct MediaSpendRecord {
    pub date: NaiveDate,
    pub channel: String,
    pub spend: f64,
}
