//! Small hand-checked dataset shared by the page tests.
//!
//! Every statement field of period `k` (1..=4) holds the value `k`, so yearly and monthly
//! roll-ups are easy to compute by hand.

use super::{Dashboard, DashboardInputs};
use crate::config::PipelineConfig;
use crate::ingestion::table_from_text_rows;
use crate::table::Table;

const CUSTOMERS: &str = "\
Customer ID,Join Date,Loyalty Group,Dash Segment,CLTV Monetary Value,Total Revenue,Churn,P notAlive
C1,2021-06-01,Gold,VIP,1000,500,0,0.9
C2,2021-12-01,Silver,Regular,400,200,0,0.1
C3,2022-12-01,Bronze,New,100,50,0,0.6
C4,2022-05-01,Gold,Loyal,800,300,0,0.2
";

const SALES: &str = "\
Valuation Date,Customer ID,Product Item Name,Conversion Country,Units Sold,Unit Price,Shipping Amount,Tax,Discount,Total Revenue,Gross Profit
2022-01-15,C1,Item A,US,2,10.0,1.0,2.0,0.0,23.0,6.9
2022-03-10,C2,Item B,UK,1,50.0,2.5,5.0,5.0,57.5,17.25
2023-01-20,C1,Item A,US,4,5.0,1.0,1.5,0.0,22.5,6.75
2023-01-25,C1,Item B,US,1,20.0,1.0,2.0,2.0,23.0,6.9
2023-02-02,C3,Item A,DE,3,10.0,1.0,3.0,0.0,34.0,10.2
2023-02-05,C9,Item C,US,1,10.0,1.0,1.0,0.0,12.0,3.6
";

const EVENTS: &str = "\
Event DateTime,Channel,Event Sequence,AOV,Is Target
2023-01-05 10:00:00,Email,1,0,0
2023-01-05 10:05:00,Email,2,40.0,1
2023-01-06 09:00:00,Search,1,0,0
2023-01-07 12:00:00,Search,3,60.0,1
not a date,Search,2,10.0,0
";

const MEDIA: &str = "\
Date,Channel,Media Spend
2023-01-01,Email,100
2023-01-01,Search,300
";

const PRODUCTS: &str = "\
Product,Key,Base Price,Price Ratio,Units Sold,Shipping,Tax
A,2022-12-30_A,10.0,1.0,100,1.0,1.0
A,2023-01-01_A,10.0,1.0,100,1.0,1.0
A,2023-01-02_A,10.0,1.1,90,1.0,1.0
B,2023-01-01_B,0.0,2.0,10,1.0,1.0
B,2023-01-02_B,20.0,1.0,20,2.0,2.0
";

pub const PERIODS: [&str; 4] = ["2022-01-31", "2022-02-28", "2023-01-31", "2023-02-28"];

pub const INCOME_FIELDS: [&str; 15] = [
    "Rev",
    "ReturnAllow",
    "CGS",
    "WageExp",
    "AdSpend",
    "BankFees",
    "DepExp",
    "Rent",
    "Supplies",
    "Utils",
    "PayrollTax",
    "OthExp",
    "Income Before Tax",
    "IncomeTax",
    "Profit or Loss",
];

pub const BALANCE_FIELDS: [&str; 20] = [
    "Cash",
    "Cash for Payroll",
    "Petty Cash",
    "Marketable Securities",
    "AR",
    "Inventory",
    "Allow",
    "Prepaid",
    "FixAsset",
    "AccumDep",
    "OtherAssets",
    "AP",
    "AL",
    "TP",
    "NP",
    "WP",
    "Stock",
    "Retained Earnings",
    "Distributable Earnings",
    "Net Earnings",
];

pub const CASH_FLOW_FIELDS: [&str; 14] = [
    "Increase in TP",
    "Increase in WP",
    "Decrease in AR",
    "Depreciations",
    "Increase in Inventory",
    "Increase Marketable Securities",
    "Increase Allowance for Bad Debt",
    "Increase Prepaid Expenses",
    "Net Asset Acquisitions",
    "Net Asset Sale",
    "Notes Payable",
    "Decrease in Note Payable",
    "New Stock Sold",
    "New Stock Repurchase",
];

pub fn parse_csv(name: &str, text: &str) -> Table {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());
    let header: Vec<String> = reader
        .headers()
        .unwrap()
        .iter()
        .map(|h| h.to_string())
        .collect();
    let header: Vec<&str> = header.iter().map(String::as_str).collect();
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(|c| c.to_string()).collect())
        .collect();
    table_from_text_rows(name, &header, rows).unwrap()
}

/// One row per period; `keyed` adds a composite `Key` column the way the cash-flow export does.
fn statement(name: &str, fields: &[&str], keyed: bool) -> Table {
    let mut header = vec!["Valuation Date".to_string()];
    if keyed {
        header.push("Key".to_string());
    }
    header.extend(fields.iter().map(|f| f.to_string()));

    let mut text = header.join(",");
    text.push('\n');
    for (k, period) in PERIODS.iter().enumerate() {
        let mut row = vec![period.to_string()];
        if keyed {
            row.push(format!("{}_{}", period, name));
        }
        row.extend(fields.iter().map(|_| (k + 1).to_string()));
        text.push_str(&row.join(","));
        text.push('\n');
    }
    parse_csv(name, &text)
}

pub fn inputs() -> DashboardInputs {
    DashboardInputs {
        customers: parse_csv("customers", CUSTOMERS),
        sales: parse_csv("sales", SALES),
        marketing_events: parse_csv("marketing_events", EVENTS),
        media_spend: parse_csv("media_spend", MEDIA),
        income: statement("income", &INCOME_FIELDS, false),
        balance: statement("balance", &BALANCE_FIELDS, false),
        cash_flow: statement("cash_flow", &CASH_FLOW_FIELDS, true),
        products: Some(parse_csv("products", PRODUCTS)),
    }
}

pub fn dashboard() -> Dashboard {
    Dashboard::new(PipelineConfig::default()).unwrap()
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
