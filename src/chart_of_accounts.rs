//! Static catalogue of financial statement fields and how they roll up.
//!
//! The income, balance and cash-flow statements arrive as wide tables with one column per
//! category. Which columns count as debt, which are operating cash flows and so on is fixed
//! here rather than inferred from the data.

use crate::error::{PipelineError, Result};
use crate::table::Table;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const INCOME_BEFORE_TAX: &str = "Income Before Tax";
pub const INCOME_TAX: &str = "IncomeTax";
pub const COST_OF_GOODS_SOLD: &str = "CGS";
pub const CASH: &str = "Cash";

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum CashFlowCategory {
    Operating,
    Investing,
    Financing,
    Total,
}

impl CashFlowCategory {
    pub const ALL: [CashFlowCategory; 4] = [
        CashFlowCategory::Total,
        CashFlowCategory::Operating,
        CashFlowCategory::Investing,
        CashFlowCategory::Financing,
    ];

    /// Output column name used for the bucket.
    pub fn label(&self) -> &'static str {
        match self {
            CashFlowCategory::Operating => "Operating Cash Flow",
            CashFlowCategory::Investing => "Investing Cash Flow",
            CashFlowCategory::Financing => "Financing Cash Flow",
            CashFlowCategory::Total => "Total Cash Flow",
        }
    }
}

/// Bucket -> field names. A field may feed more than one bucket (the total is a separate
/// balance-based roll-up, not the sum of the other three).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CashFlowMapping {
    pub buckets: BTreeMap<CashFlowCategory, Vec<String>>,
}

impl CashFlowMapping {
    pub fn new(buckets: BTreeMap<CashFlowCategory, Vec<String>>) -> Self {
        Self { buckets }
    }

    pub fn fields(&self, category: CashFlowCategory) -> &[String] {
        self.buckets
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn standard() -> Self {
        let total = strings(&[
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
        ]);
        let operating = strings(&[
            "WageExp",
            "AdSpend",
            "Rev",
            "ReturnAllow",
            "CGS",
            "BankFees",
            "DepExp",
            "Rent",
            "Supplies",
            "Utils",
            "PayrollTax",
            "OthExp",
            "Income Before Tax",
            "IncomeTax",
            "Increase in TP",
            "Increase in WP",
            "Decrease in AR",
            "Depreciations",
            "Increase in Inventory",
            "Increase Allowance for Bad Debt",
            "Increase Prepaid Expenses",
        ]);
        let investing = strings(&[
            "FixAsset",
            "Net Asset Acquisitions",
            "Net Asset Sale",
            "Marketable Securities",
            "Increase Marketable Securities",
        ]);
        let financing = strings(&[
            "NP",
            "Decrease in Note Payable",
            "New Stock Sold",
            "New Stock Repurchase",
        ]);

        Self::new(BTreeMap::from([
            (CashFlowCategory::Total, total),
            (CashFlowCategory::Operating, operating),
            (CashFlowCategory::Investing, investing),
            (CashFlowCategory::Financing, financing),
        ]))
    }
}

impl Default for CashFlowMapping {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ChartOfAccounts {
    /// Revenue lines (gross revenue plus returns and allowances).
    pub revenue: Vec<String>,
    pub cost_of_sales: Vec<String>,
    pub operating_expenses: Vec<String>,
    /// Operating expenses excluding wages and advertising, used by the margin ratios.
    pub overhead_expenses: Vec<String>,
    pub tax_expenses: Vec<String>,
    /// Every expense category column of the income statement, in statement order.
    pub expense_categories: Vec<String>,
    pub debt: Vec<String>,
    pub equity: Vec<String>,
    pub cash_in: Vec<String>,
    pub cash_out: Vec<String>,
}

impl ChartOfAccounts {
    pub fn standard() -> Self {
        Self {
            revenue: strings(&["Rev", "ReturnAllow"]),
            cost_of_sales: strings(&["CGS"]),
            operating_expenses: strings(&[
                "WageExp",
                "AdSpend",
                "BankFees",
                "DepExp",
                "Rent",
                "Supplies",
                "Utils",
                "PayrollTax",
                "OthExp",
            ]),
            overhead_expenses: strings(&[
                "DepExp",
                "BankFees",
                "Rent",
                "Supplies",
                "Utils",
                "PayrollTax",
                "OthExp",
            ]),
            tax_expenses: strings(&["IncomeTax"]),
            expense_categories: strings(&[
                "WageExp",
                "AdSpend",
                "ReturnAllow",
                "CGS",
                "BankFees",
                "DepExp",
                "Rent",
                "Supplies",
                "Utils",
                "PayrollTax",
                "OthExp",
                "IncomeTax",
            ]),
            debt: strings(&[
                "AP",
                "AL",
                "TP",
                "WP",
                "NP",
                "Increase in TP",
                "Increase in WP",
            ]),
            equity: strings(&["Stock", "Retained Earnings", "Distributable Earnings"]),
            cash_in: strings(&["Rev", "ReturnAllow", "New Stock Sold", "Net Asset Acquisitions"]),
            cash_out: strings(&[
                "WageExp",
                "AdSpend",
                "CGS",
                "DepExp",
                "Rent",
                "Supplies",
                "Utils",
                "PayrollTax",
                "OthExp",
                "IncomeTax",
                "NP",
                "AP",
                "New Stock Repurchase",
            ]),
        }
    }

    /// Verifies that every field listed under `section` exists in `table`.
    pub fn require_fields(table: &Table, fields: &[String]) -> Result<()> {
        for field in fields {
            if !table.has_column(field) {
                return Err(PipelineError::schema_mismatch(table.name(), field.as_str()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Section,Field\n");

        let sections: [(&str, &Vec<String>); 9] = [
            ("Revenue", &self.revenue),
            ("Cost of Sales", &self.cost_of_sales),
            ("Operating Expenses", &self.operating_expenses),
            ("Overhead Expenses", &self.overhead_expenses),
            ("Tax Expenses", &self.tax_expenses),
            ("Debt", &self.debt),
            ("Equity", &self.equity),
            ("Cash In", &self.cash_in),
            ("Cash Out", &self.cash_out),
        ];
        for (section, fields) in sections {
            for field in fields {
                output.push_str(&format!("{},{}\n", section, field));
            }
        }

        output
    }
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self::standard()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
