use crate::chart_of_accounts::{CashFlowMapping, ChartOfAccounts};
use crate::error::{PipelineError, Result};
use crate::join::JoinKind;
use crate::metrics::{ChurnStrategyConfig, ElasticityColumns};
use crate::normalizer::{DateSource, SchemaNormalizer};
use crate::schema::columns;
use crate::utils::MONTHS;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything the pipeline would otherwise hard-code: which columns hold dates, how customers
/// are joined to sales, how churn is decided, and how statement fields roll up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    #[schemars(
        description = "Date column strategies, tried in order. The first whose column exists in a table is applied."
    )]
    pub date_candidates: Vec<DateSource>,

    #[schemars(
        description = "Join policy between sales and customers. Inner drops sales for unknown customers."
    )]
    pub customer_join: JoinKind,

    pub churn: ChurnStrategyConfig,

    #[schemars(description = "Statement field -> cash-flow bucket mapping")]
    pub cash_flow: CashFlowMapping,

    pub chart_of_accounts: ChartOfAccounts,

    pub elasticity: ElasticityColumns,

    #[schemars(description = "Twelve month labels in calendar order")]
    pub months: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            date_candidates: vec![
                DateSource::column(columns::VALUATION_DATE),
                DateSource::column(columns::DATE),
                DateSource::composite_key(columns::KEY, "_"),
                DateSource::column(columns::EVENT_DATETIME),
                DateSource::column("Created Date"),
                DateSource::column("Transaction_Date"),
                DateSource::column("Order Date"),
            ],
            customer_join: JoinKind::Inner,
            churn: ChurnStrategyConfig::default(),
            cash_flow: CashFlowMapping::standard(),
            chart_of_accounts: ChartOfAccounts::standard(),
            elasticity: ElasticityColumns::default(),
            months: MONTHS.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.date_candidates.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "at least one date candidate is required".to_string(),
            ));
        }
        for candidate in &self.date_candidates {
            if candidate.column_name().is_empty() {
                return Err(PipelineError::InvalidConfig(
                    "date candidate with an empty column name".to_string(),
                ));
            }
            if let DateSource::CompositeKey { column, separator } = candidate {
                if separator.is_empty() {
                    return Err(PipelineError::InvalidConfig(format!(
                        "composite key '{}' needs a non-empty separator",
                        column
                    )));
                }
            }
        }

        if let ChurnStrategyConfig::Threshold { threshold } = self.churn {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(PipelineError::InvalidConfig(format!(
                    "churn threshold {} is outside [0, 1]",
                    threshold
                )));
            }
        }

        let distinct: BTreeSet<&String> = self.months.iter().collect();
        if self.months.len() != 12 || distinct.len() != 12 {
            return Err(PipelineError::InvalidConfig(format!(
                "expected 12 distinct month labels, got {:?}",
                self.months
            )));
        }

        Ok(())
    }

    pub fn normalizer(&self) -> SchemaNormalizer {
        SchemaNormalizer::new(self.date_candidates.clone())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = Self::generate_json_schema();
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
