use super::{Dashboard, PreparedData};
use crate::aggregate::{group_by, Aggregation};
use crate::error::Result;
use crate::metrics::{
    channel_funnel, event_conversion_rate, event_sequence_funnel, top_channel, visitor_engagement,
};
use crate::schema::columns;
use crate::table::Table;
use crate::utils::mean;
use log::info;
use serde::Serialize;

pub const CONVERSIONS: &str = "Conversions";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketingPage {
    pub conversion_rate: f64,
    pub average_order_value: f64,
    pub total_order_value: f64,
    pub visitor_engagement: f64,
    pub top_channel: Option<String>,
    pub event_funnel: Table,
    pub aov_by_event_sequence: Table,
    pub channel_funnel: Table,
    /// Converted events per channel, most first.
    pub channel_performance: Table,
    pub aov_by_channel: Table,
}

impl Dashboard {
    pub fn marketing(&self, data: &PreparedData) -> Result<MarketingPage> {
        let events = &data.marketing_events;
        info!("Building marketing page over {} events", events.len());

        let aov: Vec<f64> = events.f64_column(columns::AOV)?.into_iter().flatten().collect();
        let converted = events.filter(|row| {
            row.get(columns::IS_TARGET)
                .and_then(|v| v.as_f64())
                .map(|t| t == 1.0)
                .unwrap_or(false)
        });
        let channel_performance = group_by(
            &converted,
            &[columns::CHANNEL],
            &[Aggregation::count(columns::IS_TARGET).alias(CONVERSIONS)],
        )?
        .sort_by_f64(CONVERSIONS, true)?;

        Ok(MarketingPage {
            conversion_rate: event_conversion_rate(events)?,
            average_order_value: mean(&aov).unwrap_or(0.0),
            total_order_value: aov.iter().sum(),
            visitor_engagement: visitor_engagement(events)?,
            top_channel: top_channel(events)?,
            event_funnel: event_sequence_funnel(events)?,
            aov_by_event_sequence: group_by(
                events,
                &[columns::EVENT_SEQUENCE],
                &[Aggregation::sum(columns::AOV)],
            )?,
            channel_funnel: channel_funnel(&data.media_spend, events)?,
            channel_performance,
            aov_by_channel: group_by(
                events,
                &[columns::CHANNEL],
                &[Aggregation::sum(columns::AOV)],
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{dashboard, inputs};
    use super::*;
    use crate::table::Value;

    #[test]
    fn test_marketing_scalars() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.marketing(&data).unwrap();

        assert_eq!(page.conversion_rate, 50.0);
        assert_eq!(page.average_order_value, 25.0);
        assert_eq!(page.total_order_value, 100.0);
        assert_eq!(page.visitor_engagement, 1.75);
        assert_eq!(page.top_channel.as_deref(), Some("Email"));
    }

    #[test]
    fn test_marketing_tables() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.marketing(&data).unwrap();

        let funnel = &page.event_funnel;
        assert_eq!(funnel.len(), 7);
        assert_eq!(funnel.value(0, "Conversion Rate").unwrap(), &Value::Float(50.0));
        assert_eq!(funnel.value(1, "Conversion Rate").unwrap(), &Value::Float(50.0));
        assert_eq!(funnel.value(2, "Conversion Rate").unwrap(), &Value::Float(100.0));
        assert_eq!(funnel.value(3, "Conversion Rate").unwrap(), &Value::Float(0.0));
        assert!(funnel.value(4, "Conversion Rate").unwrap().is_null());

        let spend = &page.channel_funnel;
        assert_eq!(spend.value(0, "Channel").unwrap(), &Value::from("Search"));
        assert_eq!(spend.value(0, "Percent Spend").unwrap(), &Value::Float(75.0));
        assert_eq!(spend.value(0, "Percent Conversion").unwrap(), &Value::Float(50.0));

        assert_eq!(page.channel_performance.len(), 2);
        assert_eq!(page.channel_performance.value(0, CONVERSIONS).unwrap(), &Value::Int(1));
        assert_eq!(page.aov_by_event_sequence.value(2, "AOV").unwrap(), &Value::Float(60.0));
        assert_eq!(page.aov_by_channel.value(1, "AOV").unwrap(), &Value::Float(60.0));
    }
}
