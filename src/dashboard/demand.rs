use super::{select_years, Dashboard, PreparedData};
use crate::aggregate::{group_by, group_by_with, Aggregation};
use crate::error::{PipelineError, Result};
use crate::metrics::{PRICE_ELASTICITY, SHIPPING_AND_TAX_RATIO};
use crate::schema::columns;
use crate::table::{KeyAtom, Table, Value};
use crate::utils::pct_change;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PRICE_SENSITIVITY: &str = "Price Sensitivity";

/// Products and years to show. An empty list selects everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemandSelection {
    pub products: Vec<String>,
    pub years: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemandPage {
    /// Units sold times price ratio, summed.
    pub revenue: f64,
    pub sales_volume: f64,
    /// Mean elasticity per (year, product); rows without an elasticity are ignored.
    pub elasticity_by_year: Table,
    /// Per-row elasticity against base price.
    pub elasticity_points: Table,
    pub shipping_and_tax: Table,
    pub sales_volume_by_year: Table,
    /// Mean base price and total units per (year, month).
    pub price_and_quantity_by_month: Table,
}

/// Units sold per (year, product) plus the year-over-year percentage change of each product.
pub fn sales_volume_by_year(products: &Table) -> Result<Table> {
    let yearly = group_by(
        products,
        &[columns::YEAR, columns::PRODUCT_NAME],
        &[Aggregation::sum(columns::UNITS_SOLD)],
    )?;

    let names = yearly.column(columns::PRODUCT_NAME)?;
    let units = yearly.f64_column(columns::UNITS_SOLD)?;
    let mut last_seen: HashMap<KeyAtom, f64> = HashMap::new();
    let mut sensitivity = Vec::with_capacity(yearly.len());
    for (name, units) in names.into_iter().zip(units) {
        let units = units.unwrap_or(0.0);
        let change = last_seen
            .insert(name.key(), units)
            .and_then(|previous| pct_change(previous, units))
            .map(|c| c * 100.0);
        sensitivity.push(Value::from(change));
    }
    yearly.with_column(PRICE_SENSITIVITY, sensitivity)
}

impl Dashboard {
    pub fn demand(&self, data: &PreparedData, selection: &DemandSelection) -> Result<DemandPage> {
        let products = data.products.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig("no demand data was provided".to_string())
        })?;
        info!(
            "Building demand page for {} products, {} years",
            selection.products.len(),
            selection.years.len()
        );

        let selected = if selection.products.is_empty() {
            products.clone()
        } else {
            let allowed: Vec<Value> = selection
                .products
                .iter()
                .map(|p| Value::from(p.as_str()))
                .collect();
            products.filter_in(columns::PRODUCT_NAME, &allowed)?
        };
        let selected = select_years(&selected, &selection.years)?;

        let units = selected.f64_column(columns::UNITS_SOLD)?;
        let ratios = selected.f64_column(columns::PRICE_RATIO)?;
        let revenue = units
            .iter()
            .zip(&ratios)
            .filter_map(|(u, r)| Some((*u)? * (*r)?))
            .sum();

        Ok(DemandPage {
            revenue,
            sales_volume: units.iter().flatten().sum(),
            elasticity_by_year: group_by(
                &selected,
                &[columns::YEAR, columns::PRODUCT_NAME],
                &[Aggregation::mean(PRICE_ELASTICITY)],
            )?,
            elasticity_points: selected.select(&[
                columns::YEAR,
                columns::PRODUCT_NAME,
                columns::BASE_PRICE,
                PRICE_ELASTICITY,
                columns::UNITS_SOLD,
            ])?,
            shipping_and_tax: selected.select(&[
                columns::PRODUCT_NAME,
                columns::DATE,
                SHIPPING_AND_TAX_RATIO,
                columns::BASE_PRICE,
                columns::UNITS_SOLD,
            ])?,
            sales_volume_by_year: sales_volume_by_year(&selected)?,
            price_and_quantity_by_month: group_by_with(
                &selected,
                &[columns::YEAR, columns::MONTH],
                &[
                    Aggregation::mean(columns::BASE_PRICE),
                    Aggregation::sum(columns::UNITS_SOLD),
                ],
                &self.group_options(),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{assert_close, dashboard, inputs};
    use super::*;

    #[test]
    fn test_elasticity_by_year_and_product() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.demand(&data, &DemandSelection::default()).unwrap();

        let table = &page.elasticity_by_year;
        assert_eq!(table.len(), 3);
        assert!(table.value(0, PRICE_ELASTICITY).unwrap().is_null());
        assert_close(table.value(1, PRICE_ELASTICITY).unwrap().as_f64().unwrap(), -1.0);
        assert_eq!(table.value(2, "Product").unwrap(), &Value::from("B"));
        assert_close(table.value(2, PRICE_ELASTICITY).unwrap().as_f64().unwrap(), -2.0);
    }

    #[test]
    fn test_volume_and_sensitivity() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let page = dashboard.demand(&data, &DemandSelection::default()).unwrap();

        assert_close(page.sales_volume, 320.0);
        assert_close(page.revenue, 339.0);

        let volume = &page.sales_volume_by_year;
        assert!(volume.value(0, PRICE_SENSITIVITY).unwrap().is_null());
        assert_eq!(volume.value(1, "Units Sold").unwrap(), &Value::Float(190.0));
        assert_close(volume.value(1, PRICE_SENSITIVITY).unwrap().as_f64().unwrap(), 90.0);
        assert!(volume.value(2, PRICE_SENSITIVITY).unwrap().is_null());

        let monthly = &page.price_and_quantity_by_month;
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly.value(0, "Month").unwrap(), &Value::from("Dec"));
        assert_eq!(monthly.value(1, "Base Price").unwrap(), &Value::Float(10.0));
        assert_eq!(monthly.value(1, "Units Sold").unwrap(), &Value::Float(220.0));
    }

    #[test]
    fn test_selection_and_undefined_shipping_ratio() {
        let dashboard = dashboard();
        let data = dashboard.prepare(&inputs()).unwrap();
        let only_b = DemandSelection {
            products: vec!["B".to_string()],
            years: vec![],
        };
        let page = dashboard.demand(&data, &only_b).unwrap();
        assert_eq!(page.elasticity_points.len(), 2);
        assert!(page
            .shipping_and_tax
            .value(0, SHIPPING_AND_TAX_RATIO)
            .unwrap()
            .is_null());
        assert_eq!(
            page.shipping_and_tax.value(1, SHIPPING_AND_TAX_RATIO).unwrap(),
            &Value::Float(0.2)
        );

        let only_2022 = DemandSelection {
            products: vec![],
            years: vec![2022],
        };
        let page = dashboard.demand(&data, &only_2022).unwrap();
        assert_close(page.sales_volume, 100.0);
    }

    #[test]
    fn test_missing_demand_data() {
        let dashboard = dashboard();
        let mut without = inputs();
        without.products = None;
        let data = dashboard.prepare(&without).unwrap();
        let err = dashboard.demand(&data, &DemandSelection::default()).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
