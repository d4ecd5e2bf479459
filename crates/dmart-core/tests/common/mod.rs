#![allow(dead_code)]

use std::path::PathBuf;

use polars::prelude::*;

/// One raw sales record as it arrives from the source table.
#[derive(Debug, Clone)]
pub struct SalesRow {
    pub sales_id: i64,
    pub order_date: String,
    pub ship_mode: String,
    pub quantity: Option<i64>,
    pub discount: Option<f64>,
    pub sales_amount: f64,
    pub profit: Option<f64>,
    pub feedback_provided: bool,
}

impl SalesRow {
    pub fn new(sales_id: i64) -> Self {
        let ship_modes = ["Air", "Road", "Rail", "Sea"];
        Self {
            sales_id,
            order_date: format!("2024-{:02}-{:02}", sales_id % 12 + 1, sales_id % 28 + 1),
            ship_mode: ship_modes[(sales_id as usize) % ship_modes.len()].to_string(),
            quantity: Some(sales_id % 9 + 1),
            discount: Some(((sales_id % 10) as f64) / 10.0),
            sales_amount: 100.0 + sales_id as f64 * 2.5,
            profit: Some(if sales_id % 4 == 0 { -12.5 } else { 20.0 + sales_id as f64 }),
            feedback_provided: sales_id % 3 == 0,
        }
    }
}

pub fn sample_rows(count: i64) -> Vec<SalesRow> {
    (1..=count).map(SalesRow::new).collect()
}

/// Builds the raw sales table with every expected column.
pub fn sales_frame(rows: &[SalesRow]) -> DataFrame {
    let id = |offset: i64, modulo: i64| -> Vec<i64> {
        rows.iter().map(|row| offset + row.sales_id % modulo).collect()
    };

    DataFrame::new(vec![
        Series::new("SalesID".into(), rows.iter().map(|r| r.sales_id).collect::<Vec<_>>()).into(),
        Series::new("OrderID".into(), id(5000, 1_000_000)).into(),
        Series::new("ProductID".into(), id(300, 7)).into(),
        Series::new("CustomerID".into(), id(40, 11)).into(),
        Series::new("RegionID".into(), id(1, 4)).into(),
        Series::new("LocationID".into(), id(10, 9)).into(),
        Series::new(
            "OrderDate".into(),
            rows.iter().map(|r| r.order_date.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            "ShipMode".into(),
            rows.iter().map(|r| r.ship_mode.clone()).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("Quantity".into(), rows.iter().map(|r| r.quantity).collect::<Vec<_>>()).into(),
        Series::new("Discount".into(), rows.iter().map(|r| r.discount).collect::<Vec<_>>()).into(),
        Series::new(
            "SalesAmount".into(),
            rows.iter().map(|r| r.sales_amount).collect::<Vec<_>>(),
        )
        .into(),
        Series::new("Profit".into(), rows.iter().map(|r| r.profit).collect::<Vec<_>>()).into(),
        Series::new(
            "FeedbackProvided".into(),
            rows.iter().map(|r| r.feedback_provided).collect::<Vec<_>>(),
        )
        .into(),
    ])
    .unwrap()
}

pub fn sample_frame(count: i64) -> DataFrame {
    sales_frame(&sample_rows(count))
}

/// Casts every column to text so tables with categorical columns compare
/// by value.
pub fn as_text(df: &DataFrame) -> DataFrame {
    let columns: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|column| {
            column
                .as_materialized_series()
                .cast(&DataType::String)
                .unwrap()
                .into()
        })
        .collect();
    DataFrame::new(columns).unwrap()
}

pub fn fixture(name: &str) -> PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/data")
        .join(name)
}
