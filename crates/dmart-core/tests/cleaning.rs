mod common;

use polars::prelude::*;

use dmart_core::cleaning::{
    apply_business_filters, clean, drop_duplicate_rows, fill_business_nulls, parse_order_dates,
};
use dmart_core::validation::validate_frame;

use common::{as_text, sales_frame, sample_frame, sample_rows, SalesRow};

fn f64_values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
    df.column(name)
        .unwrap()
        .cast(&DataType::Float64)
        .unwrap()
        .f64()
        .unwrap()
        .into_iter()
        .collect()
}

#[test]
fn business_nulls_become_zero() {
    let mut rows = sample_rows(4);
    rows[0].discount = None;
    rows[2].profit = None;

    let filled = fill_business_nulls(sales_frame(&rows)).unwrap();
    assert_eq!(filled.column("Discount").unwrap().null_count(), 0);
    assert_eq!(filled.column("Profit").unwrap().null_count(), 0);
    assert_eq!(f64_values(&filled, "Discount")[0], Some(0.0));
    assert_eq!(f64_values(&filled, "Profit")[2], Some(0.0));
}

#[test]
fn unparseable_order_dates_become_null() {
    let mut rows = sample_rows(3);
    rows[0].order_date = "2024-02-29".to_string();
    rows[1].order_date = "02/03/2024".to_string();
    rows[2].order_date = "sometime".to_string();

    let parsed = parse_order_dates(sales_frame(&rows)).unwrap();
    let dates = parsed.column("OrderDate").unwrap();
    assert_eq!(
        dates.dtype(),
        &DataType::Datetime(TimeUnit::Milliseconds, None)
    );

    let millis: Vec<Option<i64>> = dates
        .cast(&DataType::Int64)
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect();
    let leap_day = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis();
    assert_eq!(millis[0], Some(leap_day));
    assert!(millis[1].is_some());
    assert_eq!(millis[2], None);
}

#[test]
fn five_duplicate_pairs_reduce_one_hundred_rows_to_ninety_five() {
    let mut rows = sample_rows(95);
    for idx in [3usize, 17, 40, 62, 90] {
        rows.push(rows[idx].clone());
    }
    let df = sales_frame(&rows);
    assert_eq!(df.height(), 100);

    let validated = validate_frame(df, "%Y-%m-%d").unwrap();
    let cleaned = clean(validated).unwrap();
    assert_eq!(cleaned.height(), 95);
}

#[test]
fn deduplication_keeps_first_occurrence() {
    let mut rows = sample_rows(3);
    let mut repeat = rows[1].clone();
    rows.push(repeat.clone());
    repeat.profit = Some(999.0);
    rows.push(repeat);

    let deduped = drop_duplicate_rows(sales_frame(&rows)).unwrap();
    assert_eq!(deduped.height(), 4);
    let ids: Vec<Option<i64>> = deduped
        .column("SalesID")
        .unwrap()
        .i64()
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3), Some(2)]);
}

#[test]
fn business_filters_drop_rows_outside_bounds() {
    let mut rows = sample_rows(5);
    rows[0].quantity = Some(0);
    rows[1].sales_amount = -10.0;
    rows[2].discount = Some(1.2);

    let filtered = apply_business_filters(sales_frame(&rows)).unwrap();
    assert_eq!(filtered.height(), 2);
}

#[test]
fn cleaned_rows_respect_bounds() {
    let mut rows = sample_rows(40);
    rows[7].discount = None;
    rows[12].profit = None;
    let cleaned = clean(sales_frame(&rows)).unwrap();

    assert!(f64_values(&cleaned, "Quantity")
        .into_iter()
        .all(|v| matches!(v, Some(q) if q > 0.0)));
    assert!(f64_values(&cleaned, "SalesAmount")
        .into_iter()
        .all(|v| matches!(v, Some(s) if s > 0.0)));
    assert!(f64_values(&cleaned, "Discount")
        .into_iter()
        .all(|v| matches!(v, Some(d) if (0.0..=1.0).contains(&d))));
}

#[test]
fn identifiers_and_ship_mode_become_categorical() {
    let cleaned = clean(sample_frame(10)).unwrap();

    for name in [
        "SalesID",
        "OrderID",
        "ProductID",
        "CustomerID",
        "RegionID",
        "LocationID",
        "ShipMode",
    ] {
        assert!(
            matches!(
                cleaned.column(name).unwrap().dtype(),
                DataType::Categorical(_, _)
            ),
            "{} should be categorical",
            name
        );
    }
    assert_eq!(
        cleaned.column("FeedbackProvided").unwrap().dtype(),
        &DataType::Boolean
    );
}

#[test]
fn cleaning_is_idempotent() {
    let mut rows = sample_rows(30);
    rows.push(SalesRow::new(4));
    rows.push(SalesRow::new(9));
    rows[2].discount = None;

    let once = clean(sales_frame(&rows)).unwrap();
    let twice = clean(once.clone()).unwrap();

    assert_eq!(once.height(), twice.height());
    assert!(as_text(&once).equals_missing(&as_text(&twice)));
}

#[test]
fn sample_csv_cleans_without_losing_valid_rows() {
    let raw = dmart_core::checkpoint::read_csv(&common::fixture("sales_sample.csv")).unwrap();
    assert_eq!(raw.column("Quantity").unwrap().dtype(), &DataType::Int64);

    let validated = validate_frame(raw, "%Y-%m-%d").unwrap();
    let cleaned = clean(validated).unwrap();
    assert_eq!(cleaned.height(), 11);
}

#[test]
fn rows_differing_only_by_signed_zero_discount_are_duplicates() {
    let mut rows = sample_rows(2);
    rows[0].discount = Some(0.0);
    let mut repeat = rows[0].clone();
    repeat.discount = Some(-0.0);
    rows.push(repeat);

    let cleaned = clean(sales_frame(&rows)).unwrap();
    assert_eq!(cleaned.height(), 2);
    assert!(f64_values(&cleaned, "Discount")
        .into_iter()
        .all(|v| v == Some(0.0)));
}
