use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::{self, DISCOUNT, ORDER_DATE, PROFIT, QUANTITY, SALES_AMOUNT};

/// Layouts tried, in order, when cleaning string order dates.
const LENIENT_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];
const LENIENT_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

/// Cleans a validated table. The steps run in a fixed order because the
/// business filter must see the zero-filled discounts.
pub fn clean(df: DataFrame) -> Result<DataFrame> {
    let initial_rows = df.height();
    info!(rows = initial_rows, columns = df.width(), "Cleaning started");

    let df = fill_business_nulls(df)?;
    let df = parse_order_dates(df)?;
    let df = drop_duplicate_rows(df)?;
    let df = apply_business_filters(df)?;
    let df = encode_categoricals(df)?;

    info!(
        rows = df.height(),
        dropped = initial_rows - df.height(),
        "Cleaning finished"
    );
    Ok(df)
}

/// A missing Discount means no discount was given and a missing Profit
/// means none was recorded, so both become zero.
pub fn fill_business_nulls(df: DataFrame) -> Result<DataFrame> {
    let filled = df
        .lazy()
        .with_columns([DISCOUNT, PROFIT].map(|name| {
            col(name)
                .cast(DataType::Float64)
                .fill_null(lit(0.0))
                .alias(name)
        }))
        .collect()?;
    Ok(filled)
}

/// Unlike validation, unparseable dates become null instead of failing.
pub fn parse_order_dates(mut df: DataFrame) -> Result<DataFrame> {
    if !df
        .get_column_names()
        .iter()
        .any(|name| name.as_str() == ORDER_DATE)
    {
        return Ok(df);
    }

    let column = df.column(ORDER_DATE)?;
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);
    let parsed = match column.dtype() {
        DataType::Datetime(_, _) | DataType::Date => {
            column.as_materialized_series().cast(&target)?
        }
        _ => {
            let as_text = column.cast(&DataType::String)?;
            let millis: Vec<Option<i64>> = as_text
                .str()?
                .into_iter()
                .map(|value| value.and_then(parse_lenient).map(|dt| dt.and_utc().timestamp_millis()))
                .collect();
            let unknown = millis.iter().filter(|value| value.is_none()).count();
            if unknown > 0 {
                debug!(unknown, "Order dates marked unknown");
            }
            Series::new(ORDER_DATE.into(), millis).cast(&target)?
        }
    };

    df.with_column(parsed)?;
    Ok(df)
}

fn parse_lenient(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    LENIENT_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            LENIENT_DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Keeps the first occurrence of each row, comparing every column. Nulls
/// compare equal, as do `0.0` and `-0.0`.
pub fn drop_duplicate_rows(df: DataFrame) -> Result<DataFrame> {
    let height = df.height();
    let deduped = df
        .lazy()
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;

    let removed = height - deduped.height();
    if removed > 0 {
        debug!(removed, "Duplicate rows dropped");
    }
    Ok(deduped)
}

/// Quantity > 0, SalesAmount > 0 and Discount within [0, 1].
pub fn apply_business_filters(df: DataFrame) -> Result<DataFrame> {
    let value = |name: &str| col(name).cast(DataType::Float64);
    let filtered = df
        .lazy()
        .filter(
            value(QUANTITY)
                .gt(lit(0.0))
                .and(value(SALES_AMOUNT).gt(lit(0.0)))
                .and(value(DISCOUNT).gt_eq(lit(0.0)))
                .and(value(DISCOUNT).lt_eq(lit(1.0))),
        )
        .collect()?;
    Ok(filtered)
}

/// Identifier columns and ShipMode become a categorical domain.
pub fn encode_categoricals(mut df: DataFrame) -> Result<DataFrame> {
    let targets: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| schema::is_categorical_column(name))
        .collect();

    let categorical = DataType::Categorical(None, CategoricalOrdering::Physical);
    for name in targets {
        let column = df.column(&name)?;
        if matches!(column.dtype(), DataType::Categorical(_, _)) {
            continue;
        }
        let encoded = column
            .as_materialized_series()
            .cast(&DataType::String)?
            .cast(&categorical)?;
        df.with_column(encoded)?;
    }
    Ok(df)
}
