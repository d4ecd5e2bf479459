// crates/dmart-core/src/validation.rs

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::info;

use crate::checkpoint;
use crate::error::{DmartError, Result};
use crate::schema::{self, ColumnKind, SALES_COLUMNS};

/// The validation gate: rejects the whole batch on the first violated rule
/// and writes the accepted table to its checkpoint.
#[derive(Debug, Clone)]
pub struct DataValidation {
    order_date_format: String,
    checkpoint_path: PathBuf,
}

impl DataValidation {
    pub fn new(order_date_format: impl Into<String>, checkpoint_path: impl Into<PathBuf>) -> Self {
        Self {
            order_date_format: order_date_format.into(),
            checkpoint_path: checkpoint_path.into(),
        }
    }

    pub fn validate(&self, raw: DataFrame) -> Result<DataFrame> {
        let validated = validate_frame(raw, &self.order_date_format)?;
        checkpoint::write_csv(&validated, &self.checkpoint_path)?;
        Ok(validated)
    }
}

/// Runs every check in its fixed order: schema, null policy, datatype,
/// business rules. The first failing check wins.
pub fn validate_frame(raw: DataFrame, order_date_format: &str) -> Result<DataFrame> {
    if raw.height() == 0 {
        return Err(DmartError::Ingestion("raw table has no rows".to_string()));
    }

    check_schema(&raw)?;
    check_null_policy(&raw)?;
    check_types(&raw, order_date_format)?;
    check_business_rules(&raw)?;

    info!(rows = raw.height(), columns = raw.width(), "Validation passed");
    Ok(raw)
}

pub fn check_schema(df: &DataFrame) -> Result<()> {
    let present: HashSet<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let expected: HashSet<&str> = schema::expected_column_names().collect();

    let missing: Vec<String> = schema::expected_column_names()
        .filter(|name| !present.contains(*name))
        .map(str::to_string)
        .collect();
    let unexpected: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .filter(|name| !expected.contains(name.as_str()))
        .collect();

    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(DmartError::Schema {
            missing,
            unexpected,
        })
    }
}

pub fn check_null_policy(df: &DataFrame) -> Result<()> {
    let mut counts = BTreeMap::new();
    for spec in SALES_COLUMNS.iter().filter(|spec| !spec.nullable) {
        let nulls = df.column(spec.name)?.null_count();
        if nulls > 0 {
            counts.insert(spec.name.to_string(), nulls);
        }
    }

    if counts.is_empty() {
        Ok(())
    } else {
        Err(DmartError::NullPolicy { counts })
    }
}

pub fn check_types(df: &DataFrame, order_date_format: &str) -> Result<()> {
    for spec in SALES_COLUMNS.iter() {
        let column = df.column(spec.name)?;
        match spec.kind {
            ColumnKind::Date => check_order_date(column, order_date_format)?,
            // CSV inference types a column with no values at all as String
            ColumnKind::Numeric
                if !schema::is_numeric_dtype(column.dtype())
                    && !(spec.nullable && column.null_count() == column.len()) =>
            {
                return Err(DmartError::Type {
                    column: spec.name.to_string(),
                    message: format!("expected a numeric column, found {}", column.dtype()),
                });
            }
            ColumnKind::Boolean if column.dtype() != &DataType::Boolean => {
                return Err(DmartError::Type {
                    column: spec.name.to_string(),
                    message: format!("expected a boolean column, found {}", column.dtype()),
                });
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_order_date(column: &Column, format: &str) -> Result<()> {
    match column.dtype() {
        DataType::Date | DataType::Datetime(_, _) => Ok(()),
        DataType::String => {
            let values = column.str()?;
            let mut failures = 0usize;
            let mut first_bad: Option<String> = None;
            for value in values.into_iter().flatten() {
                if !parses_strictly(value, format) {
                    failures += 1;
                    if first_bad.is_none() {
                        first_bad = Some(value.to_string());
                    }
                }
            }
            match first_bad {
                None => Ok(()),
                Some(sample) => Err(DmartError::Type {
                    column: column.name().to_string(),
                    message: format!(
                        "{} value(s) do not match '{}', first: '{}'",
                        failures, format, sample
                    ),
                }),
            }
        }
        other => Err(DmartError::Type {
            column: column.name().to_string(),
            message: format!("expected a date column, found {}", other),
        }),
    }
}

/// Padding is not part of any layout, so padded values are rejected too.
fn parses_strictly(value: &str, format: &str) -> bool {
    if value.trim() != value {
        return false;
    }
    NaiveDateTime::parse_from_str(value, format).is_ok()
        || NaiveDate::parse_from_str(value, format).is_ok()
}

pub fn check_business_rules(df: &DataFrame) -> Result<()> {
    for spec in SALES_COLUMNS.iter() {
        let Some(rule) = spec.rule else {
            continue;
        };

        let values = df.column(spec.name)?.cast(&DataType::Float64)?;
        let violations = values
            .f64()?
            .into_iter()
            .flatten()
            .filter(|value| !rule.accepts(*value))
            .count();

        if violations > 0 {
            return Err(DmartError::BusinessRule {
                column: spec.name.to_string(),
                rule: rule.describe().to_string(),
                violations,
            });
        }
    }
    Ok(())
}
