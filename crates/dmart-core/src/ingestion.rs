use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Column as _, Row, TypeInfo};
use tracing::info;

use crate::checkpoint;
use crate::db;
use crate::error::{DmartError, Result};

/// Where the raw table comes from. Every call is a full reload.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn describe(&self) -> String;
    async fn load(&self) -> Result<DataFrame>;
}

/// Reads `SELECT *` from one Postgres table.
#[derive(Debug, Clone)]
pub struct SqlSource {
    database_url: String,
    table_name: String,
}

impl SqlSource {
    pub fn new(database_url: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            table_name: table_name.into(),
        }
    }
}

#[async_trait]
impl RecordSource for SqlSource {
    fn describe(&self) -> String {
        format!("postgres table {}", self.table_name)
    }

    async fn load(&self) -> Result<DataFrame> {
        let query = format!("SELECT * FROM {}", db::quote_table_name(&self.table_name)?);

        let pool = db::connect(&self.database_url).await?;
        let fetched = sqlx::query(&query).fetch_all(&pool).await;
        pool.close().await;
        let rows = fetched?;

        info!(table = %self.table_name, rows = rows.len(), "Rows fetched from database");
        frame_from_rows(&rows)
    }
}

/// Reads a CSV export of the sales table.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for CsvSource {
    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }

    async fn load(&self) -> Result<DataFrame> {
        if !self.path.exists() {
            return Err(DmartError::Ingestion(format!(
                "file not found: {}",
                self.path.display()
            )));
        }
        checkpoint::read_csv(&self.path)
    }
}

/// Typed storage for one column while rows are decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnBuffer {
    Boolean(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    /// Days since the Unix epoch.
    Date(Vec<Option<i32>>),
    /// Microseconds since the Unix epoch.
    Timestamp(Vec<Option<i64>>),
}

impl ColumnBuffer {
    fn for_postgres_type(type_name: &str, capacity: usize) -> Self {
        match type_name {
            "BOOL" => ColumnBuffer::Boolean(Vec::with_capacity(capacity)),
            "INT2" | "INT4" | "INT8" => ColumnBuffer::Integer(Vec::with_capacity(capacity)),
            "FLOAT4" | "FLOAT8" | "NUMERIC" => ColumnBuffer::Float(Vec::with_capacity(capacity)),
            "DATE" => ColumnBuffer::Date(Vec::with_capacity(capacity)),
            "TIMESTAMP" | "TIMESTAMPTZ" => ColumnBuffer::Timestamp(Vec::with_capacity(capacity)),
            _ => ColumnBuffer::Text(Vec::with_capacity(capacity)),
        }
    }

    pub fn into_series(self, name: &str) -> Result<Series> {
        let name: PlSmallStr = name.into();
        let series = match self {
            ColumnBuffer::Boolean(values) => Series::new(name, values),
            ColumnBuffer::Integer(values) => Series::new(name, values),
            ColumnBuffer::Float(values) => Series::new(name, values),
            ColumnBuffer::Text(values) => Series::new(name, values),
            ColumnBuffer::Date(values) => Series::new(name, values).cast(&DataType::Date)?,
            ColumnBuffer::Timestamp(values) => Series::new(name, values)
                .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?,
        };
        Ok(series)
    }
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn push_cell(buffer: &mut ColumnBuffer, row: &PgRow, idx: usize, type_name: &str) -> Result<()> {
    match buffer {
        ColumnBuffer::Boolean(values) => values.push(row.try_get::<Option<bool>, _>(idx)?),
        ColumnBuffer::Integer(values) => {
            let value = match type_name {
                "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(i64::from),
                "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(i64::from),
                _ => row.try_get::<Option<i64>, _>(idx)?,
            };
            values.push(value);
        }
        ColumnBuffer::Float(values) => {
            let value = match type_name {
                "FLOAT4" => row.try_get::<Option<f32>, _>(idx)?.map(f64::from),
                "NUMERIC" => row
                    .try_get::<Option<Decimal>, _>(idx)?
                    .and_then(|d| d.to_f64()),
                _ => row.try_get::<Option<f64>, _>(idx)?,
            };
            values.push(value);
        }
        ColumnBuffer::Date(values) => {
            let value = row
                .try_get::<Option<NaiveDate>, _>(idx)?
                .map(|d| (d - epoch_date()).num_days() as i32);
            values.push(value);
        }
        ColumnBuffer::Timestamp(values) => {
            let value = if type_name == "TIMESTAMPTZ" {
                row.try_get::<Option<DateTime<Utc>>, _>(idx)?
                    .map(|dt| dt.timestamp_micros())
            } else {
                row.try_get::<Option<NaiveDateTime>, _>(idx)?
                    .map(|dt| dt.and_utc().timestamp_micros())
            };
            values.push(value);
        }
        ColumnBuffer::Text(values) => {
            let value = if type_name == "UUID" {
                row.try_get::<Option<uuid::Uuid>, _>(idx)?
                    .map(|id| id.to_string())
            } else {
                row.try_get::<Option<String>, _>(idx)?
            };
            values.push(value);
        }
    }
    Ok(())
}

/// Decodes Postgres rows into a DataFrame, one typed column per result column.
pub fn frame_from_rows(rows: &[PgRow]) -> Result<DataFrame> {
    let Some(first) = rows.first() else {
        return Err(DmartError::Ingestion("source table is empty".to_string()));
    };

    let layout: Vec<(String, String)> = first
        .columns()
        .iter()
        .map(|column| (column.name().to_string(), column.type_info().name().to_string()))
        .collect();

    let mut buffers: Vec<ColumnBuffer> = layout
        .iter()
        .map(|(_, type_name)| ColumnBuffer::for_postgres_type(type_name, rows.len()))
        .collect();

    for row in rows {
        for (idx, ((_, type_name), buffer)) in layout.iter().zip(buffers.iter_mut()).enumerate() {
            push_cell(buffer, row, idx, type_name)?;
        }
    }

    frame_from_buffers(
        layout
            .into_iter()
            .map(|(name, _)| name)
            .zip(buffers)
            .collect(),
    )
}

pub fn frame_from_buffers(columns: Vec<(String, ColumnBuffer)>) -> Result<DataFrame> {
    let mut built: Vec<Column> = Vec::with_capacity(columns.len());
    for (name, buffer) in columns {
        built.push(buffer.into_series(&name)?.into());
    }
    Ok(DataFrame::new(built)?)
}

/// Shuffles row positions with a fixed seed and cuts off the test share.
/// The test side gets `ceil(rows * test_size)` rows.
pub fn split_train_test(
    df: &DataFrame,
    test_size: f64,
    random_state: u64,
) -> Result<(DataFrame, DataFrame)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DmartError::Config(format!(
            "test_size must be within (0, 1), got {}",
            test_size
        )));
    }

    let rows = df.height();
    let mut positions: Vec<IdxSize> = (0..rows as IdxSize).collect();
    let mut rng = StdRng::seed_from_u64(random_state);
    positions.shuffle(&mut rng);

    let test_rows = ((rows as f64) * test_size).ceil() as usize;
    let (test_positions, train_positions) = positions.split_at(test_rows.min(rows));

    let train = df.take(&IdxCa::from_vec("idx".into(), train_positions.to_vec()))?;
    let test = df.take(&IdxCa::from_vec("idx".into(), test_positions.to_vec()))?;
    Ok((train, test))
}
