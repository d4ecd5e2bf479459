use std::fs::OpenOptions;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use tracing::info;

use crate::checkpoint;
use crate::db;
use crate::error::{DmartError, Result};

/// How an existing destination is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Refuse to write when the destination already exists.
    Fail,
    /// Drop and recreate the destination.
    Replace,
    /// Add rows to the destination, creating it when absent.
    Append,
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            WriteMode::Fail => "fail",
            WriteMode::Replace => "replace",
            WriteMode::Append => "append",
        };
        f.write_str(text)
    }
}

#[async_trait]
pub trait RecordSink: Send + Sync {
    fn describe(&self) -> String;
    async fn write(&self, frame: &DataFrame, destination: &str, mode: WriteMode) -> Result<()>;
}

/// Postgres caps bind parameters per statement at 65535.
const MAX_BIND_PARAMETERS: usize = 65_535;

/// Writes the table to Postgres in one transaction, then optionally calls a
/// stored procedure.
#[derive(Debug, Clone)]
pub struct SqlSink {
    database_url: String,
    post_write_procedure: Option<String>,
}

impl SqlSink {
    pub fn new(database_url: impl Into<String>, post_write_procedure: Option<String>) -> Self {
        Self {
            database_url: database_url.into(),
            post_write_procedure,
        }
    }
}

#[async_trait]
impl RecordSink for SqlSink {
    fn describe(&self) -> String {
        "postgres".to_string()
    }

    async fn write(&self, frame: &DataFrame, destination: &str, mode: WriteMode) -> Result<()> {
        let table = db::quote_table_name(destination)?;
        let columns = sql_columns(frame)?;
        if columns.is_empty() {
            return Err(DmartError::Persistence(
                "cannot write a table without columns".to_string(),
            ));
        }

        let pool = db::connect(&self.database_url).await?;
        let written = write_rows(&pool, &table, &columns, frame.height(), mode).await;
        let procedure = match (&written, &self.post_write_procedure) {
            (Ok(()), Some(name)) => call_procedure(&pool, name).await,
            _ => Ok(()),
        };
        pool.close().await;

        written?;
        procedure?;
        info!(table = destination, rows = frame.height(), mode = %mode, "Table written");
        Ok(())
    }
}

async fn write_rows(
    pool: &db::DbPool,
    table: &str,
    columns: &[SqlColumn],
    rows: usize,
    mode: WriteMode,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    let definition = columns
        .iter()
        .map(|column| format!("{} {}", db::quote_identifier(&column.name), column.values.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");

    match mode {
        WriteMode::Replace => {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *tx)
                .await?;
            sqlx::query(&format!("CREATE TABLE {} ({})", table, definition))
                .execute(&mut *tx)
                .await?;
        }
        WriteMode::Fail => {
            sqlx::query(&format!("CREATE TABLE {} ({})", table, definition))
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    DmartError::Persistence(format!("destination {} not created: {}", table, err))
                })?;
        }
        WriteMode::Append => {
            sqlx::query(&format!("CREATE TABLE IF NOT EXISTS {} ({})", table, definition))
                .execute(&mut *tx)
                .await?;
        }
    }

    let column_list = columns
        .iter()
        .map(|column| db::quote_identifier(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let rows_per_statement = (MAX_BIND_PARAMETERS / columns.len()).max(1);

    let mut start = 0;
    while start < rows {
        let end = (start + rows_per_statement).min(rows);
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, column_list));
        builder.push_values(start..end, |mut tuple, row| {
            for column in columns {
                column.values.bind(&mut tuple, row);
            }
        });
        builder.build().execute(&mut *tx).await?;
        start = end;
    }

    tx.commit().await?;
    Ok(())
}

async fn call_procedure(pool: &db::DbPool, name: &str) -> Result<()> {
    let statement = format!("CALL {}()", db::quote_table_name(name)?);
    sqlx::query(&statement)
        .execute(pool)
        .await
        .map_err(|err| DmartError::Persistence(format!("procedure {} failed: {}", name, err)))?;
    info!(procedure = name, "Post-write procedure executed");
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SqlValues {
    Boolean(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Date(Vec<Option<NaiveDate>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl SqlValues {
    pub(crate) fn sql_type(&self) -> &'static str {
        match self {
            SqlValues::Boolean(_) => "BOOLEAN",
            SqlValues::Integer(_) => "BIGINT",
            SqlValues::Float(_) => "DOUBLE PRECISION",
            SqlValues::Text(_) => "TEXT",
            SqlValues::Date(_) => "DATE",
            SqlValues::Timestamp(_) => "TIMESTAMP",
        }
    }

    fn bind<'args>(
        &self,
        tuple: &mut sqlx::query_builder::Separated<'_, 'args, Postgres, &'static str>,
        row: usize,
    ) {
        match self {
            SqlValues::Boolean(values) => {
                tuple.push_bind(values[row]);
            }
            SqlValues::Integer(values) => {
                tuple.push_bind(values[row]);
            }
            SqlValues::Float(values) => {
                tuple.push_bind(values[row]);
            }
            SqlValues::Text(values) => {
                tuple.push_bind(values[row].clone());
            }
            SqlValues::Date(values) => {
                tuple.push_bind(values[row]);
            }
            SqlValues::Timestamp(values) => {
                tuple.push_bind(values[row]);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlColumn {
    pub(crate) name: String,
    pub(crate) values: SqlValues,
}

/// Materializes each column into bindable values, choosing the SQL type
/// from the polars dtype. Categoricals are stored as text.
pub(crate) fn sql_columns(frame: &DataFrame) -> Result<Vec<SqlColumn>> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();

    frame
        .get_columns()
        .iter()
        .map(|column| {
            let series = column.as_materialized_series();
            let values = match series.dtype() {
                DataType::Boolean => SqlValues::Boolean(series.bool()?.into_iter().collect()),
                DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::UInt8
                | DataType::UInt16
                | DataType::UInt32 => SqlValues::Integer(
                    series.cast(&DataType::Int64)?.i64()?.into_iter().collect(),
                ),
                DataType::UInt64 | DataType::Float32 | DataType::Float64 => SqlValues::Float(
                    series.cast(&DataType::Float64)?.f64()?.into_iter().collect(),
                ),
                DataType::Date => SqlValues::Date(
                    series
                        .cast(&DataType::Int32)?
                        .i32()?
                        .into_iter()
                        .map(|days| {
                            days.and_then(|d| {
                                epoch.checked_add_signed(chrono::Duration::days(i64::from(d)))
                            })
                        })
                        .collect(),
                ),
                DataType::Datetime(unit, _) => {
                    let unit = *unit;
                    SqlValues::Timestamp(
                        series
                            .cast(&DataType::Int64)?
                            .i64()?
                            .into_iter()
                            .map(|raw| {
                                raw.and_then(|value| {
                                    let micros = match unit {
                                        TimeUnit::Nanoseconds => value / 1_000,
                                        TimeUnit::Microseconds => value,
                                        TimeUnit::Milliseconds => value * 1_000,
                                    };
                                    DateTime::<Utc>::from_timestamp_micros(micros)
                                        .map(|dt| dt.naive_utc())
                                })
                            })
                            .collect(),
                    )
                }
                _ => SqlValues::Text(
                    series
                        .cast(&DataType::String)?
                        .str()?
                        .into_iter()
                        .map(|value| value.map(str::to_string))
                        .collect(),
                ),
            };
            Ok(SqlColumn {
                name: column.name().to_string(),
                values,
            })
        })
        .collect()
}

/// Writes `<dir>/<destination>.csv`, honouring the write mode.
#[derive(Debug, Clone)]
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, destination: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", destination))
    }
}

#[async_trait]
impl RecordSink for CsvSink {
    fn describe(&self) -> String {
        format!("csv directory {}", self.dir.display())
    }

    async fn write(&self, frame: &DataFrame, destination: &str, mode: WriteMode) -> Result<()> {
        let path = self.path_for(destination);
        let exists = path.exists();

        match mode {
            WriteMode::Fail if exists => Err(DmartError::Persistence(format!(
                "destination {} already exists",
                path.display()
            ))),
            WriteMode::Append if exists => {
                let mut file = OpenOptions::new().append(true).open(&path)?;
                let mut clone = frame.clone();
                CsvWriter::new(&mut file)
                    .include_header(false)
                    .finish(&mut clone)?;
                info!(path = %path.display(), rows = frame.height(), "Rows appended");
                Ok(())
            }
            _ => checkpoint::write_csv(frame, &path),
        }
    }
}
