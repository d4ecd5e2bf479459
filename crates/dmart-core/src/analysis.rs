use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::checkpoint;
use crate::error::{DmartError, Result};
use crate::schema::{DISCOUNT, FEEDBACK_PROVIDED, NUMERIC_COLUMNS, PROFIT, SHIP_MODE};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BasicMetrics {
    pub row_count: usize,
    pub column_count: usize,
    /// Share of rows with negative profit. `None` for an empty table.
    pub loss_rate: Option<f64>,
    pub avg_discount: Option<f64>,
    pub avg_profit: Option<f64>,
    pub total_profit: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ColumnSummary {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub q50: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValueShare {
    pub value: String,
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoricalSummary {
    pub ship_mode: Vec<ValueCount>,
    pub feedback_provided: Vec<ValueShare>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiscountBucket {
    Low,
    Medium,
    High,
    VeryHigh,
    Extreme,
}

impl DiscountBucket {
    pub const ALL: [DiscountBucket; 5] = [
        DiscountBucket::Low,
        DiscountBucket::Medium,
        DiscountBucket::High,
        DiscountBucket::VeryHigh,
        DiscountBucket::Extreme,
    ];

    /// Bin edges; each bucket is right-closed, `(lower, upper]`.
    pub const EDGES: [f64; 6] = [0.0, 0.1, 0.3, 0.5, 0.75, 1.0];

    pub fn label(&self) -> &'static str {
        match self {
            DiscountBucket::Low => "Low",
            DiscountBucket::Medium => "Medium",
            DiscountBucket::High => "High",
            DiscountBucket::VeryHigh => "Very_High",
            DiscountBucket::Extreme => "Extreme",
        }
    }

    /// A discount of exactly 0 sits on the open lower edge and has no bucket.
    pub fn classify(discount: f64) -> Option<Self> {
        Self::ALL.iter().enumerate().find_map(|(idx, bucket)| {
            (discount > Self::EDGES[idx] && discount <= Self::EDGES[idx + 1]).then_some(*bucket)
        })
    }
}

/// Files written by [`DataAnalysis::write_artifacts`].
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub metrics: BasicMetrics,
    pub artifacts: Vec<PathBuf>,
}

/// Read-only statistics over a cleaned table.
pub struct DataAnalysis<'a> {
    df: &'a DataFrame,
}

impl<'a> DataAnalysis<'a> {
    pub fn new(df: &'a DataFrame) -> Self {
        Self { df }
    }

    pub fn frame(&self) -> &DataFrame {
        self.df
    }

    pub fn require_columns(&self, columns: &[&str]) -> Result<()> {
        let present: Vec<String> = self
            .df
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let missing: Vec<String> = columns
            .iter()
            .filter(|name| !present.iter().any(|p| p == *name))
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DmartError::MissingColumn { columns: missing })
        }
    }

    fn lazy(&self) -> LazyFrame {
        self.df.clone().lazy()
    }

    pub fn basic_metrics(&self) -> Result<BasicMetrics> {
        self.require_columns(&[PROFIT, DISCOUNT])?;

        let profit = || col(PROFIT).cast(DataType::Float64);
        let stats = self
            .lazy()
            .select([
                profit()
                    .lt(lit(0.0))
                    .fill_null(lit(false))
                    .cast(DataType::Float64)
                    .mean()
                    .alias("loss_rate"),
                col(DISCOUNT).cast(DataType::Float64).mean().alias("avg_discount"),
                profit().mean().alias("avg_profit"),
                profit().sum().alias("total_profit"),
            ])
            .collect()?;

        Ok(BasicMetrics {
            row_count: self.df.height(),
            column_count: self.df.width(),
            loss_rate: scalar(&stats, "loss_rate")?.map(|v| round_to(v, 4)),
            avg_discount: scalar(&stats, "avg_discount")?.map(|v| round_to(v, 4)),
            avg_profit: scalar(&stats, "avg_profit")?.map(|v| round_to(v, 2)),
            total_profit: round_to(scalar(&stats, "total_profit")?.unwrap_or(0.0), 2),
        })
    }

    pub fn describe_numeric(&self) -> Result<Vec<ColumnSummary>> {
        self.require_columns(&NUMERIC_COLUMNS)?;

        NUMERIC_COLUMNS
            .iter()
            .map(|name| {
                let value = || col(*name).cast(DataType::Float64);
                let quantile = |q: f64| value().quantile(lit(q), QuantileMethod::Linear);
                let stats = self
                    .lazy()
                    .select([
                        value().count().cast(DataType::UInt64).alias("count"),
                        value().mean().alias("mean"),
                        value().std(1).alias("std"),
                        value().min().alias("min"),
                        quantile(0.25).alias("q25"),
                        quantile(0.5).alias("q50"),
                        quantile(0.75).alias("q75"),
                        value().max().alias("max"),
                    ])
                    .collect()?;

                let count = stats.column("count")?.u64()?.get(0).unwrap_or(0);
                Ok(ColumnSummary {
                    column: name.to_string(),
                    count: count as usize,
                    mean: scalar(&stats, "mean")?,
                    std: scalar(&stats, "std")?,
                    min: scalar(&stats, "min")?,
                    q25: scalar(&stats, "q25")?,
                    q50: scalar(&stats, "q50")?,
                    q75: scalar(&stats, "q75")?,
                    max: scalar(&stats, "max")?,
                })
            })
            .collect()
    }

    /// One row per numeric column: count, mean, std, min, quartiles, max.
    pub fn numerical_summary(&self) -> Result<DataFrame> {
        let summaries = self.describe_numeric()?;

        let pick = |f: fn(&ColumnSummary) -> Option<f64>| -> Vec<Option<f64>> {
            summaries.iter().map(f).collect()
        };

        let df = DataFrame::new(vec![
            Series::new(
                "column".into(),
                summaries.iter().map(|s| s.column.as_str()).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "count".into(),
                summaries.iter().map(|s| s.count as u64).collect::<Vec<_>>(),
            )
            .into(),
            Series::new("mean".into(), pick(|s| s.mean)).into(),
            Series::new("std".into(), pick(|s| s.std)).into(),
            Series::new("min".into(), pick(|s| s.min)).into(),
            Series::new("25%".into(), pick(|s| s.q25)).into(),
            Series::new("50%".into(), pick(|s| s.q50)).into(),
            Series::new("75%".into(), pick(|s| s.q75)).into(),
            Series::new("max".into(), pick(|s| s.max)).into(),
        ])?;
        Ok(df)
    }

    /// Mean profit per discount bucket, listing only buckets that occur.
    pub fn discount_bucket_profit(&self) -> Result<DataFrame> {
        self.require_columns(&[DISCOUNT, PROFIT])?;

        let buckets = self
            .lazy()
            .with_columns([
                bucket_expr(|_, bucket| lit(bucket.label()), DataType::String)
                    .alias("Discount_Bucket"),
                bucket_expr(|upper, _| lit(upper), DataType::Float64).alias("bucket_upper"),
            ])
            .filter(col("bucket_upper").is_not_null())
            .group_by([col("Discount_Bucket")])
            .agg([
                col(PROFIT).cast(DataType::Float64).mean(),
                col("bucket_upper").first(),
            ])
            .sort(["bucket_upper"], SortMultipleOptions::default())
            .select([col("Discount_Bucket"), col(PROFIT)])
            .collect()?;
        Ok(buckets)
    }

    pub fn categorical_summary(&self) -> Result<CategoricalSummary> {
        self.require_columns(&[SHIP_MODE, FEEDBACK_PROVIDED])?;

        let ship_mode = self.value_counts(col(SHIP_MODE))?;

        let feedback = self.value_counts(col(FEEDBACK_PROVIDED).cast(DataType::Boolean))?;
        let total: usize = feedback.iter().map(|entry| entry.count).sum();
        let feedback_provided = feedback
            .into_iter()
            .map(|entry| ValueShare {
                share: if total == 0 {
                    0.0
                } else {
                    entry.count as f64 / total as f64
                },
                value: entry.value,
            })
            .collect();

        Ok(CategoricalSummary {
            ship_mode,
            feedback_provided,
        })
    }

    /// Counts per distinct non-null value of `values`, most frequent first,
    /// ties broken by label.
    pub fn value_counts(&self, values: Expr) -> Result<Vec<ValueCount>> {
        let counts = self
            .lazy()
            .select([values.cast(DataType::String).alias("value")])
            .filter(col("value").is_not_null())
            .group_by([col("value")])
            .agg([len().cast(DataType::UInt64).alias("count")])
            .sort(
                ["count", "value"],
                SortMultipleOptions::default().with_order_descending_multi([true, false]),
            )
            .collect()?;

        let labels = counts.column("value")?.str()?;
        let totals = counts.column("count")?.u64()?;
        Ok(labels
            .into_iter()
            .zip(totals.into_iter())
            .filter_map(|(value, count)| {
                Some(ValueCount {
                    value: value?.to_string(),
                    count: count? as usize,
                })
            })
            .collect())
    }

    /// Pearson correlation of the numeric columns. Constant columns yield null.
    pub fn correlation_matrix(&self) -> Result<DataFrame> {
        self.require_columns(&NUMERIC_COLUMNS)?;

        let value = |name: &str| col(name).cast(DataType::Float64);
        let pairs: Vec<Expr> = NUMERIC_COLUMNS
            .iter()
            .flat_map(|row| {
                NUMERIC_COLUMNS.iter().map(move |column| {
                    pearson_corr(value(row), value(column)).alias(format!("{}|{}", row, column))
                })
            })
            .collect();
        let coefficients = self.lazy().select(pairs).collect()?;

        let mut out: Vec<Column> =
            vec![Series::new("column".into(), NUMERIC_COLUMNS.to_vec()).into()];
        for column in NUMERIC_COLUMNS {
            let values = NUMERIC_COLUMNS
                .iter()
                .map(|row| {
                    let r = scalar(&coefficients, &format!("{}|{}", row, column))?;
                    Ok(r.filter(|v| v.is_finite()))
                })
                .collect::<Result<Vec<Option<f64>>>>()?;
            out.push(Series::new(column.into(), values).into());
        }
        Ok(DataFrame::new(out)?)
    }

    /// Computes every statistic and writes it under `dir`.
    pub fn write_artifacts(&self, dir: &Path) -> Result<AnalysisReport> {
        fs::create_dir_all(dir)?;
        let mut artifacts = Vec::new();

        let metrics = self.basic_metrics()?;
        info!(metrics = %serde_json::to_string(&metrics)?, "EDA metrics");
        let metrics_path = dir.join("metrics.json");
        fs::write(&metrics_path, serde_json::to_vec_pretty(&metrics)?)?;
        artifacts.push(metrics_path);

        let categorical_path = dir.join("categorical_summary.json");
        fs::write(
            &categorical_path,
            serde_json::to_vec_pretty(&self.categorical_summary()?)?,
        )?;
        artifacts.push(categorical_path);

        let tables = [
            ("numerical_summary.csv", self.numerical_summary()?),
            ("discount_bucket_profit.csv", self.discount_bucket_profit()?),
            ("correlation_matrix.csv", self.correlation_matrix()?),
        ];
        for (file_name, table) in tables {
            let path = dir.join(file_name);
            checkpoint::write_csv(&table, &path)?;
            artifacts.push(path);
        }

        Ok(AnalysisReport { metrics, artifacts })
    }
}

/// Nested `when/then` over the right-closed discount bins; rows outside every
/// bin get null.
/// `value` receives each bucket's upper edge and the bucket itself.
fn bucket_expr(value: impl Fn(f64, DiscountBucket) -> Expr, dtype: DataType) -> Expr {
    let discount = || col(DISCOUNT).cast(DataType::Float64);
    DiscountBucket::ALL
        .iter()
        .enumerate()
        .rev()
        .fold(lit(NULL).cast(dtype), |otherwise, (idx, bucket)| {
            when(
                discount()
                    .gt(lit(DiscountBucket::EDGES[idx]))
                    .and(discount().lt_eq(lit(DiscountBucket::EDGES[idx + 1]))),
            )
            .then(value(DiscountBucket::EDGES[idx + 1], *bucket))
            .otherwise(otherwise)
        })
}

/// First value of a one-row aggregate, as f64.
fn scalar(df: &DataFrame, name: &str) -> Result<Option<f64>> {
    let value = df.column(name)?.cast(&DataType::Float64)?;
    Ok(value.f64()?.get(0))
}

pub(crate) fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
