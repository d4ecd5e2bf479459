use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use serde_json::json;

use crate::analysis::DataAnalysis;
use crate::error::Result;
use crate::schema::{DISCOUNT, FEEDBACK_PROVIDED, PROFIT, SALES_AMOUNT, SHIP_MODE};

/// Turns analysis results into chart artifacts. Drawing pixels is left to
/// whatever consumes the output.
pub trait ChartRenderer: Send + Sync {
    fn name(&self) -> &'static str;
    fn render(&self, analysis: &DataAnalysis<'_>, out_dir: &Path) -> Result<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Histogram {
    pub column: String,
    /// `bins + 1` edges; the last bin is closed on both sides.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

/// Writes the data behind the count plots, distributions and correlation
/// heatmap as JSON documents.
#[derive(Debug, Clone)]
pub struct ChartDataWriter {
    bins: usize,
}

impl Default for ChartDataWriter {
    fn default() -> Self {
        Self { bins: 30 }
    }
}

impl ChartDataWriter {
    pub fn with_bins(bins: usize) -> Self {
        Self { bins: bins.max(1) }
    }
}

impl ChartRenderer for ChartDataWriter {
    fn name(&self) -> &'static str {
        "chart_data_json"
    }

    fn render(&self, analysis: &DataAnalysis<'_>, out_dir: &Path) -> Result<Vec<PathBuf>> {
        analysis.require_columns(&[SHIP_MODE, FEEDBACK_PROVIDED, SALES_AMOUNT, PROFIT, DISCOUNT])?;
        fs::create_dir_all(out_dir)?;

        let categorical = analysis.categorical_summary()?;
        // 0/1 after the transform stage, booleans otherwise
        let feedback_counts =
            analysis.value_counts(col(FEEDBACK_PROVIDED).cast(DataType::Boolean))?;
        let countplots = json!({
            "ship_mode_counts": categorical.ship_mode,
            "feedback_provided_counts": feedback_counts,
        });

        let distributions: Vec<Histogram> = [SALES_AMOUNT, PROFIT, DISCOUNT]
            .iter()
            .map(|name| histogram(analysis.frame(), name, self.bins))
            .collect::<Result<_>>()?;

        let correlation = analysis.correlation_matrix()?;
        let names: Vec<String> = correlation
            .get_column_names()
            .iter()
            .skip(1)
            .map(|name| name.to_string())
            .collect();
        let mut matrix: Vec<Vec<Option<f64>>> = Vec::with_capacity(names.len());
        for row in 0..correlation.height() {
            let mut cells = Vec::with_capacity(names.len());
            for name in &names {
                cells.push(correlation.column(name)?.f64()?.get(row));
            }
            matrix.push(cells);
        }
        let heatmap = json!({ "columns": names, "values": matrix });

        let documents = [
            ("univariate_countplots.json", countplots),
            ("univariate_distributions.json", json!(distributions)),
            ("correlation_matrix.json", heatmap),
        ];

        let mut written = Vec::with_capacity(documents.len());
        for (file_name, document) in documents {
            let path = out_dir.join(file_name);
            fs::write(&path, serde_json::to_vec_pretty(&document)?)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Equal-width bins between the observed min and max. A constant column
/// gets the range `value ± 0.5`.
pub fn histogram(df: &DataFrame, column: &str, bins: usize) -> Result<Histogram> {
    let bins = bins.max(1);
    let values = df
        .clone()
        .lazy()
        .select([col(column).cast(DataType::Float64).alias("value")])
        .filter(col("value").is_not_null());

    let bounds = values
        .clone()
        .select([
            col("value").min().alias("low"),
            col("value").max().alias("high"),
        ])
        .collect()?;
    let (Some(mut low), Some(mut high)) = (
        bounds.column("low")?.f64()?.get(0),
        bounds.column("high")?.f64()?.get(0),
    ) else {
        return Ok(Histogram {
            column: column.to_string(),
            edges: Vec::new(),
            counts: Vec::new(),
        });
    };
    if low == high {
        low -= 0.5;
        high += 0.5;
    }

    let width = (high - low) / bins as f64;
    let last = (bins - 1) as f64;
    let position = (col("value") - lit(low)) / lit(width);
    let per_bin = values
        .select([when(position.clone().gt_eq(lit(last)))
            .then(lit(last))
            .otherwise(position)
            .cast(DataType::Int64)
            .alias("bin")])
        .group_by([col("bin")])
        .agg([len().cast(DataType::UInt64).alias("count")])
        .collect()?;

    let mut counts = vec![0usize; bins];
    let indices = per_bin.column("bin")?.i64()?;
    let totals = per_bin.column("count")?.u64()?;
    for (idx, count) in indices.into_iter().zip(totals.into_iter()) {
        if let (Some(idx), Some(count)) = (idx, count) {
            counts[(idx.max(0) as usize).min(bins - 1)] += count as usize;
        }
    }

    Ok(Histogram {
        column: column.to_string(),
        edges: (0..=bins).map(|i| low + width * i as f64).collect(),
        counts,
    })
}
