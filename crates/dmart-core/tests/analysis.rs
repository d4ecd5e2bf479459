mod common;

use polars::prelude::*;

use dmart_core::analysis::{DataAnalysis, DiscountBucket};
use dmart_core::cleaning::clean;
use dmart_core::error::DmartError;

use common::sample_frame;

fn measures(discount: Vec<f64>, profit: Vec<f64>) -> DataFrame {
    let rows = discount.len();
    DataFrame::new(vec![
        Series::new("Quantity".into(), vec![1i64; rows]).into(),
        Series::new("Discount".into(), discount).into(),
        Series::new("SalesAmount".into(), vec![50.0f64; rows]).into(),
        Series::new("Profit".into(), profit).into(),
    ])
    .unwrap()
}

#[test]
fn loss_rate_is_share_of_negative_profit_rows() {
    let profit = vec![5.0, -1.0, 3.0, -2.0, 8.0, 0.0, -4.0, 1.0, 2.0, 9.0];
    let df = measures(vec![0.1; 10], profit);

    let metrics = DataAnalysis::new(&df).basic_metrics().unwrap();
    assert_eq!(metrics.row_count, 10);
    assert_eq!(metrics.column_count, 4);
    assert_eq!(metrics.loss_rate, Some(0.3));
    assert_eq!(metrics.avg_discount, Some(0.1));
    assert_eq!(metrics.total_profit, 21.0);
    assert_eq!(metrics.avg_profit, Some(2.1));
}

#[test]
fn discount_buckets_report_only_observed_bins() -> PolarsResult<()> {
    let df = measures(vec![0.05, 0.05, 0.4], vec![10.0, 20.0, -5.0]);

    let buckets = DataAnalysis::new(&df).discount_bucket_profit().unwrap();
    assert_eq!(buckets.height(), 2);

    let labels: Vec<Option<&str>> = buckets.column("Discount_Bucket")?.str()?.into_iter().collect();
    let means: Vec<Option<f64>> = buckets.column("Profit")?.f64()?.into_iter().collect();
    assert_eq!(labels, vec![Some("Low"), Some("High")]);
    assert_eq!(means, vec![Some(15.0), Some(-5.0)]);
    Ok(())
}

#[test]
fn bucket_edges_are_closed_on_the_right() {
    assert_eq!(DiscountBucket::classify(0.0), None);
    assert_eq!(DiscountBucket::classify(0.1), Some(DiscountBucket::Low));
    assert_eq!(DiscountBucket::classify(0.3), Some(DiscountBucket::Medium));
    assert_eq!(DiscountBucket::classify(0.75), Some(DiscountBucket::VeryHigh));
    assert_eq!(DiscountBucket::classify(1.0), Some(DiscountBucket::Extreme));
    assert_eq!(DiscountBucket::VeryHigh.label(), "Very_High");
}

#[test]
fn missing_columns_surface_as_missing_column_errors() {
    let df = measures(vec![0.1], vec![1.0]).drop("Profit").unwrap();

    let err = DataAnalysis::new(&df).basic_metrics().unwrap_err();
    match err {
        DmartError::MissingColumn { columns } => assert_eq!(columns, vec!["Profit".to_string()]),
        other => panic!("expected a missing column error, got {:?}", other),
    }
}

#[test]
fn numerical_summary_matches_sample_statistics() -> PolarsResult<()> {
    let df = measures(vec![0.1, 0.2, 0.3, 0.4], vec![1.0, 2.0, 3.0, 4.0]);

    let summary = DataAnalysis::new(&df).numerical_summary().unwrap();
    assert_eq!(summary.height(), 4);

    let columns: Vec<Option<&str>> = summary.column("column")?.str()?.into_iter().collect();
    assert_eq!(
        columns,
        vec![Some("Quantity"), Some("Discount"), Some("SalesAmount"), Some("Profit")]
    );

    let profit = 3;
    let mean = summary.column("mean")?.f64()?.get(profit).unwrap();
    let std = summary.column("std")?.f64()?.get(profit).unwrap();
    let median = summary.column("50%")?.f64()?.get(profit).unwrap();
    let q25 = summary.column("25%")?.f64()?.get(profit).unwrap();
    assert!((mean - 2.5).abs() < 1e-12);
    assert!((std - 1.290_994_448_735_805_6).abs() < 1e-9);
    assert!((median - 2.5).abs() < 1e-12);
    assert!((q25 - 1.75).abs() < 1e-12);
    Ok(())
}

#[test]
fn correlation_matrix_has_unit_diagonal() -> PolarsResult<()> {
    let df = DataFrame::new(vec![
        Series::new("Quantity".into(), vec![1i64, 2, 3, 4]).into(),
        Series::new("Discount".into(), vec![0.4, 0.3, 0.2, 0.1]).into(),
        Series::new("SalesAmount".into(), vec![10.0, 20.0, 30.0, 40.0]).into(),
        Series::new("Profit".into(), vec![3.0, 1.0, 4.0, 1.5]).into(),
    ])?;

    let matrix = DataAnalysis::new(&df).correlation_matrix().unwrap();
    assert_eq!(matrix.height(), 4);
    assert_eq!(matrix.width(), 5);

    let quantity = matrix.column("Quantity")?.f64()?;
    let discount = matrix.column("Discount")?.f64()?;
    assert!((quantity.get(0).unwrap() - 1.0).abs() < 1e-9);
    assert!((discount.get(0).unwrap() + 1.0).abs() < 1e-9);
    assert!((quantity.get(2).unwrap() - 1.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn categorical_summary_counts_cleaned_table() {
    let cleaned = clean(sample_frame(12)).unwrap();
    let summary = DataAnalysis::new(&cleaned).categorical_summary().unwrap();

    let total: usize = summary.ship_mode.iter().map(|entry| entry.count).sum();
    assert_eq!(total, 12);
    assert_eq!(summary.ship_mode.len(), 4);
    assert!(summary
        .ship_mode
        .windows(2)
        .all(|pair| pair[0].count >= pair[1].count));

    let share: f64 = summary.feedback_provided.iter().map(|entry| entry.share).sum();
    assert!((share - 1.0).abs() < 1e-12);
    let provided = summary
        .feedback_provided
        .iter()
        .find(|entry| entry.value == "true")
        .unwrap();
    assert!((provided.share - 4.0 / 12.0).abs() < 1e-12);
}

#[test]
fn artifacts_are_written_to_the_eda_directory() {
    let dir = tempfile::tempdir().unwrap();
    let cleaned = clean(sample_frame(20)).unwrap();

    let report = DataAnalysis::new(&cleaned)
        .write_artifacts(&dir.path().join("eda"))
        .unwrap();
    assert_eq!(report.metrics.row_count, 20);
    assert_eq!(report.artifacts.len(), 5);
    for path in &report.artifacts {
        assert!(path.exists(), "{} missing", path.display());
    }
}
