use polars::prelude::*;
use tracing::info;

use crate::error::Result;

/// Encodes every boolean column as 1/0 integers for downstream tools that
/// cannot read booleans.
pub fn transform(mut df: DataFrame) -> Result<DataFrame> {
    let boolean_columns: Vec<String> = df
        .get_columns()
        .iter()
        .filter(|column| column.dtype() == &DataType::Boolean)
        .map(|column| column.name().to_string())
        .collect();

    for name in &boolean_columns {
        let encoded = df
            .column(name)?
            .as_materialized_series()
            .cast(&DataType::Int32)?;
        df.with_column(encoded)?;
    }

    info!(encoded = boolean_columns.len(), "Boolean columns encoded");
    Ok(df)
}
