use std::fs::{self, File};
use std::path::Path;

use polars::prelude::*;
use tracing::info;

use crate::error::Result;

/// Writes the frame as CSV with a header row and no index column,
/// replacing whatever a previous run left at `path`.
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = File::create(path)?;
    let mut clone = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut clone)?;

    info!(path = %path.display(), rows = df.height(), "Checkpoint written");
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}
