// crates/dmart-core/src/config.rs

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DmartError, Result};
use crate::persistence::WriteMode;

/// Connection settings read from the environment (`.env` is honoured by the binary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    pub host: String,
    pub database: String,
    pub driver: String,
    pub table_name: String,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl DatabaseSettings {
    pub const HOST_VAR: &'static str = "DB_SERVER";
    pub const DATABASE_VAR: &'static str = "DB_DATABASE";
    pub const DRIVER_VAR: &'static str = "DB_DRIVER";
    pub const TABLE_VAR: &'static str = "TABLE_NAME";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the settings from an arbitrary key lookup. Every required key
    /// that is missing or blank is reported in a single error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = read(Self::HOST_VAR);
        let database = read(Self::DATABASE_VAR);
        let driver = read(Self::DRIVER_VAR);
        let table_name = read(Self::TABLE_VAR);

        let missing: Vec<&str> = [
            (Self::HOST_VAR, host.is_none()),
            (Self::DATABASE_VAR, database.is_none()),
            (Self::DRIVER_VAR, driver.is_none()),
            (Self::TABLE_VAR, table_name.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        let (Some(host), Some(database), Some(driver), Some(table_name)) =
            (host, database, driver, table_name)
        else {
            return Err(DmartError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        };

        let port = match read("DB_PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| {
                DmartError::Config(format!("DB_PORT '{}' is not a valid port", raw))
            })?),
            None => None,
        };

        Ok(Self {
            host,
            database,
            driver,
            table_name,
            port,
            user: read("DB_USER"),
            password: read("DB_PASSWORD"),
        })
    }

    /// Assembles the connection URL. Only the Postgres driver is compiled in.
    pub fn connection_url(&self) -> Result<String> {
        let scheme = match self.driver.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => "postgres",
            other => {
                return Err(DmartError::Config(format!(
                    "unsupported database driver '{}'",
                    other
                )))
            }
        };

        let credentials = match (&self.user, &self.password) {
            (Some(user), Some(password)) => format!("{}:{}@", user, password),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        let port = self.port.map(|p| format!(":{}", p)).unwrap_or_default();

        Ok(format!(
            "{}://{}{}{}/{}",
            scheme, credentials, self.host, port, self.database
        ))
    }
}

/// Which optional stages run. Ingest, Validate and Clean always run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StageToggles {
    /// Write a seeded train/test split next to the raw checkpoint. Default: on.
    pub split_train_test: bool,
    /// Encode boolean columns as integers after cleaning. Default: off.
    pub transform: bool,
    /// Compute and persist descriptive statistics. Default: on.
    pub analyze: bool,
    /// Emit chart data through the configured renderer. Default: on.
    pub render_charts: bool,
    /// Write `cleaned_data.csv`. Default: on.
    pub persist_csv: bool,
    /// Write the cleaned table to the database sink. Default: on.
    pub persist_database: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            split_train_test: true,
            transform: false,
            analyze: true,
            render_charts: true,
            persist_csv: true,
            persist_database: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SplitSettings {
    /// Fraction of rows written to the test file. Default: 0.2.
    pub test_size: f64,
    /// Seed for the row shuffle. Default: 42.
    pub random_state: u64,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_state: 42,
        }
    }
}

/// Everything a run needs besides the database connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    /// Root of every checkpoint and artifact. Default: `artifacts`.
    pub artifacts_dir: PathBuf,
    /// Strict layout for string OrderDate values at validation. Default: `%Y-%m-%d`.
    pub order_date_format: String,
    /// Destination table for the cleaned data. Default: `DMART_Cleaned`.
    pub sink_table: String,
    /// Default: `replace`.
    pub write_mode: WriteMode,
    /// Stored procedure invoked after a successful database write.
    pub post_write_procedure: Option<String>,
    pub stages: StageToggles,
    pub split: SplitSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            order_date_format: "%Y-%m-%d".to_string(),
            sink_table: "DMART_Cleaned".to_string(),
            write_mode: WriteMode::Replace,
            post_write_procedure: None,
            stages: StageToggles::default(),
            split: SplitSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw)?;
        settings.check()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn check(&self) -> Result<()> {
        if !(self.split.test_size > 0.0 && self.split.test_size < 1.0) {
            return Err(DmartError::Config(format!(
                "split.test_size must be within (0, 1), got {}",
                self.split.test_size
            )));
        }
        if self.sink_table.trim().is_empty() {
            return Err(DmartError::Config("sink_table must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths::new(&self.artifacts_dir)
    }
}

/// Fixed checkpoint locations under the artifacts root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw: PathBuf,
    pub train: PathBuf,
    pub test: PathBuf,
    pub validated: PathBuf,
    pub cleaned: PathBuf,
    pub transformed: PathBuf,
    pub eda_dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            raw: root.join("raw_data.csv"),
            train: root.join("train_data.csv"),
            test: root.join("test_data.csv"),
            validated: root.join("validated").join("validated_data.csv"),
            cleaned: root.join("cleaned_data.csv"),
            transformed: root.join("transformed").join("transformed_data.csv"),
            eda_dir: root.join("eda"),
        }
    }
}
