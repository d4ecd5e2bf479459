pub mod analysis;
pub mod charts;
pub mod checkpoint;
pub mod cleaning;
pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod persistence;
pub mod pipelines;
pub mod schema;
pub mod transformation;
pub mod validation;
