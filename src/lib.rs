//! Camera trap detection ingest.
//!
//! Reads the JSON report written by an image detector and reconciles it
//! against a catalog of image files held in SQLite, producing detection,
//! classification and category tables keyed to the catalog rows.

pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod scanner;

pub use error::IngestError;
pub use ingest::{ingest, IngestSummary};
