use thiserror::Error;

/// Failures that abort an ingest run.
///
/// Per-image problems (paths outside the prefix, files no longer in the
/// catalog, malformed boxes) are never errors; they are counted in the
/// returned summary instead.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("detector results contain no images section")]
    MissingImages,

    #[error("catalog table not found: {0}")]
    MissingCatalog(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
