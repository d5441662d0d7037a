use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read data file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read archive {path:?}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("archive {0:?} contains no data file")]
    EmptyArchive(PathBuf),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("column '{0}' not found in data file")]
    MissingColumn(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PassError {
    #[error("variable '{0}' is not a column of the dataset")]
    UnknownField(String),
}

/// Failure of a dashboard map request.
#[derive(Debug, Error)]
pub enum MapRequestError {
    #[error(transparent)]
    Pass(#[from] PassError),

    #[error("failed to encode map payload: {0}")]
    Encode(#[from] serde_json::Error),
}
