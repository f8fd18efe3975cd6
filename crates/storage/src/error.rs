use std::path::PathBuf;

use snafu::Snafu;

/// Persistence failures. Callers of the session identity provider never see these;
/// they are logged and the provider degrades to an in-memory identifier.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("storage id '{raw}' is invalid for {id_type}"))]
    InvalidId {
        stage: &'static str,
        id_type: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("failed to read store file at {path:?} on `{stage}`: {source}"))]
    ReadStoreFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("store file at {path:?} is not a JSON object on `{stage}`: {source}"))]
    ParseStoreFile {
        stage: &'static str,
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("failed to serialize store contents on `{stage}`: {source}"))]
    SerializeStore {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to create store directory at {path:?} on `{stage}`: {source}"))]
    CreateStoreDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to write store file at {path:?} on `{stage}`: {source}"))]
    WriteStoreFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace store file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;
