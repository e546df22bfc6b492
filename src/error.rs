use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, AnnotatorError>;

#[derive(Debug, thiserror::Error)]
pub enum AnnotatorError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Schema violation in {document}, record {record}: {reason}")]
    SchemaViolation {
        document: String,
        record: String,
        reason: String,
    },

    #[error("Folder '{folder}' is provided by both {} and {}", first.display(), second.display())]
    DuplicateFolder {
        folder: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Folder not loaded: {0}")]
    UnknownFolder(String),

    #[error("Image '{file_name}' is not listed in folder '{folder}'")]
    UnknownImage { folder: String, file_name: String },

    #[error("No image is loaded")]
    NoImageLoaded,

    #[error("Folder '{folder}' has no category named '{category}'")]
    CategoryUnavailable { folder: String, category: String },

    #[error("Invalid session state in {}: {reason}", path.display())]
    InvalidSessionState { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnnotatorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn schema(
        document: impl Into<String>,
        record: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SchemaViolation {
            document: document.into(),
            record: record.into(),
            reason: reason.into(),
        }
    }
}
