use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    /// An upload batch could not be indexed; `files` says what happened to each file
    #[error("{source}")]
    Build {
        files: Vec<loader::FileOutcome>,
        source: Box<ChatError>,
    },

    #[error("Please upload and process documents first.")]
    IndexNotReady,

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ChatError {
    /// Per-file outcomes carried by a failed build, empty for other errors
    #[inline]
    pub fn file_outcomes(&self) -> &[loader::FileOutcome] {
        match self {
            Self::Build { files, .. } => files,
            _ => &[],
        }
    }
}

pub mod commands;
pub mod completion;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod loader;
pub mod ollama;
pub mod prompt;
pub mod session;
