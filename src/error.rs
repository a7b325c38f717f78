use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A token that could not be turned into a value of its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse {text:?} as {type_tag}: {message}")]
pub struct ParseError {
    pub type_tag: String,
    pub text: String,
    pub message: String,
}

impl ParseError {
    pub fn new(type_tag: impl Into<String>, text: &str, message: impl ToString) -> Self {
        ParseError {
            type_tag: type_tag.into(),
            text: text.to_string(),
            message: message.to_string(),
        }
    }
}

/// Requested type tag has no registered parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_tag} is not supported for loading from text")]
pub struct UnsupportedTypeError {
    pub type_tag: String,
}

/// No unused name was drawn within the allowed number of rounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no unique name left in namespace {namespace:?} after {rounds} rounds")]
pub struct NameExhaustedError {
    pub namespace: String,
    pub rounds: u64,
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("illegal remote address: {0}")]
    IllegalAddress(String),

    #[error("authentication failed for {user}@{host}")]
    Authentication { user: String, host: String },

    #[error("connection to {host}:{port} failed: {message}")]
    Connection {
        host: String,
        port: u16,
        message: String,
    },

    #[error("copying {path} failed: {message}")]
    Copy { path: String, message: String },

    #[error("remote transfer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure while writing a table to its destination.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("cannot create directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot write {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("cannot write csv to {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("cannot encode table into {path:?}: {source}")]
    Encode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("remote persistence failed: {0}")]
    Transfer(#[from] TransferError),
}

/// Failure while reading a table from its source.
#[derive(Debug, Error)]
pub enum LoadingError {
    #[error("no table file at {0:?}")]
    NotFound(PathBuf),

    #[error("cannot read {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed table file {path:?} at line {line}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("cannot decode table from {path:?}: {source}")]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    UnsupportedType(#[from] UnsupportedTypeError),

    #[error("remote loading failed: {0}")]
    Transfer(#[from] TransferError),
}

impl LoadingError {
    pub(crate) fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            LoadingError::NotFound(path)
        } else {
            LoadingError::Io { path, source }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("malformed properties: {0}")]
    Properties(String),

    #[error("malformed json configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("json configuration must be an object at the top level")]
    JsonRoot,

    #[error("invalid value {value:?} for {key}: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}
