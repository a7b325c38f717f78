//! Sparse two-key tables with delimited-text and binary persistence, local or
//! on a remote host reached over OpenSSH, plus the configuration, reporting
//! and naming helpers that go with them.

pub mod config;
pub mod data;
pub mod error;
pub mod remote;
pub mod runtime;
pub mod store;

pub use config::{Configuration, Settings};
pub use data::{Cell, Parsable, ParserRegistry, Table, TableParsers, TypedParser};
pub use error::{
    ConfigError, LoadingError, NameExhaustedError, ParseError, PersistenceError, TransferError,
    UnsupportedTypeError,
};
pub use store::{BinaryCodec, CsvCodec, CsvDialect, TableContext, TableStore};
