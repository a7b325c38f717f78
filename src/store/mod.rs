//! Table persistence: the delimited-text codec (local or remote), the binary
//! codec, and the context that hands out tables and codecs.

pub mod binary;
pub mod csv;

use std::fs;
use std::hash::Hash;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::data::{Parsable, Table, TableParsers};
use crate::error::{LoadingError, PersistenceError};
use crate::remote::{self, RemoteTransport, StagingArea};
use crate::runtime::NameRegistry;

pub use self::binary::BinaryCodec;
pub use self::csv::{CsvCodec, CsvDialect, LineTerminator};

/// Somewhere tables can be written to and read back from.
pub trait TableStore<R, C, V> {
    fn persist(&self, table: &Table<R, C, V>, path: &str) -> Result<(), PersistenceError>;

    /// Reads a fresh table from `path`.
    fn load(&self, path: &str) -> Result<Table<R, C, V>, LoadingError>;

    /// Replaces the contents of `table` with what is stored at `path`. The
    /// table keeps its own null display.
    fn load_into(&self, table: &mut Table<R, C, V>, path: &str) -> Result<(), LoadingError> {
        let loaded = self.load(path)?;
        let null_display = table.null_display().to_string();
        *table = loaded;
        table.set_null_display(null_display);
        Ok(())
    }
}

pub(crate) fn ensure_parent_dir(path: &Path) -> Result<(), PersistenceError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            debug!(dir = %parent.display(), "creating directory");
            fs::create_dir_all(parent).map_err(|source| PersistenceError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Owns what tables and codecs share: settings, the staging directory, the
/// remote transport with its connection cache, and the name registry.
pub struct TableContext {
    settings: Settings,
    staging: Arc<StagingArea>,
    transport: Arc<dyn RemoteTransport>,
    names: NameRegistry,
    tables_created: AtomicU64,
}

impl TableContext {
    pub fn new(settings: Settings, transport: Arc<dyn RemoteTransport>) -> Self {
        let staging = Arc::new(StagingArea::new(settings.staging_dir.clone()));
        let names = NameRegistry::new(settings.name_length);
        TableContext {
            settings,
            staging,
            transport,
            names,
            tables_created: AtomicU64::new(0),
        }
    }

    /// A context that reaches remote hosts through the system OpenSSH client.
    pub fn with_openssh(settings: Settings) -> Self {
        let transport = remote::openssh_transport(std::env::temp_dir(), settings.connect_attempts);
        TableContext::new(settings, Arc::new(transport))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// Unique names sized by `hummingbird.namespace.name-length`.
    pub fn names(&self) -> &NameRegistry {
        &self.names
    }

    pub fn new_table<R, C, V>(&self, header_name: impl Into<String>) -> Table<R, C, V>
    where
        R: Hash + Eq + Clone,
        C: Hash + Eq + Clone,
        V: Clone + PartialEq,
    {
        self.tables_created.fetch_add(1, Ordering::Relaxed);
        let mut table = Table::new(header_name);
        table.set_null_display(self.settings.null_display.clone());
        table
    }

    /// Number of tables handed out by [`TableContext::new_table`].
    pub fn tables_created(&self) -> u64 {
        self.tables_created.load(Ordering::Relaxed)
    }

    /// Csv codec parsing every axis with its `Parsable` implementation.
    pub fn csv_codec<R, C, V>(&self) -> CsvCodec<R, C, V>
    where
        R: Parsable + 'static,
        C: Parsable + 'static,
        V: Parsable + 'static,
    {
        self.csv_codec_with(TableParsers::parsable())
    }

    pub fn csv_codec_with<R, C, V>(&self, parsers: TableParsers<R, C, V>) -> CsvCodec<R, C, V> {
        CsvCodec::new(parsers, Arc::clone(&self.staging), Arc::clone(&self.transport))
            .with_dialect(self.settings.dialect.clone())
            .with_null_display(self.settings.null_display.clone())
    }

    pub fn binary_codec<R, C, V>(&self) -> BinaryCodec<R, C, V> {
        BinaryCodec::new()
    }
}
