use std::collections::HashMap;
use std::fmt::{self, Display};
use std::fs::{self, File};
use std::hash::Hash;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, info};

use super::{ensure_parent_dir, TableStore};
use crate::data::{Table, TableParsers};
use crate::error::{ConfigError, LoadingError, PersistenceError};
use crate::remote::{self, RemoteTransport, StagingArea};

pub const DEFAULT_SEPARATOR: &str = "|";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    /// `\r\n` when writing; `\n` or `\r\n` when reading.
    Crlf,
    Byte(u8),
}

impl LineTerminator {
    fn to_csv(self) -> csv::Terminator {
        match self {
            LineTerminator::Crlf => csv::Terminator::CRLF,
            LineTerminator::Byte(b) => csv::Terminator::Any(b),
        }
    }

    fn bytes(self) -> Vec<u8> {
        match self {
            LineTerminator::Crlf => b"\r\n".to_vec(),
            LineTerminator::Byte(b) => vec![b],
        }
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineTerminator::Crlf => f.write_str("\\r\\n"),
            LineTerminator::Byte(b) => write!(f, "{:?}", char::from(*b)),
        }
    }
}

/// Separator and line terminator of the delimited text format. No quoting or
/// escaping is applied, so keys and values must not contain either.
///
/// The separator may be any non-empty string and is always matched
/// literally, so `.` or `||` split on exactly those characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvDialect {
    pub separator: String,
    pub terminator: LineTerminator,
}

impl Default for CsvDialect {
    fn default() -> Self {
        CsvDialect {
            separator: DEFAULT_SEPARATOR.to_string(),
            terminator: LineTerminator::Crlf,
        }
    }
}

impl CsvDialect {
    /// Builds a dialect from its textual settings. The separator must be
    /// non-empty and free of line breaks; the newline is `\r\n` or one ASCII
    /// character that does not occur in the separator.
    pub fn from_text(separator: &str, newline: &str) -> Result<Self, ConfigError> {
        if separator.is_empty() || separator.contains(['\r', '\n']) {
            return Err(ConfigError::InvalidValue {
                key: "separator".to_string(),
                value: separator.escape_default().to_string(),
                message: "expected a non-empty string without line breaks".to_string(),
            });
        }
        let terminator = match newline.as_bytes() {
            b"\r\n" => LineTerminator::Crlf,
            [b] if b.is_ascii() && !separator.contains(char::from(*b)) => LineTerminator::Byte(*b),
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "newline".to_string(),
                    value: newline.escape_default().to_string(),
                    message: "expected \\r\\n or a single ASCII character not used by the separator"
                        .to_string(),
                })
            }
        };
        Ok(CsvDialect {
            separator: separator.to_string(),
            terminator,
        })
    }

    /// The separator as a csv crate delimiter, when it is one ASCII byte.
    fn delimiter(&self) -> Option<u8> {
        match self.separator.as_bytes() {
            [b] if b.is_ascii() => Some(*b),
            _ => None,
        }
    }

    fn split_lines<'a>(&self, text: &'a str) -> Vec<&'a str> {
        match self.terminator {
            LineTerminator::Crlf => text.lines().collect(),
            LineTerminator::Byte(b) => text.split_terminator(char::from(b)).collect(),
        }
    }

    fn split_fields<'a>(&self, line: &'a str) -> Vec<&'a str> {
        line.split(self.separator.as_str()).collect()
    }
}

/// Reads and writes tables as delimited text, locally or on a remote host.
///
/// Line one holds the header name followed by the column keys; every other
/// line holds a row key followed by one field per column, empty when the cell
/// is absent. Loading stops at the first empty line.
pub struct CsvCodec<R, C, V> {
    dialect: CsvDialect,
    parsers: TableParsers<R, C, V>,
    null_display: String,
    staging: Arc<StagingArea>,
    transport: Arc<dyn RemoteTransport>,
}

impl<R, C, V> CsvCodec<R, C, V> {
    pub fn new(
        parsers: TableParsers<R, C, V>,
        staging: Arc<StagingArea>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        CsvCodec {
            dialect: CsvDialect::default(),
            parsers,
            null_display: crate::data::table::DEFAULT_NULL_DISPLAY.to_string(),
            staging,
            transport,
        }
    }

    pub fn with_dialect(mut self, dialect: CsvDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Null display given to loaded tables.
    pub fn with_null_display(mut self, null_display: impl Into<String>) -> Self {
        self.null_display = null_display.into();
        self
    }

    pub fn dialect(&self) -> &CsvDialect {
        &self.dialect
    }
}

impl<R, C, V> fmt::Debug for CsvCodec<R, C, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvCodec")
            .field("dialect", &self.dialect)
            .field("parsers", &self.parsers)
            .field("staging", &self.staging.root())
            .finish()
    }
}

impl<R, C, V> CsvCodec<R, C, V>
where
    R: Hash + Eq + Clone + Display,
    C: Hash + Eq + Clone + Display,
    V: Clone + PartialEq + Display,
{
    pub fn write_local(&self, table: &Table<R, C, V>, path: &Path) -> Result<(), PersistenceError> {
        ensure_parent_dir(path)?;
        let columns = table.column_keys();

        // A table without columns has no rows either. An empty header name
        // then makes a lone empty field, which the csv writer would quote.
        if columns.is_empty() && table.header_name().is_empty() {
            return fs::write(path, self.dialect.terminator.bytes()).map_err(|source| {
                PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            });
        }

        let mut header = vec![table.header_name().to_string()];
        header.extend(columns.iter().map(ToString::to_string));
        let mut records = vec![header];
        for row in table.rows().keys() {
            let mut record = vec![row.to_string()];
            record.extend(columns.iter().map(|column| {
                table
                    .get(row, column)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            }));
            records.push(record);
        }

        match self.dialect.delimiter() {
            Some(delimiter) => self.write_delimited(path, delimiter, &records)?,
            None => self.write_joined(path, &records)?,
        }
        debug!(
            path = %path.display(),
            rows = table.row_count(),
            columns = columns.len(),
            "wrote csv"
        );
        Ok(())
    }

    fn write_delimited(
        &self,
        path: &Path,
        delimiter: u8,
        records: &[Vec<String>],
    ) -> Result<(), PersistenceError> {
        let csv_error = |source| PersistenceError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(self.dialect.terminator.to_csv())
            .quote_style(csv::QuoteStyle::Never)
            .flexible(true)
            .has_headers(false)
            .from_path(path)
            .map_err(csv_error)?;
        for record in records {
            writer.write_record(record).map_err(csv_error)?;
        }
        writer.flush().map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes records whose separator is longer than one byte, which the csv
    /// writer cannot express.
    fn write_joined(&self, path: &Path, records: &[Vec<String>]) -> Result<(), PersistenceError> {
        let io_error = |source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let terminator = self.dialect.terminator.bytes();
        let mut out = BufWriter::new(File::create(path).map_err(io_error)?);
        for record in records {
            out.write_all(record.join(&self.dialect.separator).as_bytes())
                .map_err(io_error)?;
            out.write_all(&terminator).map_err(io_error)?;
        }
        out.flush().map_err(io_error)
    }

    pub fn read_local(&self, path: &Path) -> Result<Table<R, C, V>, LoadingError> {
        let text = fs::read_to_string(path).map_err(|e| LoadingError::from_io(path, e))?;
        let malformed = |line: usize, message: String| LoadingError::Malformed {
            path: path.to_path_buf(),
            line,
            message,
        };

        let lines = self.dialect.split_lines(&text);
        let (header, body) = lines
            .split_first()
            .ok_or_else(|| malformed(1, "missing header line".to_string()))?;

        let header_fields = self.dialect.split_fields(header);
        let header_name = header_fields[0];
        let mut columns = IndexSet::new();
        let mut column_slots = Vec::with_capacity(header_fields.len() - 1);
        for field in &header_fields[1..] {
            let column = self.parsers.column.parse(field)?;
            column_slots.push(columns.insert_full(column).0);
        }

        let expected = header_fields.len();
        let mut rows = IndexSet::new();
        let mut cells: HashMap<(usize, usize), V> = HashMap::new();
        for (offset, line) in body.iter().enumerate() {
            if line.is_empty() {
                break;
            }
            let line_number = offset + 2;
            let fields = self.dialect.split_fields(line);
            if fields.len() != expected {
                return Err(malformed(
                    line_number,
                    format!("expected {} fields, found {}", expected, fields.len()),
                ));
            }

            let row = rows.insert_full(self.parsers.row.parse(fields[0])?).0;
            for (slot, field) in column_slots.iter().zip(&fields[1..]) {
                if field.is_empty() {
                    continue;
                }
                cells.insert((row, *slot), self.parsers.value.parse(field)?);
            }
        }

        let row_keys: Vec<R> = rows.iter().cloned().collect();
        let column_keys: Vec<C> = columns.iter().cloned().collect();
        let mut table = Table::new(header_name);
        table.set_null_display(self.null_display.clone());
        table.rebuild(&row_keys, &column_keys, |row, column| {
            let key = (rows.get_index_of(row)?, columns.get_index_of(column)?);
            cells.remove(&key)
        });

        debug!(
            path = %path.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "read csv"
        );
        Ok(table)
    }
}

impl<R, C, V> TableStore<R, C, V> for CsvCodec<R, C, V>
where
    R: Hash + Eq + Clone + Display,
    C: Hash + Eq + Clone + Display,
    V: Clone + PartialEq + Display,
{
    fn persist(&self, table: &Table<R, C, V>, path: &str) -> Result<(), PersistenceError> {
        if !remote::is_remote(path) {
            self.write_local(table, Path::new(path))?;
            info!(path, "persisted table");
            return Ok(());
        }

        let location = remote::resolve(path)?;
        let dir = self
            .staging
            .reserve()
            .map_err(|source| PersistenceError::CreateDir {
                path: self.staging.root().to_path_buf(),
                source,
            })?;
        let staged = dir.join(&location.remote_file);
        let result = self.write_local(table, &staged).and_then(|()| {
            self.transport
                .upload(&staged, &location)
                .map_err(PersistenceError::from)
        });
        self.staging.release(&dir);
        result?;

        info!(host = %location.host, path = %location.full_path, "persisted table remotely");
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Table<R, C, V>, LoadingError> {
        if !remote::is_remote(path) {
            let table = self.read_local(Path::new(path))?;
            info!(path, "loaded table");
            return Ok(table);
        }

        let location = remote::resolve(path)?;
        let dir = self
            .staging
            .reserve()
            .map_err(|source| LoadingError::Io {
                path: self.staging.root().to_path_buf(),
                source,
            })?;
        // the directory is tracked before the copy starts, so a partial
        // download is removed with it
        let result = self
            .transport
            .download(&location, &dir)
            .map_err(LoadingError::from)
            .and_then(|local| self.read_local(&local));
        self.staging.release(&dir);

        let table = result?;
        info!(host = %location.host, path = %location.full_path, "loaded table remotely");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TypedParser;
    use crate::error::{ParseError, TransferError};
    use crate::remote::RemoteLocation;
    use pretty_assertions::assert_eq;
    use speculoos::prelude::*;
    use std::path::PathBuf;

    struct Offline;

    impl RemoteTransport for Offline {
        fn upload(&self, _local: &Path, location: &RemoteLocation) -> Result<(), TransferError> {
            Err(TransferError::Connection {
                host: location.host.clone(),
                port: location.port,
                message: "offline".to_string(),
            })
        }

        fn download(
            &self,
            location: &RemoteLocation,
            _local_dir: &Path,
        ) -> Result<PathBuf, TransferError> {
            Err(TransferError::Connection {
                host: location.host.clone(),
                port: location.port,
                message: "offline".to_string(),
            })
        }
    }

    fn codec(dir: &Path) -> CsvCodec<String, String, String> {
        CsvCodec::new(
            TableParsers::parsable(),
            Arc::new(StagingArea::new(dir.join("staging"))),
            Arc::new(Offline),
        )
    }

    #[test]
    fn dialect_from_text() {
        assert_eq!(
            CsvDialect::from_text("|", "\r\n").unwrap(),
            CsvDialect::default()
        );
        assert_eq!(
            CsvDialect::from_text("||", "\n").unwrap(),
            CsvDialect {
                separator: "||".to_string(),
                terminator: LineTerminator::Byte(b'\n')
            }
        );
        assert_eq!(CsvDialect::from_text("\u{a6}", "\n").unwrap().separator, "\u{a6}");
        assert_that(&CsvDialect::from_text("", "\n")).is_err();
        assert_that(&CsvDialect::from_text("a\nb", "\r\n")).is_err();
        assert_that(&CsvDialect::from_text("|", "\n\n")).is_err();
        assert_that(&CsvDialect::from_text("|", "|")).is_err();
        assert_that(&CsvDialect::from_text("::", ":")).is_err();
    }

    #[test]
    fn separator_is_matched_literally() {
        let dialect = CsvDialect::from_text(".", "\n").unwrap();
        assert_eq!(dialect.split_fields("a.b.c"), vec!["a", "b", "c"]);
        assert_eq!(dialect.split_lines("x\ny\n\nz\n"), vec!["x", "y", "", "z"]);

        let dialect = CsvDialect::from_text(".*", "\n").unwrap();
        assert_eq!(dialect.split_fields("a.*b.c*d"), vec!["a", "b.c*d"]);
    }

    fn round_trip_with(separator: &str, expected: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let codec = codec(dir.path()).with_dialect(CsvDialect::from_text(separator, "\r\n").unwrap());

        let mut table = Table::new("k");
        table
            .push("x".to_string(), "a".to_string(), "1|2".to_string())
            .push("y".to_string(), "b".to_string(), "3".to_string());
        codec.write_local(&table, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), expected);

        let loaded = codec.read_local(&path).unwrap();
        assert_eq!(loaded, table);
        assert_eq!(loaded.column_keys(), table.column_keys());
    }

    #[test]
    fn multi_character_separator_round_trips() {
        round_trip_with("::", "k::a::b\r\nx::1|2::\r\ny::::3\r\n");
        round_trip_with("||", "k||a||b\r\nx||1|2||\r\ny||||3\r\n");
    }

    #[test]
    fn non_ascii_separator_round_trips() {
        round_trip_with("\u{a6}", "k\u{a6}a\u{a6}b\r\nx\u{a6}1|2\u{a6}\r\ny\u{a6}\u{a6}3\r\n");
    }

    #[test]
    fn metacharacter_separator_round_trips() {
        round_trip_with("$.", "k$.a$.b\r\nx$.1|2$.\r\ny$.$.3\r\n");
    }

    #[test]
    fn reading_accepts_bare_newlines_for_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "k|a\nx|1\r\ny|2\n").unwrap();

        let table = codec(dir.path()).read_local(&path).unwrap();
        assert_eq!(table.row_keys(), vec!["x", "y"]);
        assert_eq!(table.get(&"y".to_string(), &"a".to_string()), Some(&"2".to_string()));
    }

    #[test]
    fn scan_stops_at_the_first_empty_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "k|a\r\nx|1\r\n\r\ny|2\r\n").unwrap();

        let table = codec(dir.path()).read_local(&path).unwrap();
        assert_eq!(table.row_keys(), vec!["x"]);
    }

    #[test]
    fn token_count_must_match_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");

        fs::write(&path, "k|a|b\r\nx|1|2\r\ny|3\r\n").unwrap();
        match codec(dir.path()).read_local(&path) {
            Err(LoadingError::Malformed { line, message, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(message, "expected 3 fields, found 2");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        fs::write(&path, "k|a\r\nx|1|2\r\n").unwrap();
        assert!(matches!(
            codec(dir.path()).read_local(&path),
            Err(LoadingError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn value_parse_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "k|a\r\nx|ten\r\n").unwrap();

        let codec: CsvCodec<String, String, i32> = CsvCodec::new(
            TableParsers::parsable(),
            Arc::new(StagingArea::new(dir.path())),
            Arc::new(Offline),
        );
        match codec.read_local(&path) {
            Err(LoadingError::Parse(ParseError { type_tag, text, .. })) => {
                assert_eq!(type_tag, "int");
                assert_eq!(text, "ten");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn custom_parsers_drive_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "k|A\r\nx|7\r\n").unwrap();

        let parsers = TableParsers::new(
            TypedParser::parsable(),
            TypedParser::new("lower", |text: &str| Ok(text.to_lowercase())),
            TypedParser::new("doubled", |text: &str| {
                text.parse::<i64>()
                    .map(|n| n * 2)
                    .map_err(|e| ParseError::new("doubled", text, e))
            }),
        );
        let codec: CsvCodec<String, String, i64> =
            CsvCodec::new(parsers, Arc::new(StagingArea::new(dir.path())), Arc::new(Offline));

        let table = codec.read_local(&path).unwrap();
        assert_eq!(table.get(&"x".to_string(), &"a".to_string()), Some(&14));
    }

    #[test]
    fn empty_header_without_columns_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        let codec = codec(dir.path());

        let table: Table<String, String, String> = Table::new("");
        codec.write_local(&table, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"\r\n");

        let loaded = codec.read_local(&path).unwrap();
        assert_eq!(loaded.header_name(), "");
        assert!(loaded.is_empty());
    }

    #[test]
    fn empty_file_has_no_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            codec(dir.path()).read_local(&path),
            Err(LoadingError::Malformed { line: 1, .. })
        ));
    }

    #[test]
    fn failed_upload_still_releases_the_staged_file() {
        let dir = tempfile::tempdir().unwrap();
        let codec = codec(dir.path());
        let mut table = Table::new("k");
        table.push("x".to_string(), "a".to_string(), "1".to_string());

        let err = codec
            .persist(&table, "hadoop@master:~/out/result.csv")
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Transfer(_)));
        assert_eq!(fs::read_dir(dir.path().join("staging")).unwrap().count(), 0);
    }

    /// Writes half a file before the connection drops.
    struct Interrupted;

    impl RemoteTransport for Interrupted {
        fn upload(&self, _local: &Path, _location: &RemoteLocation) -> Result<(), TransferError> {
            Ok(())
        }

        fn download(
            &self,
            location: &RemoteLocation,
            local_dir: &Path,
        ) -> Result<PathBuf, TransferError> {
            fs::write(local_dir.join(&location.remote_file), "k|a\r\nx|")?;
            Err(TransferError::Copy {
                path: location.full_path.clone(),
                message: "connection reset".to_string(),
            })
        }
    }

    #[test]
    fn partial_download_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let staging = Arc::new(StagingArea::new(dir.path().join("staging")));
        let codec: CsvCodec<String, String, String> =
            CsvCodec::new(TableParsers::parsable(), staging.clone(), Arc::new(Interrupted));

        let err = codec.load("hadoop@master:~/out/result.csv").unwrap_err();
        assert!(matches!(err, LoadingError::Transfer(TransferError::Copy { .. })));
        assert_eq!(fs::read_dir(staging.root()).unwrap().count(), 0);
    }

    #[test]
    fn illegal_remote_address_is_a_loading_error() {
        let dir = tempfile::tempdir().unwrap();
        // matches the remote grammar but the host part is empty
        let err = codec(dir.path()).load("user@ :~/a.csv").unwrap_err();
        assert!(matches!(
            err,
            LoadingError::Transfer(TransferError::IllegalAddress(_))
        ));
    }
}
