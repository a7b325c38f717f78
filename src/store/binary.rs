//! Binary table files (`.hbt`).
//!
//! A file is a fixed little-endian header followed by three regions:
//!
//! | region  | contents                                                  |
//! |---------|-----------------------------------------------------------|
//! | labels  | JSON: header name, null display, row keys, column keys    |
//! | indices | one `(row: u32, column: u32)` pair per cell, row-major    |
//! | values  | JSON array of the cell values, in index order             |
//!
//! The header records the counts and the offset and size of every region, so
//! a reader can check the layout before decoding anything.

use std::collections::HashMap;
use std::fs;
use std::hash::Hash;
use std::marker::PhantomData;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ensure_parent_dir, TableStore};
use crate::data::Table;
use crate::error::{LoadingError, PersistenceError};

pub const MAGIC: [u8; 4] = *b"HBTB";
pub const FORMAT_VERSION: u8 = 1;

const INDEX_ENTRY_SIZE: usize = 8;

/// Fixed-size header at the start of every binary table file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryHeader {
    pub version: u8,
    pub nrows: u64,
    pub ncols: u64,
    pub ncells: u64,
    pub labels_offset: u64,
    pub labels_size: u64,
    pub indices_offset: u64,
    pub indices_size: u64,
    pub values_offset: u64,
    pub values_size: u64,
}

impl BinaryHeader {
    /// Magic, version, three reserved bytes and nine `u64` fields.
    pub const SIZE: usize = 8 + 9 * 8;

    fn to_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&MAGIC);
        bytes.push(self.version);
        bytes.extend_from_slice(&[0; 3]);
        for field in [
            self.nrows,
            self.ncols,
            self.ncells,
            self.labels_offset,
            self.labels_size,
            self.indices_offset,
            self.indices_size,
            self.values_offset,
            self.values_size,
        ] {
            bytes.extend_from_slice(&field.to_le_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, &'static str> {
        if bytes.len() < Self::SIZE || bytes[..MAGIC.len()] != MAGIC {
            return Err("not a binary table file");
        }
        let version = bytes[MAGIC.len()];
        if version != FORMAT_VERSION {
            return Err("unsupported binary table version");
        }

        let field = |i: usize| {
            let at = 8 + i * 8;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        Ok(BinaryHeader {
            version,
            nrows: field(0),
            ncols: field(1),
            ncells: field(2),
            labels_offset: field(3),
            labels_size: field(4),
            indices_offset: field(5),
            indices_size: field(6),
            values_offset: field(7),
            values_size: field(8),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct Labels<R, C> {
    header_name: String,
    null_display: String,
    rows: Vec<R>,
    columns: Vec<C>,
}

fn region(bytes: &[u8], offset: u64, size: u64) -> Option<&[u8]> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    bytes.get(start..end)
}

/// Stores whole tables in the binary layout described above. Paths are
/// always local.
#[derive(Debug)]
pub struct BinaryCodec<R, C, V> {
    _types: PhantomData<fn() -> (R, C, V)>,
}

impl<R, C, V> BinaryCodec<R, C, V> {
    pub fn new() -> Self {
        BinaryCodec {
            _types: PhantomData,
        }
    }
}

impl<R, C, V> Default for BinaryCodec<R, C, V> {
    fn default() -> Self {
        BinaryCodec::new()
    }
}

impl<R, C, V> TableStore<R, C, V> for BinaryCodec<R, C, V>
where
    R: Hash + Eq + Clone + Serialize + DeserializeOwned,
    C: Hash + Eq + Clone + Serialize + DeserializeOwned,
    V: Clone + PartialEq + Serialize + DeserializeOwned,
{
    fn persist(&self, table: &Table<R, C, V>, path: &str) -> Result<(), PersistenceError> {
        let path = Path::new(path);
        ensure_parent_dir(path)?;
        let encode_error = |source: serde_json::Error| PersistenceError::Encode {
            path: path.to_path_buf(),
            source,
        };

        let labels = Labels {
            header_name: table.header_name().to_string(),
            null_display: table.null_display().to_string(),
            rows: table.row_keys(),
            columns: table.column_keys(),
        };
        let column_slots: HashMap<&C, u32> = labels.columns.iter().zip(0u32..).collect();

        let mut indices = Vec::with_capacity(table.len() * INDEX_ENTRY_SIZE);
        let mut values = Vec::with_capacity(table.len());
        for (cells, i) in table.rows().values().zip(0u32..) {
            for (column, value) in cells {
                if let Some(j) = column_slots.get(column) {
                    indices.extend_from_slice(&i.to_le_bytes());
                    indices.extend_from_slice(&j.to_le_bytes());
                    values.push(value);
                }
            }
        }

        let labels_bytes = serde_json::to_vec(&labels).map_err(encode_error)?;
        let values_bytes = serde_json::to_vec(&values).map_err(encode_error)?;

        let mut header = BinaryHeader {
            version: FORMAT_VERSION,
            nrows: labels.rows.len() as u64,
            ncols: labels.columns.len() as u64,
            ncells: values.len() as u64,
            labels_offset: BinaryHeader::SIZE as u64,
            labels_size: labels_bytes.len() as u64,
            indices_offset: 0,
            indices_size: indices.len() as u64,
            values_offset: 0,
            values_size: values_bytes.len() as u64,
        };
        header.indices_offset = header.labels_offset + header.labels_size;
        header.values_offset = header.indices_offset + header.indices_size;

        let mut bytes = header.to_bytes();
        bytes.extend_from_slice(&labels_bytes);
        bytes.extend_from_slice(&indices);
        bytes.extend_from_slice(&values_bytes);
        fs::write(path, &bytes).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), cells = header.ncells, "persisted binary table");
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Table<R, C, V>, LoadingError> {
        let path = Path::new(path);
        let bytes = fs::read(path).map_err(|e| LoadingError::from_io(path, e))?;
        let malformed = |message: &str| LoadingError::Malformed {
            path: path.to_path_buf(),
            line: 1,
            message: message.to_string(),
        };
        let decode_error = |source: serde_json::Error| LoadingError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let header = BinaryHeader::from_bytes(&bytes).map_err(malformed)?;
        debug!(path = %path.display(), ?header, "read binary table header");

        let labels = region(&bytes, header.labels_offset, header.labels_size)
            .ok_or_else(|| malformed("labels region out of bounds"))?;
        let indices = region(&bytes, header.indices_offset, header.indices_size)
            .ok_or_else(|| malformed("indices region out of bounds"))?;
        let values = region(&bytes, header.values_offset, header.values_size)
            .ok_or_else(|| malformed("values region out of bounds"))?;

        let labels: Labels<R, C> = serde_json::from_slice(labels).map_err(decode_error)?;
        let values: Vec<V> = serde_json::from_slice(values).map_err(decode_error)?;
        if labels.rows.len() as u64 != header.nrows
            || labels.columns.len() as u64 != header.ncols
            || values.len() as u64 != header.ncells
            || indices.len() != values.len() * INDEX_ENTRY_SIZE
        {
            return Err(malformed("region sizes disagree with the header"));
        }

        let mut cells = HashMap::with_capacity(values.len());
        for (entry, value) in indices.chunks_exact(INDEX_ENTRY_SIZE).zip(values) {
            let (i, j) = entry.split_at(4);
            let slot = |raw: &[u8]| {
                let mut le = [0u8; 4];
                le.copy_from_slice(raw);
                u32::from_le_bytes(le) as usize
            };
            let (i, j) = (slot(i), slot(j));
            if i >= labels.rows.len() || j >= labels.columns.len() {
                return Err(malformed("cell refers to a missing row or column"));
            }
            cells.insert((i, j), value);
        }
        let row_slots: HashMap<&R, usize> = labels.rows.iter().zip(0..).collect();
        let column_slots: HashMap<&C, usize> = labels.columns.iter().zip(0..).collect();

        let mut table = Table::new(labels.header_name.as_str());
        table.set_null_display(labels.null_display.as_str());
        table.rebuild(&labels.rows, &labels.columns, |row, column| {
            cells.remove(&(*row_slots.get(row)?, *column_slots.get(column)?))
        });

        info!(path = %path.display(), rows = table.row_count(), "loaded binary table");
        Ok(table)
    }
}
