//! Commands behind the `hummingbird` binary.

use std::path::Path;

use anyhow::{anyhow, bail, Context};
use tracing::{debug, Level};

use hummingbird::data::{Cell, ParserRegistry, Table, TableParsers};
use hummingbird::runtime::logger::log_lines;
use hummingbird::runtime::ExecutionReport;
use hummingbird::store::{TableContext, TableStore};

pub const BINARY_EXTENSION: &str = "hbt";
pub const DEFAULT_TYPES: &str = "string,string,string";

pub type DynamicTable = Table<Cell, Cell, Cell>;

/// Parsers for a `row,column,value` list of type tags.
pub fn parsers_for(types: &str) -> anyhow::Result<TableParsers<Cell, Cell, Cell>> {
    let tags: Vec<&str> = types.split(',').map(str::trim).collect();
    let [row, column, value] = tags.as_slice() else {
        bail!("expected three type tags as row,column,value but got {types:?}");
    };
    let registry = ParserRegistry::builtin();
    registry
        .table_parsers(row, column, value)
        .map_err(|e| anyhow!("{e}; known tags: {}", registry.tags().join(", ")))
}

fn is_binary(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case(BINARY_EXTENSION))
}

pub fn load(context: &TableContext, path: &str, types: &str) -> anyhow::Result<DynamicTable> {
    let table = if is_binary(path) {
        context.binary_codec::<Cell, Cell, Cell>().load(path)
    } else {
        context.csv_codec_with(parsers_for(types)?).load(path)
    }
    .with_context(|| format!("cannot load table from {path}"))?;
    debug!(path, rows = table.row_count(), columns = table.column_count(), "loaded");
    Ok(table)
}

pub fn persist(context: &TableContext, table: &DynamicTable, path: &str) -> anyhow::Result<()> {
    if is_binary(path) {
        context.binary_codec::<Cell, Cell, Cell>().persist(table, path)
    } else {
        context.csv_codec_with(parsers_for(DEFAULT_TYPES)?).persist(table, path)
    }
    .with_context(|| format!("cannot persist table to {path}"))
}

/// The stored table rendered as a grid.
pub fn show(context: &TableContext, path: &str, types: &str, sort: bool) -> anyhow::Result<String> {
    let mut table = load(context, path, types)?;
    table.set_null_display(context.settings().null_display.clone());
    if sort {
        table.sort();
    }
    Ok(table.to_string())
}

/// Copies a table between storages and reports what was moved.
pub fn convert(
    context: &TableContext,
    from: &str,
    to: &str,
    types: &str,
) -> anyhow::Result<ExecutionReport> {
    let table = load(context, from, types)?;
    persist(context, &table, to)?;

    let mut report = ExecutionReport::new();
    report
        .put("convert.from", from)
        .put("convert.to", to)
        .put("convert.rows", table.row_count())
        .put("convert.columns", table.column_count())
        .put("convert.cells", table.len());
    log_lines(Level::INFO, &report.to_string());
    Ok(report)
}
