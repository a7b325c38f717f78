use std::cmp::Ordering;
use std::fmt::Display;
use std::hash::Hash;
use std::mem;

use indexmap::IndexMap;

pub const DEFAULT_NULL_DISPLAY: &str = "-";

/// A sparse table addressed by a (row key, column key) pair.
///
/// Cells are indexed twice, once by row and once by column, and both indices
/// keep insertion order. Only pushed pairs occupy storage, so a row or column
/// exists exactly as long as it holds at least one cell.
///
/// Tables are single-writer: every mutation takes `&mut self` and nothing is
/// locked internally.
#[derive(Debug, Clone)]
pub struct Table<R, C, V> {
    header_name: String,
    null_display: String,
    by_row: IndexMap<R, IndexMap<C, V>>,
    by_column: IndexMap<C, IndexMap<R, V>>,
}

impl<R, C, V> Table<R, C, V> {
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn set_header_name(&mut self, header_name: impl Into<String>) -> &mut Self {
        self.header_name = header_name.into();
        self
    }

    /// Text shown in place of a missing cell when rendering.
    pub fn null_display(&self) -> &str {
        &self.null_display
    }

    pub fn set_null_display(&mut self, null_display: impl Into<String>) -> &mut Self {
        self.null_display = null_display.into();
        self
    }

    /// The row-major index: row key -> (column key -> value).
    pub fn rows(&self) -> &IndexMap<R, IndexMap<C, V>> {
        &self.by_row
    }

    /// The column-major index: column key -> (row key -> value).
    pub fn columns(&self) -> &IndexMap<C, IndexMap<R, V>> {
        &self.by_column
    }

    pub fn row_count(&self) -> usize {
        self.by_row.len()
    }

    pub fn column_count(&self) -> usize {
        self.by_column.len()
    }

    /// Number of occupied cells.
    pub fn len(&self) -> usize {
        self.by_row.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_row.is_empty()
    }

    pub fn clean(&mut self) -> &mut Self {
        self.by_row.clear();
        self.by_column.clear();
        self
    }
}

impl<R, C, V> Table<R, C, V>
where
    R: Hash + Eq + Clone,
    C: Hash + Eq + Clone,
    V: Clone + PartialEq,
{
    pub fn new(header_name: impl Into<String>) -> Self {
        Table {
            header_name: header_name.into(),
            null_display: DEFAULT_NULL_DISPLAY.to_string(),
            by_row: IndexMap::new(),
            by_column: IndexMap::new(),
        }
    }

    /// Inserts or overwrites a cell in both indices.
    pub fn push(&mut self, row: R, column: C, value: V) -> &mut Self {
        self.by_row
            .entry(row.clone())
            .or_default()
            .insert(column.clone(), value.clone());
        self.by_column
            .entry(column)
            .or_default()
            .insert(row, value);
        self
    }

    /// Returns the cell only when both indices hold the same value for it.
    pub fn get(&self, row: &R, column: &C) -> Option<&V> {
        let by_row = self.by_row.get(row).and_then(|cells| cells.get(column));
        let by_column = self.by_column.get(column).and_then(|cells| cells.get(row));
        match (by_row, by_column) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        }
    }

    pub fn contains(&self, row: &R, column: &C) -> bool {
        self.get(row, column).is_some()
    }

    pub fn row(&self, row: &R) -> Option<&IndexMap<C, V>> {
        self.by_row.get(row)
    }

    pub fn column(&self, column: &C) -> Option<&IndexMap<R, V>> {
        self.by_column.get(column)
    }

    pub fn row_keys(&self) -> Vec<R> {
        self.by_row.keys().cloned().collect()
    }

    pub fn column_keys(&self) -> Vec<C> {
        self.by_column.keys().cloned().collect()
    }

    /// Occupied cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (&R, &C, &V)> + '_ {
        self.by_row
            .iter()
            .flat_map(|(row, cells)| cells.iter().map(move |(column, value)| (row, column, value)))
    }

    /// Pushes every cell of `other` into this table; `other` wins on collisions.
    ///
    /// Walks the full key grid of `other`, which is fine for the small sparse
    /// tables this type is meant for.
    pub fn merge(&mut self, other: &Table<R, C, V>) -> &mut Self {
        let columns = other.column_keys();
        for row in other.by_row.keys() {
            for column in &columns {
                if let Some(value) = other.get(row, column) {
                    self.push(row.clone(), column.clone(), value.clone());
                }
            }
        }
        self
    }

    /// Keeps the cells whose row and column both pass their predicate.
    /// A missing predicate accepts every key on that axis.
    pub fn filter(
        &mut self,
        row_filter: Option<&dyn Fn(&R) -> bool>,
        column_filter: Option<&dyn Fn(&C) -> bool>,
    ) -> &mut Self {
        let snapshot = self.take_indices();
        let rows: Vec<R> = snapshot
            .row_keys()
            .into_iter()
            .filter(|row| row_filter.map_or(true, |keep| keep(row)))
            .collect();
        let columns: Vec<C> = snapshot
            .column_keys()
            .into_iter()
            .filter(|column| column_filter.map_or(true, |keep| keep(column)))
            .collect();
        self.rebuild(&rows, &columns, |row, column| snapshot.get(row, column).cloned());
        self
    }

    /// Reorders rows and columns with the given comparators; an axis without a
    /// comparator keeps its current order. Cell contents are unchanged.
    pub fn sort_by(
        &mut self,
        row_order: Option<&dyn Fn(&R, &R) -> Ordering>,
        column_order: Option<&dyn Fn(&C, &C) -> Ordering>,
    ) -> &mut Self {
        let snapshot = self.take_indices();
        let mut rows = snapshot.row_keys();
        let mut columns = snapshot.column_keys();
        if let Some(compare) = row_order {
            rows.sort_by(|a, b| compare(a, b));
        }
        if let Some(compare) = column_order {
            columns.sort_by(|a, b| compare(a, b));
        }
        self.rebuild(&rows, &columns, |row, column| snapshot.get(row, column).cloned());
        self
    }

    /// Rewrites the table with cells produced for each `(row, column)` pair,
    /// laying out both indices in the given key orders.
    pub(crate) fn rebuild<F>(&mut self, rows: &[R], columns: &[C], mut cell: F)
    where
        F: FnMut(&R, &C) -> Option<V>,
    {
        self.clean();
        let mut grid: Vec<(usize, usize, V)> = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            for (j, column) in columns.iter().enumerate() {
                if let Some(value) = cell(row, column) {
                    grid.push((i, j, value));
                }
            }
        }

        for (i, j, value) in &grid {
            self.by_row
                .entry(rows[*i].clone())
                .or_default()
                .insert(columns[*j].clone(), value.clone());
        }

        grid.sort_by_key(|(i, j, _)| (*j, *i));
        for (i, j, value) in grid {
            self.by_column
                .entry(columns[j].clone())
                .or_default()
                .insert(rows[i].clone(), value);
        }
    }

    fn take_indices(&mut self) -> Table<R, C, V> {
        Table {
            header_name: self.header_name.clone(),
            null_display: self.null_display.clone(),
            by_row: mem::take(&mut self.by_row),
            by_column: mem::take(&mut self.by_column),
        }
    }
}

impl<R, C, V> Table<R, C, V>
where
    R: Hash + Eq + Clone + Display,
    C: Hash + Eq + Clone + Display,
    V: Clone + PartialEq,
{
    /// Sorts both axes by the keys' text, ascending.
    pub fn sort(&mut self) -> &mut Self {
        self.sort_by(
            Some(&|a: &R, b: &R| a.to_string().cmp(&b.to_string())),
            Some(&|a: &C, b: &C| a.to_string().cmp(&b.to_string())),
        )
    }
}

impl<R, C, V> PartialEq for Table<R, C, V>
where
    R: Hash + Eq + Clone,
    C: Hash + Eq + Clone,
    V: Clone + PartialEq,
{
    /// Same header and the same cell set; key order is not compared.
    fn eq(&self, other: &Self) -> bool {
        self.header_name == other.header_name
            && self.len() == other.len()
            && self
                .cells()
                .all(|(row, column, value)| other.get(row, column) == Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use speculoos::prelude::*;

    fn timeline() -> Table<String, String, String> {
        let mut table = Table::new("time");
        table
            .push("1:00".into(), "cost".into(), "10ms".into())
            .push("1:00".into(), "count".into(), "100".into())
            .push("2:00".into(), "cost".into(), "20ms".into())
            .push("2:00".into(), "count".into(), "200".into())
            .push("3:00".into(), "count".into(), "300".into());
        table
    }

    fn keys(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn push_then_get_returns_last_value() {
        let mut table: Table<&str, &str, i32> = Table::new("t");
        table.push("a", "x", 1).push("a", "x", 2).push("b", "y", 3);

        assert_eq!(table.get(&"a", &"x"), Some(&2));
        assert_eq!(table.get(&"b", &"y"), Some(&3));
        assert_eq!(table.get(&"a", &"y"), None);
        assert_eq!(table.get(&"z", &"x"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn keys_keep_first_seen_order() {
        let mut table: Table<&str, &str, i32> = Table::new("t");
        table
            .push("r2", "c2", 1)
            .push("r1", "c1", 2)
            .push("r2", "c1", 3)
            .push("r3", "c3", 4);

        assert_eq!(table.row_keys(), vec!["r2", "r1", "r3"]);
        assert_eq!(table.column_keys(), vec!["c2", "c1", "c3"]);
    }

    #[test]
    fn both_indices_stay_in_sync() {
        let table = timeline();
        for (row, column, value) in table.cells() {
            assert_eq!(table.column(column).and_then(|c| c.get(row)), Some(value));
        }
        for (column, cells) in table.columns() {
            for (row, value) in cells {
                assert_eq!(table.row(row).and_then(|r| r.get(column)), Some(value));
            }
        }
    }

    #[test]
    fn diverged_indices_read_as_absent() {
        let mut table = timeline();
        table
            .by_column
            .get_mut("cost")
            .unwrap()
            .insert("1:00".to_string(), "99ms".to_string());

        assert_that(&table.get(&"1:00".to_string(), &"cost".to_string())).is_none();
        assert_eq!(
            table.get(&"2:00".to_string(), &"cost".to_string()),
            Some(&"20ms".to_string())
        );
    }

    #[test]
    fn clean_empties_both_indices() {
        let mut table = timeline();
        table.clean();

        assert!(table.is_empty());
        assert_that(&table.row_keys()).is_empty();
        assert_that(&table.column_keys()).is_empty();
        assert_eq!(table.header_name(), "time");
    }

    #[test]
    fn merge_disjoint_tables_adds_cells() {
        let mut left = timeline();
        let mut right: Table<String, String, String> = Table::new("time");
        right
            .push("4:00".into(), "memory".into(), "1MB".into())
            .push("5:00".into(), "memory".into(), "2MB".into());

        let expected = left.len() + right.len();
        left.merge(&right);

        assert_eq!(left.len(), expected);
        assert_eq!(left.row_keys(), keys(&["1:00", "2:00", "3:00", "4:00", "5:00"]));
        assert_eq!(left.column_keys(), keys(&["cost", "count", "memory"]));
    }

    #[test]
    fn merge_overrides_colliding_cells() {
        let mut left = timeline();
        let mut right: Table<String, String, String> = Table::new("other");
        right.push("1:00".into(), "cost".into(), "11ms".into());

        left.merge(&right);

        assert_eq!(
            left.get(&"1:00".to_string(), &"cost".to_string()),
            Some(&"11ms".to_string())
        );
        assert_eq!(left.header_name(), "time");
        assert_eq!(left.len(), 5);
    }

    #[test]
    fn merge_with_itself_changes_nothing() {
        let mut table = timeline();
        let copy = table.clone();
        table.merge(&copy);

        assert_eq!(table, copy);
        assert_eq!(table.row_keys(), copy.row_keys());
        assert_eq!(table.column_keys(), copy.column_keys());
    }

    #[test]
    fn filter_keeps_cells_passing_both_predicates() {
        let mut table = timeline();
        let original = table.clone();
        table.filter(
            Some(&|row: &String| row.as_str() < "3:00"),
            Some(&|column: &String| column == "count"),
        );

        for (row, column, value) in original.cells() {
            let kept = row.as_str() < "3:00" && column == "count";
            assert_eq!(table.get(row, column), if kept { Some(value) } else { None });
        }
        assert_eq!(table.row_keys(), keys(&["1:00", "2:00"]));
        assert_eq!(table.column_keys(), keys(&["count"]));
    }

    #[test]
    fn filter_without_predicates_keeps_everything() {
        let mut table = timeline();
        let original = table.clone();
        table.filter(None, None);

        assert_eq!(table, original);
        assert_eq!(table.row_keys(), original.row_keys());
    }

    #[test]
    fn filter_on_rows_only() {
        let mut table = timeline();
        table.filter(Some(&|row: &String| row != "2:00"), None);

        assert_eq!(table.row_keys(), keys(&["1:00", "3:00"]));
        assert_eq!(table.column_keys(), keys(&["cost", "count"]));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn sort_reorders_without_touching_content() {
        let mut table: Table<String, String, String> = Table::new("time");
        table
            .push("2:00".into(), "count".into(), "b".into())
            .push("2:00".into(), "cost".into(), "a".into())
            .push("3:00".into(), "cost".into(), "c".into())
            .push("1:00".into(), "count".into(), "d".into());
        let original = table.clone();

        table.sort();

        assert_eq!(table.row_keys(), keys(&["1:00", "2:00", "3:00"]));
        assert_eq!(table.column_keys(), keys(&["cost", "count"]));
        assert_eq!(table, original);
        assert_eq!(
            table.row(&"2:00".to_string()).unwrap().keys().collect::<Vec<_>>(),
            vec!["cost", "count"]
        );
        assert_eq!(
            table.column(&"count".to_string()).unwrap().keys().collect::<Vec<_>>(),
            vec!["1:00", "2:00"]
        );
    }

    #[test]
    fn sort_by_single_axis() {
        let mut table = timeline();
        table.sort_by(Some(&|a: &String, b: &String| b.cmp(a)), None);
        assert_eq!(table.row_keys(), keys(&["3:00", "2:00", "1:00"]));
        assert_eq!(table.column_keys(), keys(&["cost", "count"]));

        table.sort_by(None, Some(&|a: &String, b: &String| b.cmp(a)));
        assert_eq!(table.row_keys(), keys(&["3:00", "2:00", "1:00"]));
        assert_eq!(table.column_keys(), keys(&["count", "cost"]));
    }

    #[test]
    fn default_sort_uses_text_order() {
        let mut table: Table<i32, i32, i32> = Table::new("n");
        table.push(10, 2, 1).push(9, 1, 2).push(100, 3, 3);
        table.sort();

        assert_eq!(table.row_keys(), vec![10, 100, 9]);
    }

    #[test]
    fn clone_does_not_share_indices() {
        let table = timeline();
        let mut copy = table.clone();
        copy.push("9:00".into(), "cost".into(), "1ms".into()).clean();

        assert_eq!(table.len(), 5);
        assert!(copy.is_empty());
    }
}
