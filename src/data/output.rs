use std::fmt::{self, Display};
use std::hash::Hash;

use tabled::builder::Builder;
use tabled::settings::Style;

use super::Table;

/// Text records of the grid: the header record, then one per row key, with
/// `null_display` standing in for absent cells.
pub fn grid_records<R, C, V>(table: &Table<R, C, V>) -> Vec<Vec<String>>
where
    R: Hash + Eq + Clone + Display,
    C: Hash + Eq + Clone + Display,
    V: Clone + PartialEq + Display,
{
    let columns = table.column_keys();
    let mut records = Vec::with_capacity(table.row_count() + 1);

    let mut header = vec![table.header_name().to_string()];
    header.extend(columns.iter().map(ToString::to_string));
    records.push(header);

    for row in table.rows().keys() {
        let mut record = vec![row.to_string()];
        record.extend(columns.iter().map(|column| match table.get(row, column) {
            Some(value) => value.to_string(),
            None => table.null_display().to_string(),
        }));
        records.push(record);
    }
    records
}

/// Renders the table as a bordered ASCII grid.
pub fn render<R, C, V>(table: &Table<R, C, V>) -> String
where
    R: Hash + Eq + Clone + Display,
    C: Hash + Eq + Clone + Display,
    V: Clone + PartialEq + Display,
{
    let mut builder = Builder::default();
    for record in grid_records(table) {
        builder.push_record(record);
    }

    let mut grid = builder.build();
    grid.with(Style::ascii());
    grid.to_string()
}

impl<R, C, V> Display for Table<R, C, V>
where
    R: Hash + Eq + Clone + Display,
    C: Hash + Eq + Clone + Display,
    V: Clone + PartialEq + Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table_with_gap() -> Table<String, String, String> {
        let mut table = Table::new("time");
        table
            .push("1:00".into(), "cost".into(), "10ms".into())
            .push("1:00".into(), "count".into(), "100".into())
            .push("3:00".into(), "count".into(), "300".into());
        table
    }

    fn content_lines(rendered: &str) -> Vec<Vec<String>> {
        rendered
            .lines()
            .filter(|line| line.starts_with('|'))
            .map(|line| {
                line.trim_matches('|')
                    .split('|')
                    .map(|cell| cell.trim().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn records_fill_gaps_with_null_display() {
        let table = table_with_gap();
        assert_eq!(
            grid_records(&table),
            vec![
                vec!["time", "cost", "count"],
                vec!["1:00", "10ms", "100"],
                vec!["3:00", "-", "300"],
            ]
        );
    }

    #[test]
    fn custom_null_display() {
        let mut table = table_with_gap();
        table.set_null_display("(empty)");
        assert_eq!(grid_records(&table)[2], vec!["3:00", "(empty)", "300"]);
    }

    #[test]
    fn render_draws_a_bordered_grid() {
        let rendered = table_with_gap().to_string();

        assert!(rendered.starts_with('+'));
        assert!(rendered.trim_end().ends_with('+'));
        assert_eq!(
            content_lines(&rendered),
            vec![
                vec!["time", "cost", "count"],
                vec!["1:00", "10ms", "100"],
                vec!["3:00", "-", "300"],
            ]
        );
    }

    #[test]
    fn render_follows_sorted_order() {
        let mut table = table_with_gap();
        table.sort_by(Some(&|a: &String, b: &String| b.cmp(a)), None);

        let lines = content_lines(&render(&table));
        assert_eq!(lines[1][0], "3:00");
        assert_eq!(lines[2][0], "1:00");
    }

    #[test]
    fn empty_table_renders_only_the_header() {
        let table: Table<String, String, String> = Table::new("key");
        assert_eq!(content_lines(&render(&table)), vec![vec!["key"]]);
    }
}
