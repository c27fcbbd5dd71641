use chrono::NaiveDateTime;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::dedup::DedupError;

/// A single spreadsheet value, keeping the type it was stored with.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_owned())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<NaiveDateTime> for Cell {
    fn from(value: NaiveDateTime) -> Self {
        Cell::DateTime(value)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => f.write_str(text),
            Cell::Number(number) => write!(f, "{number}"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::DateTime(datetime) if datetime.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", datetime.format("%Y-%m-%d"))
            }
            Cell::DateTime(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

pub type Row = Vec<Cell>;

/// Named columns plus rows of cells. Every row is exactly as wide as the header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    source: Option<PathBuf>,
    headers: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Table {
            source: None,
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// File this table was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Label used in error messages.
    pub fn label(&self) -> String {
        match &self.source {
            Some(path) => path.display().to_string(),
            None => "<memory>".to_owned(),
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.headers.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn extend_rows(&mut self, rows: impl IntoIterator<Item = Row>) {
        for row in rows {
            self.push_row(row);
        }
    }

    /// Index of the column with exactly this header.
    pub fn column(&self, name: &str) -> Result<usize, DedupError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| DedupError::MissingColumn {
                column: name.to_owned(),
                file: self.label(),
            })
    }

    /// Same headers and source, only the rows for which `keep` returns true.
    pub fn retain_rows(&self, mut keep: impl FnMut(&Row) -> bool) -> Table {
        Table {
            source: self.source.clone(),
            headers: self.headers.clone(),
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    /// Renders the table as tab separated lines, header first. Trailing empty cells are omitted.
    pub fn render(&self) -> String {
        let mut output = self.headers.join("\t");
        output.push('\n');
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            output.push_str(cells.join("\t").trim_end_matches('\t'));
            output.push('\n');
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_row_pads_to_header_width() {
        let mut table = Table::new(["Fecha", "Descripcion", "Creditos"]);
        table.push_row(vec![Cell::text("01/02/2025")]);
        table.push_row(vec![
            Cell::text("02/02/2025"),
            Cell::text("UBER"),
            Cell::Number(10.5),
            Cell::text("extra"),
        ]);

        assert_eq!(
            table.rows()[0],
            vec![Cell::text("01/02/2025"), Cell::Empty, Cell::Empty]
        );
        assert_eq!(
            table.rows()[1],
            vec![Cell::text("02/02/2025"), Cell::text("UBER"), Cell::Number(10.5)]
        );
    }

    #[test]
    fn render_tab_separated() {
        let mut table = Table::new(["Fecha", "Descripcion", "Creditos"]);
        table.push_row(vec![
            Cell::text("02/02/2025"),
            Cell::text("UBER"),
            Cell::Number(10.5),
        ]);
        table.push_row(vec![
            Cell::text("03/02/2025"),
            Cell::text("ANTEL"),
            Cell::Number(1200.0),
        ]);

        insta::assert_snapshot!(table.render(), @r"
        Fecha	Descripcion	Creditos
        02/02/2025	UBER	10.5
        03/02/2025	ANTEL	1200
        ");
    }

    #[test]
    fn missing_column_names_the_file() {
        let table = Table::new(["Fecha"]).with_source("movimientos_pesos.xlsx");
        let error = table.column("Descripcion").unwrap_err();
        assert_eq!(
            error.to_string(),
            "column 'Descripcion' not found in movimientos_pesos.xlsx"
        );
    }

    #[test]
    fn display_dates_without_midnight_time() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Cell::DateTime(date).to_string(), "2025-03-04");
        let later = date + chrono::Duration::minutes(90);
        assert_eq!(Cell::DateTime(later).to_string(), "2025-03-04 01:30:00");
    }
}
