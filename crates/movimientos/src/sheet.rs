//! Reading and writing spreadsheets as [`Table`]s.
//!
//! Workbooks (`xlsx`, `xlsm`, `xlsb`, `xls`, `ods`) are read through `calamine`, always from the
//! first worksheet. Output is written either as `xlsx` or as `csv`.

use calamine::{Data, Reader, open_workbook_auto};
use chrono::{NaiveDate, NaiveDateTime};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::table::{Cell, Row, Table};

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read spreadsheet {}: {source}", .path.display())]
    Spreadsheet {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("failed to process CSV file {}: {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("failed to write {}: {source}", .path.display())]
    Xlsx { path: PathBuf, source: XlsxError },
    #[error("{} contains no worksheet", .path.display())]
    NoWorksheet { path: PathBuf },
    #[error("{} has no header at row {}", .path.display(), .row + 1)]
    MissingHeader { path: PathBuf, row: usize },
    #[error("unsupported spreadsheet format: {}", .path.display())]
    UnsupportedFormat { path: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetKind {
    Workbook,
    Csv,
}

fn kind_of(path: &Path) -> Result<SheetKind, SheetError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("xlsx" | "xlsm" | "xlsb" | "xls" | "ods") => Ok(SheetKind::Workbook),
        Some("csv") => Ok(SheetKind::Csv),
        _ => Err(SheetError::UnsupportedFormat {
            path: path.to_owned(),
        }),
    }
}

/// Reads every row of the first sheet without interpreting any header.
///
/// Row and column indices are absolute: if the used area of a sheet starts at `C4`,
/// the returned grid still starts at `A1` with empty cells in front.
pub fn read_grid(path: &Path) -> Result<Vec<Row>, SheetError> {
    match kind_of(path)? {
        SheetKind::Workbook => read_workbook_grid(path),
        SheetKind::Csv => read_csv_grid(path),
    }
}

/// Reads the first sheet as a table whose header is at `header_row` (zero based).
///
/// Rows after the header that contain no value at all are dropped.
pub fn read_table(path: &Path, header_row: usize) -> Result<Table, SheetError> {
    let grid = read_grid(path)?;
    let mut rows = grid.into_iter().skip(header_row);
    let header = rows.next().ok_or_else(|| SheetError::MissingHeader {
        path: path.to_owned(),
        row: header_row,
    })?;
    let rows: Vec<Row> = rows
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    let width = rows
        .iter()
        .map(|row| used_width(row))
        .chain(std::iter::once(header.len()))
        .max()
        .unwrap_or_default();
    let headers = (0..width).map(|index| match header.get(index) {
        Some(cell) if !cell.is_empty() => cell.to_string(),
        _ => format!("Unnamed: {index}"),
    });

    let mut table = Table::new(headers).with_source(path);
    table.extend_rows(rows);
    tracing::debug!("read {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Writes the table to `path`, replacing any existing file.
pub fn write_table(path: &Path, table: &Table) -> Result<(), SheetError> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("xlsx") => write_xlsx(path, table).map_err(|source| SheetError::Xlsx {
            path: path.to_owned(),
            source,
        }),
        Some("csv") => write_csv(path, table).map_err(|source| SheetError::Csv {
            path: path.to_owned(),
            source,
        }),
        _ => Err(SheetError::UnsupportedFormat {
            path: path.to_owned(),
        }),
    }
}

/// Decodes text exported by banks: UTF-8 when valid, Latin-1 otherwise.
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(error) => error.into_bytes().into_iter().map(char::from).collect(),
    }
}

fn used_width(row: &[Cell]) -> usize {
    row.iter()
        .rposition(|cell| !cell.is_empty())
        .map_or(0, |last| last + 1)
}

fn read_workbook_grid(path: &Path) -> Result<Vec<Row>, SheetError> {
    let spreadsheet_error = |source| SheetError::Spreadsheet {
        path: path.to_owned(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SheetError::NoWorksheet {
            path: path.to_owned(),
        })?
        .map_err(spreadsheet_error)?;

    let (start_row, start_column) = range.start().unwrap_or((0, 0));
    let mut grid: Vec<Row> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_column as usize];
        cells.extend(row.iter().map(cell_from_data));
        grid.push(cells);
    }
    Ok(grid)
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(text) => Cell::Text(text.clone()),
        Data::Float(number) => Cell::Number(*number),
        Data::Int(number) => Cell::Number(*number as f64),
        Data::Bool(value) => Cell::Bool(*value),
        Data::DateTime(datetime) => datetime
            .as_datetime()
            .map_or(Cell::Number(datetime.as_f64()), Cell::DateTime),
        Data::DateTimeIso(text) => text
            .parse::<NaiveDateTime>()
            .ok()
            .or_else(|| {
                text.parse::<NaiveDate>()
                    .ok()
                    .map(|date| date.and_time(chrono::NaiveTime::MIN))
            })
            .map_or_else(|| Cell::Text(text.clone()), Cell::DateTime),
        Data::DurationIso(text) => Cell::Text(text.clone()),
    }
}

fn read_csv_grid(path: &Path) -> Result<Vec<Row>, SheetError> {
    let bytes = std::fs::read(path).map_err(|source| SheetError::Io {
        path: path.to_owned(),
        source,
    })?;
    let text = decode_text(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| SheetError::Csv {
            path: path.to_owned(),
            source,
        })?;
        grid.push(record.iter().map(csv_cell).collect());
    }
    Ok(grid)
}

/// CSV carries no types, so fields stay text and are written back exactly as read.
fn csv_cell(field: &str) -> Cell {
    if field.is_empty() {
        Cell::Empty
    } else {
        Cell::Text(field.to_owned())
    }
}

fn write_xlsx(path: &Path, table: &Table) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let header_format = Format::new().set_bold();
    let date_format = Format::new().set_num_format("dd/mm/yyyy");
    let datetime_format = Format::new().set_num_format("dd/mm/yyyy hh:mm:ss");

    for (column, header) in table.headers().iter().enumerate() {
        worksheet.write_string_with_format(0, column as u16, header, &header_format)?;
    }
    for (index, row) in table.rows().iter().enumerate() {
        let row_number = index as u32 + 1;
        for (column, cell) in row.iter().enumerate() {
            let column = column as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(text) => {
                    worksheet.write_string(row_number, column, text)?;
                }
                Cell::Number(number) => {
                    worksheet.write_number(row_number, column, *number)?;
                }
                Cell::Bool(value) => {
                    worksheet.write_boolean(row_number, column, *value)?;
                }
                Cell::DateTime(datetime) => {
                    let format = if datetime.time() == chrono::NaiveTime::MIN {
                        &date_format
                    } else {
                        &datetime_format
                    };
                    worksheet.write_number_with_format(
                        row_number,
                        column,
                        excel_serial(datetime),
                        format,
                    )?;
                }
            }
        }
    }

    workbook.save(path)
}

fn write_csv(path: &Path, table: &Table) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }
    writer.flush()?;
    Ok(())
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(chrono::NaiveTime::MIN)
}

/// Days since the Excel epoch (1899-12-30), the way workbooks store dates.
pub fn excel_serial(datetime: &NaiveDateTime) -> f64 {
    (*datetime - excel_epoch()).num_milliseconds() as f64 / 86_400_000.0
}

pub fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    excel_epoch().checked_add_signed(chrono::Duration::milliseconds(millis))
}
