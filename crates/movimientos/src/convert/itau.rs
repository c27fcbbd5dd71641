//! Itaú account statements (`Estado_De_Cuenta*.xls`).

use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use super::{
    ConversionReport, ConvertError, Currency, Movement, Occurrence, StatementColumns, cell,
    write_movements,
};
use crate::sheet::{SheetError, read_grid};
use crate::table::Row;

pub const ITAU_INPUT_PREFIX: &str = "Estado_De_Cuenta";
pub const ITAU_OUTPUT_PESOS: &str = "itau_debito_pesos.xlsx";
pub const ITAU_OUTPUT_DOLLARS: &str = "itau_debito_dolares.xlsx";

/// Cell F5 names the currency of the account.
const CURRENCY_CELL: (usize, usize) = (4, 5);

/// Statement files in `dir`, sorted by name.
fn statements(dir: &Path) -> Result<Vec<PathBuf>, SheetError> {
    let io_error = |source| SheetError::Io {
        path: dir.to_owned(),
        source,
    };
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let is_statement = path.file_name().and_then(|name| name.to_str()).is_some_and(|name| {
            name.starts_with(ITAU_INPUT_PREFIX) && name.to_lowercase().ends_with(".xls")
        });
        if is_statement && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn header_row(grid: &[Row]) -> Option<usize> {
    grid.iter().position(|row| {
        row.iter().any(|cell| {
            cell.as_str()
                .is_some_and(|text| text.trim().to_lowercase().contains("fecha"))
        })
    })
}

fn statement_movements(
    grid: &[Row],
    file: &Path,
) -> Result<(Currency, Vec<Movement>), ConvertError> {
    let (row, column) = CURRENCY_CELL;
    let currency = Currency::detect(grid.get(row).map(|cells| cell(cells, column)));
    let header = header_row(grid).ok_or_else(|| ConvertError::NoHeader {
        file: file.to_owned(),
    })?;
    let columns = StatementColumns::find(&grid[header], &["importe"], Occurrence::First, file)?;
    Ok((currency, columns.movements(&grid[header + 1..], false)))
}

/// Converts every statement in `dir`, concatenating movements per currency into
/// `itau_debito_pesos.xlsx` and `itau_debito_dolares.xlsx`.
pub fn convert_itau(dir: &Path, usd_rate: Option<Decimal>) -> Result<ConversionReport, ConvertError> {
    let inputs = statements(dir)?;
    if inputs.is_empty() {
        tracing::warn!(
            "no {ITAU_INPUT_PREFIX}*.xls files found in {}",
            dir.display()
        );
        return Ok(ConversionReport::default());
    }

    let mut pesos = Vec::new();
    let mut dollars = Vec::new();
    for input in &inputs {
        let grid = read_grid(input)?;
        let (currency, movements) = statement_movements(&grid, input)?;
        tracing::info!(
            "{}: {} movements in {currency}",
            input.display(),
            movements.len()
        );
        match currency {
            Currency::Pesos => pesos.extend(movements),
            Currency::Dollars => dollars.extend(movements),
        }
    }

    let mut report = ConversionReport {
        inputs,
        outputs: Vec::new(),
    };
    for (currency, movements, output) in [
        (Currency::Pesos, pesos, ITAU_OUTPUT_PESOS),
        (Currency::Dollars, dollars, ITAU_OUTPUT_DOLLARS),
    ] {
        if !movements.is_empty() {
            report.outputs.push(write_movements(
                dir.join(output),
                currency,
                &movements,
                usd_rate,
            )?);
        }
    }
    Ok(report)
}
