//! Converters from bank exports to movement spreadsheets that Zetacuentas imports.

mod brou;
mod card;
mod itau;

pub use brou::{BROU_INPUT, BROU_OUTPUT, convert_brou};
pub use card::{CARD_INPUT, CARD_OUTPUT_DOLLARS, CARD_OUTPUT_PESOS, convert_card};
pub use itau::{ITAU_INPUT_PREFIX, ITAU_OUTPUT_DOLLARS, ITAU_OUTPUT_PESOS, convert_itau};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive as _;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::normalize::{cell_text, date_text, parse_amount};
use crate::sheet::{SheetError, write_table};
use crate::table::{Cell, Row, Table};

pub const MOVEMENT_HEADERS: [&str; 5] = ["Fecha", "Descripcion", "Creditos", "Debitos", "Cotizacion"];

const DATE_KEYWORDS: &[&str] = &["fecha"];
const DESCRIPTION_KEYWORDS: &[&str] = &["descripcion", "descripción", "detalle", "concepto"];
const DEBIT_KEYWORDS: &[&str] = &["debito", "débito"];
const CREDIT_KEYWORDS: &[&str] = &["credito", "crédito"];

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("column '{column}' not found in {}", .file.display())]
    MissingColumn { column: String, file: PathBuf },
    #[error("no date or description column in {}", .file.display())]
    NoMovementColumns { file: PathBuf },
    #[error("no amount column (importe, or débito and crédito) in {}", .file.display())]
    NoAmountColumns { file: PathBuf },
    #[error("no header row found in {}", .file.display())]
    NoHeader { file: PathBuf },
    #[error(transparent)]
    Sheet(#[from] SheetError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Currency {
    Pesos,
    Dollars,
}

impl Currency {
    /// Dollars if any of the cells mentions them.
    fn detect<'a>(cells: impl IntoIterator<Item = &'a Cell>) -> Currency {
        let dollars = cells.into_iter().any(|cell| {
            let text = cell.to_string().to_uppercase();
            ["DÓLAR", "DOLAR", "USD"]
                .iter()
                .any(|marker| text.contains(marker))
        });
        if dollars {
            Currency::Dollars
        } else {
            Currency::Pesos
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Pesos => f.write_str("pesos"),
            Currency::Dollars => f.write_str("dollars"),
        }
    }
}

/// One line of a movement spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    /// `dd/mm/yyyy`
    pub date: String,
    pub description: String,
    pub credits: Decimal,
    pub debits: Decimal,
}

impl Movement {
    /// Splits a signed bank amount: negative amounts are credits, positive ones debits.
    pub fn from_amount(date: String, description: String, amount: Decimal) -> Self {
        let (credits, debits) = if amount < Decimal::ZERO {
            (-amount, Decimal::ZERO)
        } else {
            (Decimal::ZERO, amount)
        };
        Movement {
            date,
            description,
            credits,
            debits,
        }
    }
}

pub fn movement_table(movements: &[Movement], quote: Decimal) -> Table {
    let number = |amount: Decimal| Cell::Number(amount.to_f64().unwrap_or_default());
    let mut table = Table::new(MOVEMENT_HEADERS);
    table.extend_rows(movements.iter().map(|movement| {
        vec![
            Cell::text(movement.date.clone()),
            Cell::text(movement.description.clone()),
            number(movement.credits),
            number(movement.debits),
            number(quote),
        ]
    }));
    table
}

/// A spreadsheet written by a converter.
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub currency: Currency,
    pub movements: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionReport {
    /// Bank exports that were read. Empty when none was found.
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<WrittenFile>,
}

/// Writes `movements` to `path`, quoting dollars at `usd_rate`.
fn write_movements(
    path: PathBuf,
    currency: Currency,
    movements: &[Movement],
    usd_rate: Option<Decimal>,
) -> Result<WrittenFile, SheetError> {
    let quote = match (currency, usd_rate) {
        (Currency::Pesos, _) => Decimal::ZERO,
        (Currency::Dollars, Some(rate)) => rate,
        (Currency::Dollars, None) => {
            tracing::warn!(
                "no USD/UYU quote given, {} gets Cotizacion 0",
                path.display()
            );
            Decimal::ZERO
        }
    };
    write_table(&path, &movement_table(movements, quote))?;
    tracing::info!("wrote {} movements to {}", movements.len(), path.display());
    Ok(WrittenFile {
        path,
        currency,
        movements: movements.len(),
    })
}

static EMPTY_CELL: Cell = Cell::Empty;

fn cell(row: &Row, index: usize) -> &Cell {
    row.get(index).unwrap_or(&EMPTY_CELL)
}

enum AmountSource {
    Signed(usize),
    Split { debit: usize, credit: usize },
}

/// Which header wins when several contain the same amount keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurrence {
    First,
    Last,
}

/// Columns of a bank statement, located by keyword in the header row.
struct StatementColumns {
    date: usize,
    description: usize,
    amount: AmountSource,
}

impl StatementColumns {
    /// Date and description take the first matching header. Amount columns take the
    /// first or the last one, following `amounts`.
    fn find(
        headers: &Row,
        amount_keywords: &[&str],
        amounts: Occurrence,
        file: &Path,
    ) -> Result<Self, ConvertError> {
        let labels: Vec<String> = headers
            .iter()
            .map(|header| cell_text(header).to_lowercase())
            .collect();
        let position = |keywords: &[&str], occurrence: Occurrence| {
            let mut matching = labels
                .iter()
                .enumerate()
                .filter(|(_, label)| keywords.iter().any(|keyword| label.contains(keyword)))
                .map(|(index, _)| index);
            match occurrence {
                Occurrence::First => matching.next(),
                Occurrence::Last => matching.last(),
            }
        };

        let (Some(date), Some(description)) = (
            position(DATE_KEYWORDS, Occurrence::First),
            position(DESCRIPTION_KEYWORDS, Occurrence::First),
        ) else {
            return Err(ConvertError::NoMovementColumns {
                file: file.to_owned(),
            });
        };
        let amount = match (
            position(amount_keywords, amounts),
            position(DEBIT_KEYWORDS, amounts),
            position(CREDIT_KEYWORDS, amounts),
        ) {
            (Some(column), _, _) => AmountSource::Signed(column),
            (None, Some(debit), Some(credit)) => AmountSource::Split { debit, credit },
            _ => {
                return Err(ConvertError::NoAmountColumns {
                    file: file.to_owned(),
                });
            }
        };
        Ok(StatementColumns {
            date,
            description,
            amount,
        })
    }

    /// Rows without a date and balance lines yield nothing.
    fn movement(&self, row: &Row, require_description: bool) -> Option<Movement> {
        let date = date_text(cell(row, self.date));
        if date.is_empty() {
            return None;
        }
        let description = cell_text(cell(row, self.description));
        if require_description && description.is_empty() {
            return None;
        }
        let upper = description.to_uppercase();
        if upper.contains("SALDO ANTERIOR") || upper.contains("SALDO FINAL") {
            return None;
        }

        let movement = match self.amount {
            AmountSource::Signed(column) => {
                Movement::from_amount(date, description, parse_amount(cell(row, column)))
            }
            AmountSource::Split { debit, credit } => Movement {
                date,
                description,
                credits: parse_amount(cell(row, credit)),
                debits: parse_amount(cell(row, debit)),
            },
        };
        let blank =
            movement.credits.is_zero() && movement.debits.is_zero() && movement.description.is_empty();
        (!blank).then_some(movement)
    }

    fn movements(&self, rows: &[Row], require_description: bool) -> Vec<Movement> {
        rows.iter()
            .filter_map(|row| self.movement(row, require_description))
            .collect()
    }
}
