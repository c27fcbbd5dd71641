//! Itaú credit card export (`movimientos.csv`).

use rust_decimal::Decimal;
use std::path::Path;

use super::{ConversionReport, ConvertError, Currency, Movement, cell, write_movements};
use crate::normalize::{cell_text, date_text, parse_amount};
use crate::sheet::read_table;
use crate::table::Table;

pub const CARD_INPUT: &str = "movimientos.csv";
pub const CARD_OUTPUT_PESOS: &str = "movimientos_pesos.xlsx";
pub const CARD_OUTPUT_DOLLARS: &str = "movimientos_dolares.xlsx";

const PAYMENT_RECEIPT: &str = "RECIBO DE PAGO";

struct CardColumns {
    date: usize,
    name: usize,
    amount: usize,
    currency: usize,
}

impl CardColumns {
    fn find(table: &Table, file: &Path) -> Result<Self, ConvertError> {
        let column = |name: &str| {
            table
                .headers()
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| ConvertError::MissingColumn {
                    column: name.to_owned(),
                    file: file.to_owned(),
                })
        };
        Ok(CardColumns {
            date: column("Fecha")?,
            name: column("Nombre")?,
            amount: column("Importe")?,
            currency: column("Moneda")?,
        })
    }
}

/// Movements of the card export split by currency. Payment receipts are dropped.
fn card_movements(table: &Table, file: &Path) -> Result<(Vec<Movement>, Vec<Movement>), ConvertError> {
    let columns = CardColumns::find(table, file)?;
    let mut pesos = Vec::new();
    let mut dollars = Vec::new();
    for row in table.rows() {
        let name = cell_text(cell(row, columns.name));
        if name.contains(PAYMENT_RECEIPT) {
            continue;
        }
        let currency = match cell(row, columns.currency).as_str().map(str::trim) {
            Some("Pesos") => Currency::Pesos,
            Some("Dólares") => Currency::Dollars,
            _ => continue,
        };
        let date = cell(row, columns.date);
        if date.is_empty() || name.is_empty() {
            continue;
        }

        let movement =
            Movement::from_amount(date_text(date), name, parse_amount(cell(row, columns.amount)));
        match currency {
            Currency::Pesos => pesos.push(movement),
            Currency::Dollars => dollars.push(movement),
        }
    }
    Ok((pesos, dollars))
}

/// Converts `movimientos.csv` in `dir`. The pesos file is always written, the dollars file only
/// when there are dollar movements.
pub fn convert_card(dir: &Path, usd_rate: Option<Decimal>) -> Result<ConversionReport, ConvertError> {
    let input = dir.join(CARD_INPUT);
    if !input.exists() {
        tracing::warn!("{} not found", input.display());
        return Ok(ConversionReport::default());
    }

    let table = read_table(&input, 0)?;
    let (pesos, dollars) = card_movements(&table, &input)?;
    tracing::debug!(
        "{}: {} peso and {} dollar movements",
        input.display(),
        pesos.len(),
        dollars.len()
    );

    let mut report = ConversionReport {
        inputs: vec![input],
        outputs: Vec::new(),
    };
    report.outputs.push(write_movements(
        dir.join(CARD_OUTPUT_PESOS),
        Currency::Pesos,
        &pesos,
        usd_rate,
    )?);
    if dollars.is_empty() {
        tracing::info!("no dollar movements, {CARD_OUTPUT_DOLLARS} not written");
    } else {
        report.outputs.push(write_movements(
            dir.join(CARD_OUTPUT_DOLLARS),
            Currency::Dollars,
            &dollars,
            usd_rate,
        )?);
    }
    Ok(report)
}
