//! BROU account detail (`Detalle_Movimiento_Cuenta.xls`).

use rust_decimal::Decimal;
use std::path::Path;

use super::{
    ConversionReport, ConvertError, Currency, Movement, Occurrence, StatementColumns,
    write_movements,
};
use crate::sheet::read_grid;
use crate::table::Row;

pub const BROU_INPUT: &str = "Detalle_Movimiento_Cuenta.xls";
pub const BROU_OUTPUT: &str = "brou_detalle_movimientos.xlsx";

/// Row 18 of the export.
const HEADER_ROW: usize = 17;
const CURRENCY_ROWS: usize = 15;
const CURRENCY_COLUMNS: usize = 10;

fn detail_movements(grid: &[Row], file: &Path) -> Result<(Currency, Vec<Movement>), ConvertError> {
    let currency = Currency::detect(
        grid.iter()
            .take(CURRENCY_ROWS)
            .flat_map(|row| row.iter().take(CURRENCY_COLUMNS)),
    );
    let headers = grid.get(HEADER_ROW).ok_or_else(|| ConvertError::NoHeader {
        file: file.to_owned(),
    })?;
    // the rightmost amount header wins
    let columns = StatementColumns::find(headers, &["importe", "monto"], Occurrence::Last, file)?;
    Ok((currency, columns.movements(&grid[HEADER_ROW + 1..], true)))
}

/// Converts the BROU export in `dir` into `brou_detalle_movimientos.xlsx`.
///
/// Nothing is written when the export is missing or holds no movements.
pub fn convert_brou(dir: &Path, usd_rate: Option<Decimal>) -> Result<ConversionReport, ConvertError> {
    let input = dir.join(BROU_INPUT);
    if !input.exists() {
        tracing::warn!("{} not found", input.display());
        return Ok(ConversionReport::default());
    }

    let grid = read_grid(&input)?;
    let (currency, movements) = detail_movements(&grid, &input)?;
    tracing::info!("{}: {} movements in {currency}", input.display(), movements.len());

    let mut report = ConversionReport {
        inputs: vec![input],
        outputs: Vec::new(),
    };
    if movements.is_empty() {
        tracing::warn!("no movements found, {BROU_OUTPUT} not written");
        return Ok(report);
    }
    report.outputs.push(write_movements(
        dir.join(BROU_OUTPUT),
        currency,
        &movements,
        usd_rate,
    )?);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::movement_table;
    use crate::table::Cell;

    fn export(banner: &str, headers: &[&str], rows: &[&[&str]]) -> Vec<Row> {
        let mut grid = vec![Vec::new(); HEADER_ROW];
        grid[2] = vec![Cell::Empty, Cell::text("Cuenta"), Cell::text(banner)];
        let text_row = |cells: &[&str]| -> Row { cells.iter().map(|cell| Cell::text(*cell)).collect() };
        grid.push(text_row(headers));
        grid.extend(rows.iter().map(|row| text_row(*row)));
        grid
    }

    #[test]
    fn detail_with_debit_and_credit_columns() {
        let grid = export(
            "CAJA DE AHORRO DÓLARES",
            &["Fecha", "Referencia", "Concepto", "Débito", "Crédito"],
            &[
                &["01/03/2025", "", "SALDO ANTERIOR", "", ""],
                &["02/03/2025", "123", "TRANSFERENCIA RECIBIDA", "", "1.500,00"],
                &["03/03/2025", "124", "COMPRA POS", "250,50", ""],
                &["04/03/2025", "125", "", "10,00", ""],
                &["", "", "SALDO FINAL", "", ""],
            ],
        );

        let (currency, movements) = detail_movements(&grid, Path::new(BROU_INPUT)).unwrap();
        assert_eq!(currency, Currency::Dollars);
        insta::assert_snapshot!(movement_table(&movements, Decimal::ZERO).render(), @r"
        Fecha	Descripcion	Creditos	Debitos	Cotizacion
        02/03/2025	TRANSFERENCIA RECIBIDA	1500	0	0
        03/03/2025	COMPRA POS	0	250.5	0
        ");
    }

    #[test]
    fn signed_amount_column() {
        let grid = export(
            "CAJA DE AHORRO PESOS",
            &["Fecha", "Descripción", "Monto"],
            &[&["05/03/25", "DEVOLUCION", "-99,90"]],
        );

        let (currency, movements) = detail_movements(&grid, Path::new(BROU_INPUT)).unwrap();
        assert_eq!(currency, Currency::Pesos);
        assert_eq!(
            movements,
            [Movement::from_amount(
                "05/03/2025".into(),
                "DEVOLUCION".into(),
                rust_decimal_macros::dec!(-99.90)
            )]
        );
    }

    #[test]
    fn short_export_has_no_header() {
        let grid = vec![vec![Cell::text("Detalle de movimientos")]];
        let error = detail_movements(&grid, Path::new(BROU_INPUT)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "no header row found in Detalle_Movimiento_Cuenta.xls"
        );
    }

    #[test]
    fn missing_export_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let report = convert_brou(dir.path(), None).unwrap();
        assert!(report.inputs.is_empty());
        assert!(report.outputs.is_empty());
    }
}
