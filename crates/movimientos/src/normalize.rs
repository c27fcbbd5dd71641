//! Value normalization for bank exports and Zetacuentas reports.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive as _;
use std::str::FromStr as _;
use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

use crate::sheet::from_excel_serial;
use crate::table::Cell;

const DAY_FIRST_DATES: &[&str] = &["%d/%m/%y", "%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y"];
const DAY_FIRST_DATETIMES: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Interprets a cell as a calendar date, reading text day first.
pub fn normalize_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(datetime) => Some(datetime.date()),
        Cell::Number(serial) => from_excel_serial(*serial).map(|datetime| datetime.date()),
        Cell::Text(text) => parse_day_first(text.trim()),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

fn parse_day_first(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }
    DAY_FIRST_DATES
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            DAY_FIRST_DATETIMES.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|datetime| datetime.date())
            })
        })
}

/// Uppercase, accents removed, whitespace collapsed to single spaces.
pub fn normalize_description(cell: &Cell) -> String {
    let text = match cell {
        Cell::Empty => return String::new(),
        Cell::Text(text) => text.clone(),
        other => other.to_string(),
    };
    let folded: String = text
        .trim()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_uppercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Amount rounded to cents. Values that are not numbers count as zero.
pub fn normalize_amount(cell: &Cell) -> Decimal {
    let amount = match cell {
        Cell::Number(number) => Decimal::from_f64(*number),
        Cell::Text(text) => {
            let text = text.trim();
            Decimal::from_str(text)
                .ok()
                .or_else(|| Decimal::from_scientific(text).ok())
        }
        _ => None,
    };
    amount.unwrap_or_default().round_dp(2)
}

/// Parses amounts the way Uruguayan banks print them: `1.234,56`, `-15,68`.
///
/// Numeric cells are taken as they are. Text that cannot be parsed counts as zero.
pub fn parse_amount(cell: &Cell) -> Decimal {
    match cell {
        Cell::Number(number) => Decimal::from_f64(*number).unwrap_or_default(),
        Cell::Text(text) => parse_amount_text(text),
        _ => Decimal::ZERO,
    }
}

fn parse_amount_text(text: &str) -> Decimal {
    let text = text.trim();
    if text.is_empty() {
        return Decimal::ZERO;
    }
    let negative = text.starts_with('-');
    let digits = text.replace(['-', '.'], "").replace(',', ".");
    match Decimal::from_str(&digits) {
        Ok(amount) if negative => -amount,
        Ok(amount) => amount,
        Err(_) => Decimal::ZERO,
    }
}

/// Renders a date cell as `dd/mm/yyyy` text. Unrecognized text is returned trimmed but
/// otherwise unchanged.
pub fn date_text(cell: &Cell) -> String {
    let date = match cell {
        Cell::Empty | Cell::Bool(_) => return String::new(),
        Cell::DateTime(datetime) => Some(datetime.date()),
        Cell::Number(serial) => from_excel_serial(*serial).map(|datetime| datetime.date()),
        Cell::Text(text) => {
            let text = text.trim();
            let date = ["%d/%m/%y", "%d/%m/%Y", "%Y-%m-%d"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok());
            if date.is_none() {
                return text.to_owned();
            }
            date
        }
    };
    date.map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_default()
}

/// Text content of a cell, trimmed. Empty for empty cells.
pub fn cell_text(cell: &Cell) -> String {
    cell.to_string().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[rstest]
    #[case("05/01/25", date(2025, 1, 5))]
    #[case("05/01/2025", date(2025, 1, 5))]
    #[case("2025-01-05", date(2025, 1, 5))]
    #[case(" 31-12-2024 ", date(2024, 12, 31))]
    #[case("2025-01-05 13:45:00", date(2025, 1, 5))]
    #[case("05/01/2025 08:30", date(2025, 1, 5))]
    fn dates_are_read_day_first(#[case] input: &str, #[case] expected: NaiveDate) {
        assert_eq!(normalize_date(&Cell::text(input)), Some(expected));
    }

    #[rstest]
    #[case(Cell::Empty)]
    #[case(Cell::text(""))]
    #[case(Cell::text("SALDO ANTERIOR"))]
    #[case(Cell::text("32/01/2025"))]
    #[case(Cell::Bool(true))]
    fn not_a_date(#[case] cell: Cell) {
        assert_eq!(normalize_date(&cell), None);
    }

    #[test]
    fn dates_from_workbook_cells() {
        let datetime = date(2025, 2, 3).and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(normalize_date(&Cell::DateTime(datetime)), Some(date(2025, 2, 3)));
        assert_eq!(normalize_date(&Cell::Number(45658.0)), Some(date(2025, 1, 1)));
    }

    #[rstest]
    #[case("  Compra   en   Tienda Inglesa ", "COMPRA EN TIENDA INGLESA")]
    #[case("Débito automático", "DEBITO AUTOMATICO")]
    #[case("PEÑAROL", "PENAROL")]
    #[case("ﬁnanciación", "FINANCIACION")]
    #[case("", "")]
    fn descriptions_are_folded(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_description(&Cell::text(input)), expected);
    }

    #[rstest]
    #[case(Cell::Number(120.456), dec!(120.46))]
    #[case(Cell::Number(-15.5), dec!(-15.50))]
    #[case(Cell::text("99.999"), dec!(100.00))]
    #[case(Cell::text("1e2"), dec!(100))]
    #[case(Cell::text("abc"), dec!(0))]
    #[case(Cell::Empty, dec!(0))]
    fn amounts_are_rounded_to_cents(#[case] cell: Cell, #[case] expected: Decimal) {
        assert_eq!(normalize_amount(&cell), expected);
    }

    #[rstest]
    #[case("1.234,56", dec!(1234.56))]
    #[case("-15,68", dec!(-15.68))]
    #[case("1.300,00", dec!(1300.00))]
    #[case("1.300", dec!(1300))]
    #[case("  250 ", dec!(250))]
    #[case("", dec!(0))]
    #[case("n/a", dec!(0))]
    fn bank_amounts(#[case] input: &str, #[case] expected: Decimal) {
        assert_eq!(parse_amount(&Cell::text(input)), expected);
    }

    #[test]
    fn numeric_bank_amounts_are_not_reparsed() {
        assert_eq!(parse_amount(&Cell::Number(1234.5)), dec!(1234.5));
    }

    #[rstest]
    #[case(Cell::text("05/01/25"), "05/01/2025")]
    #[case(Cell::text("5/1/2025"), "05/01/2025")]
    #[case(Cell::text("2025-01-05"), "05/01/2025")]
    #[case(Cell::text(" Saldo "), "Saldo")]
    #[case(Cell::Empty, "")]
    fn date_texts(#[case] cell: Cell, #[case] expected: &str) {
        assert_eq!(date_text(&cell), expected);
    }
}
