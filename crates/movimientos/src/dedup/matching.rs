use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::collections::HashSet;

use super::{DedupError, Filtered};
use crate::normalize::{normalize_amount, normalize_date, normalize_description};
use crate::table::{Cell, Row, Table};

const REFERENCE_DATE: &str = "Fecha";
const REFERENCE_DESCRIPTION: &str = "Descripción";
const REFERENCE_AMOUNT: &str = "Importe";
const TARGET_DATE: &str = "Fecha";
const TARGET_DESCRIPTION: &str = "Descripcion";
const TARGET_CREDITS: &str = "Creditos";
const TARGET_DEBITS: &str = "Debitos";

/// How rows of a target table are matched against the reference table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// Exact equality of one cell on each side.
    Column {
        column: String,
        reference_column: String,
    },
    /// Normalized `(date, description, amount)` of a movement. The target amount is
    /// `Creditos - Debitos`, the reference amount is `Importe`.
    Transaction,
}

impl MatchRule {
    pub fn column(column: impl Into<String>, reference_column: impl Into<String>) -> Self {
        MatchRule::Column {
            column: column.into(),
            reference_column: reference_column.into(),
        }
    }

    /// Fails with [`DedupError::MissingColumn`] if the target lacks a column this rule reads.
    pub fn check_target(&self, target: &Table) -> Result<(), DedupError> {
        self.target_columns(target).map(drop)
    }

    fn reference_columns(&self, reference: &Table) -> Result<KeyColumns, DedupError> {
        match self {
            MatchRule::Column {
                reference_column, ..
            } => Ok(KeyColumns::Value(reference.column(reference_column)?)),
            MatchRule::Transaction => Ok(KeyColumns::Transaction {
                date: reference.column(REFERENCE_DATE)?,
                description: reference.column(REFERENCE_DESCRIPTION)?,
                amount: AmountColumns::Required(reference.column(REFERENCE_AMOUNT)?),
            }),
        }
    }

    fn target_columns(&self, target: &Table) -> Result<KeyColumns, DedupError> {
        match self {
            MatchRule::Column { column, .. } => Ok(KeyColumns::Value(target.column(column)?)),
            MatchRule::Transaction => Ok(KeyColumns::Transaction {
                date: target.column(TARGET_DATE)?,
                description: target.column(TARGET_DESCRIPTION)?,
                amount: AmountColumns::Balance {
                    credits: target.column(TARGET_CREDITS).ok(),
                    debits: target.column(TARGET_DEBITS).ok(),
                },
            }),
        }
    }
}

/// Hashable form of a cell. Empty cells and NaN have no key and never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Text(String),
    Number(u64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl CellKey {
    pub fn of(cell: &Cell) -> Option<CellKey> {
        match cell {
            Cell::Empty => None,
            Cell::Text(text) if text.is_empty() => None,
            Cell::Text(text) => Some(CellKey::Text(text.clone())),
            Cell::Number(number) if number.is_nan() => None,
            // 0.0 == -0.0
            Cell::Number(number) if *number == 0.0 => Some(CellKey::Number(0f64.to_bits())),
            Cell::Number(number) => Some(CellKey::Number(number.to_bits())),
            Cell::Bool(value) => Some(CellKey::Bool(*value)),
            Cell::DateTime(datetime) => Some(CellKey::DateTime(*datetime)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Value(CellKey),
    Transaction {
        date: NaiveDate,
        description: String,
        amount: Decimal,
    },
}

enum AmountColumns {
    /// Rows with an empty amount produce no key.
    Required(usize),
    /// `credits - debits`, missing columns and empty cells count as zero.
    Balance {
        credits: Option<usize>,
        debits: Option<usize>,
    },
}

enum KeyColumns {
    Value(usize),
    Transaction {
        date: usize,
        description: usize,
        amount: AmountColumns,
    },
}

impl KeyColumns {
    fn key(&self, row: &Row) -> Option<MatchKey> {
        match self {
            KeyColumns::Value(column) => CellKey::of(&row[*column]).map(MatchKey::Value),
            KeyColumns::Transaction {
                date,
                description,
                amount,
            } => {
                let date = normalize_date(&row[*date])?;
                let description = normalize_description(&row[*description]);
                if description.is_empty() {
                    return None;
                }
                let amount = match *amount {
                    AmountColumns::Required(column) if row[column].is_empty() => return None,
                    AmountColumns::Required(column) => normalize_amount(&row[column]),
                    AmountColumns::Balance { credits, debits } => {
                        let value =
                            |column: Option<usize>| column.map(|column| normalize_amount(&row[column]));
                        (value(credits).unwrap_or_default() - value(debits).unwrap_or_default())
                            .round_dp(2)
                    }
                };
                Some(MatchKey::Transaction {
                    date,
                    description,
                    amount: amount.normalize(),
                })
            }
        }
    }
}

/// The set of keys already present in the reference table.
pub struct ReferenceKeys<'a> {
    rule: &'a MatchRule,
    keys: HashSet<MatchKey>,
}

impl<'a> ReferenceKeys<'a> {
    pub fn build(rule: &'a MatchRule, reference: &Table) -> Result<Self, DedupError> {
        let columns = rule.reference_columns(reference)?;
        let keys = reference
            .rows()
            .iter()
            .filter_map(|row| columns.key(row))
            .collect();
        Ok(ReferenceKeys { rule, keys })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &MatchKey) -> bool {
        self.keys.contains(key)
    }

    /// Drops every target row whose key is in the set. Rows without a key are kept.
    pub fn filter(&self, target: &Table) -> Result<Filtered, DedupError> {
        let columns = self.rule.target_columns(target)?;
        let table = target.retain_rows(|row| {
            columns
                .key(row)
                .is_none_or(|key| !self.keys.contains(&key))
        });
        Ok(Filtered {
            removed: target.len() - table.len(),
            table,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn table(headers: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        let mut table = Table::new(headers.iter().copied());
        table.extend_rows(rows);
        table
    }

    #[test]
    fn cell_keys_compare_native_values() {
        assert_eq!(CellKey::of(&Cell::Empty), None);
        assert_eq!(CellKey::of(&Cell::text("")), None);
        assert_eq!(CellKey::of(&Cell::Number(f64::NAN)), None);
        assert_eq!(
            CellKey::of(&Cell::Number(-0.0)),
            CellKey::of(&Cell::Number(0.0))
        );
        assert_ne!(
            CellKey::of(&Cell::Number(100.0)),
            CellKey::of(&Cell::text("100"))
        );
        assert_ne!(
            CellKey::of(&Cell::text("UBER ")),
            CellKey::of(&Cell::text("UBER"))
        );
    }

    #[test]
    fn reference_transaction_rows_need_all_fields() {
        let reference = table(
            &["Fecha", "Descripción", "Cuenta", "Importe"],
            vec![
                vec![
                    Cell::text("01/02/2025"),
                    Cell::text("Uber  trip"),
                    Cell::text("Crédito Itaú $"),
                    Cell::Number(-250.0),
                ],
                vec![
                    Cell::text("02/02/2025"),
                    Cell::text("ANTEL"),
                    Cell::text("Crédito Itaú $"),
                    Cell::Empty,
                ],
                vec![
                    Cell::text("not a date"),
                    Cell::text("ANTEL"),
                    Cell::text("Crédito Itaú $"),
                    Cell::Number(10.0),
                ],
            ],
        );

        let rule = MatchRule::Transaction;
        let keys = ReferenceKeys::build(&rule, &reference).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains(&MatchKey::Transaction {
            date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            description: "UBER TRIP".to_owned(),
            amount: dec!(-250).normalize(),
        }));
    }

    #[test]
    fn target_transaction_amount_is_credits_minus_debits() {
        let reference = table(
            &["Fecha", "Descripción", "Importe"],
            vec![
                vec![
                    Cell::text("01/02/2025"),
                    Cell::text("Devolución"),
                    Cell::Number(100.0),
                ],
                vec![
                    Cell::text("03/02/2025"),
                    Cell::text("Supermercado"),
                    Cell::Number(-45.5),
                ],
            ],
        );
        let target = table(
            &["Fecha", "Descripcion", "Creditos", "Debitos", "Cotizacion"],
            vec![
                vec![
                    Cell::text("01/02/2025"),
                    Cell::text("DEVOLUCION"),
                    Cell::Number(100.0),
                    Cell::Number(0.0),
                    Cell::Number(0.0),
                ],
                vec![
                    Cell::text("03/02/2025"),
                    Cell::text("supermercado"),
                    Cell::Number(0.0),
                    Cell::Number(45.5),
                    Cell::Number(0.0),
                ],
                vec![
                    Cell::text("03/02/2025"),
                    Cell::text("Supermercado"),
                    Cell::Number(0.0),
                    Cell::Number(45.0),
                    Cell::Number(0.0),
                ],
            ],
        );

        let rule = MatchRule::Transaction;
        let filtered = ReferenceKeys::build(&rule, &reference)
            .unwrap()
            .filter(&target)
            .unwrap();
        assert_eq!(filtered.removed, 2);
        insta::assert_snapshot!(filtered.table.render(), @r"
        Fecha	Descripcion	Creditos	Debitos	Cotizacion
        03/02/2025	Supermercado	0	45	0
        ");
    }

    #[test]
    fn target_without_credit_columns_counts_zero() {
        let reference = table(
            &["Fecha", "Descripción", "Importe"],
            vec![vec![
                Cell::text("01/02/2025"),
                Cell::text("AJUSTE"),
                Cell::Number(0.0),
            ]],
        );
        let target = table(
            &["Fecha", "Descripcion"],
            vec![vec![Cell::text("2025-02-01"), Cell::text("ajuste")]],
        );

        let rule = MatchRule::Transaction;
        let filtered = ReferenceKeys::build(&rule, &reference)
            .unwrap()
            .filter(&target)
            .unwrap();
        assert_eq!(filtered.removed, 1);
        assert!(filtered.table.is_empty());
    }

    #[test]
    fn transaction_rule_checks_target_columns() {
        let target = table(&["Fecha", "Detalle"], Vec::new());
        let error = MatchRule::Transaction.check_target(&target).unwrap_err();
        assert_eq!(
            error.to_string(),
            "column 'Descripcion' not found in <memory>"
        );
    }
}
