//! Removing movements that are already recorded in the Zetacuentas comprobante.

mod matching;

pub use matching::{CellKey, MatchKey, MatchRule, ReferenceKeys};

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sheet::{SheetError, read_table, write_table};
use crate::table::Table;

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("file not found: {}", .path.display())]
    MissingFile { path: PathBuf },
    #[error("column '{column}' not found in {file}")]
    MissingColumn { column: String, file: String },
    #[error(transparent)]
    Io(#[from] SheetError),
}

/// A target table after filtering, and how many of its rows were dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub table: Table,
    pub removed: usize,
}

/// Drops the rows of `target` whose `target_key_column` value appears in the
/// `reference_key_column` of `reference`. Values must be exactly equal, including their type.
pub fn filter(
    reference: &Table,
    target: &Table,
    target_key_column: &str,
    reference_key_column: &str,
) -> Result<Filtered, DedupError> {
    let rule = MatchRule::column(target_key_column, reference_key_column);
    filter_with_rule(reference, target, &rule)
}

pub fn filter_with_rule(
    reference: &Table,
    target: &Table,
    rule: &MatchRule,
) -> Result<Filtered, DedupError> {
    ReferenceKeys::build(rule, reference)?.filter(target)
}

/// Only the reference rows booked on `account`.
pub fn scope_to_account(
    reference: &Table,
    account_column: &str,
    account: &str,
) -> Result<Table, DedupError> {
    let column = reference.column(account_column)?;
    Ok(reference.retain_rows(|row| row[column].as_str() == Some(account)))
}

/// Where the comprobante is and how to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSpec {
    /// The first existing file is used.
    pub candidates: Vec<PathBuf>,
    pub header_row: usize,
    /// Column naming the account of each reference row; used together with [`TargetSpec::account`].
    pub account_column: Option<String>,
}

impl Default for ReferenceSpec {
    fn default() -> Self {
        ReferenceSpec {
            candidates: vec![
                PathBuf::from("comprobante.xlsx"),
                PathBuf::from("cromprobante.xlsx"),
            ],
            header_row: 2,
            account_column: Some("Cuenta".to_owned()),
        }
    }
}

impl ReferenceSpec {
    pub fn locate(&self) -> Result<&Path, DedupError> {
        self.candidates
            .iter()
            .find(|candidate| candidate.exists())
            .map(PathBuf::as_path)
            .ok_or_else(|| DedupError::MissingFile {
                path: self.candidates.first().cloned().unwrap_or_default(),
            })
    }

    pub fn load(&self) -> Result<Table, DedupError> {
        let path = self.locate()?;
        Ok(read_table(path, self.header_row)?)
    }
}

/// One spreadsheet to deduplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub name: String,
    pub path: PathBuf,
    pub rule: MatchRule,
    /// Restricts the reference to rows of this account.
    pub account: Option<String>,
    /// Missing optional files are skipped instead of failing the run.
    pub optional: bool,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, rule: MatchRule) -> Self {
        TargetSpec {
            name: name.into(),
            path: path.into(),
            rule,
            account: None,
            optional: true,
        }
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }
}

/// The spreadsheets produced by the bank converters, one per Zetacuentas account.
pub fn default_targets() -> Vec<TargetSpec> {
    [
        ("Crédito Itaú $", "movimientos_pesos.xlsx"),
        ("Crédito Itaú U$S", "movimientos_dolares.xlsx"),
        ("Débito BROU $", "brou_detalle_movimientos.xlsx"),
        ("Débito Itaú $ Gonza", "itau_debito_pesos.xlsx"),
    ]
    .into_iter()
    .map(|(account, file)| {
        TargetSpec::new(account, file, MatchRule::column("Descripcion", "Descripción"))
            .account(account)
    })
    .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Report what would be removed without touching any file.
    pub dry_run: bool,
    /// Copy each file to `<file>.bak` before overwriting it.
    pub backup: bool,
}

#[derive(Debug)]
pub enum TargetStatus {
    Filtered {
        removed: usize,
        kept: usize,
        written: bool,
    },
    /// The file does not exist and is optional.
    Skipped,
    /// The reference has no rows for this target.
    NothingToFilter,
    Failed(DedupError),
}

#[derive(Debug)]
pub struct TargetReport {
    pub name: String,
    pub path: PathBuf,
    pub status: TargetStatus,
}

#[derive(Debug)]
pub struct RunReport {
    pub reference: PathBuf,
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    pub fn total_removed(&self) -> usize {
        self.targets
            .iter()
            .map(|target| match target.status {
                TargetStatus::Filtered { removed, .. } => removed,
                _ => 0,
            })
            .sum()
    }

    /// The error that stopped the run, if any.
    pub fn failure(&self) -> Option<(&TargetReport, &DedupError)> {
        self.targets.iter().find_map(|target| match &target.status {
            TargetStatus::Failed(error) => Some((target, error)),
            _ => None,
        })
    }
}

/// Filters every configured target against the comprobante, in order.
pub struct Deduplicator {
    reference: ReferenceSpec,
    targets: Vec<TargetSpec>,
    options: RunOptions,
}

impl Deduplicator {
    pub fn new(reference: ReferenceSpec, targets: Vec<TargetSpec>) -> Self {
        Deduplicator {
            reference,
            targets,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Loads the reference once and processes each target.
    ///
    /// A missing optional target is skipped. Any other failure is recorded on its target
    /// and stops the run; targets before it keep their result.
    pub fn run(&self) -> Result<RunReport, DedupError> {
        let reference_path = self.reference.locate()?.to_owned();
        let reference = self.reference.load()?;
        tracing::info!(
            "loaded {} reference rows from {}",
            reference.len(),
            reference_path.display()
        );

        let mut report = RunReport {
            reference: reference_path,
            targets: Vec::with_capacity(self.targets.len()),
        };
        for target in &self.targets {
            let status = self
                .process_target(&reference, target)
                .unwrap_or_else(TargetStatus::Failed);
            let failed = matches!(status, TargetStatus::Failed(_));
            report.targets.push(TargetReport {
                name: target.name.clone(),
                path: target.path.clone(),
                status,
            });
            if failed {
                break;
            }
        }
        Ok(report)
    }

    fn process_target(
        &self,
        reference: &Table,
        target: &TargetSpec,
    ) -> Result<TargetStatus, DedupError> {
        if !target.path.exists() {
            if target.optional {
                tracing::warn!(
                    "{} not found, skipping '{}'",
                    target.path.display(),
                    target.name
                );
                return Ok(TargetStatus::Skipped);
            }
            return Err(DedupError::MissingFile {
                path: target.path.clone(),
            });
        }

        let table = match read_table(&target.path, 0) {
            Ok(table) => table,
            Err(SheetError::MissingHeader { .. }) => {
                tracing::info!("{} is empty", target.path.display());
                return Ok(TargetStatus::Filtered {
                    removed: 0,
                    kept: 0,
                    written: false,
                });
            }
            Err(error) => return Err(error.into()),
        };
        target.rule.check_target(&table)?;
        let reference = match (&self.reference.account_column, &target.account) {
            (Some(account_column), Some(account)) => {
                Cow::Owned(scope_to_account(reference, account_column, account)?)
            }
            _ => Cow::Borrowed(reference),
        };
        let keys = ReferenceKeys::build(&target.rule, &reference)?;
        tracing::debug!("{} reference keys for '{}'", keys.len(), target.name);
        if keys.is_empty() {
            tracing::info!("no reference rows for '{}'", target.name);
            return Ok(TargetStatus::NothingToFilter);
        }

        let Filtered {
            table: filtered,
            removed,
        } = keys.filter(&table)?;
        let written = removed > 0 && !self.options.dry_run;
        if written {
            if self.options.backup {
                backup(&target.path)?;
            }
            write_table(&target.path, &filtered)?;
        }
        tracing::info!(
            "{}: removed {removed} of {} rows",
            target.path.display(),
            table.len()
        );
        Ok(TargetStatus::Filtered {
            removed,
            kept: filtered.len(),
            written,
        })
    }
}

fn backup(path: &Path) -> Result<PathBuf, SheetError> {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".bak");
    let backup = PathBuf::from(backup);
    std::fs::copy(path, &backup).map_err(|source| SheetError::Io {
        path: backup.clone(),
        source,
    })?;
    Ok(backup)
}
