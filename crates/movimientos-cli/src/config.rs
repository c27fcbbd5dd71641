use anyhow::{Context, Result};
use movimientos::{Decimal, MatchRule, ReferenceSpec, TargetSpec, default_targets};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILES: [&str; 2] = ["movimientos.toml", ".movimientos.toml"];

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigReference {
    #[serde(default = "default_reference_files")]
    pub files: Vec<PathBuf>,
    #[serde(default = "default_header_row")]
    pub header_row: usize,
    /// An empty name turns account scoping off.
    #[serde(default = "default_account_column")]
    pub account_column: String,
}

fn default_reference_files() -> Vec<PathBuf> {
    ReferenceSpec::default().candidates
}

fn default_header_row() -> usize {
    ReferenceSpec::default().header_row
}

fn default_account_column() -> String {
    ReferenceSpec::default().account_column.unwrap_or_default()
}

#[derive(Debug, Deserialize)]
#[serde(try_from = "RawConfigTarget")]
pub struct ConfigTarget(pub TargetSpec);

#[derive(Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum RawMatch {
    #[default]
    Column,
    Transaction,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfigTarget {
    name: Option<String>,
    file: PathBuf,
    account: Option<String>,
    key_column: Option<String>,
    reference_key_column: Option<String>,
    #[serde(default, rename = "match")]
    rule: RawMatch,
    #[serde(default = "default_optional")]
    optional: bool,
}

fn default_optional() -> bool {
    true
}

impl TryFrom<RawConfigTarget> for ConfigTarget {
    type Error = String;

    fn try_from(raw: RawConfigTarget) -> Result<Self, Self::Error> {
        let file = raw.file.display().to_string();
        let rule = match (raw.rule, raw.key_column, raw.reference_key_column) {
            (RawMatch::Column, Some(column), Some(reference_column)) => {
                MatchRule::column(column, reference_column)
            }
            (RawMatch::Column, _, _) => {
                return Err(format!(
                    "target '{file}' must specify both 'key_column' and 'reference_key_column'"
                ));
            }
            (RawMatch::Transaction, None, None) => MatchRule::Transaction,
            (RawMatch::Transaction, _, _) => {
                return Err(format!(
                    "target '{file}' cannot specify key columns with match = \"transaction\""
                ));
            }
        };
        let name = raw.name.or_else(|| raw.account.clone()).unwrap_or(file);
        Ok(ConfigTarget(TargetSpec {
            name,
            path: raw.file,
            rule,
            account: raw.account,
            optional: raw.optional,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// USD/UYU quote used by the converters.
    pub usd_rate: Option<f64>,
    pub reference: Option<ConfigReference>,
    #[serde(default, rename = "target")]
    pub targets: Vec<ConfigTarget>,
}

/// What a run works on, with every path resolved.
#[derive(Debug, PartialEq)]
pub struct Settings {
    pub reference: ReferenceSpec,
    pub targets: Vec<TargetSpec>,
    pub usd_rate: Option<Decimal>,
}

impl Settings {
    /// Built-in file names inside `dir`.
    pub fn defaults(dir: &Path) -> Self {
        let mut reference = ReferenceSpec::default();
        for candidate in &mut reference.candidates {
            *candidate = dir.join(&*candidate);
        }
        let targets = default_targets()
            .into_iter()
            .map(|target| TargetSpec {
                path: dir.join(&target.path),
                ..target
            })
            .collect();
        Settings {
            reference,
            targets,
            usd_rate: None,
        }
    }
}

impl Config {
    pub fn load_from_file(path: &Path) -> Result<(PathBuf, Self)> {
        let base_dir = path.parent().map(ToOwned::to_owned).unwrap_or_default();

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok((base_dir, config))
    }

    pub fn find_and_load(dir: &Path) -> Result<Option<(PathBuf, Self)>> {
        for name in CONFIG_FILES {
            let location = dir.join(name);
            if location.exists() {
                return Self::load_from_file(&location).map(Some);
            }
        }

        Ok(None)
    }

    /// Resolves relative paths against `base_dir`. Sections left out fall back to the defaults.
    pub fn into_settings(self, base_dir: &Path) -> Result<Settings> {
        let mut settings = Settings::defaults(base_dir);
        if let Some(reference) = self.reference {
            settings.reference = ReferenceSpec {
                candidates: reference
                    .files
                    .iter()
                    .map(|file| base_dir.join(file))
                    .collect(),
                header_row: reference.header_row,
                account_column: Some(reference.account_column)
                    .filter(|column| !column.is_empty()),
            };
        }
        if !self.targets.is_empty() {
            settings.targets = self
                .targets
                .into_iter()
                .map(|ConfigTarget(target)| TargetSpec {
                    path: base_dir.join(&target.path),
                    ..target
                })
                .collect();
        }
        settings.usd_rate = self
            .usd_rate
            .map(|rate| {
                Decimal::try_from(rate).with_context(|| format!("invalid usd_rate: {rate}"))
            })
            .transpose()?;
        Ok(settings)
    }
}
