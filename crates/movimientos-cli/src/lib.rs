mod config;
mod show;

use std::io::IsTerminal as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args as ClapArgs, CommandFactory as _, Parser, Subcommand};
use movimientos::convert::{self, ConversionReport, ConvertError};
use movimientos::{Decimal, Deduplicator, RunOptions};

use config::{Config, Settings};

#[derive(Parser)]
#[command(
    name = "movimientos",
    about = "Convert bank exports for Zetacuentas and drop movements it already recorded"
)]
#[command(disable_help_subcommand = true)]
struct Args {
    /// Directory holding the spreadsheets
    #[arg(short = 'C', long, default_value = ".")]
    dir: PathBuf,

    /// Config file. Defaults to movimientos.toml or .movimientos.toml inside the directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove movements already present in the comprobante (default)
    Dedup(DedupArgs),
    /// Convert the Itaú card export movimientos.csv
    Card(ConvertArgs),
    /// Convert the BROU account detail Detalle_Movimiento_Cuenta.xls
    Brou(ConvertArgs),
    /// Convert the Itaú account statements Estado_De_Cuenta*.xls
    Itau(ConvertArgs),
}

#[derive(ClapArgs, Default)]
struct DedupArgs {
    /// Report what would be removed without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Copy each file to <file>.bak before overwriting it
    #[arg(long)]
    backup: bool,
}

#[derive(ClapArgs)]
struct ConvertArgs {
    /// USD/UYU quote stored on dollar movements
    #[arg(long)]
    usd_rate: Option<Decimal>,
}

pub fn run(args: impl IntoIterator<Item = String>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "movimientos=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    clap_complete::CompleteEnv::with_factory(Args::command).complete();

    let args = Args::parse_from(args);
    let settings = load_settings(&args)?;
    let color = std::io::stdout().is_terminal();

    match args.command.unwrap_or(Commands::Dedup(DedupArgs::default())) {
        Commands::Dedup(dedup) => run_dedup(&args.dir, settings, &dedup, color),
        Commands::Card(options) => run_convert(
            convert::convert_card,
            "card",
            &args.dir,
            options.usd_rate.or(settings.usd_rate),
            color,
        ),
        Commands::Brou(options) => run_convert(
            convert::convert_brou,
            "BROU",
            &args.dir,
            options.usd_rate.or(settings.usd_rate),
            color,
        ),
        Commands::Itau(options) => run_convert(
            convert::convert_itau,
            "Itaú",
            &args.dir,
            options.usd_rate.or(settings.usd_rate),
            color,
        ),
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let config = match &args.config {
        Some(path) => Some(Config::load_from_file(path)?),
        None => Config::find_and_load(&args.dir)?,
    };
    match config {
        Some((base_dir, config)) => {
            tracing::debug!("using configuration from {}", base_dir.display());
            config.into_settings(&base_dir)
        }
        None => Ok(Settings::defaults(&args.dir)),
    }
}

fn run_dedup(dir: &Path, settings: Settings, args: &DedupArgs, color: bool) -> Result<()> {
    let report = Deduplicator::new(settings.reference, settings.targets)
        .with_options(RunOptions {
            dry_run: args.dry_run,
            backup: args.backup,
        })
        .run()
        .context("Failed to load the comprobante")?;

    print!(
        "{}",
        show::format_run_report(&report, dir, args.dry_run, color)
    );

    if let Some((target, error)) = report.failure() {
        anyhow::bail!("Failed to process {}: {error}", target.path.display());
    }
    Ok(())
}

fn run_convert(
    converter: fn(&Path, Option<Decimal>) -> Result<ConversionReport, ConvertError>,
    source: &str,
    dir: &Path,
    usd_rate: Option<Decimal>,
    color: bool,
) -> Result<()> {
    let report = converter(dir, usd_rate)
        .with_context(|| format!("Failed to convert the {source} export"))?;
    print!(
        "{}",
        show::format_conversion_report(&report, source, dir, color)
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use movimientos::{MatchRule, TargetSpec};

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("movimientos").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn dedup_is_the_default_command() {
        let args = parse(&[]);
        assert!(args.command.is_none());
        assert_eq!(args.dir, PathBuf::from("."));
    }

    #[test]
    fn dedup_flags() {
        let args = parse(&["-C", "banco", "dedup", "--dry-run", "--backup"]);
        assert_eq!(args.dir, PathBuf::from("banco"));
        let Some(Commands::Dedup(dedup)) = args.command else {
            panic!("expected dedup");
        };
        assert!(dedup.dry_run && dedup.backup);
    }

    #[test]
    fn converter_quote() {
        let args = parse(&["brou", "--usd-rate", "39.85"]);
        let Some(Commands::Brou(options)) = args.command else {
            panic!("expected brou");
        };
        assert_eq!(options.usd_rate, Some(Decimal::new(3985, 2)));

        assert!(Args::try_parse_from(["movimientos", "card", "--usd-rate", "abc"]).is_err());
    }

    #[test]
    fn settings_from_directory_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("movimientos.toml"),
            "usd_rate = 41.0\n\n[reference]\nfiles = [\"zeta.xlsx\"]\n",
        )
        .unwrap();

        let args = parse(&["-C", dir.path().to_str().unwrap()]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.reference.candidates, [dir.path().join("zeta.xlsx")]);
        assert_eq!(settings.reference.account_column.as_deref(), Some("Cuenta"));
        assert_eq!(settings.targets.len(), 4);
        assert_eq!(settings.usd_rate, Some(Decimal::new(41, 0)));
    }

    const COMPROBANTE: &str = "Fecha,Descripción,Cuenta,Importe\n\
        02/01/2025,UBER,Crédito Itaú $,-350\n\
        04/01/2025,COMPRA POS,Débito BROU $,-250\n";

    fn dedup_dir() -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("comprobante.csv"), COMPROBANTE).unwrap();
        std::fs::write(
            dir.path().join("tarjeta.csv"),
            "Fecha,Descripcion\n02/01/2025,UBER\n03/01/2025,AMAZON\n",
        )
        .unwrap();

        let mut settings = Settings::defaults(dir.path());
        settings.reference.candidates = vec![dir.path().join("comprobante.csv")];
        settings.reference.header_row = 0;
        let rule = MatchRule::column("Descripcion", "Descripción");
        settings.targets = vec![
            TargetSpec::new("Crédito Itaú $", dir.path().join("tarjeta.csv"), rule.clone())
                .account("Crédito Itaú $"),
            TargetSpec::new("Débito BROU $", dir.path().join("brou.csv"), rule)
                .account("Débito BROU $"),
        ];
        (dir, settings)
    }

    #[test]
    fn dedup_fails_when_a_target_fails() {
        let (dir, settings) = dedup_dir();
        let brou = dir.path().join("brou.csv");
        std::fs::write(&brou, "Fecha,Detalle\n04/01/2025,COMPRA POS\n").unwrap();

        let error = run_dedup(dir.path(), settings, &DedupArgs::default(), false).unwrap_err();
        assert_eq!(
            error.to_string(),
            format!(
                "Failed to process {0}: column 'Descripcion' not found in {0}",
                brou.display()
            )
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tarjeta.csv")).unwrap(),
            "Fecha,Descripcion\n03/01/2025,AMAZON\n"
        );
    }

    #[test]
    fn dedup_succeeds_with_skipped_targets() {
        let (dir, settings) = dedup_dir();

        run_dedup(dir.path(), settings, &DedupArgs::default(), false).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("tarjeta.csv")).unwrap(),
            "Fecha,Descripcion\n03/01/2025,AMAZON\n"
        );
        assert!(!dir.path().join("brou.csv").exists());
    }
}
