use std::fmt::Write as _;
use std::path::Path;

use anstyle::{AnsiColor, Color, Style};
use movimientos::convert::ConversionReport;
use movimientos::{RunReport, TargetStatus};

struct Palette {
    good: Style,
    quiet: Style,
    bad: Style,
    bold: Style,
}

impl Palette {
    fn new(color: bool) -> Self {
        let fg = |color: AnsiColor| Style::new().fg_color(Some(Color::Ansi(color)));
        if color {
            Palette {
                good: fg(AnsiColor::Green),
                quiet: fg(AnsiColor::Yellow),
                bad: fg(AnsiColor::Red),
                bold: Style::new().bold(),
            }
        } else {
            Palette {
                good: Style::new(),
                quiet: Style::new(),
                bad: Style::new(),
                bold: Style::new(),
            }
        }
    }
}

fn relative<'a>(path: &'a Path, dir: &Path) -> &'a Path {
    path.strip_prefix(dir).unwrap_or(path)
}

pub fn format_run_report(report: &RunReport, dir: &Path, dry_run: bool, color: bool) -> String {
    let Palette {
        good,
        quiet,
        bad,
        bold,
    } = Palette::new(color);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Reference: {}",
        relative(&report.reference, dir).display()
    );
    for target in &report.targets {
        let file = relative(&target.path, dir).display();
        let _ = match &target.status {
            TargetStatus::Filtered {
                removed, kept, ..
            } if dry_run => writeln!(
                out,
                "  {good}{file}{good:#}: would remove {removed}, keep {kept}"
            ),
            TargetStatus::Filtered { removed, kept, .. } => {
                writeln!(out, "  {good}{file}{good:#}: removed {removed}, kept {kept}")
            }
            TargetStatus::Skipped => {
                writeln!(out, "  {quiet}{file}{quiet:#}: not found, skipped")
            }
            TargetStatus::NothingToFilter => writeln!(
                out,
                "  {quiet}{file}{quiet:#}: no recorded movements for '{}'",
                target.name
            ),
            TargetStatus::Failed(error) => {
                writeln!(out, "  {bad}{file}{bad:#}: failed: {error}")
            }
        };
    }

    let total = report.total_removed();
    let _ = if dry_run {
        writeln!(out, "{bold}{total} row(s) would be removed{bold:#}")
    } else {
        writeln!(out, "{bold}{total} row(s) removed{bold:#}")
    };
    out
}

pub fn format_conversion_report(
    report: &ConversionReport,
    source: &str,
    dir: &Path,
    color: bool,
) -> String {
    let Palette {
        good, quiet, bold, ..
    } = Palette::new(color);
    let mut out = String::new();

    if report.inputs.is_empty() {
        let _ = writeln!(out, "{quiet}No {source} export found{quiet:#}");
        return out;
    }
    for input in &report.inputs {
        let _ = writeln!(out, "Read {}", relative(input, dir).display());
    }
    for output in &report.outputs {
        let _ = writeln!(
            out,
            "  {good}{}{good:#}: {} movement(s) in {}",
            relative(&output.path, dir).display(),
            output.movements,
            output.currency
        );
    }
    if report.outputs.is_empty() {
        let _ = writeln!(out, "{bold}No movements found{bold:#}");
    }
    out
}
