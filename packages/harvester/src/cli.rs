//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgGroup, Parser, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{validate_date, HarvestConfig};
use crate::date::DateSpec;
use crate::error::{HarvesterError, Result};
use crate::output::FileOutputWriter;
use crate::pipeline::{HarvestPipeline, HarvestReport, Stage};
use crate::serialize::OutputFormat;
use crate::sources::{AuthoritySource, SourceAdapter};
use crate::state::FileRunStateStore;
use crate::types::SourceName;

/// Authority Harvester - Harvest MARC authority records from DAI and LoC registries.
#[derive(Debug, Parser)]
#[command(name = "authority-harvester")]
#[command(version, about, long_about = None)]
#[command(group(ArgGroup::new("since").args(["date", "offset", "resume", "full"]).multiple(false)))]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = FormatArg::Marc)]
    pub format: FormatArg,

    /// Registry to harvest
    #[arg(short, long, visible_alias = "sources", value_enum, default_value_t = SourceArg::All)]
    pub source: SourceArg,

    /// Output directory (default: ./output/<today>/)
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Harvest everything changed since a date (YYYY-MM-DD)
    #[arg(short, long)]
    pub date: Option<String>,

    /// Harvest everything changed in the last N days
    #[arg(short, long, allow_negative_numbers = true)]
    pub offset: Option<i64>,

    /// Continue from the last successful run in the output directory
    #[arg(short = 'c', long = "continue")]
    pub resume: bool,

    /// Harvest every record regardless of change date
    #[arg(long)]
    pub full: bool,

    /// Log progress (info level) unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Marc,
    Marcxml,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Marc => Self::Marc,
            FormatArg::Marcxml => Self::MarcXml,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Gazetteer,
    Loc,
    Thesauri,
    All,
}

impl SourceArg {
    #[must_use]
    pub fn sources(&self) -> Vec<SourceName> {
        match self {
            Self::Gazetteer => vec![SourceName::Gazetteer],
            Self::Loc => vec![SourceName::Loc],
            Self::Thesauri => vec![SourceName::Thesauri],
            Self::All => SourceName::ALL.to_vec(),
        }
    }
}

impl Cli {
    /// The date selection; exactly one mode must be given.
    pub fn date_spec(&self) -> Result<DateSpec> {
        DateSpec::from_options(self.date.clone(), self.offset, self.resume, self.full)
    }

    /// Target directory, defaulting to `./output/<today>/`.
    #[must_use]
    pub fn target_dir(&self) -> PathBuf {
        self.target.clone().unwrap_or_else(|| {
            Path::new("output").join(chrono::Local::now().format("%Y-%m-%d").to_string())
        })
    }
}

/// Run the CLI.
pub fn run(cli: Cli) -> Result<()> {
    // Validate inputs before making HTTP requests
    let spec = cli.date_spec()?;
    if let DateSpec::Date(date) = &spec {
        validate_date(date.trim())?;
    }
    let target = cli.target_dir();
    if target.exists() && !target.is_dir() {
        return Err(HarvesterError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Output path is not a directory: {}", target.display()),
        )));
    }

    harvest_command(&spec, cli.source.sources(), cli.format.into(), &target)
}

/// Execute a harvest.
fn harvest_command(
    spec: &DateSpec,
    names: Vec<SourceName>,
    format: OutputFormat,
    target: &Path,
) -> Result<()> {
    let config = HarvestConfig::from_env();
    let adapters = SourceAdapter::over_http(&names, &config)?;
    let sources: Vec<&dyn AuthoritySource> =
        adapters.iter().map(|a| a as &dyn AuthoritySource).collect();

    let store = FileRunStateStore::in_dir(target);
    let writer = FileOutputWriter::new(target);

    let names: Vec<&str> = names.iter().map(SourceName::as_str).collect();
    println!(
        "{} {} as {} into {}",
        style("Harvesting").bold(),
        style(names.join(", ")).cyan(),
        style(format).green(),
        target.display()
    );
    println!();

    // Create progress spinner
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = {
        let spinner = &pb;
        let mut pipeline =
            HarvestPipeline::new(&store, &writer, format).with_observer(move |stage, detail| {
                match (stage, detail) {
                    (Stage::Fetching, source) if !source.is_empty() => {
                        spinner.set_message(format!("Fetching {source}..."));
                    }
                    (Stage::Serializing, _) => spinner.set_message("Serializing records..."),
                    (Stage::Writing, _) => spinner.set_message("Writing output..."),
                    _ => {}
                }
            });
        pipeline.run(spec, &sources)
    };
    pb.finish_and_clear();

    let report = result?;
    print_report(&report, store.path());
    Ok(())
}

fn print_report(report: &HarvestReport, state_path: &Path) {
    println!("  Cutoff: {}", style(report.cutoff).green());
    for document in &report.documents {
        println!(
            "  {}: {} records",
            document.source,
            style(document.record_count).bold()
        );
    }
    if !report.warnings.is_empty() {
        println!("  Warnings: {}", style(report.warnings.len()).yellow().bold());
        for warning in &report.warnings {
            println!("    {}", style(warning).yellow());
        }
    }

    println!();
    for document in &report.documents {
        println!(
            "{} {}",
            style("Saved to:").green().bold(),
            document.path.display()
        );
    }
    println!(
        "{} {} in {}",
        style("Next run continues from").dim(),
        report.recorded,
        state_path.display()
    );
}
