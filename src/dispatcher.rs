//! Command dispatcher that routes parsed clap commands to their handlers.
//!
//! Every handler receives a `Context` built once from the global flags, so
//! settings, the format registry and the ingest options are constructed in
//! one place.

mod analyze;
mod inspect;
mod process;

use anyhow::{Context as _, Result};
use std::path::Path;
use tracing::info;

use crate::cli::{Cli, Commands};
use crate::config::Settings;
use crate::importers::{FormatRegistry, IngestOptions};
use crate::timeseries::{ingest_workbook, IngestReport};
use crate::workbook::Workbook;

/// Everything a handler needs besides its own arguments
pub struct Context {
    pub settings: Settings,
    pub options: IngestOptions,
    pub registry: FormatRegistry,
    pub json: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let settings = Settings::load(cli.config.as_deref())?;
        let mut options = IngestOptions::new(settings.ingest.clone());
        if let Some(as_of) = cli.as_of {
            options = options.with_as_of(as_of);
        }
        Ok(Self {
            settings,
            options,
            registry: FormatRegistry::with_builtin(),
            json: cli.json,
        })
    }

    pub fn open_workbook(&self, file: &Path) -> Result<Workbook> {
        Workbook::open(file).with_context(|| format!("Failed to open workbook {}", file.display()))
    }

    /// Open, detect, extract and assemble
    pub fn ingest(&self, file: &Path, format: Option<&str>, sheet: Option<&str>) -> Result<IngestReport> {
        let workbook = self.open_workbook(file)?;
        info!("Processing {}", file.display());
        ingest_workbook(&self.registry, &workbook, format, sheet, &self.options)
            .with_context(|| format!("Failed to process {}", file.display()))
    }
}

/// Route a parsed command to its handler
pub fn dispatch(cli: Cli) -> Result<()> {
    let ctx = Context::from_cli(&cli)?;

    match cli.command {
        Commands::Formats => inspect::dispatch_formats(&ctx),
        Commands::Inspect { file } => inspect::dispatch_inspect(&ctx, &file),
        Commands::Process {
            file,
            format,
            sheet,
            csv,
        } => process::dispatch_process(
            &ctx,
            &file,
            format.as_deref(),
            sheet.as_deref(),
            csv.as_deref(),
        ),
        Commands::Analyze {
            file,
            property,
            period,
            minimal,
            format,
        } => analyze::dispatch_analyze(
            &ctx,
            &file,
            format.as_deref(),
            property.as_deref(),
            period,
            minimal,
        ),
        Commands::Summary {
            file,
            property,
            format,
        } => analyze::dispatch_summary(&ctx, &file, format.as_deref(), property.as_deref()),
    }
}
