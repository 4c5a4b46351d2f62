use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use qadoc_templates::{MergePolicy, TemplateEngine, TemplateKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RowsFormat {
    Json,
    Csv,
}

#[derive(Debug, Parser)]
#[command(
    name = "qadoc-fill",
    about = "Fill QA document spreadsheet templates (feature lists, test cases, defect reports) from CSV."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Write CSV rows into a template workbook.
    Populate {
        /// Template type: feature-list, testcase-generation, defect-report or security-report.
        #[arg(long, value_parser = parse_template)]
        template: TemplateKind,

        /// Template workbook to fill.
        workbook: PathBuf,

        /// CSV input (`-` reads stdin).
        #[arg(long, value_name = "PATH")]
        csv: PathBuf,

        /// Where to write the filled workbook.
        #[arg(long, short)]
        output: PathBuf,

        /// Project overview text (feature lists only).
        #[arg(long)]
        overview: Option<String>,

        /// Read the project overview text from a file.
        #[arg(long, value_name = "PATH", conflicts_with = "overview")]
        overview_file: Option<PathBuf>,

        /// Merge consecutive blank hierarchy cells too.
        #[arg(long)]
        merge_blank: bool,
    },

    /// Print the data rows of a filled template.
    Rows {
        #[arg(long, value_parser = parse_template)]
        template: TemplateKind,

        workbook: PathBuf,

        #[arg(long, value_enum, default_value_t = RowsFormat::Json)]
        format: RowsFormat,
    },

    /// Print the project overview text of a feature list.
    Overview { workbook: PathBuf },
}

fn parse_template(input: &str) -> std::result::Result<TemplateKind, String> {
    input.parse().map_err(|err: qadoc_templates::TemplateError| err.to_string())
}

pub fn run() -> Result<()> {
    run_with_args(Args::parse())
}

pub fn run_with_args(args: Args) -> Result<()> {
    let engine = TemplateEngine::new()?;

    match args.command {
        Command::Populate {
            template,
            workbook,
            csv,
            output,
            overview,
            overview_file,
            merge_blank,
        } => {
            let engine = engine.with_merge_policy(MergePolicy {
                merge_blank_values: merge_blank,
            });
            let bytes = read_file(&workbook)?;
            let csv_text = read_text(&csv)?;
            let overview = match (overview, overview_file) {
                (Some(text), _) => Some(text),
                (None, Some(path)) => Some(read_text(&path)?),
                (None, None) => None,
            };

            let filled = engine
                .populate(template, &bytes, &csv_text, overview.as_deref())
                .with_context(|| format!("populate {template} template {}", workbook.display()))?;
            std::fs::write(&output, filled)
                .with_context(|| format!("write {}", output.display()))?;
            log::info!("wrote {}", output.display());
            Ok(())
        }
        Command::Rows {
            template,
            workbook,
            format,
        } => {
            let bytes = read_file(&workbook)?;
            let parsed = engine
                .parse_rows(template, &bytes)
                .with_context(|| format!("read {template} rows from {}", workbook.display()))?;

            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            match format {
                RowsFormat::Json => {
                    serde_json::to_writer_pretty(&mut handle, &parsed)?;
                    handle.write_all(b"\n")?;
                }
                RowsFormat::Csv => {
                    let csv = engine.build_csv(template, &parsed.records)?;
                    handle.write_all(csv.as_bytes())?;
                }
            }
            Ok(())
        }
        Command::Overview { workbook } => {
            let bytes = read_file(&workbook)?;
            let overview = engine
                .extract_overview(&bytes)
                .with_context(|| format!("read overview from {}", workbook.display()))?;
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(overview.as_bytes())?;
            handle.write_all(b"\n")?;
            Ok(())
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

/// UTF-8 text from `path`, or from stdin for `-`.
fn read_text(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("read stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}
