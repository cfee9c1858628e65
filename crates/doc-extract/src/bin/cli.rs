//! Command-line front end: batch extraction to CSV files and one-shot CSV queries
//!
//! Run with: cargo run -p doc-extract --features cli --bin doc-extract -- --help

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use doc_extract::config::ExtractorConfig;
use doc_extract::export::write_records_csv;
use doc_extract::extraction::{DocumentProgress, ExtractionResults, Extractor, Orchestrator};
use doc_extract::ingestion::SourceDocument;
use doc_extract::providers::{GeminiClient, LlmProvider};
use doc_extract::session::SchemaWorkspace;
use doc_extract::tabular::{DataTable, QueryEngine};
use doc_extract::types::section::MAIN_EXPORT_FILE;

#[derive(Parser)]
#[command(name = "doc-extract")]
#[command(about = "Structured extraction from PDF reports and natural-language CSV filtering")]
struct Cli {
    /// TOML configuration file (defaults to $DOC_EXTRACT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract the configured schema from PDFs into CSV files
    Extract {
        /// PDF files or directories containing PDFs
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Directory receiving the CSV exports
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Also extract the multi-record sections
        #[arg(long)]
        scan_sections: bool,
    },
    /// Filter a CSV file with a natural-language request
    Query {
        /// CSV file to filter
        file: PathBuf,

        /// What to keep, e.g. "rows where Status is Open"
        request: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doc_extract=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var_os("DOC_EXTRACT_CONFIG").map(PathBuf::from));
    let config = match &config_path {
        Some(path) => ExtractorConfig::from_file(path)?,
        None => ExtractorConfig::default(),
    };

    let api_key = config
        .secrets
        .resolve_api_key()
        .context("Cannot run without a Gemini API key (secrets file or GEMINI_API_KEY)")?;
    let llm: Arc<dyn LlmProvider> = Arc::new(GeminiClient::new(&config.llm, api_key)?);

    match cli.command {
        Command::Extract {
            inputs,
            output_dir,
            scan_sections,
        } => extract(&config, llm, &inputs, &output_dir, scan_sections).await,
        Command::Query { file, request } => query(&config, llm, &file, &request).await,
    }
}

/// PDFs named directly or found under the given directories, in path order
fn collect_pdfs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut pdfs: Vec<PathBuf> = inputs
        .iter()
        .flat_map(|input| WalkDir::new(input).follow_links(true))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();
    pdfs.sort();
    pdfs.dedup();
    pdfs
}

fn create_progress_bar(total: u64) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

async fn extract(
    config: &ExtractorConfig,
    llm: Arc<dyn LlmProvider>,
    inputs: &[PathBuf],
    output_dir: &Path,
    scan_sections: bool,
) -> anyhow::Result<()> {
    let paths = collect_pdfs(inputs);
    if paths.is_empty() {
        bail!("Upload PDFs first.");
    }

    let mut documents = Vec::with_capacity(paths.len());
    for path in &paths {
        let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push(SourceDocument::new(filename, data));
    }

    let workspace = SchemaWorkspace::from_config(&config.extraction);
    let plan = workspace.plan(Some(scan_sections || workspace.scan_sections))?;
    let orchestrator = Orchestrator::new(Extractor::new(llm));

    println!(
        "{} Extracting {} column(s) from {} document(s)",
        style("→").cyan(),
        style(plan.main.len()).bold(),
        style(documents.len()).bold()
    );

    let pb = create_progress_bar(documents.len() as u64)?;
    let progress = pb.clone();
    let mut observer = move |step: DocumentProgress<'_>, snapshot: &ExtractionResults| {
        progress.set_position(step.completed as u64);
        progress.set_message(format!("{} ({} rows so far)", step.filename, snapshot.main.len()));
    };
    let results = orchestrator.run(&plan, &documents, &mut observer).await;
    pb.finish_and_clear();

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let main_path = output_dir.join(MAIN_EXPORT_FILE);
    write_records_csv(
        BufWriter::new(File::create(&main_path)?),
        &plan.main.column_names(),
        &results.main,
    )?;
    println!(
        "{} {} ({} rows)",
        style("✓").green(),
        main_path.display(),
        results.main.len()
    );

    for planned in &plan.sections {
        let Some(records) = results.sections.get(&planned.section.key) else {
            continue;
        };
        let path = output_dir.join(&planned.section.file_name);
        write_records_csv(
            BufWriter::new(File::create(&path)?),
            &planned.schema.column_names(),
            records,
        )?;
        println!("{} {} ({} rows)", style("✓").green(), path.display(), records.len());
    }

    for error in &results.errors {
        eprintln!("{} {}", style("!").yellow(), error.message);
    }

    Ok(())
}

async fn query(
    config: &ExtractorConfig,
    llm: Arc<dyn LlmProvider>,
    file: &Path,
    request: &str,
) -> anyhow::Result<()> {
    let reader = File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let table = DataTable::from_csv_reader(reader)?;
    let engine = QueryEngine::new(llm, config.tabular.clone());

    let outcome = engine.filter(&table, request).await;
    let explanation = engine.explain(outcome.expression.as_deref()).await;

    if let Some(expression) = &outcome.expression {
        eprintln!("{} {}", style("Expression:").bold(), expression);
    }
    eprintln!("{} {}", style("Filter Logic:").bold(), explanation);
    if let Some(notice) = &outcome.notice {
        eprintln!("{} {}", style("!").yellow(), notice);
    }
    eprintln!(
        "{} {} of {} rows kept",
        style("→").cyan(),
        outcome.table.len(),
        table.len()
    );

    outcome.table.write_csv(std::io::stdout().lock())?;
    Ok(())
}
