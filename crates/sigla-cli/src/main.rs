mod display;
mod pipeline;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use sigla_core::{Environment, PipelineConfig, VerificationWindow, parse_spreadsheet_ids};
use sigla_qa::QaRunner;
use sigla_store::MemoryStore;
use sigla_sync::http::DEFAULT_BASE_URL;
use sigla_sync::{MemoryReader, RetryPolicy, SheetReader, SheetsClient, spreadsheet_ids_from_master};
use tracing::info;

#[derive(Parser)]
#[command(name = "sigla", version, about = "Extract, load and check SIGLA spreadsheets")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    source: SourceArgs,

    /// JSON file with pipeline settings (max_workers, quota_wait_secs, quota_max_attempts).
    #[arg(long, env = "SIGLA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Args)]
struct SourceArgs {
    /// Read spreadsheets from a directory of JSON snapshots instead of the sheet service.
    #[arg(long, env = "SIGLA_SNAPSHOTS", global = true)]
    snapshots: Option<PathBuf>,

    #[arg(long, env = "SIGLA_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Bearer token for the sheet service.
    #[arg(long, env = "SIGLA_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Comma-separated spreadsheet ids.
    #[arg(long, env = "SIGLA_SPREADSHEET_IDS", global = true)]
    spreadsheet_ids: Option<String>,

    /// Master spreadsheet whose first sheet lists the spreadsheet ids.
    #[arg(long, env = "SIGLA_MASTER", global = true, conflicts_with = "spreadsheet_ids")]
    master: Option<String>,
}

#[derive(Args)]
struct StoreArgs {
    /// Which document store to use.
    #[arg(long = "env", env = "SIGLA_ENV")]
    environment: Environment,

    /// Directory holding the document store files.
    #[arg(long, env = "SIGLA_STORE_DIR", default_value = ".")]
    store_dir: PathBuf,
}

impl StoreArgs {
    fn open(&self) -> anyhow::Result<MemoryStore> {
        let path = self.store_dir.join(format!("sigla-{}.json", self.environment));
        MemoryStore::open_persistent(&path)
            .with_context(|| format!("opening document store {}", path.display()))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Extract records and print them as JSON.
    Extract {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Replace the stored documents of each spreadsheet with its records.
    Load {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Compare spreadsheets with the document store.
    Qa {
        #[command(flatten)]
        store: StoreArgs,

        /// Write comparison, error and failure CSVs here.
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
    /// List verification dates due in a window.
    Due {
        /// First day of the window, YYYY-MM-DD.
        #[arg(long)]
        start: String,

        /// Last day of the window, YYYY-MM-DD.
        #[arg(long)]
        end: String,

        /// Write a tab-separated table here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(PipelineConfig::from_json(&text)?)
}

fn open_reader(source: &SourceArgs) -> anyhow::Result<Box<dyn SheetReader>> {
    match &source.snapshots {
        Some(dir) => {
            let reader = MemoryReader::from_dir(dir)
                .with_context(|| format!("loading snapshots from {}", dir.display()))?;
            Ok(Box::new(reader))
        }
        None => {
            let mut client = SheetsClient::new(source.base_url.clone());
            if let Some(token) = &source.token {
                client = client.with_token(token);
            }
            Ok(Box::new(client))
        }
    }
}

async fn spreadsheet_ids(
    source: &SourceArgs,
    reader: &dyn SheetReader,
    config: &PipelineConfig,
) -> anyhow::Result<Vec<String>> {
    if let Some(raw) = &source.spreadsheet_ids {
        return Ok(parse_spreadsheet_ids(raw)?);
    }
    if let Some(master) = &source.master {
        let ids = spreadsheet_ids_from_master(reader, &RetryPolicy::from(config), master)
            .await
            .with_context(|| format!("reading master spreadsheet {master}"))?;
        return Ok(ids);
    }
    bail!("no spreadsheets given: pass --spreadsheet-ids or --master")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    info!("sigla v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config.as_deref())?;
    let reader = open_reader(&cli.source)?;
    let reader = reader.as_ref();

    match &cli.command {
        Command::Extract { output } => {
            let ids = spreadsheet_ids(&cli.source, reader, &config).await?;
            let mut records = Vec::new();
            for id in &ids {
                let extract = pipeline::extract_spreadsheet(reader, &config, id).await?;
                for failure in &extract.failures {
                    eprintln!("  {} / {}: {}", extract.title, failure.sheet_title, failure.error);
                }
                records.extend(extract.records);
            }
            match output {
                Some(path) => {
                    let file = File::create(path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    serde_json::to_writer_pretty(BufWriter::new(file), &records)?;
                    eprintln!("  Wrote {} records to {}", records.len(), path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&records)?),
            }
        }
        Command::Load { store } => {
            let ids = spreadsheet_ids(&cli.source, reader, &config).await?;
            let store = store.open()?;
            let stats = pipeline::run_load(reader, &store, &config, &ids).await?;
            display::print_load_stats(&stats);
        }
        Command::Qa { store, report_dir } => {
            let ids = spreadsheet_ids(&cli.source, reader, &config).await?;
            let store = store.open()?;
            let runner = QaRunner::new(reader, &store, &config);
            let mut with_errors = 0;
            for id in &ids {
                let report = runner
                    .run(id)
                    .await
                    .with_context(|| format!("checking spreadsheet {id}"))?;
                display::print_qa_report(&report);
                if let Some(dir) = report_dir {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                    for (suffix, table) in [
                        ("comparison", report.table()),
                        ("errors", report.error_table()),
                        ("failures", report.failure_table()),
                    ] {
                        let path = dir.join(format!("{id}-{suffix}.csv"));
                        let file = File::create(&path)
                            .with_context(|| format!("creating {}", path.display()))?;
                        table.write_csv(BufWriter::new(file))?;
                    }
                }
                if report.has_error() {
                    with_errors += 1;
                }
            }
            if with_errors > 0 {
                bail!("{with_errors} of {} spreadsheets disagree with the store", ids.len());
            }
        }
        Command::Due { start, end, output } => {
            let window = VerificationWindow::parse(start, end)?;
            let ids = spreadsheet_ids(&cli.source, reader, &config).await?;
            let due = pipeline::due_dates(reader, &config, &ids, &window).await?;
            display::print_due(&due);
            if let Some(path) = output {
                let file = File::create(path)
                    .with_context(|| format!("creating {}", path.display()))?;
                display::due_table(&due).write_delimited(BufWriter::new(file), b'\t')?;
            }
        }
    }
    Ok(())
}
