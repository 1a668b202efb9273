//! Uplink CLI — trigger and inspect retail observation uploads.
//!
//! One upload cycle reads today's records from the configured database
//! (or a spreadsheet export), validates them, and submits them to the
//! collection API. Exit codes distinguish each failure stage: 0 success,
//! 2 auth, 3 fetch, 4 validation, 5 no-data, 6 upload, 7 run already in
//! progress, 1 anything before the pipeline starts.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use uplink_api_client::{ReportApi, ReportClient};
use uplink_cli::{init_tracing, to_pretty_json};
use uplink_core::{
    validate_batch, Config, HistoryStore, MappingStore, RetailRecord, RunSource,
};
use uplink_pipeline::{
    run_every, DataSource, DatabaseSource, SpreadsheetSource, UploadOrchestrator,
};

#[derive(Parser)]
#[command(name = "uplink", about = "Retail observation reporting CLI")]
struct Cli {
    /// Connection and API configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,
    /// Saved field mapping store
    #[arg(long, global = true, default_value = "mapping_history.json")]
    mappings: PathBuf,
    /// Run history file
    #[arg(long, global = true, default_value = "upload_history.json")]
    history: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one upload cycle from the configured database
    Run {
        /// Field mapping to extract with
        #[arg(long, default_value = "default")]
        mapping: String,
        /// Tag the run as scheduler-triggered in history
        #[arg(long)]
        scheduled: bool,
    },
    /// Import a spreadsheet export and upload it
    Import {
        /// CSV file exported from the reporting template
        file: PathBuf,
        /// Custom header mapping to rename columns with
        #[arg(long)]
        mapping: Option<String>,
        /// Validate and print the batch without uploading
        #[arg(long)]
        dry_run: bool,
    },
    /// Verify database and API connectivity without uploading
    Check,
    /// Run upload cycles on a fixed interval until interrupted
    Schedule {
        /// Minutes between cycles
        #[arg(long, default_value = "60")]
        every: u64,
        /// Field mapping to extract with
        #[arg(long, default_value = "default")]
        mapping: String,
    },
    /// Show recent run history entries
    History {
        /// Maximum number of entries
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Manage saved field mappings
    Mapping {
        #[command(subcommand)]
        sub: MappingCommands,
    },
}

#[derive(Subcommand)]
enum MappingCommands {
    /// List available mapping names
    List,
    /// Save a mapping definition (JSON file) under its name
    Save {
        /// JSON file with {name, table, id_column, fields}
        file: PathBuf,
    },
    /// Print one mapping as JSON
    Show {
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Check a mapping against the API schema
    Validate {
        #[arg(long, default_value = "default")]
        name: String,
    },
    /// Delete a saved mapping
    Delete {
        #[arg(long)]
        name: String,
    },
}

fn report_outcome(outcome: &uplink_pipeline::RunOutcome) -> ExitCode {
    if outcome.succeeded() {
        println!("{}", outcome.message());
    } else {
        eprintln!("{}", outcome.message());
    }
    ExitCode::from(outcome.exit_code())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mappings = MappingStore::new(&cli.mappings);
    let history = HistoryStore::new(&cli.history);

    match cli.command {
        Commands::Run { mapping, scheduled } => {
            let config = Config::load(&cli.config)?;
            let mapping = mappings.load(&mapping)?;
            let tag = if scheduled {
                RunSource::Scheduled
            } else {
                RunSource::Manual
            };
            let source = DatabaseSource::new(config.database.clone(), mapping, tag);
            let orchestrator = UploadOrchestrator::new(history);
            let mut client = ReportClient::new(&config.api)?;
            let outcome = orchestrator.run_once(&mut client, &source, &config.api).await;
            Ok(report_outcome(&outcome))
        }
        Commands::Import {
            file,
            mapping,
            dry_run,
        } => {
            let custom = mapping.map(|name| mappings.load(&name)).transpose()?;
            let source = SpreadsheetSource::new(&file, custom);

            if dry_run {
                let records = source.fetch().await?;
                let failures = validate_batch(&records);
                if !failures.is_empty() {
                    for failure in &failures {
                        eprintln!("{}", failure);
                    }
                    eprintln!("{} record(s) failed validation", failures.len());
                    return Ok(ExitCode::from(4));
                }
                if records.is_empty() {
                    eprintln!("no records found in {}", file.display());
                    return Ok(ExitCode::from(5));
                }
                let batch: Vec<RetailRecord> = records
                    .iter()
                    .map(RetailRecord::from_raw)
                    .collect::<Result<_, _>>()
                    .map_err(anyhow::Error::msg)?;
                println!("{}", to_pretty_json(&batch)?);
                println!("{} record(s) ready to upload", batch.len());
                return Ok(ExitCode::SUCCESS);
            }

            let config = Config::load(&cli.config)?;
            let orchestrator = UploadOrchestrator::new(history);
            let mut client = ReportClient::new(&config.api)?;
            let outcome = orchestrator.run_once(&mut client, &source, &config.api).await;
            Ok(report_outcome(&outcome))
        }
        Commands::Check => {
            let config = Config::load(&cli.config)?;

            uplink_db::probe(&config.database)
                .await
                .context("database connectivity check failed")?;
            println!(
                "database OK ({} at {}:{})",
                config.database.dialect,
                config.database.host,
                config.database.resolved_port()
            );

            let mut client = ReportClient::new(&config.api)?;
            client
                .login(&config.api.username, &config.api.password)
                .await
                .context("API login check failed")?;
            println!("API OK ({})", config.api.base_url());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schedule { every, mapping } => {
            anyhow::ensure!(every > 0, "--every must be at least 1 minute");
            let config = Config::load(&cli.config)?;
            let mapping = mappings.load(&mapping)?;
            let source = DatabaseSource::new(
                config.database.clone(),
                mapping,
                RunSource::Scheduled,
            );
            let orchestrator = UploadOrchestrator::new(history);
            run_every(
                &orchestrator,
                &config.api,
                &source,
                Duration::from_secs(every * 60),
            )
            .await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::History { limit } => {
            println!("{}", to_pretty_json(&history.recent(limit))?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Mapping { sub } => match sub {
            MappingCommands::List => {
                for name in mappings.list()? {
                    println!("{}", name);
                }
                Ok(ExitCode::SUCCESS)
            }
            MappingCommands::Save { file } => {
                let bytes = std::fs::read(&file)
                    .with_context(|| format!("cannot read {}", file.display()))?;
                let mapping: uplink_core::FieldMapping = serde_json::from_slice(&bytes)
                    .with_context(|| format!("cannot parse {}", file.display()))?;
                mappings.save(&mapping)?;
                println!("mapping '{}' saved", mapping.name);
                Ok(ExitCode::SUCCESS)
            }
            MappingCommands::Show { name } => {
                let mapping = mappings.load(&name)?;
                println!("{}", to_pretty_json(&mapping)?);
                Ok(ExitCode::SUCCESS)
            }
            MappingCommands::Validate { name } => {
                let mapping = mappings.load(&name)?;
                let problems = mapping.validate();
                if problems.is_empty() {
                    println!("mapping '{}' is valid", name);
                    Ok(ExitCode::SUCCESS)
                } else {
                    for problem in &problems {
                        eprintln!("{}", problem);
                    }
                    Ok(ExitCode::FAILURE)
                }
            }
            MappingCommands::Delete { name } => {
                mappings.delete(&name)?;
                println!("mapping '{}' deleted", name);
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
