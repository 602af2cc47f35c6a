// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! content-sync operational CLI.
//!
//! JSON results go to stdout; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use content_sync::migration::restore_backup;
use content_sync::{
    Backend, ContentStore, ContentType, IntegrityChecker, MigrationDirection, MigrationError, MigrationOptions,
    MigrationService, RecordKey, RollbackPlan, StorageHealth, SyncConfig, SyncEngine,
};

#[derive(Parser)]
#[command(name = "content-sync")]
#[command(author, version, about = "Dual-storage sync and consistency engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, short, env = "CONTENT_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Backend A connection URL (overrides the config file)
    #[arg(long, env = "CONTENT_SYNC_SQL_URL")]
    sql_url: Option<String>,

    /// Backend B base URL (overrides the config file)
    #[arg(long, env = "CONTENT_SYNC_TABLE_API_URL")]
    table_api_url: Option<String>,

    /// Backend B API key (overrides the config file)
    #[arg(long, env = "CONTENT_SYNC_TABLE_API_KEY", hide_env_values = true)]
    table_api_key: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every record from the source backend through the dual writer
    Migrate {
        /// Validate and assess only; write nothing
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Write attempts per record
        #[arg(long)]
        max_retries: Option<u32>,

        /// Skip the pre-migration snapshot of the target backend
        #[arg(long)]
        no_backup: bool,

        #[arg(long, default_value = "a-to-b")]
        direction: MigrationDirection,

        /// Records in flight per batch
        #[arg(long)]
        concurrency: Option<usize>,

        /// Only migrate this content type (repeatable)
        #[arg(long = "type")]
        content_types: Vec<ContentType>,
    },

    /// Presence and consistency of one record
    Status {
        /// story, scenario, prompt or video_job
        content_type: ContentType,
        id: String,
    },

    /// Key-level integrity check across both backends
    Verify,

    /// Print a rollback plan, and replay it with --execute
    Rollback {
        plan: PathBuf,

        #[arg(long)]
        execute: bool,
    },

    /// Probe both backends and print their health
    Health,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("content_sync=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    let mut config = match cli.config {
        Some(ref path) => SyncConfig::from_toml_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(ref url) = cli.sql_url {
        config.sql_url = Some(url.clone());
    }
    if let Some(ref url) = cli.table_api_url {
        config.table_api_url = Some(url.clone());
    }
    if let Some(ref key) = cli.table_api_key {
        config.table_api_key = Some(key.clone());
    }
    config.validate()?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[derive(Serialize)]
struct HealthCheck {
    backend: Backend,
    enabled: bool,
    records: Option<u64>,
    error: Option<String>,
    health: StorageHealth,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let config = load_config(&cli)?;
    let engine = Arc::new(SyncEngine::connect(config.clone()).await.context("connecting backends")?);

    match cli.command {
        Commands::Migrate {
            dry_run,
            batch_size,
            max_retries,
            no_backup,
            direction,
            concurrency,
            content_types,
        } => {
            let defaults = MigrationOptions::from_config(&config);
            let options = MigrationOptions {
                dry_run: dry_run || defaults.dry_run,
                batch_size: batch_size.unwrap_or(defaults.batch_size),
                max_retries: max_retries.unwrap_or(defaults.max_retries),
                create_backup: defaults.create_backup && !no_backup,
                direction,
                concurrency: concurrency.unwrap_or(defaults.concurrency),
                content_types,
            };

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; stopping after the current batch");
                    let _ = cancel_tx.send(true);
                }
            });

            match MigrationService::new(engine).run_migration_with_cancel(options, cancel_rx).await {
                Ok(report) => {
                    print_json(&report)?;
                    let ok = if report.dry_run {
                        !report.cancelled && report.succeeded + report.skipped >= report.total_records
                    } else {
                        report.is_complete()
                    };
                    Ok(exit_code(ok))
                }
                Err(MigrationError::System { error, report }) => {
                    print_json(&report)?;
                    Err(anyhow!("migration aborted: {} ({})", error.error, error.suggested_action))
                }
                Err(e) => Err(e.into()),
            }
        }

        Commands::Status { content_type, id } => {
            let status = engine.sync_status(&RecordKey::new(content_type, id)).await;
            print_json(&status)?;
            Ok(exit_code(status.quality.is_consistent))
        }

        Commands::Verify => {
            let report = IntegrityChecker::new(engine).verify().await.context("integrity check")?;
            print_json(&report)?;
            Ok(exit_code(report.is_valid))
        }

        Commands::Rollback { plan, execute } => {
            let plan = RollbackPlan::load(&plan).await?;
            print_json(&plan)?;
            if !execute {
                info!("Dry inspection only; pass --execute to restore");
                return Ok(ExitCode::SUCCESS);
            }
            if plan.backends().is_empty() {
                return Err(anyhow!("plan has no restore step"));
            }
            let summary = restore_backup(&plan, &engine).await?;
            print_json(&summary)?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Health => {
            let mut checks = Vec::with_capacity(2);
            for backend in Backend::ALL {
                let Some(store) = engine.store(backend) else {
                    checks.push(HealthCheck {
                        backend,
                        enabled: false,
                        records: None,
                        error: None,
                        health: engine.backend_health(backend),
                    });
                    continue;
                };
                let counted = store.count_all().await;
                engine.health().record_outcome(backend, counted.is_ok());
                let (records, error) = match counted {
                    Ok(n) => (Some(n), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                checks.push(HealthCheck {
                    backend,
                    enabled: true,
                    records,
                    error,
                    health: engine.backend_health(backend),
                });
            }
            print_json(&checks)?;
            Ok(exit_code(checks.iter().all(|p| p.error.is_none())))
        }
    }
}
