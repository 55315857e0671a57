mod cli;
mod pipeline;

use anyhow::Context;
use clap::Parser;
use cli::{apply_overrides, Cli, Command, RunArgs, SubscriberAction, DEFAULT_CONFIG_PATH};
use database::Database;
use digest_core::{DigestConfig, ErrorExt};
use distribution::{DeliveryStore, MemoryDeliveryStore, ResendTransport};
use pipeline::{Providers, RecipientSource, RunOptions};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const CRATES: [&str; 8] = [
    "community_digest",
    "digest_core",
    "forum_client",
    "chain_client",
    "insight_engine",
    "newsletter",
    "database",
    "distribution",
];

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.debug);

    let run_args = cli.run_args();
    let mut config = load_config(cli.config.as_deref())?;
    apply_overrides(&mut config, &run_args, cli.database_url.as_deref());
    config.validate().context("invalid configuration")?;

    match cli.command {
        Some(Command::Subscribers { action }) => manage_subscribers(&config, action).await,
        _ => run(&config, &run_args).await,
    }
}

fn init_tracing(verbose: bool, debug: bool) {
    let level = if debug {
        "trace"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let directives = CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{directives}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DigestConfig> {
    let (path, required) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    DigestConfig::load(&path, required)
        .with_context(|| format!("loading configuration from {}", path.display()))
}

async fn run(config: &DigestConfig, args: &RunArgs) -> anyhow::Result<ExitCode> {
    tracing::info!("Starting community digest run");

    let options = RunOptions {
        output_dir: config.report.output_dir.clone(),
        scope: args.scope.into(),
        as_of: chrono::Utc::now(),
    };
    let providers = Providers::from_config(config)?;
    let artifacts = pipeline::produce_artifacts(config, &options, &providers).await?;

    tracing::info!(
        run_id = %artifacts.report.run_id,
        reused = artifacts.report_reused,
        newsletter = %artifacts.edition.html_path.display(),
        "Report and newsletter ready"
    );

    let mut status = if let Some(gap) = artifacts.data_gap() {
        gap.log_error();
        tracing::error!("{}", gap.user_friendly_message());
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    };

    if !args.send_newsletter {
        return Ok(status);
    }

    let source = pipeline::resolve_recipients(config, args.test_mode, &args.recipients)?;
    let transport = Arc::new(ResendTransport::new(&config.distribution)?);
    let store: Arc<dyn DeliveryStore> = match source {
        RecipientSource::TestRecipient(_) => Arc::new(MemoryDeliveryStore::default()),
        _ => match Database::open(config.distribution.database_url.clone()).await {
            Ok(db) => Arc::new(db),
            Err(e) => {
                e.log_error();
                tracing::error!("Subscriber store unavailable; newsletter not sent");
                return Ok(ExitCode::FAILURE);
            }
        },
    };

    match pipeline::dispatch(config, &artifacts.edition, source, transport, store).await {
        Ok(summary) => {
            for (email, reason) in &summary.failures {
                tracing::warn!("Delivery to {} failed: {}", email, reason);
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Err(e) => {
            e.log_error();
            tracing::error!("Distribution aborted");
            status = ExitCode::FAILURE;
        }
    }

    Ok(status)
}

async fn manage_subscribers(
    config: &DigestConfig,
    action: SubscriberAction,
) -> anyhow::Result<ExitCode> {
    let db = Database::open(config.distribution.database_url.clone())
        .await
        .context("opening subscriber database")?;

    match action {
        SubscriberAction::Add { email, name } => {
            let subscriber = db.add_subscriber(&email, name.as_deref()).await?;
            println!("Subscribed {} ({})", subscriber.email, subscriber.id);
        }
        SubscriberAction::Remove { email } => {
            if db.remove_subscriber(&email).await? {
                println!("Unsubscribed {}", email);
            } else {
                println!("No subscriber {}", email);
            }
        }
        SubscriberAction::List => {
            for subscriber in db.list_subscribers().await? {
                let state = if subscriber.active { "active" } else { "unsubscribed" };
                println!(
                    "{}\t{}\t{}",
                    subscriber.email,
                    subscriber.name.as_deref().unwrap_or("-"),
                    state
                );
            }
        }
    }

    db.close().await;
    Ok(ExitCode::SUCCESS)
}
