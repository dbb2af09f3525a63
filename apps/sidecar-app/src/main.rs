#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod config;
mod logging;
mod signals;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use sidecar_sdk::{
    HttpMethod, InvokerListenOptions, LockRequest, SidecarClient, SidecarServer, UnlockRequest,
    invoker_callback, new_lock_owner, pubsub_callback,
};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// Sidecar App - talk to a co-located sidecar and serve its callbacks
#[derive(Parser)]
#[command(name = "sidecar-app")]
#[command(about = "Sidecar App - talk to a co-located sidecar and serve its callbacks")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve service invocation and topic routes for the sidecar
    Serve,
    /// Probe the sidecar health endpoint
    Health,
    /// Try to acquire a distributed lock
    Lock {
        #[arg(long)]
        store: String,
        #[arg(long)]
        resource: String,
        /// Owner token; a fresh one is generated when omitted
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = 60)]
        expiry: u32,
    },
    /// Release a distributed lock
    Unlock {
        #[arg(long)]
        store: String,
        #[arg(long)]
        resource: String,
        #[arg(long)]
        owner: String,
    },
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // 1) defaults -> 2) YAML (if provided) -> 3) env (SIDECAR_APP__*) -> 4) sidecar env
    let config = AppConfig::load(cli.config.as_deref())?;
    logging::init_logging(&config.logging, cli.verbose)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await,
        Commands::Health => health(&config).await,
        Commands::Lock {
            store,
            resource,
            owner,
            expiry,
        } => {
            let request = LockRequest {
                store_name: store,
                resource_id: resource,
                lock_owner: owner.unwrap_or_else(new_lock_owner),
                expiry_in_seconds: expiry,
            };
            lock(&config, request).await
        }
        Commands::Unlock {
            store,
            resource,
            owner,
        } => {
            let request = UnlockRequest {
                store_name: store,
                resource_id: resource,
                lock_owner: owner,
            };
            unlock(&config, request).await
        }
        Commands::Check => check(&config),
    }
}

fn client(config: &AppConfig) -> Result<SidecarClient> {
    SidecarClient::from_config(&config.sidecar, config.client.lock_protocol)
        .context("failed to configure sidecar client")
}

async fn serve(config: &AppConfig) -> Result<ExitCode> {
    let server = SidecarServer::new(config.server.clone());

    server
        .invoker()
        .listen(
            "echo",
            invoker_callback(|req| async move {
                let body: serde_json::Value = req.json()?;
                anyhow::Ok(Some(json!({"body": body, "query": req.query})))
            }),
            InvokerListenOptions::method(HttpMethod::Post),
        )
        .await?;

    for sub in &config.subscriptions {
        let pubsub = sub.pubsub_name.clone();
        let topic = sub.topic.clone();
        server
            .pubsub()
            .subscribe(
                &sub.pubsub_name,
                &sub.topic,
                pubsub_callback(move |data| {
                    tracing::info!(pubsub = %pubsub, topic = %topic, %data, "message received");
                    async { anyhow::Ok(()) }
                }),
                sub.route.as_deref(),
            )
            .await?;
    }

    let cancel = CancellationToken::new();
    let signals = tokio::spawn(signals::cancel_on_shutdown(cancel.clone()));
    let result = server.serve(cancel.clone()).await;
    cancel.cancel();
    signals.await.context("signal task failed")?;
    result.map(|()| ExitCode::SUCCESS)
}

async fn health(config: &AppConfig) -> Result<ExitCode> {
    let healthy = client(config)?.health().is_healthy().await;
    println!("{}", json!({"healthy": healthy}));
    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn lock(config: &AppConfig, request: LockRequest) -> Result<ExitCode> {
    let owner = request.lock_owner.clone();
    let result = client(config)?.lock().try_lock(request).await?;
    println!("{}", json!({"success": result.success, "lock_owner": owner}));
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn unlock(config: &AppConfig, request: UnlockRequest) -> Result<ExitCode> {
    let result = client(config)?.lock().unlock(request).await?;
    println!("{}", json!({"status": result.status}));
    Ok(if result.status == sidecar_sdk::LockStatus::Success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check(config: &AppConfig) -> Result<ExitCode> {
    tracing::info!("Checking configuration...");
    client(config)?;
    println!("Configuration is valid");
    println!("{config:#?}");
    Ok(ExitCode::SUCCESS)
}
