//! Upload Ingest Worker - validates uploaded CSV files into the warehouse
//!
//! Listens for object-finalize events on NATS, writes the file's complete
//! rows to the destination table and emails the recipients named in it.

mod cli;
mod config;
mod error;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use crate::cli::{Cli, Command};
use crate::services::email_sender::create_email_sender;
use crate::services::object_store::create_object_store;
use crate::services::pipeline::IngestPipeline;
use crate::services::warehouse::create_warehouse;
use crate::types::UploadEvent;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR")
        .unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(
        Rotation::DAILY,
        &logs_dir,
        "worker.log",
    );
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,upload_ingest_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())  // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))  // file
        .init();

    info!("Starting Upload Ingest Worker...");

    // Load configuration
    let config = config::Config::from_env()?;
    info!("Configuration loaded");

    let pipeline = Arc::new(IngestPipeline::new(
        config.pipeline.clone(),
        create_object_store(&config.storage).await?,
        create_warehouse(&config.warehouse).await?,
        create_email_sender(&config.email)?,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Run { bucket, object } => {
            let report = pipeline.run(&UploadEvent::new(bucket, object)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Serve => {
            // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
            let nats_client = match (&config.nats_user, &config.nats_password) {
                (Some(user), Some(password)) => {
                    async_nats::ConnectOptions::new()
                        .user_and_password(user.clone(), password.clone())
                        .connect(&config.nats_url)
                        .await?
                }
                _ => async_nats::connect(&config.nats_url).await?,
            };
            info!("Connected to NATS at {}", config.nats_url);

            // Start message handlers
            let handler_result = handlers::start_handlers(nats_client, pipeline, &config).await;

            if let Err(e) = handler_result {
                error!("Handler error: {}", e);
                return Err(e);
            }

            Ok(())
        }
    }
}
