// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cgroup_graphite::{
    descriptor::build_descriptors,
    errors::{SinkError, SupervisorError},
    sink::Sink,
    supervisor::Supervisor,
};

mod config;

use config::Args;

#[derive(Debug, thiserror::Error)]
enum AgentError {
    #[error("failed to resolve hostname: {0}")]
    Hostname(#[source] io::Error),

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let args = Args::parse();

    let env_filter = args.log_level.to_lowercase();

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    match run(args).await {
        Ok(()) => {
            info!("cg2gr stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), AgentError> {
    let hostname = hostname::get().map_err(AgentError::Hostname)?;
    let hostname = hostname.to_string_lossy();

    let descriptors = build_descriptors(&args.cgroup_root, &args.prefix, &hostname, &args.services);
    if descriptors.is_empty() {
        info!("No services configured, nothing to sample");
    }
    for descriptor in &descriptors {
        debug!(
            "{} <- {}",
            descriptor.metric_name(),
            descriptor.source_path().display()
        );
    }

    let sink = Sink::connect(&args.host, args.port).await?;
    info!("Shipping to {}:{} as {hostname}", args.host, args.port);

    let cancel_token = CancellationToken::new();
    spawn_signal_handler(cancel_token.clone())?;

    Supervisor::new(sink, args.interval, args.on_error, cancel_token)
        .run(descriptors)
        .await?;
    Ok(())
}

fn spawn_signal_handler(cancel_token: CancellationToken) -> Result<(), AgentError> {
    let mut sigint = signal(SignalKind::interrupt()).map_err(AgentError::Signal)?;
    let mut sigterm = signal(SignalKind::terminate()).map_err(AgentError::Signal)?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
        cancel_token.cancel();
    });
    Ok(())
}
