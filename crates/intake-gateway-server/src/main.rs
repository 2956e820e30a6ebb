// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use intake_gateway::{
    broker::Broker,
    config::Config,
    intake::IntakeServer,
    plugins::{plugin_from_config, PluginHost},
};

#[tokio::main]
pub async fn main() {
    let config = match Config::load() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Error loading intake gateway configuration: {e}");
            return;
        }
    };

    let env_filter = format!(
        "h2=off,hyper=off,rustls=off,{}",
        config.log_level.as_directive()
    );

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let broker = Arc::new(Broker::with_delivery_timeout(
        config.subscriber_queue_capacity,
        config.write_timeout(),
    ));
    let mut host = PluginHost::new(Arc::clone(&broker));
    for (name, settings) in &config.plugins {
        let started = match plugin_from_config(name, settings) {
            Ok(plugin) => host.start(plugin).await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            error!("Error starting plugin {name}: {e}");
        }
    }
    if config.plugins.is_empty() {
        warn!("No plugins configured, payloads will be dropped");
    }

    let cancel = CancellationToken::new();
    let signal = tokio::spawn(wait_for_signal(cancel.clone()));

    let server = IntakeServer::new(Arc::clone(&config), Arc::clone(&broker));
    if let Err(e) = server.start(cancel.clone()).await {
        error!("Error running intake gateway: {e}");
        cancel.cancel();
    }
    let shutdown_started = signal.await.unwrap_or_else(|_| Instant::now());

    if config.close_broker_on_shutdown {
        broker.close();
        let deadline = shutdown_started + config.shutdown_timeout();
        if !host.wait_until(deadline).await {
            warn!("Some plugins did not drain their queues before shutdown");
        }
    }
    info!("Intake gateway stopped");
}

/// Cancels `cancel` on Ctrl+C or SIGTERM and returns when shutdown began.
async fn wait_for_signal(cancel: CancellationToken) -> Instant {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = interrupt => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
        () = cancel.cancelled() => {}
    }
    cancel.cancel();
    Instant::now()
}
