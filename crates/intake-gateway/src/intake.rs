// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP intake: inflates agent payloads and publishes them to the broker,
//! using the request path as topic.

use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{http, Request, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::config::Config;
use crate::errors::IntakeError;
use crate::http_utils::{
    empty_response, log_and_create_http_response, verify_request_content_length, HttpResponse,
};

pub const INTAKE_ENDPOINT_V1: &str = "/intake/";

pub const SERIES_ENDPOINT_V1: &str = "/api/v1/series";
pub const CHECK_RUNS_ENDPOINT_V1: &str = "/api/v1/check_run";
pub const SKETCH_SERIES_ENDPOINT_V1: &str = "/api/v1/sketches";
pub const VALIDATE_ENDPOINT_V1: &str = "/api/v1/validate";
pub const PROCESSES_ENDPOINT_V1: &str = "/api/v1/collector";
pub const CONTAINER_ENDPOINT_V1: &str = "/api/v1/container";
pub const ORCHESTRATOR_ENDPOINT_V1: &str = "/api/v1/orchestrator";

const V1_PATH_PREFIX: &str = "/api/v1";

/// Every known v1 topic, for plugins that attach to all v1 traffic.
#[must_use]
pub fn v1_endpoints() -> [&'static str; 7] {
    [
        SERIES_ENDPOINT_V1,
        CHECK_RUNS_ENDPOINT_V1,
        SKETCH_SERIES_ENDPOINT_V1,
        VALIDATE_ENDPOINT_V1,
        PROCESSES_ENDPOINT_V1,
        CONTAINER_ENDPOINT_V1,
        ORCHESTRATOR_ENDPOINT_V1,
    ]
}

pub struct IntakeServer {
    config: Arc<Config>,
    broker: Arc<Broker>,
}

impl IntakeServer {
    #[must_use]
    pub fn new(config: Arc<Config>, broker: Arc<Broker>) -> Self {
        IntakeServer { config, broker }
    }

    /// Binds the configured address and serves until `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
        let address = self.config.listen_address();
        let listener = TcpListener::bind(&address).await?;
        info!("Intake listening on {address}");
        self.serve(listener, cancel).await
    }

    /// Accepts connections on `listener` until `cancel` fires, then waits up to
    /// the shutdown timeout for in-flight requests before dropping them.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let config = Arc::clone(&self.config);
        let broker = Arc::clone(&self.broker);
        let service = service_fn(move |req| {
            // called for each http request
            let config = Arc::clone(&config);
            let broker = Arc::clone(&broker);
            async move { endpoint_handler(&config, &broker, req).await }
        });

        let mut server = hyper::server::conn::http1::Builder::new();
        // hyper arms the header timer while a kept-alive connection waits for
        // its next request, so it doubles as the idle timeout. Bodies are
        // bounded by read_timeout in read_payload.
        server
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.idle_timeout());
        let graceful = GracefulShutdown::new();
        let mut joinset = JoinSet::new();

        loop {
            let conn = tokio::select! {
                () = cancel.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        error!("Connection handler panicked: {e:?}");
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
            };
            let conn = TokioIo::new(conn);
            let connection = graceful.watch(server.serve_connection(conn, service.clone()));
            joinset.spawn(async move {
                if let Err(e) = connection.await {
                    debug!("Connection error: {e}");
                }
            });
        }

        drop(listener);
        debug!("Intake stopped accepting connections");

        tokio::select! {
            () = graceful.shutdown() => debug!("All connections closed"),
            () = tokio::time::sleep(self.config.shutdown_timeout()) => {
                warn!(
                    "Connections still open after {}s, closing them",
                    self.config.shutdown_timeout_secs
                );
            }
        }
        joinset.shutdown().await;
        Ok(())
    }
}

/// Routes a request by path. Never fails: every outcome maps to a status code.
pub async fn endpoint_handler<B>(
    config: &Config,
    broker: &Broker,
    req: Request<B>,
) -> http::Result<HttpResponse>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let path = req.uri().path().to_string();
    match path.as_str() {
        VALIDATE_ENDPOINT_V1 => log_and_create_http_response("API key validated", StatusCode::OK),
        INTAKE_ENDPOINT_V1 => publish_handler(config, broker, &path, req).await,
        p if p.starts_with(V1_PATH_PREFIX) => publish_handler(config, broker, &path, req).await,
        _ => {
            info!("Unsupported endpoint: {} {}", req.method(), req.uri());
            empty_response(StatusCode::OK)
        }
    }
}

async fn publish_handler<B>(
    config: &Config,
    broker: &Broker,
    topic: &str,
    req: Request<B>,
) -> http::Result<HttpResponse>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    if let Some(response) = verify_request_content_length(
        &parts.headers,
        config.max_request_content_length,
        &format!("Error processing request to {topic}"),
    ) {
        return response;
    }

    let message = match read_payload(config, body).await {
        Ok(message) => message,
        Err(e) => {
            return log_and_create_http_response(
                &format!("Error reading request to {topic}: {e}"),
                e.status_code(),
            )
        }
    };

    // Accepted payloads are never answered with an error: a subscriber that
    // stays full is skipped by the broker.
    let size = message.len();
    broker.publish(topic, message).await;
    log_and_create_http_response(
        &format!("Published {size} bytes to {topic}"),
        StatusCode::OK,
    )
}

async fn read_payload<B>(config: &Config, body: B) -> Result<Bytes, IntakeError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let limit = config.max_request_content_length;
    let collected = timeout(config.read_timeout(), Limited::new(body, limit).collect())
        .await
        .map_err(|_| IntakeError::Timeout)?
        .map_err(|e| read_error(&*e, limit))?;

    let compressed = collected.to_bytes();
    if compressed.is_empty() {
        return Err(IntakeError::EmptyBody);
    }
    inflate(&compressed, config.max_decompressed_length)
}

fn read_error(e: &(dyn std::error::Error + Send + Sync + 'static), limit: usize) -> IntakeError {
    if e.is::<LengthLimitError>() {
        IntakeError::BodyTooLarge { limit }
    } else {
        IntakeError::Read(e.to_string())
    }
}

/// Inflates a zlib stream, refusing to produce more than `limit` bytes.
pub fn inflate(compressed: &[u8], limit: usize) -> Result<Bytes, IntakeError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decoder = ZlibDecoder::new(compressed).take(cap);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated)?;
    if inflated.len() > limit {
        return Err(IntakeError::DecompressedTooLarge { limit });
    }
    Ok(Bytes::from(inflated))
}
