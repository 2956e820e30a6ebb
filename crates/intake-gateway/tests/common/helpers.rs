// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use http_body_util::Full;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use intake_gateway::broker::Broker;
use intake_gateway::config::Config;
use intake_gateway::intake::IntakeServer;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Compresses `payload` the way the agent does.
pub fn deflate(payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).expect("Failed to compress payload");
    encoder.finish().expect("Failed to compress payload")
}

/// A running intake bound to an ephemeral local port.
pub struct RunningIntake {
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<bool>,
}

impl RunningIntake {
    /// Cancels the server and waits for it to return. Returns whether it stopped cleanly.
    pub async fn stop(self) -> bool {
        self.cancel.cancel();
        timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("Intake did not stop in time")
            .expect("Intake task failed")
    }
}

/// Starts the intake on `127.0.0.1:0`.
pub async fn start_intake(config: Config, broker: Arc<Broker>) -> RunningIntake {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind intake");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let cancel = CancellationToken::new();

    let server = IntakeServer::new(Arc::new(config), broker);
    let token = cancel.clone();
    let handle = tokio::spawn(async move { server.serve(listener, token).await.is_ok() });

    RunningIntake {
        addr,
        cancel,
        handle,
    }
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    body: Option<Vec<u8>>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let body = body.unwrap_or_default();
    let request = Request::builder()
        .uri(uri)
        .method(method)
        .header("Content-Type", "application/json")
        .header("Content-Encoding", "deflate")
        .header("Content-Length", body.len().to_string())
        .body(Full::new(Bytes::from(body)))?;

    Ok(timeout(Duration::from_secs(2), sender.send_request(request)).await??)
}
