// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use tracing::{debug, error, info};

pub type HttpResponse = Response<Full<Bytes>>;

/// Logs the given message and returns an empty response with the given status code.
///
/// Success codes are logged at debug, client errors at info and anything
/// else at error. The agent only looks at the status code, so the body is
/// always empty.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else if status.is_client_error() {
        info!("{message}");
    } else {
        error!("{message}");
    }
    empty_response(status)
}

pub fn empty_response(status: StatusCode) -> http::Result<HttpResponse> {
    Response::builder().status(status).body(Full::new(Bytes::new()))
}

/// Takes a request's header map and verifies that a "content-length" header, if present, is
/// valid and no greater than the given max_content_length. Chunked requests without the header
/// are accepted here and bounded while the body is read.
///
/// Will return None if no issues are found. Otherwise logs the problem (with the given prefix)
/// and returns an HTTP Response with the appropriate error status code.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Option<http::Result<HttpResponse>> {
    let content_length_header = header_map.get(header::CONTENT_LENGTH)?;
    let Some(content_length) = content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
    else {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Invalid Content-Length header"),
            StatusCode::BAD_REQUEST,
        ));
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Payload too large"),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}
