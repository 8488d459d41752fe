//! Probe primitives.
//!
//! Each probe takes a [`ServiceCheck`] and reduces the outcome to a boolean:
//! transport failures, timeouts and content mismatches all collapse into
//! `false`. Failure reasons are visible only in logs.

use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use http::header::{AUTHORIZATION, HOST, USER_AGENT};
use http_body_util::{BodyExt, Empty};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use orbit_state::ServiceCheck;

/// Default dial timeout for HTTP checks.
pub const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
/// Default response deadline for HTTP checks, applied after connect.
pub const DEFAULT_HTTP_RESPONSE_TIMEOUT: Duration = Duration::from_millis(300);
/// Default dial timeout for TCP checks.
pub const DEFAULT_TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(50);

/// Run one check, dispatching on its configured type.
///
/// Returns `None` for an unrecognised type: such a check neither passes nor
/// fails, leaving the surrounding round's verdict untouched.
pub async fn run_check(check: &ServiceCheck) -> Option<bool> {
    match check.check_type.as_str() {
        "dummy" => Some(check_dummy_service(check)),
        "http" => Some(check_http_service(check).await),
        "tcp" => Some(check_tcp_service(check).await),
        other => {
            warn!(check_type = other, "unrecognised check type, skipping");
            None
        }
    }
}

/// Probe an HTTP endpoint with a single GET.
///
/// The check passes when the request succeeds at the transport level, the
/// status line starts with the expected prefix ("200" unless overridden),
/// and — when `expect_string` is set — the body can be fully read and
/// contains that substring.
///
/// `connect_timeout` bounds the dial; `response_timeout` is one absolute
/// deadline covering everything after the socket is connected.
pub async fn check_http_service(check: &ServiceCheck) -> bool {
    let connect_timeout = timeout_or(check.connect_timeout, DEFAULT_HTTP_CONNECT_TIMEOUT);
    let response_timeout = timeout_or(check.response_timeout, DEFAULT_HTTP_RESPONSE_TIMEOUT);

    let Some(url) = check.url.as_deref().filter(|u| !u.is_empty()) else {
        warn!("http check has no url");
        return false;
    };
    let uri: http::Uri = match url.parse() {
        Ok(uri) => uri,
        Err(e) => {
            warn!(url, error = %e, "http check url does not parse");
            return false;
        }
    };
    let Some(host) = uri.host() else {
        warn!(url, "http check url has no host");
        return false;
    };
    let addr = format!("{}:{}", host, uri.port_u16().unwrap_or(80));

    let stream = match tokio::time::timeout(connect_timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            debug!(url, error = %e, "http check connect failed");
            return false;
        }
        Err(_) => {
            debug!(url, "http check connect timed out");
            return false;
        }
    };

    // Everything past the dial runs under one absolute deadline.
    match tokio::time::timeout(response_timeout, http_exchange(stream, &uri, check)).await {
        Ok(ok) => ok,
        Err(_) => {
            debug!(url, "http check response deadline exceeded");
            false
        }
    }
}

/// Drive the HTTP exchange on an already-connected socket.
///
/// The connection and response body are dropped on every exit path, so no
/// handle outlives the probe regardless of outcome.
async fn http_exchange(stream: TcpStream, uri: &http::Uri, check: &ServiceCheck) -> bool {
    let io = TokioIo::new(stream);
    let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(uri = %uri, error = %e, "http check handshake failed");
            return false;
        }
    };

    // Drive the connection until the exchange completes or the socket drops.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    // An explicit http_host wins over the URL authority.
    let host_header = match check.http_host.as_deref().filter(|h| !h.is_empty()) {
        Some(host) => host.to_string(),
        None => uri.authority().map(|a| a.to_string()).unwrap_or_default(),
    };
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());

    let mut builder = http::Request::builder()
        .method("GET")
        .uri(path)
        .header(HOST, host_header)
        .header(USER_AGENT, "orbit-check/0.1");

    if check.username.is_some() || check.password.is_some() {
        let credentials = format!(
            "{}:{}",
            check.username.as_deref().unwrap_or(""),
            check.password.as_deref().unwrap_or("")
        );
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        builder = builder.header(AUTHORIZATION, format!("Basic {encoded}"));
    }

    let req = match builder.body(Empty::<Bytes>::new()) {
        Ok(req) => req,
        Err(e) => {
            debug!(uri = %uri, error = %e, "http check request build failed");
            return false;
        }
    };

    let resp = match sender.send_request(req).await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(uri = %uri, error = %e, "http check request failed");
            return false;
        }
    };

    let mut ok = true;

    // Prefix match against the status text, e.g. "200 OK"; "2" matches any 2xx.
    let expected = check
        .expect_http_status
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("200");
    let status_text = resp.status().to_string();
    if !status_text.starts_with(expected) {
        debug!(uri = %uri, status = %status_text, expected, "http check status mismatch");
        ok = false;
    }

    if let Some(needle) = check.expect_string.as_deref().filter(|s| !s.is_empty()) {
        match resp.into_body().collect().await {
            Ok(collected) => {
                let body = String::from_utf8_lossy(&collected.to_bytes()).into_owned();
                if !body.contains(needle) {
                    debug!(uri = %uri, needle, "http check body missing expected string");
                    ok = false;
                }
            }
            Err(e) => {
                debug!(uri = %uri, error = %e, "http check body read failed");
                ok = false;
            }
        }
    }

    ok
}

/// Probe a TCP endpoint: dial within the timeout, then close.
///
/// Success is the dial succeeding; no payload is exchanged.
pub async fn check_tcp_service(check: &ServiceCheck) -> bool {
    let connect_timeout = timeout_or(check.connect_timeout, DEFAULT_TCP_CONNECT_TIMEOUT);

    let Some(host_port) = check.host_port.as_deref().filter(|hp| !hp.is_empty()) else {
        warn!("tcp check has no hostPort");
        return false;
    };

    match tokio::time::timeout(connect_timeout, TcpStream::connect(host_port)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            debug!(host_port, error = %e, "tcp check connect failed");
            false
        }
        Err(_) => {
            debug!(host_port, "tcp check connect timed out");
            false
        }
    }
}

/// Return the configured result unchanged; used by tests and for injecting
/// known states.
pub fn check_dummy_service(check: &ServiceCheck) -> bool {
    check.dummy_result
}

fn timeout_or(configured_ms: Option<u64>, default: Duration) -> Duration {
    match configured_ms {
        Some(ms) if ms > 0 => Duration::from_millis(ms),
        _ => default,
    }
}
