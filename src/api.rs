//! Restaurant backend API client.
//!
//! Provides authenticated HTTP communication with the REST backend that owns
//! the canonical menu, orders, sales, and attendance data. Requests carry the
//! bearer token from the credential store; mutating requests additionally
//! replay the CSRF token the backend sets through its `csrftoken` cookie as
//! an `X-CSRFToken` header.

use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::storage;

/// Default timeout for API requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used specifically for the lightweight connectivity test.
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Name of the cookie the backend uses to hand out CSRF tokens.
const CSRF_COOKIE_NAME: &str = "csrftoken";

// ---------------------------------------------------------------------------
// URL normalisation
// ---------------------------------------------------------------------------

/// Normalise the backend URL:
/// - strip trailing slashes
/// - strip a trailing `/api` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_backend_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /api
    if url.ends_with("/api") {
        url.truncate(url.len() - 4);
    }

    // Strip trailing slashes again (in case "/api/" was present)
    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// CSRF cookie parsing
// ---------------------------------------------------------------------------

/// Extract the CSRF token from a `Set-Cookie` header value, e.g.
/// `csrftoken=abc123; Path=/; SameSite=Lax`.
pub fn parse_csrf_cookie(set_cookie: &str) -> Option<String> {
    let first_pair = set_cookie.split(';').next()?;
    let (name, value) = first_pair.split_once('=')?;
    if name.trim() != CSRF_COOKIE_NAME {
        return None;
    }
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Scan a response's `Set-Cookie` headers for a refreshed CSRF token and
/// persist it when found.
fn capture_csrf_token(resp: &reqwest::Response) {
    for header in resp.headers().get_all(reqwest::header::SET_COOKIE) {
        if let Ok(raw) = header.to_str() {
            if let Some(token) = parse_csrf_cookie(raw) {
                debug!("captured refreshed CSRF token from response cookie");
                let _ = storage::set_csrf_token(&token);
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach backend at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid backend URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Session expired or invalid token".to_string(),
        403 => "Not authorized for this action".to_string(),
        404 => "Backend endpoint not found".to_string(),
        s if s >= 500 => format!("Backend server error (HTTP {s})"),
        s => format!("Unexpected response from backend (HTTP {s})"),
    }
}

/// Session-auth failures that should bounce the user back to the login page.
pub fn is_auth_failure(error: &str) -> bool {
    let lower = error.to_lowercase();
    lower.contains("session expired") || lower.contains("not authorized")
}

// ---------------------------------------------------------------------------
// Connectivity test
// ---------------------------------------------------------------------------

/// Result of a connectivity test.
#[derive(serde::Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Test connectivity to the backend with a lightweight unauthenticated GET.
pub async fn test_connectivity(backend_url: &str) -> ConnectivityResult {
    let url = normalize_backend_url(backend_url);

    let client = match Client::builder().timeout(CONNECTIVITY_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(format!("Failed to create HTTP client: {e}")),
            };
        }
    };

    let start = Instant::now();

    let resp = match client.get(format!("{url}/api/")).send().await {
        Ok(r) => r,
        Err(e) => {
            return ConnectivityResult {
                success: false,
                latency_ms: None,
                error: Some(friendly_error(&url, &e)),
            };
        }
    };

    let latency = start.elapsed().as_millis() as u64;
    let status = resp.status();

    // Any response at all proves the backend is reachable; auth comes later.
    if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
    {
        info!(latency_ms = latency, "connectivity test passed");
        ConnectivityResult {
            success: true,
            latency_ms: Some(latency),
            error: None,
        }
    } else {
        ConnectivityResult {
            success: false,
            latency_ms: Some(latency),
            error: Some(status_error(status)),
        }
    }
}

// ---------------------------------------------------------------------------
// Generic authenticated fetch
// ---------------------------------------------------------------------------

/// Perform an authenticated HTTP request against the backend.
///
/// `path` should include the leading slash, e.g. `/api/fetch-order-data/`.
/// `method` is an HTTP verb string: "GET", "POST", "PUT", "PATCH", "DELETE".
pub async fn fetch_from_backend(
    backend_url: &str,
    path: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value, String> {
    let base = normalize_backend_url(backend_url);
    let full_url = format!("{base}{path}");

    let http_method: Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| format!("Invalid HTTP method: {method}"))?;
    let is_mutation = http_method != Method::GET && http_method != Method::HEAD;

    let client = Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {e}"))?;

    let mut req = client
        .request(http_method, &full_url)
        .header("Content-Type", "application/json");

    if let Some(token) = storage::get_auth_token() {
        req = req.header("Authorization", format!("Bearer {}", token.trim()));
    }
    // The backend validates CSRF on mutating requests only.
    if is_mutation {
        if let Some(csrf) = storage::get_csrf_token() {
            req = req.header("X-CSRFToken", csrf.trim().to_string());
        }
    }

    if let Some(b) = body {
        // If the webview pre-serialized the body via JSON.stringify(), it
        // arrives as Value::String containing JSON. Parse it back to avoid
        // double-serialization by reqwest's .json() method.
        let resolved = if let Value::String(ref s) = b {
            serde_json::from_str::<Value>(s).unwrap_or(b)
        } else {
            b
        };
        req = req.json(&resolved);
    }

    let resp = req.send().await.map_err(|e| friendly_error(&base, &e))?;
    capture_csrf_token(&resp);
    let status = resp.status();

    if !status.is_success() {
        // Preserve validation details for diagnostics and sync queue visibility.
        let body_text = resp.text().await.unwrap_or_default();
        let detail = if let Ok(json) = serde_json::from_str::<Value>(&body_text) {
            let message = json
                .get("error")
                .or_else(|| json.get("message"))
                .or_else(|| json.get("detail"))
                .and_then(Value::as_str)
                .map(|s| s.to_string())
                .unwrap_or_else(|| status_error(status));
            let details = json.get("details").or_else(|| json.get("errors")).cloned();
            if let Some(details) = details {
                format!("{message} (HTTP {}): {}", status.as_u16(), details)
            } else if !body_text.trim().is_empty() && body_text.trim() != message {
                format!("{message} (HTTP {}): {}", status.as_u16(), body_text.trim())
            } else {
                format!("{message} (HTTP {})", status.as_u16())
            }
        } else if !body_text.trim().is_empty() {
            format!(
                "{} (HTTP {}): {}",
                status_error(status),
                status.as_u16(),
                body_text.trim()
            )
        } else {
            format!("{} (HTTP {})", status_error(status), status.as_u16())
        };
        return Err(detail);
    }

    // Return the JSON body, or null for empty 204 responses.
    let body_text = resp.text().await.unwrap_or_default();
    if body_text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body_text).map_err(|e| format!("Invalid JSON from backend: {e}"))
}

/// `fetch_from_backend` against the stored backend URL.
pub async fn backend_request(
    path: &str,
    method: &str,
    body: Option<Value>,
) -> Result<Value, String> {
    let backend_url =
        storage::get_backend_url().ok_or("Terminal not configured: missing backend URL")?;
    fetch_from_backend(&backend_url, path, method, body).await
}

// ===========================================================================
// Tests
// ===========================================================================
