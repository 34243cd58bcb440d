//! Secure terminal config storage using the OS credential store.
//!
//! On Windows this uses DPAPI (via the `keyring` crate), on macOS Keychain,
//! and on Linux the Secret Service API. Holds the backend URL, the bearer
//! token obtained at login, and the CSRF token parsed from the backend's
//! `csrftoken` cookie.

use keyring::Entry;
use serde_json::Value;
use tracing::{info, warn};

const SERVICE_NAME: &str = "wings-pos";

// Credential keys
const KEY_BACKEND_URL: &str = "backend_url";
const KEY_AUTH_TOKEN: &str = "auth_token";
const KEY_CSRF_TOKEN: &str = "csrf_token";
const KEY_BRANCH_NAME: &str = "branch_name";
const KEY_STAFF_NAME: &str = "staff_name";

/// All credential keys managed by this module.
const ALL_KEYS: &[&str] = &[
    KEY_BACKEND_URL,
    KEY_AUTH_TOKEN,
    KEY_CSRF_TOKEN,
    KEY_BRANCH_NAME,
    KEY_STAFF_NAME,
];

// ---------------------------------------------------------------------------
// Low-level helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

/// Store a credential in the OS keyring.
pub fn set_credential(key: &str, value: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    entry.set_password(value).map_err(|e| e.to_string())?;
    Ok(())
}

/// Delete a credential from the OS keyring. Silently succeeds if the entry
/// does not exist.
pub fn delete_credential(key: &str) -> Result<(), String> {
    let entry = Entry::new(SERVICE_NAME, key).map_err(|e| e.to_string())?;
    match entry.delete_credential() {
        Ok(()) => Ok(()),
        Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

pub fn has_credential(key: &str) -> bool {
    get_credential(key).is_some()
}

// ---------------------------------------------------------------------------
// High-level API
// ---------------------------------------------------------------------------

/// The terminal is considered configured when a backend URL is present.
pub fn is_configured() -> bool {
    has_credential(KEY_BACKEND_URL)
}

/// The terminal has an authenticated session when a bearer token is present.
pub fn is_logged_in() -> bool {
    has_credential(KEY_AUTH_TOKEN)
}

pub fn get_backend_url() -> Option<String> {
    get_credential(KEY_BACKEND_URL)
}

pub fn get_auth_token() -> Option<String> {
    get_credential(KEY_AUTH_TOKEN)
}

pub fn set_auth_token(token: &str) -> Result<(), String> {
    set_credential(KEY_AUTH_TOKEN, token)
}

pub fn get_csrf_token() -> Option<String> {
    get_credential(KEY_CSRF_TOKEN)
}

pub fn set_csrf_token(token: &str) -> Result<(), String> {
    set_credential(KEY_CSRF_TOKEN, token)
}

/// Drop the session credentials but keep the backend URL, so the next login
/// does not need reconfiguration.
pub fn clear_session() -> Result<(), String> {
    delete_credential(KEY_AUTH_TOKEN)?;
    delete_credential(KEY_CSRF_TOKEN)?;
    delete_credential(KEY_STAFF_NAME)?;
    Ok(())
}

/// Return all stored terminal config as a JSON value that matches the shape
/// the webview expects. The token itself is never exposed, only its presence.
pub fn get_full_config() -> Value {
    serde_json::json!({
        "backend_url": get_credential(KEY_BACKEND_URL),
        "branch_name": get_credential(KEY_BRANCH_NAME),
        "staff_name":  get_credential(KEY_STAFF_NAME),
        "logged_in":   is_logged_in(),
    })
}

/// Store terminal configuration received during onboarding.
///
/// Expected JSON shape (camelCase, matching the webview payload):
/// ```json
/// { "backendUrl": "...", "branchName": "..." }
/// ```
pub fn update_terminal_config(payload: &Value) -> Result<Value, String> {
    let backend_url = payload
        .get("backendUrl")
        .or_else(|| payload.get("backend_url"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("Missing required field: backendUrl")?;

    let normalized = crate::api::normalize_backend_url(backend_url);
    if normalized.trim().is_empty() {
        return Err("Invalid backend URL".to_string());
    }
    set_credential(KEY_BACKEND_URL, normalized.trim())?;

    if let Some(branch) = payload
        .get("branchName")
        .or_else(|| payload.get("branch_name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        set_credential(KEY_BRANCH_NAME, branch)?;
    }

    info!(backend_url = %normalized, "terminal configuration updated");
    Ok(serde_json::json!({ "success": true }))
}

pub fn set_staff_name(name: &str) -> Result<(), String> {
    set_credential(KEY_STAFF_NAME, name)
}

pub fn get_staff_name() -> Option<String> {
    get_credential(KEY_STAFF_NAME)
}

/// Delete every stored credential (factory reset).
pub fn factory_reset() -> Result<Value, String> {
    info!("performing factory reset – deleting all credentials");
    for key in ALL_KEYS {
        delete_credential(key)?;
    }
    Ok(serde_json::json!({ "success": true }))
}
