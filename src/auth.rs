//! Backend-delegated authentication for Wings POS.
//!
//! The terminal logs in against the restaurant backend, which returns a
//! bearer token. The token and the CSRF token from the `csrftoken` cookie
//! live in the OS credential store (`storage`); this module tracks the
//! in-memory session (who is logged in, last activity) and enforces an
//! inactivity timeout so an abandoned terminal drops back to the login
//! screen.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::{api, storage};

const SESSION_INACTIVITY_MINUTES: i64 = 60;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The active login session.
#[derive(Clone)]
struct Session {
    staff_name: String,
    role: String,
    login_time: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    fn is_expired(&self) -> bool {
        Utc::now() - self.last_activity > Duration::minutes(SESSION_INACTIVITY_MINUTES)
    }

    /// Convert to the JSON shape the webview expects.
    fn to_json(&self) -> Value {
        serde_json::json!({
            "staffName": self.staff_name,
            "role": self.role,
            "loginTime": self.login_time.to_rfc3339(),
            "branchName": storage::get_credential("branch_name"),
        })
    }
}

/// Tauri managed state for authentication.
pub struct AuthState {
    session: Mutex<Option<Session>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

/// Log in against the backend and persist the bearer token.
///
/// POSTs `{ username, password }` to `/api/login/`; the response carries the
/// token plus staff metadata, and its `Set-Cookie` headers carry the CSRF
/// token the client captures for subsequent mutations.
pub async fn login(state: &AuthState, username: &str, password: &str) -> Result<Value, String> {
    let username = username.trim();
    if username.is_empty() {
        return Err("Missing username".into());
    }
    if password.is_empty() {
        return Err("Missing password".into());
    }

    let body = serde_json::json!({ "username": username, "password": password });
    let resp = api::backend_request("/api/login/", "POST", Some(body)).await?;

    let token = resp
        .get("token")
        .or_else(|| resp.get("access"))
        .and_then(Value::as_str)
        .ok_or("Login response did not include a token")?;
    storage::set_auth_token(token)?;

    let staff_name = resp
        .get("name")
        .or_else(|| resp.get("username"))
        .and_then(Value::as_str)
        .unwrap_or(username)
        .to_string();
    let role = resp
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("staff")
        .to_string();
    let _ = storage::set_staff_name(&staff_name);

    let session = Session {
        staff_name,
        role,
        login_time: Utc::now(),
        last_activity: Utc::now(),
    };
    let json = session.to_json();
    if let Ok(mut guard) = state.session.lock() {
        *guard = Some(session);
    }

    info!(user = %username, "login succeeded");
    Ok(serde_json::json!({ "success": true, "user": json }))
}

/// Log out: best-effort notify the backend, then clear local session state.
pub async fn logout(state: &AuthState) -> Result<Value, String> {
    if let Err(e) = api::backend_request("/api/logout/", "POST", None).await {
        // The local session is cleared regardless; a dead backend must not
        // trap the user in a logged-in terminal.
        warn!("backend logout failed: {e}");
    }

    if let Ok(mut guard) = state.session.lock() {
        *guard = None;
    }
    storage::clear_session()?;

    info!("logged out");
    Ok(serde_json::json!({ "success": true }))
}

// ---------------------------------------------------------------------------
// Session queries
// ---------------------------------------------------------------------------

/// Get the current session, expiring it on inactivity.
pub fn current_session(state: &AuthState) -> Option<Value> {
    let mut guard = state.session.lock().ok()?;
    match guard.as_mut() {
        Some(session) if session.is_expired() => {
            info!(user = %session.staff_name, "session expired after inactivity");
            *guard = None;
            let _ = storage::clear_session();
            None
        }
        Some(session) => {
            session.last_activity = Utc::now();
            Some(session.to_json())
        }
        None => {
            // Token survives restarts in the credential store; rebuild a
            // session for it so a relaunch does not force a re-login.
            if storage::is_logged_in() {
                let session = Session {
                    staff_name: storage::get_staff_name().unwrap_or_else(|| "Staff".into()),
                    role: "staff".into(),
                    login_time: Utc::now(),
                    last_activity: Utc::now(),
                };
                let json = session.to_json();
                *guard = Some(session);
                Some(json)
            } else {
                None
            }
        }
    }
}

/// Record activity so the inactivity timer restarts.
pub fn track_activity(state: &AuthState) {
    if let Ok(mut guard) = state.session.lock() {
        if let Some(session) = guard.as_mut() {
            session.last_activity = Utc::now();
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry_by_inactivity() {
        let session = Session {
            staff_name: "Ana".into(),
            role: "manager".into(),
            login_time: Utc::now() - Duration::hours(3),
            last_activity: Utc::now() - Duration::minutes(SESSION_INACTIVITY_MINUTES + 1),
        };
        assert!(session.is_expired());

        let fresh = Session {
            last_activity: Utc::now(),
            ..session
        };
        assert!(!fresh.is_expired());
    }

    #[test]
    fn test_track_activity_refreshes_timer() {
        let state = AuthState::new();
        {
            let mut guard = state.session.lock().unwrap();
            *guard = Some(Session {
                staff_name: "Ana".into(),
                role: "staff".into(),
                login_time: Utc::now(),
                last_activity: Utc::now() - Duration::minutes(30),
            });
        }
        track_activity(&state);
        let guard = state.session.lock().unwrap();
        let session = guard.as_ref().unwrap();
        assert!(Utc::now() - session.last_activity < Duration::seconds(5));
    }
}
