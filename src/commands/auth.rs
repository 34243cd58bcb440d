use serde::Deserialize;

use crate::auth;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    #[serde(alias = "user", alias = "email")]
    username: String,
    password: String,
}

fn parse_login_payload(arg0: Option<serde_json::Value>) -> Result<LoginPayload, String> {
    let payload = arg0.ok_or("Missing login payload")?;
    serde_json::from_value(payload).map_err(|e| format!("Invalid login payload: {e}"))
}

#[tauri::command]
pub async fn auth_login(
    arg0: Option<serde_json::Value>,
    state: tauri::State<'_, auth::AuthState>,
) -> Result<serde_json::Value, String> {
    let payload = parse_login_payload(arg0)?;
    auth::login(&state, &payload.username, &payload.password).await
}

#[tauri::command]
pub async fn auth_logout(
    state: tauri::State<'_, auth::AuthState>,
) -> Result<serde_json::Value, String> {
    auth::logout(&state).await
}

#[tauri::command]
pub async fn auth_get_session(
    state: tauri::State<'_, auth::AuthState>,
) -> Result<serde_json::Value, String> {
    Ok(match auth::current_session(&state) {
        Some(session) => serde_json::json!({ "loggedIn": true, "user": session }),
        None => serde_json::json!({ "loggedIn": false }),
    })
}

#[tauri::command]
pub async fn auth_track_activity(
    state: tauri::State<'_, auth::AuthState>,
) -> Result<serde_json::Value, String> {
    auth::track_activity(&state);
    Ok(serde_json::json!({ "success": true }))
}
