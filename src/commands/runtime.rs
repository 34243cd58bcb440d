use serde_json::Value;
use tauri::Manager;

use crate::{db, diagnostics};

#[tauri::command]
pub async fn app_get_version() -> Result<String, String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

#[tauri::command]
pub async fn diagnostics_get_about() -> Result<Value, String> {
    Ok(diagnostics::get_about_info())
}

#[tauri::command]
pub async fn diagnostics_get_system_health(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    diagnostics::get_system_health(&db)
}

#[tauri::command]
pub async fn diagnostics_recent_sync_errors(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    diagnostics::recent_sync_errors(&db, 20)
}

#[tauri::command]
pub async fn diagnostics_export(
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let export_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| format!("resolve app data dir: {e}"))?
        .join("diagnostics");
    let path = diagnostics::export_diagnostics(&db, &export_dir)?;
    Ok(serde_json::json!({ "success": true, "path": path }))
}
