use serde_json::Value;
use tracing::info;

use crate::{api, db, pricing, storage};

fn value_to_settings_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[tauri::command]
pub async fn settings_is_configured() -> Result<bool, String> {
    Ok(storage::is_configured())
}

#[tauri::command]
pub async fn settings_get_full_config() -> Result<Value, String> {
    Ok(storage::get_full_config())
}

/// Onboarding: store the backend URL (and optional branch name).
#[tauri::command]
pub async fn settings_configure_backend(arg0: Option<Value>) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing configuration payload")?;
    storage::update_terminal_config(&payload)
}

#[tauri::command]
pub async fn settings_test_connection(arg0: Option<Value>) -> Result<Value, String> {
    let url = arg0
        .as_ref()
        .and_then(|v| v.get("backendUrl").or_else(|| v.get("backend_url")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(storage::get_backend_url)
        .ok_or("No backend URL to test")?;
    let result = api::test_connectivity(&url).await;
    serde_json::to_value(result).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn settings_get(
    category: Option<String>,
    key: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let category = category.unwrap_or_else(|| "general".to_string());
    let key = key.ok_or("Missing setting key")?;
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    Ok(match db::get_setting(&conn, &category, &key) {
        Some(v) => Value::String(v),
        None => Value::Null,
    })
}

#[tauri::command]
pub async fn settings_set(
    category: Option<String>,
    key: Option<String>,
    value: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let category = category.unwrap_or_else(|| "general".to_string());
    let key = key.ok_or("Missing setting key")?;
    let value = value_to_settings_string(&value.unwrap_or(Value::Null));
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, &category, &key, &value)?;
    Ok(serde_json::json!({ "success": true }))
}

/// Per-platform deduction rates the pricing engine resolves at order time.
#[tauri::command]
pub async fn settings_get_deduction_rates(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let default = pricing::DEFAULT_PLATFORM_DEDUCTION_RATE;
    Ok(serde_json::json!({
        "grab": db::get_setting_f64(&conn, "pricing", "grab_deduction_rate", default),
        "foodpanda": db::get_setting_f64(&conn, "pricing", "foodpanda_deduction_rate", default),
    }))
}

#[tauri::command]
pub async fn settings_set_deduction_rate(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing payload")?;
    let platform = payload
        .get("platform")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_ascii_lowercase())
        .ok_or("Missing platform")?;
    let rate = payload
        .get("rate")
        .and_then(Value::as_f64)
        .ok_or("Missing rate")?;
    if !(0.0..1.0).contains(&rate) {
        return Err(format!("Deduction rate {rate} is outside 0..1"));
    }
    let key = match platform.as_str() {
        "grab" => "grab_deduction_rate",
        "foodpanda" => "foodpanda_deduction_rate",
        other => return Err(format!("Unknown platform: {other}")),
    };
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    db::set_setting(&conn, "pricing", key, &rate.to_string())?;
    info!(platform = %platform, rate = %rate, "deduction rate updated");
    Ok(serde_json::json!({ "success": true }))
}

/// Wipe operational data and credentials; the terminal returns to onboarding.
#[tauri::command]
pub async fn settings_factory_reset(
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        conn.execute_batch(
            "BEGIN IMMEDIATE;
             DELETE FROM order_revisions;
             DELETE FROM orders;
             DELETE FROM expenses;
             DELETE FROM disposals;
             DELETE FROM sync_queue;
             DELETE FROM menu_cache;
             DELETE FROM attendance_cache;
             DELETE FROM local_settings;
             COMMIT;",
        )
        .map_err(|e| format!("clear operational data: {e}"))?;
    }
    storage::factory_reset()
}
