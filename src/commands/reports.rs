use serde::Deserialize;
use serde_json::Value;
use tauri::Manager;

use crate::{db, reports};

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReportDatePayload {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReportTrendPayload {
    #[serde(default)]
    days: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ReportTopItemsPayload {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportRangePayload {
    #[serde(alias = "start", alias = "from_date")]
    from: String,
    #[serde(alias = "end", alias = "to_date")]
    to: String,
}

fn parse_or_default<T: serde::de::DeserializeOwned + Default>(arg0: Option<Value>) -> T {
    arg0.and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

#[tauri::command]
pub async fn report_today_statistics(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload: ReportDatePayload = parse_or_default(arg0);
    let date = reports::resolve_report_date(payload.date);
    reports::today_statistics(&db, &date)
}

#[tauri::command]
pub async fn report_sales_trend(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    let payload: ReportTrendPayload = parse_or_default(arg0);
    reports::sales_trend(&db, payload.days.unwrap_or(7))
}

#[tauri::command]
pub async fn report_top_items(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    let payload: ReportTopItemsPayload = parse_or_default(arg0);
    let date = reports::resolve_report_date(payload.date);
    let limit = payload.limit.unwrap_or(10).clamp(1, 100) as usize;
    reports::top_items(&db, &date, limit)
}

/// Canonical cross-terminal sales numbers from the backend.
#[tauri::command]
pub async fn report_fetch_remote_sales(arg0: Option<Value>) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing date range")?;
    let range: ReportRangePayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid date range: {e}"))?;
    reports::fetch_remote_sales(&range.from, &range.to).await
}

#[tauri::command]
pub async fn report_export_sales_csv(
    arg0: Option<Value>,
    app: tauri::AppHandle,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing date range")?;
    let range: ReportRangePayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid date range: {e}"))?;

    let export_dir = app
        .path()
        .app_data_dir()
        .map_err(|e| format!("resolve app data dir: {e}"))?
        .join("exports");
    let path = reports::export_sales_csv(&db, &range.from, &range.to, &export_dir)?;
    Ok(serde_json::json!({ "success": true, "path": path.display().to_string() }))
}
