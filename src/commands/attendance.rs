use serde::Deserialize;
use serde_json::Value;

use crate::{attendance, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MonthPayload {
    year: i32,
    month: u32,
}

fn parse_month_payload(arg0: Option<Value>) -> Result<MonthPayload, String> {
    let payload = arg0.ok_or("Missing year/month payload")?;
    serde_json::from_value(payload).map_err(|e| format!("Invalid month payload: {e}"))
}

#[tauri::command]
pub async fn attendance_get_month(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = parse_month_payload(arg0)?;
    attendance::get_month(&db, payload.year, payload.month).await
}

/// Month fetch plus the per-day rollup the calendar view renders.
#[tauri::command]
pub async fn attendance_day_summary(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = parse_month_payload(arg0)?;
    let month = attendance::get_month(&db, payload.year, payload.month).await?;
    let summary = attendance::summarize_by_day(&month["records"]);
    Ok(serde_json::json!({
        "days": summary,
        "fromCache": month["fromCache"],
    }))
}
