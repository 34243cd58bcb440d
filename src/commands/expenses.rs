use serde::Deserialize;
use serde_json::Value;

use crate::{db, expenses, payload_arg0_as_string};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpenseRangePayload {
    #[serde(alias = "start", alias = "from_date")]
    from: String,
    #[serde(alias = "end", alias = "to_date")]
    to: String,
}

#[tauri::command]
pub async fn expense_record(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing expense payload")?;
    expenses::record_expense(&db, &payload)
}

#[tauri::command]
pub async fn expense_list(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    let payload = arg0.ok_or("Missing date range")?;
    let range: ExpenseRangePayload =
        serde_json::from_value(payload).map_err(|e| format!("Invalid date range: {e}"))?;
    expenses::list_expenses(&db, &range.from, &range.to)
}

#[tauri::command]
pub async fn expense_month_summary(
    arg0: Option<Value>,
    arg1: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let month = payload_arg0_as_string(arg0, &["month"])
        .or(arg1)
        .ok_or("Missing month")?;
    expenses::month_summary(&db, &month)
}
