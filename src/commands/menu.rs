use serde_json::Value;

use crate::{db, disposal, menu, payload_arg0_as_string};

#[tauri::command]
pub async fn menu_get_categories(
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    Ok(menu::get_categories(&db))
}

#[tauri::command]
pub async fn menu_get_items(db: tauri::State<'_, db::DbState>) -> Result<Vec<Value>, String> {
    Ok(menu::get_items(&db))
}

#[tauri::command]
pub async fn menu_refresh(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    menu::refresh_menu(&db).await
}

#[tauri::command]
pub async fn menu_add_item(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing menu item payload")?;
    menu::add_menu_item(&db, &payload).await
}

#[tauri::command]
pub async fn menu_edit_item(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    // Invoke shapes: (itemId, payload) or ({ id, ...fields }).
    match (arg0, arg1) {
        (Some(Value::String(item_id)), Some(payload)) => {
            menu::edit_menu_item(&db, item_id.trim(), &payload).await
        }
        (Some(payload @ Value::Object(_)), _) => {
            let item_id = payload
                .get("id")
                .or_else(|| payload.get("itemId"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or("Missing menu item id")?
                .to_string();
            menu::edit_menu_item(&db, &item_id, &payload).await
        }
        _ => Err("Missing menu edit payload".into()),
    }
}

// -- Disposal ----------------------------------------------------------------

#[tauri::command]
pub async fn disposal_record(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing disposal payload")?;
    disposal::record_disposal(&db, &payload)
}

#[tauri::command]
pub async fn disposal_list(
    arg0: Option<Value>,
    arg1: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    let period = payload_arg0_as_string(arg0, &["period", "month", "date"])
        .or(arg1)
        .ok_or("Missing period")?;
    disposal::list_disposals(&db, &period)
}
