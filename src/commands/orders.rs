use serde::Deserialize;
use serde_json::Value;

use crate::{db, menu, orders, payload_arg0_as_string};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusPayload {
    #[serde(alias = "order_id", alias = "id")]
    order_id: String,
    status: String,
}

fn parse_order_status_payload(
    arg0: Option<Value>,
    arg1: Option<String>,
) -> Result<OrderStatusPayload, String> {
    let payload = match arg0 {
        Some(Value::Object(mut obj)) => {
            if obj.get("status").is_none() {
                if let Some(status) = arg1 {
                    obj.insert("status".to_string(), Value::String(status));
                }
            }
            Value::Object(obj)
        }
        Some(Value::String(order_id)) => {
            serde_json::json!({ "orderId": order_id, "status": arg1 })
        }
        Some(v) => v,
        None => serde_json::json!({ "status": arg1 }),
    };
    let mut parsed: OrderStatusPayload = serde_json::from_value(payload)
        .map_err(|e| format!("Invalid order status payload: {e}"))?;
    parsed.order_id = parsed.order_id.trim().to_string();
    parsed.status = parsed.status.trim().to_string();
    if parsed.order_id.is_empty() {
        return Err("Missing orderId".into());
    }
    if parsed.status.is_empty() {
        return Err("Missing status".into());
    }
    Ok(parsed)
}

fn parse_order_id(arg0: Option<Value>, arg1: Option<String>) -> Result<String, String> {
    payload_arg0_as_string(arg0, &["orderId", "order_id", "id"])
        .or(arg1)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or("Missing orderId".into())
}

#[tauri::command]
pub async fn order_create(
    arg0: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = arg0.ok_or("Missing order payload")?;
    orders::create_order(&db, &payload)
}

#[tauri::command]
pub async fn order_get_all(db: tauri::State<'_, db::DbState>) -> Result<Vec<Value>, String> {
    orders::get_all_orders(&db)
}

#[tauri::command]
pub async fn order_get_by_id(
    arg0: Option<Value>,
    arg1: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let id = parse_order_id(arg0, arg1)?;
    orders::get_order_by_id(&db, &id)
}

#[tauri::command]
pub async fn order_edit(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    // Invoke shapes: (orderId, { lines }) or ({ orderId, lines }).
    match (arg0, arg1) {
        (Some(Value::String(order_id)), Some(payload)) => {
            orders::edit_order(&db, order_id.trim(), &payload)
        }
        (Some(payload @ Value::Object(_)), _) => {
            let order_id = payload
                .get("orderId")
                .or_else(|| payload.get("order_id"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or("Missing orderId")?
                .to_string();
            orders::edit_order(&db, &order_id, &payload)
        }
        _ => Err("Missing order edit payload".into()),
    }
}

#[tauri::command]
pub async fn order_preview_edit(
    arg0: Option<Value>,
    arg1: Option<Value>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    match (arg0, arg1) {
        (Some(Value::String(order_id)), Some(payload)) => {
            orders::preview_edit(&db, order_id.trim(), &payload)
        }
        (Some(payload @ Value::Object(_)), _) => {
            let order_id = payload
                .get("orderId")
                .or_else(|| payload.get("order_id"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or("Missing orderId")?
                .to_string();
            orders::preview_edit(&db, &order_id, &payload)
        }
        _ => Err("Missing order edit payload".into()),
    }
}

#[tauri::command]
pub async fn order_update_status(
    arg0: Option<Value>,
    arg1: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Value, String> {
    let payload = parse_order_status_payload(arg0, arg1)?;
    orders::update_status(&db, &payload.order_id, &payload.status)
}

#[tauri::command]
pub async fn order_get_revisions(
    arg0: Option<Value>,
    arg1: Option<String>,
    db: tauri::State<'_, db::DbState>,
) -> Result<Vec<Value>, String> {
    let id = parse_order_id(arg0, arg1)?;
    orders::get_order_revisions(&db, &id)
}

/// Pre-order stock check; an unreachable backend reports available.
#[tauri::command]
pub async fn order_check_inventory(
    arg0: Option<Value>,
    arg1: Option<String>,
) -> Result<Value, String> {
    let item_id = payload_arg0_as_string(arg0, &["itemId", "item_id", "id"])
        .or(arg1)
        .ok_or("Missing itemId")?;
    Ok(menu::check_inventory(&item_id).await)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order_status_payload_shapes() {
        // (orderId, status) tuple shape
        let parsed = parse_order_status_payload(
            Some(Value::String("o1".into())),
            Some("completed".into()),
        )
        .unwrap();
        assert_eq!(parsed.order_id, "o1");
        assert_eq!(parsed.status, "completed");

        // Object shape with embedded status
        let parsed = parse_order_status_payload(
            Some(serde_json::json!({ "orderId": " o2 ", "status": "preparing" })),
            None,
        )
        .unwrap();
        assert_eq!(parsed.order_id, "o2");

        // Object shape with status in arg1
        let parsed = parse_order_status_payload(
            Some(serde_json::json!({ "order_id": "o3" })),
            Some("cancelled".into()),
        )
        .unwrap();
        assert_eq!(parsed.status, "cancelled");

        assert!(parse_order_status_payload(None, None).is_err());
        assert!(
            parse_order_status_payload(Some(serde_json::json!({ "orderId": "" })), None).is_err()
        );
    }

    #[test]
    fn test_parse_order_id_shapes() {
        assert_eq!(
            parse_order_id(Some(Value::String("o1".into())), None).unwrap(),
            "o1"
        );
        assert_eq!(
            parse_order_id(Some(serde_json::json!({ "id": "o2" })), None).unwrap(),
            "o2"
        );
        assert_eq!(parse_order_id(None, Some("o3".into())).unwrap(), "o3");
        assert!(parse_order_id(None, None).is_err());
    }
}
