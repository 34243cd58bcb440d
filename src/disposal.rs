//! Inventory disposal for Wings POS.
//!
//! Spoiled or damaged stock is recorded locally with a reason and quantity,
//! then pushed to the backend's `dispose-item` endpoint by the sync engine.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(String::from)
}

// ---------------------------------------------------------------------------
// Record disposal
// ---------------------------------------------------------------------------

/// Record a disposal: insert into `disposals` and enqueue a `dispose-item`
/// sync entry in one transaction.
pub fn record_disposal(db: &DbState, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let item_id = str_field(payload, "itemId")
        .or_else(|| str_field(payload, "item_id"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or("Missing itemId")?;
    let item_name = str_field(payload, "itemName")
        .or_else(|| str_field(payload, "item_name"))
        .unwrap_or_else(|| item_id.clone());
    let quantity = payload
        .get("quantity")
        .and_then(Value::as_f64)
        .ok_or("Missing quantity")?;
    if quantity <= 0.0 {
        return Err("Quantity must be positive".into());
    }
    let unit = str_field(payload, "unit");
    let reason = str_field(payload, "reason")
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or("Missing reason")?;
    let disposed_at = str_field(payload, "disposedAt")
        .or_else(|| str_field(payload, "disposed_at"))
        .unwrap_or_else(|| Utc::now().to_rfc3339());

    let disposal_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO disposals (
                id, item_id, item_name, quantity, unit, reason,
                disposed_at, sync_status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)",
            params![
                disposal_id,
                item_id,
                item_name,
                quantity,
                unit,
                reason,
                disposed_at,
                now,
            ],
        )
        .map_err(|e| format!("insert disposal: {e}"))?;

        let idempotency_key = format!("disposal:{disposal_id}");
        let sync_payload = serde_json::json!({
            "disposalId": disposal_id,
            "itemId": item_id,
            "itemName": item_name,
            "quantity": quantity,
            "unit": unit,
            "reason": reason,
            "disposedAt": disposed_at,
        })
        .to_string();

        conn.execute(
            "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
             VALUES ('disposal', ?1, 'insert', ?2, ?3)",
            params![disposal_id, sync_payload, idempotency_key],
        )
        .map_err(|e| format!("enqueue disposal sync: {e}"))?;

        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .map_err(|e| format!("commit: {e}"))?;
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e);
        }
    }

    info!(
        disposal_id = %disposal_id,
        item_id = %item_id,
        quantity = %quantity,
        reason = %reason,
        "Disposal recorded"
    );

    Ok(serde_json::json!({ "success": true, "disposalId": disposal_id }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// List disposals whose `disposed_at` falls on a `YYYY-MM-DD` day or inside a
/// `YYYY-MM` month, newest first.
pub fn list_disposals(db: &DbState, period: &str) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let prefix = format!("{}%", period.trim());
    let mut stmt = conn
        .prepare(
            "SELECT id, item_id, item_name, quantity, unit, reason,
                    disposed_at, sync_status, created_at
             FROM disposals
             WHERE disposed_at LIKE ?1
             ORDER BY disposed_at DESC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![prefix], |row| {
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "itemId": row.get::<_, String>(1)?,
                "itemName": row.get::<_, String>(2)?,
                "quantity": row.get::<_, f64>(3)?,
                "unit": row.get::<_, Option<String>>(4)?,
                "reason": row.get::<_, String>(5)?,
                "disposedAt": row.get::<_, String>(6)?,
                "syncStatus": row.get::<_, String>(7)?,
                "createdAt": row.get::<_, String>(8)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut disposals = Vec::new();
    for row in rows {
        match row {
            Ok(d) => disposals.push(d),
            Err(e) => warn!("skipping malformed disposal row: {e}"),
        }
    }
    Ok(disposals)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_record_and_list_disposal() {
        let db = db::test_db();
        let payload = serde_json::json!({
            "itemId": "wings-raw",
            "itemName": "Raw Wings",
            "quantity": 2.5,
            "unit": "kg",
            "reason": "Spoiled",
            "disposedAt": "2026-08-05T09:30:00Z",
        });
        let result = record_disposal(&db, &payload).expect("record_disposal");
        assert_eq!(result["success"], true);

        let day = list_disposals(&db, "2026-08-05").unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0]["reason"], "spoiled");
        assert_eq!(day[0]["quantity"], 2.5);

        let month = list_disposals(&db, "2026-08").unwrap();
        assert_eq!(month.len(), 1);

        let other_month = list_disposals(&db, "2026-07").unwrap();
        assert!(other_month.is_empty());
    }

    #[test]
    fn test_record_disposal_validation() {
        let db = db::test_db();
        assert!(record_disposal(&db, &serde_json::json!({ "quantity": 1.0, "reason": "x" })).is_err());
        assert!(record_disposal(
            &db,
            &serde_json::json!({ "itemId": "a", "quantity": 0.0, "reason": "x" })
        )
        .is_err());
        assert!(
            record_disposal(&db, &serde_json::json!({ "itemId": "a", "quantity": 1.0 })).is_err()
        );
    }
}
