//! Order management for Wings POS.
//!
//! Implements offline-first order entry and editing. Orders are priced
//! through the `pricing` engine, written to the local `orders` table, and
//! enqueued for sync to the restaurant backend (`add-order`,
//! `edit-order/{id}`, `update-order-status/{id}`). Edits run through
//! reconciliation so the terminal knows whether the revision requires extra
//! payment, and every edit leaves an `order_revisions` audit row.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, DbState};
use crate::pricing::{self, Cart, Channel, LineItem};

/// Order lifecycle states accepted by `update_status`.
const VALID_STATUSES: &[&str] = &["pending", "preparing", "completed", "cancelled"];

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

fn parse_lines(payload: &Value) -> Result<Vec<LineItem>, String> {
    let lines = payload
        .get("lines")
        .or_else(|| payload.get("items"))
        .cloned()
        .ok_or("Missing order lines")?;
    if !lines.is_array() {
        return Err("lines must be an array".into());
    }
    serde_json::from_value(lines).map_err(|e| format!("Invalid order lines: {e}"))
}

fn parse_channel(payload: &Value) -> Result<Channel, String> {
    let raw = payload
        .get("channel")
        .or_else(|| payload.get("orderType"))
        .and_then(Value::as_str)
        .unwrap_or("in_store");
    Channel::parse(raw).ok_or_else(|| format!("Unknown order channel: {raw}"))
}

/// Platform deduction rate for a channel: explicit payload override first,
/// then the terminal's `pricing` settings, then the built-in default.
fn resolve_deduction_rate(
    conn: &rusqlite::Connection,
    channel: Channel,
    payload: &Value,
) -> f64 {
    if !channel.is_delivery_platform() {
        return 0.0;
    }
    if let Some(rate) = payload
        .get("deductionRate")
        .or_else(|| payload.get("deduction_rate"))
        .and_then(Value::as_f64)
    {
        return rate;
    }
    let key = match channel {
        Channel::Grab => "grab_deduction_rate",
        Channel::Foodpanda => "foodpanda_deduction_rate",
        Channel::InStore => unreachable!(),
    };
    db::get_setting_f64(conn, "pricing", key, pricing::DEFAULT_PLATFORM_DEDUCTION_RATE)
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(String::from)
}

// ---------------------------------------------------------------------------
// Create order
// ---------------------------------------------------------------------------

/// Create an order from a webview payload.
///
/// Normalizes the cart (quantity <= 0 lines are dropped), prices it, inserts
/// the order row, and enqueues an `add-order` sync entry in one transaction.
/// Payment is collected at order time, so `amount_paid` starts at the net
/// total.
pub fn create_order(db: &DbState, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let channel = parse_channel(payload)?;
    let deduction_rate = resolve_deduction_rate(&conn, channel, payload);
    let lines = parse_lines(payload)?;

    let cart = Cart::new(channel, deduction_rate, lines).normalized();
    if cart.lines.is_empty() {
        return Err("Order has no lines".into());
    }
    let totals = cart.totals().map_err(|e| e.to_string())?;

    let order_id = Uuid::new_v4().to_string();
    let order_number = format!(
        "W-{}-{}",
        Utc::now().format("%Y%m%d"),
        &order_id[..8].to_uppercase()
    );
    let now = Utc::now().to_rfc3339();
    let lines_json = serde_json::to_string(&cart.lines).map_err(|e| e.to_string())?;
    let customer_name = str_field(payload, "customerName");
    let table_number = str_field(payload, "tableNumber");
    let notes = str_field(payload, "notes");

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO orders (
                id, order_number, channel, customer_name, table_number,
                lines, subtotal, discount_total, deduction_rate,
                deduction_amount, net_total, amount_paid, status, notes,
                sync_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11,
                      'pending', ?12, 'pending', ?13, ?13)",
            params![
                order_id,
                order_number,
                channel.as_str(),
                customer_name,
                table_number,
                lines_json,
                totals.subtotal,
                totals.discount_total,
                deduction_rate,
                totals.deduction_amount,
                totals.net_total,
                notes,
                now,
            ],
        )
        .map_err(|e| format!("insert order: {e}"))?;

        // Enqueue for sync — stable idempotency key based on order_id so
        // retries reuse the same key and the server deduplicates.
        let idempotency_key = format!("order:{order_id}");
        let sync_payload = serde_json::json!({
            "orderId": order_id,
            "orderNumber": order_number,
            "channel": channel.as_str(),
            "customerName": customer_name,
            "tableNumber": table_number,
            "lines": cart.lines,
            "subtotal": totals.subtotal,
            "discountTotal": totals.discount_total,
            "deductionRate": deduction_rate,
            "deductionAmount": totals.deduction_amount,
            "netTotal": totals.net_total,
            "notes": notes,
        })
        .to_string();

        conn.execute(
            "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
             VALUES ('order', ?1, 'insert', ?2, ?3)",
            params![order_id, sync_payload, idempotency_key],
        )
        .map_err(|e| format!("enqueue order sync: {e}"))?;

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
        order_id = %order_id,
        channel = %channel.as_str(),
        net_total = %totals.net_total,
        "Order created"
    );

    Ok(serde_json::json!({
        "success": true,
        "orderId": order_id,
        "orderNumber": order_number,
        "totals": totals,
    }))
}

// ---------------------------------------------------------------------------
// Edit order
// ---------------------------------------------------------------------------

/// Revise a persisted order's lines.
///
/// Reconciles the revised cart against the stored lines and the amount
/// already collected; extra payment is due only when the new total exceeds
/// it. Persists the new lines and totals, bumps `amount_paid` by the extra
/// payment, records an `order_revisions` audit row, and enqueues
/// `edit-order/{id}`.
pub fn edit_order(db: &DbState, order_id: &str, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    type EditRow = (String, String, f64, f64, f64);
    let (channel_str, stored_lines, deduction_rate, amount_paid, stored_net): EditRow = conn
        .query_row(
            "SELECT channel, lines, deduction_rate, amount_paid, net_total
             FROM orders WHERE id = ?1 AND status != 'cancelled'",
            params![order_id],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .map_err(|_| format!("Order not found or cancelled: {order_id}"))?;

    let channel =
        Channel::parse(&channel_str).ok_or_else(|| format!("Corrupt channel: {channel_str}"))?;
    let original_lines: Vec<LineItem> =
        serde_json::from_str(&stored_lines).map_err(|e| format!("Corrupt order lines: {e}"))?;

    let revised_lines = parse_lines(payload)?;
    let revised = Cart::new(channel, deduction_rate, revised_lines);

    let rec = pricing::reconcile(&original_lines, revised.clone(), amount_paid)
        .map_err(|e| e.to_string())?;

    // Discount-rate edits keep the line set intact but still move the total.
    let totals_moved = (rec.new_total - stored_net).abs() > 0.005;
    if !rec.has_line_changes() && !totals_moved {
        return Ok(serde_json::json!({
            "success": true,
            "orderId": order_id,
            "changed": false,
            "reconciliation": rec,
        }));
    }

    let revised = revised.normalized();
    if revised.lines.is_empty() {
        return Err("Edit would remove every line; cancel the order instead".into());
    }
    let totals = revised.totals().map_err(|e| e.to_string())?;
    let new_amount_paid = amount_paid + rec.additional_payment_due;
    let lines_json = serde_json::to_string(&revised.lines).map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();
    let revision_id = Uuid::new_v4().to_string();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "UPDATE orders SET
                lines = ?1, subtotal = ?2, discount_total = ?3,
                deduction_amount = ?4, net_total = ?5, amount_paid = ?6,
                sync_status = 'pending', updated_at = ?7
             WHERE id = ?8",
            params![
                lines_json,
                totals.subtotal,
                totals.discount_total,
                totals.deduction_amount,
                totals.net_total,
                new_amount_paid,
                now,
                order_id,
            ],
        )
        .map_err(|e| format!("update order: {e}"))?;

        conn.execute(
            "INSERT INTO order_revisions (
                id, order_id, previous_lines, previous_total, new_total,
                additional_payment, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                revision_id,
                order_id,
                stored_lines,
                amount_paid,
                totals.net_total,
                rec.additional_payment_due,
                now,
            ],
        )
        .map_err(|e| format!("insert revision: {e}"))?;

        let idempotency_key = format!("order-edit:{order_id}:{revision_id}");
        let sync_payload = serde_json::json!({
            "orderId": order_id,
            "lines": revised.lines,
            "subtotal": totals.subtotal,
            "discountTotal": totals.discount_total,
            "deductionAmount": totals.deduction_amount,
            "netTotal": totals.net_total,
            "additionalPayment": rec.additional_payment_due,
        })
        .to_string();

        conn.execute(
            "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
             VALUES ('order', ?1, 'update', ?2, ?3)",
            params![order_id, sync_payload, idempotency_key],
        )
        .map_err(|e| format!("enqueue order edit sync: {e}"))?;

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
        order_id = %order_id,
        additional_payment = %rec.additional_payment_due,
        "Order edited"
    );

    Ok(serde_json::json!({
        "success": true,
        "orderId": order_id,
        "changed": true,
        "requiresPayment": rec.requires_payment(),
        "totals": totals,
        "reconciliation": rec,
    }))
}

/// Preview an edit without persisting: the reconciliation the confirmation
/// dialog shows before the cashier commits.
pub fn preview_edit(db: &DbState, order_id: &str, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let (channel_str, stored_lines, deduction_rate, amount_paid): (String, String, f64, f64) =
        conn.query_row(
            "SELECT channel, lines, deduction_rate, amount_paid
             FROM orders WHERE id = ?1",
            params![order_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .map_err(|_| format!("Order not found: {order_id}"))?;

    let channel =
        Channel::parse(&channel_str).ok_or_else(|| format!("Corrupt channel: {channel_str}"))?;
    let original_lines: Vec<LineItem> =
        serde_json::from_str(&stored_lines).map_err(|e| format!("Corrupt order lines: {e}"))?;
    let revised = Cart::new(channel, deduction_rate, parse_lines(payload)?);

    let rec = pricing::reconcile(&original_lines, revised, amount_paid)
        .map_err(|e| e.to_string())?;
    Ok(serde_json::json!(rec))
}

// ---------------------------------------------------------------------------
// Status updates
// ---------------------------------------------------------------------------

/// Update an order's lifecycle status and enqueue `update-order-status/{id}`.
pub fn update_status(db: &DbState, order_id: &str, status: &str) -> Result<Value, String> {
    let status = status.trim().to_ascii_lowercase();
    if !VALID_STATUSES.contains(&status.as_str()) {
        return Err(format!(
            "Invalid status: {status}. Must be one of {VALID_STATUSES:?}"
        ));
    }

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let now = Utc::now().to_rfc3339();

    let updated = conn
        .execute(
            "UPDATE orders SET status = ?1, sync_status = 'pending', updated_at = ?2
             WHERE id = ?3",
            params![status, now, order_id],
        )
        .map_err(|e| format!("update order status: {e}"))?;
    if updated == 0 {
        return Err(format!("Order not found: {order_id}"));
    }

    let idempotency_key = format!("order-status:{order_id}:{}", Utc::now().timestamp_millis());
    let sync_payload = serde_json::json!({ "orderId": order_id, "status": status }).to_string();
    conn.execute(
        "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
         VALUES ('order_status', ?1, 'update', ?2, ?3)",
        params![order_id, sync_payload, idempotency_key],
    )
    .map_err(|e| format!("enqueue status sync: {e}"))?;

    info!(order_id = %order_id, status = %status, "Order status updated");
    Ok(serde_json::json!({ "success": true, "orderId": order_id, "status": status }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn row_to_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    let lines_raw: String = row.get(5)?;
    let lines: Value = serde_json::from_str(&lines_raw).unwrap_or_else(|_| Value::Array(vec![]));
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "orderNumber": row.get::<_, Option<String>>(1)?,
        "channel": row.get::<_, String>(2)?,
        "customerName": row.get::<_, Option<String>>(3)?,
        "tableNumber": row.get::<_, Option<String>>(4)?,
        "lines": lines,
        "subtotal": row.get::<_, f64>(6)?,
        "discountTotal": row.get::<_, f64>(7)?,
        "deductionRate": row.get::<_, f64>(8)?,
        "deductionAmount": row.get::<_, f64>(9)?,
        "netTotal": row.get::<_, f64>(10)?,
        "amountPaid": row.get::<_, f64>(11)?,
        "status": row.get::<_, String>(12)?,
        "notes": row.get::<_, Option<String>>(13)?,
        "syncStatus": row.get::<_, String>(14)?,
        "createdAt": row.get::<_, Option<String>>(15)?,
        "updatedAt": row.get::<_, Option<String>>(16)?,
    }))
}

const ORDER_COLUMNS: &str = "id, order_number, channel, customer_name, table_number, lines,
    subtotal, discount_total, deduction_rate, deduction_amount, net_total,
    amount_paid, status, notes, sync_status, created_at, updated_at";

/// Get all orders, newest first.
pub fn get_all_orders(db: &DbState) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC");
    let mut stmt = conn.prepare(&sql).map_err(|e| e.to_string())?;
    let rows = stmt.query_map([], row_to_order).map_err(|e| e.to_string())?;

    let mut orders = Vec::new();
    for row in rows {
        match row {
            Ok(order) => orders.push(order),
            Err(e) => warn!("skipping malformed order row: {e}"),
        }
    }
    Ok(orders)
}

/// Get a single order by id.
pub fn get_order_by_id(db: &DbState, order_id: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1");
    conn.query_row(&sql, params![order_id], row_to_order)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => format!("Order not found: {order_id}"),
            _ => format!("query order: {e}"),
        })
}

/// Revision history for an order, oldest first.
pub fn get_order_revisions(db: &DbState, order_id: &str) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, order_id, previous_lines, previous_total, new_total,
                    additional_payment, created_at
             FROM order_revisions WHERE order_id = ?1 ORDER BY created_at ASC",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![order_id], |row| {
            let prev_raw: String = row.get(2)?;
            let prev: Value =
                serde_json::from_str(&prev_raw).unwrap_or_else(|_| Value::Array(vec![]));
            Ok(serde_json::json!({
                "id": row.get::<_, String>(0)?,
                "orderId": row.get::<_, String>(1)?,
                "previousLines": prev,
                "previousTotal": row.get::<_, f64>(3)?,
                "newTotal": row.get::<_, f64>(4)?,
                "additionalPayment": row.get::<_, f64>(5)?,
                "createdAt": row.get::<_, String>(6)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let mut revisions = Vec::new();
    for row in rows {
        match row {
            Ok(r) => revisions.push(r),
            Err(e) => warn!("skipping malformed revision row: {e}"),
        }
    }
    Ok(revisions)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn order_payload() -> Value {
        serde_json::json!({
            "channel": "in_store",
            "customerName": "Walk-in",
            "lines": [
                { "kind": "unliWings", "itemId": "uw", "name": "Unli Wings",
                  "groupNo": 1, "baseAmount": 329.0, "quantity": 2 },
                { "kind": "alaCarte", "itemId": "rice", "name": "Garlic Rice",
                  "unitPrice": 25.0, "quantity": 2, "discountRate": 0.0 },
            ],
        })
    }

    #[test]
    fn test_create_order_prices_and_enqueues() {
        let db = db::test_db();
        let result = create_order(&db, &order_payload()).expect("create_order");
        assert_eq!(result["success"], true);
        let net = result["totals"]["netTotal"].as_f64().unwrap();
        assert!((net - 379.0).abs() < 1e-9);

        let conn = db.conn.lock().unwrap();
        let (net_total, amount_paid): (f64, f64) = conn
            .query_row(
                "SELECT net_total, amount_paid FROM orders LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!((net_total - 379.0).abs() < 1e-9);
        assert_eq!(net_total, amount_paid);

        let queued: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE entity_type = 'order'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(queued, 1);
    }

    #[test]
    fn test_create_order_applies_platform_deduction_from_settings() {
        let db = db::test_db();
        {
            let conn = db.conn.lock().unwrap();
            db::set_setting(&conn, "pricing", "grab_deduction_rate", "0.30").unwrap();
        }
        let mut payload = order_payload();
        payload["channel"] = Value::String("grab".into());
        let result = create_order(&db, &payload).unwrap();
        let totals = &result["totals"];
        assert!((totals["subtotal"].as_f64().unwrap() - 429.0).abs() < 1e-9);
        assert!((totals["deductionAmount"].as_f64().unwrap() - 429.0 * 0.30).abs() < 1e-9);
    }

    #[test]
    fn test_create_order_drops_zero_quantity_lines() {
        let db = db::test_db();
        let payload = serde_json::json!({
            "channel": "in_store",
            "lines": [
                { "kind": "alaCarte", "itemId": "rice", "name": "Rice",
                  "unitPrice": 25.0, "quantity": 0 },
                { "kind": "alaCarte", "itemId": "sisig", "name": "Sisig",
                  "unitPrice": 120.0, "quantity": 1 },
            ],
        });
        let result = create_order(&db, &payload).unwrap();
        let order = get_order_by_id(&db, result["orderId"].as_str().unwrap()).unwrap();
        assert_eq!(order["lines"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_create_order_rejects_empty_cart() {
        let db = db::test_db();
        let payload = serde_json::json!({ "channel": "in_store", "lines": [] });
        assert!(create_order(&db, &payload).is_err());
    }

    #[test]
    fn test_edit_order_collects_additional_payment() {
        let db = db::test_db();
        let created = create_order(&db, &order_payload()).unwrap();
        let order_id = created["orderId"].as_str().unwrap();

        // Add a second rice: +25.0 over the 379.0 already collected.
        let edit = serde_json::json!({
            "lines": [
                { "kind": "unliWings", "itemId": "uw", "name": "Unli Wings",
                  "groupNo": 1, "baseAmount": 329.0, "quantity": 2 },
                { "kind": "alaCarte", "itemId": "rice", "name": "Garlic Rice",
                  "unitPrice": 25.0, "quantity": 3, "discountRate": 0.0 },
            ],
        });
        let result = edit_order(&db, order_id, &edit).unwrap();
        assert_eq!(result["changed"], true);
        let rec = &result["reconciliation"];
        assert!((rec["additionalPaymentDue"].as_f64().unwrap() - 25.0).abs() < 1e-9);

        let order = get_order_by_id(&db, order_id).unwrap();
        assert!((order["amountPaid"].as_f64().unwrap() - 404.0).abs() < 1e-9);

        let revisions = get_order_revisions(&db, order_id).unwrap();
        assert_eq!(revisions.len(), 1);
        assert!((revisions[0]["additionalPayment"].as_f64().unwrap() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_edit_order_downward_never_refunds() {
        let db = db::test_db();
        let created = create_order(&db, &order_payload()).unwrap();
        let order_id = created["orderId"].as_str().unwrap();

        // Remove the rice entirely (quantity 0).
        let edit = serde_json::json!({
            "lines": [
                { "kind": "unliWings", "itemId": "uw", "name": "Unli Wings",
                  "groupNo": 1, "baseAmount": 329.0, "quantity": 2 },
                { "kind": "alaCarte", "itemId": "rice", "name": "Garlic Rice",
                  "unitPrice": 25.0, "quantity": 0 },
            ],
        });
        let result = edit_order(&db, order_id, &edit).unwrap();
        let rec = &result["reconciliation"];
        assert_eq!(rec["additionalPaymentDue"].as_f64().unwrap(), 0.0);
        assert_eq!(rec["removed"].as_array().unwrap().len(), 1);

        // Collected amount is retained; net total reflects the new cart.
        let order = get_order_by_id(&db, order_id).unwrap();
        assert!((order["amountPaid"].as_f64().unwrap() - 379.0).abs() < 1e-9);
        assert!((order["netTotal"].as_f64().unwrap() - 329.0).abs() < 1e-9);
    }

    #[test]
    fn test_edit_order_noop_when_lines_unchanged() {
        let db = db::test_db();
        let created = create_order(&db, &order_payload()).unwrap();
        let order_id = created["orderId"].as_str().unwrap();

        let result = edit_order(&db, order_id, &order_payload()).unwrap();
        assert_eq!(result["changed"], false);

        // No revision row and no extra queue entry for a no-op edit.
        let conn = db.conn.lock().unwrap();
        let revisions: i64 = conn
            .query_row("SELECT COUNT(*) FROM order_revisions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(revisions, 0);
    }

    #[test]
    fn test_edit_order_discount_only_change_persists() {
        let db = db::test_db();
        let created = create_order(&db, &order_payload()).unwrap();
        let order_id = created["orderId"].as_str().unwrap();

        // Same lines and quantities, but the rice now carries a 20% discount.
        let edit = serde_json::json!({
            "lines": [
                { "kind": "unliWings", "itemId": "uw", "name": "Unli Wings",
                  "groupNo": 1, "baseAmount": 329.0, "quantity": 2 },
                { "kind": "alaCarte", "itemId": "rice", "name": "Garlic Rice",
                  "unitPrice": 25.0, "quantity": 2, "discountRate": 0.2 },
            ],
        });
        let result = edit_order(&db, order_id, &edit).unwrap();
        assert_eq!(result["changed"], true);
        assert_eq!(
            result["reconciliation"]["additionalPaymentDue"].as_f64().unwrap(),
            0.0
        );

        let order = get_order_by_id(&db, order_id).unwrap();
        assert!((order["netTotal"].as_f64().unwrap() - 369.0).abs() < 1e-9);
        assert!((order["amountPaid"].as_f64().unwrap() - 379.0).abs() < 1e-9);
    }

    #[test]
    fn test_update_status_validates_and_enqueues() {
        let db = db::test_db();
        let created = create_order(&db, &order_payload()).unwrap();
        let order_id = created["orderId"].as_str().unwrap();

        assert!(update_status(&db, order_id, "sideways").is_err());
        assert!(update_status(&db, "missing-id", "completed").is_err());

        let result = update_status(&db, order_id, "Completed").unwrap();
        assert_eq!(result["status"], "completed");

        let order = get_order_by_id(&db, order_id).unwrap();
        assert_eq!(order["status"], "completed");
    }
}
