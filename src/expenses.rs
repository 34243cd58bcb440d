//! Expense tracking for Wings POS.
//!
//! Records back-office expenses locally and enqueues them for sync to the
//! backend's `add-expense` endpoint. Listing supports date ranges and
//! monthly rollups for the expense review screen.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::DbState;

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(String::from)
}

fn num_field(v: &Value, key: &str) -> Option<f64> {
    v.get(key).and_then(Value::as_f64)
}

// ---------------------------------------------------------------------------
// Record expense
// ---------------------------------------------------------------------------

/// Record an expense.
///
/// Inserts into `expenses` and enqueues a sync entry in one transaction.
pub fn record_expense(db: &DbState, payload: &Value) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let amount = num_field(payload, "amount").ok_or("Missing amount")?;
    if amount <= 0.0 {
        return Err("Amount must be positive".into());
    }
    let description = str_field(payload, "description")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or("Missing description")?;
    let category = str_field(payload, "category").unwrap_or_else(|| "other".to_string());
    let expense_date = str_field(payload, "expenseDate")
        .or_else(|| str_field(payload, "expense_date"))
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());
    let receipt_number =
        str_field(payload, "receiptNumber").or_else(|| str_field(payload, "receipt_number"));

    let expense_id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute_batch("BEGIN IMMEDIATE")
        .map_err(|e| format!("begin transaction: {e}"))?;

    let result = (|| -> Result<(), String> {
        conn.execute(
            "INSERT INTO expenses (
                id, expense_date, category, description, amount,
                receipt_number, sync_status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
            params![
                expense_id,
                expense_date,
                category,
                description,
                amount,
                receipt_number,
                now,
            ],
        )
        .map_err(|e| format!("insert expense: {e}"))?;

        let idempotency_key = format!("expense:{expense_id}");
        let sync_payload = serde_json::json!({
            "expenseId": expense_id,
            "expenseDate": expense_date,
            "category": category,
            "description": description,
            "amount": amount,
            "receiptNumber": receipt_number,
        })
        .to_string();

        conn.execute(
            "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
             VALUES ('expense', ?1, 'insert', ?2, ?3)",
            params![expense_id, sync_payload, idempotency_key],
        )
        .map_err(|e| format!("enqueue expense sync: {e}"))?;

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

    info!(expense_id = %expense_id, amount = %amount, "Expense recorded");

    Ok(serde_json::json!({
        "success": true,
        "expenseId": expense_id,
        "message": format!("Expense of {:.2} recorded", amount),
    }))
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn row_to_expense(row: &rusqlite::Row<'_>) -> rusqlite::Result<Value> {
    Ok(serde_json::json!({
        "id": row.get::<_, String>(0)?,
        "expenseDate": row.get::<_, String>(1)?,
        "category": row.get::<_, String>(2)?,
        "description": row.get::<_, String>(3)?,
        "amount": row.get::<_, f64>(4)?,
        "receiptNumber": row.get::<_, Option<String>>(5)?,
        "syncStatus": row.get::<_, String>(6)?,
        "createdAt": row.get::<_, String>(7)?,
        "updatedAt": row.get::<_, String>(8)?,
    }))
}

/// List expenses inside an inclusive `YYYY-MM-DD` date range, newest first.
pub fn list_expenses(db: &DbState, from: &str, to: &str) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, expense_date, category, description, amount,
                    receipt_number, sync_status, created_at, updated_at
             FROM expenses
             WHERE expense_date >= ?1 AND expense_date <= ?2
             ORDER BY expense_date DESC, created_at DESC",
        )
        .map_err(|e| e.to_string())?;

    let rows = stmt
        .query_map(params![from, to], row_to_expense)
        .map_err(|e| e.to_string())?;

    let mut expenses = Vec::new();
    for row in rows {
        match row {
            Ok(expense) => expenses.push(expense),
            Err(e) => warn!("skipping malformed expense row: {e}"),
        }
    }
    Ok(expenses)
}

/// Monthly rollup for `YYYY-MM`: total plus per-category subtotals.
pub fn month_summary(db: &DbState, month: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let prefix = format!("{month}-%");

    let total: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses WHERE expense_date LIKE ?1",
            params![prefix],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT category, SUM(amount), COUNT(*)
             FROM expenses WHERE expense_date LIKE ?1
             GROUP BY category ORDER BY SUM(amount) DESC",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![prefix], |row| {
            Ok(serde_json::json!({
                "category": row.get::<_, String>(0)?,
                "amount": row.get::<_, f64>(1)?,
                "count": row.get::<_, i64>(2)?,
            }))
        })
        .map_err(|e| e.to_string())?;

    let categories: Vec<Value> = rows.filter_map(|r| r.ok()).collect();

    Ok(serde_json::json!({
        "month": month,
        "total": total,
        "categories": categories,
    }))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_record_and_list_expenses() {
        let db = db::test_db();
        let payload = serde_json::json!({
            "amount": 1500.0,
            "description": "Chicken delivery",
            "category": "supplies",
            "expenseDate": "2026-08-03",
            "receiptNumber": "RCPT-88",
        });
        let result = record_expense(&db, &payload).expect("record_expense");
        assert_eq!(result["success"], true);

        let listed = list_expenses(&db, "2026-08-01", "2026-08-31").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["description"], "Chicken delivery");
        assert_eq!(listed[0]["amount"], 1500.0);

        let out_of_range = list_expenses(&db, "2026-07-01", "2026-07-31").unwrap();
        assert!(out_of_range.is_empty());

        // Sync entry was queued
        let conn = db.conn.lock().unwrap();
        let queued: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE entity_type = 'expense'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(queued, 1);
    }

    #[test]
    fn test_record_expense_validation() {
        let db = db::test_db();
        let no_amount = serde_json::json!({ "description": "x" });
        assert!(record_expense(&db, &no_amount).is_err());

        let negative = serde_json::json!({ "amount": -5.0, "description": "x" });
        assert!(record_expense(&db, &negative).is_err());

        let blank_description = serde_json::json!({ "amount": 10.0, "description": "   " });
        assert!(record_expense(&db, &blank_description).is_err());
    }

    #[test]
    fn test_month_summary_groups_by_category() {
        let db = db::test_db();
        for (amount, category, date) in [
            (1000.0, "supplies", "2026-08-01"),
            (500.0, "supplies", "2026-08-15"),
            (250.0, "utilities", "2026-08-20"),
            (999.0, "supplies", "2026-07-30"),
        ] {
            let payload = serde_json::json!({
                "amount": amount,
                "description": "entry",
                "category": category,
                "expenseDate": date,
            });
            record_expense(&db, &payload).unwrap();
        }

        let summary = month_summary(&db, "2026-08").unwrap();
        assert_eq!(summary["total"], 1750.0);
        let categories = summary["categories"].as_array().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0]["category"], "supplies");
        assert_eq!(categories[0]["amount"], 1500.0);
        assert_eq!(categories[0]["count"], 2);
    }
}
