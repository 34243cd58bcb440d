//! Sales reporting for Wings POS.
//!
//! Aggregates the local `orders` and `expenses` tables into the numbers the
//! back-office screens show: daily statistics, sales trend, channel
//! breakdown (in-store vs Grab vs FoodPanda with platform deductions), and
//! top items. Also fetches the backend's canonical sales data and writes CSV
//! exports of a sales period.

use chrono::{Duration, Local};
use csv::WriterBuilder;
use rusqlite::params;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::api;
use crate::db::DbState;
use crate::pricing::LineItem;

fn is_cancelled_status(status: &str) -> bool {
    matches!(status.to_ascii_lowercase().as_str(), "cancelled" | "canceled")
}

/// Default report date: today in the terminal's local timezone.
pub fn resolve_report_date(optional_date: Option<String>) -> String {
    optional_date
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| Local::now().format("%Y-%m-%d").to_string())
}

// ---------------------------------------------------------------------------
// Daily statistics
// ---------------------------------------------------------------------------

/// Statistics for a single `YYYY-MM-DD` day: order count, gross/net sales,
/// discounts, platform deductions, expenses, and a per-channel breakdown.
pub fn today_statistics(db: &DbState, date: &str) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT channel, subtotal, discount_total, deduction_amount,
                    net_total, status
             FROM orders WHERE substr(created_at, 1, 10) = ?1",
        )
        .map_err(|e| e.to_string())?;

    type StatRow = (String, f64, f64, f64, f64, String);
    let rows: Vec<StatRow> = stmt
        .query_map(params![date], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    let mut orders_count = 0i64;
    let mut cancelled_count = 0i64;
    let mut gross = 0.0;
    let mut discounts = 0.0;
    let mut deductions = 0.0;
    let mut net = 0.0;
    let mut by_channel: HashMap<String, (i64, f64, f64)> = HashMap::new();

    for (channel, subtotal, discount, deduction, net_total, status) in rows {
        if is_cancelled_status(&status) {
            cancelled_count += 1;
            continue;
        }
        orders_count += 1;
        gross += subtotal;
        discounts += discount;
        deductions += deduction;
        net += net_total;
        let entry = by_channel.entry(channel).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += deduction;
        entry.2 += net_total;
    }

    let expenses: f64 = conn
        .query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses WHERE expense_date = ?1",
            params![date],
            |row| row.get(0),
        )
        .unwrap_or(0.0);

    let channels: Value = by_channel
        .into_iter()
        .map(|(channel, (count, deduction, channel_net))| {
            serde_json::json!({
                "channel": channel,
                "orders": count,
                "deductionAmount": deduction,
                "netSales": channel_net,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "date": date,
        "ordersCount": orders_count,
        "cancelledCount": cancelled_count,
        "grossSales": gross,
        "discountTotal": discounts,
        "deductionTotal": deductions,
        "netSales": net,
        "expenseTotal": expenses,
        "netAfterExpenses": net - expenses,
        "channels": channels,
    }))
}

// ---------------------------------------------------------------------------
// Sales trend
// ---------------------------------------------------------------------------

/// Per-day net sales and order counts for the trailing `days` days
/// (including today), oldest first.
pub fn sales_trend(db: &DbState, days: i64) -> Result<Vec<Value>, String> {
    let days = days.clamp(1, 90);
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut out = Vec::with_capacity(days as usize);
    let today = Local::now().date_naive();
    for offset in (0..days).rev() {
        let day = (today - Duration::days(offset)).format("%Y-%m-%d").to_string();
        let (count, net): (i64, f64) = conn
            .query_row(
                "SELECT COUNT(*), COALESCE(SUM(net_total), 0)
                 FROM orders
                 WHERE substr(created_at, 1, 10) = ?1
                   AND status NOT IN ('cancelled', 'canceled')",
                params![day],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap_or((0, 0.0));
        out.push(serde_json::json!({
            "date": day,
            "orders": count,
            "netSales": net,
        }));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Top items
// ---------------------------------------------------------------------------

/// Quantity and revenue per item for a day. Ala Carte revenue is the
/// discounted line total; Unli Wings lines count quantities only, since the
/// group's flat rate is not attributable to individual flavors.
pub fn top_items(db: &DbState, date: &str, limit: usize) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let mut stmt = conn
        .prepare(
            "SELECT lines FROM orders
             WHERE substr(created_at, 1, 10) = ?1
               AND status NOT IN ('cancelled', 'canceled')",
        )
        .map_err(|e| e.to_string())?;
    let line_blobs: Vec<String> = stmt
        .query_map(params![date], |row| row.get(0))
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    let mut totals: HashMap<String, (i64, f64)> = HashMap::new();
    for blob in line_blobs {
        let lines: Vec<LineItem> = match serde_json::from_str(&blob) {
            Ok(lines) => lines,
            Err(e) => {
                warn!("skipping order with malformed lines: {e}");
                continue;
            }
        };
        for line in lines {
            match line {
                LineItem::AlaCarte {
                    name,
                    unit_price,
                    quantity,
                    discount_rate,
                    ..
                } => {
                    let entry = totals.entry(name).or_insert((0, 0.0));
                    entry.0 += quantity;
                    entry.1 += unit_price * quantity as f64 * (1.0 - discount_rate);
                }
                LineItem::UnliWings { name, quantity, .. } => {
                    let entry = totals.entry(name).or_insert((0, 0.0));
                    entry.0 += quantity;
                }
            }
        }
    }

    let mut items: Vec<(String, i64, f64)> = totals
        .into_iter()
        .map(|(name, (qty, revenue))| (name, qty, revenue))
        .collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    items.truncate(limit);

    Ok(items
        .into_iter()
        .map(|(name, qty, revenue)| {
            serde_json::json!({ "name": name, "quantity": qty, "revenue": revenue })
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Remote sales data
// ---------------------------------------------------------------------------

/// Fetch the backend's canonical sales data for a period. The backend is the
/// source of truth across terminals; local aggregates cover offline review.
pub async fn fetch_remote_sales(from: &str, to: &str) -> Result<Value, String> {
    let path = format!("/api/fetch-sales-data/?from={from}&to={to}");
    api::backend_request(&path, "GET", None).await
}

// ---------------------------------------------------------------------------
// CSV export
// ---------------------------------------------------------------------------

/// Export all orders in an inclusive date range to a CSV file under
/// `export_dir`. Returns the written path.
pub fn export_sales_csv(
    db: &DbState,
    from: &str,
    to: &str,
    export_dir: &Path,
) -> Result<PathBuf, String> {
    std::fs::create_dir_all(export_dir).map_err(|e| format!("create export dir: {e}"))?;
    let file_name = format!("sales_{from}_{to}.csv");
    let path = export_dir.join(file_name);

    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT order_number, created_at, channel, subtotal, discount_total,
                    deduction_amount, net_total, status
             FROM orders
             WHERE substr(created_at, 1, 10) >= ?1 AND substr(created_at, 1, 10) <= ?2
             ORDER BY created_at ASC",
        )
        .map_err(|e| e.to_string())?;

    type ExportRow = (Option<String>, String, String, f64, f64, f64, f64, String);
    let rows: Vec<ExportRow> = stmt
        .query_map(params![from, to], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })
        .map_err(|e| e.to_string())?
        .filter_map(|r| r.ok())
        .collect();

    let mut writer = WriterBuilder::new()
        .from_path(&path)
        .map_err(|e| format!("open csv: {e}"))?;
    writer
        .write_record([
            "order_number",
            "created_at",
            "channel",
            "subtotal",
            "discount",
            "deduction",
            "net_total",
            "status",
        ])
        .map_err(|e| format!("write csv header: {e}"))?;

    let count = rows.len();
    for (number, created_at, channel, subtotal, discount, deduction, net, status) in rows {
        writer
            .write_record([
                number.unwrap_or_default(),
                created_at,
                channel,
                format!("{subtotal:.2}"),
                format!("{discount:.2}"),
                format!("{deduction:.2}"),
                format!("{net:.2}"),
                status,
            ])
            .map_err(|e| format!("write csv row: {e}"))?;
    }
    writer.flush().map_err(|e| format!("flush csv: {e}"))?;

    info!(path = %path.display(), rows = count, "sales CSV exported");
    Ok(path)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn insert_order(
        db: &DbState,
        id: &str,
        channel: &str,
        subtotal: f64,
        deduction: f64,
        status: &str,
        created_at: &str,
        lines: &str,
    ) {
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO orders (id, order_number, channel, lines, subtotal,
                discount_total, deduction_rate, deduction_amount, net_total,
                amount_paid, status, sync_status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, ?6, ?7, ?7, ?8, 'synced', ?9, ?9)",
            params![
                id,
                format!("W-{id}"),
                channel,
                lines,
                subtotal,
                deduction,
                subtotal - deduction,
                status,
                created_at,
            ],
        )
        .unwrap();
    }

    const WINGS_LINES: &str = r#"[
        {"kind":"unliWings","itemId":"uw","name":"Unli Wings","groupNo":1,"baseAmount":329.0,"quantity":3},
        {"kind":"alaCarte","itemId":"rice","name":"Garlic Rice","unitPrice":25.0,"quantity":2,"discountRate":0.0}
    ]"#;

    #[test]
    fn test_today_statistics_excludes_cancelled_and_splits_channels() {
        let db = db::test_db();
        insert_order(&db, "o1", "in_store", 379.0, 0.0, "completed", "2026-08-05T10:00:00Z", "[]");
        insert_order(&db, "o2", "grab", 400.0, 100.0, "completed", "2026-08-05T11:00:00Z", "[]");
        insert_order(&db, "o3", "in_store", 99.0, 0.0, "cancelled", "2026-08-05T12:00:00Z", "[]");
        insert_order(&db, "o4", "in_store", 50.0, 0.0, "completed", "2026-08-04T10:00:00Z", "[]");

        let stats = today_statistics(&db, "2026-08-05").unwrap();
        assert_eq!(stats["ordersCount"], 2);
        assert_eq!(stats["cancelledCount"], 1);
        assert_eq!(stats["grossSales"], 779.0);
        assert_eq!(stats["deductionTotal"], 100.0);
        assert_eq!(stats["netSales"], 679.0);

        let channels = stats["channels"].as_array().unwrap();
        assert_eq!(channels.len(), 2);
        let grab = channels
            .iter()
            .find(|c| c["channel"] == "grab")
            .expect("grab channel present");
        assert_eq!(grab["orders"], 1);
        assert_eq!(grab["deductionAmount"], 100.0);
        assert_eq!(grab["netSales"], 300.0);
    }

    #[test]
    fn test_today_statistics_subtracts_expenses() {
        let db = db::test_db();
        insert_order(&db, "o1", "in_store", 500.0, 0.0, "completed", "2026-08-05T10:00:00Z", "[]");
        crate::expenses::record_expense(
            &db,
            &serde_json::json!({
                "amount": 120.0,
                "description": "ice",
                "expenseDate": "2026-08-05",
            }),
        )
        .unwrap();

        let stats = today_statistics(&db, "2026-08-05").unwrap();
        assert_eq!(stats["expenseTotal"], 120.0);
        assert_eq!(stats["netAfterExpenses"], 380.0);
    }

    #[test]
    fn test_top_items_counts_unli_quantities_without_revenue() {
        let db = db::test_db();
        insert_order(&db, "o1", "in_store", 379.0, 0.0, "completed", "2026-08-05T10:00:00Z", WINGS_LINES);
        insert_order(&db, "o2", "in_store", 379.0, 0.0, "completed", "2026-08-05T11:00:00Z", WINGS_LINES);

        let items = top_items(&db, "2026-08-05", 10).unwrap();
        assert_eq!(items[0]["name"], "Unli Wings");
        assert_eq!(items[0]["quantity"], 6);
        assert_eq!(items[0]["revenue"], 0.0);
        assert_eq!(items[1]["name"], "Garlic Rice");
        assert_eq!(items[1]["quantity"], 4);
        assert_eq!(items[1]["revenue"], 100.0);
    }

    #[test]
    fn test_export_sales_csv_writes_rows() {
        let db = db::test_db();
        insert_order(&db, "o1", "grab", 400.0, 100.0, "completed", "2026-08-05T10:00:00Z", "[]");
        insert_order(&db, "o2", "in_store", 100.0, 0.0, "completed", "2026-08-06T10:00:00Z", "[]");
        insert_order(&db, "o3", "in_store", 55.0, 0.0, "completed", "2026-09-01T10:00:00Z", "[]");

        let dir = std::env::temp_dir().join(format!("wings-pos-test-{}", uuid::Uuid::new_v4()));
        let path = export_sales_csv(&db, "2026-08-01", "2026-08-31", &dir).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 august orders
        assert!(lines[0].starts_with("order_number,"));
        assert!(lines[1].contains("grab"));
        assert!(lines[1].contains("300.00"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
