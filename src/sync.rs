//! Background sync engine for Wings POS.
//!
//! Drains the `sync_queue` table to the restaurant backend on a fixed
//! interval: orders to `add-order` / `edit-order/{id}` /
//! `update-order-status/{id}`, expenses to `add-expense`, disposals to
//! `dispose-item`, and queued menu edits to `add-menu` / `edit-menu/{id}`.
//! Entries retry with exponential backoff and are marked failed after
//! `max_retries`. Status events are emitted to the webview every cycle.

use chrono::{NaiveDateTime, Utc};
use rusqlite::params;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tauri::{AppHandle, Emitter};
use tracing::{debug, info, warn};

use crate::api;
use crate::db::DbState;
use crate::storage;

const DEFAULT_RETRY_DELAY_MS: i64 = 5_000;
const MAX_RETRY_DELAY_MS: i64 = 300_000;
/// Entries processed per cycle; the rest wait for the next tick.
const SYNC_BATCH_SIZE: usize = 25;

// ---------------------------------------------------------------------------
// Sync engine state (managed by Tauri)
// ---------------------------------------------------------------------------

/// Managed state for the background sync engine.
pub struct SyncState {
    pub is_running: Arc<AtomicBool>,
    pub last_sync: Arc<std::sync::Mutex<Option<String>>>,
}

impl SyncState {
    pub fn new() -> Self {
        Self {
            is_running: Arc::new(AtomicBool::new(false)),
            last_sync: Arc::new(std::sync::Mutex::new(None)),
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Endpoint routing
// ---------------------------------------------------------------------------

/// Map a queue entry to the backend path it syncs through.
fn endpoint_for(entity_type: &str, operation: &str, entity_id: &str) -> Result<String, String> {
    match (entity_type, operation) {
        ("order", "insert") => Ok("/api/add-order/".to_string()),
        ("order", "update") => Ok(format!("/api/edit-order/{entity_id}/")),
        ("order_status", "update") => Ok(format!("/api/update-order-status/{entity_id}/")),
        ("expense", "insert") => Ok("/api/add-expense/".to_string()),
        ("disposal", "insert") => Ok("/api/dispose-item/".to_string()),
        ("menu_item", "insert") => Ok("/api/add-menu/".to_string()),
        ("menu_item", "update") => Ok(format!("/api/edit-menu/{entity_id}/")),
        _ => Err(format!("No endpoint for {entity_type}/{operation}")),
    }
}

/// Entity tables whose `sync_status` mirrors the queue outcome.
fn entity_table(entity_type: &str) -> Option<&'static str> {
    match entity_type {
        "order" | "order_status" => Some("orders"),
        "expense" => Some("expenses"),
        "disposal" => Some("disposals"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff delay for a retry count, capped at five minutes.
fn backoff_delay_ms(retry_count: i64) -> i64 {
    let shift = retry_count.clamp(0, 16) as u32;
    (DEFAULT_RETRY_DELAY_MS.saturating_mul(1_i64 << shift)).min(MAX_RETRY_DELAY_MS)
}

/// Parse the SQLite `datetime('now')` format used in queue timestamps.
fn parse_queue_time(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// An entry is due when its backoff window since the last attempt elapsed.
fn entry_is_due(retry_count: i64, updated_at: &str, now: NaiveDateTime) -> bool {
    if retry_count == 0 {
        return true;
    }
    match parse_queue_time(updated_at) {
        Some(last) => {
            let elapsed_ms = (now - last).num_milliseconds();
            elapsed_ms >= backoff_delay_ms(retry_count)
        }
        // Unparseable timestamp: retry rather than wedge the entry forever.
        None => true,
    }
}

// ---------------------------------------------------------------------------
// Queue bookkeeping
// ---------------------------------------------------------------------------

struct QueueEntry {
    id: i64,
    entity_type: String,
    entity_id: String,
    operation: String,
    payload: String,
    retry_count: i64,
    max_retries: i64,
    updated_at: String,
}

fn load_pending_entries(db: &DbState) -> Result<Vec<QueueEntry>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT id, entity_type, entity_id, operation, payload,
                    retry_count, max_retries, updated_at
             FROM sync_queue
             WHERE status = 'pending'
             ORDER BY id ASC",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueueEntry {
                id: row.get(0)?,
                entity_type: row.get(1)?,
                entity_id: row.get(2)?,
                operation: row.get(3)?,
                payload: row.get(4)?,
                retry_count: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                max_retries: row.get::<_, Option<i64>>(6)?.unwrap_or(5),
                updated_at: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            })
        })
        .map_err(|e| e.to_string())?;

    let now = Utc::now().naive_utc();
    let mut entries = Vec::new();
    for row in rows {
        match row {
            Ok(entry) => {
                if entry_is_due(entry.retry_count, &entry.updated_at, now) {
                    entries.push(entry);
                }
            }
            Err(e) => warn!("skipping malformed queue row: {e}"),
        }
    }
    entries.truncate(SYNC_BATCH_SIZE);
    Ok(entries)
}

/// Mark a queue entry synced and mirror the outcome onto the entity row.
fn mark_entry_synced(db: &DbState, entry_id: i64, entity_type: &str, entity_id: &str) {
    let conn = match db.conn.lock() {
        Ok(c) => c,
        Err(e) => {
            warn!("queue lock failed: {e}");
            return;
        }
    };
    let _ = conn.execute(
        "UPDATE sync_queue SET status = 'synced', synced_at = datetime('now'),
            updated_at = datetime('now'), last_error = NULL
         WHERE id = ?1",
        params![entry_id],
    );
    if let Some(table) = entity_table(entity_type) {
        let sql =
            format!("UPDATE {table} SET sync_status = 'synced' WHERE id = ?1 OR remote_id = ?1");
        // disposals/expenses have no remote_id column; fall back to id-only.
        if conn.execute(&sql, params![entity_id]).is_err() {
            let sql = format!("UPDATE {table} SET sync_status = 'synced' WHERE id = ?1");
            let _ = conn.execute(&sql, params![entity_id]);
        }
    }
}

/// Record a failed attempt; the entry goes to `failed` after max_retries.
fn mark_entry_failed(db: &DbState, entry: &QueueEntry, error: &str) {
    let conn = match db.conn.lock() {
        Ok(c) => c,
        Err(e) => {
            warn!("queue lock failed: {e}");
            return;
        }
    };
    let next_retry = entry.retry_count + 1;
    let exhausted = next_retry >= entry.max_retries;
    let status = if exhausted { "failed" } else { "pending" };
    let _ = conn.execute(
        "UPDATE sync_queue SET status = ?1, retry_count = ?2,
            last_error = ?3, updated_at = datetime('now')
         WHERE id = ?4",
        params![status, next_retry, error, entry.id],
    );
    if exhausted {
        if let Some(table) = entity_table(&entry.entity_type) {
            let sql = format!("UPDATE {table} SET sync_status = 'failed' WHERE id = ?1");
            let _ = conn.execute(&sql, params![entry.entity_id]);
        }
        warn!(
            entry_id = entry.id,
            entity = %entry.entity_type,
            "sync entry exhausted retries: {error}"
        );
    }
}

/// Re-queue failed entries, clearing their retry counters.
pub fn retry_failed(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let requeued = conn
        .execute(
            "UPDATE sync_queue SET status = 'pending', retry_count = 0,
                last_error = NULL, updated_at = datetime('now')
             WHERE status = 'failed'",
            [],
        )
        .map_err(|e| format!("requeue failed entries: {e}"))?;
    info!(requeued, "failed sync entries requeued");
    Ok(serde_json::json!({ "success": true, "requeued": requeued }))
}

// ---------------------------------------------------------------------------
// Sync cycle
// ---------------------------------------------------------------------------

/// Process due queue entries once. Returns how many synced.
pub async fn run_sync_cycle(db: &DbState) -> Result<usize, String> {
    let entries = load_pending_entries(db)?;
    if entries.is_empty() {
        return Ok(0);
    }
    debug!(count = entries.len(), "processing sync queue batch");

    let mut synced = 0;
    for entry in entries {
        let path = match endpoint_for(&entry.entity_type, &entry.operation, &entry.entity_id) {
            Ok(p) => p,
            Err(e) => {
                // Unroutable entries would retry forever; fail them outright.
                mark_entry_failed(
                    db,
                    &QueueEntry {
                        retry_count: entry.max_retries,
                        ..entry
                    },
                    &e,
                );
                continue;
            }
        };
        let body: Value = match serde_json::from_str(&entry.payload) {
            Ok(v) => v,
            Err(e) => {
                // A corrupt payload never deserializes; retrying is pointless.
                mark_entry_failed(
                    db,
                    &QueueEntry {
                        retry_count: entry.max_retries,
                        ..entry
                    },
                    &format!("corrupt queue payload: {e}"),
                );
                continue;
            }
        };

        match api::backend_request(&path, "POST", Some(body)).await {
            Ok(_) => {
                mark_entry_synced(db, entry.id, &entry.entity_type, &entry.entity_id);
                synced += 1;
            }
            Err(e) => {
                if api::is_auth_failure(&e) {
                    // Token is dead; every remaining entry would fail the
                    // same way. Surface it and stop the cycle.
                    return Err(e);
                }
                mark_entry_failed(db, &entry, &e);
            }
        }
    }
    Ok(synced)
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Queue counts plus connectivity for the sync indicator.
pub fn get_sync_status(
    db: &DbState,
    last_sync: &std::sync::Mutex<Option<String>>,
    is_online: bool,
) -> Value {
    let (pending, failed) = match db.conn.lock() {
        Ok(conn) => {
            let pending: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            let failed: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sync_queue WHERE status = 'failed'",
                    [],
                    |row| row.get(0),
                )
                .unwrap_or(0);
            (pending, failed)
        }
        Err(_) => (0, 0),
    };

    let last = last_sync.lock().ok().and_then(|g| g.clone());

    serde_json::json!({
        "isOnline": is_online,
        "pendingCount": pending,
        "failedCount": failed,
        "lastSync": last,
    })
}

async fn check_network_online() -> bool {
    match storage::get_backend_url() {
        Some(url) => api::test_connectivity(&url).await.success,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Background sync loop
// ---------------------------------------------------------------------------

/// Start the background sync loop. Spawns a tokio task that runs every
/// `interval_secs` seconds, processing pending sync_queue entries in batches.
pub fn start_sync_loop(
    app: AppHandle,
    db: Arc<DbState>,
    sync_state: Arc<SyncState>,
    interval_secs: u64,
) {
    let is_running = sync_state.is_running.clone();
    let last_sync = sync_state.last_sync.clone();

    is_running.store(true, Ordering::SeqCst);

    tauri::async_runtime::spawn(async move {
        info!("Sync loop started (interval: {interval_secs}s)");
        let mut previous_network_online: Option<bool> = None;

        loop {
            if !is_running.load(Ordering::SeqCst) {
                info!("Sync loop stopped");
                break;
            }

            tokio::time::sleep(Duration::from_secs(interval_secs)).await;

            if !is_running.load(Ordering::SeqCst) {
                break;
            }

            let network_is_online = check_network_online().await;
            let _ = app.emit(
                "network_status",
                serde_json::json!({ "isOnline": network_is_online }),
            );

            // If the terminal has no backend or no session yet, still emit
            // sync status so UI indicators remain consistent.
            if !storage::is_configured() || !storage::is_logged_in() {
                previous_network_online = None;
                let status = get_sync_status(&db, &last_sync, network_is_online);
                let _ = app.emit("sync_status", &status);
                continue;
            }

            if !network_is_online {
                if previous_network_online != Some(false) {
                    info!("Network offline; deferring remote sync and keeping queue pending");
                }
                previous_network_online = Some(false);
                let status = get_sync_status(&db, &last_sync, false);
                let _ = app.emit("sync_status", &status);
                continue;
            }

            if previous_network_online == Some(false) {
                info!("Network restored; resuming queued sync");
            }
            previous_network_online = Some(true);

            match run_sync_cycle(&db).await {
                Ok(synced) => {
                    if synced > 0 {
                        info!("Sync cycle complete: {synced} items synced");
                    }
                    if let Ok(mut guard) = last_sync.lock() {
                        *guard = Some(Utc::now().to_rfc3339());
                    }
                }
                Err(e) => {
                    if api::is_auth_failure(&e) {
                        warn!("Sync halted on auth failure; prompting re-login");
                        let _ = app.emit("auth_required", serde_json::json!({ "reason": e }));
                    } else {
                        warn!("Sync cycle failed: {e}");
                    }
                }
            }

            let status = get_sync_status(&db, &last_sync, network_is_online);
            let _ = app.emit("sync_status", &status);
        }
    });
}

/// Trigger an immediate sync cycle (called by `sync_force`).
pub async fn force_sync(db: &DbState, sync_state: &SyncState) -> Result<Value, String> {
    if !storage::is_configured() {
        return Err("Terminal not configured".into());
    }

    let synced = run_sync_cycle(db).await?;
    info!("Force sync complete: {synced} items synced");

    if let Ok(mut guard) = sync_state.last_sync.lock() {
        *guard = Some(Utc::now().to_rfc3339());
    }

    Ok(serde_json::json!({ "success": true, "synced": synced }))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_endpoint_routing() {
        assert_eq!(endpoint_for("order", "insert", "o1").unwrap(), "/api/add-order/");
        assert_eq!(
            endpoint_for("order", "update", "o1").unwrap(),
            "/api/edit-order/o1/"
        );
        assert_eq!(
            endpoint_for("order_status", "update", "o1").unwrap(),
            "/api/update-order-status/o1/"
        );
        assert_eq!(
            endpoint_for("expense", "insert", "e1").unwrap(),
            "/api/add-expense/"
        );
        assert_eq!(
            endpoint_for("disposal", "insert", "d1").unwrap(),
            "/api/dispose-item/"
        );
        assert_eq!(
            endpoint_for("menu_item", "update", "m1").unwrap(),
            "/api/edit-menu/m1/"
        );
        assert!(endpoint_for("order", "delete", "o1").is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay_ms(0), 5_000);
        assert_eq!(backoff_delay_ms(1), 10_000);
        assert_eq!(backoff_delay_ms(3), 40_000);
        assert_eq!(backoff_delay_ms(10), MAX_RETRY_DELAY_MS);
        assert_eq!(backoff_delay_ms(60), MAX_RETRY_DELAY_MS);
    }

    #[test]
    fn test_entry_is_due_respects_backoff() {
        let now = Utc::now().naive_utc();
        // First attempt is always due.
        assert!(entry_is_due(0, "", now));

        // One retry: 10s backoff. 5s ago is too soon, 15s ago is due.
        let five_ago = (now - chrono::Duration::seconds(5))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let fifteen_ago = (now - chrono::Duration::seconds(15))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        assert!(!entry_is_due(1, &five_ago, now));
        assert!(entry_is_due(1, &fifteen_ago, now));

        // Garbage timestamps retry rather than wedge.
        assert!(entry_is_due(3, "not-a-date", now));
    }

    fn queue_counts(db: &db::DbState) -> (i64, i64, i64) {
        let conn = db.conn.lock().unwrap();
        let count = |status: &str| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status = ?1",
                params![status],
                |row| row.get(0),
            )
            .unwrap()
        };
        (count("pending"), count("synced"), count("failed"))
    }

    #[test]
    fn test_mark_synced_updates_queue_and_entity() {
        let db = db::test_db();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO orders (id, lines, status, sync_status) VALUES ('o1', '[]', 'pending', 'pending')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
                 VALUES ('order', 'o1', 'insert', '{}', 'k1')",
                [],
            )
            .unwrap();
        }

        mark_entry_synced(&db, 1, "order", "o1");

        assert_eq!(queue_counts(&db), (0, 1, 0));
        let conn = db.conn.lock().unwrap();
        let entity_status: String = conn
            .query_row("SELECT sync_status FROM orders WHERE id = 'o1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(entity_status, "synced");
    }

    #[test]
    fn test_mark_failed_exhausts_after_max_retries() {
        let db = db::test_db();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO expenses (id, expense_date, description, amount) VALUES ('e1', '2026-08-05', 'x', 1.0)",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key, retry_count, max_retries)
                 VALUES ('expense', 'e1', 'insert', '{}', 'k1', 0, 2)",
                [],
            )
            .unwrap();
        }

        let entry = QueueEntry {
            id: 1,
            entity_type: "expense".into(),
            entity_id: "e1".into(),
            operation: "insert".into(),
            payload: "{}".into(),
            retry_count: 0,
            max_retries: 2,
            updated_at: String::new(),
        };
        mark_entry_failed(&db, &entry, "boom");
        assert_eq!(queue_counts(&db), (1, 0, 0));

        let entry = QueueEntry {
            retry_count: 1,
            ..entry
        };
        mark_entry_failed(&db, &entry, "boom again");
        assert_eq!(queue_counts(&db), (0, 0, 1));

        // Entity mirrors the failure, and retry_failed requeues it.
        {
            let conn = db.conn.lock().unwrap();
            let status: String = conn
                .query_row("SELECT sync_status FROM expenses WHERE id = 'e1'", [], |row| {
                    row.get(0)
                })
                .unwrap();
            assert_eq!(status, "failed");
        }
        let result = retry_failed(&db).unwrap();
        assert_eq!(result["requeued"], 1);
        assert_eq!(queue_counts(&db), (1, 0, 0));
    }

    #[test]
    fn test_load_pending_skips_backed_off_entries() {
        let db = db::test_db();
        {
            let conn = db.conn.lock().unwrap();
            // Fresh entry: due immediately.
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
                 VALUES ('order', 'o1', 'insert', '{}', 'k1')",
                [],
            )
            .unwrap();
            // Recently failed entry: still inside its 10s backoff window.
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key, retry_count, updated_at)
                 VALUES ('order', 'o2', 'insert', '{}', 'k2', 1, datetime('now'))",
                [],
            )
            .unwrap();
        }
        let entries = load_pending_entries(&db).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entity_id, "o1");
    }

    #[test]
    fn test_get_sync_status_counts() {
        let db = db::test_db();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key, status)
                 VALUES ('order', 'o1', 'insert', '{}', 'k1', 'pending')",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key, status)
                 VALUES ('order', 'o2', 'insert', '{}', 'k2', 'failed')",
                [],
            )
            .unwrap();
        }
        let last_sync = std::sync::Mutex::new(Some("2026-08-05T00:00:00Z".to_string()));
        let status = get_sync_status(&db, &last_sync, true);
        assert_eq!(status["pendingCount"], 1);
        assert_eq!(status["failedCount"], 1);
        assert_eq!(status["isOnline"], true);
        assert_eq!(status["lastSync"], "2026-08-05T00:00:00Z");
    }
}
