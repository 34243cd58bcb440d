//! Menu cache layer for Wings POS.
//!
//! Reads cached menu data (categories, items) from the local SQLite
//! `menu_cache` table, refreshes it from the restaurant backend, and pushes
//! menu edits to `add-menu` / `edit-menu/{id}`. When the backend is
//! unreachable, edits are queued in `sync_queue` and the cache is updated
//! optimistically so the terminal keeps selling.

use chrono::Utc;
use rusqlite::params;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::api;
use crate::db::DbState;

// ---------------------------------------------------------------------------
// Cache readers
// ---------------------------------------------------------------------------

/// Read a cached menu array by key. Returns an empty array on miss or error.
fn read_cache(db: &DbState, cache_key: &str) -> Vec<Value> {
    let conn = match db.conn.lock() {
        Ok(c) => c,
        Err(e) => {
            error!("menu cache lock failed: {e}");
            return vec![];
        }
    };

    let json_str: Option<String> = conn
        .query_row(
            "SELECT data FROM menu_cache WHERE cache_key = ?1",
            params![cache_key],
            |row| row.get(0),
        )
        .ok();

    match json_str {
        Some(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Array(arr)) => arr,
            Ok(other) => {
                warn!("menu_cache[{cache_key}] is not an array, wrapping");
                vec![other]
            }
            Err(e) => {
                error!("menu_cache[{cache_key}] JSON parse error: {e}");
                vec![]
            }
        },
        None => vec![],
    }
}

fn write_cache(db: &DbState, cache_key: &str, data: &Value, version: &str) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO menu_cache (cache_key, data, version, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(cache_key)
         DO UPDATE SET data = excluded.data,
                       version = excluded.version,
                       updated_at = excluded.updated_at",
        params![cache_key, data.to_string(), version, Utc::now().to_rfc3339()],
    )
    .map_err(|e| format!("write menu cache {cache_key}: {e}"))?;
    Ok(())
}

/// Get cached menu categories.
pub fn get_categories(db: &DbState) -> Vec<Value> {
    read_cache(db, "categories")
}

/// Get cached menu items.
pub fn get_items(db: &DbState) -> Vec<Value> {
    read_cache(db, "items")
}

/// True when nothing has been cached yet (fresh install or post-reset).
pub fn cache_is_empty(db: &DbState) -> bool {
    get_categories(db).is_empty() && get_items(db).is_empty()
}

fn section_or_empty(data: &Value, key: &str) -> Value {
    data.get(key)
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()))
}

/// Compute a stable local version from the actual menu sections we cache.
/// This avoids treating response timestamps as menu-version changes.
fn compute_menu_payload_version(data: &Value) -> String {
    let snapshot = serde_json::json!({
        "categories": section_or_empty(data, "categories"),
        "items": section_or_empty(data, "items"),
    });

    let serialized = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    format!("digest:{:016x}", hasher.finish())
}

// ---------------------------------------------------------------------------
// Refresh from backend
// ---------------------------------------------------------------------------

/// Fetch menu data from the backend and update the local cache.
///
/// Calls `GET /api/fetch-menu-data/` and upserts the categories and items
/// sections into `menu_cache`. Returns `{ updated, version, counts }`.
pub async fn refresh_menu(db: &DbState) -> Result<Value, String> {
    let resp = api::backend_request("/api/fetch-menu-data/", "GET", None).await?;

    let version = compute_menu_payload_version(&resp);
    let previous_version: Option<String> = {
        let conn = db.conn.lock().map_err(|e| e.to_string())?;
        conn.query_row(
            "SELECT version FROM menu_cache WHERE cache_key = 'items'",
            [],
            |row| row.get(0),
        )
        .ok()
        .flatten()
    };

    let categories = section_or_empty(&resp, "categories");
    let items = section_or_empty(&resp, "items");
    let counts = serde_json::json!({
        "categories": categories.as_array().map(Vec::len).unwrap_or(0),
        "items": items.as_array().map(Vec::len).unwrap_or(0),
    });

    let updated = previous_version.as_deref() != Some(version.as_str());
    if updated {
        write_cache(db, "categories", &categories, &version)?;
        write_cache(db, "items", &items, &version)?;
        info!(version = %version, "menu cache refreshed");
    }

    Ok(serde_json::json!({
        "updated": updated,
        "version": version,
        "counts": counts,
    }))
}

// ---------------------------------------------------------------------------
// Menu management
// ---------------------------------------------------------------------------

fn validate_menu_payload(payload: &Value) -> Result<(), String> {
    let name = payload
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err("Missing menu item name".into());
    }
    if let Some(price) = payload.get("price").and_then(Value::as_f64) {
        if price < 0.0 {
            return Err("Price must not be negative".into());
        }
    }
    Ok(())
}

/// Upsert a single item into the cached `items` array by id.
fn upsert_cached_item(db: &DbState, item: &Value) -> Result<(), String> {
    let mut items = get_items(db);
    let id = item.get("id").and_then(Value::as_str).unwrap_or_default();
    let mut replaced = false;
    for existing in items.iter_mut() {
        if existing.get("id").and_then(Value::as_str) == Some(id) {
            *existing = item.clone();
            replaced = true;
            break;
        }
    }
    if !replaced {
        items.push(item.clone());
    }
    let items = Value::Array(items);
    let version = format!("local:{}", Utc::now().timestamp_millis());
    write_cache(db, "items", &items, &version)
}

fn enqueue_menu_sync(
    db: &DbState,
    entity_id: &str,
    operation: &str,
    payload: &Value,
) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let idempotency_key = format!("menu:{entity_id}:{}", Utc::now().timestamp_millis());
    conn.execute(
        "INSERT INTO sync_queue (entity_type, entity_id, operation, payload, idempotency_key)
         VALUES ('menu_item', ?1, ?2, ?3, ?4)",
        params![entity_id, operation, payload.to_string(), idempotency_key],
    )
    .map_err(|e| format!("enqueue menu sync: {e}"))?;
    Ok(())
}

/// Create a menu item: POST to `add-menu`, falling back to the sync queue
/// when the backend is unreachable. The cache is updated either way.
pub async fn add_menu_item(db: &DbState, payload: &Value) -> Result<Value, String> {
    validate_menu_payload(payload)?;

    let mut item = payload.clone();
    if item.get("id").and_then(Value::as_str).is_none() {
        item["id"] = Value::String(Uuid::new_v4().to_string());
    }
    let item_id = item["id"].as_str().unwrap_or_default().to_string();

    let mut queued = false;
    match api::backend_request("/api/add-menu/", "POST", Some(item.clone())).await {
        Ok(resp) => {
            // Prefer the backend's canonical record when it returns one.
            if resp.is_object() && resp.get("id").is_some() {
                item = resp;
            }
        }
        Err(e) => {
            if api::is_auth_failure(&e) {
                return Err(e);
            }
            warn!("add-menu failed, queueing for sync: {e}");
            enqueue_menu_sync(db, &item_id, "insert", &item)?;
            queued = true;
        }
    }

    upsert_cached_item(db, &item)?;
    info!(item_id = %item_id, queued = queued, "menu item added");

    Ok(serde_json::json!({ "success": true, "item": item, "queued": queued }))
}

/// Update a menu item: POST to `edit-menu/{id}` with queue fallback.
pub async fn edit_menu_item(db: &DbState, item_id: &str, payload: &Value) -> Result<Value, String> {
    validate_menu_payload(payload)?;
    let item_id = item_id.trim();
    if item_id.is_empty() {
        return Err("Missing menu item id".into());
    }

    let mut item = payload.clone();
    item["id"] = Value::String(item_id.to_string());

    let mut queued = false;
    let path = format!("/api/edit-menu/{item_id}/");
    match api::backend_request(&path, "POST", Some(item.clone())).await {
        Ok(resp) => {
            if resp.is_object() && resp.get("id").is_some() {
                item = resp;
            }
        }
        Err(e) => {
            if api::is_auth_failure(&e) {
                return Err(e);
            }
            warn!("edit-menu failed, queueing for sync: {e}");
            enqueue_menu_sync(db, item_id, "update", &item)?;
            queued = true;
        }
    }

    upsert_cached_item(db, &item)?;
    info!(item_id = %item_id, queued = queued, "menu item updated");

    Ok(serde_json::json!({ "success": true, "item": item, "queued": queued }))
}

// ---------------------------------------------------------------------------
// Inventory check
// ---------------------------------------------------------------------------

/// Ask the backend whether an item is in stock before order entry.
///
/// A failed or unreachable check degrades to "available": unknown stock never
/// blocks an order.
pub async fn check_inventory(item_id: &str) -> Value {
    let item_id = item_id.trim();
    let path = format!("/api/check-menu-inventory/{item_id}/");
    match api::backend_request(&path, "GET", None).await {
        Ok(resp) => {
            let available = resp
                .get("available")
                .or_else(|| resp.get("inStock"))
                .and_then(Value::as_bool)
                .unwrap_or(true);
            serde_json::json!({ "available": available, "checked": true })
        }
        Err(e) => {
            warn!(item_id = %item_id, "inventory check failed, allowing: {e}");
            serde_json::json!({ "available": true, "checked": false })
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_cache_read_empty_and_write() {
        let db = db::test_db();
        assert!(get_items(&db).is_empty());
        assert!(cache_is_empty(&db));

        let items = serde_json::json!([
            { "id": "m1", "name": "Unli Wings Solo", "price": 329.0 },
            { "id": "m2", "name": "Garlic Rice", "price": 25.0 },
        ]);
        write_cache(&db, "items", &items, "v1").unwrap();

        let cached = get_items(&db);
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0]["name"], "Unli Wings Solo");
        assert!(!cache_is_empty(&db));
    }

    #[test]
    fn test_upsert_cached_item_replaces_by_id() {
        let db = db::test_db();
        let items = serde_json::json!([{ "id": "m1", "name": "Old Name", "price": 100.0 }]);
        write_cache(&db, "items", &items, "v1").unwrap();

        let updated = serde_json::json!({ "id": "m1", "name": "New Name", "price": 120.0 });
        upsert_cached_item(&db, &updated).unwrap();

        let cached = get_items(&db);
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0]["name"], "New Name");

        let fresh = serde_json::json!({ "id": "m2", "name": "Extra", "price": 60.0 });
        upsert_cached_item(&db, &fresh).unwrap();
        assert_eq!(get_items(&db).len(), 2);
    }

    #[test]
    fn test_payload_version_is_stable() {
        let payload = serde_json::json!({
            "categories": [{ "id": "c1", "name": "Wings" }],
            "items": [{ "id": "m1", "name": "Unli Wings Solo" }],
            "fetchedAt": "2026-01-01T00:00:00Z",
        });
        let mut with_new_timestamp = payload.clone();
        with_new_timestamp["fetchedAt"] = Value::String("2026-02-02T00:00:00Z".into());

        // Timestamps outside the cached sections must not change the version.
        assert_eq!(
            compute_menu_payload_version(&payload),
            compute_menu_payload_version(&with_new_timestamp)
        );

        let mut with_new_item = payload.clone();
        with_new_item["items"] = serde_json::json!([{ "id": "m2", "name": "Fries" }]);
        assert_ne!(
            compute_menu_payload_version(&payload),
            compute_menu_payload_version(&with_new_item)
        );
    }

    #[test]
    fn test_validate_menu_payload() {
        assert!(validate_menu_payload(&serde_json::json!({ "name": "Wings", "price": 10.0 })).is_ok());
        assert!(validate_menu_payload(&serde_json::json!({ "name": "  " })).is_err());
        assert!(validate_menu_payload(&serde_json::json!({ "name": "Wings", "price": -1.0 })).is_err());
    }
}
