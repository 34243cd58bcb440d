//! Attendance review for Wings POS.
//!
//! The backend owns attendance records (timesheets come from its own
//! check-in flow); this module fetches a month at a time from
//! `fetch-attendance-data`, caches the payload locally so the review screen
//! works offline, and derives per-day summaries for the calendar view.

use chrono::NaiveDate;
use rusqlite::params;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::api;
use crate::db::DbState;

// ---------------------------------------------------------------------------
// Month helpers
// ---------------------------------------------------------------------------

/// Inclusive first and last day of a month, for calendar navigation.
pub fn month_range(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), String> {
    let first =
        NaiveDate::from_ymd_opt(year, month, 1).ok_or(format!("Invalid month: {year}-{month}"))?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or("Invalid month arithmetic")?;
    Ok((first, next_month.pred_opt().unwrap_or(first)))
}

fn cache_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

fn read_cached_month(db: &DbState, key: &str) -> Option<Value> {
    let conn = db.conn.lock().ok()?;
    let raw: String = conn
        .query_row(
            "SELECT data FROM attendance_cache WHERE cache_key = ?1",
            params![key],
            |row| row.get(0),
        )
        .ok()?;
    serde_json::from_str(&raw).ok()
}

fn write_cached_month(db: &DbState, key: &str, data: &Value) -> Result<(), String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    conn.execute(
        "INSERT INTO attendance_cache (cache_key, data, fetched_at)
         VALUES (?1, ?2, datetime('now'))
         ON CONFLICT(cache_key)
         DO UPDATE SET data = excluded.data, fetched_at = excluded.fetched_at",
        params![key, data.to_string()],
    )
    .map_err(|e| format!("write attendance cache: {e}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Fetch a month of attendance records, preferring the backend and falling
/// back to the local cache when it is unreachable. Returns
/// `{ records, fromCache }`.
pub async fn get_month(db: &DbState, year: i32, month: u32) -> Result<Value, String> {
    month_range(year, month)?;
    let key = cache_key(year, month);

    let path = format!("/api/fetch-attendance-data/?year={year}&month={month}");
    match api::backend_request(&path, "GET", None).await {
        Ok(resp) => {
            let records = resp
                .get("records")
                .cloned()
                .unwrap_or_else(|| {
                    if resp.is_array() {
                        resp.clone()
                    } else {
                        Value::Array(vec![])
                    }
                });
            write_cached_month(db, &key, &records)?;
            info!(month = %key, "attendance fetched from backend");
            Ok(serde_json::json!({ "records": records, "fromCache": false }))
        }
        Err(e) => {
            if api::is_auth_failure(&e) {
                return Err(e);
            }
            match read_cached_month(db, &key) {
                Some(records) => {
                    warn!(month = %key, "attendance fetch failed, serving cache: {e}");
                    Ok(serde_json::json!({ "records": records, "fromCache": true }))
                }
                None => Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

/// Per-day totals of present/late/absent across a month's records.
///
/// Each record is expected to carry `date` (`YYYY-MM-DD`) and `status`;
/// unknown statuses land in `other` so a backend change shows up in review
/// instead of disappearing.
pub fn summarize_by_day(records: &Value) -> Value {
    let mut days: BTreeMap<String, (i64, i64, i64, i64)> = BTreeMap::new();

    if let Some(arr) = records.as_array() {
        for record in arr {
            let date = record
                .get("date")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if date.is_empty() {
                continue;
            }
            let status = record
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("other")
                .to_ascii_lowercase();
            let entry = days.entry(date.to_string()).or_insert((0, 0, 0, 0));
            match status.as_str() {
                "present" | "on_time" => entry.0 += 1,
                "late" => entry.1 += 1,
                "absent" => entry.2 += 1,
                _ => entry.3 += 1,
            }
        }
    }

    days.into_iter()
        .map(|(date, (present, late, absent, other))| {
            serde_json::json!({
                "date": date,
                "present": present,
                "late": late,
                "absent": absent,
                "other": other,
            })
        })
        .collect()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Datelike;

    #[test]
    fn test_month_range() {
        let (first, last) = month_range(2026, 2).unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());

        let (first, last) = month_range(2026, 12).unwrap();
        assert_eq!(first.month(), 12);
        assert_eq!(last, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());

        assert!(month_range(2026, 13).is_err());
    }

    #[test]
    fn test_cache_roundtrip() {
        let db = db::test_db();
        let key = cache_key(2026, 8);
        assert!(read_cached_month(&db, &key).is_none());

        let records = serde_json::json!([
            { "staff": "Ana", "date": "2026-08-05", "status": "present" },
        ]);
        write_cached_month(&db, &key, &records).unwrap();

        let cached = read_cached_month(&db, &key).unwrap();
        assert_eq!(cached, records);

        // Overwrite replaces
        let updated = serde_json::json!([]);
        write_cached_month(&db, &key, &updated).unwrap();
        assert_eq!(read_cached_month(&db, &key).unwrap(), updated);
    }

    #[test]
    fn test_summarize_by_day() {
        let records = serde_json::json!([
            { "staff": "Ana", "date": "2026-08-05", "status": "present" },
            { "staff": "Ben", "date": "2026-08-05", "status": "late" },
            { "staff": "Cai", "date": "2026-08-05", "status": "absent" },
            { "staff": "Ana", "date": "2026-08-06", "status": "PRESENT" },
            { "staff": "Ben", "date": "2026-08-06", "status": "half_day" },
            { "staff": "Cai", "status": "present" },
        ]);
        let summary = summarize_by_day(&records);
        let days = summary.as_array().unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0]["date"], "2026-08-05");
        assert_eq!(days[0]["present"], 1);
        assert_eq!(days[0]["late"], 1);
        assert_eq!(days[0]["absent"], 1);
        assert_eq!(days[1]["present"], 1);
        assert_eq!(days[1]["other"], 1);
    }
}
