//! Diagnostics module for Wings POS.
//!
//! Provides:
//! - **About info**: version, build timestamp, git SHA, platform
//! - **System health**: schema version, sync backlog, cache freshness
//! - **Diagnostics export**: packages logs, DB stats, and the last sync
//!   errors into a zip bundle for support.
//! - **Log rotation helpers**: used by `lib.rs` to configure rolling log files.

use crate::db::DbState;
use rusqlite::params;
use serde_json::{json, Value};
use std::fs;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

// ---------------------------------------------------------------------------
// About info
// ---------------------------------------------------------------------------

/// Returns version, build timestamp, git SHA, and platform info.
pub fn get_about_info() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "buildTimestamp": env!("BUILD_TIMESTAMP"),
        "gitSha": env!("BUILD_GIT_SHA"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
    })
}

// ---------------------------------------------------------------------------
// System health
// ---------------------------------------------------------------------------

/// Counts that drive the health panel: schema version, queue backlog,
/// row totals per table.
pub fn get_system_health(db: &DbState) -> Result<Value, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;

    let schema_version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    let count = |sql: &str| -> i64 { conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0) };

    Ok(json!({
        "schemaVersion": schema_version,
        "orders": count("SELECT COUNT(*) FROM orders"),
        "expenses": count("SELECT COUNT(*) FROM expenses"),
        "disposals": count("SELECT COUNT(*) FROM disposals"),
        "pendingSync": count("SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'"),
        "failedSync": count("SELECT COUNT(*) FROM sync_queue WHERE status = 'failed'"),
        "dbPath": db.db_path.display().to_string(),
    }))
}

/// Last sync errors, newest first, for the support bundle and health panel.
pub fn recent_sync_errors(db: &DbState, limit: usize) -> Result<Vec<Value>, String> {
    let conn = db.conn.lock().map_err(|e| e.to_string())?;
    let mut stmt = conn
        .prepare(
            "SELECT entity_type, entity_id, retry_count, last_error, updated_at
             FROM sync_queue
             WHERE last_error IS NOT NULL
             ORDER BY updated_at DESC
             LIMIT ?1",
        )
        .map_err(|e| e.to_string())?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok(json!({
                "entityType": row.get::<_, String>(0)?,
                "entityId": row.get::<_, String>(1)?,
                "retryCount": row.get::<_, i64>(2)?,
                "lastError": row.get::<_, Option<String>>(3)?,
                "updatedAt": row.get::<_, Option<String>>(4)?,
            }))
        })
        .map_err(|e| e.to_string())?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

// ---------------------------------------------------------------------------
// Diagnostics export
// ---------------------------------------------------------------------------

/// Package logs, health info, and recent sync errors into a zip under
/// `output_dir`. Returns the bundle path.
pub fn export_diagnostics(db: &DbState, output_dir: &Path) -> Result<String, String> {
    fs::create_dir_all(output_dir).map_err(|e| format!("create export dir: {e}"))?;
    let bundle_path = output_dir.join(format!(
        "wings-pos-diagnostics-{}.zip",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    ));

    let file = fs::File::create(&bundle_path).map_err(|e| format!("create bundle: {e}"))?;
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::SimpleFileOptions = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let manifest = json!({
        "about": get_about_info(),
        "health": get_system_health(db)?,
        "syncErrors": recent_sync_errors(db, 20)?,
        "exportedAt": chrono::Utc::now().to_rfc3339(),
    });
    zip.start_file("manifest.json", options)
        .map_err(|e| format!("zip manifest: {e}"))?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .unwrap_or_default()
            .as_bytes(),
    )
    .map_err(|e| format!("write manifest: {e}"))?;

    // Include current log files
    let log_dir = get_log_dir();
    if log_dir.exists() {
        if let Ok(entries) = fs::read_dir(&log_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let name = match path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n.to_string(),
                    None => continue,
                };
                let mut contents = Vec::new();
                if fs::File::open(&path)
                    .and_then(|mut f| f.read_to_end(&mut contents))
                    .is_err()
                {
                    warn!("skipping unreadable log file {}", path.display());
                    continue;
                }
                zip.start_file(format!("logs/{name}"), options)
                    .map_err(|e| format!("zip log: {e}"))?;
                zip.write_all(&contents)
                    .map_err(|e| format!("write log: {e}"))?;
            }
        }
    }

    zip.finish().map_err(|e| format!("finish bundle: {e}"))?;
    Ok(bundle_path.display().to_string())
}

// ---------------------------------------------------------------------------
// Log rotation helpers
// ---------------------------------------------------------------------------

/// Directory the rolling file appender writes to. Resolved from the
/// platform's local data dir without needing a Tauri app handle, since
/// logging starts before the app is built.
pub fn get_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_else(|_| ".".into()))
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()))
                    .join(".local")
                    .join("share")
            }
        });
    base.join("ph.wingspos.terminal").join("logs")
}

/// Delete rolled log files beyond `MAX_LOG_FILES`, newest kept.
pub fn prune_old_logs() {
    let log_dir = get_log_dir();
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(&log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.starts_with("pos.") || name == "pos.log" {
                        let modified = entry
                            .metadata()
                            .ok()
                            .and_then(|m| m.modified().ok())
                            .unwrap_or(std::time::UNIX_EPOCH);
                        log_files.push((path, modified));
                    }
                }
            }
        }
    }

    // Sort newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
