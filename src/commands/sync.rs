use serde_json::Value;
use std::sync::Arc;

use crate::{db, sync};

#[tauri::command]
pub async fn sync_get_status(
    db: tauri::State<'_, db::DbState>,
    sync_state: tauri::State<'_, Arc<sync::SyncState>>,
) -> Result<Value, String> {
    // Status queries must stay cheap; connectivity is reported from the
    // last loop tick rather than probed here.
    let is_running = sync_state
        .is_running
        .load(std::sync::atomic::Ordering::SeqCst);
    let mut status = sync::get_sync_status(&db, &sync_state.last_sync, is_running);
    status["loopRunning"] = Value::Bool(is_running);
    Ok(status)
}

#[tauri::command]
pub async fn sync_force(
    db: tauri::State<'_, db::DbState>,
    sync_state: tauri::State<'_, Arc<sync::SyncState>>,
) -> Result<Value, String> {
    sync::force_sync(&db, &sync_state).await
}

#[tauri::command]
pub async fn sync_retry_failed(db: tauri::State<'_, db::DbState>) -> Result<Value, String> {
    sync::retry_failed(&db)
}
