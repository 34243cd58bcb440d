//! Wings POS - Tauri v2 Backend
//!
//! This module registers all IPC command handlers the webview calls via
//! `@tauri-apps/api/core::invoke()`. The Rust core owns order pricing,
//! local SQLite persistence, and background synchronization to the
//! restaurant's REST backend; the webview is a thin rendering layer.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod attendance;
mod auth;
mod commands;
mod db;
mod diagnostics;
mod disposal;
mod expenses;
mod menu;
mod orders;
mod pricing;
mod reports;
mod storage;
mod sync;

/// Seconds between background sync cycles.
const SYNC_INTERVAL_SECS: u64 = 15;

/// Read one of `keys` from an invoke argument that may be a bare string or
/// an object.
pub(crate) fn payload_arg0_as_string(
    arg0: Option<serde_json::Value>,
    keys: &[&str],
) -> Option<String> {
    match arg0 {
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(ref v) => value_str(v, keys),
        None => None,
    }
}

pub(crate) fn value_str(v: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(s) = v.get(*key).and_then(|x| x.as_str()) {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

// ============================================================================
// App entry point
// ============================================================================

pub fn run() {
    // Initialize structured logging (console + rolling file)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,wings_pos_lib=debug"));

    // Prune old log files before setting up the appender
    diagnostics::prune_old_logs();

    // Rolling file appender: creates daily log files in the logs directory
    let log_dir = diagnostics::get_log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(&log_dir, "pos");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    // Keep the guard alive for the lifetime of the app — dropping it flushes
    // logs. We leak it intentionally since the app runs until process exit.
    std::mem::forget(_guard);

    info!("Starting Wings POS v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .setup(|app| {
            use std::sync::Arc;
            use tauri::Manager;

            let app_data_dir = app
                .path()
                .app_data_dir()
                .expect("Failed to get app data dir");

            // Main DB connection for Tauri commands
            let db_state = db::init(&app_data_dir).expect("Failed to initialize database");
            app.manage(db_state);

            // Auth state
            app.manage(auth::AuthState::new());

            // Sync state (shared between commands and background loop)
            let sync_state = Arc::new(sync::SyncState::new());
            app.manage(sync_state.clone());

            // Second DB connection for the background sync loop
            let db_for_sync =
                Arc::new(db::init(&app_data_dir).expect("Failed to init sync database"));

            sync::start_sync_loop(
                app.handle().clone(),
                db_for_sync,
                sync_state,
                SYNC_INTERVAL_SECS,
            );

            // Warm the menu cache on a cold start when a session exists; a
            // populated cache is kept fresh by manual refreshes instead.
            if storage::is_configured() && storage::is_logged_in() {
                let db_for_menu =
                    Arc::new(db::init(&app_data_dir).expect("Failed to init menu database"));
                let startup_app = app.handle().clone();
                tauri::async_runtime::spawn(async move {
                    if !menu::cache_is_empty(&db_for_menu) {
                        return;
                    }
                    match menu::refresh_menu(&db_for_menu).await {
                        Ok(result) => {
                            use tauri::Emitter;
                            let _ = startup_app.emit("menu_refreshed", &result);
                            info!(
                                updated = result["updated"].as_bool().unwrap_or(false),
                                "Startup menu warm-up complete"
                            );
                        }
                        Err(e) => warn!("Startup menu warm-up failed: {e}"),
                    }
                });
            }

            info!("Database, auth, and sync loop registered");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // App / diagnostics
            commands::runtime::app_get_version,
            commands::runtime::diagnostics_get_about,
            commands::runtime::diagnostics_get_system_health,
            commands::runtime::diagnostics_recent_sync_errors,
            commands::runtime::diagnostics_export,
            // Auth
            commands::auth::auth_login,
            commands::auth::auth_logout,
            commands::auth::auth_get_session,
            commands::auth::auth_track_activity,
            // Settings
            commands::settings::settings_is_configured,
            commands::settings::settings_get_full_config,
            commands::settings::settings_configure_backend,
            commands::settings::settings_test_connection,
            commands::settings::settings_get,
            commands::settings::settings_set,
            commands::settings::settings_get_deduction_rates,
            commands::settings::settings_set_deduction_rate,
            commands::settings::settings_factory_reset,
            // Orders
            commands::orders::order_create,
            commands::orders::order_get_all,
            commands::orders::order_get_by_id,
            commands::orders::order_edit,
            commands::orders::order_preview_edit,
            commands::orders::order_update_status,
            commands::orders::order_get_revisions,
            commands::orders::order_check_inventory,
            // Menu
            commands::menu::menu_get_categories,
            commands::menu::menu_get_items,
            commands::menu::menu_refresh,
            commands::menu::menu_add_item,
            commands::menu::menu_edit_item,
            // Disposal
            commands::menu::disposal_record,
            commands::menu::disposal_list,
            // Expenses
            commands::expenses::expense_record,
            commands::expenses::expense_list,
            commands::expenses::expense_month_summary,
            // Reports
            commands::reports::report_today_statistics,
            commands::reports::report_sales_trend,
            commands::reports::report_top_items,
            commands::reports::report_fetch_remote_sales,
            commands::reports::report_export_sales_csv,
            // Attendance
            commands::attendance::attendance_get_month,
            commands::attendance::attendance_day_summary,
            // Sync
            commands::sync::sync_get_status,
            commands::sync::sync_force,
            commands::sync::sync_retry_failed,
        ])
        .run(tauri::generate_context!())
        .expect("error while running Wings POS");
}
