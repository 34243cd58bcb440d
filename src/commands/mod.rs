//! IPC command handlers, grouped by feature area.

pub mod attendance;
pub mod auth;
pub mod expenses;
pub mod menu;
pub mod orders;
pub mod reports;
pub mod runtime;
pub mod settings;
pub mod sync;
