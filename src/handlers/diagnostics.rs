use crate::auth::auth;
use crate::models::{DiagnosticsResponse, ErrorResponse, UserId};
use crate::state::AppState;
use axum::{extract::{Extension, State}, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Live session and room counters plus process host stats. Admins only.
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {
    auth::ensure_admin(&app_state.config, &user)?;

    let n_sessions = app_state.gateway.active_sessions() as u32;
    let n_rooms = app_state.registry.room_count() as u32;
    let n_room_members = app_state.registry.membership_count() as u32;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| Mutex::new(System::new_all()));
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Sessions: {}, Rooms: {}",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_sessions,
        n_rooms
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_sessions,
            n_rooms,
            n_room_members,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
