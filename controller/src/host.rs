use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use heater_common::{ControllerConfig, RuntimeConfig, Schedule, SwitchState};

use crate::{
    driver::SimulatedRelay,
    loops,
    store::{try_update, ControlStateStore, FileScheduleStore, FileStateStore, ScheduleStore},
};

#[derive(Clone)]
struct AppState {
    driver: Arc<SimulatedRelay>,
    state_store: Arc<FileStateStore>,
    schedule_store: Arc<FileScheduleStore>,
    config: Arc<ControllerConfig>,
    timezone: Tz,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("HEATER_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.heater"));

    let mut runtime = load_runtime_config(&data_dir.join("runtime.json"))
        .await
        .unwrap_or_else(|err| {
            warn!("failed to load runtime config: {err:#}");
            RuntimeConfig::default()
        });
    runtime.controller.sanitize();

    let timezone: Tz = runtime.timezone.parse().unwrap_or_else(|_| {
        warn!("invalid timezone {:?}, falling back to UTC", runtime.timezone);
        chrono_tz::UTC
    });

    let app_state = AppState {
        driver: Arc::new(SimulatedRelay::default()),
        state_store: Arc::new(FileStateStore::new(data_dir.join("state.json"))),
        schedule_store: Arc::new(FileScheduleStore::new(data_dir.join("schedule.json"))),
        config: Arc::new(runtime.controller),
        timezone,
    };

    spawn_verify_loop(app_state.clone());
    spawn_enforce_loop(app_state.clone());
    spawn_schedule_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/power", post(handle_set_power))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .with_state(app_state);

    let port = std::env::var("HEATER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr: SocketAddr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Fine cadence: verified device reads feeding the session meter.
fn spawn_verify_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(state.config.verify_interval_ms));
        loop {
            interval.tick().await;
            if let Err(err) =
                loops::verify_job(state.driver.as_ref(), state.state_store.as_ref(), &state.config)
                    .await
            {
                warn!("verification pass deferred to next tick: {err}");
            }
        }
    });
}

/// Medium cadence: resolve + enforce against the device.
fn spawn_enforce_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(state.config.enforce_interval_ms));
        loop {
            interval.tick().await;
            if let Err(err) = loops::enforce_job(
                state.driver.as_ref(),
                state.state_store.as_ref(),
                state.schedule_store.as_ref(),
                &state.config,
                state.timezone,
            )
            .await
            {
                warn!("enforcement pass deferred to next tick: {err}");
            }
        }
    });
}

/// Coarse cadence: schedule evaluation and override resolution only.
fn spawn_schedule_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_millis(state.config.schedule_interval_ms));
        loop {
            interval.tick().await;
            if let Err(err) = loops::schedule_job(
                state.state_store.as_ref(),
                state.schedule_store.as_ref(),
                &state.config,
                state.timezone,
            )
            .await
            {
                warn!("schedule pass deferred to next tick: {err}");
            }
        }
    });
}

async fn handle_get_status(State(state): State<AppState>) -> axum::response::Response {
    let (control, _) = match state.state_store.get().await {
        Ok(current) => current,
        Err(err) => {
            warn!("failed to load control state: {err}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load control state",
            );
        }
    };

    let now = Utc::now();
    let scheduled_on = match state.schedule_store.windows().await {
        Ok(windows) => Schedule { windows }.is_on_at(now.with_timezone(&state.timezone).time()),
        Err(err) => {
            warn!("failed to load schedule for status: {err}");
            control.last_scheduled_on.unwrap_or(false)
        }
    };

    Json(control.status(
        now,
        state.config.override_ttl_ms,
        scheduled_on,
        state.timezone.name(),
    ))
    .into_response()
}

/// The single mutating entry point: set the manual desired state now. The
/// override is persisted first, then an enforcement pass runs immediately
/// instead of waiting for the next interval.
async fn handle_set_power(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> axum::response::Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let requested = match value.to_ascii_lowercase().as_str() {
        "on" => SwitchState::On,
        "off" => SwitchState::Off,
        _ => return error_response(StatusCode::BAD_REQUEST, "Invalid value. Use 'on' or 'off'"),
    };

    let now = Utc::now();
    let written = try_update(
        state.state_store.as_ref(),
        state.config.max_store_attempts,
        |control| control.apply_manual(requested, now),
    )
    .await;
    if let Err(err) = written {
        warn!("failed to persist manual override: {err}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist manual override",
        );
    }
    info!("manual override set to {}", requested.as_str());

    let enforce_state = state.clone();
    tokio::spawn(async move {
        if let Err(err) = loops::enforce_job(
            enforce_state.driver.as_ref(),
            enforce_state.state_store.as_ref(),
            enforce_state.schedule_store.as_ref(),
            &enforce_state.config,
            enforce_state.timezone,
        )
        .await
        {
            warn!("immediate enforcement deferred to next tick: {err}");
        }
    });

    handle_get_status(State(state)).await
}

async fn handle_get_schedule(State(state): State<AppState>) -> axum::response::Response {
    match state.schedule_store.load().await {
        Ok(schedule) => Json(schedule).into_response(),
        Err(err) => {
            warn!("failed to load schedule: {err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load schedule")
        }
    }
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(mut schedule): Json<Schedule>,
) -> axum::response::Response {
    let dropped = schedule.normalize();
    if dropped > 0 {
        warn!("rejected {dropped} malformed schedule window(s) from update");
    }

    if let Err(err) = state.schedule_store.save(&schedule).await {
        warn!("failed to persist schedule update: {err}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist schedule",
        );
    }

    Json(schedule).into_response()
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
