use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use chiller_common::{
    Ack, ConfigAck, ConfigUpdate, CoordinatorConfig, ErrorBody, ModeAck, ModeBody, ModeUpdate,
    RelayStateRecord, RelayWriteAck, SensorReading,
};

use crate::store::CoordinatorStore;

/// Request bodies that must be a JSON object; arrays and scalars are rejected.
type JsonObject = Map<String, Value>;

#[derive(Clone)]
struct AppState {
    store: Arc<CoordinatorStore>,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = CoordinatorConfig::from_env();
    let store = Arc::new(CoordinatorStore::default());
    let app = router(store);

    let addr: SocketAddr = format!("{}:{}", config.bind_host, config.http_port)
        .parse()
        .with_context(|| {
            format!(
                "invalid coordinator bind address {}:{}",
                config.bind_host, config.http_port
            )
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind coordinator server at {addr}"))?;

    info!("coordinator listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("coordinator server failed")?;
    info!("coordinator stopped");
    Ok(())
}

fn router(store: Arc<CoordinatorStore>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route(
            "/api/relay-state",
            get(handle_get_relay_state).post(handle_post_relay_state),
        )
        .route(
            "/api/sensors",
            get(handle_get_sensors).post(handle_post_sensors),
        )
        .route("/api/mode", get(handle_get_mode).post(handle_post_mode))
        .route(
            "/api/config",
            get(handle_get_config).post(handle_post_config),
        )
        .route("/api/status", get(handle_get_status))
        .layer(CorsLayer::permissive())
        .with_state(AppState { store })
}

fn shutdown_signal() -> impl Future<Output = ()> {
    #[cfg(unix)]
    let terminate = signal(SignalKind::terminate());

    async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for ctrl-c: {err}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            match terminate {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(err) => {
                    warn!("failed to listen for SIGTERM: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
        }
        info!("shutdown requested");
    }
}

async fn handle_root() -> Json<Ack> {
    Json(Ack::ok())
}

async fn handle_get_relay_state(State(state): State<AppState>) -> Json<RelayStateRecord> {
    Json(state.store.relay_state().await)
}

async fn handle_post_relay_state(
    State(state): State<AppState>,
    body: Result<Json<RelayStateRecord>, JsonRejection>,
) -> Response {
    let Json(candidate) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(rejection),
    };
    let outcome = state.store.set_relay_state(candidate).await;
    Json(RelayWriteAck {
        status: "ok".to_string(),
        accepted: outcome.is_accepted(),
    })
    .into_response()
}

async fn handle_get_sensors(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.measurement().await)
}

async fn handle_post_sensors(
    State(state): State<AppState>,
    body: Result<Json<SensorReading>, JsonRejection>,
) -> Response {
    let Json(reading) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(rejection),
    };
    state.store.set_measurement(reading).await;
    Json(Ack::ok()).into_response()
}

async fn handle_get_mode(State(state): State<AppState>) -> Json<ModeBody> {
    Json(ModeBody {
        mode: state.store.mode().await,
    })
}

async fn handle_post_mode(
    State(state): State<AppState>,
    body: Result<Json<JsonObject>, JsonRejection>,
) -> Response {
    let Json(mut body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(rejection),
    };
    let update = ModeUpdate {
        mode: body.remove("mode"),
    };
    match state.store.set_mode(&update).await {
        Ok(mode) => Json(ModeAck {
            status: "ok".to_string(),
            mode,
        })
        .into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.config().await)
}

async fn handle_post_config(
    State(state): State<AppState>,
    body: Result<Json<JsonObject>, JsonRejection>,
) -> Response {
    let Json(mut body) = match body {
        Ok(body) => body,
        Err(rejection) => return rejected_body(rejection),
    };
    let update = ConfigUpdate {
        temp_start_compressor: body.remove("temp_start_compressor"),
        temp_stop_compressor: body.remove("temp_stop_compressor"),
    };
    match state.store.set_config(update).await {
        Ok(config) => Json(ConfigAck {
            status: "ok".to_string(),
            config,
        })
        .into_response(),
        Err(err) => {
            warn!("rejected config update: {err}");
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.status().await)
}

fn rejected_body(rejection: JsonRejection) -> Response {
    warn!("rejected request body: {rejection}");
    error_response(StatusCode::BAD_REQUEST, &rejection.body_text())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}
