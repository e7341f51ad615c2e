use std::time::Duration;

use async_trait::async_trait;
use chiller_common::{
    CompressorConfig, ConfigAck, ControlMode, EdgeConfig, ModeBody, RelayStateRecord,
    RelayWriteAck, SensorReading,
};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Every variant counts as a transient connectivity failure for the control loop.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("coordinator request timed out")]
    Timeout,
    #[error("coordinator unreachable: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("coordinator answered with status {0}")]
    Status(StatusCode),
    #[error("coordinator response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

/// The coordinator operations the edge loop depends on.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    async fn fetch_mode(&self) -> Result<ControlMode, SyncError>;

    async fn fetch_config(&self) -> Result<CompressorConfig, SyncError>;

    async fn announce_config(&self, config: &CompressorConfig) -> Result<(), SyncError>;

    async fn fetch_relay_state(&self) -> Result<RelayStateRecord, SyncError>;

    /// Returns whether the coordinator kept the record.
    async fn push_relay_state(&self, record: &RelayStateRecord) -> Result<bool, SyncError>;

    async fn upload_measurement(&self, reading: &SensorReading) -> Result<(), SyncError>;
}

pub struct HttpCoordinator {
    client: Client,
    base_url: String,
    upload_timeout: Duration,
}

impl HttpCoordinator {
    pub fn new(config: &EdgeConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.coordinator_url.trim_end_matches('/').to_string(),
            upload_timeout: Duration::from_millis(config.upload_timeout_ms),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let response = self.client.get(self.url(path)).send().await?;
        decode(ensure_success(response)?).await
    }

    async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, SyncError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        decode(ensure_success(response)?).await
    }
}

fn ensure_success(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::Status(status))
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SyncError> {
    response.json::<T>().await.map_err(|err| {
        if err.is_timeout() {
            SyncError::Timeout
        } else {
            SyncError::Decode(err)
        }
    })
}

#[async_trait]
impl CoordinatorApi for HttpCoordinator {
    async fn fetch_mode(&self) -> Result<ControlMode, SyncError> {
        let body: ModeBody = self.get_json("/api/mode").await?;
        Ok(body.mode)
    }

    async fn fetch_config(&self) -> Result<CompressorConfig, SyncError> {
        self.get_json("/api/config").await
    }

    async fn announce_config(&self, config: &CompressorConfig) -> Result<(), SyncError> {
        let _: ConfigAck = self.post_json("/api/config", config, None).await?;
        Ok(())
    }

    async fn fetch_relay_state(&self) -> Result<RelayStateRecord, SyncError> {
        self.get_json("/api/relay-state").await
    }

    async fn push_relay_state(&self, record: &RelayStateRecord) -> Result<bool, SyncError> {
        let ack: RelayWriteAck = self.post_json("/api/relay-state", record, None).await?;
        Ok(ack.accepted)
    }

    async fn upload_measurement(&self, reading: &SensorReading) -> Result<(), SyncError> {
        let _: serde_json::Value = self
            .post_json("/api/sensors", reading, Some(self.upload_timeout))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use chiller_common::{Ack, RelayStates};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;

    use super::*;

    type Posted = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_stub(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client_for(base_url: String) -> HttpCoordinator {
        HttpCoordinator::new(&EdgeConfig {
            coordinator_url: base_url,
            ..EdgeConfig::default()
        })
        .unwrap()
    }

    fn stub_router(posted: Posted) -> Router {
        Router::new()
            .route("/api/mode", get(|| async { Json(json!({"mode": "manual"})) }))
            .route(
                "/api/config",
                get(|| async {
                    Json(json!({"temp_start_compressor": 6.0, "temp_stop_compressor": 2.5}))
                })
                .post(
                    |State(posted): State<Posted>, Json(body): Json<Value>| async move {
                        posted.lock().unwrap().push(("config".to_string(), body.clone()));
                        Json(json!({"status": "ok", "config": body}))
                    },
                ),
            )
            .route(
                "/api/relay-state",
                get(|| async {
                    Json(json!({
                        "relay1": 1, "relay2": 0, "relay3": 1,
                        "timestamp": 42, "mode": "manual"
                    }))
                })
                .post(
                    |State(posted): State<Posted>, Json(body): Json<Value>| async move {
                        posted.lock().unwrap().push(("relay".to_string(), body));
                        Json(json!({"status": "ok", "accepted": false}))
                    },
                ),
            )
            .route(
                "/api/sensors",
                axum::routing::post(
                    |State(posted): State<Posted>, Json(body): Json<Value>| async move {
                        posted.lock().unwrap().push(("sensors".to_string(), body));
                        Json(Ack::ok())
                    },
                ),
            )
            .with_state(posted)
    }

    #[tokio::test]
    async fn reads_coordinator_state() {
        let posted: Posted = Arc::default();
        let client = client_for(spawn_stub(stub_router(posted)).await);

        assert_eq!(client.fetch_mode().await.unwrap(), ControlMode::Manual);
        assert_eq!(
            client.fetch_config().await.unwrap(),
            CompressorConfig {
                start: 6.0,
                stop: 2.5
            }
        );
        assert_eq!(
            client.fetch_relay_state().await.unwrap(),
            RelayStateRecord {
                relays: RelayStates {
                    relay1: true,
                    relay2: false,
                    relay3: true,
                },
                timestamp: 42,
                mode: ControlMode::Manual,
            }
        );
    }

    #[tokio::test]
    async fn writes_use_coordinator_wire_format() {
        let posted: Posted = Arc::default();
        let client = client_for(spawn_stub(stub_router(Arc::clone(&posted))).await);

        client
            .announce_config(&CompressorConfig::default())
            .await
            .unwrap();
        let accepted = client
            .push_relay_state(&RelayStateRecord {
                relays: RelayStates {
                    relay1: true,
                    relay2: false,
                    relay3: false,
                },
                timestamp: 7,
                mode: ControlMode::Auto,
            })
            .await
            .unwrap();
        client
            .upload_measurement(&SensorReading {
                temp_dht22: 20.5,
                humidity: 48.0,
                temp_ds18b20: 4.0,
            })
            .await
            .unwrap();

        assert!(!accepted);
        let posted = posted.lock().unwrap().clone();
        assert_eq!(
            posted,
            vec![
                (
                    "config".to_string(),
                    json!({"temp_start_compressor": 4.5, "temp_stop_compressor": 3.5})
                ),
                (
                    "relay".to_string(),
                    json!({"relay1": 1, "relay2": 0, "relay3": 0, "timestamp": 7, "mode": "auto"})
                ),
                (
                    "sensors".to_string(),
                    json!({"temp_dht22": 20.5, "humidity": 48.0, "temp_ds18b20": 4.0})
                ),
            ]
        );
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let router = Router::new().route(
            "/api/relay-state",
            get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let client = client_for(spawn_stub(router).await);

        let err = client.fetch_relay_state().await.unwrap_err();

        assert!(matches!(err, SyncError::Status(status) if status.as_u16() == 500));
    }

    #[tokio::test]
    async fn stalled_coordinator_is_cut_off_by_the_request_timeout() {
        let router = Router::new()
            .route(
                "/api/mode",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(800)).await;
                    Json(json!({"mode": "auto"}))
                }),
            )
            .route(
                "/api/sensors",
                axum::routing::post(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    Json(Ack::ok())
                }),
            );
        let client = HttpCoordinator::new(&EdgeConfig {
            coordinator_url: spawn_stub(router).await,
            request_timeout_ms: 100,
            upload_timeout_ms: 2_000,
            ..EdgeConfig::default()
        })
        .unwrap();

        let started = std::time::Instant::now();
        let err = client.fetch_mode().await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout), "{err:?}");
        assert!(started.elapsed() < Duration::from_millis(700));

        client
            .upload_measurement(&SensorReading::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refused_connection_is_a_sync_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(format!("http://{addr}"));
        let err = client.fetch_mode().await.unwrap_err();

        assert!(matches!(err, SyncError::Transport(_) | SyncError::Timeout));
    }
}
