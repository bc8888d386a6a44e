//! Settings API handlers.

use std::collections::HashMap;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use vexport_models::settings::keys;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const REDACTED: &str = "[redacted]";

/// Settings response. The websocket password is never echoed back.
#[derive(Serialize)]
pub struct SettingsResponse {
    pub settings: Map<String, Value>,
}

/// Get all operator settings.
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<SettingsResponse>> {
    Ok(Json(settings_view(&state).await?))
}

/// Settings update request.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub settings: HashMap<String, Value>,
}

/// Update operator settings.
///
/// Only known keys are accepted; values take effect on the next render
/// or sweep, never on one already running.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<SettingsResponse>> {
    let payload_size = serde_json::to_string(&request.settings)
        .map(|s| s.len())
        .unwrap_or(usize::MAX);
    if payload_size > 10_000 {
        return Err(ApiError::bad_request("Settings payload too large"));
    }

    for key in request.settings.keys() {
        if !keys::ALL.contains(&key.as_str()) {
            return Err(ApiError::Validation(format!("unknown setting '{key}'")));
        }
    }

    for (key, value) in request.settings {
        state.settings.set(&key, value).await?;
        info!("Setting {} updated", key);
    }

    Ok(Json(settings_view(&state).await?))
}

/// Flat key/value view of every setting, password redacted.
async fn settings_view(state: &AppState) -> ApiResult<SettingsResponse> {
    let snapshot = state.settings.snapshot().await?;

    let mut settings = Map::new();
    settings.insert(keys::ASPECT_RATIOS.to_string(), json!(snapshot.aspect_ratios));
    settings.insert(keys::RESOLUTIONS.to_string(), json!(snapshot.resolutions));
    settings.insert(
        keys::PURGE_AFTER_MINUTES.to_string(),
        json!(snapshot.purge_after_minutes),
    );
    settings.insert(
        keys::SHOW_ON_HOMEPAGE.to_string(),
        json!(snapshot.show_on_homepage),
    );

    let renderer = serde_json::to_value(&snapshot.renderer)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    if let Value::Object(fields) = renderer {
        for (key, value) in fields {
            settings.insert(key, value);
        }
    }

    if let Some(password) = settings.get_mut(keys::OBS_WEBSOCKET_PASSWORD) {
        if password.as_str().map(|p| !p.is_empty()).unwrap_or(false) {
            *password = json!(REDACTED);
        }
    }

    Ok(SettingsResponse { settings })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use vexport_queue::{Dispatcher, QueueResult, RenderExportJob};
    use vexport_storage::ArtifactStore;
    use vexport_store::{
        ExportRepository, MemoryExportRepository, MemorySettingsStore, SettingsProvider,
        SettingsStore,
    };

    use crate::config::ApiConfig;
    use crate::routes::create_router;

    struct NullDispatcher;

    #[async_trait::async_trait]
    impl Dispatcher for NullDispatcher {
        async fn dispatch(&self, _job: RenderExportJob) -> QueueResult<String> {
            Ok("0-1".to_string())
        }
    }

    async fn app() -> (axum::Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = Arc::new(ArtifactStore::new(
            dir.path(),
            "http://localhost:8000/storage",
        ));
        let state = AppState {
            config: ApiConfig::default(),
            repo: Arc::new(MemoryExportRepository::new()) as Arc<dyn ExportRepository>,
            settings: Arc::new(SettingsProvider::new(
                Arc::new(MemorySettingsStore::new()) as Arc<dyn SettingsStore>,
            )),
            dispatcher: Arc::new(NullDispatcher),
            artifacts,
        };
        (create_router(state), dir)
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_get_settings_returns_defaults() {
        let (app, _dir) = app().await;
        let (status, body) = send(&app, "GET", "/api/settings", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["purge_after_minutes"], 30);
        assert_eq!(body["settings"]["show_on_homepage"], true);
        assert!(body["settings"]["resolutions"]["1080p"].is_string());
        assert_eq!(body["settings"]["load_timeout"], 30);
    }

    #[tokio::test]
    async fn test_update_unknown_key_is_rejected() {
        let (app, _dir) = app().await;
        let (status, _) = send(
            &app,
            "PUT",
            "/api/settings",
            Some(json!({"settings": {"no_such_key": 1}})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_is_visible_on_next_get() {
        let (app, _dir) = app().await;
        let (status, body) = send(
            &app,
            "PUT",
            "/api/settings",
            Some(json!({"settings": {"purge_after_minutes": 90, "force_outro": true}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["purge_after_minutes"], 90);

        let (_, body) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(body["settings"]["purge_after_minutes"], 90);
        assert_eq!(body["settings"]["force_outro"], true);
    }

    #[tokio::test]
    async fn test_password_is_never_echoed() {
        let (app, _dir) = app().await;
        let (status, body) = send(
            &app,
            "PUT",
            "/api/settings",
            Some(json!({"settings": {"obs_websocket_password": "hunter2"}})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["settings"]["obs_websocket_password"], REDACTED);

        let (_, body) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(body["settings"]["obs_websocket_password"], REDACTED);
        assert!(!body.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn test_empty_password_stays_empty() {
        let (app, _dir) = app().await;
        let (_, body) = send(&app, "GET", "/api/settings", None).await;
        assert_eq!(body["settings"]["obs_websocket_password"], "");
    }
}
