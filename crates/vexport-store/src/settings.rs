//! Key/value settings with read-through caching.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use vexport_models::settings::{
    default_aspect_ratios, default_resolutions, keys, Catalog, RendererSettings,
    SettingsSnapshot, DEFAULT_PURGE_AFTER_MINUTES,
};

use crate::error::StoreResult;

/// Durable backend for settings values.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<Value>>;
    async fn set_raw(&self, key: &str, value: Value) -> StoreResult<()>;
}

const SETTINGS_HASH: &str = "vexport:settings";

/// Redis hash backend.
pub struct RedisSettingsStore {
    client: redis::Client,
}

impl RedisSettingsStore {
    pub fn new(redis_url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn from_env() -> StoreResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }
}

#[async_trait]
impl SettingsStore for RedisSettingsStore {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.hget(SETTINGS_HASH, key).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_raw(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(&value)?;
        let _: () = conn.hset(SETTINGS_HASH, key, payload).await?;
        Ok(())
    }
}

/// In-memory backend for tests and local development.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get_raw(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: Value) -> StoreResult<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Read-through cached settings, the single source of operator
/// configuration for the API and the orchestrator.
///
/// `set` writes the backend and invalidates the key's cache entry before
/// returning, so the very next read anywhere in the process observes the
/// new value. Orchestration runs take a `SettingsSnapshot` instead of
/// re-reading mid-run.
pub struct SettingsProvider {
    store: Arc<dyn SettingsStore>,
    cache: RwLock<HashMap<String, Value>>,
}

impl SettingsProvider {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Get a setting, caching the backend's answer. Missing keys resolve
    /// to (and cache) the default.
    pub async fn get(&self, key: &str, default: Value) -> StoreResult<Value> {
        if let Some(value) = self.cache.read().await.get(key) {
            return Ok(value.clone());
        }

        let value = self.store.get_raw(key).await?.unwrap_or(default);
        self.cache
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Set a setting and invalidate its cached value.
    pub async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.store.set_raw(key, value).await?;
        self.cache.write().await.remove(key);
        debug!("Updated setting {key}");
        Ok(())
    }

    /// Drop every cached value.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }

    pub async fn aspect_ratios(&self) -> StoreResult<Catalog> {
        let value = self
            .get(keys::ASPECT_RATIOS, json!(default_aspect_ratios()))
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_else(|_| default_aspect_ratios()))
    }

    pub async fn resolutions(&self) -> StoreResult<Catalog> {
        let value = self
            .get(keys::RESOLUTIONS, json!(default_resolutions()))
            .await?;
        Ok(serde_json::from_value(value).unwrap_or_else(|_| default_resolutions()))
    }

    pub async fn purge_after_minutes(&self) -> StoreResult<i64> {
        let value = self
            .get(keys::PURGE_AFTER_MINUTES, json!(DEFAULT_PURGE_AFTER_MINUTES))
            .await?;
        Ok(value.as_i64().unwrap_or(DEFAULT_PURGE_AFTER_MINUTES))
    }

    pub async fn show_on_homepage(&self) -> StoreResult<bool> {
        let value = self.get(keys::SHOW_ON_HOMEPAGE, json!(true)).await?;
        Ok(value.as_bool().unwrap_or(true))
    }

    /// Settings consumed by the renderer command builder.
    pub async fn renderer_settings(&self) -> StoreResult<RendererSettings> {
        let defaults = RendererSettings::default();
        Ok(RendererSettings {
            obs_websocket_address: self
                .get_string(keys::OBS_WEBSOCKET_ADDRESS, "")
                .await?,
            obs_websocket_port: self.get_string(keys::OBS_WEBSOCKET_PORT, "").await?,
            obs_websocket_password: self
                .get_string(keys::OBS_WEBSOCKET_PASSWORD, "")
                .await?,
            obs_fps: self.get_string(keys::OBS_FPS, "").await?,
            obs_no_overwrite: self.get_bool(keys::OBS_NO_OVERWRITE, false).await?,
            obs_required: self.get_bool(keys::OBS_REQUIRED, false).await?,
            load_timeout: self
                .get_timeout(keys::LOAD_TIMEOUT, defaults.load_timeout)
                .await?,
            video_timeout: self
                .get_timeout(keys::VIDEO_TIMEOUT, defaults.video_timeout)
                .await?,
            force_outro: self.get_bool(keys::FORCE_OUTRO, false).await?,
        })
    }

    /// Snapshot after dropping the local cache. Used by the worker, whose
    /// process never sees the API process's invalidations; each run and
    /// sweep re-reads the backend so operator edits apply to the next run.
    pub async fn fresh_snapshot(&self) -> StoreResult<SettingsSnapshot> {
        self.clear_cache().await;
        self.snapshot().await
    }

    /// Everything one orchestration run needs, read at build time.
    pub async fn snapshot(&self) -> StoreResult<SettingsSnapshot> {
        Ok(SettingsSnapshot {
            renderer: self.renderer_settings().await?,
            aspect_ratios: self.aspect_ratios().await?,
            resolutions: self.resolutions().await?,
            purge_after_minutes: self.purge_after_minutes().await?,
            show_on_homepage: self.show_on_homepage().await?,
        })
    }

    async fn get_string(&self, key: &str, default: &str) -> StoreResult<String> {
        let value = self.get(key, json!(default)).await?;
        Ok(match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            _ => default.to_string(),
        })
    }

    async fn get_bool(&self, key: &str, default: bool) -> StoreResult<bool> {
        let value = self.get(key, json!(default)).await?;
        Ok(value.as_bool().unwrap_or(default))
    }

    async fn get_timeout(&self, key: &str, default: Option<u32>) -> StoreResult<Option<u32>> {
        let value = self.get(key, json!(default)).await?;
        Ok(match value {
            Value::Number(n) => n.as_u64().map(|v| v as u32),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }
}
