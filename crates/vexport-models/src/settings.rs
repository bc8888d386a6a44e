//! Operator-configurable settings.
//!
//! Settings are stored as a key/value map and read fresh at the moment a
//! renderer command is built, so operator changes apply to the next run
//! and never retroactively to one already executing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Setting keys understood by the backend.
pub mod keys {
    /// Aspect-ratio catalog (key -> human label)
    pub const ASPECT_RATIOS: &str = "aspect_ratios";
    /// Resolution catalog (key -> human label)
    pub const RESOLUTIONS: &str = "resolutions";
    /// OBS websocket address for the renderer's remote control
    pub const OBS_WEBSOCKET_ADDRESS: &str = "obs_websocket_address";
    /// OBS websocket port
    pub const OBS_WEBSOCKET_PORT: &str = "obs_websocket_port";
    /// OBS websocket password (redacted in logs and API responses)
    pub const OBS_WEBSOCKET_PASSWORD: &str = "obs_websocket_password";
    /// Target frame rate for OBS capture
    pub const OBS_FPS: &str = "obs_fps";
    /// Refuse to overwrite an existing OBS recording
    pub const OBS_NO_OVERWRITE: &str = "obs_no_overwrite";
    /// Fail the render when OBS cannot be reached
    pub const OBS_REQUIRED: &str = "obs_required";
    /// Seconds to wait for the remote player to load (0/unset = no flag)
    pub const LOAD_TIMEOUT: &str = "load_timeout";
    /// Seconds to wait for video playback (0/unset = no flag)
    pub const VIDEO_TIMEOUT: &str = "video_timeout";
    /// Always render the outro, overriding the caller's choice
    pub const FORCE_OUTRO: &str = "force_outro";
    /// Retention window in minutes; non-positive disables purging
    pub const PURGE_AFTER_MINUTES: &str = "purge_after_minutes";
    /// Whether the public homepage advertises the service
    pub const SHOW_ON_HOMEPAGE: &str = "show_on_homepage";

    /// Every key the backend persists, for cache management.
    pub const ALL: &[&str] = &[
        ASPECT_RATIOS,
        RESOLUTIONS,
        OBS_WEBSOCKET_ADDRESS,
        OBS_WEBSOCKET_PORT,
        OBS_WEBSOCKET_PASSWORD,
        OBS_FPS,
        OBS_NO_OVERWRITE,
        OBS_REQUIRED,
        LOAD_TIMEOUT,
        VIDEO_TIMEOUT,
        FORCE_OUTRO,
        PURGE_AFTER_MINUTES,
        SHOW_ON_HOMEPAGE,
    ];
}

/// A selectable catalog: option key mapped to a human-readable label.
pub type Catalog = BTreeMap<String, String>;

/// Default aspect-ratio catalog.
pub fn default_aspect_ratios() -> Catalog {
    [
        ("4:3", "4:3 (Standard)"),
        ("16:9", "16:9 (Widescreen)"),
        ("14:9", "14:9 (Classic)"),
        ("9:16", "9:16 (Vertical)"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Default resolution catalog.
pub fn default_resolutions() -> Catalog {
    [
        ("240p", "240p (Low)"),
        ("360p", "360p (SD)"),
        ("420p", "420p"),
        ("480p", "480p"),
        ("720p", "720p (HD)"),
        ("1080p", "1080p (Full HD)"),
        ("1440p", "1440p (2K)"),
        ("2k", "2K"),
        ("4k", "4K (Ultra HD)"),
        ("5k", "5K"),
        ("8k", "8K"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Default retention window in minutes.
pub const DEFAULT_PURGE_AFTER_MINUTES: i64 = 30;

/// Renderer-facing settings consumed by the command builder.
///
/// Empty strings and unset/zero timeouts mean "do not emit the flag".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RendererSettings {
    #[serde(default)]
    pub obs_websocket_address: String,
    #[serde(default)]
    pub obs_websocket_port: String,
    #[serde(default)]
    pub obs_websocket_password: String,
    #[serde(default)]
    pub obs_fps: String,
    #[serde(default)]
    pub obs_no_overwrite: bool,
    #[serde(default)]
    pub obs_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_timeout: Option<u32>,
    #[serde(default)]
    pub force_outro: bool,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            obs_websocket_address: String::new(),
            obs_websocket_port: String::new(),
            obs_websocket_password: String::new(),
            obs_fps: String::new(),
            obs_no_overwrite: false,
            obs_required: false,
            load_timeout: Some(30),
            video_timeout: None,
            force_outro: false,
        }
    }
}

/// All settings read at the moment a run is orchestrated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SettingsSnapshot {
    pub renderer: RendererSettings,
    pub aspect_ratios: Catalog,
    pub resolutions: Catalog,
    pub purge_after_minutes: i64,
    pub show_on_homepage: bool,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            renderer: RendererSettings::default(),
            aspect_ratios: default_aspect_ratios(),
            resolutions: default_resolutions(),
            purge_after_minutes: DEFAULT_PURGE_AFTER_MINUTES,
            show_on_homepage: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalogs_contain_common_keys() {
        let ratios = default_aspect_ratios();
        assert!(ratios.contains_key("16:9"));
        assert!(ratios.contains_key("9:16"));

        let resolutions = default_resolutions();
        assert!(resolutions.contains_key("1080p"));
    }

    #[test]
    fn test_renderer_settings_defaults() {
        let settings = RendererSettings::default();
        assert_eq!(settings.load_timeout, Some(30));
        assert_eq!(settings.video_timeout, None);
        assert!(!settings.force_outro);
        assert!(settings.obs_websocket_address.is_empty());
    }
}
