//! Renderer command builder.
//!
//! Maps an export request plus a renderer-settings snapshot to the exact
//! GoExport CLI invocation. Building is pure: same inputs, same argument
//! list. The unique output path is supplied by the caller so concurrent
//! builds for identical requests can never collide on filenames.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use vexport_models::{ExportRequest, RendererSettings};

/// X11 display the shared rendering environment pins the renderer to.
pub const RENDER_DISPLAY: &str = ":99";

/// PulseAudio sink the renderer captures from.
pub const PULSE_AUDIO_SINK: &str = "auto_null.monitor";

/// Search path injected when the parent environment carries none.
pub const FALLBACK_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// ffmpeg invocation template handed to the renderer for Linux capture.
/// The renderer substitutes the {placeholders} itself.
const FFMPEG_LINUX_OVERRIDE: &str = "{ffmpeg} -y -f x11grab -video_size {width}x{height} \
    -framerate 60 -draw_mouse 0 -i {display} -f pulse -i {pulse_audio} -ac 2 \
    -c:v libx264 -preset ultrafast -tune zerolatency -crf 23 -pix_fmt yuv420p \
    -profile:v baseline -level 4.2 -bf 0 -refs 1 -threads 0 \
    -c:a aac -b:a 160k -ar 44100 -movflags +faststart '{output}'";

/// A fully specified renderer invocation.
#[derive(Debug, Clone)]
pub struct RendererCommand {
    binary: PathBuf,
    args: Vec<String>,
    sensitive: Vec<usize>,
}

impl RendererCommand {
    /// Build the invocation for one export.
    pub fn new(
        binary: impl AsRef<Path>,
        request: &ExportRequest,
        settings: &RendererSettings,
        output_path: impl AsRef<Path>,
    ) -> Self {
        // Operator override always wins over a caller's "no outro" choice.
        let use_outro = settings.force_outro || request.outro;

        let mut args = vec![
            format!("--service={}", request.service),
            format!("--aspect_ratio={}", request.aspect_ratio),
            format!("--resolution={}", request.resolution),
            format!("--movie-id={}", request.video_id),
            format!("--owner-id={}", request.owner_id),
            format!("--output-path={}", output_path.as_ref().display()),
            "--auto-edit".to_string(),
            "--no-input".to_string(),
            "--json".to_string(),
            "--console".to_string(),
            format!("--x11grab-display={RENDER_DISPLAY}"),
            format!("--pulse-audio={PULSE_AUDIO_SINK}"),
            "--skip-resolution-check".to_string(),
            "--ffmpeg-linux-override".to_string(),
            FFMPEG_LINUX_OVERRIDE.to_string(),
        ];

        let mut sensitive = Vec::new();

        if !settings.obs_websocket_address.is_empty() {
            args.push(format!(
                "--obs-websocket-address={}",
                settings.obs_websocket_address
            ));
        }
        if !settings.obs_websocket_port.is_empty() {
            args.push(format!("--obs-websocket-port={}", settings.obs_websocket_port));
        }
        if !settings.obs_websocket_password.is_empty() {
            args.push(format!(
                "--obs-websocket-password={}",
                settings.obs_websocket_password
            ));
            sensitive.push(args.len() - 1);
        }
        if !settings.obs_fps.is_empty() {
            args.push(format!("--obs-fps={}", settings.obs_fps));
        }
        if settings.obs_no_overwrite {
            args.push("--obs-no-overwrite".to_string());
        }
        if settings.obs_required {
            args.push("--obs-required".to_string());
        }

        // Zero means "no limit" to us; omit the flag rather than emit an
        // ambiguous --timeout=0.
        if let Some(secs) = settings.load_timeout.filter(|s| *s > 0) {
            args.push(format!("--load-timeout={secs}"));
        }
        if let Some(secs) = settings.video_timeout.filter(|s| *s > 0) {
            args.push(format!("--video-timeout={secs}"));
        }

        if use_outro {
            args.push("--use-outro".to_string());
        }

        Self {
            binary: binary.as_ref().to_path_buf(),
            args,
            sensitive,
        }
    }

    /// Bypass the builder for runner tests that need arbitrary processes.
    #[cfg(test)]
    pub(crate) fn raw(binary: impl AsRef<Path>, args: Vec<String>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            args,
            sensitive: Vec::new(),
        }
    }

    /// Path of the renderer binary.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// The ordered argument list.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment for the invocation: the parent environment with the
    /// display pinned and a fallback search path when none is inherited.
    pub fn envs(&self) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = std::env::vars().collect();

        env.insert("DISPLAY".to_string(), RENDER_DISPLAY.to_string());

        let missing_path = env.get("PATH").map(|p| p.is_empty()).unwrap_or(true);
        if missing_path {
            env.insert("PATH".to_string(), FALLBACK_PATH.to_string());
        }

        env
    }

    /// Render the command for diagnostics with values quoted and the
    /// websocket password replaced, so the fact that a password was
    /// supplied stays visible without the cleartext ever hitting a log.
    pub fn display_redacted(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.binary.display().to_string());

        for (i, arg) in self.args.iter().enumerate() {
            match arg.split_once('=') {
                Some((flag, value)) => {
                    let shown = if self.sensitive.contains(&i) {
                        "[redacted]".to_string()
                    } else {
                        value.replace('"', "\\\"")
                    };
                    parts.push(format!("{flag}=\"{shown}\""));
                }
                None => parts.push(arg.clone()),
            }
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ExportRequest {
        ExportRequest {
            service: "acme".to_string(),
            owner_id: "42".to_string(),
            video_id: "v1".to_string(),
            aspect_ratio: "16:9".to_string(),
            resolution: "1080p".to_string(),
            outro: false,
        }
    }

    fn settings() -> RendererSettings {
        RendererSettings {
            load_timeout: None,
            ..RendererSettings::default()
        }
    }

    #[test]
    fn test_build_is_deterministic() {
        let req = request();
        let cfg = RendererSettings::default();

        let a = RendererCommand::new("/opt/goexport", &req, &cfg, "/tmp/out.mp4");
        let b = RendererCommand::new("/opt/goexport", &req, &cfg, "/tmp/out.mp4");
        assert_eq!(a.args(), b.args());
    }

    #[test]
    fn test_always_non_interactive_and_pinned_display() {
        let cmd = RendererCommand::new("/opt/goexport", &request(), &settings(), "/tmp/out.mp4");
        let args = cmd.args();

        assert!(args.contains(&"--auto-edit".to_string()));
        assert!(args.contains(&"--no-input".to_string()));
        assert!(args.contains(&"--json".to_string()));
        assert!(args.contains(&"--x11grab-display=:99".to_string()));
        assert!(args.contains(&"--pulse-audio=auto_null.monitor".to_string()));
    }

    #[test]
    fn test_force_outro_overrides_caller() {
        let mut cfg = settings();
        cfg.force_outro = true;

        let cmd = RendererCommand::new("/opt/goexport", &request(), &cfg, "/tmp/out.mp4");
        assert!(cmd.args().contains(&"--use-outro".to_string()));
    }

    #[test]
    fn test_no_outro_when_neither_asks() {
        let cmd = RendererCommand::new("/opt/goexport", &request(), &settings(), "/tmp/out.mp4");
        assert!(!cmd.args().contains(&"--use-outro".to_string()));
    }

    #[test]
    fn test_caller_outro_respected() {
        let mut req = request();
        req.outro = true;

        let cmd = RendererCommand::new("/opt/goexport", &req, &settings(), "/tmp/out.mp4");
        assert!(cmd.args().contains(&"--use-outro".to_string()));
    }

    #[test]
    fn test_absent_optional_settings_emit_no_flags() {
        let cmd = RendererCommand::new("/opt/goexport", &request(), &settings(), "/tmp/out.mp4");
        for arg in cmd.args() {
            assert!(!arg.starts_with("--obs-"), "unexpected flag: {arg}");
            assert!(!arg.starts_with("--load-timeout"), "unexpected flag: {arg}");
            assert!(!arg.starts_with("--video-timeout"), "unexpected flag: {arg}");
        }
    }

    #[test]
    fn test_configured_obs_settings_emit_flags() {
        let mut cfg = settings();
        cfg.obs_websocket_address = "127.0.0.1".to_string();
        cfg.obs_websocket_port = "4455".to_string();
        cfg.obs_fps = "60".to_string();
        cfg.obs_no_overwrite = true;
        cfg.obs_required = true;

        let cmd = RendererCommand::new("/opt/goexport", &request(), &cfg, "/tmp/out.mp4");
        let args = cmd.args();
        assert!(args.contains(&"--obs-websocket-address=127.0.0.1".to_string()));
        assert!(args.contains(&"--obs-websocket-port=4455".to_string()));
        assert!(args.contains(&"--obs-fps=60".to_string()));
        assert!(args.contains(&"--obs-no-overwrite".to_string()));
        assert!(args.contains(&"--obs-required".to_string()));
    }

    #[test]
    fn test_zero_timeout_omits_flag() {
        let mut cfg = settings();
        cfg.load_timeout = Some(0);
        cfg.video_timeout = Some(0);

        let cmd = RendererCommand::new("/opt/goexport", &request(), &cfg, "/tmp/out.mp4");
        for arg in cmd.args() {
            assert!(!arg.contains("timeout"), "unexpected flag: {arg}");
        }
    }

    #[test]
    fn test_nonzero_timeouts_emit_flags() {
        let mut cfg = settings();
        cfg.load_timeout = Some(30);
        cfg.video_timeout = Some(600);

        let cmd = RendererCommand::new("/opt/goexport", &request(), &cfg, "/tmp/out.mp4");
        assert!(cmd.args().contains(&"--load-timeout=30".to_string()));
        assert!(cmd.args().contains(&"--video-timeout=600".to_string()));
    }

    #[test]
    fn test_password_redacted_but_present_in_display() {
        let mut cfg = settings();
        cfg.obs_websocket_password = "hunter2".to_string();

        let cmd = RendererCommand::new("/opt/goexport", &request(), &cfg, "/tmp/out.mp4");
        let shown = cmd.display_redacted();

        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("--obs-websocket-password=\"[redacted]\""));
        // The real argument list still carries the value for the process.
        assert!(cmd
            .args()
            .contains(&"--obs-websocket-password=hunter2".to_string()));
    }

    #[test]
    fn test_env_pins_display() {
        let cmd = RendererCommand::new("/opt/goexport", &request(), &settings(), "/tmp/out.mp4");
        let env = cmd.envs();
        assert_eq!(env.get("DISPLAY").map(String::as_str), Some(":99"));
        assert!(env.get("PATH").map(|p| !p.is_empty()).unwrap_or(false));
    }
}
