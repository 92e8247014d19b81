use crate::sampler::DEFAULT_SAMPLE_INTERVAL;
use rollcall_core::DEFAULT_DISTANCE_THRESHOLD;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Roster TOML file (default: roster.toml).
    pub roster_path: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Recognition helper executable and its arguments.
    pub helper_program: String,
    pub helper_args: Vec<String>,
    /// Maximum Euclidean distance for a positive match.
    pub distance_threshold: f32,
    /// Sampling loop period.
    pub sample_interval: Duration,
    /// Number of warmup frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Overlay coordinate space; `None` uses the frame dimensions.
    pub display_size: Option<(u32, u32)>,
    /// Directory the CSV report is written to.
    pub report_dir: PathBuf,
    /// Attendance API base URL. Sync is disabled when unset.
    pub api_url: Option<String>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let report_dir = var("ROLLCALL_REPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                var("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| {
                        let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                        PathBuf::from(home).join(".local/share")
                    })
                    .join("rollcall")
            });

        let display_size = match (
            parse::<u32>(&var, "ROLLCALL_DISPLAY_WIDTH"),
            parse::<u32>(&var, "ROLLCALL_DISPLAY_HEIGHT"),
        ) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        };

        let sample_interval = parse::<u64>(&var, "ROLLCALL_SAMPLE_INTERVAL_MS")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL);

        Self {
            roster_path: var("ROLLCALL_ROSTER")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("roster.toml")),
            camera_device: var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|| "/dev/video0".to_string()),
            capture_width: parse(&var, "ROLLCALL_CAPTURE_WIDTH").unwrap_or(640),
            capture_height: parse(&var, "ROLLCALL_CAPTURE_HEIGHT").unwrap_or(480),
            helper_program: var("ROLLCALL_HELPER")
                .unwrap_or_else(|| "rollcall-face-helper".to_string()),
            helper_args: var("ROLLCALL_HELPER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            distance_threshold: parse::<f32>(&var, "ROLLCALL_DISTANCE_THRESHOLD")
                .filter(|t| t.is_finite() && *t >= 0.0)
                .unwrap_or(DEFAULT_DISTANCE_THRESHOLD),
            sample_interval,
            warmup_frames: parse(&var, "ROLLCALL_WARMUP_FRAMES").unwrap_or(4),
            display_size,
            report_dir,
            api_url: var("ROLLCALL_API_URL").filter(|v| !v.trim().is_empty()),
        }
    }
}

fn parse<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[("HOME", "/home/t")]);
        assert_eq!(cfg.roster_path, PathBuf::from("roster.toml"));
        assert_eq!(cfg.camera_device, "/dev/video0");
        assert_eq!((cfg.capture_width, cfg.capture_height), (640, 480));
        assert_eq!(cfg.helper_program, "rollcall-face-helper");
        assert!(cfg.helper_args.is_empty());
        assert_eq!(cfg.distance_threshold, 0.6);
        assert_eq!(cfg.sample_interval, Duration::from_millis(200));
        assert_eq!(cfg.warmup_frames, 4);
        assert_eq!(cfg.display_size, None);
        assert_eq!(cfg.report_dir, PathBuf::from("/home/t/.local/share/rollcall"));
        assert_eq!(cfg.api_url, None);
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("ROLLCALL_ROSTER", "/srv/class/roster.toml"),
            ("ROLLCALL_HELPER_ARGS", "--model  /opt/m.onnx"),
            ("ROLLCALL_DISTANCE_THRESHOLD", "0.45"),
            ("ROLLCALL_SAMPLE_INTERVAL_MS", "500"),
            ("ROLLCALL_DISPLAY_WIDTH", "1280"),
            ("ROLLCALL_DISPLAY_HEIGHT", "720"),
            ("XDG_DATA_HOME", "/data"),
            ("ROLLCALL_API_URL", "http://localhost:5000"),
        ]);
        assert_eq!(cfg.roster_path, PathBuf::from("/srv/class/roster.toml"));
        assert_eq!(cfg.helper_args, vec!["--model", "/opt/m.onnx"]);
        assert_eq!(cfg.distance_threshold, 0.45);
        assert_eq!(cfg.sample_interval, Duration::from_millis(500));
        assert_eq!(cfg.display_size, Some((1280, 720)));
        assert_eq!(cfg.report_dir, PathBuf::from("/data/rollcall"));
        assert_eq!(cfg.api_url.as_deref(), Some("http://localhost:5000"));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let cfg = config(&[
            ("ROLLCALL_DISTANCE_THRESHOLD", "close"),
            ("ROLLCALL_SAMPLE_INTERVAL_MS", "0"),
            ("ROLLCALL_WARMUP_FRAMES", "-1"),
            ("ROLLCALL_DISPLAY_WIDTH", "800"),
            ("ROLLCALL_API_URL", "  "),
        ]);
        assert_eq!(cfg.distance_threshold, DEFAULT_DISTANCE_THRESHOLD);
        assert_eq!(cfg.sample_interval, Duration::from_millis(200));
        assert_eq!(cfg.warmup_frames, 4);
        // Width without height is ignored.
        assert_eq!(cfg.display_size, None);
        assert_eq!(cfg.api_url, None);
    }
}
