use std::fs;
use std::path::Path;
use std::time::Duration;

use engine_core::logging::{self, LogLevel};

const SETTINGS_VERSION: u32 = 1;
const DEFAULT_RESOLUTION: [u32; 2] = [1280, 720];
const MIN_RESOLUTION: [u32; 2] = [640, 480];
const MAX_RESOLUTION: [u32; 2] = [7680, 4320];
const MOVE_SPEED_RANGE: (f32, f32) = (0.5, 20.0);
const JUMP_SPEED_RANGE: (f32, f32) = (0.0, 20.0);
const EYE_HEIGHT_RANGE: (f32, f32) = (0.5, 3.0);
const SENSITIVITY_RANGE: (f32, f32) = (0.0001, 0.05);
const GAZE_INTERVAL_RANGE_MS: (u64, u64) = (16, 10_000);

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub version: u32,
    pub move_speed: f32,
    pub jump_speed: f32,
    pub eye_height: f32,
    pub mouse_sensitivity: f32,
    pub gaze_interval_ms: u64,
    pub camera_smoothing: f32,
    pub resolution: [u32; 2],
    pub log_level: LogLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            move_speed: 5.0,
            jump_speed: 5.0,
            eye_height: 1.6,
            mouse_sensitivity: 0.002,
            gaze_interval_ms: 500,
            camera_smoothing: 0.2,
            resolution: DEFAULT_RESOLUTION,
            log_level: LogLevel::Info,
        }
    }
}

impl Settings {
    /// Reads `path`, falling back to defaults when it is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(err) => {
                logging::warn(
                    "settings",
                    format!("read {} failed ({}), using defaults", path.display(), err),
                );
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Self {
        let mut settings = Self::default();
        let mut version = None;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "version" => {
                    version = value.parse::<u32>().ok();
                }
                "move_speed" => {
                    if let Ok(value) = value.parse::<f32>() {
                        settings.move_speed = value;
                    }
                }
                "jump_speed" => {
                    if let Ok(value) = value.parse::<f32>() {
                        settings.jump_speed = value;
                    }
                }
                "eye_height" => {
                    if let Ok(value) = value.parse::<f32>() {
                        settings.eye_height = value;
                    }
                }
                "mouse_sensitivity" => {
                    if let Ok(value) = value.parse::<f32>() {
                        settings.mouse_sensitivity = value;
                    }
                }
                "gaze_interval_ms" => {
                    if let Ok(value) = value.parse::<u64>() {
                        settings.gaze_interval_ms = value;
                    }
                }
                "camera_smoothing" => {
                    if let Ok(value) = value.parse::<f32>() {
                        settings.camera_smoothing = value;
                    }
                }
                "resolution" => {
                    if let Some(value) = parse_resolution(value) {
                        settings.resolution = value;
                    }
                }
                "log_level" => {
                    if let Some(value) = LogLevel::parse(value) {
                        settings.log_level = value;
                    }
                }
                _ => {}
            }
        }
        if let Some(version) = version {
            if version != SETTINGS_VERSION {
                return Self::default();
            }
        }
        settings.normalize();
        settings
    }

    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;
        self.move_speed = clamp_or(self.move_speed, MOVE_SPEED_RANGE, 5.0);
        self.jump_speed = clamp_or(self.jump_speed, JUMP_SPEED_RANGE, 5.0);
        self.eye_height = clamp_or(self.eye_height, EYE_HEIGHT_RANGE, 1.6);
        self.mouse_sensitivity = clamp_or(self.mouse_sensitivity, SENSITIVITY_RANGE, 0.002);
        self.camera_smoothing = clamp_or(self.camera_smoothing, (0.01, 1.0), 0.2);
        self.gaze_interval_ms = self
            .gaze_interval_ms
            .clamp(GAZE_INTERVAL_RANGE_MS.0, GAZE_INTERVAL_RANGE_MS.1);
        self.resolution = clamp_resolution(self.resolution);
    }

    pub fn gaze_interval(&self) -> Duration {
        Duration::from_millis(self.gaze_interval_ms)
    }
}

fn clamp_or(value: f32, (min, max): (f32, f32), fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

pub fn parse_resolution(value: &str) -> Option<[u32; 2]> {
    let (width, height) = value
        .split_once('x')
        .or_else(|| value.split_once(','))
        .or_else(|| value.split_once('X'))?;
    let width = width.trim().parse::<u32>().ok()?;
    let height = height.trim().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some([width, height])
}

fn clamp_resolution(resolution: [u32; 2]) -> [u32; 2] {
    let width = resolution[0].clamp(MIN_RESOLUTION[0], MAX_RESOLUTION[0]);
    let height = resolution[1].clamp(MIN_RESOLUTION[1], MAX_RESOLUTION[1]);
    [width, height]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_keys_and_skips_noise() {
        let settings = Settings::parse(
            "# walkthrough tuning\n\
             move_speed = 3.5\n\
             jump_speed=4\n\
             resolution=1920x1080\n\
             log_level=debug\n\
             fov=90\n\
             not a pair\n",
        );
        assert_eq!(settings.move_speed, 3.5);
        assert_eq!(settings.jump_speed, 4.0);
        assert_eq!(settings.resolution, [1920, 1080]);
        assert_eq!(settings.log_level, LogLevel::Debug);
        assert_eq!(settings.eye_height, 1.6);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let settings = Settings::parse(
            "move_speed=500\n\
             mouse_sensitivity=0\n\
             gaze_interval_ms=1\n\
             camera_smoothing=3\n\
             resolution=100x100\n",
        );
        assert_eq!(settings.move_speed, MOVE_SPEED_RANGE.1);
        assert_eq!(settings.mouse_sensitivity, SENSITIVITY_RANGE.0);
        assert_eq!(settings.gaze_interval_ms, GAZE_INTERVAL_RANGE_MS.0);
        assert_eq!(settings.camera_smoothing, 1.0);
        assert_eq!(settings.resolution, MIN_RESOLUTION);
    }

    #[test]
    fn non_finite_values_fall_back() {
        let settings = Settings::parse("eye_height=NaN\nmove_speed=inf\n");
        assert_eq!(settings.eye_height, 1.6);
        assert_eq!(settings.move_speed, 5.0);
    }

    #[test]
    fn unknown_version_resets_to_defaults() {
        let settings = Settings::parse("version=7\nmove_speed=2\n");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let settings = Settings::load(Path::new("definitely/not/here.cfg"));
        assert_eq!(settings, Settings::default());
    }
}
