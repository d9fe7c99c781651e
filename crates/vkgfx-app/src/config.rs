//! Window and renderer settings for [`run_app`](crate::run_app).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub title: String,
    /// Initial inner size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Frame rate cap applied by sleeping. `None` runs unthrottled.
    pub target_fps: Option<u32>,
    /// FIFO presentation when set, otherwise mailbox or immediate.
    pub vsync: bool,
    /// Request validation layers. Defaults to on in debug builds.
    pub validation: bool,
    /// Where applications look up their compiled SPIR-V.
    pub shader_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "vkgfx".to_string(),
            width: 1280,
            height: 720,
            target_fps: None,
            vsync: true,
            validation: cfg!(debug_assertions),
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

impl AppConfig {
    pub fn new(title: impl Into<String>) -> Self {
        Self::default().with_title(title)
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..self
        }
    }

    pub fn with_size(self, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..self
        }
    }

    pub fn with_target_fps(self, fps: u32) -> Self {
        Self {
            target_fps: Some(fps),
            ..self
        }
    }

    pub fn with_vsync(self, vsync: bool) -> Self {
        Self { vsync, ..self }
    }

    pub fn with_validation(self, validation: bool) -> Self {
        Self { validation, ..self }
    }

    pub fn with_shader_dir(self, dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_dir: dir.into(),
            ..self
        }
    }

    /// Minimum duration of one frame, if capped. A cap of 0 means no cap.
    pub(crate) fn min_frame_time(&self) -> Option<Duration> {
        match self.target_fps {
            Some(fps) if fps > 0 => Some(Duration::from_secs(1) / fps),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AppConfig::new("demo")
            .with_size(640, 480)
            .with_vsync(false)
            .with_validation(true)
            .with_shader_dir("out/spv");

        assert_eq!(config.title, "demo");
        assert_eq!((config.width, config.height), (640, 480));
        assert!(!config.vsync);
        assert!(config.validation);
        assert_eq!(config.shader_dir, PathBuf::from("out/spv"));
        assert_eq!(config.with_title("other").title, "other");
    }

    #[test]
    fn frame_time_follows_target_fps() {
        assert_eq!(AppConfig::default().min_frame_time(), None);
        assert_eq!(
            AppConfig::default().with_target_fps(50).min_frame_time(),
            Some(Duration::from_millis(20))
        );
        assert_eq!(AppConfig::default().with_target_fps(0).min_frame_time(), None);
    }
}
