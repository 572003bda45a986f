//! Engine configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use spock_platform::PlatformConfig;

/// What fills the draw image before geometry is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundMode {
    /// Clear to a blue that pulses with the frame number.
    Clear,
    /// Run the selected compute effect.
    Compute,
}

impl FromStr for BackgroundMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clear" => Ok(Self::Clear),
            "compute" => Ok(Self::Compute),
            other => Err(anyhow!(
                "unknown background mode '{other}' (expected 'clear' or 'compute')"
            )),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Allow the user to resize the window.
    pub resizable: bool,
    /// Size of the offscreen draw image. `None` uses the initial window size.
    pub draw_extent: Option<(u32, u32)>,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    pub background: BackgroundMode,
    /// Name of the compute effect selected at startup.
    pub effect: String,
    /// Run the geometry pass.
    pub geometry: bool,
    /// Directory of compiled `.spv` shaders to use instead of the embedded ones.
    pub shader_dir: Option<PathBuf>,
    /// Sleep between loop iterations while rendering is paused.
    pub idle_interval: Duration,
    pub fence_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Spock".to_string(),
            width: 800,
            height: 450,
            resizable: false,
            draw_extent: None,
            validation: cfg!(debug_assertions),
            background: BackgroundMode::Compute,
            effect: "gradient".to_string(),
            geometry: true,
            shader_dir: None,
            idle_interval: Duration::from_millis(100),
            fence_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Fix the draw image size independently of the window.
    pub fn with_draw_extent(mut self, width: u32, height: u32) -> Self {
        self.draw_extent = Some((width, height));
        self
    }

    pub fn with_background(mut self, background: BackgroundMode) -> Self {
        self.background = background;
        self
    }

    pub fn with_geometry(mut self, geometry: bool) -> Self {
        self.geometry = geometry;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Load shaders from `dir` instead of the embedded SPIR-V.
    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = Some(dir.into());
        self
    }

    /// Parse overrides from the process command line.
    pub fn from_args() -> Result<Self> {
        Self::default().apply_args(std::env::args().skip(1))
    }

    /// Apply command line overrides on top of `self`.
    ///
    /// Unknown flags are ignored with a warning; malformed values are errors.
    pub fn apply_args<I>(mut self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        let mut draw_width = None;
        let mut draw_height = None;

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .with_context(|| format!("{flag} expects a value"))
            };

            match arg.as_str() {
                "--width" => self.width = parse_dimension("--width", &value("--width")?)?,
                "--height" => self.height = parse_dimension("--height", &value("--height")?)?,
                "--draw-width" => {
                    let width = parse_dimension("--draw-width", &value("--draw-width")?)?;
                    draw_width = Some(width);
                }
                "--draw-height" => {
                    let height = parse_dimension("--draw-height", &value("--draw-height")?)?;
                    draw_height = Some(height);
                }
                "--shaders" => self.shader_dir = Some(PathBuf::from(value("--shaders")?)),
                "--background" => self.background = value("--background")?.parse()?,
                "--effect" => self.effect = value("--effect")?,
                "--no-geometry" => self.geometry = false,
                "--validation" => self.validation = true,
                "--no-validation" => self.validation = false,
                "--resizable" => self.resizable = true,
                other => tracing::warn!("Ignoring unknown argument '{other}'"),
            }
        }

        // A missing draw dimension follows the final window size.
        if draw_width.is_some() || draw_height.is_some() {
            let (width, height) = self.draw_extent.unwrap_or((self.width, self.height));
            self.draw_extent = Some((draw_width.unwrap_or(width), draw_height.unwrap_or(height)));
        }

        Ok(self)
    }

    /// Draw image size: the explicit override or the window size.
    pub fn draw_size(&self, window: (u32, u32)) -> (u32, u32) {
        self.draw_extent.unwrap_or(window)
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            title: self.title.clone(),
            width: self.width,
            height: self.height,
            resizable: self.resizable,
        }
    }
}

fn parse_dimension(flag: &str, value: &str) -> Result<u32> {
    let parsed: u32 = value
        .parse()
        .with_context(|| format!("{flag}: '{value}' is not a number"))?;
    if parsed == 0 {
        bail!("{flag} must be greater than zero");
    }
    Ok(parsed)
}

/// Saturating conversion to the nanosecond timeouts Vulkan expects.
pub fn timeout_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!((config.width, config.height), (800, 450));
        assert_eq!(config.background, BackgroundMode::Compute);
        assert_eq!(config.effect, "gradient");
        assert!(config.geometry);
        assert_eq!(config.shader_dir, None);
        assert_eq!(config.idle_interval, Duration::from_millis(100));
        assert_eq!(timeout_ns(config.fence_timeout), 1_000_000_000);
    }

    #[test]
    fn parses_overrides() {
        let config = EngineConfig::default()
            .apply_args(args(&[
                "--width",
                "1280",
                "--height",
                "720",
                "--background",
                "clear",
                "--effect",
                "sky",
                "--no-geometry",
                "--shaders",
                "build/spv",
                "--no-validation",
                "--resizable",
            ]))
            .unwrap();

        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.background, BackgroundMode::Clear);
        assert_eq!(config.effect, "sky");
        assert!(!config.geometry);
        assert_eq!(config.shader_dir, Some(PathBuf::from("build/spv")));
        assert!(!config.validation);
        assert!(config.resizable);
        assert_eq!(config.draw_extent, None);
    }

    #[test]
    fn draw_extent_follows_window_until_overridden() {
        let config = EngineConfig::default();
        assert_eq!(config.draw_size((1024, 768)), (1024, 768));

        let config = EngineConfig::default()
            .apply_args(args(&["--draw-width", "1920"]))
            .unwrap();
        assert_eq!(config.draw_extent, Some((1920, 450)));
        assert_eq!(config.draw_size((1024, 768)), (1920, 450));
    }

    #[test]
    fn draw_extent_ignores_flag_order() {
        let before = EngineConfig::default()
            .apply_args(args(&["--draw-width", "1920", "--height", "720"]))
            .unwrap();
        let after = EngineConfig::default()
            .apply_args(args(&["--height", "720", "--draw-width", "1920"]))
            .unwrap();
        assert_eq!(before.draw_extent, Some((1920, 720)));
        assert_eq!(after.draw_extent, before.draw_extent);

        let config = EngineConfig::default()
            .with_draw_extent(640, 480)
            .apply_args(args(&["--draw-height", "360", "--width", "1280"]))
            .unwrap();
        assert_eq!(config.draw_extent, Some((640, 360)));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(EngineConfig::default()
            .apply_args(args(&["--width", "wide"]))
            .is_err());
        assert!(EngineConfig::default()
            .apply_args(args(&["--height", "0"]))
            .is_err());
        assert!(EngineConfig::default()
            .apply_args(args(&["--background", "noise"]))
            .is_err());
        assert!(EngineConfig::default()
            .apply_args(args(&["--effect"]))
            .is_err());
    }

    #[test]
    fn unknown_flags_are_ignored() {
        let config = EngineConfig::default()
            .apply_args(args(&["--fullscreen", "--width", "640"]))
            .unwrap();
        assert_eq!(config.width, 640);
    }

    #[test]
    fn timeout_saturates() {
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }
}
