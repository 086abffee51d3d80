// =============================================================================
// CONFIGURATION - Load settings from glimmer.toml
// =============================================================================
//
// Loading and parsing of the probe/application config file, plus conversion
// into the driver and surface configs the library consumes. Missing files and
// missing keys fall back to defaults.

use crate::backend::VulkanDriverConfig;
use crate::surface::{Extent, PresentMode, SurfaceConfig, SurfaceFormat, SurfaceTarget};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "glimmer.toml";

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub application: ApplicationConfig,
    pub driver: DriverConfig,
    pub vulkan: VulkanConfig,
    pub surface: SurfaceSettings,
    pub debug: DebugConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    pub name: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "glimmer".to_string(),
        }
    }
}

/// Which backend the application constructs
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    #[default]
    Vulkan,
    Null,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DriverConfig {
    pub backend: BackendChoice,
}

/// Vulkan backend settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct VulkanConfig {
    pub validation_layers: bool,
    /// "major.minor", e.g. "1.2"
    pub api_version: String,
    pub instance_extensions: Vec<String>,
    pub enable_all_device_extensions: bool,
    pub preferred_device: Option<usize>,
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            api_version: "1.2".to_string(),
            instance_extensions: Vec::new(),
            enable_all_device_extensions: true,
            preferred_device: None,
        }
    }
}

/// Surface settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SurfaceSettings {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub present_mode: String,
    pub image_count: u32,
    /// Open a window and present to it instead of rendering offscreen
    pub windowed: bool,
}

impl Default for SurfaceSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            format: "bgra8_srgb".to_string(),
            present_mode: "fifo".to_string(),
            image_count: 2,
            windowed: false,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "glimmer.log".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from glimmer.toml, falling back to defaults
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", DEFAULT_CONFIG_PATH, e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Surface format, defaulting to BGRA8 sRGB on unknown names
    pub fn surface_format(&self) -> SurfaceFormat {
        SurfaceFormat::from_name(&self.surface.format).unwrap_or_else(|| {
            log::warn!(
                "Unknown surface format '{}', defaulting to {:?}",
                self.surface.format,
                SurfaceFormat::default()
            );
            SurfaceFormat::default()
        })
    }

    /// Present mode, defaulting to FIFO on unknown names
    pub fn present_mode(&self) -> PresentMode {
        PresentMode::from_name(&self.surface.present_mode).unwrap_or_else(|| {
            log::warn!(
                "Unknown present mode '{}', defaulting to FIFO",
                self.surface.present_mode
            );
            PresentMode::Fifo
        })
    }

    /// Packed Vulkan API version, defaulting to 1.2 on malformed input
    pub fn api_version(&self) -> u32 {
        parse_api_version(&self.vulkan.api_version).unwrap_or_else(|| {
            log::warn!(
                "Malformed Vulkan API version '{}', defaulting to 1.2",
                self.vulkan.api_version
            );
            ash::vk::API_VERSION_1_2
        })
    }

    /// Offscreen surface config; window targets are filled in by the caller
    pub fn surface_config(&self) -> SurfaceConfig {
        SurfaceConfig {
            extent: Extent::new(self.surface.width, self.surface.height),
            format: self.surface_format(),
            present_mode: self.present_mode(),
            image_count: self.surface.image_count,
            target: SurfaceTarget::Offscreen,
        }
    }

    /// Vulkan driver config. Validation also requires a debug build.
    pub fn vulkan_driver_config(&self) -> VulkanDriverConfig {
        VulkanDriverConfig {
            app_name: self.application.name.clone(),
            api_version: self.api_version(),
            validation: cfg!(debug_assertions) && self.vulkan.validation_layers,
            instance_extensions: self.vulkan.instance_extensions.clone(),
            enable_all_device_extensions: self.vulkan.enable_all_device_extensions,
            preferred_device: self.vulkan.preferred_device,
        }
    }
}

// Bit widths of the packed version: 7-bit major, 10-bit minor, 12-bit patch
const MAX_MAJOR: u32 = 0x7f;
const MAX_MINOR: u32 = 0x3ff;
const MAX_PATCH: u32 = 0xfff;

fn parse_api_version(text: &str) -> Option<u32> {
    let mut parts = text.trim().split('.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    let patch: u32 = parts.next().map_or(Some(0), |p| p.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }
    if major > MAX_MAJOR || minor > MAX_MINOR || patch > MAX_PATCH {
        return None;
    }
    Some(ash::vk::make_api_version(0, major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.driver.backend, BackendChoice::Vulkan);
        assert_eq!(config.surface_config(), SurfaceConfig::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::parse(
            r#"
            [application]
            name = "probe"

            [driver]
            backend = "null"

            [vulkan]
            api_version = "1.3"
            instance_extensions = ["VK_KHR_surface"]
            enable_all_device_extensions = false
            preferred_device = 1

            [surface]
            width = 640
            height = 480
            format = "rgba16_float"
            present_mode = "mailbox"
            image_count = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.driver.backend, BackendChoice::Null);
        let surface = config.surface_config();
        assert_eq!(surface.extent, Extent::new(640, 480));
        assert_eq!(surface.format, SurfaceFormat::Rgba16Float);
        assert_eq!(surface.present_mode, PresentMode::Mailbox);
        assert_eq!(surface.image_count, 3);

        let vulkan = config.vulkan_driver_config();
        assert_eq!(vulkan.app_name, "probe");
        assert_eq!(vulkan.api_version, ash::vk::API_VERSION_1_3);
        assert_eq!(vulkan.instance_extensions, vec!["VK_KHR_surface".to_string()]);
        assert!(!vulkan.enable_all_device_extensions);
        assert_eq!(vulkan.preferred_device, Some(1));
        // Debug settings untouched
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn unknown_names_fall_back() {
        let config = Config::parse(
            r#"
            [surface]
            format = "yuv420"
            present_mode = "adaptive"
            [vulkan]
            api_version = "one.two"
            "#,
        )
        .unwrap();
        assert_eq!(config.surface_format(), SurfaceFormat::Bgra8Srgb);
        assert_eq!(config.present_mode(), PresentMode::Fifo);
        assert_eq!(config.api_version(), ash::vk::API_VERSION_1_2);
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        assert!(Config::parse("[driver]\nbackend = \"metal\"").is_err());
    }

    #[test]
    fn api_version_parsing() {
        assert_eq!(parse_api_version("1"), Some(ash::vk::make_api_version(0, 1, 0, 0)));
        assert_eq!(parse_api_version("1.1.5"), Some(ash::vk::make_api_version(0, 1, 1, 5)));
        assert_eq!(parse_api_version("1.2.3.4"), None);
        assert_eq!(parse_api_version(""), None);
    }

    #[test]
    fn out_of_range_api_version_components_are_rejected() {
        assert_eq!(parse_api_version("1.5000"), None);
        assert_eq!(parse_api_version("128.0"), None);
        assert_eq!(parse_api_version("1.0.5000"), None);
        assert_eq!(
            parse_api_version("127.1023.4095"),
            Some(ash::vk::make_api_version(0, 127, 1023, 4095))
        );

        let config = Config::parse("[vulkan]\napi_version = \"1.5000\"").unwrap();
        assert_eq!(config.api_version(), ash::vk::API_VERSION_1_2);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here/glimmer.toml").unwrap();
        assert_eq!(config, Config::default());
    }
}
