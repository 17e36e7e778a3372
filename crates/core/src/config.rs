use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::atlas::{DEFAULT_CHAR_HEIGHT, DEFAULT_CHAR_WIDTH};
use crate::color::Rgba;
use crate::store::PrintOverflow;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub buffer: BufferConfig,
    pub colors: ColorsConfig,
    pub atlas: AtlasConfig,
    pub window: WindowConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub columns: u32,
    pub rows: u32,
    pub char_width: u32,
    pub char_height: u32,
    pub print_overflow: PrintOverflow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorsConfig {
    pub foreground: String,
    pub background: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub scale: f32,
    pub clear_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub monitor: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            columns: 80,
            rows: 25,
            char_width: DEFAULT_CHAR_WIDTH,
            char_height: DEFAULT_CHAR_HEIGHT,
            print_overflow: PrintOverflow::Flow,
        }
    }
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            foreground: "#c0c0c0".to_string(),
            background: "#000000".to_string(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "cellquad".to_string(),
            scale: 1.0,
            clear_color: "#0f0f10".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { monitor: true }
    }
}

impl ColorsConfig {
    /// Parsed `(foreground, background)`.
    pub fn parse(&self) -> Result<(Rgba, Rgba)> {
        let fg = Rgba::from_hex(&self.foreground).context("colors.foreground")?;
        let bg = Rgba::from_hex(&self.background).context("colors.background")?;
        Ok((fg, bg))
    }
}

impl Config {
    /// Loads the user config, writing the defaults out on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.colors.parse()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)?;

        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home).join(".config").join("cellquad").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.buffer.columns, 80);
        assert_eq!(config.buffer.char_width, 8);
        assert_eq!(config.buffer.char_height, 12);
        assert_eq!(config.buffer.print_overflow, PrintOverflow::Flow);
        assert_eq!(
            config.colors.parse().unwrap(),
            (Rgba::LIGHT_GRAY, Rgba::BLACK)
        );
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r##"
            [buffer]
            columns = 40
            print_overflow = "clip_to_row"

            [colors]
            background = "#10203080"
            "##,
        )
        .unwrap();
        assert_eq!(config.buffer.columns, 40);
        assert_eq!(config.buffer.rows, 25);
        assert_eq!(config.buffer.print_overflow, PrintOverflow::ClipToRow);
        assert_eq!(config.colors.parse().unwrap().1, Rgba::rgba(0x10, 0x20, 0x30, 0x80));
    }

    #[test]
    fn bad_color_fails_to_load() {
        let err = Config::from_toml("[colors]\nforeground = \"red\"\n").unwrap_err();
        assert!(format!("{err:#}").contains("colors.foreground"));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = Config::default();
        config.atlas.path = Some(PathBuf::from("fonts/cp437_8x12.png"));
        let text = toml::to_string_pretty(&config).unwrap();
        let back = Config::from_toml(&text).unwrap();
        assert_eq!(back.atlas.path, config.atlas.path);
        assert_eq!(back.window.title, "cellquad");
    }
}
