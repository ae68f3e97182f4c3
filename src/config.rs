// Copyright © 2025 Jocelyn Turcotte <turcotte.j@gmail.com>
// SPDX-License-Identifier: MIT

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory not found")]
    NoConfigDir,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("TOML deserialization error: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid color {0:?}, expected #rrggbbaa")]
    Color(String),
}

/// RGBA color, stored as `#rrggbbaa` in the configuration file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn from_rgba_u8(r: u8, g: u8, b: u8, a: u8) -> Color {
        Color { r, g, b, a }
    }

    pub fn to_f32_array(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }

    pub fn to_wgpu(self) -> wgpu::Color {
        let [r, g, b, a] = self.to_f32_array();
        wgpu::Color {
            r: r as f64,
            g: g as f64,
            b: b as f64,
            a: a as f64,
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        parse_color(&s).ok_or(ConfigError::Color(s))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
    }
}

fn parse_color(s: &str) -> Option<Color> {
    if s.starts_with('#') && s.len() == 9 && s.is_ascii() {
        let r = u8::from_str_radix(&s[1..3], 16).ok()?;
        let g = u8::from_str_radix(&s[3..5], 16).ok()?;
        let b = u8::from_str_radix(&s[5..7], 16).ok()?;
        let a = u8::from_str_radix(&s[7..9], 16).ok()?;
        Some(Color::from_rgba_u8(r, g, b, a))
    } else {
        None
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Visual frames per second the history is sized for.
    pub refresh_rate: u32,
    /// How many visual frames of samples stay visible.
    pub persistence: u32,
    pub window_width: u32,
    pub window_height: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Stroke width in pixels of a segment at full intensity.
    pub width: f32,
    /// Segments longer than this, in pixels, get thinner.
    pub length_threshold: f32,
    /// Segments thinned below this factor are not drawn at all.
    pub min_width_factor: f32,
    pub color: Color,
    pub background: Color,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub general: GeneralConfig,
    pub line: LineConfig,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            refresh_rate: 60,
            persistence: 4,
            window_width: 800,
            window_height: 600,
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        LineConfig {
            width: 3.0,
            length_threshold: 8.0,
            min_width_factor: 0.05,
            color: Color::from_rgba_u8(0x4c, 0xff, 0x6a, 0xff),
            background: Color::from_rgba_u8(0x05, 0x0a, 0x07, 0xff),
        }
    }
}

fn get_config_path() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "xyscope")?;
    Some(project_dirs.config_dir().join("config.toml"))
}

impl Configuration {
    pub fn from_toml(s: &str) -> Result<Configuration, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Samples shown per visual frame at this rate.
    pub fn samples_per_frame(&self, sample_rate: u32) -> usize {
        (sample_rate / self.general.refresh_rate.max(1)).max(1) as usize
    }

    pub fn history_capacity(&self, sample_rate: u32) -> usize {
        self.samples_per_frame(sample_rate) * self.general.persistence.max(1) as usize
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(config_path, self.to_toml()?)?;
        Ok(())
    }

    /// `Ok(None)` when there is no configuration file yet.
    pub fn load() -> Result<Option<Configuration>, ConfigError> {
        let Some(config_path) = get_config_path() else {
            return Ok(None);
        };
        if !config_path.exists() {
            return Ok(None);
        }
        let toml_str = fs::read_to_string(config_path)?;
        Ok(Some(Configuration::from_toml(&toml_str)?))
    }
}
