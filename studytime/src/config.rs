use crate::driver::DriverKind;
use crate::timer::{TimerState, DEFAULT_ALARM};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use studytime_ipc::SOCKET_PATH;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub timer: TimerConfig,
    pub storage: StorageConfig,
    pub ipc: IpcConfig,
    pub alarms: Vec<Alarm>,
    pub theme: Theme,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimerConfig {
    /// Countdown length used when there is no saved state.
    pub minutes: u64,
    pub seconds: u64,
    pub alarm: String,
    pub driver: DriverKind,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    /// Snapshot directory. Defaults to the platform data directory.
    pub dir: Option<PathBuf>,
    pub key: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IpcConfig {
    pub socket_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub accent: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub black: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub red: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub green: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub yellow: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub blue: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
}

impl Config {
    /// The state used on first launch.
    pub fn default_state(&self) -> TimerState {
        let total = self
            .timer
            .minutes
            .saturating_mul(60)
            .saturating_add(self.timer.seconds);
        TimerState::new(total, self.timer.alarm.clone())
    }

    /// Configured alarms, or the built-in set when none are configured.
    pub fn alarms(&self) -> Vec<Alarm> {
        if self.alarms.is_empty() {
            default_alarms()
        } else {
            self.alarms.clone()
        }
    }

    pub fn alarm_label(&self, id: &str) -> String {
        self.alarms()
            .into_iter()
            .find(|alarm| alarm.id == id)
            .map(|alarm| alarm.label)
            .unwrap_or_else(|| id.to_string())
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            minutes: 25,
            seconds: 0,
            alarm: DEFAULT_ALARM.to_string(),
            driver: DriverKind::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            key: crate::persistence::STORAGE_KEY.to_string(),
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(SOCKET_PATH),
        }
    }
}

fn default_alarms() -> Vec<Alarm> {
    [("bell", "Bell"), ("chime", "Chime"), ("digital", "Digital beep")]
        .into_iter()
        .map(|(id, label)| Alarm {
            id: id.to_string(),
            label: label.to_string(),
        })
        .collect()
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            accent: Color::Rgb(230, 195, 132),
            black: Color::Rgb(13, 12, 12),
            red: Color::Rgb(228, 104, 118),
            green: Color::Rgb(138, 154, 123),
            yellow: Color::Rgb(196, 178, 138),
            blue: Color::Rgb(127, 180, 202),
            gray: Color::Rgb(164, 167, 164),
        }
    }
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if !s.is_ascii() || !s.starts_with('#') || s.len() != 7 {
        return Err(serde::de::Error::custom("invalid hex color format"));
    }
    let r = u8::from_str_radix(&s[1..3], 16).map_err(serde::de::Error::custom)?;
    let g = u8::from_str_radix(&s[3..5], 16).map_err(serde::de::Error::custom)?;
    let b = u8::from_str_radix(&s[5..7], 16).map_err(serde::de::Error::custom)?;
    Ok(Color::Rgb(r, g, b))
}

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "studytime", "studytime")
}

/// Load `studytime.toml` from `path`, or from the platform config directory
/// when no path is given. A missing file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match project_dirs() {
            Some(proj_dirs) => proj_dirs.config_dir().join("studytime.toml"),
            None => return Ok(Config::default()),
        },
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    toml::from_str(&config_str).with_context(|| format!("Failed to parse config file at {:?}", path))
}
