use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Screen or image aspect orientation. Portrait iff height > width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn of_dimensions(width: u32, height: u32) -> Self {
        if height > width {
            Self::Portrait
        } else {
            Self::Landscape
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Portrait => write!(f, "Portrait"),
            Self::Landscape => write!(f, "Landscape"),
        }
    }
}

/// What to do when an image's orientation disagrees with its monitor's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchRotation {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    Center,
    Tile,
    Stretch,
    Fit,
    #[default]
    Fill,
    Span,
}

/// The durable settings record. Loaded once at startup, saved whenever a
/// field changes; no migration logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub wallpaper_directory: Option<PathBuf>,
    /// Active monitors and the orientation their wallpapers should have.
    /// A monitor absent from this map never receives an assignment.
    pub active_monitors: BTreeMap<String, Orientation>,
    pub allow_all_orientations: BTreeMap<String, bool>,
    pub mismatch_rotation: BTreeMap<String, MismatchRotation>,
    pub rotation_interval_minutes: u64,
    pub orientation_matching_enabled: bool,
    pub fit_mode: FitMode,
    pub auto_start_on_launch: bool,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallpaper_directory: None,
            active_monitors: BTreeMap::new(),
            allow_all_orientations: BTreeMap::new(),
            mismatch_rotation: BTreeMap::new(),
            rotation_interval_minutes: 30,
            orientation_matching_enabled: true,
            fit_mode: FitMode::Fill,
            auto_start_on_launch: false,
            debug: false,
        }
    }
}

impl Config {
    /// Loads the config file, returning `None` when it is missing or does not
    /// parse; the caller falls back to defaults.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = fs::read_to_string(path).ok()?;
        let mut config: Self = serde_json::from_str(&raw).ok()?;
        config.rotation_interval_minutes = config.rotation_interval_minutes.max(1);
        Some(config)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let raw = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, raw)
    }
}
