//! Filer configuration loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs::mount::{fstab_mounts, FSTAB};
use crate::fs::probe::RECENT_WINDOW_SECS;
use crate::icons::MAX_ICON_SIZE;

/// Top-level configuration.
///
/// All fields have defaults so the filer works without a config file.
/// Call [`Config::load`] to read from a TOML path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub mounts: MountsConfig,
    #[serde(default)]
    pub icons: IconsConfig,
    #[serde(default)]
    pub groups: GroupsConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::from_io(path, e))?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// The configured static mounts plus those named in `fstab`.
    pub fn static_mounts_with(&self, fstab: &Path) -> Vec<PathBuf> {
        let mut mounts = self.mounts.static_mounts.clone();
        if self.mounts.use_fstab {
            mounts.extend(fstab_mounts(fstab));
        }
        mounts.sort();
        mounts.dedup();
        mounts
    }

    /// [`Config::static_mounts_with`] against the system fstab.
    pub fn static_mounts(&self) -> Vec<PathBuf> {
        self.static_mounts_with(Path::new(FSTAB))
    }

    /// Where groups are stored.
    pub fn groups_file(&self) -> PathBuf {
        self.groups.file.clone().unwrap_or_else(default_groups_file)
    }
}

/// Window behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Reuse an existing window showing the same directory.
    #[serde(default)]
    pub unique_windows: bool,
    /// Title flags as single letters.
    #[serde(default)]
    pub short_flag_names: bool,
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default)]
    pub show_thumbs: bool,
}

/// Metadata refresh settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_recent_window")]
    pub recent_window_secs: i64,
    #[serde(default = "default_max_icon_size")]
    pub max_icon_size: u64,
    /// Look at file contents when the name gives no MIME type.
    #[serde(default)]
    pub sniff_content: bool,
    /// Restats in flight at once during a background scan.
    #[serde(default = "default_restat_workers")]
    pub restat_workers: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            recent_window_secs: default_recent_window(),
            max_icon_size: default_max_icon_size(),
            sniff_content: false,
            restat_workers: default_restat_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountsConfig {
    #[serde(default)]
    pub static_mounts: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub use_fstab: bool,
}

impl Default for MountsConfig {
    fn default() -> Self {
        Self {
            static_mounts: Vec::new(),
            use_fstab: true,
        }
    }
}

/// One icon override rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconOverride {
    pub pattern: String,
    pub icon: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IconsConfig {
    #[serde(default)]
    pub overrides: Vec<IconOverride>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupsConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_recent_window() -> i64 {
    RECENT_WINDOW_SECS
}

fn default_max_icon_size() -> u64 {
    MAX_ICON_SIZE
}

fn default_restat_workers() -> usize {
    4
}

fn default_groups_file() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"));
    home.join(".config").join("filer").join("Groups.xml")
}
