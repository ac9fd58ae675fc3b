//! Persistent daemon configuration model and defaults.

use std::path::PathBuf;

/// Root configuration persisted to `coverd.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Media-player metadata source.
    pub player: PlayerConfig,
    #[serde(default)]
    /// Remote artwork download limits.
    pub download: DownloadConfig,
    #[serde(default)]
    /// Cover cache layout.
    pub cache: CacheConfig,
    #[serde(default)]
    /// Stylesheet side effect.
    pub style: StyleConfig,
    #[serde(default)]
    /// Status-bar notification.
    pub notify: NotifyConfig,
}

/// Command used both for the startup one-shot query and the follow stream.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlayerConfig {
    #[serde(default = "default_player_command")]
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DownloadConfig {
    #[serde(default = "default_max_download_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_download_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CacheConfig {
    /// Directory name under the session runtime dir.
    #[serde(default = "default_cache_dir_name")]
    pub dir_name: String,
    /// Side length of the cached square cover, in pixels. Small on purpose:
    /// just large enough to sample meaningful color regions while staying
    /// cheap to decode repeatedly.
    #[serde(default = "default_square_side")]
    pub square_side: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StyleConfig {
    #[serde(default = "default_stylesheet_path")]
    pub stylesheet_path: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_process")]
    pub process: String,
    #[serde(default = "default_notify_rtmin_offset")]
    pub rtmin_offset: u8,
}

fn default_player_command() -> String {
    "playerctl".to_string()
}

fn default_max_download_bytes() -> u64 {
    1_048_576
}

fn default_download_timeout_ms() -> u64 {
    3_000
}

fn default_cache_dir_name() -> String {
    "waybar-mpris-covers".to_string()
}

fn default_square_side() -> u32 {
    18
}

fn default_stylesheet_path() -> String {
    dirs::config_dir()
        .map(|dir| dir.join("waybar").join("style.css"))
        .unwrap_or_else(|| PathBuf::from("style.css"))
        .to_string_lossy()
        .to_string()
}

fn default_notify_process() -> String {
    "waybar".to_string()
}

fn default_notify_rtmin_offset() -> u8 {
    5
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            command: default_player_command(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_download_bytes(),
            timeout_ms: default_download_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir_name: default_cache_dir_name(),
            square_side: default_square_side(),
        }
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            stylesheet_path: default_stylesheet_path(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            process: default_notify_process(),
            rtmin_offset: default_notify_rtmin_offset(),
        }
    }
}

/// Clamps loaded values into ranges the pipeline can actually work with.
pub fn sanitize_config(config: Config) -> Config {
    let clamped_square_side = config.cache.square_side.clamp(2, 512);
    let clamped_max_bytes = config.download.max_bytes.clamp(8_192, 64 * 1_048_576);
    let clamped_timeout_ms = config.download.timeout_ms.clamp(100, 60_000);
    let clamped_rtmin_offset = config.notify.rtmin_offset.min(30);

    Config {
        player: config.player,
        download: DownloadConfig {
            max_bytes: clamped_max_bytes,
            timeout_ms: clamped_timeout_ms,
        },
        cache: CacheConfig {
            dir_name: config.cache.dir_name,
            square_side: clamped_square_side,
        },
        style: config.style,
        notify: NotifyConfig {
            process: config.notify.process,
            rtmin_offset: clamped_rtmin_offset,
        },
    }
}
