//! Configuration file handling.
//!
//! Options live in `<config-dir>/config.toml`. Loading starts from
//! defaults and overlays whatever the file provides; validation runs on
//! every load and a reload that fails validation keeps the previous
//! configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{Error, Result};

/// Hook events the engine emits; each owns a directory under
/// `<config-dir>/hooks/`.
pub const HOOK_EVENTS: &[&str] = &["begin-snipe", "begin-save", "end-save", "reload"];

const CONFIG_FILE: &str = "config.toml";
const LIST_FILE: &str = "track.list";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/71.0.3578.98 Safari/537.36";
const DEFAULT_DOWNLOADER: &str =
    "streamlink --http-header User-Agent={{UserAgent}} -o {{SavePath}} {{StreamURL}} best";

/// Recognized options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Poll period in seconds; at least 30.
    pub check_every: u64,
    /// User-Agent passed to adapters and templated into the downloader
    /// command.
    pub user_agent: String,
    /// Downloader command with `{{UserAgent}}`, `{{SavePath}}` and
    /// `{{StreamURL}}` placeholders.
    pub download_with: String,
    /// Base directory recordings are written under.
    pub save_to: PathBuf,
    /// Snipe window in seconds.
    pub snipe_timeout: u64,
    /// In-session recovery window in seconds.
    pub recover_timeout: u64,
    /// RPC endpoint for the dashboard.
    pub listen_on: String,
    /// Dashboard selection colors.
    pub select_fg_color: String,
    pub select_bg_color: String,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            check_every: 120,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_with: DEFAULT_DOWNLOADER.to_string(),
            save_to: home.join("autorec"),
            snipe_timeout: 900,
            recover_timeout: 300,
            listen_on: ":4846".to_string(),
            select_fg_color: "blue".to_string(),
            select_bg_color: "white".to_string(),
        }
    }
}

impl Config {
    pub fn check_every(&self) -> Duration {
        Duration::from_secs(self.check_every)
    }

    pub fn snipe_timeout(&self) -> Duration {
        Duration::from_secs(self.snipe_timeout)
    }

    pub fn recover_timeout(&self) -> Duration {
        Duration::from_secs(self.recover_timeout)
    }

    /// Validate the options that would otherwise fail at an awkward time.
    pub fn validate(&self) -> Result<()> {
        if self.check_every < 30 {
            return Err(Error::config(format!(
                "check_every must be at least 30 seconds, got {}",
                self.check_every
            )));
        }

        let program = self
            .download_with
            .split_whitespace()
            .next()
            .ok_or_else(|| Error::config("download_with is empty"))?;
        if find_in_path(program).is_none() {
            return Err(Error::config(format!(
                "could not find downloader on PATH: {program}"
            )));
        }

        Ok(())
    }
}

/// Locate a program the way the shell would.
fn find_in_path(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

/// The configuration directory and the current options, reloadable while
/// the engine runs.
pub struct ConfigStore {
    dir: PathBuf,
    current: RwLock<Config>,
}

impl ConfigStore {
    /// Platform config directory, e.g. `~/.config/autorec` on Linux.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autorec")
    }

    /// Load (or default) the config under `dir` and validate it.
    pub fn open(dir: PathBuf) -> Result<Self> {
        let config = Self::read(&dir)?;
        config.validate()?;
        Ok(Self {
            dir,
            current: RwLock::new(config),
        })
    }

    fn read(dir: &Path) -> Result<Config> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Current options. The config is small; callers get a copy so locks
    /// are never held across await points.
    pub fn get(&self) -> Config {
        self.current.read().clone()
    }

    /// Re-read the config file. An unreadable or invalid file keeps the
    /// previous options.
    pub fn reload(&self) {
        match Self::read(&self.dir).and_then(|c| c.validate().map(|()| c)) {
            Ok(config) => {
                *self.current.write() = config;
                info!("configuration reloaded");
            }
            Err(e) => warn!("keeping previous configuration: {e}"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Path of the tracked-URL list file.
    pub fn list_path(&self) -> PathBuf {
        Self::list_path_in(&self.dir)
    }

    /// The track-list path under an arbitrary config directory.
    pub fn list_path_in(dir: &Path) -> PathBuf {
        dir.join(LIST_FILE)
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.dir.join("hooks")
    }

    /// Create the config directory, hook directories and an empty track
    /// list so a fresh install has something to edit.
    pub fn ensure_layout(&self) -> Result<()> {
        Self::init(&self.dir)?;
        Ok(())
    }

    /// Create the directory layout under `dir`: hook directories, an empty
    /// track list, and a starter config file when none exists. Does not
    /// validate, so it works before the downloader is installed.
    pub fn init(dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        for event in HOOK_EVENTS {
            std::fs::create_dir_all(dir.join("hooks").join(event))?;
        }
        let list = dir.join(LIST_FILE);
        if !list.exists() {
            std::fs::write(&list, "# one streamer page url per line\n")?;
        }
        let config = dir.join(CONFIG_FILE);
        if !config.exists() {
            std::fs::write(&config, DEFAULT_CONFIG_TEMPLATE)?;
        }
        Ok(config)
    }
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"# autorec configuration

# Poll period in seconds; at least 30.
check_every = 120

# Downloader command. Recognized placeholders:
#   {{UserAgent}} {{SavePath}} {{StreamURL}}
download_with = "streamlink --http-header User-Agent={{UserAgent}} -o {{SavePath}} {{StreamURL}} best"

# Where recordings are written. Defaults to "autorec" in your home
# directory when unset.
#save_to = ""

# How long a snipe keeps probing after the scheduled time, in seconds.
snipe_timeout = 900

# How long to look for the same broadcast again after the downloader
# exits, in seconds.
recover_timeout = 300

# Dashboard endpoint and colors.
listen_on = ":4846"
select_fg_color = "blue"
select_bg_color = "white"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_except_downloader() {
        let config = Config::default();
        assert_eq!(config.check_every, 120);
        // The default downloader may or may not be installed here; only
        // the poll-rate floor is asserted.
        assert!(config.check_every >= 30);
    }

    #[test]
    fn rejects_fast_poll_rate() {
        let config = Config {
            check_every: 10,
            download_with: "sh -c true".into(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn rejects_missing_downloader() {
        let config = Config {
            download_with: "definitely-not-a-real-downloader-8472 {{StreamURL}}".into(),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn accepts_downloader_on_path() {
        let config = Config {
            download_with: "sh -c {{StreamURL}}".into(),
            ..Config::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn load_overlays_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "check_every = 45\ndownload_with = \"sh {{StreamURL}}\"\n",
        )
        .unwrap();
        let store = ConfigStore::open(dir.path().to_path_buf()).unwrap();
        let config = store.get();
        assert_eq!(config.check_every, 45);
        assert_eq!(config.download_with, "sh {{StreamURL}}");
        // untouched keys keep their defaults
        assert_eq!(config.listen_on, ":4846");
    }

    #[test]
    fn reload_keeps_previous_on_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "check_every = 60\ndownload_with = \"sh {{StreamURL}}\"\n",
        )
        .unwrap();
        let store = ConfigStore::open(dir.path().to_path_buf()).unwrap();

        std::fs::write(dir.path().join("config.toml"), "check_every = 1\n").unwrap();
        store.reload();
        assert_eq!(store.get().check_every, 60);
    }

    #[test]
    fn ensure_layout_creates_hook_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "download_with = \"sh {{StreamURL}}\"\n",
        )
        .unwrap();
        let store = ConfigStore::open(dir.path().to_path_buf()).unwrap();
        store.ensure_layout().unwrap();
        for event in HOOK_EVENTS {
            assert!(dir.path().join("hooks").join(event).is_dir());
        }
        assert!(dir.path().join("track.list").exists());
    }
}
