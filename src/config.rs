//! Explicit configuration threaded through component constructors.
//!
//! There is deliberately no CLI flag surface; the only external knob is the
//! `CRATEDIGGER_DIR` environment variable overriding the download folder.

use std::path::PathBuf;

/// Results requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Visible result rows in the browse viewport.
pub const DEFAULT_WINDOW_HEIGHT: usize = 12;

/// Environment variable overriding the download folder.
pub const DOWNLOAD_DIR_ENV: &str = "CRATEDIGGER_DIR";

/// Hidden state directory under the download folder.
const STATE_DIR: &str = ".cratedigger";

/// Dedup database filename inside the state directory.
const DB_FILE: &str = "downloads.db";

/// Runtime configuration, built once in `main` and passed by value to the
/// components that need it.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where downloaded files land.
    pub download_dir: PathBuf,
    /// Results requested per search page.
    pub page_size: u32,
    /// Visible result rows in the browse viewport.
    pub window_height: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            page_size: DEFAULT_PAGE_SIZE,
            window_height: DEFAULT_WINDOW_HEIGHT,
        }
    }
}

impl Config {
    /// Builds the configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let download_dir = std::env::var_os(DOWNLOAD_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_download_dir);
        Self {
            download_dir,
            ..Self::default()
        }
    }

    /// The hidden state directory under the download folder.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.download_dir.join(STATE_DIR)
    }

    /// Fixed path of the dedup database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.state_dir().join(DB_FILE)
    }
}

fn default_download_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Music").join("free_archive"))
        .unwrap_or_else(|| PathBuf::from("free_archive"))
}
