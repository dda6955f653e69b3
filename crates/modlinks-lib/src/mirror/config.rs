//! Run configuration, read once from the environment at startup.

use std::env;
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};

/// Timeout applied to every request issued by the shared client.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_SOURCE: &str = "https://raw.githubusercontent.com/hk-modding/modlinks/main/";
pub const DEFAULT_BASE_URL: &str = "https://hk-modlinks.clazex.net/";
pub const DEFAULT_MAX_ALLOWED_SIZE: u64 = 512 * 1024 * 1024;
pub const DEFAULT_CONCURRENCY: usize = 16;
pub const DEFAULT_DIST_DIR: &str = "dist";

const ENV_SOURCE: &str = "HK_MODLINKS_MIRROR_SRC";
const ENV_BASE_URL: &str = "HK_MODLINKS_MIRROR_BASE_URL";
const ENV_SKIP_URLS: &str = "HK_MODLINKS_MIRROR_SKIP_URLS";
const ENV_MAX_ALLOWED_SIZE: &str = "HK_MODLINKS_MIRROR_MAX_ALLOWED_SIZE";
const ENV_REBASE_ONLY: &str = "HK_MODLINKS_MIRROR_REBASE_ONLY";
const ENV_REBASE_FROM_URL: &str = "HK_MODLINKS_MIRROR_REBASE_FROM_URL";
const ENV_CONCURRENCY: &str = "HK_MODLINKS_MIRROR_CONCURRENCY";
const ENV_DIST_DIR: &str = "HK_MODLINKS_MIRROR_DIST_DIR";

/// Immutable settings for one mirror run.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Base URL the two manifests are fetched from.
    pub source: String,

    /// Public base URL that rewritten links point at.
    pub base_url: String,

    /// Mods whose source URL contains any of these substrings are skipped.
    pub skip_urls: Vec<String>,

    /// Size ceiling in bytes for admitted mod archives.
    pub max_allowed_size: u64,

    /// Rewrite a prior mirror's manifests instead of fetching artifacts.
    pub rebase_only: bool,

    /// Old base URL replaced by `base_url` in rebase mode.
    pub rebase_from_url: String,

    /// Cap on in-flight fetch tasks.
    pub concurrency: usize,

    /// Root of the output tree.
    pub dist_dir: PathBuf,
}

impl MirrorConfig {
    /// Read configuration from the process environment. Unset variables fall
    /// back to their defaults; set-but-invalid values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let source = normalize_base(
            lookup(ENV_SOURCE).unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        );
        let base_url = normalize_base(
            lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        );

        let skip_urls = lookup(ENV_SKIP_URLS)
            .map(|raw| {
                raw.split('|')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let max_allowed_size = match lookup(ENV_MAX_ALLOWED_SIZE) {
            Some(raw) => raw.parse::<u64>().with_context(|| {
                format!("{} is not a valid size in bytes: {:?}", ENV_MAX_ALLOWED_SIZE, raw)
            })?,
            None => DEFAULT_MAX_ALLOWED_SIZE,
        };

        let concurrency = match lookup(ENV_CONCURRENCY) {
            Some(raw) => raw.parse::<usize>().with_context(|| {
                format!("{} is not a valid task count: {:?}", ENV_CONCURRENCY, raw)
            })?,
            None => DEFAULT_CONCURRENCY,
        };
        ensure!(concurrency > 0, "{} must be at least 1", ENV_CONCURRENCY);

        let rebase_only = lookup(ENV_REBASE_ONLY).is_some();
        let rebase_from_url =
            lookup(ENV_REBASE_FROM_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let dist_dir = lookup(ENV_DIST_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIST_DIR));

        Ok(Self {
            source,
            base_url,
            skip_urls,
            max_allowed_size,
            rebase_only,
            rebase_from_url,
            concurrency,
            dist_dir,
        })
    }

    pub fn apis_dir(&self) -> PathBuf {
        self.dist_dir.join("apis")
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.dist_dir.join("mods")
    }

    pub fn api_links_path(&self) -> PathBuf {
        self.dist_dir.join("ApiLinks.xml")
    }

    pub fn mod_links_path(&self) -> PathBuf {
        self.dist_dir.join("ModLinks.xml")
    }

    pub fn revision_path(&self) -> PathBuf {
        self.dist_dir.join("revision.txt")
    }
}

/// Normalize a base URL to end in exactly one `/` so paths can be appended
/// directly.
fn normalize_base(url: String) -> String {
    format!("{}/", url.trim_end_matches('/'))
}
