//! Configuration loaded from defaults, an optional TOML file and `EVALS_*`
//! environment variables, in that order of precedence (last wins).

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use fundu::DurationParser;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given. Missing is fine.
pub const DEFAULT_CONFIG_FILE: &str = "course-evals.toml";

/// Environment variable prefix, e.g. `EVALS_PAGE_DELAY=250ms`.
pub const ENV_PREFIX: &str = "EVALS_";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Level for this crate's spans and events; other crates stay at `warn`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// EvaluationKit instance to crawl.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Redirect host that never resolves and must be rewritten.
    #[serde(default = "default_bad_redirect_host")]
    pub bad_redirect_host: String,
    /// Host the poisoned redirects are rewritten to.
    #[serde(default = "default_canonical_host")]
    pub canonical_host: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Mozilla-format cookie jar exported from a logged-in browser.
    #[serde(default = "default_cookie_file")]
    pub cookie_file: PathBuf,

    /// Total attempts per request, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// First backoff wait; doubles on each retry.
    #[serde(
        default = "default_backoff_base",
        deserialize_with = "deserialize_duration"
    )]
    pub backoff_base: Duration,
    /// Sleep between successive PublicReport API pages.
    #[serde(default = "default_page_delay", deserialize_with = "deserialize_duration")]
    pub page_delay: Duration,
    #[serde(
        default = "default_page_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub page_timeout: Duration,
    /// Timeout for streamed PDF downloads, which can be large.
    #[serde(default = "default_pdf_timeout", deserialize_with = "deserialize_duration")]
    pub pdf_timeout: Duration,

    /// Directory the crawler writes into and the watcher consumes.
    #[serde(default = "default_watch_dir")]
    pub watch_dir: PathBuf,
    #[serde(
        default = "default_poll_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub poll_interval: Duration,
    /// Append-only CSV of evaluation rows.
    #[serde(default = "default_csv_path")]
    pub csv_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            base_url: default_base_url(),
            bad_redirect_host: default_bad_redirect_host(),
            canonical_host: default_canonical_host(),
            user_agent: default_user_agent(),
            cookie_file: default_cookie_file(),
            retry_attempts: default_retry_attempts(),
            backoff_base: default_backoff_base(),
            page_delay: default_page_delay(),
            page_timeout: default_page_timeout(),
            pdf_timeout: default_pdf_timeout(),
            watch_dir: default_watch_dir(),
            poll_interval: default_poll_interval(),
            csv_path: default_csv_path(),
        }
    }
}

impl Config {
    /// Load from `path` (or [`DEFAULT_CONFIG_FILE`]) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        if path.is_some() && !file.exists() {
            anyhow::bail!("Config file {} does not exist", file.display());
        }

        Self::figment(file)
            .extract()
            .context("Failed to load config")
    }

    fn figment(file: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://asen-jhu.evaluationkit.com".to_string()
}

fn default_bad_redirect_host() -> String {
    "wwww.evaluationkit.com".to_string()
}

fn default_canonical_host() -> String {
    "www.evaluationkit.com".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36"
        .to_string()
}

fn default_cookie_file() -> PathBuf {
    PathBuf::from("cookies.txt")
}

fn default_retry_attempts() -> u32 {
    4
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_page_delay() -> Duration {
    Duration::from_millis(400)
}

fn default_page_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_pdf_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("pdfs")
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_csv_path() -> PathBuf {
    PathBuf::from("all_course_stats.csv")
}

/// Either bare seconds (`1.5`) or a string with units (`"400ms"`, `"2m"`).
#[derive(Deserialize)]
#[serde(untagged)]
enum DurationValue {
    Seconds(f64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match DurationValue::deserialize(deserializer)? {
        DurationValue::Seconds(secs) => Duration::try_from_secs_f64(secs).map_err(D::Error::custom),
        DurationValue::Text(text) => parse_duration(&text).map_err(D::Error::custom),
    }
}

/// Parse a human duration string; bare numbers are seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let parsed = DurationParser::with_all_time_units()
        .parse(text.trim())
        .map_err(|e| format!("invalid duration {text:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {text:?}: {e}"))
}
