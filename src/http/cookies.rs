//! Mozilla `cookies.txt` loading.
//!
//! EvaluationKit gates part of the public report search behind a Watermark
//! login, so the crawler reuses a browser session exported in the Netscape
//! cookie-jar format:
//!
//! ```text
//! # Netscape HTTP Cookie File
//! .evaluationkit.com	TRUE	/	TRUE	1767225600	ASP.NET_SessionId	abc123
//! #HttpOnly_asen-jhu.evaluationkit.com	FALSE	/	TRUE	0	.AspNet.Cookies	xyz
//! ```

use anyhow::{Context, Result};
use reqwest::cookie::Jar;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One line of a Mozilla cookie file. Expiry is ignored: exported sessions
/// are loaded even when the browser considered them stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MozillaCookie {
    pub domain: String,
    pub include_subdomains: bool,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    pub name: String,
    pub value: String,
}

impl MozillaCookie {
    /// Parse one tab-separated line. Comments, blank lines and lines with the
    /// wrong field count yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None => (line, false),
        };
        if line.trim().is_empty() || line.starts_with('#') {
            return None;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return None;
        }

        Some(Self {
            domain: fields[0].to_string(),
            include_subdomains: fields[1].eq_ignore_ascii_case("TRUE"),
            path: fields[2].to_string(),
            secure: fields[3].eq_ignore_ascii_case("TRUE"),
            http_only,
            name: fields[5].to_string(),
            value: fields[6].to_string(),
        })
    }

    /// Render as a `Set-Cookie` value. Host-only cookies carry no `Domain`
    /// attribute so the jar pins them to the exact host.
    pub fn to_set_cookie(&self) -> String {
        let mut builder = cookie::Cookie::build((self.name.clone(), self.value.clone()))
            .path(self.path.clone())
            .secure(self.secure)
            .http_only(self.http_only);
        if self.include_subdomains {
            builder = builder.domain(self.domain.trim_start_matches('.').to_string());
        }
        builder.build().to_string()
    }

    /// URL the cookie is scoped to, used as the jar's origin when inserting.
    pub fn origin(&self) -> Option<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.domain.trim_start_matches('.');
        Url::parse(&format!("{scheme}://{host}{}", self.path)).ok()
    }
}

/// Parse every cookie line in a Mozilla cookie file's contents.
pub fn parse_cookie_file(contents: &str) -> Vec<MozillaCookie> {
    contents.lines().filter_map(MozillaCookie::parse_line).collect()
}

/// Load the cookie file into a fresh jar.
///
/// A missing file is not an error: the session continues unauthenticated,
/// which is enough for reports that render publicly.
pub fn load_cookie_jar(path: &Path) -> Result<Jar> {
    let jar = Jar::default();

    if !path.exists() {
        warn!(
            path = %path.display(),
            "Cookie file not found, continuing unauthenticated (export your Watermark cookies first)"
        );
        return Ok(jar);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cookie file {}", path.display()))?;

    let mut loaded = 0usize;
    for cookie in parse_cookie_file(&contents) {
        let Some(origin) = cookie.origin() else {
            debug!(domain = cookie.domain, "Skipping cookie with unusable domain");
            continue;
        };
        jar.add_cookie_str(&cookie.to_set_cookie(), &origin);
        loaded += 1;
    }

    info!(count = loaded, path = %path.display(), "Loaded cookies");
    Ok(jar)
}
