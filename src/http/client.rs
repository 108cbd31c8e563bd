//! EvaluationKit HTTP session: cookies, redirect guard and retrying GET.

use crate::config::Config;
use crate::http::cookies::load_cookie_jar;
use crate::http::errors::FetchError;
use crate::http::retry::{RetryPolicy, retry_with_backoff};
use crate::utils::{fmt_duration, warn_if_slow};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::{Response, redirect};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use url::Url;

/// Redirects followed before a request is abandoned.
const MAX_REDIRECTS: usize = 10;

const SLOW_FETCH_THRESHOLD: Duration = Duration::from_secs(5);

/// Rewrites redirect targets that point at a known-bad host.
///
/// EvaluationKit occasionally answers with `Location: https://wwww.evaluationkit.com/...`
/// (four w's), which does not resolve. The path is fine; only the host is poisoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectGuard {
    pub bad_host: String,
    pub canonical_host: String,
}

impl RedirectGuard {
    /// Return `target` with its host swapped when it matches the bad host.
    pub fn rewrite(&self, target: Url) -> Url {
        if target.host_str() != Some(self.bad_host.as_str()) {
            return target;
        }

        let mut fixed = target.clone();
        match fixed.set_host(Some(&self.canonical_host)) {
            Ok(()) => {
                debug!(from = %target, to = %fixed, "Rewrote poisoned redirect");
                fixed
            }
            Err(e) => {
                warn!(url = %target, error = %e, "Could not rewrite poisoned redirect host");
                target
            }
        }
    }
}

/// A GET to issue through [`EvalKitClient::get`] or [`EvalKitClient::get_text`].
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    pub headers: HeaderMap,
    /// Deadline for the response headers ([`EvalKitClient::get`]) or for the
    /// whole exchange ([`EvalKitClient::get_text`]). Body reads of a streamed
    /// response are bounded by the client's idle read timeout instead.
    pub timeout: Duration,
}

impl<'a> FetchRequest<'a> {
    pub fn new(url: &'a str, timeout: Duration) -> Self {
        Self {
            url,
            query: &[],
            headers: HeaderMap::new(),
            timeout,
        }
    }

    pub fn query(mut self, query: &'a [(&'a str, &'a str)]) -> Self {
        self.query = query;
        self
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }
}

/// Cookie-authenticated session against an EvaluationKit instance.
///
/// Every GET either yields a response with status < 400 or an error after the
/// retry policy is exhausted.
#[derive(Debug, Clone)]
pub struct EvalKitClient {
    http: reqwest::Client,
    base_url: Url,
    guard: RedirectGuard,
    retry: RetryPolicy,
}

impl EvalKitClient {
    /// Build a session from config, loading the cookie jar once.
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid base URL {:?}", config.base_url))?;

        let jar = load_cookie_jar(&config.cookie_file)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );

        // Redirects are followed by hand so the guard can inspect each hop.
        // `read_timeout` is an idle limit per read, so a slow but steady PDF
        // stream is never cut off.
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::new(jar))
            .default_headers(default_headers)
            .redirect(redirect::Policy::none())
            .connect_timeout(config.page_timeout)
            .read_timeout(config.pdf_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            guard: RedirectGuard {
                bad_host: config.bad_redirect_host.clone(),
                canonical_host: config.canonical_host.clone(),
            },
            retry: RetryPolicy {
                attempts: config.retry_attempts,
                base_delay: config.backoff_base,
            },
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a site-relative path such as `Report/Public/Results`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// GET with retries and exponential backoff.
    ///
    /// `request.timeout` bounds each attempt until the response headers
    /// arrive; reading the body is up to the caller.
    pub async fn get(&self, request: &FetchRequest<'_>) -> Result<Response, FetchError> {
        let client = self;
        let headers = &request.headers;
        let timeout = request.timeout;
        self.with_retries(request, move |url| client.send_once(url, headers, timeout))
            .await
    }

    /// GET a page and read its body, retrying the whole exchange.
    ///
    /// `request.timeout` is a deadline on headers and body together.
    pub async fn get_text(&self, request: &FetchRequest<'_>) -> Result<String, FetchError> {
        let client = self;
        let headers = &request.headers;
        let timeout = request.timeout;
        self.with_retries(request, move |url| async move {
            let label = url.to_string();
            let exchange = async {
                let resp = client.send_once(url, headers, timeout).await?;
                let final_url = resp.url().to_string();
                resp.text()
                    .await
                    .map_err(|source| FetchError::Transport { url: final_url, source })
            };
            tokio::time::timeout(timeout, exchange)
                .await
                .map_err(|_| FetchError::Timeout { url: label, after: timeout })?
        })
        .await
    }

    async fn with_retries<T, Op, Fut>(
        &self,
        request: &FetchRequest<'_>,
        mut op: Op,
    ) -> Result<T, FetchError>
    where
        Op: FnMut(Url) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let parsed = if request.query.is_empty() {
            Url::parse(request.url)
        } else {
            Url::parse_with_params(request.url, request.query)
        };
        let url = parsed.map_err(|source| FetchError::InvalidUrl {
            url: request.url.to_string(),
            source,
        })?;

        let url = &url;
        retry_with_backoff(
            &self.retry,
            request.url,
            move |attempt| {
                trace!(url = %url, attempt, "GET");
                op(url.clone())
            },
            tokio::time::sleep,
        )
        .await
    }

    /// One attempt: send, then follow redirects through the guard.
    async fn send_once(
        &self,
        url: Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let start = Instant::now();
        let mut current = url;

        for _ in 0..=MAX_REDIRECTS {
            let pending = self.http.get(current.clone()).headers(headers.clone()).send();
            let resp = tokio::time::timeout(timeout, pending)
                .await
                .map_err(|_| FetchError::Timeout {
                    url: current.to_string(),
                    after: timeout,
                })?
                .map_err(|source| FetchError::Transport {
                    url: current.to_string(),
                    source,
                })?;

            let status = resp.status();
            if status.is_redirection() {
                let target = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or_else(|| FetchError::BadRedirect {
                        url: current.to_string(),
                    })?;
                trace!(from = %current, to = %target, status = status.as_u16(), "Following redirect");
                current = self.guard.rewrite(target);
                continue;
            }

            let elapsed = warn_if_slow(current.as_str(), start, SLOW_FETCH_THRESHOLD);
            trace!(url = %current, status = status.as_u16(), elapsed = fmt_duration(elapsed), "Response headers received");

            if status.is_client_error() || status.is_server_error() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url: current.to_string(),
                });
            }
            return Ok(resp);
        }

        Err(FetchError::TooManyRedirects {
            url: current.to_string(),
            hops: MAX_REDIRECTS,
        })
    }
}
