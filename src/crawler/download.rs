//! Report downloads: per-crawl dedup, JS redirect indirection, content-type
//! validation and atomic writes into the shared PDF directory.

use crate::crawler::links::PdfLink;
use crate::http::{EvalKitClient, FetchError, FetchRequest};
use regex::Regex;
use reqwest::Response;
use reqwest::header::CONTENT_TYPE;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, warn};

/// Buffer size for streamed writes.
pub const WRITE_CHUNK: usize = 8 * 1024;

/// Suffix of in-progress downloads; the watcher only picks up `*.pdf`.
pub const PARTIAL_SUFFIX: &str = "part";

/// Report ids already enqueued during one crawl invocation.
#[derive(Debug, Default)]
pub struct SeenIds(HashSet<String>);

impl SeenIds {
    /// Record the link's report id; `false` if it was already seen.
    pub fn insert(&mut self, link: &PdfLink) -> bool {
        self.0.insert(link.report_id().to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadMode {
    /// Discover and dedup, but never fetch report bodies.
    DryRun,
    Live,
}

/// Why a single report was skipped without failing the crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// HTML came back but held no `document.location.href` redirect.
    MissingRedirect,
    UnexpectedContentType(String),
    /// The body stream failed or went idle past the PDF timeout.
    Interrupted(String),
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The destination already existed; nothing was fetched.
    AlreadyPresent,
    Saved { bytes: u64 },
    Abandoned(AbandonReason),
}

/// What happened to one discovered link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Same report id seen earlier in this crawl.
    Duplicate,
    /// New, but downloads are disabled.
    Counted,
    Fetched(SaveOutcome),
}

/// Fetches report PDFs into `out_dir`.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: EvalKitClient,
    out_dir: PathBuf,
    mode: DownloadMode,
    page_timeout: Duration,
    pdf_timeout: Duration,
}

impl Downloader {
    pub fn new(
        client: EvalKitClient,
        out_dir: PathBuf,
        mode: DownloadMode,
        page_timeout: Duration,
        pdf_timeout: Duration,
    ) -> Self {
        Self {
            client,
            out_dir,
            mode,
            page_timeout,
            pdf_timeout,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Dedup `link` against `seen` and, in live mode, save it.
    pub async fn handle(
        &self,
        seen: &mut SeenIds,
        link: &PdfLink,
    ) -> Result<Disposition, FetchError> {
        if !seen.insert(link) {
            return Ok(Disposition::Duplicate);
        }
        if self.mode == DownloadMode::DryRun {
            return Ok(Disposition::Counted);
        }

        info!(file = link.filename, "Downloading");
        let dest = self.out_dir.join(&link.filename);
        Ok(Disposition::Fetched(self.save(&link.url, &dest).await?))
    }

    /// Download `url` to `dest`. Returns immediately if `dest` exists.
    ///
    /// Failures to get a response (after retries) are returned. Redirect,
    /// content-type, body-stream and write problems are logged and reported as
    /// [`SaveOutcome::Abandoned`]; the `.part` file is removed and the next
    /// crawl starts that report over.
    pub async fn save(&self, url: &str, dest: &Path) -> Result<SaveOutcome, FetchError> {
        if fs::try_exists(dest).await.unwrap_or(false) {
            debug!(path = %dest.display(), "Already downloaded");
            return Ok(SaveOutcome::AlreadyPresent);
        }

        let mut resp = self
            .client
            .get(&FetchRequest::new(url, self.page_timeout))
            .await?;

        if content_type(&resp).contains("text/html") {
            let page_url = resp.url().clone();
            let body = tokio::time::timeout(self.page_timeout, resp.text())
                .await
                .map_err(|_| FetchError::Timeout {
                    url: page_url.to_string(),
                    after: self.page_timeout,
                })?
                .map_err(|source| FetchError::Transport {
                    url: page_url.to_string(),
                    source,
                })?;

            let Some(target) = find_js_redirect(&body).and_then(|t| page_url.join(t).ok()) else {
                error!(url, "Couldn't find redirect inside report page");
                return Ok(SaveOutcome::Abandoned(AbandonReason::MissingRedirect));
            };

            debug!(from = url, to = %target, "Following report redirect");
            resp = self
                .client
                .get(&FetchRequest::new(target.as_str(), self.pdf_timeout))
                .await?;
        }

        let declared = content_type(&resp);
        if !declared.contains("application/pdf") {
            error!(
                url = %resp.url(),
                content_type = declared,
                "Expected PDF, got something else"
            );
            return Ok(SaveOutcome::Abandoned(AbandonReason::UnexpectedContentType(
                declared,
            )));
        }

        let partial = partial_path(dest);
        match write_stream(resp, &partial, self.pdf_timeout).await {
            Ok(bytes) => match fs::rename(&partial, dest).await {
                Ok(()) => {
                    debug!(path = %dest.display(), bytes, "Saved report");
                    Ok(SaveOutcome::Saved { bytes })
                }
                Err(e) => {
                    error!(path = %dest.display(), error = %e, "Failed to move download into place");
                    let _ = fs::remove_file(&partial).await;
                    Ok(SaveOutcome::Abandoned(AbandonReason::Io(e.to_string())))
                }
            },
            Err(WriteError::Io(e)) => {
                error!(path = %dest.display(), error = %e, "Failed to write report");
                let _ = fs::remove_file(&partial).await;
                Ok(SaveOutcome::Abandoned(AbandonReason::Io(e.to_string())))
            }
            Err(WriteError::Fetch(e)) => {
                warn!(path = %dest.display(), error = %e, "Report download interrupted");
                let _ = fs::remove_file(&partial).await;
                Ok(SaveOutcome::Abandoned(AbandonReason::Interrupted(e.to_string())))
            }
        }
    }
}

enum WriteError {
    Io(std::io::Error),
    Fetch(FetchError),
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Stream the body into `path` through an 8 KiB buffer.
///
/// There is no overall deadline; the download fails only when no chunk
/// arrives within `idle`.
async fn write_stream(mut resp: Response, path: &Path, idle: Duration) -> Result<u64, WriteError> {
    let url = resp.url().to_string();
    let file = fs::File::create(path).await?;
    let mut writer = BufWriter::with_capacity(WRITE_CHUNK, file);
    let mut total = 0u64;

    loop {
        let next = tokio::time::timeout(idle, resp.chunk())
            .await
            .map_err(|_| {
                WriteError::Fetch(FetchError::Timeout {
                    url: url.clone(),
                    after: idle,
                })
            })?
            .map_err(|source| {
                WriteError::Fetch(FetchError::Transport {
                    url: url.clone(),
                    source,
                })
            })?;
        let Some(chunk) = next else {
            break;
        };
        writer.write_all(&chunk).await?;
        total += chunk.len() as u64;
    }

    writer.flush().await?;
    writer.into_inner().sync_all().await?;
    Ok(total)
}

/// `Report.pdf` becomes `Report.pdf.part`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

fn content_type(resp: &Response) -> String {
    resp.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// The target of a `document.location.href = '...'` assignment, if present.
pub fn find_js_redirect(body: &str) -> Option<&str> {
    static REDIRECT_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"document\.location\.href\s*=\s*['"](.+?)['"]"#).unwrap()
    });

    REDIRECT_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
