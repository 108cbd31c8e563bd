//! Crawl driver: prefixes, then pages, then report links.

pub mod download;
pub mod links;
pub mod pagination;
pub mod prefix;

use crate::crawler::download::{Disposition, Downloader, SaveOutcome, SeenIds};
use crate::crawler::links::extract_pdf_links;
use crate::crawler::pagination::{PageCursor, fetch_search_page};
use crate::http::EvalKitClient;
use crate::utils::fmt_duration;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Counters for one crawl invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub prefixes: usize,
    pub failed_prefixes: usize,
    pub pages: usize,
    /// Every report link seen, duplicates included.
    pub links: usize,
    /// Links with a report id not seen before in this crawl.
    pub new_links: usize,
    pub downloaded: usize,
    pub already_present: usize,
    pub abandoned: usize,
}

impl CrawlReport {
    fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Duplicate => return,
            Disposition::Counted => {}
            Disposition::Fetched(SaveOutcome::Saved { .. }) => self.downloaded += 1,
            Disposition::Fetched(SaveOutcome::AlreadyPresent) => self.already_present += 1,
            Disposition::Fetched(SaveOutcome::Abandoned(_)) => self.abandoned += 1,
        }
        self.new_links += 1;
    }
}

/// Terminal progress bar over the prefix scan.
pub fn prefix_progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    match ProgressStyle::default_bar()
        .template("Prefixes [{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta}) {msg}")
    {
        Ok(style) => bar.set_style(style.progress_chars("=> ")),
        Err(e) => warn!(error = %e, "Invalid progress bar template, using default"),
    }
    bar
}

/// Sequential crawler over EvaluationKit's public report search.
pub struct Crawler {
    client: EvalKitClient,
    downloader: Downloader,
    page_delay: Duration,
    page_timeout: Duration,
    progress: ProgressBar,
}

impl Crawler {
    pub fn new(
        client: EvalKitClient,
        downloader: Downloader,
        page_delay: Duration,
        page_timeout: Duration,
    ) -> Self {
        Self {
            client,
            downloader,
            page_delay,
            page_timeout,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `bar` once per prefix walked.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    /// Walk every prefix in order.
    ///
    /// A prefix whose page fetch or download fails after retries is logged and
    /// counted; the crawl moves on to the next prefix.
    pub async fn run(&self, prefixes: impl Iterator<Item = String>) -> CrawlReport {
        let start = Instant::now();
        let mut seen = SeenIds::default();
        let mut report = CrawlReport::default();

        for prefix in prefixes {
            report.prefixes += 1;
            self.progress.set_message(prefix.clone());
            if let Err(e) = self.crawl_prefix(&prefix, &mut seen, &mut report).await {
                self.progress
                    .suspend(|| warn!(prefix, error = ?e, "Prefix failed, moving on"));
                report.failed_prefixes += 1;
            }
            self.progress.inc(1);
        }
        self.progress.finish_and_clear();

        info!(
            prefixes = report.prefixes,
            failed_prefixes = report.failed_prefixes,
            pages = report.pages,
            links = report.links,
            new_links = report.new_links,
            downloaded = report.downloaded,
            already_present = report.already_present,
            abandoned = report.abandoned,
            duration = fmt_duration(start.elapsed()),
            "Crawl complete"
        );
        report
    }

    async fn crawl_prefix(
        &self,
        prefix: &str,
        seen: &mut SeenIds,
        report: &mut CrawlReport,
    ) -> Result<()> {
        let mut cursor = PageCursor::FetchingFirst;
        let mut prefix_new = 0usize;

        while let Some(page) = cursor.page() {
            if cursor.is_api() && page > pagination::FIRST_API_PAGE {
                tokio::time::sleep(self.page_delay).await;
            }

            let result = fetch_search_page(&self.client, prefix, page, self.page_timeout).await?;
            let links = extract_pdf_links(&result.html, self.client.base_url().as_str());
            report.pages += 1;
            report.links += links.len();

            let mut new = 0usize;
            for link in &links {
                let disposition = self.downloader.handle(seen, link).await?;
                if disposition != Disposition::Duplicate {
                    new += 1;
                }
                report.record(&disposition);
            }
            prefix_new += new;

            debug!(prefix, page, links = links.len(), new, more = result.more, "Page processed");
            cursor = cursor.advance(links.len(), result.more);
        }

        if prefix_new > 0 {
            info!(prefix, new = prefix_new, "Prefix done");
        } else {
            debug!(prefix, "Prefix had no new reports");
        }
        Ok(())
    }
}
