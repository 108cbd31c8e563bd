use crate::cli::{CrawlArgs, SummarizeArgs, WatchArgs, resolve_output_dir};
use crate::config::Config;
use crate::crawler::download::{DownloadMode, Downloader};
use crate::crawler::{CrawlReport, Crawler, prefix_progress_bar};
use crate::extract::PdfTextExtractor;
use crate::http::EvalKitClient;
use crate::store::CsvStore;
use crate::summarize::summarize_csv;
use crate::watcher::Watcher;
use anyhow::Context;
use indicatif::ProgressBar;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Wires configuration into the crawler, watcher and summarizer.
pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Crawl the prefixes selected by `args`. Dry run unless `--live`.
    ///
    /// `show_progress` draws a prefix progress bar on stderr.
    pub async fn crawl(
        &self,
        args: &CrawlArgs,
        show_progress: bool,
    ) -> Result<CrawlReport, anyhow::Error> {
        let out_dir = resolve_output_dir(args, &self.config.watch_dir)?;
        let mode = if args.live {
            DownloadMode::Live
        } else {
            DownloadMode::DryRun
        };
        let page_delay = args.delay.unwrap_or(self.config.page_delay);
        let filter = args.prefix.clone().unwrap_or_default();

        let client =
            EvalKitClient::new(&self.config).context("Failed to build EvaluationKit client")?;
        let downloader = Downloader::new(
            client.clone(),
            out_dir.clone(),
            mode,
            self.config.page_timeout,
            self.config.pdf_timeout,
        );
        let progress = if show_progress {
            prefix_progress_bar(filter.prefix_count())
        } else {
            ProgressBar::hidden()
        };
        let crawler = Crawler::new(client, downloader, page_delay, self.config.page_timeout)
            .with_progress(progress);

        info!(
            mode = ?mode,
            out_dir = %out_dir.display(),
            filter = ?filter,
            page_delay = ?page_delay,
            "Starting crawl"
        );
        Ok(crawler.run(filter.prefixes()).await)
    }

    /// Ingest PDFs until `shutdown` resolves.
    pub async fn watch(
        &self,
        args: &WatchArgs,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), anyhow::Error> {
        let dir = args.dir.clone().unwrap_or_else(|| self.config.watch_dir.clone());
        let csv = args.csv.clone().unwrap_or_else(|| self.config.csv_path.clone());
        let interval = args.interval.unwrap_or(self.config.poll_interval);

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create watch directory {}", dir.display()))?;

        let mut watcher = Watcher::new(
            dir,
            CsvStore::new(csv),
            interval,
            Arc::new(PdfTextExtractor),
        );
        watcher.run(shutdown).await;
        Ok(())
    }

    pub fn summarize(&self, args: &SummarizeArgs) -> Result<usize, anyhow::Error> {
        let input = args.csv.as_deref().unwrap_or(&self.config.csv_path);
        summarize_csv(input, &args.out)
    }
}
