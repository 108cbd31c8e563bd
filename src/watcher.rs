//! Watch-and-ingest loop: turns downloaded PDFs into CSV rows.

use crate::extract::{TextExtractor, extract_row};
use crate::store::CsvStore;
use crate::utils::fmt_duration;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Filenames already ingested by this watcher process. Never persisted.
#[derive(Debug, Default)]
pub struct ProcessedSet(HashSet<String>);

impl ProcessedSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn insert(&mut self, name: String) -> bool {
        self.0.insert(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Outcome counts for one polling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub ingested: usize,
    pub failed: usize,
}

pub struct Watcher {
    dir: PathBuf,
    store: CsvStore,
    processed: ProcessedSet,
    interval: Duration,
    extractor: Arc<dyn TextExtractor>,
}

impl Watcher {
    pub fn new(
        dir: PathBuf,
        store: CsvStore,
        interval: Duration,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            dir,
            store,
            processed: ProcessedSet::default(),
            interval,
            extractor,
        }
    }

    pub fn processed(&self) -> &ProcessedSet {
        &self.processed
    }

    /// Poll until `shutdown` resolves.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        info!(
            dir = %self.dir.display(),
            csv = %self.store.path().display(),
            interval = fmt_duration(self.interval),
            "Watching for PDFs"
        );

        tokio::pin!(shutdown);
        loop {
            if let Err(e) = self.tick().await {
                error!(dir = %self.dir.display(), error = ?e, "Failed to scan watch directory");
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(processed = self.processed.len(), "Stopped watching");
    }

    /// One pass over the directory. Per-file failures are logged and counted;
    /// only a directory listing failure is returned.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        for path in list_pdfs(&self.dir).await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            if self.processed.contains(&name) {
                continue;
            }

            let start = Instant::now();
            match self.ingest(path, name.clone()).await {
                Ok(leftover) => {
                    if let Some(e) = leftover {
                        warn!(file = name, error = ?e, "Appended row but failed to delete PDF");
                    }
                    info!(file = name, duration = fmt_duration(start.elapsed()), "Ingested");
                    self.processed.insert(name);
                    report.ingested += 1;
                }
                Err(e) => {
                    error!(file = name, error = format!("{e:#}"), "Failed to ingest");
                    report.failed += 1;
                }
            }
        }

        if report != TickReport::default() {
            debug!(ingested = report.ingested, failed = report.failed, "Tick complete");
        }
        Ok(report)
    }

    /// Extract, append and delete on the blocking pool. A failed delete comes
    /// back as `Ok(Some(_))` since the row is already stored.
    async fn ingest(&self, path: PathBuf, name: String) -> Result<Option<std::io::Error>> {
        let extractor = Arc::clone(&self.extractor);
        let store = self.store.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<std::io::Error>> {
            let text = extractor.extract_text(&path)?;
            let row = extract_row(&name, &text)?;
            store.append(&row)?;
            Ok(std::fs::remove_file(&path).err())
        })
        .await
        .context("Ingest task panicked")?
    }
}

/// `*.pdf` files directly under `dir`, sorted by name.
async fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut pdfs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_file()) {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_list_pdfs_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "c.pdf.part", "notes.txt"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.pdf")).unwrap();

        let names: Vec<String> = list_pdfs(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.PDF", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_list_pdfs_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_pdfs(&dir.path().join("missing")).await.is_err());
    }

    #[test]
    fn test_processed_set() {
        let mut set = ProcessedSet::default();
        assert!(set.is_empty());
        assert!(set.insert("a.pdf".to_owned()));
        assert!(!set.insert("a.pdf".to_owned()));
        assert!(set.contains("a.pdf"));
        assert_eq!(set.len(), 1);
    }
}
