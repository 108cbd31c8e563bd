mod helpers;

use course_evals::extract::TextExtractor;
use course_evals::store::{CsvStore, parse_pairs};
use course_evals::watcher::{TickReport, Watcher};
use helpers::{ART_REPORT, CS_REPORT, INCOMPLETE_REPORT};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Treats every "PDF" as UTF-8 report text.
struct PlainText;

impl TextExtractor for PlainText {
    fn extract_text(&self, path: &Path) -> anyhow::Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn setup() -> (TempDir, Watcher, CsvStore) {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("pdfs");
    std::fs::create_dir(&inbox).unwrap();
    let store = CsvStore::new(dir.path().join("all_course_stats.csv"));
    let watcher = Watcher::new(
        inbox,
        store.clone(),
        Duration::from_millis(10),
        Arc::new(PlainText),
    );
    (dir, watcher, store)
}

fn drop_pdf(dir: &TempDir, name: &str, text: &str) {
    std::fs::write(dir.path().join("pdfs").join(name), text).unwrap();
}

#[tokio::test]
async fn test_ingests_and_removes_pdf() {
    let (dir, mut watcher, store) = setup();
    drop_pdf(&dir, "Intro to Art 12 of 40 responded.pdf", ART_REPORT);

    let report = watcher.tick().await.unwrap();

    assert_eq!(report, TickReport { ingested: 1, failed: 0 });
    assert!(!dir.path().join("pdfs/Intro to Art 12 of 40 responded.pdf").exists());
    assert!(watcher.processed().contains("Intro to Art 12 of 40 responded.pdf"));

    let contents = store.read_all().unwrap();
    assert_eq!(contents.rows.len(), 1);
    let row = &contents.rows[0];
    assert_eq!(row[0], "Intro to Art 12 of 40 responded.pdf");
    assert_eq!(row[1], "AS.010.101");
    assert_eq!(row[2], "Intro to Art");
    assert_eq!(row[3], "Jane Doe");
    assert_eq!(row[4], "2023");
    assert_eq!(row[5], "Fall");
    // The filename count wins over the 30 found in the text.
    assert_eq!(row[6], "12");
    assert_eq!(parse_pairs(&row[7]), Some(vec![(1, 3), (2, 7), (3, 20)]));
}

#[tokio::test]
async fn test_incomplete_report_stays_for_retry() {
    let (dir, mut watcher, store) = setup();
    drop_pdf(&dir, "broken.pdf", INCOMPLETE_REPORT);

    assert_eq!(watcher.tick().await.unwrap(), TickReport { ingested: 0, failed: 1 });
    assert_eq!(watcher.tick().await.unwrap(), TickReport { ingested: 0, failed: 1 });

    assert!(dir.path().join("pdfs/broken.pdf").exists());
    assert!(watcher.processed().is_empty());
    assert!(!store.path().exists());
}

#[tokio::test]
async fn test_partial_downloads_are_ignored() {
    let (dir, mut watcher, _store) = setup();
    drop_pdf(&dir, "Intro to Art.pdf.part", ART_REPORT);

    assert_eq!(watcher.tick().await.unwrap(), TickReport::default());
    assert!(dir.path().join("pdfs/Intro to Art.pdf.part").exists());
}

#[tokio::test]
async fn test_new_questions_widen_the_store() {
    let (dir, mut watcher, store) = setup();
    drop_pdf(&dir, "a.pdf", ART_REPORT);
    drop_pdf(&dir, "b.pdf", CS_REPORT);

    assert_eq!(watcher.tick().await.unwrap(), TickReport { ingested: 2, failed: 0 });

    let contents = store.read_all().unwrap();
    assert_eq!(
        contents.question_columns(),
        ["The course was well organized.", "The workload for this course is:"]
    );

    let art = &contents.rows[0];
    assert_eq!(art[0], "a.pdf");
    assert_eq!(art[6], "30");
    assert_eq!(art[8], "");

    let cs = &contents.rows[1];
    assert_eq!(cs[1], "EN.601.226");
    assert_eq!(cs[6], "10");
    assert_eq!(cs[7], "[(4, 5), (5, 5)]");
    assert_eq!(cs[8], "[(3, 10)]");
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let (dir, mut watcher, store) = setup();
    drop_pdf(&dir, "a.pdf", ART_REPORT);

    watcher.run(async {}).await;

    assert_eq!(store.read_all().unwrap().rows.len(), 1);
    assert_eq!(watcher.processed().len(), 1);
}

/// Blocks its thread before handing back the report text.
struct SlowText;

impl TextExtractor for SlowText {
    fn extract_text(&self, path: &Path) -> anyhow::Result<String> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(std::fs::read_to_string(path)?)
    }
}

#[tokio::test]
async fn test_ingest_leaves_the_runtime_free() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = dir.path().join("pdfs");
    std::fs::create_dir(&inbox).unwrap();
    std::fs::write(inbox.join("a.pdf"), ART_REPORT).unwrap();
    let store = CsvStore::new(dir.path().join("all_course_stats.csv"));
    let mut watcher = Watcher::new(
        inbox.clone(),
        store.clone(),
        Duration::from_millis(10),
        Arc::new(SlowText),
    );

    // Single-threaded runtime: the ticker only advances if ingest yields.
    let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let ticker = tokio::spawn({
        let ticks = Arc::clone(&ticks);
        async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    });

    assert_eq!(watcher.tick().await.unwrap(), TickReport { ingested: 1, failed: 0 });
    ticker.abort();

    assert!(ticks.load(std::sync::atomic::Ordering::Relaxed) >= 5);
    assert!(!inbox.join("a.pdf").exists());
    assert_eq!(store.read_all().unwrap().rows.len(), 1);
}
