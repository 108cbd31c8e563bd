//! PDF report links in search-result markup.
//!
//! Each result card carries an anchor like
//! `<a class="sr-pdf" data-id0=".." data-id1=".." data-id2=".." data-id3="..">`;
//! the report is served from `/Reports/SRPdf.aspx?{id0},{id1},{id2},{id3}`.

use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// Path of the report download endpoint, relative to the site root.
pub const REPORT_PDF_PATH: &str = "Reports/SRPdf.aspx";

const ID_ATTRS: [&str; 4] = ["data-id0", "data-id1", "data-id2", "data-id3"];

/// A discovered report download and the filename to store it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfLink {
    pub url: String,
    pub filename: String,
}

impl PdfLink {
    /// The comma-joined identifier query; equal ids mean the same report.
    pub fn report_id(&self) -> &str {
        self.url
            .split_once('?')
            .map(|(_, query)| query)
            .unwrap_or(&self.url)
    }
}

/// Extract report links in document order. Duplicates are kept.
pub fn extract_pdf_links(html: &str, base_url: &str) -> Vec<PdfLink> {
    static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.sr-pdf").unwrap());

    let document = Html::parse_document(html);
    let base = base_url.trim_end_matches('/');
    let mut links = Vec::new();

    for anchor in document.select(&ANCHOR_SEL) {
        let ids: Option<Vec<&str>> = ID_ATTRS.iter().map(|attr| anchor.attr(attr)).collect();
        let Some(ids) = ids else {
            debug!("Skipping report anchor with missing data-id attributes");
            continue;
        };

        let title = card_title(anchor);
        links.push(PdfLink {
            url: format!("{base}/{REPORT_PDF_PATH}?{}", ids.join(",")),
            filename: sanitize_filename(&title),
        });
    }

    links
}

/// Text of the result card around `anchor`: the nearest ancestor whose class
/// mentions `panel` or `card`, falling back to the anchor's parent.
fn card_title(anchor: ElementRef<'_>) -> String {
    static CARD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"panel|card").unwrap());

    let card = anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().attr("class").is_some_and(|c| CARD_RE.is_match(c)))
        .or_else(|| anchor.parent().and_then(ElementRef::wrap));

    match card {
        Some(card) => collapse_text(card),
        None => collapse_text(anchor),
    }
}

/// Trimmed, non-empty text nodes joined by single spaces.
fn collapse_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace everything outside word characters, hyphen and space with `_`, then add `.pdf`.
pub fn sanitize_filename(title: &str) -> String {
    static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\- ]").unwrap());
    format!("{}.pdf", UNSAFE_RE.replace_all(title, "_"))
}
