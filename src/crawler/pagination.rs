//! Result-page walking for one course prefix.
//!
//! Page 1 is the server-rendered `Report/Public/Results` page. Further results
//! come from the `AppApi/Report/PublicReport` JSON endpoint, starting at page
//! index 3: the site's "show more" button skips page 2 because page 1 already
//! renders two chunks.

use crate::http::json::decode_envelope;
use crate::http::{EvalKitClient, FetchRequest};
use anyhow::{Context, Result};
use html_scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// Rows the PublicReport API returns per full page.
pub const CHUNK_SIZE: usize = 20;

/// First page index served by the JSON API.
pub const FIRST_API_PAGE: u32 = 3;

pub const RESULTS_PATH: &str = "Report/Public/Results";
pub const PUBLIC_REPORT_API_PATH: &str = "AppApi/Report/PublicReport";

/// Where a prefix's page walk stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCursor {
    /// Page 1 (HTML) has not been fetched yet.
    FetchingFirst,
    /// The given API page is next.
    FetchingMore(u32),
    Exhausted,
}

impl PageCursor {
    /// Page index to request next, if any.
    pub fn page(self) -> Option<u32> {
        match self {
            Self::FetchingFirst => Some(1),
            Self::FetchingMore(page) => Some(page),
            Self::Exhausted => None,
        }
    }

    /// Whether the next request goes to the JSON API.
    pub fn is_api(self) -> bool {
        matches!(self, Self::FetchingMore(_))
    }

    /// Transition after a page yielded `rows` report links and claimed `more`.
    ///
    /// The walk ends when the server says there is nothing more, or when an
    /// API page comes back empty or short of a full chunk, whatever `more` says.
    pub fn advance(self, rows: usize, more: bool) -> Self {
        let exhausted = !more || (self.is_api() && (rows == 0 || rows < CHUNK_SIZE));
        match self {
            Self::Exhausted => Self::Exhausted,
            _ if exhausted => Self::Exhausted,
            Self::FetchingFirst => Self::FetchingMore(FIRST_API_PAGE),
            Self::FetchingMore(page) => Self::FetchingMore(page + 1),
        }
    }
}

/// One fetched page of search results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
    /// Result markup; for API pages, the concatenated fragments.
    pub html: String,
    pub more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicReportEnvelope {
    #[serde(default)]
    results: Vec<String>,
    #[serde(default)]
    has_more: bool,
}

/// Parse the HTML first page; `#publicMore` is the "show more" button.
pub fn parse_first_page(html: String) -> SearchPage {
    static MORE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#publicMore").unwrap());

    let more = Html::parse_document(&html).select(&MORE_SEL).next().is_some();
    SearchPage { html, more }
}

/// Parse a PublicReport API envelope.
pub fn parse_api_page(body: &str) -> Result<SearchPage> {
    let envelope: PublicReportEnvelope =
        decode_envelope(body).context("Malformed PublicReport envelope")?;
    Ok(SearchPage {
        html: envelope.results.concat(),
        more: envelope.has_more,
    })
}

/// Fetch one search page for `prefix`.
pub async fn fetch_search_page(
    client: &EvalKitClient,
    prefix: &str,
    page: u32,
    timeout: Duration,
) -> Result<SearchPage> {
    let page_str = page.to_string();
    let params = [
        ("Course", prefix),
        ("Instructor", ""),
        ("TermId", ""),
        ("Year", ""),
        ("AreaId", ""),
        ("QuestionKey", ""),
        ("Search", "true"),
        ("page", page_str.as_str()),
    ];

    if page == 1 {
        let url = client.endpoint(RESULTS_PATH);
        let html = client
            .get_text(&FetchRequest::new(&url, timeout).query(&params))
            .await
            .context("Failed to fetch results page")?;
        return Ok(parse_first_page(html));
    }

    let url = client.endpoint(PUBLIC_REPORT_API_PATH);
    let request = FetchRequest::new(&url, timeout)
        .query(&params)
        .header("x-requested-with", "XMLHttpRequest")
        .header("accept", "application/json, text/javascript, */*; q=0.01");
    let body = client
        .get_text(&request)
        .await
        .context("Failed to fetch PublicReport page")?;
    parse_api_page(&body).with_context(|| format!("prefix {prefix} page {page}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the cursor through a scripted list of (rows, more) page results.
    fn walk(script: &[(usize, bool)]) -> Vec<u32> {
        let mut cursor = PageCursor::FetchingFirst;
        let mut fetched = Vec::new();
        let mut results = script.iter();
        while let Some(page) = cursor.page() {
            fetched.push(page);
            let &(rows, more) = results.next().expect("walk requested more pages than scripted");
            cursor = cursor.advance(rows, more);
        }
        fetched
    }

    #[test]
    fn test_single_page_without_more() {
        assert_eq!(walk(&[(12, false)]), vec![1]);
    }

    #[test]
    fn test_skips_page_two() {
        assert_eq!(walk(&[(40, true), (20, true), (20, false)]), vec![1, 3, 4]);
    }

    #[test]
    fn test_short_page_ends_walk_even_if_more() {
        assert_eq!(walk(&[(40, true), (20, true), (7, true)]), vec![1, 3, 4]);
    }

    #[test]
    fn test_empty_api_page_ends_walk() {
        assert_eq!(walk(&[(40, true), (0, true)]), vec![1, 3]);
    }

    #[test]
    fn test_short_first_page_still_follows_more() {
        // Page 1 only trusts the "show more" button.
        assert_eq!(walk(&[(5, true), (20, false)]), vec![1, 3]);
    }

    #[test]
    fn test_exhausted_is_terminal() {
        assert_eq!(PageCursor::Exhausted.advance(20, true), PageCursor::Exhausted);
        assert_eq!(PageCursor::Exhausted.page(), None);
    }

    #[test]
    fn test_parse_first_page_more_button() {
        let page = parse_first_page(
            r#"<div id="publicResults"></div><button id="publicMore">Show More</button>"#.to_owned(),
        );
        assert!(page.more);

        let page = parse_first_page(r#"<div id="publicResults"></div>"#.to_owned());
        assert!(!page.more);
    }

    #[test]
    fn test_parse_api_page_joins_fragments() {
        let page =
            parse_api_page(r#"{"results": ["<div>a</div>", "<div>b</div>"], "hasMore": true}"#)
                .unwrap();
        assert_eq!(page.html, "<div>a</div><div>b</div>");
        assert!(page.more);
    }

    #[test]
    fn test_parse_api_page_missing_fields_default() {
        let page = parse_api_page("{}").unwrap();
        assert!(page.html.is_empty());
        assert!(!page.more);
    }

    #[test]
    fn test_parse_api_page_rejects_garbage() {
        let err = parse_api_page("<html>login</html>").unwrap_err();
        assert!(format!("{err:#}").contains("Malformed PublicReport envelope"));
    }
}
