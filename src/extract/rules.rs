//! Individual text-matching rules over the extracted text of a report PDF.
//!
//! Each rule looks for one thing and returns `None` when the layout doesn't
//! match, so a layout change in the reports breaks exactly one rule.

use regex::Regex;
use std::sync::LazyLock;

/// `(rating_weight, respondent_count)` from one histogram row.
pub type ResponseCount = (u8, u32);

/// Term names EvaluationKit prints after the year.
pub const TERMS: [&str; 4] = ["Spring", "Fall", "Summer", "Intersession"];

/// One numbered question section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionBlock {
    pub title: String,
    pub responses: Vec<ResponseCount>,
    /// `N` from an `N/M (P%)` response-rate line, when the block has one.
    pub respondents: Option<u32>,
}

/// The instructor name: the line right before the `Instructor` label.
pub fn find_instructor(text: &str) -> Option<String> {
    static INSTRUCTOR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n([^\n]+?)\s*Instructor").unwrap());

    INSTRUCTOR_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

/// Course code and title from the `Course: CODE : Title` line.
///
/// The code is normalized with [`normalize_course_number`].
pub fn find_course(text: &str) -> Option<(String, String)> {
    static COURSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"Course:\s*([A-Z0-9.]+)\s*:\s*(.+?)\n").unwrap());

    let caps = COURSE_RE.captures(text)?;
    Some((
        normalize_course_number(caps[1].trim()),
        caps[2].trim().to_string(),
    ))
}

/// Keep only the first three dot-separated segments: `AS.010.101.01.FA23` becomes `AS.010.101`.
pub fn normalize_course_number(raw: &str) -> String {
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.len() >= 3 {
        parts[..3].join(".")
    } else {
        raw.to_string()
    }
}

/// `(year, term)` from text like `2023 Fall`.
pub fn find_term(text: &str) -> Option<(String, String)> {
    static TERM_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(&format!(r"(\d{{4}})\s+({})", TERMS.join("|"))).unwrap()
    });

    let caps = TERM_RE.captures(text)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

/// Split the text on numbered question headers (`\n3 - `), dropping the preamble.
pub fn split_question_blocks(text: &str) -> Vec<&str> {
    static DELIM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\d+\s*-\s*").unwrap());

    DELIM_RE.split(text).skip(1).collect()
}

/// Parse one question block. Blocks without any histogram rows are not data
/// (preamble, comment sections) and yield `None`.
pub fn parse_question_block(block: &str) -> Option<QuestionBlock> {
    static RESPONSE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\((\d)\)\s+(\d+)\s+\d{1,3}\.\d{2}%").unwrap());

    let responses: Vec<ResponseCount> = RESPONSE_RE
        .captures_iter(block)
        .filter_map(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .collect();
    if responses.is_empty() {
        return None;
    }

    let title = block.trim().lines().next().unwrap_or_default().trim().to_string();

    Some(QuestionBlock {
        title,
        responses,
        respondents: find_block_respondents(block),
    })
}

/// `N` from a response-rate line such as `28/40 (70%)`.
pub fn find_block_respondents(block: &str) -> Option<u32> {
    static RATE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(\d+)/\d+\s+\(\d{1,3}%\)").unwrap());

    RATE_RE.captures(block).and_then(|caps| caps[1].parse().ok())
}

/// `N` from a filename containing `N of M responded` (spaces or underscores).
pub fn respondents_from_filename(name: &str) -> Option<u32> {
    static FILENAME_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)(\d+)[_\s]+of[_\s]+\d+[_\s]+responded").unwrap());

    FILENAME_RE.captures(name).and_then(|caps| caps[1].parse().ok())
}
