//! Course-evaluation report extraction: PDF text in, evaluation row out.

pub mod row;
pub mod rules;

use crate::extract::row::{EvaluationRow, ExtractedReport, ReportMetadata, RowError};
use crate::extract::rules::{
    find_course, find_instructor, find_term, parse_question_block, respondents_from_filename,
    split_question_blocks,
};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use indexmap::map::Entry;
use std::path::Path;
use tracing::trace;

/// Run every rule over a report's full text.
pub fn extract_report(file: &str, text: &str) -> ExtractedReport {
    let course = find_course(text);
    let term = find_term(text);
    let (course_number, course_name) = course.unzip();
    let (year, term) = term.unzip();

    let mut questions = IndexMap::new();
    let mut text_respondents: Option<u32> = None;

    for block in split_question_blocks(text) {
        let Some(question) = parse_question_block(block) else {
            continue;
        };
        text_respondents = text_respondents.max(question.respondents);

        match questions.entry(question.title) {
            Entry::Vacant(slot) => {
                slot.insert(question.responses);
            }
            Entry::Occupied(slot) => {
                trace!(file, question = slot.key(), "Ignoring repeated question section");
            }
        }
    }

    ExtractedReport {
        file: file.to_string(),
        metadata: ReportMetadata {
            course_number,
            course_name,
            instructor: find_instructor(text),
            year,
            term,
        },
        questions,
        filename_respondents: respondents_from_filename(file),
        text_respondents,
    }
}

/// Extract and validate in one step.
pub fn extract_row(file: &str, text: &str) -> Result<EvaluationRow, RowError> {
    EvaluationRow::try_from(extract_report(file, text))
}

/// Source of report text. The watcher reads PDFs through this so tests can
/// feed plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String>;
}

/// Text of every page, concatenated, via `pdf-extract`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| anyhow::anyhow!("Failed to extract text from {}: {e}", path.display()))
    }
}
