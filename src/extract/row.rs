//! Evaluation rows and the completeness gate in front of the CSV store.

use crate::extract::rules::ResponseCount;
use indexmap::IndexMap;

/// Metadata columns, in CSV order. Question columns follow.
pub const META_COLUMNS: [&str; 7] = [
    "file",
    "course_number",
    "course_name",
    "instructor",
    "year",
    "term",
    "num_respondents",
];

/// Metadata recovered from the report text; any rule may have missed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMetadata {
    pub course_number: Option<String>,
    pub course_name: Option<String>,
    pub instructor: Option<String>,
    pub year: Option<String>,
    pub term: Option<String>,
}

/// Everything the extractor pulled out of one report, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedReport {
    pub file: String,
    pub metadata: ReportMetadata,
    /// Question title to histogram rows, first occurrence of each title only.
    pub questions: IndexMap<String, Vec<ResponseCount>>,
    pub filename_respondents: Option<u32>,
    /// Largest `N/M (P%)` count across question blocks.
    pub text_respondents: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    #[error("{file}: missing {field}")]
    MissingField { file: String, field: &'static str },
    #[error("{file}: question {question:?} has no response rows")]
    EmptyQuestion { file: String, question: String },
}

/// A validated evaluation record, ready to append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRow {
    pub file: String,
    pub course_number: String,
    pub course_name: String,
    pub instructor: String,
    pub year: String,
    pub term: String,
    pub num_respondents: u32,
    pub questions: IndexMap<String, Vec<ResponseCount>>,
}

impl EvaluationRow {
    /// Metadata values in [`META_COLUMNS`] order.
    pub fn meta_values(&self) -> [String; 7] {
        [
            self.file.clone(),
            self.course_number.clone(),
            self.course_name.clone(),
            self.instructor.clone(),
            self.year.clone(),
            self.term.clone(),
            self.num_respondents.to_string(),
        ]
    }
}

impl TryFrom<ExtractedReport> for EvaluationRow {
    type Error = RowError;

    /// Admit the report only if every metadata field is present and non-empty
    /// and every question produced at least one response pair.
    fn try_from(report: ExtractedReport) -> Result<Self, Self::Error> {
        let file = report.file;
        let require = |value: Option<String>, field: &'static str| {
            value
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| RowError::MissingField {
                    file: file.clone(),
                    field,
                })
        };

        let meta = report.metadata;
        let course_number = require(meta.course_number, "course_number")?;
        let course_name = require(meta.course_name, "course_name")?;
        let instructor = require(meta.instructor, "instructor")?;
        let year = require(meta.year, "year")?;
        let term = require(meta.term, "term")?;

        if let Some((question, _)) = report.questions.iter().find(|(_, rows)| rows.is_empty()) {
            return Err(RowError::EmptyQuestion {
                file,
                question: question.clone(),
            });
        }

        let num_respondents = report
            .filename_respondents
            .or(report.text_respondents)
            .unwrap_or(0);

        Ok(Self {
            file,
            course_number,
            course_name,
            instructor,
            year,
            term,
            num_respondents,
            questions: report.questions,
        })
    }
}
