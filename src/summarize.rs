//! Collapse list-valued question columns into `<q>_n` / `<q>_mean` columns.

use crate::extract::row::META_COLUMNS;
use crate::extract::rules::ResponseCount;
use crate::store::{CsvStore, parse_pairs};
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// Respondent count and weighted mean rating for one question cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionSummary {
    pub n: u32,
    pub mean: Option<f64>,
}

/// Collapse a histogram. Weight 0 is excluded; a repeated weight keeps its
/// last count.
pub fn collapse(pairs: &[ResponseCount]) -> QuestionSummary {
    let by_weight: BTreeMap<u8, u32> = pairs
        .iter()
        .copied()
        .filter(|(weight, _)| *weight != 0)
        .collect();

    let n: u32 = by_weight.values().sum();
    let mean = (n > 0).then(|| {
        let total: f64 = by_weight
            .iter()
            .map(|(weight, count)| f64::from(*weight) * f64::from(*count))
            .sum();
        total / f64::from(n)
    });

    QuestionSummary { n, mean }
}

/// Summarize every row of `input` into `output`. Returns the row count.
pub fn summarize_csv(input: &Path, output: &Path) -> anyhow::Result<usize> {
    let contents = CsvStore::new(input)
        .read_all()
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let questions = contents.question_columns();

    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let header = META_COLUMNS.iter().map(|c| c.to_string()).chain(
        questions
            .iter()
            .flat_map(|q| [format!("{q}_n"), format!("{q}_mean")]),
    );
    writer.write_record(header.collect::<Vec<_>>())?;

    for row in &contents.rows {
        let mut record: Vec<String> = row.iter().take(META_COLUMNS.len()).cloned().collect();
        record.resize(META_COLUMNS.len(), String::new());

        for (i, question) in questions.iter().enumerate() {
            let cell = row.get(META_COLUMNS.len() + i).map(String::as_str).unwrap_or("");
            let summary = match parse_pairs(cell) {
                Some(pairs) => collapse(&pairs),
                None => {
                    if !cell.trim().is_empty() {
                        debug!(file = row[0], question, cell, "Unparseable question cell");
                    }
                    QuestionSummary { n: 0, mean: None }
                }
            };
            record.push(summary.n.to_string());
            record.push(summary.mean.map(|m| m.to_string()).unwrap_or_default());
        }

        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        input = %input.display(),
        output = %output.display(),
        rows = contents.rows.len(),
        questions = questions.len(),
        "Summarized CSV store"
    );
    Ok(contents.rows.len())
}
