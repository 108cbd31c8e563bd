//! Decoding of the PublicReport API's JSON envelopes.

use serde::de::DeserializeOwned;

/// Chars kept either side of the failing column in [`EnvelopeError::excerpt`].
const EXCERPT_RADIUS: usize = 24;

/// A PublicReport body that failed to decode.
#[derive(Debug, thiserror::Error)]
#[error("bad envelope at `{path}` (line {line}, column {column}): {reason}; near `{excerpt}`")]
pub struct EnvelopeError {
    /// serde path of the offending value, `.` for the document root.
    pub path: String,
    pub line: usize,
    pub column: usize,
    /// serde_json's message without its trailing position.
    pub reason: String,
    pub excerpt: String,
}

/// Decode `body`, tracking the field path so a schema drift names the field.
pub fn decode_envelope<T: DeserializeOwned>(body: &str) -> Result<T, EnvelopeError> {
    let mut de = serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(&mut de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let (line, column) = (inner.line(), inner.column());

        let message = inner.to_string();
        let position = format!(" at line {line} column {column}");
        let reason = message.strip_suffix(&position).unwrap_or(&message).to_string();

        EnvelopeError {
            path,
            line,
            column,
            reason,
            excerpt: excerpt(body, line, column),
        }
    })
}

/// The text around a 1-based `(line, column)`, cut on char boundaries.
fn excerpt(body: &str, line: usize, column: usize) -> String {
    let Some(text) = body.lines().nth(line.saturating_sub(1)) else {
        return String::new();
    };
    let chars: Vec<char> = text.chars().collect();
    let at = column.saturating_sub(1).min(chars.len());
    let from = at.saturating_sub(EXCERPT_RADIUS);
    let to = (at + EXCERPT_RADIUS).min(chars.len());
    chars[from..to].iter().collect()
}
