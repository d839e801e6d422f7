//! Parsing of `key=value` check output

use std::collections::BTreeMap;

use serde::Serialize;

/// Key every check must report
pub const STATUS_KEY: &str = "status";

/// Parsed check output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedOutput {
    /// Value of the `status` key
    pub status: String,
    /// Last value seen per key
    pub fields: BTreeMap<String, String>,
    /// Every accepted line as `key=value`, in stream order
    pub lines: Vec<String>,
}

/// Parse `key=value` lines from check stdout.
///
/// Blank lines, lines without `=` and lines with an empty key are skipped.
/// Only the first `=` splits; the value keeps any later ones.
pub fn parse_output(stdout: &str) -> Result<ParsedOutput, ParseError> {
    let mut fields = BTreeMap::new();
    let mut lines = Vec::new();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            continue;
        }

        lines.push(format!("{}={}", key, value));
        fields.insert(key.to_string(), value.to_string());
    }

    let status = fields
        .get(STATUS_KEY)
        .cloned()
        .ok_or(ParseError::MissingStatus)?;

    Ok(ParsedOutput {
        status,
        fields,
        lines,
    })
}

/// Output parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("check output missing required 'status' key")]
    MissingStatus,
}
