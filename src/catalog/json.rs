//! JSON decoding for catalog responses with path-aware error messages.

use anyhow::Result;

/// Width of the source excerpt shown around a decode failure.
const SNIPPET_WIDTH: usize = 24;

/// Decode `body`, and on failure report the serde path of the offending
/// field, a cleaned-up type mismatch, and an excerpt of the line with a caret.
pub fn parse_json_with_context<T: serde::de::DeserializeOwned>(body: &str) -> Result<T> {
    let mut de = serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(&mut de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let (line, column) = (inner.line(), inner.column());

        let raw = inner.to_string();
        let suffix = format!(" at line {line} column {column}");
        let message = describe_mismatch(raw.strip_suffix(&suffix).unwrap_or(&raw));
        let excerpt = excerpt(body, line, column);

        match path.as_str() {
            "" | "." => anyhow::anyhow!("{message} (line {line} col {column})\n{excerpt}"),
            _ => anyhow::anyhow!("at '{path}': {message} (line {line} col {column})\n{excerpt}"),
        }
    })
}

/// Rewrite serde's "invalid type: X, expected Y" into "expected Y, got X".
fn describe_mismatch(message: &str) -> String {
    let Some(rest) = message.strip_prefix("invalid type: ") else {
        return message.to_string();
    };
    match rest.split_once(", expected ") {
        Some((actual, expected)) => format!("expected {}, got {actual}", expected.trim()),
        None => message.to_string(),
    }
}

fn excerpt(body: &str, line: usize, column: usize) -> String {
    let text = body.lines().nth(line.saturating_sub(1)).unwrap_or_default();
    if text.is_empty() {
        return "(empty line)".to_string();
    }

    let mut at = column.saturating_sub(1).min(text.len());
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    let mut start = at.saturating_sub(SNIPPET_WIDTH / 2);
    let mut end = (at + SNIPPET_WIDTH / 2).min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let caret = " ".repeat(text[start..at].chars().count()) + "^";
    format!("...{}...\n   {caret}", &text[start..end])
}
