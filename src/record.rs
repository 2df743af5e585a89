use serde_json::Value;
use std::borrow::Cow;

/// Line number used for errors that belong to the whole file rather than one line.
pub const FILE_LEVEL_LINE: u64 = 0;

/// One successfully parsed line.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based ordinal of the line in the source, blank lines included.
    pub line_number: u64,
    pub value: Value,
    /// The source line with surrounding whitespace trimmed.
    pub raw_text: String,
}

impl Record {
    pub fn new(line_number: u64, value: Value, raw_text: impl Into<String>) -> Self {
        Self {
            line_number,
            value,
            raw_text: raw_text.into(),
        }
    }

    /// Value stored under `key` when the record is a JSON object.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.value.as_object().and_then(|map| map.get(key))
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Compact JSON of the value, cut to `max_chars` characters with a trailing `...`.
    pub fn preview(&self, max_chars: usize) -> String {
        let compact = self.value.to_string();
        truncate_chars(&compact, max_chars)
    }

    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.value).unwrap_or_else(|_| self.raw_text.clone())
    }
}

/// A line that could not be parsed, or a whole-file failure when `line_number` is 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line_number: u64,
    pub raw_text: String,
    pub message: String,
}

impl ParseError {
    pub fn new(line_number: u64, raw_text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            line_number,
            raw_text: raw_text.into(),
            message: message.into(),
        }
    }

    pub fn file_level(message: impl Into<String>) -> Self {
        Self::new(FILE_LEVEL_LINE, String::new(), message)
    }

    pub fn is_file_level(&self) -> bool {
        self.line_number == FILE_LEVEL_LINE
    }

    pub fn line_label(&self) -> String {
        if self.is_file_level() {
            "N/A".to_string()
        } else {
            self.line_number.to_string()
        }
    }
}

/// Text form of a JSON value used for field matching and tabular output.
///
/// Strings come out verbatim, everything else as compact JSON.
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}

/// `text` cut to `max_chars` characters, with `...` appended when shortened.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
