//! Line codec between the byte streams and the detector's records.
//!
//! Text input keeps each line's terminator so that combined traces
//! are written back byte-for-byte. JSON input is one object per line;
//! anything that does not decode to an object is treated as text.

use serde_json::Value;

use tracefold_core::metrics as m;
use tracefold_core::types::{OutputRecord, Record};

/// Input record encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Text,
    Json,
}

impl InputFormat {
    /// Map the `detector.input_format` config value.
    pub fn from_config(value: &str) -> Self {
        if value == "json" { Self::Json } else { Self::Text }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

/// Decode one input line (including its terminator, if any).
pub fn parse_line(line: &str, format: InputFormat) -> Record {
    metrics::counter!(m::DAEMON_INPUT_LINES_TOTAL, m::LABEL_FORMAT => format.as_str())
        .increment(1);

    match format {
        InputFormat::Text => Record::Text(line.to_owned()),
        InputFormat::Json => match serde_json::from_str::<Value>(line.trim_end_matches(['\r', '\n'])) {
            Ok(Value::Object(fields)) => Record::Structured(fields),
            Ok(_) => {
                tracing::debug!("json input line is not an object, treating as text");
                metrics::counter!(m::DAEMON_INPUT_DECODE_ERRORS_TOTAL).increment(1);
                Record::Text(line.to_owned())
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to decode json input line, treating as text");
                metrics::counter!(m::DAEMON_INPUT_DECODE_ERRORS_TOTAL).increment(1);
                Record::Text(line.to_owned())
            }
        },
    }
}

/// Encode an emitted record for stdout.
///
/// Text is written verbatim. Structured records become one JSON object
/// per line.
pub fn render(output: &OutputRecord) -> String {
    match &output.record {
        Record::Text(text) => text.clone(),
        record @ Record::Structured(_) => format!("{record}\n"),
    }
}
