//! Verifier output record decoding.
//!
//! Each stdout record is one of:
//!
//! - a JSON object `{"level", "timestamp", "message", "extra"}`;
//! - a tagged record `JSON-<TAG>-<json>` from older verifier builds, where
//!   `ERC` is a positioned code error, `ERS` a fatal structural error, `WRN`
//!   a warning, and any other tag informational.
//!
//! The open `extra` map is decoded into the closed [`DiagnosticAttribute`]
//! set; unknown keys are ignored.

use serde::Deserialize;

use crate::types::{Diagnostic, DiagnosticAttribute, ProtocolEvent, Severity, StreamErrorClass};

const TAGGED_PREFIX: &str = "JSON-";

/// One record that did not decode. Carries the raw record verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ProtocolParseError {
    raw: String,
    reason: String,
}

impl ProtocolParseError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    level: String,
    #[serde(default)]
    timestamp: Option<String>,
    message: String,
    #[serde(default)]
    extra: Option<WireExtra>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireExtra {
    offset_left: Option<i64>,
    offset_right: Option<i64>,
    title: Option<String>,
    quantifiers_removed: Option<i64>,
    while_rule: Option<String>,
}

impl WireExtra {
    fn into_attributes(self) -> Vec<DiagnosticAttribute> {
        let mut attributes = Vec::new();
        match (self.offset_left, self.offset_right) {
            (Some(left), Some(right)) => attributes.push(DiagnosticAttribute::PositionedError {
                left,
                right,
                title: self.title,
            }),
            (left, right) => {
                if left.is_some() || right.is_some() {
                    tracing::debug!(?left, ?right, "Ignoring half-specified offset pair");
                }
                if let Some(title) = self.title {
                    attributes.push(DiagnosticAttribute::Title(title));
                }
            }
        }
        if let Some(count) = self.quantifiers_removed
            && count > 0
        {
            attributes.push(DiagnosticAttribute::QuantifierNote {
                count: count.unsigned_abs(),
            });
        }
        if let Some(name) = self.while_rule {
            attributes.push(DiagnosticAttribute::RuleNote { name });
        }
        attributes
    }
}

#[derive(Debug, Deserialize)]
struct CodeError {
    name: String,
    code: i64,
    pos: i64,
    descr: String,
}

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(default)]
    name: Option<String>,
    descr: String,
}

/// Decode one stdout record.
pub fn decode_record(line: &str) -> Result<ProtocolEvent, ProtocolParseError> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix(TAGGED_PREFIX) {
        return decode_tagged(line, rest);
    }

    let record: WireRecord = serde_json::from_str(trimmed)
        .map_err(|e| ProtocolParseError::new(line, format!("invalid record: {e}")))?;
    let severity = Severity::from_wire(&record.level).ok_or_else(|| {
        ProtocolParseError::new(line, format!("unknown level '{}'", record.level))
    })?;
    let attributes = record
        .extra
        .map(WireExtra::into_attributes)
        .unwrap_or_default();

    Ok(ProtocolEvent::Diagnostic(Diagnostic::new(
        severity,
        record.message,
        record.timestamp,
        attributes,
    )))
}

fn decode_tagged(line: &str, rest: &str) -> Result<ProtocolEvent, ProtocolParseError> {
    let Some((tag, body)) = rest.split_once('-') else {
        return Err(ProtocolParseError::new(line, "tagged record without body"));
    };

    match tag {
        "ERC" => {
            let err: CodeError = serde_json::from_str(body)
                .map_err(|e| ProtocolParseError::new(line, format!("invalid ERC record: {e}")))?;
            Ok(ProtocolEvent::Diagnostic(Diagnostic::new(
                Severity::Error,
                err.descr,
                None,
                vec![
                    DiagnosticAttribute::WordError { offset: err.pos },
                    DiagnosticAttribute::Title(format!("{} (code {})", err.name, err.code)),
                ],
            )))
        }
        _ => {
            let class = match tag {
                "ERS" => StreamErrorClass::Fatal,
                "WRN" => StreamErrorClass::Warning,
                _ => StreamErrorClass::Informational,
            };
            let record: StreamRecord = serde_json::from_str(body).map_err(|e| {
                ProtocolParseError::new(line, format!("invalid {tag} record: {e}"))
            })?;
            Ok(ProtocolEvent::Stream {
                class,
                name: record.name.unwrap_or_else(|| tag.to_string()),
                description: record.descr,
            })
        }
    }
}
