//! RFC5424 syslog line parsing and normalization
//!
//! ```text
//! <PRI>VERSION SP TIMESTAMP SP HOSTNAME SP APP-NAME SP PROCID SP MSGID SP STRUCTURED-DATA [SP MSG]
//! ```

use crate::logs::{AttributeValue, Attributes, Log};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const NIL: &str = "-";
const MAX_PRIORITY: u8 = 191;

static SD_PARAM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]*)""#).unwrap());

static TRACEPARENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"traceparent:"([0-9]+)-([0-9a-z]+)-([0-9a-z]+)-([0-9]+)""#).unwrap()
});

static TRACE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"(?:traceId|trace_id)":"([0-9a-z-]+)""#).unwrap());

static SPAN_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)"(?:spanId|span_id)":"([0-9a-z-]+)""#).unwrap());

const SEVERITY_TEXT: [&str; 8] = [
    "EMERGENCY",
    "ALERT",
    "CRITICAL",
    "ERROR",
    "WARN",
    "NOTICE",
    "INFO",
    "DEBUG",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyslogParseError {
    #[error("Missing <PRI> header")]
    MissingPriority,

    #[error("Invalid priority '{0}'")]
    InvalidPriority(String),

    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("Missing {0} field")]
    MissingField(&'static str),

    #[error("Unterminated structured data element at byte {0}")]
    UnterminatedStructuredData(usize),

    #[error("Malformed structured data at byte {0}")]
    MalformedStructuredData(usize),
}

/// Decoded RFC5424 line; nil fields are `None`
#[derive(Debug, Clone, PartialEq)]
pub struct SyslogMessage {
    pub facility: u8,
    pub severity: u8,
    pub version: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    /// Raw structured-data elements, brackets included
    pub structured_data: Vec<String>,
    pub message: String,
}

impl SyslogMessage {
    pub fn parse(line: &str) -> Result<Self, SyslogParseError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let rest = line
            .strip_prefix('<')
            .ok_or(SyslogParseError::MissingPriority)?;
        let (pri, rest) = rest
            .split_once('>')
            .ok_or(SyslogParseError::MissingPriority)?;
        let priority = pri
            .parse::<u8>()
            .ok()
            .filter(|p| pri.len() <= 3 && *p <= MAX_PRIORITY)
            .ok_or_else(|| SyslogParseError::InvalidPriority(pri.to_string()))?;

        let mut fields = Fields { rest };
        let version_text = fields.next("version")?;
        let version = version_text
            .parse::<u32>()
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| SyslogParseError::InvalidVersion(version_text.to_string()))?;

        let timestamp = match fields.next("timestamp")? {
            NIL => None,
            // stored as i64 nanoseconds, so roughly 1677..2262
            text => Some(
                DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
                    .filter(|dt| dt.timestamp_nanos_opt().is_some())
                    .ok_or_else(|| SyslogParseError::InvalidTimestamp(text.to_string()))?,
            ),
        };
        let hostname = nil_to_none(fields.next("hostname")?);
        let app_name = nil_to_none(fields.next("app-name")?);
        let proc_id = nil_to_none(fields.next("procid")?);
        let msg_id = nil_to_none(fields.next("msgid")?);

        let offset = line.len() - fields.rest.len();
        let (structured_data, rest) = parse_structured_data(fields.rest, offset)?;

        let message = rest.strip_prefix(' ').unwrap_or(rest);
        let message = message.strip_prefix('\u{feff}').unwrap_or(message);

        Ok(Self {
            facility: priority / 8,
            severity: priority % 8,
            version,
            timestamp,
            hostname,
            app_name,
            proc_id,
            msg_id,
            structured_data,
            message: message.to_string(),
        })
    }

    pub fn severity_text(&self) -> &'static str {
        SEVERITY_TEXT[usize::from(self.severity & 7)]
    }

    /// `key="value"` pairs of the first structured-data element
    pub fn structured_params(&self) -> Attributes {
        self.structured_data
            .first()
            .map(|element| {
                SD_PARAM_RE
                    .captures_iter(element)
                    .map(|caps| (caps[1].to_string(), AttributeValue::from(&caps[2])))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Canonical record; a nil timestamp falls back to `received_at`
    pub fn to_log(&self, received_at: DateTime<Utc>) -> Log {
        let mut log = Log::new(self.timestamp.unwrap_or(received_at), self.message.clone());

        let mut resource_attributes = self.structured_params();
        if let Some(hostname) = &self.hostname {
            resource_attributes.insert(
                "hostname".to_string(),
                AttributeValue::from(hostname.as_str()),
            );
        }

        log.service_name = resource_attributes
            .get("app_name")
            .map(ToString::to_string)
            .or_else(|| self.app_name.clone());
        log.severity_text = Some(self.severity_text().to_string());
        log.severity_number = i32::from(self.severity);
        log.resource_attributes = resource_attributes;

        apply_trace_context(&mut log);
        log
    }
}

/// Parse one drain line into a canonical record
pub fn parse_line(line: &str, received_at: DateTime<Utc>) -> Result<Log, SyslogParseError> {
    Ok(SyslogMessage::parse(line)?.to_log(received_at))
}

fn apply_trace_context(log: &mut Log) {
    if let Some(caps) = TRACEPARENT_RE.captures(&log.body) {
        log.trace_id = Some(caps[2].to_string());
        log.span_id = Some(caps[3].to_string());
        log.trace_flags = caps[4].parse().unwrap_or(0);
    }
    if let Some(caps) = TRACE_ID_RE.captures(&log.body) {
        log.trace_id = Some(caps[1].to_string());
        log.trace_flags = 1;
    }
    if let Some(caps) = SPAN_ID_RE.captures(&log.body) {
        log.span_id = Some(caps[1].to_string());
    }
}

struct Fields<'a> {
    rest: &'a str,
}

impl<'a> Fields<'a> {
    /// Next space-terminated header field
    fn next(&mut self, name: &'static str) -> Result<&'a str, SyslogParseError> {
        let (field, rest) = match self.rest.split_once(' ') {
            Some(split) => split,
            None => (self.rest, ""),
        };
        if field.is_empty() {
            return Err(SyslogParseError::MissingField(name));
        }
        self.rest = rest;
        Ok(field)
    }
}

fn nil_to_none(field: &str) -> Option<String> {
    (field != NIL).then(|| field.to_string())
}

/// Split adjacent `[...]` elements off the front of `input`
///
/// Param values are quoted and may contain escaped `"`, `\` and `]`.
fn parse_structured_data(
    input: &str,
    offset: usize,
) -> Result<(Vec<String>, &str), SyslogParseError> {
    if input.is_empty() {
        return Ok((Vec::new(), input));
    }
    if let Some(rest) = input.strip_prefix(NIL) {
        return Ok((Vec::new(), rest));
    }
    if !input.starts_with('[') {
        return Err(SyslogParseError::MalformedStructuredData(offset));
    }

    let mut elements = Vec::new();
    let mut rest = input;
    while rest.starts_with('[') {
        let start = offset + (input.len() - rest.len());
        let mut in_quotes = false;
        let mut escaped = false;
        let mut end = None;

        for (i, c) in rest.char_indices().skip(1) {
            match c {
                _ if escaped => escaped = false,
                '\\' if in_quotes => escaped = true,
                '"' => in_quotes = !in_quotes,
                ']' if !in_quotes => {
                    end = Some(i);
                    break;
                }
                _ => {}
            }
        }

        let end = end.ok_or(SyslogParseError::UnterminatedStructuredData(start))?;
        elements.push(rest[..=end].to_string());
        rest = &rest[end + 1..];
    }

    Ok((elements, rest))
}
